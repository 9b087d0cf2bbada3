//! Room registry: creates, finds, and destroys rooms, and tracks which room
//! each identity sits in.

use std::collections::HashMap;
use std::sync::Arc;

use scrawl_protocol::{PlayerId, RoomCode, RoomListEntry};
use scrawl_timer::{SharedClock, SystemClock};
use serde_json::Value;

use crate::codes::{CodeGenerator, RandomCodes};
use crate::room::{Outbound, RoomContext, RoomTimerFired, TimerSender};
use crate::{GameConfig, Room, RoomConfig, RoomError};

/// Attempts at finding an unused generated code before giving up.
const MAX_CODE_ATTEMPTS: usize = 64;

/// Result of a successful join.
#[derive(Debug)]
pub struct Joined {
    pub code: RoomCode,
    /// The room did not exist before this call.
    pub created: bool,
    /// The identity was already seated; nothing was appended.
    pub rejoined: bool,
    pub messages: Outbound,
}

/// A room removed by the idle sweep, with whoever was still seated in it.
#[derive(Debug)]
pub struct SweptRoom {
    pub code: RoomCode,
    pub participants: Vec<PlayerId>,
}

/// All rooms in the process, keyed by code.
///
/// Owned by the engine task; every method takes `&mut self` and runs to
/// completion, so no room is ever observed mid-transition.
pub struct RoomRegistry {
    rooms: HashMap<RoomCode, Room>,

    /// Maps each identity to the room it sits in.
    /// An identity is in at most ONE room at a time.
    player_rooms: HashMap<PlayerId, RoomCode>,

    config: RoomConfig,
    ctx: RoomContext,
    codes: Box<dyn CodeGenerator>,
}

impl RoomRegistry {
    /// Creates a registry on the system clock with random room codes.
    ///
    /// Room timers deliver their firings into `timers`.
    pub fn new(config: RoomConfig, game: GameConfig, timers: TimerSender) -> Self {
        Self::with_parts(config, game, timers, Arc::new(SystemClock), Box::new(RandomCodes))
    }

    /// Creates a registry with an injected clock and code generator.
    pub fn with_parts(
        config: RoomConfig,
        game: GameConfig,
        timers: TimerSender,
        clock: SharedClock,
        codes: Box<dyn CodeGenerator>,
    ) -> Self {
        let ctx = RoomContext {
            game: Arc::new(game),
            max_players: config.max_players,
            max_chat_log: config.max_chat_log,
            clock,
            timers,
        };
        Self {
            rooms: HashMap::new(),
            player_rooms: HashMap::new(),
            config,
            ctx,
            codes,
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn game_config(&self) -> &GameConfig {
        &self.ctx.game
    }

    /// Joins the room with `code`, creating it if unknown.
    ///
    /// Re-joining a room the identity already sits in returns the existing
    /// seat and marks it connected.
    ///
    /// # Errors
    /// - [`RoomError::Protocol`]: malformed code
    /// - [`RoomError::AlreadyInRoom`]: seated in a different room
    /// - [`RoomError::RoomFull`]: no free seat
    pub fn get_or_create(
        &mut self,
        code: &str,
        identity: &PlayerId,
        display_name: &str,
    ) -> Result<Joined, RoomError> {
        let code = RoomCode::parse(code)?;
        self.ensure_free(identity, &code)?;

        let created = !self.rooms.contains_key(&code);
        if created {
            self.rooms
                .insert(code.clone(), Room::new(code.clone(), self.ctx.clone()));
            tracing::info!(room = %code, "room created");
        }
        self.seat(code, identity, display_name, created)
    }

    /// Creates a room under a fresh generated code and seats the caller.
    pub fn create(&mut self, identity: &PlayerId, display_name: &str) -> Result<Joined, RoomError> {
        if let Some(current) = self.player_rooms.get(identity) {
            return Err(RoomError::AlreadyInRoom {
                identity: identity.clone(),
                current: current.clone(),
            });
        }

        let code = self.fresh_code()?;
        self.rooms
            .insert(code.clone(), Room::new(code.clone(), self.ctx.clone()));
        tracing::info!(room = %code, "room created");
        self.seat(code, identity, display_name, true)
    }

    /// Removes `identity` from the room. Deletes the room once empty,
    /// which drops (and so cancels) all of its timers.
    pub fn leave(&mut self, code: &str, identity: &PlayerId) -> Result<Outbound, RoomError> {
        let code = RoomCode::parse(code)?;
        let room = self
            .rooms
            .get_mut(&code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;
        let out = room.leave(identity)?;
        self.player_rooms.remove(identity);
        self.remove_if_empty(&code);
        Ok(out)
    }

    /// Removes `identity` from whichever room it sits in.
    pub fn leave_current(&mut self, identity: &PlayerId) -> Option<(RoomCode, Outbound)> {
        let code = self.player_rooms.get(identity)?.clone();
        let out = self.leave(code.as_str(), identity).ok()?;
        Some((code, out))
    }

    /// Discovery list, ordered by code. Empty rooms are never listed.
    pub fn list(&self) -> Vec<RoomListEntry> {
        let mut entries: Vec<_> = self.rooms.values().filter_map(Room::list_entry).collect();
        entries.sort_by(|a, b| a.code.cmp(&b.code));
        entries
    }

    /// Deletes rooms that are empty or whose last round started longer
    /// than `idle_timeout` ago.
    pub fn sweep_idle(&mut self) -> Vec<SweptRoom> {
        let now = self.ctx.clock.now();
        let idle_timeout = self.config.idle_timeout;
        let stale: Vec<RoomCode> = self
            .rooms
            .values()
            .filter(|room| room.is_empty() || room.is_idle(now, idle_timeout))
            .map(|room| room.code().clone())
            .collect();

        let mut swept = Vec::with_capacity(stale.len());
        for code in stale {
            let Some(room) = self.rooms.remove(&code) else {
                continue;
            };
            let participants: Vec<PlayerId> =
                room.participants().iter().map(|p| p.id.clone()).collect();
            for id in &participants {
                self.player_rooms.remove(id);
            }
            tracing::info!(room = %code, players = participants.len(), "idle room swept");
            swept.push(SweptRoom { code, participants });
        }
        swept
    }

    /// The identity's connection dropped; it keeps its seat.
    pub fn participant_disconnected(&mut self, identity: &PlayerId) -> Option<(RoomCode, Outbound)> {
        let code = self.player_rooms.get(identity)?;
        let room = self.rooms.get_mut(code)?;
        Some((code.clone(), room.disconnect(identity)))
    }

    /// The identity is back on a new connection.
    pub fn participant_reconnected(&mut self, identity: &PlayerId) -> Option<(RoomCode, Outbound)> {
        let code = self.player_rooms.get(identity)?;
        let room = self.rooms.get_mut(code)?;
        Some((code.clone(), room.reconnect(identity)))
    }

    /// Snapshot (and secret, for the drawer) addressed to one identity.
    pub fn resync(&self, identity: &PlayerId) -> Option<(RoomCode, Outbound)> {
        let code = self.player_rooms.get(identity)?;
        let room = self.rooms.get(code)?;
        Some((code.clone(), room.resync(identity)))
    }

    pub fn start(&mut self, code: &str, identity: &PlayerId) -> Result<Outbound, RoomError> {
        self.room_mut(code)?.start(identity)
    }

    pub fn guess(&mut self, code: &str, identity: &PlayerId, text: &str) -> Result<Outbound, RoomError> {
        let (_, out) = self.room_mut(code)?.guess(identity, text)?;
        Ok(out)
    }

    pub fn chat(&mut self, code: &str, identity: &PlayerId, text: &str) -> Result<Outbound, RoomError> {
        self.room_mut(code)?.chat(identity, text)
    }

    pub fn stroke_append(
        &mut self,
        code: &str,
        identity: &PlayerId,
        stroke: Value,
    ) -> Result<Outbound, RoomError> {
        self.room_mut(code)?.stroke_append(identity, stroke)
    }

    pub fn stroke_clear(&mut self, code: &str, identity: &PlayerId) -> Result<Outbound, RoomError> {
        self.room_mut(code)?.stroke_clear(identity)
    }

    /// Routes a timer firing to its room. Firings for deleted rooms are
    /// dropped.
    pub fn handle_timer(&mut self, fired: RoomTimerFired) -> Option<(RoomCode, Outbound)> {
        let Some(room) = self.rooms.get_mut(&fired.code) else {
            tracing::debug!(room = %fired.code, timer = ?fired.timer, "timer for deleted room ignored");
            return None;
        };
        Some((fired.code, room.on_timer(fired.timer, fired.id)))
    }

    pub fn get(&self, code: &RoomCode) -> Option<&Room> {
        self.rooms.get(code)
    }

    /// The room an identity currently sits in.
    pub fn room_of(&self, identity: &PlayerId) -> Option<&RoomCode> {
        self.player_rooms.get(identity)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    // -- Internals --------------------------------------------------------

    fn room_mut(&mut self, code: &str) -> Result<&mut Room, RoomError> {
        let code = RoomCode::parse(code)?;
        self.rooms.get_mut(&code).ok_or(RoomError::NotFound(code))
    }

    fn ensure_free(&self, identity: &PlayerId, code: &RoomCode) -> Result<(), RoomError> {
        match self.player_rooms.get(identity) {
            Some(current) if current != code => Err(RoomError::AlreadyInRoom {
                identity: identity.clone(),
                current: current.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn seat(
        &mut self,
        code: RoomCode,
        identity: &PlayerId,
        display_name: &str,
        created: bool,
    ) -> Result<Joined, RoomError> {
        let Some(room) = self.rooms.get_mut(&code) else {
            return Err(RoomError::NotFound(code));
        };
        match room.join(identity, display_name) {
            Ok((rejoined, messages)) => {
                self.player_rooms.insert(identity.clone(), code.clone());
                Ok(Joined {
                    code,
                    created,
                    rejoined,
                    messages,
                })
            }
            Err(e) => {
                self.remove_if_empty(&code);
                Err(e)
            }
        }
    }

    fn fresh_code(&mut self) -> Result<RoomCode, RoomError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let candidate = self.codes.generate(self.config.room_code_len);
            let Ok(code) = RoomCode::parse(&candidate) else {
                continue;
            };
            if !self.rooms.contains_key(&code) {
                return Ok(code);
            }
        }
        Err(RoomError::CodesExhausted(MAX_CODE_ATTEMPTS))
    }

    fn remove_if_empty(&mut self, code: &RoomCode) {
        if self.rooms.get(code).is_some_and(Room::is_empty) {
            self.rooms.remove(code);
            tracing::info!(room = %code, "room deleted (empty)");
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the registry's bookkeeping. Round behaviour is
    //! covered by the integration tests in `tests/room_system.rs`.

    use scrawl_timer::ManualClock;
    use tokio::sync::mpsc;

    use super::*;
    use crate::codes::SequenceCodes;

    fn registry(codes: SequenceCodes) -> RoomRegistry {
        let (tx, _rx) = mpsc::unbounded_channel();
        RoomRegistry::with_parts(
            RoomConfig::default(),
            GameConfig::default(),
            tx,
            Arc::new(ManualClock::new()),
            Box::new(codes),
        )
    }

    fn pid(id: &str) -> PlayerId {
        PlayerId::new(id)
    }

    #[test]
    fn test_create_uses_generated_code() {
        let mut reg = registry(SequenceCodes::new(["QWERT"]));

        let joined = reg.create(&pid("u1"), "Ann").unwrap();

        assert_eq!(joined.code.as_str(), "QWERT");
        assert!(joined.created);
        assert_eq!(reg.room_of(&pid("u1")), Some(&joined.code));
    }

    #[test]
    fn test_create_skips_taken_codes() {
        let mut reg = registry(SequenceCodes::new(["QWERT", "QWERT", "ZXCVB"]));
        reg.create(&pid("u1"), "Ann").unwrap();

        let joined = reg.create(&pid("u2"), "Bob").unwrap();

        assert_eq!(joined.code.as_str(), "ZXCVB");
    }

    #[test]
    fn test_create_gives_up_when_codes_exhausted() {
        let mut reg = registry(SequenceCodes::new(["QWERT"]));
        reg.create(&pid("u1"), "Ann").unwrap();

        let err = reg.create(&pid("u2"), "Bob").unwrap_err();

        assert!(matches!(err, RoomError::CodesExhausted(_)));
        assert_eq!(reg.room_of(&pid("u2")), None);
    }

    #[test]
    fn test_get_or_create_normalizes_code() {
        let mut reg = registry(SequenceCodes::new(["QWERT"]));

        let joined = reg.get_or_create(" abcde ", &pid("u1"), "Ann").unwrap();

        assert_eq!(joined.code.as_str(), "ABCDE");
    }

    #[test]
    fn test_get_or_create_malformed_code_is_rejected() {
        let mut reg = registry(SequenceCodes::new(["QWERT"]));

        let err = reg.get_or_create("no!", &pid("u1"), "Ann").unwrap_err();

        assert_eq!(err.reason(), scrawl_protocol::RejectReason::InvalidRoomCode);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_leave_unknown_room_is_not_found() {
        let mut reg = registry(SequenceCodes::new(["QWERT"]));
        let err = reg.leave("ABCDE", &pid("u1")).unwrap_err();
        assert!(matches!(err, RoomError::NotFound(_)));
    }

    #[test]
    fn test_leave_current_without_room_returns_none() {
        let mut reg = registry(SequenceCodes::new(["QWERT"]));
        assert!(reg.leave_current(&pid("u1")).is_none());
    }
}
