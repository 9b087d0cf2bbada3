//! The engine: one task that owns every piece of mutable server state.
//!
//! Connection handlers, room timers, and the maintenance intervals all feed
//! a single loop. Each input runs to completion before the next is read, so
//! an identity can never be observed with two current connections and a
//! room is never seen mid-transition.
//!
//! ```text
//! handler ──EngineInput──┐
//! room timers ───────────┼──→ Engine ──→ Fanout ──→ per-connection writers
//! expiry / sweep ticks ──┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use scrawl_protocol::{
    ChatLine, ClientMessage, ConnectionId, JsonCodec, PlayerId, ProtocolError, Recipient, RoomCode,
    ServerMessage,
};
use scrawl_room::{
    CodeGenerator, GameConfig, Outbound, RandomCodes, RoomConfig, RoomRegistry, RoomTimerFired,
};
use scrawl_session::{Departure, IdentityRegistry, JoinOutcome, SessionConfig, SessionError};
use scrawl_timer::{SharedClock, SystemClock};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::ScrawlError;
use crate::fanout::{EVICTED_CLOSE_CODE, Fanout, OutgoingSender};
use crate::lobby::LobbyChat;

/// Everything a connection handler can tell the engine.
#[derive(Debug)]
pub enum EngineInput {
    /// A connection was accepted; `sink` is its outbound queue.
    Connected {
        connection: ConnectionId,
        sink: OutgoingSender,
    },
    /// A frame decoded into a client message.
    Inbound {
        connection: ConnectionId,
        message: ClientMessage,
    },
    /// A frame that did not decode.
    Malformed {
        connection: ConnectionId,
        error: String,
    },
    /// The connection is gone, cleanly or not.
    Closed { connection: ConnectionId },
}

/// Cloneable sender side of the engine's inbox.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineInput>,
}

impl EngineHandle {
    /// Queues an input. Returns `false` once the engine has stopped.
    pub fn send(&self, input: EngineInput) -> bool {
        self.tx.send(input).is_ok()
    }
}

/// Owns the identity registry, the rooms, lobby chat, and every outbound
/// queue.
pub struct Engine {
    sessions: IdentityRegistry,
    rooms: RoomRegistry,
    fanout: Fanout,
    lobby: LobbyChat,
    clock: SharedClock,
    inbox: mpsc::UnboundedReceiver<EngineInput>,
    timers: mpsc::UnboundedReceiver<RoomTimerFired>,
}

impl Engine {
    /// Creates an engine on the system clock with random room codes.
    pub fn new(
        session_config: SessionConfig,
        room_config: RoomConfig,
        game_config: GameConfig,
    ) -> (Self, EngineHandle) {
        Self::with_parts(
            session_config,
            room_config,
            game_config,
            Arc::new(SystemClock),
            Box::new(RandomCodes),
        )
    }

    /// Creates an engine with an injected clock and code generator.
    pub fn with_parts(
        session_config: SessionConfig,
        room_config: RoomConfig,
        game_config: GameConfig,
        clock: SharedClock,
        codes: Box<dyn CodeGenerator>,
    ) -> (Self, EngineHandle) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let (timer_tx, timers) = mpsc::unbounded_channel();
        let engine = Self {
            sessions: IdentityRegistry::with_clock(session_config, Arc::clone(&clock)),
            rooms: RoomRegistry::with_parts(room_config, game_config, timer_tx, Arc::clone(&clock), codes),
            fanout: Fanout::new(JsonCodec, Arc::clone(&clock)),
            lobby: LobbyChat::default(),
            clock,
            inbox,
            timers,
        };
        (engine, EngineHandle { tx })
    }

    pub fn sessions(&self) -> &IdentityRegistry {
        &self.sessions
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Runs until every [`EngineHandle`] is dropped.
    pub async fn run(mut self) {
        let expiry_period = self.sessions.config().expiry_check_interval;
        let sweep_period = self.rooms.config().sweep_interval;
        let mut expiry = interval(expiry_period);
        let mut sweep = interval(sweep_period);

        tracing::info!(
            expiry_secs = expiry_period.as_secs(),
            sweep_secs = sweep_period.as_secs(),
            "engine running"
        );

        loop {
            tokio::select! {
                input = self.inbox.recv() => match input {
                    Some(input) => self.handle_input(input),
                    None => break,
                },
                Some(fired) = self.timers.recv() => self.handle_timer(fired),
                _ = expiry.tick() => self.expire_sessions(),
                _ = sweep.tick() => self.sweep_rooms(),
            }
        }

        tracing::info!("engine stopped");
    }

    // -----------------------------------------------------------------------
    // Inputs
    // -----------------------------------------------------------------------

    pub fn handle_input(&mut self, input: EngineInput) {
        match input {
            EngineInput::Connected { connection, sink } => {
                tracing::debug!(%connection, "connection registered");
                self.fanout.register(connection, sink);
            }
            EngineInput::Inbound {
                connection,
                message,
            } => {
                self.sessions.touch(connection);
                if let Err(e) = self.dispatch(connection, message) {
                    self.reject(connection, &e);
                }
            }
            EngineInput::Malformed { connection, error } => {
                let e = ScrawlError::Protocol(ProtocolError::InvalidMessage(error));
                self.reject(connection, &e);
            }
            EngineInput::Closed { connection } => self.closed(connection),
        }
    }

    /// Routes one room timer firing.
    pub fn handle_timer(&mut self, fired: RoomTimerFired) {
        if let Some((code, out)) = self.rooms.handle_timer(fired) {
            self.deliver(&code, out);
        }
    }

    /// Handles every timer firing already queued. Returns how many ran.
    pub fn pump_timers(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(fired) = self.timers.try_recv() {
            self.handle_timer(fired);
            handled += 1;
        }
        handled
    }

    /// Announces identities whose reconnection window elapsed and releases
    /// their room seats.
    pub fn expire_sessions(&mut self) {
        for departure in self.sessions.expire_stale() {
            self.depart(departure, None);
        }
        self.sessions.cleanup_expired();
    }

    /// Deletes idle rooms and tells whoever was still seated.
    pub fn sweep_rooms(&mut self) {
        for swept in self.rooms.sweep_idle() {
            let targets: Vec<ConnectionId> = swept
                .participants
                .iter()
                .filter_map(|id| self.sessions.current_connection(id))
                .collect();
            self.fanout
                .broadcast(targets, &ServerMessage::RoomLeft { code: swept.code });
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    fn dispatch(&mut self, connection: ConnectionId, message: ClientMessage) -> Result<(), ScrawlError> {
        match message {
            ClientMessage::SessionJoin {
                identity,
                display_name,
            } => self.session_join(connection, identity, &display_name)?,

            ClientMessage::SessionLeave { identity } => {
                let (identity, _) = self.claim(connection, &identity)?;
                let seat = self.rooms.room_of(&identity).cloned();
                if let Some(departure) = self.sessions.leave(connection) {
                    self.depart(departure, None);
                }
                if let Some(code) = seat {
                    self.fanout.send(connection, &ServerMessage::RoomLeft { code });
                }
            }

            ClientMessage::SessionStatus { status } => {
                let entry = self.sessions.status(connection, status)?;
                self.broadcast_lobby(&ServerMessage::PresenceUpdated { entry });
            }

            ClientMessage::LobbyChat { text } => {
                let (identity, display_name) = self.bound(connection)?;
                let text = text.trim();
                if text.is_empty() {
                    return Err(ProtocolError::InvalidMessage("empty chat line".into()).into());
                }
                let line = ChatLine::chat(identity, display_name, text);
                self.lobby.push(line.clone());
                self.broadcast_lobby(&ServerMessage::LobbyChat { line });
            }

            ClientMessage::RoomList => {
                let rooms = self.rooms.list();
                self.fanout.send(connection, &ServerMessage::RoomList { rooms });
            }

            ClientMessage::RoomCreate { display_name } => {
                let (identity, bound_name) = self.bound(connection)?;
                let name = pick_name(&display_name, &bound_name);
                let joined = self.rooms.create(&identity, &name)?;
                self.fanout.send(
                    connection,
                    &ServerMessage::RoomJoined {
                        code: joined.code.clone(),
                        created: true,
                    },
                );
                self.deliver(&joined.code, joined.messages);
            }

            ClientMessage::RoomJoin {
                code,
                identity,
                display_name,
            } => {
                let (identity, bound_name) = self.claim(connection, &identity)?;
                let name = pick_name(&display_name, &bound_name);
                let joined = self.rooms.get_or_create(&code, &identity, &name)?;
                self.fanout.send(
                    connection,
                    &ServerMessage::RoomJoined {
                        code: joined.code.clone(),
                        created: joined.created,
                    },
                );
                self.deliver(&joined.code, joined.messages);
            }

            ClientMessage::RoomLeave { code, identity } => {
                let (identity, _) = self.claim(connection, &identity)?;
                let code = RoomCode::parse(&code)?;
                let out = self.rooms.leave(code.as_str(), &identity)?;
                self.fanout
                    .send(connection, &ServerMessage::RoomLeft { code: code.clone() });
                self.deliver(&code, out);
            }

            ClientMessage::RoomChat { code, text } => {
                let (identity, _) = self.bound(connection)?;
                let code = RoomCode::parse(&code)?;
                let out = self.rooms.chat(code.as_str(), &identity, &text)?;
                self.deliver(&code, out);
            }

            ClientMessage::RoundStart { code } => {
                let (identity, _) = self.bound(connection)?;
                let code = RoomCode::parse(&code)?;
                let out = self.rooms.start(code.as_str(), &identity)?;
                self.deliver(&code, out);
            }

            ClientMessage::RoundGuess {
                code,
                identity,
                text,
            } => {
                let (identity, _) = self.claim(connection, &identity)?;
                let code = RoomCode::parse(&code)?;
                let out = self.rooms.guess(code.as_str(), &identity, &text)?;
                self.deliver(&code, out);
            }

            ClientMessage::StrokeAppend { code, stroke } => {
                let (identity, _) = self.bound(connection)?;
                let code = RoomCode::parse(&code)?;
                let out = self.rooms.stroke_append(code.as_str(), &identity, stroke)?;
                self.deliver(&code, out);
            }

            ClientMessage::StrokeClear { code } => {
                let (identity, _) = self.bound(connection)?;
                let code = RoomCode::parse(&code)?;
                let out = self.rooms.stroke_clear(code.as_str(), &identity)?;
                self.deliver(&code, out);
            }

            ClientMessage::Heartbeat { client_time } => {
                let ack = ServerMessage::HeartbeatAck {
                    client_time,
                    server_time: self.clock.unix_millis(),
                };
                self.fanout.send(connection, &ack);
            }
        }
        Ok(())
    }

    fn session_join(
        &mut self,
        connection: ConnectionId,
        identity: PlayerId,
        display_name: &str,
    ) -> Result<(), ScrawlError> {
        let display_name = display_name.trim();
        let display_name = if display_name.is_empty() {
            identity.as_str().to_string()
        } else {
            display_name.to_string()
        };

        let JoinOutcome {
            accepted,
            evicted,
            resumed,
            lapsed,
        } = self.sessions.join(connection, identity.clone(), &display_name)?;

        let Some(session) = accepted else {
            // Already joined on this connection: resend state, announce nothing.
            self.greet(connection, &identity, &display_name);
            if let Some((code, out)) = self.rooms.resync(&identity) {
                self.deliver(&code, out);
            }
            return Ok(());
        };

        // The old connection hears about its replacement before anyone else
        // hears about the new one.
        if let Some(old) = evicted {
            self.fanout.send(
                old,
                &ServerMessage::Evicted {
                    reason: "signed in from another connection".into(),
                },
            );
            self.fanout
                .close(old, EVICTED_CLOSE_CODE, "replaced by a newer connection");
            self.fanout.unregister(old);
        }
        if let Some(departure) = lapsed {
            self.depart(departure, Some(connection));
        }

        self.greet(connection, &session.identity, &session.display_name);

        let entry = self
            .sessions
            .get(&session.identity)
            .map(|i| i.entry())
            .ok_or(SessionError::NotJoined(connection))?;
        let announcement = if resumed {
            ServerMessage::PresenceUpdated { entry }
        } else {
            ServerMessage::PresenceJoined { entry }
        };
        let others: Vec<ConnectionId> = self
            .sessions
            .connections()
            .filter(|c| *c != connection)
            .collect();
        self.fanout.broadcast(others, &announcement);

        if resumed {
            if let Some((code, out)) = self.rooms.participant_reconnected(&session.identity) {
                self.deliver(&code, out);
            }
        }
        Ok(())
    }

    fn greet(&mut self, connection: ConnectionId, identity: &PlayerId, display_name: &str) {
        self.fanout.send(
            connection,
            &ServerMessage::Welcome {
                identity: identity.clone(),
                display_name: display_name.to_string(),
            },
        );
        self.fanout.send(
            connection,
            &ServerMessage::PresenceList {
                entries: self.sessions.presence(),
            },
        );
        self.fanout.send(
            connection,
            &ServerMessage::LobbyHistory {
                lines: self.lobby.history(),
            },
        );
    }

    fn closed(&mut self, connection: ConnectionId) {
        self.fanout.unregister(connection);
        let Some(identity) = self.sessions.disconnect(connection) else {
            return;
        };
        if let Some((code, out)) = self.rooms.participant_disconnected(&identity) {
            self.deliver(&code, out);
        }
    }

    /// Releases the identity's room seat and announces it left the lobby.
    ///
    /// `skip` is a connection already re-bound to the departing identity,
    /// which must not hear about its own departure.
    fn depart(&mut self, departure: Departure, skip: Option<ConnectionId>) {
        if let Some((code, out)) = self.rooms.leave_current(&departure.identity) {
            self.deliver(&code, out);
        }
        let audience: Vec<ConnectionId> = self
            .sessions
            .connections()
            .filter(|c| Some(*c) != skip)
            .collect();
        self.fanout.broadcast(
            audience,
            &ServerMessage::PresenceLeft {
                identity: departure.identity,
                display_name: departure.display_name,
            },
        );
    }

    fn reject(&mut self, connection: ConnectionId, error: &ScrawlError) {
        let reason = error.reason();
        tracing::debug!(%connection, ?reason, error = %error, "event rejected");
        self.fanout.send(
            connection,
            &ServerMessage::Rejected {
                reason,
                message: error.to_string(),
            },
        );
    }

    // -----------------------------------------------------------------------
    // Identity checks
    // -----------------------------------------------------------------------

    /// The identity and display name the connection joined as.
    fn bound(&self, connection: ConnectionId) -> Result<(PlayerId, String), ScrawlError> {
        let identity = self
            .sessions
            .identity_of(connection)
            .ok_or(SessionError::NotJoined(connection))?;
        Ok((identity.id.clone(), identity.display_name.clone()))
    }

    /// Like [`bound`](Self::bound), but also requires the payload to name
    /// that same identity.
    fn claim(&self, connection: ConnectionId, claimed: &PlayerId) -> Result<(PlayerId, String), ScrawlError> {
        let (bound, display_name) = self.bound(connection)?;
        if bound != *claimed {
            return Err(ScrawlError::IdentityMismatch {
                claimed: claimed.clone(),
                bound,
            });
        }
        Ok((bound, display_name))
    }

    // -----------------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------------

    fn broadcast_lobby(&mut self, message: &ServerMessage) {
        self.fanout.broadcast(self.sessions.connections(), message);
    }

    /// Resolves each recipient to current connections and queues the
    /// message, encoded once, for all of them.
    fn deliver(&mut self, code: &RoomCode, out: Outbound) {
        for (recipient, message) in out {
            let targets = self.resolve(code, &recipient);
            self.fanout.broadcast(targets, &message);
        }
    }

    fn resolve(&self, code: &RoomCode, recipient: &Recipient) -> Vec<ConnectionId> {
        match recipient {
            Recipient::Player(id) => self.sessions.current_connection(id).into_iter().collect(),
            Recipient::All => self.members(code, None),
            Recipient::AllExcept(skip) => self.members(code, Some(skip)),
        }
    }

    fn members(&self, code: &RoomCode, skip: Option<&PlayerId>) -> Vec<ConnectionId> {
        let Some(room) = self.rooms.get(code) else {
            return Vec::new();
        };
        room.participants()
            .iter()
            .filter(|p| Some(&p.id) != skip)
            .filter_map(|p| self.sessions.current_connection(&p.id))
            .collect()
    }
}

fn pick_name(requested: &str, fallback: &str) -> String {
    let requested = requested.trim();
    if requested.is_empty() {
        fallback.to_string()
    } else {
        requested.to_string()
    }
}

fn interval(period: Duration) -> time::Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrawl_protocol::{Codec, Envelope, Phase, Presence, RejectReason};
    use scrawl_room::SequenceCodes;
    use scrawl_timer::ManualClock;

    use crate::fanout::{Outgoing, OutgoingReceiver};

    // =========================================================================
    // Helpers
    // =========================================================================

    struct Client {
        conn: ConnectionId,
        rx: OutgoingReceiver,
    }

    impl Client {
        /// Every message queued so far, in order. Close items are skipped.
        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut out = Vec::new();
            while let Ok(item) = self.rx.try_recv() {
                if let Outgoing::Frame(bytes) = item {
                    let env: Envelope<ServerMessage> = JsonCodec.decode(&bytes).unwrap();
                    out.push(env.payload);
                }
            }
            out
        }
    }

    fn engine() -> (Engine, ManualClock) {
        let clock = ManualClock::new();
        let (engine, _handle) = Engine::with_parts(
            SessionConfig::default(),
            RoomConfig::default(),
            GameConfig::default(),
            Arc::new(clock.clone()),
            Box::new(SequenceCodes::new(["ROOM1", "ROOM2"])),
        );
        (engine, clock)
    }

    fn pid(s: &str) -> PlayerId {
        PlayerId::new(s)
    }

    fn connect(engine: &mut Engine, n: u64) -> Client {
        let conn = ConnectionId::new(n);
        let (sink, rx) = mpsc::unbounded_channel();
        engine.handle_input(EngineInput::Connected {
            connection: conn,
            sink,
        });
        Client { conn, rx }
    }

    fn send(engine: &mut Engine, client: &Client, message: ClientMessage) {
        engine.handle_input(EngineInput::Inbound {
            connection: client.conn,
            message,
        });
    }

    fn join_as(engine: &mut Engine, client: &mut Client, id: &str, name: &str) {
        send(
            engine,
            client,
            ClientMessage::SessionJoin {
                identity: pid(id),
                display_name: name.into(),
            },
        );
        client.drain();
    }

    fn join_room(engine: &mut Engine, client: &Client, id: &str, name: &str, code: &str) {
        send(
            engine,
            client,
            ClientMessage::RoomJoin {
                code: code.into(),
                identity: pid(id),
                display_name: name.into(),
            },
        );
    }

    fn rejection(messages: &[ServerMessage]) -> Option<RejectReason> {
        messages.iter().find_map(|m| match m {
            ServerMessage::Rejected { reason, .. } => Some(*reason),
            _ => None,
        })
    }

    /// Two joined clients seated in room `ABCDE`, queues drained.
    fn two_in_room(engine: &mut Engine) -> (Client, Client) {
        let mut a = connect(engine, 1);
        let mut b = connect(engine, 2);
        join_as(engine, &mut a, "u1", "Ann");
        join_as(engine, &mut b, "u2", "Bob");
        join_room(engine, &a, "u1", "Ann", "abcde");
        join_room(engine, &b, "u2", "Bob", "ABCDE");
        a.drain();
        b.drain();
        (a, b)
    }

    // =========================================================================
    // Session join
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_session_join_sends_welcome_presence_and_history() {
        let (mut engine, _clock) = engine();
        let mut a = connect(&mut engine, 1);

        send(
            &mut engine,
            &a,
            ClientMessage::SessionJoin {
                identity: pid("u1"),
                display_name: "Ann".into(),
            },
        );

        let msgs = a.drain();
        assert!(matches!(&msgs[0], ServerMessage::Welcome { identity, .. } if *identity == pid("u1")));
        assert!(matches!(&msgs[1], ServerMessage::PresenceList { entries } if entries.len() == 1));
        assert!(matches!(&msgs[2], ServerMessage::LobbyHistory { lines } if lines.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_join_announces_to_others() {
        let (mut engine, _clock) = engine();
        let mut a = connect(&mut engine, 1);
        let mut b = connect(&mut engine, 2);
        join_as(&mut engine, &mut a, "u1", "Ann");

        send(
            &mut engine,
            &b,
            ClientMessage::SessionJoin {
                identity: pid("u2"),
                display_name: "Bob".into(),
            },
        );

        let seen = a.drain();
        assert!(matches!(&seen[0], ServerMessage::PresenceJoined { entry } if entry.identity == pid("u2")));
        // The joiner learns about itself from the list, not an announcement.
        assert!(!b.drain().iter().any(|m| matches!(m, ServerMessage::PresenceJoined { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_join_same_connection_resends_state_only() {
        let (mut engine, _clock) = engine();
        let mut a = connect(&mut engine, 1);
        let mut b = connect(&mut engine, 2);
        join_as(&mut engine, &mut a, "u1", "Ann");
        join_as(&mut engine, &mut b, "u2", "Bob");
        a.drain();

        send(
            &mut engine,
            &b,
            ClientMessage::SessionJoin {
                identity: pid("u2"),
                display_name: "Bob".into(),
            },
        );

        assert!(matches!(b.drain()[0], ServerMessage::Welcome { .. }));
        assert!(a.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_join_other_identity_on_bound_connection_rejected() {
        let (mut engine, _clock) = engine();
        let mut a = connect(&mut engine, 1);
        join_as(&mut engine, &mut a, "u1", "Ann");

        send(
            &mut engine,
            &a,
            ClientMessage::SessionJoin {
                identity: pid("u2"),
                display_name: "Bob".into(),
            },
        );

        assert_eq!(rejection(&a.drain()), Some(RejectReason::ConnectionInUse));
        assert_eq!(engine.sessions().current_connection(&pid("u1")), Some(a.conn));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_join_takeover_evicts_old_connection_first() {
        let (mut engine, _clock) = engine();
        let mut old = connect(&mut engine, 1);
        let mut watcher = connect(&mut engine, 2);
        let mut new = connect(&mut engine, 3);
        join_as(&mut engine, &mut old, "u1", "Ann");
        join_as(&mut engine, &mut watcher, "u2", "Bob");
        old.drain();

        send(
            &mut engine,
            &new,
            ClientMessage::SessionJoin {
                identity: pid("u1"),
                display_name: "Ann".into(),
            },
        );

        assert!(matches!(old.rx.try_recv().unwrap(), Outgoing::Frame(_)));
        assert!(matches!(
            old.rx.try_recv().unwrap(),
            Outgoing::Close { code: EVICTED_CLOSE_CODE, .. }
        ));
        assert!(matches!(new.drain()[0], ServerMessage::Welcome { .. }));
        let seen = watcher.drain();
        assert!(matches!(&seen[0], ServerMessage::PresenceUpdated { entry } if entry.identity == pid("u1")));
        assert_eq!(engine.sessions().current_connection(&pid("u1")), Some(new.conn));

        // The evicted handler's close arrives later and changes nothing.
        engine.handle_input(EngineInput::Closed { connection: old.conn });
        assert_eq!(engine.sessions().current_connection(&pid("u1")), Some(new.conn));
    }

    // =========================================================================
    // Identity checks and rejections
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_room_event_before_join_rejected_not_joined() {
        let (mut engine, _clock) = engine();
        let mut a = connect(&mut engine, 1);

        send(&mut engine, &a, ClientMessage::RoundStart { code: "ABCDE".into() });

        assert_eq!(rejection(&a.drain()), Some(RejectReason::NotJoined));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guess_for_other_identity_rejected_mismatch() {
        let (mut engine, _clock) = engine();
        let (mut a, mut b) = two_in_room(&mut engine);

        send(
            &mut engine,
            &a,
            ClientMessage::RoundGuess {
                code: "ABCDE".into(),
                identity: pid("u2"),
                text: "cat".into(),
            },
        );

        assert_eq!(rejection(&a.drain()), Some(RejectReason::IdentityMismatch));
        assert!(b.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_room_code_rejected() {
        let (mut engine, _clock) = engine();
        let mut a = connect(&mut engine, 1);
        join_as(&mut engine, &mut a, "u1", "Ann");

        join_room(&mut engine, &a, "u1", "Ann", "no!");

        assert_eq!(rejection(&a.drain()), Some(RejectReason::InvalidRoomCode));
        assert!(engine.rooms().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_rejected_connection_kept() {
        let (mut engine, _clock) = engine();
        let mut a = connect(&mut engine, 1);

        engine.handle_input(EngineInput::Malformed {
            connection: a.conn,
            error: "expected value at line 1".into(),
        });
        send(&mut engine, &a, ClientMessage::Heartbeat { client_time: 5 });

        let msgs = a.drain();
        assert_eq!(rejection(&msgs), Some(RejectReason::Malformed));
        assert!(matches!(msgs[1], ServerMessage::HeartbeatAck { client_time: 5, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_status_rejected() {
        let (mut engine, _clock) = engine();
        let mut a = connect(&mut engine, 1);
        join_as(&mut engine, &mut a, "u1", "Ann");

        send(
            &mut engine,
            &a,
            ClientMessage::SessionStatus {
                status: Presence::Offline,
            },
        );

        assert_eq!(rejection(&a.drain()), Some(RejectReason::Malformed));
    }

    // =========================================================================
    // Lobby
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_status_update_broadcast_to_lobby() {
        let (mut engine, _clock) = engine();
        let mut a = connect(&mut engine, 1);
        let mut b = connect(&mut engine, 2);
        join_as(&mut engine, &mut a, "u1", "Ann");
        join_as(&mut engine, &mut b, "u2", "Bob");
        a.drain();

        send(
            &mut engine,
            &b,
            ClientMessage::SessionStatus {
                status: Presence::Away,
            },
        );

        for msgs in [a.drain(), b.drain()] {
            assert!(matches!(
                &msgs[0],
                ServerMessage::PresenceUpdated { entry } if entry.status == Presence::Away
            ));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_lobby_chat_broadcast_and_replayed_to_late_joiner() {
        let (mut engine, _clock) = engine();
        let mut a = connect(&mut engine, 1);
        join_as(&mut engine, &mut a, "u1", "Ann");

        send(&mut engine, &a, ClientMessage::LobbyChat { text: " hi all ".into() });
        assert!(matches!(&a.drain()[0], ServerMessage::LobbyChat { line } if line.text == "hi all"));

        let mut b = connect(&mut engine, 2);
        send(
            &mut engine,
            &b,
            ClientMessage::SessionJoin {
                identity: pid("u2"),
                display_name: "Bob".into(),
            },
        );
        let history = b.drain().into_iter().find_map(|m| match m {
            ServerMessage::LobbyHistory { lines } => Some(lines),
            _ => None,
        });
        assert_eq!(history.map(|l| l.len()), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_acknowledged() {
        let (mut engine, _clock) = engine();
        let mut a = connect(&mut engine, 1);

        send(&mut engine, &a, ClientMessage::Heartbeat { client_time: 42 });

        assert!(matches!(
            a.drain()[0],
            ServerMessage::HeartbeatAck { client_time: 42, server_time } if server_time > 0
        ));
    }

    // =========================================================================
    // Rooms
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_room_join_delivers_joined_then_snapshot() {
        let (mut engine, _clock) = engine();
        let mut a = connect(&mut engine, 1);
        join_as(&mut engine, &mut a, "u1", "Ann");

        join_room(&mut engine, &a, "u1", "Ann", "abcde");

        let msgs = a.drain();
        assert!(matches!(
            &msgs[0],
            ServerMessage::RoomJoined { code, created: true } if code.as_str() == "ABCDE"
        ));
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMessage::RoomSnapshot { snapshot } if snapshot.participants.len() == 1
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_room_create_uses_generated_code() {
        let (mut engine, _clock) = engine();
        let mut a = connect(&mut engine, 1);
        join_as(&mut engine, &mut a, "u1", "Ann");

        send(&mut engine, &a, ClientMessage::RoomCreate { display_name: String::new() });

        assert!(matches!(
            &a.drain()[0],
            ServerMessage::RoomJoined { code, created: true } if code.as_str() == "ROOM1"
        ));
        let room = engine.rooms().get(&RoomCode::parse("ROOM1").unwrap()).unwrap();
        assert_eq!(room.participants()[0].display_name, "Ann");
    }

    #[tokio::test(start_paused = true)]
    async fn test_room_list_reports_rooms() {
        let (mut engine, _clock) = engine();
        let (mut a, _b) = two_in_room(&mut engine);

        send(&mut engine, &a, ClientMessage::RoomList);

        match &a.drain()[0] {
            ServerMessage::RoomList { rooms } => {
                assert_eq!(rooms.len(), 1);
                assert_eq!(rooms[0].participant_count, 2);
                assert_eq!(rooms[0].owner_display_name, "Ann");
            }
            other => panic!("expected room.list, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_start_secret_reaches_drawer_only() {
        let (mut engine, _clock) = engine();
        let (mut a, mut b) = two_in_room(&mut engine);

        send(&mut engine, &b, ClientMessage::RoundStart { code: "ABCDE".into() });

        let drawer = a.drain();
        let guesser = b.drain();
        assert!(drawer.iter().any(|m| matches!(m, ServerMessage::RoundSecret { .. })));
        assert!(!guesser.iter().any(|m| matches!(m, ServerMessage::RoundSecret { .. })));
        assert!(guesser.iter().any(|m| matches!(m, ServerMessage::RoundStarted { round: 1, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stroke_not_echoed_to_drawer() {
        let (mut engine, _clock) = engine();
        let (mut a, mut b) = two_in_room(&mut engine);
        send(&mut engine, &b, ClientMessage::RoundStart { code: "ABCDE".into() });
        a.drain();
        b.drain();

        send(
            &mut engine,
            &a,
            ClientMessage::StrokeAppend {
                code: "ABCDE".into(),
                stroke: serde_json::json!({"x": 1, "y": 2}),
            },
        );

        assert!(a.drain().is_empty());
        assert!(matches!(b.drain()[0], ServerMessage::StrokeAppended { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_room_leave_sends_left_and_updates_others() {
        let (mut engine, _clock) = engine();
        let (mut a, mut b) = two_in_room(&mut engine);

        send(
            &mut engine,
            &b,
            ClientMessage::RoomLeave {
                code: "ABCDE".into(),
                identity: pid("u2"),
            },
        );

        assert!(matches!(b.drain()[0], ServerMessage::RoomLeft { .. }));
        assert!(a.drain().iter().any(|m| matches!(
            m,
            ServerMessage::RoomSnapshot { snapshot } if snapshot.participants.len() == 1
        )));
    }

    // =========================================================================
    // Departures
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_session_leave_releases_seat_and_announces() {
        let (mut engine, _clock) = engine();
        let (mut a, mut b) = two_in_room(&mut engine);

        send(&mut engine, &b, ClientMessage::SessionLeave { identity: pid("u2") });

        assert!(matches!(b.drain()[0], ServerMessage::RoomLeft { .. }));
        let seen = a.drain();
        assert!(seen.iter().any(|m| matches!(
            m,
            ServerMessage::PresenceLeft { identity, .. } if *identity == pid("u2")
        )));
        assert_eq!(engine.rooms().room_of(&pid("u2")), None);
        assert_eq!(engine.sessions().current_connection(&pid("u2")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_keeps_seat_until_expiry() {
        let (mut engine, clock) = engine();
        let (mut a, b) = two_in_room(&mut engine);

        engine.handle_input(EngineInput::Closed { connection: b.conn });
        let seen = a.drain();
        assert!(!seen.iter().any(|m| matches!(m, ServerMessage::PresenceLeft { .. })));
        assert!(engine.rooms().room_of(&pid("u2")).is_some());

        clock.advance(Duration::from_secs(31));
        engine.expire_sessions();

        let seen = a.drain();
        assert!(seen.iter().any(|m| matches!(
            m,
            ServerMessage::PresenceLeft { identity, .. } if *identity == pid("u2")
        )));
        assert_eq!(engine.rooms().room_of(&pid("u2")), None);
        assert!(engine.sessions().get(&pid("u2")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_inside_window_restores_room() {
        let (mut engine, clock) = engine();
        let (mut a, b) = two_in_room(&mut engine);
        engine.handle_input(EngineInput::Closed { connection: b.conn });
        a.drain();

        clock.advance(Duration::from_secs(10));
        let mut b2 = connect(&mut engine, 3);
        send(
            &mut engine,
            &b2,
            ClientMessage::SessionJoin {
                identity: pid("u2"),
                display_name: "Bob".into(),
            },
        );

        let msgs = b2.drain();
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMessage::RoomSnapshot { snapshot } if snapshot.participants.iter().all(|p| p.connected)
        )));
        assert!(a.drain().iter().any(|m| matches!(m, ServerMessage::PresenceUpdated { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_after_window_announces_departure_first() {
        let (mut engine, clock) = engine();
        let (mut a, b) = two_in_room(&mut engine);
        engine.handle_input(EngineInput::Closed { connection: b.conn });
        a.drain();

        // Window elapsed but no expiry sweep has run yet.
        clock.advance(Duration::from_secs(45));
        let b2 = connect(&mut engine, 3);
        send(
            &mut engine,
            &b2,
            ClientMessage::SessionJoin {
                identity: pid("u2"),
                display_name: "Bob".into(),
            },
        );

        let seen = a.drain();
        let left = seen
            .iter()
            .position(|m| matches!(m, ServerMessage::PresenceLeft { .. }))
            .unwrap();
        let joined = seen
            .iter()
            .position(|m| matches!(m, ServerMessage::PresenceJoined { .. }))
            .unwrap();
        assert!(left < joined);
        assert_eq!(engine.rooms().room_of(&pid("u2")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_tells_seated_participants() {
        let (mut engine, clock) = engine();
        let (mut a, mut b) = two_in_room(&mut engine);

        clock.advance(Duration::from_secs(60 * 60 + 1));
        engine.sweep_rooms();

        assert!(matches!(a.drain()[0], ServerMessage::RoomLeft { .. }));
        assert!(matches!(b.drain()[0], ServerMessage::RoomLeft { .. }));
        assert!(engine.rooms().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_timers_delivers_round_clock() {
        let (mut engine, _clock) = engine();
        let (mut a, mut b) = two_in_room(&mut engine);
        send(&mut engine, &b, ClientMessage::RoundStart { code: "ABCDE".into() });
        a.drain();
        b.drain();

        for _ in 0..30 {
            tokio::time::advance(Duration::from_millis(100)).await;
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
        }

        assert!(engine.pump_timers() >= 1);
        assert!(b.drain().iter().any(|m| matches!(m, ServerMessage::RoundClock { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drawer_disconnect_announced_to_room() {
        let (mut engine, _clock) = engine();
        let (mut a, mut b) = two_in_room(&mut engine);
        send(&mut engine, &b, ClientMessage::RoundStart { code: "ABCDE".into() });
        b.drain();

        engine.handle_input(EngineInput::Closed { connection: a.conn });

        let seen = b.drain();
        assert!(seen.iter().any(|m| matches!(
            m,
            ServerMessage::DrawerDisconnected { drawer, .. } if *drawer == pid("u1")
        )));
        let room = engine.rooms().get(&RoomCode::parse("ABCDE").unwrap()).unwrap();
        assert_eq!(room.phase(), Phase::Drawing);
        assert!(room.drawer_pending());
        a.drain();
    }
}
