//! Core protocol types for Scrawl's wire format.
//!
//! Every type here travels on the wire. Inbound and outbound traffic are
//! two closed, internally tagged enums: a frame either decodes into exactly
//! one known variant or is rejected as malformed at the boundary.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A stable, externally supplied user key.
///
/// Survives reconnects: the same person reconnecting from a new tab gets a
/// new [`ConnectionId`](crate::ConnectionId) but keeps their `PlayerId`.
/// Serialized as a plain string (`#[serde(transparent)]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A short, human-shareable room code such as `ABCDE`.
///
/// Always uppercase ASCII alphanumerics, 4–8 characters. Build one with
/// [`RoomCode::parse`], which normalizes user input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    pub const MIN_LEN: usize = 4;
    pub const MAX_LEN: usize = 8;

    /// Trims, uppercases and validates a client-supplied code.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidRoomCode`] when the result is not 4–8 ASCII
    /// letters or digits.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let code = raw.trim().to_ascii_uppercase();
        let valid = (Self::MIN_LEN..=Self::MAX_LEN).contains(&code.len())
            && code.chars().all(|c| c.is_ascii_alphanumeric());
        if valid {
            Ok(Self(code))
        } else {
            Err(ProtocolError::InvalidRoomCode(raw.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Recipient — who should receive a room-scoped message?
// ---------------------------------------------------------------------------

/// Addressing for messages produced by a room.
///
/// Rooms speak in identities, never connections; the gateway resolves each
/// identity to its current connection at delivery time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Every participant of the room.
    All,
    /// One participant.
    Player(PlayerId),
    /// Everyone in the room except this participant.
    AllExcept(PlayerId),
}

// ---------------------------------------------------------------------------
// Enumerations shared by several messages
// ---------------------------------------------------------------------------

/// Lobby presence of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    #[default]
    Online,
    Away,
    Offline,
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Offline => "offline",
        })
    }
}

/// The round phase a room is in.
///
/// ```text
/// Waiting → Drawing → RoundEnd → Drawing (next round)
///                              ↘ GameEnd
/// ```
///
/// `Drawing` is the combined drawing/guessing phase. `GameEnd` is terminal
/// for a game; a fresh `round.start` re-initializes scores and begins again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Waiting,
    Drawing,
    RoundEnd,
    GameEnd,
}

impl Phase {
    /// Returns `true` while a round is live and its timers are running.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Drawing)
    }

    /// Returns `true` once a game has started and not yet been reset.
    pub fn has_started(&self) -> bool {
        !matches!(self, Self::Waiting)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Waiting => "waiting",
            Self::Drawing => "drawing",
            Self::RoundEnd => "round_end",
            Self::GameEnd => "game_end",
        })
    }
}

/// Why an inbound event was rejected.
///
/// Sent only to the originating connection; a rejection never mutates state
/// and never reaches other participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    RoomNotFound,
    RoomFull,
    NotInRoom,
    AlreadyInRoom,
    NotEnoughPlayers,
    DrawerCannotGuess,
    NotDrawer,
    InvalidPhase,
    InvalidRoomCode,
    NotJoined,
    IdentityMismatch,
    ConnectionInUse,
    Malformed,
}

/// The kind of a room or lobby log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    /// Free text from a participant (including wrong guesses).
    Chat,
    /// Generated by the engine: joins, leaves, correct guesses, results.
    System,
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// One line of a room or lobby message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLine {
    pub kind: ChatKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub text: String,
}

impl ChatLine {
    pub fn chat(from: PlayerId, display_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: ChatKind::Chat,
            from: Some(from),
            display_name: Some(display_name.into()),
            text: text.into(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            kind: ChatKind::System,
            from: None,
            display_name: None,
            text: text.into(),
        }
    }
}

/// One row of the lobby presence list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub identity: PlayerId,
    pub display_name: String,
    pub status: Presence,
    /// Unix milliseconds of the last activity seen from this identity.
    pub last_seen: u64,
}

/// Discovery entry returned by `room.list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomListEntry {
    pub code: RoomCode,
    pub participant_count: usize,
    pub phase: Phase,
    /// `true` once a game has been started in this room.
    pub started: bool,
    /// Display name of the first identity in turn order.
    pub owner_display_name: String,
}

/// One participant as shown in a room snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantView {
    pub identity: PlayerId,
    pub display_name: String,
    pub score: u32,
    pub connected: bool,
    /// Has a correct guess recorded in the current round.
    pub guessed: bool,
}

/// The full room state broadcast after every mutation.
///
/// Never contains the secret word; guessers see `masked_word`, the drawer
/// additionally receives [`ServerMessage::RoundSecret`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub code: RoomCode,
    pub phase: Phase,
    pub round: u32,
    pub max_rounds: u32,
    /// Participants in turn order.
    pub participants: Vec<ParticipantView>,
    pub drawer: Option<PlayerId>,
    /// The drawer has lost their connection and the grace timer is running.
    pub drawer_pending: bool,
    /// Secret word with hidden letters replaced by `_`.
    pub masked_word: Option<String>,
    pub revealed: Vec<bool>,
    pub remaining_secs: u32,
    pub messages: Vec<ChatLine>,
    pub strokes: Vec<Value>,
}

/// Per-identity score change at the end of a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreDelta {
    pub identity: PlayerId,
    pub display_name: String,
    pub delta: u32,
    pub total: u32,
}

/// Final ranking row at game end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankEntry {
    pub rank: usize,
    pub identity: PlayerId,
    pub display_name: String,
    pub score: u32,
}

/// The result of `round.guess`, sent to the guesser only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuessOutcome {
    pub is_correct: bool,
    pub score_delta: u32,
    /// The identity had already guessed correctly this round; nothing changed.
    pub already_guessed: bool,
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Everything a client can send.
///
/// Internally tagged: `{ "type": "round.guess", "code": "ABCDE", ... }`.
/// Room codes arrive as raw strings and are normalized by the engine so a
/// bad code is a clean `invalid_room_code` rejection rather than a decode
/// failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "session.join")]
    SessionJoin { identity: PlayerId, display_name: String },

    #[serde(rename = "session.leave")]
    SessionLeave { identity: PlayerId },

    #[serde(rename = "session.status")]
    SessionStatus { status: Presence },

    #[serde(rename = "lobby.chat")]
    LobbyChat { text: String },

    #[serde(rename = "room.list")]
    RoomList,

    /// Create a room under a freshly generated code.
    #[serde(rename = "room.create")]
    RoomCreate { display_name: String },

    #[serde(rename = "room.join")]
    RoomJoin { code: String, identity: PlayerId, display_name: String },

    #[serde(rename = "room.leave")]
    RoomLeave { code: String, identity: PlayerId },

    #[serde(rename = "room.chat")]
    RoomChat { code: String, text: String },

    #[serde(rename = "round.start")]
    RoundStart { code: String },

    #[serde(rename = "round.guess")]
    RoundGuess { code: String, identity: PlayerId, text: String },

    /// Opaque drawing payload; stored and rebroadcast verbatim.
    #[serde(rename = "stroke.append")]
    StrokeAppend { code: String, stroke: Value },

    #[serde(rename = "stroke.clear")]
    StrokeClear { code: String },

    #[serde(rename = "heartbeat")]
    Heartbeat { client_time: u64 },
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Everything the engine can send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Session accepted on this connection.
    #[serde(rename = "welcome")]
    Welcome { identity: PlayerId, display_name: String },

    /// This connection was replaced by a newer login for the same identity.
    #[serde(rename = "evicted")]
    Evicted { reason: String },

    #[serde(rename = "rejected")]
    Rejected { reason: RejectReason, message: String },

    #[serde(rename = "heartbeat.ack")]
    HeartbeatAck { client_time: u64, server_time: u64 },

    // -- Lobby --
    #[serde(rename = "presence.list")]
    PresenceList { entries: Vec<PresenceEntry> },

    #[serde(rename = "presence.joined")]
    PresenceJoined { entry: PresenceEntry },

    #[serde(rename = "presence.left")]
    PresenceLeft { identity: PlayerId, display_name: String },

    #[serde(rename = "presence.updated")]
    PresenceUpdated { entry: PresenceEntry },

    #[serde(rename = "lobby.chat")]
    LobbyChat { line: ChatLine },

    #[serde(rename = "lobby.history")]
    LobbyHistory { lines: Vec<ChatLine> },

    #[serde(rename = "room.list")]
    RoomList { rooms: Vec<RoomListEntry> },

    // -- Room --
    #[serde(rename = "room.joined")]
    RoomJoined { code: RoomCode, created: bool },

    #[serde(rename = "room.left")]
    RoomLeft { code: RoomCode },

    #[serde(rename = "room.snapshot")]
    RoomSnapshot { snapshot: RoomSnapshot },

    #[serde(rename = "room.chat")]
    RoomChat { line: ChatLine },

    // -- Round --
    #[serde(rename = "round.started")]
    RoundStarted { round: u32, max_rounds: u32, drawer: PlayerId, word_length: usize },

    /// The secret word, addressed to the drawer only.
    #[serde(rename = "round.secret")]
    RoundSecret { word: String },

    #[serde(rename = "round.clock")]
    RoundClock { remaining: u32 },

    #[serde(rename = "round.hint")]
    RoundHint { masked_word: String, revealed_count: usize },

    #[serde(rename = "round.guess_result")]
    GuessResult { outcome: GuessOutcome },

    #[serde(rename = "round.ended")]
    RoundEnded { round: u32, word: String, deltas: Vec<ScoreDelta> },

    #[serde(rename = "game.ended")]
    GameEnded { ranking: Vec<RankEntry> },

    // -- Drawer role --
    #[serde(rename = "drawer.disconnected")]
    DrawerDisconnected { drawer: PlayerId, grace_secs: u64 },

    #[serde(rename = "drawer.reconnected")]
    DrawerReconnected { drawer: PlayerId },

    #[serde(rename = "drawer.changed")]
    DrawerChanged { previous: PlayerId, drawer: PlayerId },

    // -- Strokes --
    #[serde(rename = "stroke.appended")]
    StrokeAppended { stroke: Value },

    #[serde(rename = "stroke.cleared")]
    StrokeCleared,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The top-level frame. Every message on the wire is an `Envelope`.
///
/// ```text
/// { "seq": 42, "timestamp": 15000, "payload": { "type": "round.clock", ... } }
/// ```
///
/// `seq` increases monotonically per sender. The server numbers each
/// outbound message once, so a broadcast carries the same `seq` for every
/// recipient and a single connection may observe gaps. `timestamp` is
/// milliseconds since the sender started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<P> {
    pub seq: u64,
    pub timestamp: u64,
    pub payload: P,
}
