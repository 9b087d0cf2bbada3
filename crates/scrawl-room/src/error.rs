//! Error types for the room layer.

use scrawl_protocol::{Phase, PlayerId, ProtocolError, RejectReason, RoomCode};

/// Errors that can occur during room operations.
///
/// Every variant is an invariant violation: the operation is refused, the
/// room is left exactly as it was, and only the caller is told why.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The room has no free seat.
    #[error("room {0} is full")]
    RoomFull(RoomCode),

    /// The identity is not a participant of this room.
    #[error("{0} is not in room {1}")]
    NotInRoom(PlayerId, RoomCode),

    /// The identity already sits in another room.
    #[error("{identity} is already in room {current}")]
    AlreadyInRoom { identity: PlayerId, current: RoomCode },

    /// Too few connected participants to start a round.
    #[error("need {needed} connected players, have {present}")]
    NotEnoughPlayers { needed: usize, present: usize },

    /// The drawer tried to guess their own word.
    #[error("the drawer cannot guess")]
    DrawerCannotGuess,

    /// Only the active drawer may touch the canvas.
    #[error("{0} is not the drawer")]
    NotDrawer(PlayerId),

    /// The operation is not allowed in the room's current phase.
    #[error("not allowed while the room is {0:?}")]
    InvalidPhase(Phase),

    /// Blank chat or guess text.
    #[error("message text is empty")]
    EmptyText,

    /// Every generated code was already taken.
    #[error("no free room code after {0} attempts")]
    CodesExhausted(usize),

    /// The supplied room code is malformed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl RoomError {
    /// The rejection code reported back to the sender.
    pub fn reason(&self) -> RejectReason {
        match self {
            Self::NotFound(_) => RejectReason::RoomNotFound,
            Self::RoomFull(_) | Self::CodesExhausted(_) => RejectReason::RoomFull,
            Self::NotInRoom(..) => RejectReason::NotInRoom,
            Self::AlreadyInRoom { .. } => RejectReason::AlreadyInRoom,
            Self::NotEnoughPlayers { .. } => RejectReason::NotEnoughPlayers,
            Self::DrawerCannotGuess => RejectReason::DrawerCannotGuess,
            Self::NotDrawer(_) => RejectReason::NotDrawer,
            Self::InvalidPhase(_) => RejectReason::InvalidPhase,
            Self::EmptyText => RejectReason::Malformed,
            Self::Protocol(e) => e.reason(),
        }
    }
}
