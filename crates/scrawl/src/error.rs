//! Unified error type for the Scrawl server.

use scrawl_protocol::{PlayerId, ProtocolError, RejectReason};
use scrawl_room::RoomError;
use scrawl_session::SessionError;
use scrawl_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically. Anything
/// that reaches a client does so as a `rejected` frame built from
/// [`reason`](Self::reason) and the `Display` text.
#[derive(Debug, thiserror::Error)]
pub enum ScrawlError {
    /// A transport-level error (accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid room code).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (not joined, connection already bound).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (full, not found, wrong phase).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The payload names an identity other than the one the connection
    /// joined as.
    #[error("connection speaks for {bound}, not {claimed}")]
    IdentityMismatch { claimed: PlayerId, bound: PlayerId },
}

impl ScrawlError {
    /// The rejection code reported back to the sender.
    pub fn reason(&self) -> RejectReason {
        match self {
            Self::Transport(_) => RejectReason::Malformed,
            Self::Protocol(e) => e.reason(),
            Self::Session(e) => e.reason(),
            Self::Room(e) => e.reason(),
            Self::IdentityMismatch { .. } => RejectReason::IdentityMismatch,
        }
    }
}
