//! Error types for the session layer.

use scrawl_protocol::{ConnectionId, PlayerId, Presence, RejectReason};

/// Errors that can occur during identity registration.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The connection is already bound to a different identity.
    /// A connection speaks for exactly one identity for its whole life.
    #[error("{connection} is already joined as {identity}")]
    ConnectionInUse {
        connection: ConnectionId,
        identity: PlayerId,
    },

    /// The connection has not completed `session.join`.
    #[error("{0} has not joined")]
    NotJoined(ConnectionId),

    /// Clients may only set `online` or `away`; `offline` is derived.
    #[error("status {0:?} cannot be set by a client")]
    InvalidStatus(Presence),
}

impl SessionError {
    /// The rejection code reported back to the sender.
    pub fn reason(&self) -> RejectReason {
        match self {
            Self::ConnectionInUse { .. } => RejectReason::ConnectionInUse,
            Self::NotJoined(_) => RejectReason::NotJoined,
            Self::InvalidStatus(_) => RejectReason::Malformed,
        }
    }
}
