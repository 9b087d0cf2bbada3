//! Error types for the protocol layer.

use crate::RejectReason;

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, unknown `type` tag,
    /// missing fields, or a truncated frame.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A room code that is not 4–8 ASCII letters or digits.
    #[error("invalid room code {0:?}")]
    InvalidRoomCode(String),

    /// The message parsed but violates a protocol rule.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    /// The rejection code reported back to the sender.
    pub fn reason(&self) -> RejectReason {
        match self {
            Self::InvalidRoomCode(_) => RejectReason::InvalidRoomCode,
            _ => RejectReason::Malformed,
        }
    }
}
