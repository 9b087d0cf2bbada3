//! Wire protocol for Scrawl.
//!
//! This crate defines the "language" that clients and the engine speak:
//!
//! - **Identity types** ([`PlayerId`], [`RoomCode`], [`ConnectionId`])
//! - **Message unions** ([`ClientMessage`] inbound, [`ServerMessage`]
//!   outbound) — closed tagged enums, one variant per event kind, each with
//!   a fixed schema.
//! - **Views** ([`RoomSnapshot`], [`PresenceEntry`], ...) — the shapes the
//!   engine broadcasts.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`])
//! - **Errors** ([`ProtocolError`], [`RejectReason`])
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope<ClientMessage>) → Engine
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use scrawl_transport::ConnectionId;
pub use types::{
    ChatKind, ChatLine, ClientMessage, Envelope, GuessOutcome, Phase, PlayerId,
    Presence, PresenceEntry, RankEntry, RejectReason, Recipient, RoomCode,
    RoomListEntry, RoomSnapshot, ParticipantView, ScoreDelta, ServerMessage,
};
