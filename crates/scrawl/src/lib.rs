//! # Scrawl
//!
//! Real-time room and turn coordination for multiplayer drawing and
//! guessing games.
//!
//! Clients connect over WebSocket, claim an identity, chat in a shared
//! lobby, and meet in rooms addressed by short codes. Inside a room one
//! participant draws a secret word while the others race to guess it; the
//! server owns every clock, score, and turn.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scrawl::prelude::*;
//!
//! # async fn start() -> Result<(), ScrawlError> {
//! let server = ScrawlServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod engine;
mod error;
mod fanout;
mod handler;
mod lobby;
mod server;

pub use engine::{Engine, EngineHandle, EngineInput};
pub use error::ScrawlError;
pub use fanout::{EVICTED_CLOSE_CODE, Fanout, Outgoing, OutgoingReceiver, OutgoingSender};
pub use handler::IDLE_CLOSE_CODE;
pub use lobby::{LOBBY_HISTORY_LEN, LobbyChat};
pub use server::{DEFAULT_IDLE_TIMEOUT, ScrawlServer, ScrawlServerBuilder};

/// Everything needed to run a server or drive one from a test client.
pub mod prelude {
    pub use crate::{
        EVICTED_CLOSE_CODE, Engine, EngineHandle, EngineInput, IDLE_CLOSE_CODE, ScrawlError,
        ScrawlServer, ScrawlServerBuilder,
    };
    pub use scrawl_protocol::{
        ChatKind, ChatLine, ClientMessage, Codec, ConnectionId, Envelope, GuessOutcome,
        JsonCodec, Phase, PlayerId, Presence, PresenceEntry, RankEntry, RejectReason,
        RoomCode, RoomListEntry, RoomSnapshot, ScoreDelta, ServerMessage,
    };
    pub use scrawl_room::{GameConfig, RoomConfig};
    pub use scrawl_session::SessionConfig;
}
