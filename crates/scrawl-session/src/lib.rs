//! Identity and connection tracking for Scrawl.
//!
//! This crate answers "who is this connection?" and "which connection is
//! this person on right now?":
//!
//! 1. **One current connection per identity**: a second `session.join`
//!    for the same identity evicts the older connection
//!    ([`IdentityRegistry::join`]).
//! 2. **Reconnection window**: a dropped connection leaves the identity in
//!    `Disconnected` for [`SessionConfig::reconnect_grace`]. Coming back
//!    inside the window is the same presence; staying away longer expires it.
//! 3. **Presence**: online/away status and last-seen time for the lobby.
//!
//! # How it fits in the stack
//!
//! ```text
//! Engine (above)          ← routes lobby events here, fans out presence
//!     ↕
//! Session Layer (this)    ← identity ⇄ connection mapping
//!     ↕
//! Protocol Layer (below)  ← PlayerId, ConnectionId, PresenceEntry
//! ```

mod error;
mod manager;
mod session;

pub use error::SessionError;
pub use manager::IdentityRegistry;
pub use session::{Departure, Identity, JoinOutcome, Session, SessionConfig, SessionState};
