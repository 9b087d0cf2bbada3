//! Session types: the records the registry keeps per identity.

use std::time::Duration;

use scrawl_protocol::{ConnectionId, PlayerId, Presence, PresenceEntry};
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for identity tracking.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a dropped identity keeps its presence before it is
    /// announced as gone.
    ///
    /// Default: 30 seconds, the same as the drawer grace period.
    pub reconnect_grace: Duration,

    /// How often the engine runs [`expire_stale`](crate::IdentityRegistry::expire_stale).
    ///
    /// Default: 5 seconds.
    pub expiry_check_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::from_secs(30),
            expiry_check_interval: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Connection state of one identity.
///
/// ```text
///   Connected ──(disconnect)──→ Disconnected ──(window elapses)──→ Offline
///       ↑  ↖                         │                               │
///       │   └──────(join, fast)──────┘                               │
///       └───────────────────────(join)───────────────────────────────┘
///   Connected ──(leave)──→ Offline
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Bound to exactly this connection.
    Connected { connection: ConnectionId },

    /// Lost its connection at `since`; still counts as present.
    Disconnected { since: Instant },

    /// Gone. Kept only until [`cleanup_expired`](crate::IdentityRegistry::cleanup_expired).
    Offline,
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Everything the registry knows about one identity.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: PlayerId,
    pub display_name: String,
    pub status: Presence,
    pub state: SessionState,
    /// Unix milliseconds of the last activity.
    pub last_seen: u64,
}

impl Identity {
    pub fn connection(&self) -> Option<ConnectionId> {
        match self.state {
            SessionState::Connected { connection } => Some(connection),
            _ => None,
        }
    }

    pub fn is_present(&self) -> bool {
        !matches!(self.state, SessionState::Offline)
    }

    pub fn entry(&self) -> PresenceEntry {
        PresenceEntry {
            identity: self.id.clone(),
            display_name: self.display_name.clone(),
            status: self.status,
            last_seen: self.last_seen,
        }
    }
}

// ---------------------------------------------------------------------------
// Operation results
// ---------------------------------------------------------------------------

/// A freshly accepted binding of identity to connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: PlayerId,
    pub display_name: String,
    pub connection: ConnectionId,
}

/// What [`IdentityRegistry::join`](crate::IdentityRegistry::join) did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinOutcome {
    /// `None` when the identity was already bound to this very connection:
    /// nothing changed, resend cached state instead of re-announcing.
    pub accepted: Option<Session>,

    /// The previous connection, which must be notified and closed before
    /// the new presence is broadcast.
    pub evicted: Option<ConnectionId>,

    /// The identity never stopped being present (connection takeover or a
    /// reconnect inside the window). Announce as an update, not a join.
    pub resumed: bool,

    /// The identity came back after its window elapsed but before the
    /// expiry sweep noticed. Its departure must be announced first.
    pub lapsed: Option<Departure>,
}

/// An identity that stopped being present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub identity: PlayerId,
    pub display_name: String,
}
