//! The identity registry: one current connection per identity.
//!
//! # Concurrency note
//!
//! `IdentityRegistry` is a plain owned struct with `&mut self` methods. The
//! engine task owns it outright, so eviction and acceptance happen inside a
//! single call and no other task can observe two current connections for
//! one identity.

use std::collections::HashMap;
use std::sync::Arc;

use scrawl_protocol::{ConnectionId, PlayerId, Presence, PresenceEntry};
use scrawl_timer::{SharedClock, SystemClock};

use crate::{Departure, Identity, JoinOutcome, Session, SessionConfig, SessionError, SessionState};

/// Tracks every identity seen by this process and which connection, if
/// any, currently speaks for it.
///
/// ## Lifecycle
///
/// ```text
/// join() ──→ [Connected] ──disconnect()──→ [Disconnected]
///               │    ↑                          │
///               │    └────── join() ────────────┤
///            leave()                      expire_stale()
///               ▼                               ▼
///           [Offline] ◀─────────────────── [Offline] ──→ cleanup_expired()
/// ```
pub struct IdentityRegistry {
    /// All known identities.
    identities: HashMap<PlayerId, Identity>,

    /// Reverse index: which identity each live connection is bound to.
    /// Kept in sync with `identities`: a connection appears here iff some
    /// identity is `Connected` to it.
    connections: HashMap<ConnectionId, PlayerId>,

    config: SessionConfig,
    clock: SharedClock,
}

impl IdentityRegistry {
    /// Creates an empty registry on the system clock.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates an empty registry on an injected clock.
    pub fn with_clock(config: SessionConfig, clock: SharedClock) -> Self {
        Self {
            identities: HashMap::new(),
            connections: HashMap::new(),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Binds `connection` to `identity`, evicting any other connection that
    /// currently speaks for it.
    ///
    /// # Errors
    /// Returns [`SessionError::ConnectionInUse`] if `connection` is already
    /// bound to a *different* identity.
    pub fn join(
        &mut self,
        connection: ConnectionId,
        identity: PlayerId,
        display_name: &str,
    ) -> Result<JoinOutcome, SessionError> {
        if let Some(bound) = self.connections.get(&connection) {
            if *bound != identity {
                return Err(SessionError::ConnectionInUse {
                    connection,
                    identity: bound.clone(),
                });
            }
            // Same connection, same identity: nothing to do.
            return Ok(JoinOutcome::default());
        }

        let now = self.clock.now();
        let last_seen = self.clock.unix_millis();
        let grace = self.config.reconnect_grace;

        let mut outcome = JoinOutcome::default();
        match self.identities.get(&identity).map(|i| i.state.clone()) {
            Some(SessionState::Connected { connection: old }) => {
                self.connections.remove(&old);
                outcome.evicted = Some(old);
                outcome.resumed = true;
                tracing::info!(%identity, evicted = %old, %connection, "connection taken over");
            }
            Some(SessionState::Disconnected { since }) => {
                if now.duration_since(since) <= grace {
                    outcome.resumed = true;
                    tracing::info!(%identity, %connection, "reconnected inside window");
                } else {
                    let display_name = self.identities[&identity].display_name.clone();
                    outcome.lapsed = Some(Departure {
                        identity: identity.clone(),
                        display_name,
                    });
                    tracing::info!(%identity, %connection, "reconnected after window elapsed");
                }
            }
            Some(SessionState::Offline) | None => {
                tracing::info!(%identity, %connection, "session joined");
            }
        }

        let status = match self.identities.get(&identity) {
            Some(existing) if outcome.resumed => existing.status,
            _ => Presence::Online,
        };
        self.identities.insert(
            identity.clone(),
            Identity {
                id: identity.clone(),
                display_name: display_name.to_string(),
                status,
                state: SessionState::Connected { connection },
                last_seen,
            },
        );
        self.connections.insert(connection, identity.clone());

        outcome.accepted = Some(Session {
            identity,
            display_name: display_name.to_string(),
            connection,
        });
        Ok(outcome)
    }

    /// Voluntary departure. Clears the mapping and marks the identity
    /// offline immediately.
    ///
    /// Returns `None` if the connection was not joined.
    pub fn leave(&mut self, connection: ConnectionId) -> Option<Departure> {
        let id = self.connections.remove(&connection)?;
        let last_seen = self.clock.unix_millis();
        let identity = self.identities.get_mut(&id)?;
        identity.state = SessionState::Offline;
        identity.status = Presence::Offline;
        identity.last_seen = last_seen;
        tracing::info!(identity = %id, %connection, "session left");
        Some(Departure {
            identity: id,
            display_name: identity.display_name.clone(),
        })
    }

    /// Involuntary drop. Starts the reconnection window; nothing is
    /// announced yet.
    ///
    /// Returns the identity the connection spoke for, or `None` if it never
    /// joined or was already evicted.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Option<PlayerId> {
        let id = self.connections.remove(&connection)?;
        let since = self.clock.now();
        let last_seen = self.clock.unix_millis();
        if let Some(identity) = self.identities.get_mut(&id) {
            identity.state = SessionState::Disconnected { since };
            identity.last_seen = last_seen;
        }
        tracing::info!(identity = %id, %connection, "connection dropped, window started");
        Some(id)
    }

    /// Updates presence status without touching the mapping.
    ///
    /// # Errors
    /// - [`SessionError::NotJoined`]: the connection has no identity
    /// - [`SessionError::InvalidStatus`]: `offline` was requested
    pub fn status(
        &mut self,
        connection: ConnectionId,
        status: Presence,
    ) -> Result<PresenceEntry, SessionError> {
        if status == Presence::Offline {
            return Err(SessionError::InvalidStatus(status));
        }
        let id = self
            .connections
            .get(&connection)
            .ok_or(SessionError::NotJoined(connection))?;
        let last_seen = self.clock.unix_millis();
        let identity = self
            .identities
            .get_mut(id)
            .ok_or(SessionError::NotJoined(connection))?;
        identity.status = status;
        identity.last_seen = last_seen;
        Ok(identity.entry())
    }

    /// Records activity from a connection.
    pub fn touch(&mut self, connection: ConnectionId) {
        let last_seen = self.clock.unix_millis();
        if let Some(identity) = self
            .connections
            .get(&connection)
            .and_then(|id| self.identities.get_mut(id))
        {
            identity.last_seen = last_seen;
        }
    }

    /// Moves every identity whose window has elapsed to `Offline`.
    ///
    /// Returns them so the caller can announce the departures and release
    /// their room seats before [`cleanup_expired`](Self::cleanup_expired)
    /// forgets them.
    pub fn expire_stale(&mut self) -> Vec<Departure> {
        let now = self.clock.now();
        let grace = self.config.reconnect_grace;
        let mut expired = Vec::new();

        for identity in self.identities.values_mut() {
            if let SessionState::Disconnected { since } = identity.state {
                if now.duration_since(since) > grace {
                    identity.state = SessionState::Offline;
                    identity.status = Presence::Offline;
                    tracing::info!(identity = %identity.id, "session expired (window elapsed)");
                    expired.push(Departure {
                        identity: identity.id.clone(),
                        display_name: identity.display_name.clone(),
                    });
                }
            }
        }

        expired
    }

    /// Forgets offline identities once they have been gone for longer than
    /// the reconnection window.
    pub fn cleanup_expired(&mut self) {
        let now = self.clock.unix_millis();
        let grace = self.config.reconnect_grace.as_millis() as u64;
        self.identities.retain(|_, identity| {
            identity.is_present() || now.saturating_sub(identity.last_seen) <= grace
        });
    }

    /// The identity a connection speaks for.
    pub fn identity_of(&self, connection: ConnectionId) -> Option<&Identity> {
        self.connections
            .get(&connection)
            .and_then(|id| self.identities.get(id))
    }

    /// The connection currently speaking for an identity.
    pub fn current_connection(&self, identity: &PlayerId) -> Option<ConnectionId> {
        self.identities.get(identity).and_then(Identity::connection)
    }

    pub fn get(&self, identity: &PlayerId) -> Option<&Identity> {
        self.identities.get(identity)
    }

    /// Every connection bound to an identity: the lobby audience.
    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.keys().copied()
    }

    /// Present identities, ordered by display name.
    pub fn presence(&self) -> Vec<PresenceEntry> {
        let mut entries: Vec<_> = self
            .identities
            .values()
            .filter(|i| i.is_present())
            .map(Identity::entry)
            .collect();
        entries.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        entries
    }

    /// Number of known identities (any state).
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
