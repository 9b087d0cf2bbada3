//! `ScrawlServer` builder and server loop.
//!
//! This is the entry point for running a Scrawl server. It ties together
//! all the layers: transport → protocol → engine (sessions + rooms).

use std::time::Duration;

use scrawl_protocol::JsonCodec;
use scrawl_room::{GameConfig, RoomConfig};
use scrawl_session::SessionConfig;
use scrawl_transport::{Transport, WebSocketTransport};

use crate::ScrawlError;
use crate::engine::{Engine, EngineHandle};
use crate::handler::handle_connection;

/// A connection that sends nothing (not even a heartbeat) for this long is
/// closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for configuring and starting a Scrawl server.
///
/// # Example
///
/// ```rust,ignore
/// use scrawl::prelude::*;
///
/// let server = ScrawlServer::builder()
///     .bind("0.0.0.0:8080")
///     .game_config(GameConfig { max_rounds: 5, ..GameConfig::default() })
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct ScrawlServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
    room_config: RoomConfig,
    game_config: GameConfig,
    idle_timeout: Duration,
}

impl ScrawlServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            session_config: SessionConfig::default(),
            room_config: RoomConfig::default(),
            game_config: GameConfig::default(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    pub fn game_config(mut self, config: GameConfig) -> Self {
        self.game_config = config;
        self
    }

    /// How long a connection may stay silent before it is closed.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Binds the listener and prepares the engine.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<ScrawlServer, ScrawlError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let (engine, handle) = Engine::new(self.session_config, self.room_config, self.game_config);

        Ok(ScrawlServer {
            transport,
            engine,
            handle,
            idle_timeout: self.idle_timeout,
        })
    }
}

impl Default for ScrawlServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Scrawl server.
///
/// Call [`run()`](Self::run) to start the engine and accept connections.
pub struct ScrawlServer {
    transport: WebSocketTransport,
    engine: Engine,
    handle: EngineHandle,
    idle_timeout: Duration,
}

impl ScrawlServer {
    /// Creates a new builder.
    pub fn builder() -> ScrawlServerBuilder {
        ScrawlServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Spawns the engine task, then runs the accept loop.
    ///
    /// Spawns a handler task for each accepted connection. Runs until the
    /// process is terminated.
    pub async fn run(self) -> Result<(), ScrawlError> {
        let Self {
            mut transport,
            engine,
            handle,
            idle_timeout,
        } = self;

        tokio::spawn(engine.run());
        tracing::info!("Scrawl server running");

        loop {
            match transport.accept().await {
                Ok(conn) => {
                    let engine = handle.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, engine, JsonCodec, idle_timeout).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
