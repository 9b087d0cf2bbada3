//! Per-connection handler: decode inbound frames, drain the outbound queue.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register an outbound queue with the engine
//!   2. Spawn a writer task that drains the queue onto the socket
//!   3. Loop: receive frames → decode once → forward to the engine
//!   4. On exit, tell the engine the connection is gone

use std::sync::Arc;
use std::time::Duration;

use scrawl_protocol::{ClientMessage, Codec, ConnectionId, Envelope, JsonCodec};
use scrawl_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;

use crate::ScrawlError;
use crate::engine::{EngineHandle, EngineInput};
use crate::fanout::{Outgoing, OutgoingReceiver};

/// WebSocket close code sent to a connection that stayed silent too long.
pub const IDLE_CLOSE_CODE: u16 = 4000;

/// Drop guard that reports the connection closed when the handler exits.
///
/// This ensures the engine hears about it even if the handler panics.
/// The engine inbox is unbounded, so the send never blocks in `Drop`.
struct ClosedGuard {
    connection: ConnectionId,
    engine: EngineHandle,
}

impl Drop for ClosedGuard {
    fn drop(&mut self) {
        self.engine.send(EngineInput::Closed {
            connection: self.connection,
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    engine: EngineHandle,
    codec: JsonCodec,
    idle_timeout: Duration,
) -> Result<(), ScrawlError> {
    let conn = Arc::new(conn);
    let connection = conn.id();
    tracing::debug!(%connection, "handling new connection");

    let (sink, queue) = mpsc::unbounded_channel();
    if !engine.send(EngineInput::Connected { connection, sink }) {
        conn.close().await?;
        return Ok(());
    }
    let _guard = ClosedGuard {
        connection,
        engine: engine.clone(),
    };

    let mut writer = tokio::spawn(write_loop(Arc::clone(&conn), queue));

    loop {
        let data = tokio::select! {
            // The writer stops after a close or a failed send; either way
            // this connection is finished.
            _ = &mut writer => {
                tracing::debug!(%connection, "writer finished");
                return Ok(());
            }
            result = tokio::time::timeout(idle_timeout, conn.recv()) => match result {
                Ok(Ok(Some(data))) => data,
                Ok(Ok(None)) => {
                    tracing::info!(%connection, "connection closed cleanly");
                    break;
                }
                Ok(Err(e)) => {
                    tracing::debug!(%connection, error = %e, "recv error");
                    break;
                }
                Err(_) => {
                    tracing::info!(%connection, "connection idle, closing");
                    let _ = conn.close_with(IDLE_CLOSE_CODE, "idle timeout").await;
                    break;
                }
            },
        };

        let input = match codec.decode::<Envelope<ClientMessage>>(&data) {
            Ok(envelope) => EngineInput::Inbound {
                connection,
                message: envelope.payload,
            },
            Err(e) => {
                tracing::debug!(%connection, error = %e, "failed to decode envelope");
                EngineInput::Malformed {
                    connection,
                    error: e.to_string(),
                }
            }
        };
        if !engine.send(input) {
            tracing::warn!(%connection, "engine stopped, dropping connection");
            break;
        }
    }

    writer.abort();
    // _guard drops here → engine hears Closed.
    Ok(())
}

/// Drains the outbound queue in order until it closes or a send fails.
async fn write_loop(conn: Arc<WebSocketConnection>, mut queue: OutgoingReceiver) {
    let connection = conn.id();
    while let Some(item) = queue.recv().await {
        match item {
            Outgoing::Frame(bytes) => {
                if let Err(e) = conn.send(&bytes).await {
                    tracing::debug!(%connection, error = %e, "send failed, stopping writer");
                    return;
                }
            }
            Outgoing::Close { code, reason } => {
                tracing::info!(%connection, code, %reason, "closing connection");
                if let Err(e) = conn.close_with(code, &reason).await {
                    tracing::debug!(%connection, error = %e, "close failed");
                }
                return;
            }
        }
    }
}
