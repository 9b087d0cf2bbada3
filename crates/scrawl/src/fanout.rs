//! Outbound delivery: one queue per connection, one encode per message.
//!
//! The engine never touches a socket. Each connection handler registers an
//! unbounded queue here and runs a writer task that drains it in order, so
//! a slow client can only ever stall its own writer.

use std::collections::HashMap;
use std::sync::Arc;

use scrawl_protocol::{Codec, ConnectionId, Envelope, JsonCodec, ServerMessage};
use scrawl_timer::SharedClock;
use tokio::sync::mpsc;

/// WebSocket close code sent to a connection replaced by a newer one.
pub const EVICTED_CLOSE_CODE: u16 = 4001;

/// One item in a connection's outbound queue.
#[derive(Debug, Clone)]
pub enum Outgoing {
    /// An encoded envelope, shared between every recipient of a broadcast.
    Frame(Arc<[u8]>),
    /// Close the connection after everything queued before it is written.
    Close { code: u16, reason: String },
}

pub type OutgoingSender = mpsc::UnboundedSender<Outgoing>;
pub type OutgoingReceiver = mpsc::UnboundedReceiver<Outgoing>;

/// The set of registered connection queues.
pub struct Fanout<C: Codec = JsonCodec> {
    sinks: HashMap<ConnectionId, OutgoingSender>,
    codec: C,
    clock: SharedClock,
    started: u64,
    seq: u64,
}

impl<C: Codec> Fanout<C> {
    pub fn new(codec: C, clock: SharedClock) -> Self {
        let started = clock.unix_millis();
        Self {
            sinks: HashMap::new(),
            codec,
            clock,
            started,
            seq: 0,
        }
    }

    pub fn register(&mut self, connection: ConnectionId, sink: OutgoingSender) {
        self.sinks.insert(connection, sink);
    }

    /// Drops the queue. Frames already queued are still written.
    pub fn unregister(&mut self, connection: ConnectionId) -> bool {
        self.sinks.remove(&connection).is_some()
    }

    pub fn is_registered(&self, connection: ConnectionId) -> bool {
        self.sinks.contains_key(&connection)
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn send(&mut self, connection: ConnectionId, message: &ServerMessage) {
        self.broadcast(std::iter::once(connection), message);
    }

    /// Encodes `message` once and queues the same bytes for every target.
    pub fn broadcast<I>(&mut self, targets: I, message: &ServerMessage)
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        let mut targets = targets.into_iter().peekable();
        if targets.peek().is_none() {
            return;
        }
        let Some(frame) = self.encode(message) else {
            return;
        };
        for connection in targets {
            self.push(connection, Outgoing::Frame(Arc::clone(&frame)));
        }
    }

    /// Queues a close after whatever is already pending for `connection`.
    pub fn close(&mut self, connection: ConnectionId, code: u16, reason: &str) {
        self.push(
            connection,
            Outgoing::Close {
                code,
                reason: reason.to_string(),
            },
        );
    }

    fn encode(&mut self, message: &ServerMessage) -> Option<Arc<[u8]>> {
        self.seq += 1;
        let envelope = Envelope {
            seq: self.seq,
            timestamp: self.clock.unix_millis().saturating_sub(self.started),
            payload: message,
        };
        match self.codec.encode(&envelope) {
            Ok(bytes) => Some(bytes.into()),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode outbound message");
                None
            }
        }
    }

    fn push(&mut self, connection: ConnectionId, item: Outgoing) {
        let Some(sink) = self.sinks.get(&connection) else {
            tracing::debug!(%connection, "no queue for connection, frame skipped");
            return;
        };
        if sink.send(item).is_err() {
            tracing::warn!(%connection, "writer gone, frame dropped");
            self.sinks.remove(&connection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrawl_protocol::PlayerId;
    use scrawl_timer::ManualClock;

    fn fanout() -> Fanout {
        Fanout::new(JsonCodec, Arc::new(ManualClock::new()))
    }

    fn conn(n: u64) -> ConnectionId {
        ConnectionId::new(n)
    }

    fn ack() -> ServerMessage {
        ServerMessage::HeartbeatAck {
            client_time: 1,
            server_time: 2,
        }
    }

    fn decode(item: Outgoing) -> Envelope<ServerMessage> {
        match item {
            Outgoing::Frame(bytes) => JsonCodec.decode(&bytes).unwrap(),
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_broadcast_shares_one_encoding() {
        let mut fanout = fanout();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        fanout.register(conn(1), tx1);
        fanout.register(conn(2), tx2);

        fanout.broadcast([conn(1), conn(2)], &ack());

        let (Outgoing::Frame(a), Outgoing::Frame(b)) = (rx1.try_recv().unwrap(), rx2.try_recv().unwrap())
        else {
            panic!("expected frames");
        };
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_send_numbers_messages_in_order() {
        let mut fanout = fanout();
        let (tx, mut rx) = mpsc::unbounded_channel();
        fanout.register(conn(1), tx);

        fanout.send(conn(1), &ack());
        fanout.send(
            conn(1),
            &ServerMessage::Evicted {
                reason: "replaced".into(),
            },
        );

        let first = decode(rx.try_recv().unwrap());
        let second = decode(rx.try_recv().unwrap());
        assert!(first.seq < second.seq);
        assert_eq!(first.payload, ack());
    }

    #[test]
    fn test_close_queued_after_frames() {
        let mut fanout = fanout();
        let (tx, mut rx) = mpsc::unbounded_channel();
        fanout.register(conn(1), tx);

        fanout.send(
            conn(1),
            &ServerMessage::Evicted {
                reason: "replaced".into(),
            },
        );
        fanout.close(conn(1), EVICTED_CLOSE_CODE, "replaced");

        assert!(matches!(rx.try_recv().unwrap(), Outgoing::Frame(_)));
        assert!(matches!(
            rx.try_recv().unwrap(),
            Outgoing::Close { code: EVICTED_CLOSE_CODE, .. }
        ));
    }

    #[test]
    fn test_send_to_unknown_connection_is_noop() {
        let mut fanout = fanout();
        fanout.send(conn(9), &ack());
        assert!(fanout.is_empty());
    }

    #[test]
    fn test_dead_writer_unregistered_on_send() {
        let mut fanout = fanout();
        let (tx, rx) = mpsc::unbounded_channel();
        fanout.register(conn(1), tx);
        drop(rx);

        fanout.send(
            conn(1),
            &ServerMessage::PresenceLeft {
                identity: PlayerId::new("u1"),
                display_name: "Ann".into(),
            },
        );
        assert!(!fanout.is_registered(conn(1)));
    }

    #[test]
    fn test_unregister_keeps_queued_frames() {
        let mut fanout = fanout();
        let (tx, mut rx) = mpsc::unbounded_channel();
        fanout.register(conn(1), tx);
        fanout.send(conn(1), &ack());

        assert!(fanout.unregister(conn(1)));
        assert!(matches!(rx.try_recv().unwrap(), Outgoing::Frame(_)));
        assert!(rx.try_recv().is_err());
    }
}
