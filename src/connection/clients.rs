//! Registry of connected clients.
//!
//! Each connection registers a bounded channel under its session id.
//! Anything that needs to push an out-of-band frame to a client (published
//! messages, for now) looks the sender up here. A client that stops reading
//! fills its queue, and further pushes to it are dropped.

use crate::protocol::RespValue;
use crate::pubsub::MessageSink;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tracing::{trace, warn};

/// Pending pushes a single client may have queued.
pub const PUSH_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, Sender<RespValue>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session and returns the receiving end of its push queue.
    pub fn register(&self, session_id: &str) -> Receiver<RespValue> {
        let (tx, rx) = mpsc::channel(PUSH_QUEUE_CAPACITY);
        self.clients.write().insert(session_id.to_string(), tx);
        rx
    }

    pub fn unregister(&self, session_id: &str) -> bool {
        self.clients.write().remove(session_id).is_some()
    }

    /// Number of connected clients.
    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}

impl MessageSink for ClientRegistry {
    fn deliver(&self, session_id: &str, message: RespValue) -> bool {
        let clients = self.clients.read();
        match clients.get(session_id) {
            Some(tx) => match tx.try_send(message) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(session = session_id, "Push queue full, dropping message");
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            },
            None => {
                trace!(session = session_id, "Dropping message for unknown session");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_deliver() {
        let registry = ClientRegistry::new();
        let mut rx = registry.register("s1");
        assert_eq!(registry.len(), 1);

        assert!(registry.deliver("s1", RespValue::integer(7)));
        assert_eq!(rx.try_recv().unwrap(), RespValue::integer(7));
        assert!(!registry.deliver("nobody", RespValue::Null));
    }

    #[test]
    fn test_unregister() {
        let registry = ClientRegistry::new();
        let _rx = registry.register("s1");
        assert!(registry.unregister("s1"));
        assert!(!registry.unregister("s1"));
        assert!(registry.is_empty());
        assert!(!registry.deliver("s1", RespValue::Null));
    }

    #[test]
    fn test_deliver_to_dropped_receiver_fails() {
        let registry = ClientRegistry::new();
        drop(registry.register("s1"));
        assert!(!registry.deliver("s1", RespValue::Null));
    }

    #[test]
    fn test_full_queue_drops_pushes() {
        let registry = ClientRegistry::new();
        let mut rx = registry.register("slow");

        for i in 0..PUSH_QUEUE_CAPACITY {
            assert!(registry.deliver("slow", RespValue::integer(i as i64)));
        }
        assert!(!registry.deliver("slow", RespValue::integer(-1)));

        // Draining one slot makes room again
        assert_eq!(rx.try_recv().unwrap(), RespValue::integer(0));
        assert!(registry.deliver("slow", RespValue::integer(-2)));
        assert!(!registry.deliver("slow", RespValue::integer(-3)));
    }

    #[test]
    fn test_publish_counts_only_accepted_pushes() {
        use crate::pubsub;
        use crate::storage::Database;
        use bytes::Bytes;

        let admin = Database::new();
        let registry = ClientRegistry::new();
        let _slow = registry.register("slow");
        let mut fast = registry.register("fast");
        let news = Bytes::from_static(b"news");
        pubsub::subscribe(&admin, "slow", &news);
        pubsub::subscribe(&admin, "fast", &news);

        for _ in 0..PUSH_QUEUE_CAPACITY {
            registry.deliver("slow", RespValue::Null);
        }

        let hello = Bytes::from_static(b"hello");
        assert_eq!(pubsub::publish(&admin, &registry, &news, &hello), 1);
        assert!(fast.try_recv().is_ok());
        assert!(fast.try_recv().is_err());
    }
}
