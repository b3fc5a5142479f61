//! Client sessions.
//!
//! A [`Session`] lives exactly as long as one client connection. It carries
//! the selected database index and a local mirror of the channels the client
//! follows; the authoritative subscriber sets live in the admin database.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use uuid::Uuid;

#[derive(Debug, Default)]
struct SessionState {
    db: usize,
    subscriptions: BTreeSet<Bytes>,
    closing: bool,
}

/// Connection-scoped state shared between the connection task and the
/// command handlers it invokes.
#[derive(Debug)]
pub struct Session {
    id: String,
    addr: Option<SocketAddr>,
    state: Mutex<SessionState>,
}

impl Session {
    /// Creates a session with a fresh random id, bound to database 0.
    pub fn new(addr: Option<SocketAddr>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), addr)
    }

    pub fn with_id(id: impl Into<String>, addr: Option<SocketAddr>) -> Self {
        Self {
            id: id.into(),
            addr,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    /// Index of the selected database.
    pub fn db(&self) -> usize {
        self.state.lock().db
    }

    /// Switches the selected database. The caller has already bounds-checked.
    pub fn select(&self, index: usize) {
        self.state.lock().db = index;
    }

    /// Channels this session follows, in byte order.
    pub fn subscriptions(&self) -> Vec<Bytes> {
        self.state.lock().subscriptions.iter().cloned().collect()
    }

    pub fn add_subscription(&self, channel: Bytes) -> bool {
        self.state.lock().subscriptions.insert(channel)
    }

    pub fn remove_subscription(&self, channel: &[u8]) -> bool {
        self.state.lock().subscriptions.remove(channel)
    }

    pub fn clear_subscriptions(&self) {
        self.state.lock().subscriptions.clear();
    }

    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    /// True while at least one channel is subscribed.
    pub fn is_subscriber(&self) -> bool {
        !self.state.lock().subscriptions.is_empty()
    }

    /// Asks the connection to close after the current reply.
    pub fn close(&self) {
        self.state.lock().closing = true;
    }

    pub fn is_closing(&self) -> bool {
        self.state.lock().closing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sessions_have_distinct_ids() {
        let a = Session::new(None);
        let b = Session::new(None);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.db(), 0);
        assert!(!a.is_subscriber());
    }

    #[test]
    fn test_select() {
        let session = Session::with_id("s1", None);
        session.select(3);
        assert_eq!(session.db(), 3);
    }

    #[test]
    fn test_subscription_mirror() {
        let session = Session::with_id("s1", None);
        assert!(session.add_subscription(Bytes::from("b")));
        assert!(session.add_subscription(Bytes::from("a")));
        assert!(!session.add_subscription(Bytes::from("a")));

        assert!(session.is_subscriber());
        assert_eq!(session.subscriptions(), vec![Bytes::from("a"), Bytes::from("b")]);

        assert!(session.remove_subscription(b"a"));
        assert_eq!(session.subscription_count(), 1);
        session.clear_subscriptions();
        assert!(!session.is_subscriber());
    }

    #[test]
    fn test_close_flag() {
        let session = Session::with_id("s1", None);
        assert!(!session.is_closing());
        session.close();
        assert!(session.is_closing());
    }
}
