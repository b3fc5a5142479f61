//! Pub/Sub Subscription Registry
//!
//! Channel membership is stored as ordinary set values in the admin
//! database, so it follows the same locking rules as every other key:
//!
//! ```text
//!   admin db
//!   ├── channel:news     -> { session-a, session-b }
//!   ├── channel:sports   -> { session-b }
//!   ├── session:session-a -> { news }
//!   └── session:session-b -> { news, sports }
//! ```
//!
//! Delivery is not done here. [`publish`] hands each message to a
//! [`MessageSink`], which the transport implements by pushing onto the
//! subscriber's connection.

use crate::protocol::RespValue;
use crate::storage::{Database, Entry, Value, Write};
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashSet;
use std::convert::Infallible;

const CHANNEL_PREFIX: &[u8] = b"channel:";
const SESSION_PREFIX: &[u8] = b"session:";

/// Receives published messages on behalf of connected sessions.
pub trait MessageSink: Send + Sync {
    /// Queues `message` for the session. Returns `false` if the session is
    /// gone and the message was dropped.
    fn deliver(&self, session_id: &str, message: RespValue) -> bool;
}

fn prefixed(prefix: &[u8], name: &[u8]) -> Bytes {
    let mut key = BytesMut::with_capacity(prefix.len() + name.len());
    key.put_slice(prefix);
    key.put_slice(name);
    key.freeze()
}

fn channel_key(channel: &[u8]) -> Bytes {
    prefixed(CHANNEL_PREFIX, channel)
}

fn session_key(session_id: &str) -> Bytes {
    prefixed(SESSION_PREFIX, session_id.as_bytes())
}

/// Adds `member` to the set at `key`, creating it if needed.
fn add_member(admin: &Database, key: &Bytes, member: Bytes) {
    admin
        .update(key, |current| {
            let mut members = match current.map(|e| &e.value) {
                Some(Value::Set(set)) => set.clone(),
                _ => HashSet::new(),
            };
            members.insert(member);
            Ok::<_, Infallible>((Write::Put(Entry::new(Value::Set(members))), ()))
        })
        .unwrap_or_else(|never| match never {})
}

/// Removes `member` from the set at `key`, dropping the key once empty.
fn remove_member(admin: &Database, key: &Bytes, member: &[u8]) {
    admin
        .update(key, |current| {
            let Some(Value::Set(set)) = current.map(|e| &e.value) else {
                return Ok::<_, Infallible>((Write::Keep, ()));
            };
            if !set.contains(member) {
                return Ok((Write::Keep, ()));
            }
            let mut members = set.clone();
            members.remove(member);
            Ok((Write::store(Value::Set(members), None), ()))
        })
        .unwrap_or_else(|never| match never {})
}

fn members(admin: &Database, key: &[u8]) -> Vec<Bytes> {
    let mut members: Vec<Bytes> = admin.read(key, |entry| match entry.map(|e| &e.value) {
        Some(Value::Set(set)) => set.iter().cloned().collect(),
        _ => Vec::new(),
    });
    members.sort();
    members
}

/// Records that `session_id` follows `channel`.
pub fn subscribe(admin: &Database, session_id: &str, channel: &Bytes) {
    add_member(admin, &channel_key(channel), Bytes::copy_from_slice(session_id.as_bytes()));
    add_member(admin, &session_key(session_id), channel.clone());
}

/// Records that `session_id` no longer follows `channel`.
pub fn unsubscribe(admin: &Database, session_id: &str, channel: &[u8]) {
    remove_member(admin, &channel_key(channel), session_id.as_bytes());
    remove_member(admin, &session_key(session_id), channel);
}

/// Removes every trace of a session. Called when its connection goes away.
/// Returns the channels it was following.
pub fn unsubscribe_all(admin: &Database, session_id: &str) -> Vec<Bytes> {
    let channels = channels_of(admin, session_id);
    for channel in &channels {
        remove_member(admin, &channel_key(channel), session_id.as_bytes());
    }
    admin.remove(&session_key(session_id));
    channels
}

/// Session ids currently subscribed to `channel`.
pub fn subscribers(admin: &Database, channel: &[u8]) -> Vec<String> {
    members(admin, &channel_key(channel))
        .into_iter()
        .map(|id| String::from_utf8_lossy(&id).into_owned())
        .collect()
}

/// Channels `session_id` follows according to the admin database.
pub fn channels_of(admin: &Database, session_id: &str) -> Vec<Bytes> {
    members(admin, &session_key(session_id))
}

/// Number of channels with at least one subscriber.
pub fn channel_count(admin: &Database) -> usize {
    admin
        .keys()
        .iter()
        .filter(|key| key.starts_with(CHANNEL_PREFIX))
        .count()
}

/// The push frame a subscriber receives.
pub fn message_frame(channel: &Bytes, message: &Bytes) -> RespValue {
    RespValue::array(vec![
        RespValue::bulk_string(Bytes::from_static(b"message")),
        RespValue::BulkString(channel.clone()),
        RespValue::BulkString(message.clone()),
    ])
}

/// Fans `message` out to the current subscribers of `channel`. Returns how
/// many sessions accepted it.
pub fn publish(admin: &Database, sink: &dyn MessageSink, channel: &Bytes, message: &Bytes) -> usize {
    let frame = message_frame(channel, message);
    subscribers(admin, channel)
        .iter()
        .filter(|session_id| sink.deliver(session_id, frame.clone()))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<(String, RespValue)>>,
        offline: Vec<String>,
    }

    impl MessageSink for RecordingSink {
        fn deliver(&self, session_id: &str, message: RespValue) -> bool {
            if self.offline.iter().any(|id| id == session_id) {
                return false;
            }
            self.delivered.lock().push((session_id.to_string(), message));
            true
        }
    }

    fn ch(name: &'static str) -> Bytes {
        Bytes::from_static(name.as_bytes())
    }

    #[test]
    fn test_subscribe_is_mirrored_both_ways() {
        let admin = Database::new();
        subscribe(&admin, "s1", &ch("news"));
        subscribe(&admin, "s1", &ch("sports"));
        subscribe(&admin, "s2", &ch("news"));

        assert_eq!(subscribers(&admin, b"news"), vec!["s1", "s2"]);
        assert_eq!(channels_of(&admin, "s1"), vec![ch("news"), ch("sports")]);
        assert_eq!(channel_count(&admin), 2);
    }

    #[test]
    fn test_unsubscribe_drops_empty_sets() {
        let admin = Database::new();
        subscribe(&admin, "s1", &ch("news"));
        unsubscribe(&admin, "s1", b"news");

        assert!(subscribers(&admin, b"news").is_empty());
        assert!(admin.is_empty());
    }

    #[test]
    fn test_unsubscribe_all() {
        let admin = Database::new();
        subscribe(&admin, "s1", &ch("a"));
        subscribe(&admin, "s1", &ch("b"));
        subscribe(&admin, "s2", &ch("b"));

        assert_eq!(unsubscribe_all(&admin, "s1"), vec![ch("a"), ch("b")]);
        assert!(subscribers(&admin, b"a").is_empty());
        assert_eq!(subscribers(&admin, b"b"), vec!["s2"]);
        assert!(channels_of(&admin, "s1").is_empty());
    }

    #[test]
    fn test_publish_counts_current_subscribers() {
        let admin = Database::new();
        let sink = RecordingSink::default();
        subscribe(&admin, "s1", &ch("news"));
        subscribe(&admin, "s2", &ch("news"));
        subscribe(&admin, "s3", &ch("news"));
        unsubscribe(&admin, "s3", b"news");

        assert_eq!(publish(&admin, &sink, &ch("news"), &ch("hello")), 2);
        let delivered = sink.delivered.lock();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].1, message_frame(&ch("news"), &ch("hello")));
        assert_eq!(publish(&admin, &sink, &ch("empty"), &ch("x")), 0);
    }

    #[test]
    fn test_publish_skips_undeliverable_sessions() {
        let admin = Database::new();
        let sink = RecordingSink {
            offline: vec!["gone".to_string()],
            ..Default::default()
        };
        subscribe(&admin, "gone", &ch("news"));
        subscribe(&admin, "here", &ch("news"));

        assert_eq!(publish(&admin, &sink, &ch("news"), &ch("hi")), 1);
    }
}
