//! Pub/Sub commands: `SUBSCRIBE`, `UNSUBSCRIBE`, `PUBLISH`.
//!
//! Subscription replies are arrays of 3-tuples; the connection writes each
//! tuple as its own frame.

use crate::commands::request::Request;
use crate::commands::table::{Arity, CommandSpec, CommandTable};
use crate::error::CommandResult;
use crate::protocol::RespValue;
use crate::pubsub;
use crate::storage::Database;
use bytes::Bytes;

pub fn register(table: &mut CommandTable) {
    table.register(
        CommandSpec::read("subscribe", Arity::AtLeast(0), subscribe)
            .pubsub()
            .no_script()
            .split_reply(),
    );
    table.register(
        CommandSpec::read("unsubscribe", Arity::AtLeast(0), unsubscribe)
            .pubsub()
            .no_script()
            .split_reply(),
    );
    table.register(CommandSpec::read("publish", Arity::Exact(2), publish));
}

fn tuple(kind: &'static str, channel: Option<Bytes>, count: usize) -> RespValue {
    RespValue::array(vec![
        RespValue::bulk_string(Bytes::from_static(kind.as_bytes())),
        RespValue::optional(channel),
        RespValue::integer(count as i64),
    ])
}

/// SUBSCRIBE [channel ...]
///
/// Without channels the session's current subscriptions are confirmed
/// again. The count in each tuple runs from 1 within one call.
fn subscribe(_db: &Database, req: &Request<'_>) -> CommandResult {
    let session = req.session();
    let admin = req.context().admin();
    let channels = if req.is_empty() {
        session.subscriptions()
    } else {
        req.params().to_vec()
    };

    let replies = channels
        .into_iter()
        .enumerate()
        .map(|(i, channel)| {
            pubsub::subscribe(admin, session.id(), &channel);
            session.add_subscription(channel.clone());
            tuple("subscribe", Some(channel), i + 1)
        })
        .collect();
    Ok(RespValue::array(replies))
}

/// UNSUBSCRIBE [channel ...]
///
/// Without channels every subscription is dropped. Each tuple carries the
/// number of channels the session still follows.
fn unsubscribe(_db: &Database, req: &Request<'_>) -> CommandResult {
    let session = req.session();
    let admin = req.context().admin();
    let channels = if req.is_empty() {
        session.subscriptions()
    } else {
        req.params().to_vec()
    };

    if channels.is_empty() {
        return Ok(RespValue::array(vec![tuple("unsubscribe", None, 0)]));
    }

    let replies = channels
        .into_iter()
        .map(|channel| {
            pubsub::unsubscribe(admin, session.id(), &channel);
            session.remove_subscription(&channel);
            tuple("unsubscribe", Some(channel), session.subscription_count())
        })
        .collect();
    Ok(RespValue::array(replies))
}

/// PUBLISH channel message. Replies with the number of sessions reached.
fn publish(_db: &Database, req: &Request<'_>) -> CommandResult {
    let context = req.context();
    let delivered = pubsub::publish(
        context.admin(),
        context.clients(),
        req.param(0)?,
        req.param(1)?,
    );
    Ok(RespValue::integer(delivered as i64))
}
