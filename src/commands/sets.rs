//! Set commands.
//!
//! Multi-key operations (`SINTER`, `SUNION`, `SDIFF`) read each key on its
//! own; they are not atomic across keys. A missing key reads as the empty
//! set and a key of another type fails the whole command.

use crate::commands::request::Request;
use crate::commands::table::{Arity, CommandSpec, CommandTable};
use crate::error::CommandResult;
use crate::protocol::RespValue;
use crate::storage::value::{set_difference, set_intersection, set_union};
use crate::storage::{Database, Entry, Value, Write};
use bytes::Bytes;
use std::collections::HashSet;

pub fn register(table: &mut CommandTable) {
    table.register(CommandSpec::write("sadd", Arity::AtLeast(2), sadd));
    table.register(CommandSpec::write("srem", Arity::AtLeast(2), srem));
    table.register(CommandSpec::read("smembers", Arity::Exact(1), smembers));
    table.register(CommandSpec::read("sismember", Arity::Exact(2), sismember));
    table.register(CommandSpec::read("scard", Arity::Exact(1), scard));
    table.register(CommandSpec::read("sinter", Arity::AtLeast(1), sinter));
    table.register(CommandSpec::read("sunion", Arity::AtLeast(1), sunion));
    table.register(CommandSpec::read("sdiff", Arity::AtLeast(1), sdiff));
}

/// Runs `f` on the set at `key` in place. A missing key reads as the
/// empty set.
fn with_set<T>(db: &Database, key: &[u8], f: impl FnOnce(&HashSet<Bytes>) -> T) -> CommandResult<T> {
    db.read(key, |entry| match entry {
        Some(entry) => entry.value.as_set().map(f),
        None => Ok(f(&HashSet::new())),
    })
}

fn read_sets(db: &Database, keys: &[Bytes]) -> CommandResult<Vec<HashSet<Bytes>>> {
    keys.iter().map(|key| with_set(db, key, |set| set.clone())).collect()
}

fn sorted_members<'a>(set: impl IntoIterator<Item = &'a Bytes>) -> RespValue {
    let mut members: Vec<Bytes> = set.into_iter().cloned().collect();
    members.sort();
    RespValue::bulk_array(members)
}

/// SADD key member [member ...]
fn sadd(db: &Database, req: &Request<'_>) -> CommandResult {
    let members = req.params_from(1);
    db.update(req.param(0)?, |current| {
        let (mut set, expires_at) = match current {
            Some(entry) => (entry.value.as_set()?.clone(), entry.expires_at),
            None => (HashSet::new(), None),
        };
        let added = members
            .iter()
            .filter(|member| set.insert((*member).clone()))
            .count();
        let entry = Entry::with_expiry(Value::Set(set), expires_at);
        Ok((Write::Put(entry), RespValue::integer(added as i64)))
    })
}

/// SREM key member [member ...]
fn srem(db: &Database, req: &Request<'_>) -> CommandResult {
    let members = req.params_from(1);
    db.update(req.param(0)?, |current| {
        let Some(entry) = current else {
            return Ok((Write::Keep, RespValue::integer(0)));
        };
        let mut set = entry.value.as_set()?.clone();
        let removed = members.iter().filter(|member| set.remove(*member)).count();
        let write = if removed == 0 {
            Write::Keep
        } else {
            Write::store(Value::Set(set), entry.expires_at)
        };
        Ok((write, RespValue::integer(removed as i64)))
    })
}

/// SMEMBERS key, in byte order.
fn smembers(db: &Database, req: &Request<'_>) -> CommandResult {
    with_set(db, req.param(0)?, |set| sorted_members(set))
}

fn sismember(db: &Database, req: &Request<'_>) -> CommandResult {
    let member = req.param(1)?;
    let found = with_set(db, req.param(0)?, |set| set.contains(member))?;
    Ok(RespValue::boolean(found))
}

fn scard(db: &Database, req: &Request<'_>) -> CommandResult {
    let len = with_set(db, req.param(0)?, |set| set.len())?;
    Ok(RespValue::integer(len as i64))
}

fn sinter(db: &Database, req: &Request<'_>) -> CommandResult {
    Ok(sorted_members(&set_intersection(&read_sets(db, req.params())?)))
}

fn sunion(db: &Database, req: &Request<'_>) -> CommandResult {
    Ok(sorted_members(&set_union(&read_sets(db, req.params())?)))
}

fn sdiff(db: &Database, req: &Request<'_>) -> CommandResult {
    Ok(sorted_members(&set_difference(&read_sets(db, req.params())?)))
}
