//! Keyspace commands: `DEL`, `EXISTS`, `EXPIRE`, `PEXPIRE`, `EXPIREAT`,
//! `PEXPIREAT`, `TTL`, `PTTL`, `PERSIST`, `KEYS`, `TYPE`, `RENAME`,
//! `RENAMENX`.

use crate::commands::request::Request;
use crate::commands::table::{Arity, CommandSpec, CommandTable};
use crate::error::{CommandError, CommandResult};
use crate::protocol::RespValue;
use crate::storage::{glob_match, Database, Entry, Rename};
use bytes::Bytes;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

pub fn register(table: &mut CommandTable) {
    table.register(CommandSpec::write("del", Arity::AtLeast(1), del));
    table.register(CommandSpec::read("exists", Arity::AtLeast(1), exists));
    table.register(CommandSpec::write("expire", Arity::Exact(2), expire));
    table.register(CommandSpec::write("pexpire", Arity::Exact(2), pexpire));
    table.register(CommandSpec::write("expireat", Arity::Exact(2), expireat));
    table.register(CommandSpec::write("pexpireat", Arity::Exact(2), pexpireat));
    table.register(CommandSpec::read("ttl", Arity::Exact(1), ttl));
    table.register(CommandSpec::read("pttl", Arity::Exact(1), pttl));
    table.register(CommandSpec::write("persist", Arity::Exact(1), persist));
    table.register(CommandSpec::read("keys", Arity::Exact(1), keys));
    table.register(CommandSpec::read("type", Arity::Exact(1), key_type));
    table.register(CommandSpec::write("rename", Arity::Exact(2), rename));
    table.register(CommandSpec::write("renamenx", Arity::Exact(2), renamenx));
}

/// Deadline `ttl` from now, or `InvalidExpireTime` if it cannot be
/// represented.
pub(crate) fn deadline_after(ttl: Duration, command: &str) -> CommandResult<Instant> {
    Instant::now()
        .checked_add(ttl)
        .ok_or_else(|| CommandError::InvalidExpireTime(command.to_string()))
}

/// Milliseconds since the Unix epoch.
pub(crate) fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

/// DEL key [key ...]
fn del(db: &Database, req: &Request<'_>) -> CommandResult {
    let removed = req.params().iter().filter(|key| db.remove(key)).count();
    Ok(RespValue::integer(removed as i64))
}

/// EXISTS key [key ...]
fn exists(db: &Database, req: &Request<'_>) -> CommandResult {
    let found = req.params().iter().filter(|key| db.contains(key)).count();
    Ok(RespValue::integer(found as i64))
}

/// Applies a relative TTL. A non-positive TTL deletes the key right away.
fn expire_in(db: &Database, req: &Request<'_>, millis: i64) -> CommandResult {
    let key = req.param(0)?;
    if millis <= 0 {
        return Ok(RespValue::boolean(db.remove(key)));
    }
    let deadline = deadline_after(Duration::from_millis(millis as u64), req.name())?;
    Ok(RespValue::boolean(db.expire_at(key, deadline)))
}

/// EXPIRE key seconds
fn expire(db: &Database, req: &Request<'_>) -> CommandResult {
    let seconds = req.param_i64(1)?;
    let millis = seconds
        .checked_mul(1000)
        .ok_or_else(|| CommandError::InvalidExpireTime(req.name().to_string()))?;
    expire_in(db, req, millis)
}

/// PEXPIRE key milliseconds
fn pexpire(db: &Database, req: &Request<'_>) -> CommandResult {
    let millis = req.param_i64(1)?;
    expire_in(db, req, millis)
}

/// EXPIREAT key unix-time-seconds
fn expireat(db: &Database, req: &Request<'_>) -> CommandResult {
    let at = req
        .param_i64(1)?
        .checked_mul(1000)
        .ok_or_else(|| CommandError::InvalidExpireTime(req.name().to_string()))?;
    expire_in(db, req, at.saturating_sub(unix_millis()))
}

/// PEXPIREAT key unix-time-milliseconds
fn pexpireat(db: &Database, req: &Request<'_>) -> CommandResult {
    let at = req.param_i64(1)?;
    expire_in(db, req, at.saturating_sub(unix_millis()))
}

/// Remaining TTL, -2 when the key is missing and -1 when it has no deadline.
fn remaining(db: &Database, key: &[u8], as_millis: bool) -> RespValue {
    let Some(left) = db.read(key, |entry| entry.map(Entry::time_to_live)) else {
        return RespValue::integer(-2);
    };
    match left {
        None => RespValue::integer(-1),
        Some(left) if as_millis => RespValue::integer(left.as_millis() as i64),
        Some(left) => RespValue::integer(((left.as_millis() + 500) / 1000) as i64),
    }
}

/// TTL key
fn ttl(db: &Database, req: &Request<'_>) -> CommandResult {
    Ok(remaining(db, req.param(0)?, false))
}

/// PTTL key
fn pttl(db: &Database, req: &Request<'_>) -> CommandResult {
    Ok(remaining(db, req.param(0)?, true))
}

/// PERSIST key
fn persist(db: &Database, req: &Request<'_>) -> CommandResult {
    Ok(RespValue::boolean(db.persist(req.param(0)?)))
}

/// KEYS pattern
fn keys(db: &Database, req: &Request<'_>) -> CommandResult {
    let pattern = req.param(0)?;
    let matching = db
        .keys()
        .into_iter()
        .filter(|key| glob_match(pattern, key))
        .filter(|key| db.contains(key));
    Ok(RespValue::bulk_array(matching))
}

/// TYPE key
fn key_type(db: &Database, req: &Request<'_>) -> CommandResult {
    let name = db.read(req.param(0)?, |entry| {
        entry.map_or("none", |entry| entry.value.type_name())
    });
    Ok(RespValue::simple_string(name))
}

/// Moves `source` to `target`, keeping its deadline.
fn move_key(db: &Database, source: &Bytes, target: &Bytes, only_if_absent: bool) -> CommandResult<bool> {
    match db.rename(source, target, only_if_absent) {
        Rename::Moved => Ok(true),
        Rename::TargetExists => Ok(false),
        Rename::NoSource => Err(CommandError::NoSuchKey),
    }
}

/// RENAME key newkey
fn rename(db: &Database, req: &Request<'_>) -> CommandResult {
    move_key(db, req.param(0)?, req.param(1)?, false)?;
    Ok(RespValue::ok())
}

/// RENAMENX key newkey
fn renamenx(db: &Database, req: &Request<'_>) -> CommandResult {
    let moved = move_key(db, req.param(0)?, req.param(1)?, true)?;
    Ok(RespValue::boolean(moved))
}
