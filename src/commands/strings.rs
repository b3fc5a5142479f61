//! String commands.
//!
//! `SET` is the model for every conditional write in the server:
//!
//! 1. All options are parsed into a [`SetOptions`] before the keyspace is
//!    touched, so `SET k v NX XX` fails with a syntax error and no effect.
//! 2. Plain `SET` is an unconditional [`Database::put`].
//! 3. `NX` goes through [`Database::merge`] with a resolver that keeps the
//!    current value; the write happened iff the stored entry is the candidate.
//! 4. `XX` is a single [`Database::update`] that only writes when a live
//!    value is present.
//!
//! Both conditional misses answer nil.

use crate::commands::keys::deadline_after;
use crate::commands::request::Request;
use crate::commands::table::{Arity, CommandSpec, CommandTable};
use crate::error::{CommandError, CommandResult};
use crate::protocol::RespValue;
use crate::storage::value::parse_integer;
use crate::storage::{Database, Entry, Value, Write};
use bytes::{Bytes, BytesMut};
use std::time::Duration;

pub fn register(table: &mut CommandTable) {
    table.register(CommandSpec::read("get", Arity::Exact(1), get));
    table.register(CommandSpec::write("set", Arity::AtLeast(2), set));
    table.register(CommandSpec::write("getset", Arity::Exact(2), getset));
    table.register(CommandSpec::write("setnx", Arity::Exact(2), setnx));
    table.register(CommandSpec::write("setex", Arity::Exact(3), setex));
    table.register(CommandSpec::write("psetex", Arity::Exact(3), psetex));
    table.register(CommandSpec::write("mset", Arity::AtLeast(2), mset));
    table.register(CommandSpec::read("mget", Arity::AtLeast(1), mget));
    table.register(CommandSpec::write("incr", Arity::Exact(1), incr));
    table.register(CommandSpec::write("incrby", Arity::Exact(2), incrby));
    table.register(CommandSpec::write("decr", Arity::Exact(1), decr));
    table.register(CommandSpec::write("decrby", Arity::Exact(2), decrby));
    table.register(CommandSpec::write("append", Arity::Exact(2), append));
    table.register(CommandSpec::read("strlen", Arity::Exact(1), strlen));
}

/// Write condition of a `SET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// `NX`: only when the key does not exist
    IfAbsent,
    /// `XX`: only when the key exists
    IfPresent,
}

/// Trailing options of `SET key value [EX s | PX ms] [NX | XX]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub ttl: Option<Duration>,
    pub condition: Option<Condition>,
}

impl SetOptions {
    pub fn parse(tokens: &[Bytes]) -> CommandResult<Self> {
        let mut options = Self::default();
        let mut tokens = tokens.iter();

        while let Some(token) = tokens.next() {
            let upper = token.to_ascii_uppercase();
            match upper.as_slice() {
                b"EX" | b"PX" => {
                    if options.ttl.is_some() {
                        return Err(CommandError::Syntax);
                    }
                    let amount = parse_integer(tokens.next().ok_or(CommandError::Syntax)?)?;
                    if amount < 0 {
                        return Err(CommandError::InvalidExpireTime("set".to_string()));
                    }
                    let amount = amount as u64;
                    options.ttl = Some(if upper == b"EX" {
                        Duration::from_secs(amount)
                    } else {
                        Duration::from_millis(amount)
                    });
                }
                b"NX" => options.set_condition(Condition::IfAbsent)?,
                b"XX" => options.set_condition(Condition::IfPresent)?,
                _ => return Err(CommandError::Syntax),
            }
        }

        Ok(options)
    }

    fn set_condition(&mut self, condition: Condition) -> CommandResult<()> {
        match self.condition {
            Some(existing) if existing != condition => Err(CommandError::Syntax),
            _ => {
                self.condition = Some(condition);
                Ok(())
            }
        }
    }
}

/// The string stored at `key`, `None` when absent.
fn read_string(db: &Database, key: &[u8]) -> CommandResult<Option<Bytes>> {
    db.read(key, |entry| match entry {
        Some(entry) => entry.value.as_string().cloned().map(Some),
        None => Ok(None),
    })
}

/// GET key
fn get(db: &Database, req: &Request<'_>) -> CommandResult {
    Ok(RespValue::optional(read_string(db, req.param(0)?)?))
}

/// SET key value [EX seconds | PX milliseconds] [NX | XX]
fn set(db: &Database, req: &Request<'_>) -> CommandResult {
    let key = req.param(0)?.clone();
    let value = req.param(1)?.clone();
    let options = SetOptions::parse(req.params_from(2))?;

    let expires_at = options
        .ttl
        .map(|ttl| deadline_after(ttl, "set"))
        .transpose()?;
    let candidate = Entry::with_expiry(Value::String(value), expires_at);

    match options.condition {
        None => {
            db.put(key, candidate);
            Ok(RespValue::ok())
        }
        Some(Condition::IfAbsent) => {
            let stored = db.merge(key, candidate.clone(), |current, _| current.clone());
            Ok(if stored == candidate {
                RespValue::ok()
            } else {
                RespValue::Null
            })
        }
        Some(Condition::IfPresent) => db.update(&key, |current| {
            Ok(match current {
                Some(_) => (Write::Put(candidate), RespValue::ok()),
                None => (Write::Keep, RespValue::Null),
            })
        }),
    }
}

/// GETSET key value
fn getset(db: &Database, req: &Request<'_>) -> CommandResult {
    let value = req.param(1)?.clone();
    db.update(req.param(0)?, |current| {
        let previous = match current {
            Some(entry) => Some(entry.value.as_string()?.clone()),
            None => None,
        };
        Ok((
            Write::Put(Entry::new(Value::String(value))),
            RespValue::optional(previous),
        ))
    })
}

/// SETNX key value
fn setnx(db: &Database, req: &Request<'_>) -> CommandResult {
    let candidate = Entry::new(Value::String(req.param(1)?.clone()));
    let stored = db.merge(req.param(0)?.clone(), candidate.clone(), |current, _| {
        current.clone()
    });
    Ok(RespValue::boolean(stored == candidate))
}

fn set_with_ttl(db: &Database, req: &Request<'_>, ttl: Option<Duration>) -> CommandResult {
    let ttl = ttl
        .filter(|ttl| !ttl.is_zero())
        .ok_or_else(|| CommandError::InvalidExpireTime(req.name().to_string()))?;
    let deadline = deadline_after(ttl, req.name())?;
    db.put(
        req.param(0)?.clone(),
        Entry::with_expiry(Value::String(req.param(2)?.clone()), Some(deadline)),
    );
    Ok(RespValue::ok())
}

/// SETEX key seconds value
fn setex(db: &Database, req: &Request<'_>) -> CommandResult {
    let seconds = req.param_i64(1)?;
    let ttl = u64::try_from(seconds).ok().map(Duration::from_secs);
    set_with_ttl(db, req, ttl)
}

/// PSETEX key milliseconds value
fn psetex(db: &Database, req: &Request<'_>) -> CommandResult {
    let millis = req.param_i64(1)?;
    let ttl = u64::try_from(millis).ok().map(Duration::from_millis);
    set_with_ttl(db, req, ttl)
}

/// MSET key value [key value ...]
fn mset(db: &Database, req: &Request<'_>) -> CommandResult {
    if req.len() % 2 != 0 {
        return Err(CommandError::WrongArgCount(req.name().to_string()));
    }
    for pair in req.params().chunks_exact(2) {
        db.put(pair[0].clone(), Entry::new(Value::String(pair[1].clone())));
    }
    Ok(RespValue::ok())
}

/// MGET key [key ...]. Keys holding other types read as nil.
fn mget(db: &Database, req: &Request<'_>) -> CommandResult {
    let values = req
        .params()
        .iter()
        .map(|key| {
            db.read(key, |entry| match entry.map(|e| &e.value) {
                Some(Value::String(data)) => RespValue::BulkString(data.clone()),
                _ => RespValue::Null,
            })
        })
        .collect();
    Ok(RespValue::array(values))
}

/// Adds `delta` to the integer at `key` (missing counts as 0). The key
/// keeps its deadline.
fn increment(db: &Database, key: &Bytes, delta: i64) -> CommandResult {
    db.update(key, |current| {
        let (number, expires_at) = match current {
            Some(entry) => (parse_integer(entry.value.as_string()?)?, entry.expires_at),
            None => (0, None),
        };
        let next = number.checked_add(delta).ok_or_else(CommandError::overflow)?;
        let entry = Entry::with_expiry(Value::String(Bytes::from(next.to_string())), expires_at);
        Ok((Write::Put(entry), RespValue::integer(next)))
    })
}

/// INCR key
fn incr(db: &Database, req: &Request<'_>) -> CommandResult {
    increment(db, req.param(0)?, 1)
}

/// INCRBY key increment
fn incrby(db: &Database, req: &Request<'_>) -> CommandResult {
    increment(db, req.param(0)?, req.param_i64(1)?)
}

/// DECR key
fn decr(db: &Database, req: &Request<'_>) -> CommandResult {
    increment(db, req.param(0)?, -1)
}

/// DECRBY key decrement
fn decrby(db: &Database, req: &Request<'_>) -> CommandResult {
    let delta = req
        .param_i64(1)?
        .checked_neg()
        .ok_or_else(CommandError::overflow)?;
    increment(db, req.param(0)?, delta)
}

/// APPEND key value
fn append(db: &Database, req: &Request<'_>) -> CommandResult {
    let suffix = req.param(1)?;
    db.update(req.param(0)?, |current| {
        let (prefix, expires_at) = match current {
            Some(entry) => (entry.value.as_string()?.clone(), entry.expires_at),
            None => (Bytes::new(), None),
        };
        let mut joined = BytesMut::with_capacity(prefix.len() + suffix.len());
        joined.extend_from_slice(&prefix);
        joined.extend_from_slice(suffix);
        let len = joined.len() as i64;
        let entry = Entry::with_expiry(Value::String(joined.freeze()), expires_at);
        Ok((Write::Put(entry), RespValue::integer(len)))
    })
}

/// STRLEN key
fn strlen(db: &Database, req: &Request<'_>) -> CommandResult {
    let len = read_string(db, req.param(0)?)?.map_or(0, |data| data.len());
    Ok(RespValue::integer(len as i64))
}
