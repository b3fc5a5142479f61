//! Hash commands. Multi-field replies are ordered by field name.

use crate::commands::request::Request;
use crate::commands::table::{Arity, CommandSpec, CommandTable};
use crate::error::{CommandError, CommandResult};
use crate::protocol::RespValue;
use crate::storage::{Database, Entry, Value, Write};
use bytes::Bytes;
use std::collections::HashMap;

pub fn register(table: &mut CommandTable) {
    table.register(CommandSpec::write("hset", Arity::AtLeast(3), hset));
    table.register(CommandSpec::read("hget", Arity::Exact(2), hget));
    table.register(CommandSpec::write("hdel", Arity::AtLeast(2), hdel));
    table.register(CommandSpec::read("hlen", Arity::Exact(1), hlen));
    table.register(CommandSpec::read("hexists", Arity::Exact(2), hexists));
    table.register(CommandSpec::read("hgetall", Arity::Exact(1), hgetall));
    table.register(CommandSpec::read("hkeys", Arity::Exact(1), hkeys));
    table.register(CommandSpec::read("hvals", Arity::Exact(1), hvals));
}

/// Runs `f` on the hash at `key` in place. A missing key reads as the
/// empty hash.
fn with_hash<T>(
    db: &Database,
    key: &[u8],
    f: impl FnOnce(&HashMap<Bytes, Bytes>) -> T,
) -> CommandResult<T> {
    db.read(key, |entry| match entry {
        Some(entry) => entry.value.as_hash().map(f),
        None => Ok(f(&HashMap::new())),
    })
}

fn sorted_fields(db: &Database, key: &[u8]) -> CommandResult<Vec<(Bytes, Bytes)>> {
    let mut fields = with_hash(db, key, |hash| {
        hash.iter()
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect::<Vec<_>>()
    })?;
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(fields)
}

/// HSET key field value [field value ...]. Replies with the number of new
/// fields.
fn hset(db: &Database, req: &Request<'_>) -> CommandResult {
    let pairs = req.params_from(1);
    if pairs.len() % 2 != 0 {
        return Err(CommandError::WrongArgCount(req.name().to_string()));
    }
    db.update(req.param(0)?, |current| {
        let (mut hash, expires_at) = match current {
            Some(entry) => (entry.value.as_hash()?.clone(), entry.expires_at),
            None => (HashMap::new(), None),
        };
        let added = pairs
            .chunks_exact(2)
            .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
            .count();
        let entry = Entry::with_expiry(Value::Hash(hash), expires_at);
        Ok((Write::Put(entry), RespValue::integer(added as i64)))
    })
}

fn hget(db: &Database, req: &Request<'_>) -> CommandResult {
    let field = req.param(1)?;
    let value = with_hash(db, req.param(0)?, |hash| hash.get(field).cloned())?;
    Ok(RespValue::optional(value))
}

/// HDEL key field [field ...]
fn hdel(db: &Database, req: &Request<'_>) -> CommandResult {
    let fields = req.params_from(1);
    db.update(req.param(0)?, |current| {
        let Some(entry) = current else {
            return Ok((Write::Keep, RespValue::integer(0)));
        };
        let mut hash = entry.value.as_hash()?.clone();
        let removed = fields
            .iter()
            .filter(|field| hash.remove(*field).is_some())
            .count();
        let write = if removed == 0 {
            Write::Keep
        } else {
            Write::store(Value::Hash(hash), entry.expires_at)
        };
        Ok((write, RespValue::integer(removed as i64)))
    })
}

fn hlen(db: &Database, req: &Request<'_>) -> CommandResult {
    let len = with_hash(db, req.param(0)?, |hash| hash.len())?;
    Ok(RespValue::integer(len as i64))
}

fn hexists(db: &Database, req: &Request<'_>) -> CommandResult {
    let field = req.param(1)?;
    let found = with_hash(db, req.param(0)?, |hash| hash.contains_key(field))?;
    Ok(RespValue::boolean(found))
}

/// HGETALL key, as a flat field/value array.
fn hgetall(db: &Database, req: &Request<'_>) -> CommandResult {
    let fields = sorted_fields(db, req.param(0)?)?;
    Ok(RespValue::bulk_array(
        fields.into_iter().flat_map(|(field, value)| [field, value]),
    ))
}

fn hkeys(db: &Database, req: &Request<'_>) -> CommandResult {
    let fields = sorted_fields(db, req.param(0)?)?;
    Ok(RespValue::bulk_array(fields.into_iter().map(|(field, _)| field)))
}

fn hvals(db: &Database, req: &Request<'_>) -> CommandResult {
    let fields = sorted_fields(db, req.param(0)?)?;
    Ok(RespValue::bulk_array(fields.into_iter().map(|(_, value)| value)))
}

#[cfg(test)]
mod tests {
    use crate::commands::handler::test_support::*;
    use crate::error::CommandError;
    use crate::protocol::RespValue;

    #[test]
    fn test_hset_hget() {
        let h = Harness::new();
        assert_eq!(h.run(&["HSET", "user", "name", "ariz", "age", "30"]), RespValue::integer(2));
        assert_eq!(h.run(&["HSET", "user", "age", "31"]), RespValue::integer(0));
        assert_eq!(h.run(&["HGET", "user", "age"]), bulk("31"));
        assert_eq!(h.run(&["HGET", "user", "email"]), RespValue::Null);
        assert_eq!(h.run(&["HGET", "missing", "f"]), RespValue::Null);
        assert_eq!(h.run(&["HLEN", "user"]), RespValue::integer(2));
        assert_eq!(h.run(&["HEXISTS", "user", "name"]), RespValue::integer(1));
    }

    #[test]
    fn test_hset_odd_pairs() {
        let h = Harness::new();
        assert_eq!(
            h.run(&["HSET", "k", "f1", "v1", "f2"]),
            err(CommandError::WrongArgCount("hset".into()))
        );
        assert_eq!(h.run(&["EXISTS", "k"]), RespValue::integer(0));
    }

    #[test]
    fn test_getall_keys_vals_sorted() {
        let h = Harness::new();
        h.run(&["HSET", "h", "b", "2", "a", "1", "c", "3"]);
        assert_eq!(h.run(&["HGETALL", "h"]), bulks(&["a", "1", "b", "2", "c", "3"]));
        assert_eq!(h.run(&["HKEYS", "h"]), bulks(&["a", "b", "c"]));
        assert_eq!(h.run(&["HVALS", "h"]), bulks(&["1", "2", "3"]));
        assert_eq!(h.run(&["HGETALL", "missing"]), bulks(&[]));
    }

    #[test]
    fn test_hdel_removes_empty_hash() {
        let h = Harness::new();
        h.run(&["HSET", "h", "a", "1", "b", "2"]);
        assert_eq!(h.run(&["HDEL", "h", "a", "zz"]), RespValue::integer(1));
        assert_eq!(h.run(&["HDEL", "h", "b"]), RespValue::integer(1));
        assert_eq!(h.run(&["EXISTS", "h"]), RespValue::integer(0));
    }

    #[test]
    fn test_wrong_type() {
        let h = Harness::new();
        h.run(&["LPUSH", "l", "x"]);
        assert_eq!(h.run(&["HSET", "l", "f", "v"]), err(CommandError::WrongType));
        assert_eq!(h.run(&["HGET", "l", "f"]), err(CommandError::WrongType));
    }

    #[tokio::test(start_paused = true)]
    async fn test_point_reads_on_expired_or_mistyped_keys() {
        let h = Harness::new();
        h.run(&["SET", "str", "v"]);
        assert_eq!(h.run(&["HGET", "str", "f"]), err(CommandError::WrongType));
        assert_eq!(h.run(&["HEXISTS", "str", "f"]), err(CommandError::WrongType));

        h.run(&["HSET", "h", "f", "1"]);
        h.run(&["PEXPIRE", "h", "50"]);
        tokio::time::advance(std::time::Duration::from_millis(60)).await;
        assert_eq!(h.run(&["HGET", "h", "f"]), RespValue::Null);
        assert_eq!(h.run(&["HLEN", "h"]), RespValue::integer(0));
        assert_eq!(h.run(&["HEXISTS", "h", "f"]), RespValue::integer(0));
    }
}
