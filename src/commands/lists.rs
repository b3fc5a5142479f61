//! List commands: `LPUSH`, `RPUSH`, `LPOP`, `RPOP`, `LLEN`, `LINDEX`, `LRANGE`.

use crate::commands::request::Request;
use crate::commands::table::{Arity, CommandSpec, CommandTable};
use crate::error::CommandResult;
use crate::protocol::RespValue;
use crate::storage::value::normalize_range;
use crate::storage::{Database, Entry, Value, Write};
use bytes::Bytes;
use std::collections::VecDeque;

pub fn register(table: &mut CommandTable) {
    table.register(CommandSpec::write("lpush", Arity::AtLeast(2), lpush));
    table.register(CommandSpec::write("rpush", Arity::AtLeast(2), rpush));
    table.register(CommandSpec::write("lpop", Arity::Exact(1), lpop));
    table.register(CommandSpec::write("rpop", Arity::Exact(1), rpop));
    table.register(CommandSpec::read("llen", Arity::Exact(1), llen));
    table.register(CommandSpec::read("lindex", Arity::Exact(2), lindex));
    table.register(CommandSpec::read("lrange", Arity::Exact(3), lrange));
}

#[derive(Clone, Copy)]
enum End {
    Head,
    Tail,
}

/// Runs `f` on the list at `key` in place. `None` when the key is missing.
fn with_list<T>(
    db: &Database,
    key: &[u8],
    f: impl FnOnce(&VecDeque<Bytes>) -> T,
) -> CommandResult<Option<T>> {
    db.read(key, |entry| match entry {
        Some(entry) => entry.value.as_list().map(f).map(Some),
        None => Ok(None),
    })
}

fn push(db: &Database, req: &Request<'_>, end: End) -> CommandResult {
    let values = req.params_from(1);
    db.update(req.param(0)?, |current| {
        let (mut list, expires_at) = match current {
            Some(entry) => (entry.value.as_list()?.clone(), entry.expires_at),
            None => (VecDeque::new(), None),
        };
        for value in values {
            match end {
                End::Head => list.push_front(value.clone()),
                End::Tail => list.push_back(value.clone()),
            }
        }
        let len = list.len() as i64;
        let entry = Entry::with_expiry(Value::List(list), expires_at);
        Ok((Write::Put(entry), RespValue::integer(len)))
    })
}

fn pop(db: &Database, req: &Request<'_>, end: End) -> CommandResult {
    db.update(req.param(0)?, |current| {
        let Some(entry) = current else {
            return Ok((Write::Keep, RespValue::Null));
        };
        let mut list = entry.value.as_list()?.clone();
        let popped = match end {
            End::Head => list.pop_front(),
            End::Tail => list.pop_back(),
        };
        let write = Write::store(Value::List(list), entry.expires_at);
        Ok((write, RespValue::optional(popped)))
    })
}

/// LPUSH key element [element ...]
fn lpush(db: &Database, req: &Request<'_>) -> CommandResult {
    push(db, req, End::Head)
}

/// RPUSH key element [element ...]
fn rpush(db: &Database, req: &Request<'_>) -> CommandResult {
    push(db, req, End::Tail)
}

fn lpop(db: &Database, req: &Request<'_>) -> CommandResult {
    pop(db, req, End::Head)
}

fn rpop(db: &Database, req: &Request<'_>) -> CommandResult {
    pop(db, req, End::Tail)
}

fn llen(db: &Database, req: &Request<'_>) -> CommandResult {
    let len = with_list(db, req.param(0)?, |list| list.len())?.unwrap_or(0);
    Ok(RespValue::integer(len as i64))
}

/// LINDEX key index. Negative indices count from the tail.
fn lindex(db: &Database, req: &Request<'_>) -> CommandResult {
    let index = req.param_i64(1)?;
    let element = with_list(db, req.param(0)?, |list| {
        let resolved = if index < 0 {
            (list.len() as i64).checked_add(index)
        } else {
            Some(index)
        };
        resolved
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| list.get(i).cloned())
    })?;
    Ok(RespValue::optional(element.flatten()))
}

/// LRANGE key start stop
fn lrange(db: &Database, req: &Request<'_>) -> CommandResult {
    let start = req.param_i64(1)?;
    let stop = req.param_i64(2)?;
    let elements = with_list(db, req.param(0)?, |list| {
        match normalize_range(start, stop, list.len()) {
            Some((start, stop)) => list.range(start..=stop).cloned().collect(),
            None => Vec::new(),
        }
    })?;
    Ok(RespValue::bulk_array(elements.unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use crate::commands::handler::test_support::*;
    use crate::error::CommandError;
    use crate::protocol::RespValue;

    #[test]
    fn test_push_and_range() {
        let h = Harness::new();
        assert_eq!(h.run(&["RPUSH", "l", "b", "c"]), RespValue::integer(2));
        assert_eq!(h.run(&["LPUSH", "l", "a", "z"]), RespValue::integer(4));
        assert_eq!(h.run(&["LRANGE", "l", "0", "-1"]), bulks(&["z", "a", "b", "c"]));
        assert_eq!(h.run(&["LRANGE", "l", "1", "2"]), bulks(&["a", "b"]));
        assert_eq!(h.run(&["LRANGE", "l", "-2", "100"]), bulks(&["b", "c"]));
        assert_eq!(h.run(&["LRANGE", "l", "3", "1"]), bulks(&[]));
        assert_eq!(h.run(&["LRANGE", "missing", "0", "-1"]), bulks(&[]));
    }

    #[test]
    fn test_pop_removes_empty_list() {
        let h = Harness::new();
        h.run(&["RPUSH", "l", "a", "b"]);
        assert_eq!(h.run(&["LPOP", "l"]), bulk("a"));
        assert_eq!(h.run(&["RPOP", "l"]), bulk("b"));
        assert_eq!(h.run(&["EXISTS", "l"]), RespValue::integer(0));
        assert_eq!(h.run(&["LPOP", "l"]), RespValue::Null);
    }

    #[test]
    fn test_llen_and_lindex() {
        let h = Harness::new();
        h.run(&["RPUSH", "l", "a", "b", "c"]);
        assert_eq!(h.run(&["LLEN", "l"]), RespValue::integer(3));
        assert_eq!(h.run(&["LLEN", "missing"]), RespValue::integer(0));
        assert_eq!(h.run(&["LINDEX", "l", "0"]), bulk("a"));
        assert_eq!(h.run(&["LINDEX", "l", "-1"]), bulk("c"));
        assert_eq!(h.run(&["LINDEX", "l", "3"]), RespValue::Null);
        assert_eq!(h.run(&["LINDEX", "l", "-4"]), RespValue::Null);
    }

    #[test]
    fn test_wrong_type_leaves_key() {
        let h = Harness::new();
        h.run(&["SET", "s", "v"]);
        assert_eq!(h.run(&["LPUSH", "s", "x"]), err(CommandError::WrongType));
        assert_eq!(h.run(&["LRANGE", "s", "0", "-1"]), err(CommandError::WrongType));
        assert_eq!(h.run(&["GET", "s"]), bulk("v"));
    }
}
