//! Sorted set commands.
//!
//! Scores are `f64`; members with equal scores are ordered by their bytes.
//! Scores go out as bulk strings formatted by [`format_score`].

use crate::commands::request::Request;
use crate::commands::table::{Arity, CommandSpec, CommandTable};
use crate::error::{CommandError, CommandResult};
use crate::protocol::RespValue;
use crate::storage::value::{format_score, normalize_range, parse_float};
use crate::storage::{Database, Entry, ScoreBound, SortedSet, Value, Write};
use bytes::Bytes;

pub fn register(table: &mut CommandTable) {
    table.register(CommandSpec::write("zadd", Arity::AtLeast(3), zadd));
    table.register(CommandSpec::write("zrem", Arity::AtLeast(2), zrem));
    table.register(CommandSpec::read("zscore", Arity::Exact(2), zscore));
    table.register(CommandSpec::read("zcard", Arity::Exact(1), zcard));
    table.register(CommandSpec::write("zincrby", Arity::Exact(3), zincrby));
    table.register(CommandSpec::read("zrank", Arity::Exact(2), zrank));
    table.register(CommandSpec::read("zrange", Arity::AtLeast(3), zrange));
    table.register(CommandSpec::read("zrangebyscore", Arity::AtLeast(3), zrangebyscore));
}

/// Runs `f` on the sorted set at `key` in place. `None` when the key is
/// missing.
fn with_zset<T>(
    db: &Database,
    key: &[u8],
    f: impl FnOnce(&SortedSet) -> T,
) -> CommandResult<Option<T>> {
    db.read(key, |entry| match entry {
        Some(entry) => entry.value.as_sorted_set().map(f).map(Some),
        None => Ok(None),
    })
}

/// Parses the optional trailing `WITHSCORES` of a range command.
fn with_scores(req: &Request<'_>) -> CommandResult<bool> {
    match req.params_from(3) {
        [] => Ok(false),
        [flag] if flag.eq_ignore_ascii_case(b"WITHSCORES") => Ok(true),
        _ => Err(CommandError::Syntax),
    }
}

fn range_reply(members: Vec<(Bytes, f64)>, scores: bool) -> RespValue {
    if scores {
        RespValue::bulk_array(
            members
                .into_iter()
                .flat_map(|(member, score)| [member, format_score(score)]),
        )
    } else {
        RespValue::bulk_array(members.into_iter().map(|(member, _)| member))
    }
}

/// ZADD key score member [score member ...]
///
/// Every score is parsed before the set is touched.
fn zadd(db: &Database, req: &Request<'_>) -> CommandResult {
    let pairs = req.params_from(1);
    if pairs.len() % 2 != 0 {
        return Err(CommandError::Syntax);
    }
    let scored = pairs
        .chunks_exact(2)
        .map(|pair| Ok((parse_float(&pair[0])?, pair[1].clone())))
        .collect::<CommandResult<Vec<_>>>()?;

    db.update(req.param(0)?, |current| {
        let (mut zset, expires_at) = match current {
            Some(entry) => (entry.value.as_sorted_set()?.clone(), entry.expires_at),
            None => (SortedSet::new(), None),
        };
        let added = scored
            .into_iter()
            .filter(|(score, member)| zset.insert(member.clone(), *score))
            .count();
        let entry = Entry::with_expiry(Value::SortedSet(zset), expires_at);
        Ok((Write::Put(entry), RespValue::integer(added as i64)))
    })
}

/// ZREM key member [member ...]
fn zrem(db: &Database, req: &Request<'_>) -> CommandResult {
    let members = req.params_from(1);
    db.update(req.param(0)?, |current| {
        let Some(entry) = current else {
            return Ok((Write::Keep, RespValue::integer(0)));
        };
        let mut zset = entry.value.as_sorted_set()?.clone();
        let removed = members.iter().filter(|member| zset.remove(member)).count();
        let write = if removed == 0 {
            Write::Keep
        } else {
            Write::store(Value::SortedSet(zset), entry.expires_at)
        };
        Ok((write, RespValue::integer(removed as i64)))
    })
}

fn zscore(db: &Database, req: &Request<'_>) -> CommandResult {
    let member = req.param(1)?;
    let score = with_zset(db, req.param(0)?, |zset| zset.score(member))?.flatten();
    Ok(RespValue::optional(score.map(format_score)))
}

fn zcard(db: &Database, req: &Request<'_>) -> CommandResult {
    let len = with_zset(db, req.param(0)?, |zset| zset.len())?.unwrap_or(0);
    Ok(RespValue::integer(len as i64))
}

/// ZINCRBY key increment member. A missing member starts at 0.
fn zincrby(db: &Database, req: &Request<'_>) -> CommandResult {
    let delta = req.param_f64(1)?;
    let member = req.param(2)?.clone();
    db.update(req.param(0)?, |current| {
        let (mut zset, expires_at) = match current {
            Some(entry) => (entry.value.as_sorted_set()?.clone(), entry.expires_at),
            None => (SortedSet::new(), None),
        };
        let score = zset.score(&member).unwrap_or(0.0) + delta;
        if score.is_nan() {
            return Err(CommandError::OutOfRange("resulting score is not a number (NaN)"));
        }
        zset.insert(member, score);
        let entry = Entry::with_expiry(Value::SortedSet(zset), expires_at);
        Ok((Write::Put(entry), RespValue::bulk_string(format_score(score))))
    })
}

/// ZRANK key member, zero-based in ascending score order.
fn zrank(db: &Database, req: &Request<'_>) -> CommandResult {
    let member = req.param(1)?;
    let rank = with_zset(db, req.param(0)?, |zset| zset.rank(member))?.flatten();
    Ok(rank.map_or(RespValue::Null, |rank| RespValue::integer(rank as i64)))
}

/// ZRANGE key start stop [WITHSCORES]
fn zrange(db: &Database, req: &Request<'_>) -> CommandResult {
    let start = req.param_i64(1)?;
    let stop = req.param_i64(2)?;
    let scores = with_scores(req)?;
    let members = with_zset(db, req.param(0)?, |zset| {
        match normalize_range(start, stop, zset.len()) {
            Some((start, stop)) => zset.range_by_rank(start, stop),
            None => Vec::new(),
        }
    })?;
    Ok(range_reply(members.unwrap_or_default(), scores))
}

/// ZRANGEBYSCORE key min max [WITHSCORES]
fn zrangebyscore(db: &Database, req: &Request<'_>) -> CommandResult {
    let min = ScoreBound::parse(req.param(1)?)?;
    let max = ScoreBound::parse(req.param(2)?)?;
    let scores = with_scores(req)?;
    let members = with_zset(db, req.param(0)?, |zset| zset.range_by_score(min, max))?
        .unwrap_or_default();
    Ok(range_reply(members, scores))
}
