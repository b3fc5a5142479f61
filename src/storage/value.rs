//! Typed Values
//!
//! A stored value is one of five variants. Handlers never mutate a value in
//! place: they clone what they read, change the copy, and hand the
//! replacement back to [`Database::update`](super::Database::update), so every
//! compound write is a single key-slot replace.
//!
//! Type checks happen at the command layer through the `as_*` accessors,
//! which fail with `WRONGTYPE` before anything is written.

use crate::error::{CommandError, CommandResult};
use bytes::Bytes;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// A value held by one key.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(Bytes),
    List(VecDeque<Bytes>),
    Set(HashSet<Bytes>),
    Hash(HashMap<Bytes, Bytes>),
    SortedSet(SortedSet),
}

impl Value {
    /// The name reported by `TYPE`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Hash(_) => "hash",
            Value::SortedSet(_) => "zset",
        }
    }

    pub fn as_string(&self) -> CommandResult<&Bytes> {
        match self {
            Value::String(data) => Ok(data),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_list(&self) -> CommandResult<&VecDeque<Bytes>> {
        match self {
            Value::List(list) => Ok(list),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_set(&self) -> CommandResult<&HashSet<Bytes>> {
        match self {
            Value::Set(set) => Ok(set),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_hash(&self) -> CommandResult<&HashMap<Bytes, Bytes>> {
        match self {
            Value::Hash(hash) => Ok(hash),
            _ => Err(CommandError::WrongType),
        }
    }

    pub fn as_sorted_set(&self) -> CommandResult<&SortedSet> {
        match self {
            Value::SortedSet(zset) => Ok(zset),
            _ => Err(CommandError::WrongType),
        }
    }

    /// True for collections that hold no elements. Such values are never
    /// left in the keyspace.
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::List(list) => list.is_empty(),
            Value::Set(set) => set.is_empty(),
            Value::Hash(hash) => hash.is_empty(),
            Value::SortedSet(zset) => zset.is_empty(),
        }
    }
}

// ============================================================================
// Numeric helpers
// ============================================================================

/// Parses a strict base-10 signed 64-bit integer (no sign prefix `+`, no
/// surrounding whitespace).
pub fn parse_integer(data: &[u8]) -> CommandResult<i64> {
    if data.first() == Some(&b'+') {
        return Err(CommandError::NotAnInteger);
    }
    std::str::from_utf8(data)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(CommandError::NotAnInteger)
}

/// Parses a double. Accepts `inf`, `+inf` and `-inf`; rejects NaN.
pub fn parse_float(data: &[u8]) -> CommandResult<f64> {
    let value = std::str::from_utf8(data)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or(CommandError::NotAFloat)?;
    if value.is_nan() {
        return Err(CommandError::NotAFloat);
    }
    Ok(value)
}

/// Renders a score the way clients expect: integral scores without a
/// fractional part, infinities as `inf` / `-inf`.
pub fn format_score(score: f64) -> Bytes {
    if score.is_infinite() {
        return Bytes::from_static(if score > 0.0 { b"inf" } else { b"-inf" });
    }
    if score.fract() == 0.0 && score.abs() < 1e17 {
        return Bytes::from((score as i64).to_string());
    }
    Bytes::from(score.to_string())
}

/// Resolves Redis-style inclusive indices (negative counts from the end)
/// against a collection of `len` elements. Returns `None` for an empty range.
pub fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

// ============================================================================
// Set algebra
// ============================================================================

/// Members present in every set. An empty input yields an empty set.
pub fn set_intersection(sets: &[HashSet<Bytes>]) -> HashSet<Bytes> {
    let Some((smallest, _)) = sets.iter().enumerate().min_by_key(|(_, s)| s.len()) else {
        return HashSet::new();
    };
    sets[smallest]
        .iter()
        .filter(|member| sets.iter().all(|s| s.contains(*member)))
        .cloned()
        .collect()
}

pub fn set_union(sets: &[HashSet<Bytes>]) -> HashSet<Bytes> {
    sets.iter().flatten().cloned().collect()
}

/// Members of the first set absent from all others.
pub fn set_difference(sets: &[HashSet<Bytes>]) -> HashSet<Bytes> {
    let Some((first, rest)) = sets.split_first() else {
        return HashSet::new();
    };
    first
        .iter()
        .filter(|member| !rest.iter().any(|s| s.contains(*member)))
        .cloned()
        .collect()
}

// ============================================================================
// Sorted set
// ============================================================================

#[derive(Debug, Clone)]
struct Scored {
    score: f64,
    member: Bytes,
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.member.cmp(&other.member))
    }
}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

/// Members with scores, ordered by score and then by member bytes.
///
/// `scores` answers point lookups; `order` keeps the ranking. Both always
/// describe the same membership.
#[derive(Debug, Clone, Default)]
pub struct SortedSet {
    scores: HashMap<Bytes, f64>,
    order: BTreeSet<Scored>,
}

impl PartialEq for SortedSet {
    fn eq(&self, other: &Self) -> bool {
        self.scores == other.scores
    }
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member or updates its score. Returns `true` if the member is new.
    pub fn insert(&mut self, member: Bytes, score: f64) -> bool {
        let previous = self.scores.insert(member.clone(), score);
        if let Some(old) = previous {
            self.order.remove(&Scored {
                score: old,
                member: member.clone(),
            });
        }
        self.order.insert(Scored { score, member });
        previous.is_none()
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.scores.remove_entry(member) {
            Some((member, score)) => {
                self.order.remove(&Scored { score, member });
                true
            }
            None => false,
        }
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Zero-based position in ascending order.
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let score = self.score(member)?;
        let bound = Scored {
            score,
            member: Bytes::copy_from_slice(member),
        };
        Some(self.order.range(..bound).count())
    }

    /// Members between two resolved, inclusive rank positions.
    pub fn range_by_rank(&self, start: usize, stop: usize) -> Vec<(Bytes, f64)> {
        self.order
            .iter()
            .skip(start)
            .take(stop.saturating_sub(start) + 1)
            .map(|s| (s.member.clone(), s.score))
            .collect()
    }

    pub fn range_by_score(&self, min: ScoreBound, max: ScoreBound) -> Vec<(Bytes, f64)> {
        self.order
            .iter()
            .skip_while(|s| !min.admits_from_below(s.score))
            .take_while(|s| max.admits_from_above(s.score))
            .map(|s| (s.member.clone(), s.score))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, f64)> {
        self.order.iter().map(|s| (&s.member, s.score))
    }
}

/// One end of a `ZRANGEBYSCORE` interval: `1.5`, `(1.5`, `-inf`, `+inf`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreBound {
    Inclusive(f64),
    Exclusive(f64),
}

impl ScoreBound {
    pub fn parse(data: &[u8]) -> CommandResult<Self> {
        match data.split_first() {
            Some((b'(', rest)) => parse_float(rest).map(ScoreBound::Exclusive),
            _ => parse_float(data).map(ScoreBound::Inclusive),
        }
    }

    fn admits_from_below(&self, score: f64) -> bool {
        match *self {
            ScoreBound::Inclusive(min) => score >= min,
            ScoreBound::Exclusive(min) => score > min,
        }
    }

    fn admits_from_above(&self, score: f64) -> bool {
        match *self {
            ScoreBound::Inclusive(max) => score <= max,
            ScoreBound::Exclusive(max) => score < max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&'static str]) -> HashSet<Bytes> {
        items.iter().map(|s| Bytes::from_static(s.as_bytes())).collect()
    }

    #[test]
    fn test_type_checks() {
        let value = Value::String(Bytes::from("v"));
        assert_eq!(value.type_name(), "string");
        assert!(value.as_string().is_ok());
        assert_eq!(value.as_sorted_set().unwrap_err(), CommandError::WrongType);
        assert_eq!(Value::SortedSet(SortedSet::new()).type_name(), "zset");
    }

    #[test]
    fn test_parse_integer_is_strict() {
        assert_eq!(parse_integer(b"42").unwrap(), 42);
        assert_eq!(parse_integer(b"-9223372036854775808").unwrap(), i64::MIN);
        assert!(parse_integer(b"9223372036854775808").is_err());
        assert!(parse_integer(b"+1").is_err());
        assert!(parse_integer(b" 1").is_err());
        assert!(parse_integer(b"1.0").is_err());
        assert!(parse_integer(b"").is_err());
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float(b"1.5").unwrap(), 1.5);
        assert_eq!(parse_float(b"-inf").unwrap(), f64::NEG_INFINITY);
        assert_eq!(parse_float(b"+inf").unwrap(), f64::INFINITY);
        assert_eq!(parse_float(b"nan").unwrap_err(), CommandError::NotAFloat);
        assert!(parse_float(b"abc").is_err());
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(3.0), Bytes::from("3"));
        assert_eq!(format_score(-2.5), Bytes::from("-2.5"));
        assert_eq!(format_score(f64::INFINITY), Bytes::from("inf"));
    }

    #[test]
    fn test_normalize_range() {
        assert_eq!(normalize_range(0, -1, 5), Some((0, 4)));
        assert_eq!(normalize_range(-2, -1, 5), Some((3, 4)));
        assert_eq!(normalize_range(1, 100, 5), Some((1, 4)));
        assert_eq!(normalize_range(-100, 1, 5), Some((0, 1)));
        assert_eq!(normalize_range(3, 1, 5), None);
        assert_eq!(normalize_range(5, 10, 5), None);
        assert_eq!(normalize_range(0, -1, 0), None);
    }

    #[test]
    fn test_set_algebra() {
        let sets = vec![set(&["a", "b", "c"]), set(&["b", "c", "d"]), set(&["c"])];
        assert_eq!(set_intersection(&sets), set(&["c"]));
        assert_eq!(set_union(&sets), set(&["a", "b", "c", "d"]));
        assert_eq!(set_difference(&sets), set(&["a"]));
        assert!(set_intersection(&[]).is_empty());
        assert!(set_difference(&[]).is_empty());
    }

    #[test]
    fn test_sorted_set_ordering() {
        let mut zset = SortedSet::new();
        assert!(zset.insert(Bytes::from("b"), 1.0));
        assert!(zset.insert(Bytes::from("a"), 1.0));
        assert!(zset.insert(Bytes::from("c"), 0.5));

        let members: Vec<_> = zset.iter().map(|(m, _)| m.clone()).collect();
        assert_eq!(members, vec!["c", "a", "b"]);
        assert_eq!(zset.rank(b"a"), Some(1));
        assert_eq!(zset.rank(b"zz"), None);
    }

    #[test]
    fn test_sorted_set_rescore() {
        let mut zset = SortedSet::new();
        zset.insert(Bytes::from("a"), 1.0);
        zset.insert(Bytes::from("b"), 2.0);
        assert!(!zset.insert(Bytes::from("a"), 3.0));

        assert_eq!(zset.len(), 2);
        assert_eq!(zset.score(b"a"), Some(3.0));
        assert_eq!(zset.rank(b"a"), Some(1));
        assert_eq!(zset.range_by_rank(0, 0), vec![(Bytes::from("b"), 2.0)]);

        assert!(zset.remove(b"a"));
        assert!(!zset.remove(b"a"));
        assert_eq!(zset.iter().count(), 1);
    }

    #[test]
    fn test_range_by_score_bounds() {
        let mut zset = SortedSet::new();
        for (member, score) in [("a", 1.0), ("b", 2.0), ("c", 3.0)] {
            zset.insert(Bytes::from(member), score);
        }

        let inclusive = zset.range_by_score(
            ScoreBound::parse(b"1").unwrap(),
            ScoreBound::parse(b"2").unwrap(),
        );
        assert_eq!(inclusive.len(), 2);

        let exclusive = zset.range_by_score(
            ScoreBound::parse(b"(1").unwrap(),
            ScoreBound::parse(b"+inf").unwrap(),
        );
        assert_eq!(
            exclusive,
            vec![(Bytes::from("b"), 2.0), (Bytes::from("c"), 3.0)]
        );
        assert!(ScoreBound::parse(b"(x").is_err());
    }
}
