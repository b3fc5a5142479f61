//! Command Module
//!
//! Turns parsed RESP frames into reads and writes on the keyspace.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │ frame
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  handler.rs: lookup + shared checks
//! │   CommandTable  │  table.rs: name -> CommandSpec
//! └────────┬────────┘
//!          │ Request
//!          ▼
//! ┌─────────────────┐
//! │  Handlers       │  strings, keys, lists, sets, hashes,
//! │                 │  zsets, server, pubsub, scripting
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Database        │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! ### Strings
//! - `SET`, `GET`, `GETSET`, `SETNX`, `SETEX`, `PSETEX`, `MSET`, `MGET`
//! - `INCR`, `INCRBY`, `DECR`, `DECRBY`, `APPEND`, `STRLEN`
//!
//! ### Keys
//! - `DEL`, `EXISTS`, `EXPIRE`, `PEXPIRE`, `EXPIREAT`, `PEXPIREAT`
//! - `TTL`, `PTTL`, `PERSIST`, `KEYS`, `TYPE`, `RENAME`, `RENAMENX`
//!
//! ### Collections
//! - Lists: `LPUSH`, `RPUSH`, `LPOP`, `RPOP`, `LLEN`, `LINDEX`, `LRANGE`
//! - Sets: `SADD`, `SREM`, `SMEMBERS`, `SISMEMBER`, `SCARD`, `SINTER`, `SUNION`, `SDIFF`
//! - Hashes: `HSET`, `HGET`, `HDEL`, `HLEN`, `HEXISTS`, `HGETALL`, `HKEYS`, `HVALS`
//! - Sorted sets: `ZADD`, `ZREM`, `ZSCORE`, `ZCARD`, `ZINCRBY`, `ZRANK`, `ZRANGE`, `ZRANGEBYSCORE`
//!
//! ### Server, Pub/Sub, Scripting
//! - `PING`, `ECHO`, `SELECT`, `QUIT`, `INFO`, `DBSIZE`, `FLUSHDB`, `FLUSHALL`, `TIME`, `COMMAND`
//! - `SUBSCRIBE`, `UNSUBSCRIBE`, `PUBLISH`
//! - `EVAL`

pub mod handler;
pub mod request;
pub mod table;

pub mod hashes;
pub mod keys;
pub mod lists;
pub mod pubsub;
pub mod scripting;
pub mod server;
pub mod sets;
pub mod strings;
pub mod zsets;

pub use handler::{dispatch, dispatch_in, CommandHandler, Reply};
pub use request::{CommandLine, Request};
pub use table::{Arity, CommandSpec, CommandTable, Handler};
