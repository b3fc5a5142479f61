//! Command Error Taxonomy
//!
//! Every failure a command can produce is a variant of [`CommandError`].
//! None of them are fatal: the dispatcher turns them into RESP error tokens,
//! the connection stays open, and the failing command has left no partial
//! effect behind.
//!
//! The `Display` text is exactly what goes on the wire, so it follows the
//! wording Redis clients expect (`ERR ...`, `WRONGTYPE ...`, `READONLY ...`).

use crate::protocol::RespValue;
use thiserror::Error;

/// Errors surfaced to clients as error tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// No handler is registered under this name
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    /// Fewer (or, for fixed-arity commands, more) parameters than declared
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArgCount(String),

    /// Malformed option combination in a command's own argument parsing
    #[error("ERR syntax error")]
    Syntax,

    /// The key holds a value of a different variant
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    /// A parameter or stored value is not a base-10 64-bit integer
    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    /// A parameter or stored value is not a valid double
    #[error("ERR value is not a valid float")]
    NotAFloat,

    /// A numeric result or index falls outside the permitted range
    #[error("ERR {0}")]
    OutOfRange(&'static str),

    /// Non-pub/sub command while the session has active subscriptions
    #[error("ERR Can't execute '{0}': only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT are allowed in this context")]
    SubscriberContext(String),

    /// TTL option that cannot be turned into an expiry instant
    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpireTime(String),

    /// The source key of a rename does not exist
    #[error("ERR no such key")]
    NoSuchKey,

    /// Write command against a read-only replica
    #[error("READONLY You can't write against a read only replica.")]
    ReadOnly,

    /// Command that may not be re-entered from a script
    #[error("ERR This Redis command is not allowed from script")]
    NotAllowedFromScript,

    /// Compilation or runtime failure inside EVAL
    #[error("ERR Error running script: {0}")]
    Script(String),

    /// The incoming frame is not a command
    #[error("ERR Protocol error: {0}")]
    InvalidRequest(&'static str),
}

impl CommandError {
    /// Overflow on INCR/DECR family commands.
    pub fn overflow() -> Self {
        CommandError::OutOfRange("increment or decrement would overflow")
    }
}

/// Result type returned by every command handler.
pub type CommandResult<T = RespValue> = Result<T, CommandError>;

impl From<CommandError> for RespValue {
    fn from(err: CommandError) -> Self {
        RespValue::Error(err.to_string())
    }
}
