//! Command registration table.
//!
//! Each command is described once by a [`CommandSpec`]: its name, how many
//! parameters it takes, the flags the dispatcher enforces, and the handler
//! function. Command modules contribute their specs through a `register`
//! function; [`CommandTable::with_defaults`] collects them all at startup.

use crate::commands::{hashes, keys, lists, pubsub, scripting, server, sets, strings, zsets};
use crate::commands::request::Request;
use crate::error::{CommandError, CommandResult};
use crate::storage::Database;
use std::collections::HashMap;
use std::fmt;

/// A command handler: reads or writes one database and produces a token.
pub type Handler = fn(&Database, &Request<'_>) -> CommandResult;

/// Parameter count accepted by a command, not counting the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn admits(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

#[derive(Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    pub arity: Arity,
    /// Allowed against a read-only replica
    pub read_only: bool,
    /// Allowed while the session has active subscriptions
    pub pubsub_allowed: bool,
    /// Refused when issued from a script
    pub no_script: bool,
    /// The reply is an array whose elements go out as separate frames
    pub split_reply: bool,
    pub handler: Handler,
}

impl CommandSpec {
    /// A command that never modifies data.
    pub const fn read(name: &'static str, arity: Arity, handler: Handler) -> Self {
        Self {
            name,
            arity,
            read_only: true,
            pubsub_allowed: false,
            no_script: false,
            split_reply: false,
            handler,
        }
    }

    /// A command that may modify data.
    pub const fn write(name: &'static str, arity: Arity, handler: Handler) -> Self {
        Self {
            read_only: false,
            ..Self::read(name, arity, handler)
        }
    }

    pub const fn pubsub(self) -> Self {
        Self {
            pubsub_allowed: true,
            ..self
        }
    }

    pub const fn no_script(self) -> Self {
        Self {
            no_script: true,
            ..self
        }
    }

    pub const fn split_reply(self) -> Self {
        Self {
            split_reply: true,
            ..self
        }
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("read_only", &self.read_only)
            .field("pubsub_allowed", &self.pubsub_allowed)
            .field("no_script", &self.no_script)
            .field("split_reply", &self.split_reply)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct CommandTable {
    commands: HashMap<&'static str, CommandSpec>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in command.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        server::register(&mut table);
        keys::register(&mut table);
        strings::register(&mut table);
        lists::register(&mut table);
        sets::register(&mut table);
        hashes::register(&mut table);
        zsets::register(&mut table);
        pubsub::register(&mut table);
        scripting::register(&mut table);
        table
    }

    pub fn register(&mut self, spec: CommandSpec) {
        self.commands.insert(spec.name, spec);
    }

    /// Finds a command by its lowercase name.
    pub fn lookup(&self, name: &str) -> CommandResult<&CommandSpec> {
        self.commands
            .get(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))
    }

    /// Registered names in alphabetical order.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.commands.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
