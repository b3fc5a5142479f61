//! Command Dispatcher
//!
//! Routes a request to its handler after the checks every command shares:
//!
//! ```text
//!   frame ──> CommandLine ──> lookup ──> arity ──> subscriber ──> read-only ──> handler
//!                               │          │          mode           │            │
//!                               ▼          ▼           ▼             ▼            ▼
//!                          ERR unknown  ERR wrong   ERR Can't     READONLY     token or
//!                          command      number of   execute ...                error
//!                                       arguments
//! ```
//!
//! Every check runs before the handler, so a rejected request has touched
//! nothing. Handlers in turn validate all of their own arguments before the
//! first write.

use crate::commands::request::{CommandLine, Request};
use crate::commands::table::CommandSpec;
use crate::error::{CommandError, CommandResult};
use crate::protocol::RespValue;
use crate::server::ServerContext;
use crate::session::Session;
use crate::storage::Database;
use std::sync::Arc;
use tracing::{debug, trace};

/// The result of executing one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub value: RespValue,
    /// Whether `value` is a sequence of frames to be written one by one
    pub split: bool,
}

impl Reply {
    fn single(value: RespValue) -> Self {
        Self {
            value,
            split: false,
        }
    }

    /// The frames to put on the wire, in order. An empty split reply still
    /// goes out as one (empty) frame.
    pub fn into_frames(self) -> Vec<RespValue> {
        match self.value {
            RespValue::Array(items) if self.split && !items.is_empty() => items,
            value => vec![value],
        }
    }
}

/// Executes frames on behalf of connections. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    context: Arc<ServerContext>,
}

impl CommandHandler {
    pub fn new(context: Arc<ServerContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// Executes one frame for `session`. Failures come back as error tokens.
    pub fn execute(&self, session: &Session, frame: RespValue) -> Reply {
        let line = match CommandLine::from_frame(frame) {
            Ok(line) => line,
            Err(err) => return Reply::single(err.into()),
        };
        let request = Request::new(line, session, &self.context);

        let split = self
            .context
            .commands()
            .lookup(request.name())
            .is_ok_and(|spec| spec.split_reply);

        match dispatch(&request) {
            Ok(value) => Reply { value, split },
            Err(err) => {
                debug!(
                    session = session.id(),
                    command = request.name(),
                    error = %err,
                    "Command failed"
                );
                Reply::single(err.into())
            }
        }
    }
}

/// Runs a request against the session's selected database.
pub fn dispatch(request: &Request<'_>) -> CommandResult {
    let spec = request.context().commands().lookup(request.name())?;
    check(spec, request)?;
    let index = request.session().db() as i64;
    let db = request.context().databases().select(index)?;
    invoke(spec, db, request)
}

/// Runs a request against an already chosen database. Used by scripts,
/// whose nested calls stay on the database the script was started on.
pub fn dispatch_in(db: &Database, request: &Request<'_>) -> CommandResult {
    let spec = request.context().commands().lookup(request.name())?;
    check(spec, request)?;
    invoke(spec, db, request)
}

fn check(spec: &CommandSpec, request: &Request<'_>) -> CommandResult<()> {
    if !spec.arity.admits(request.len()) {
        return Err(CommandError::WrongArgCount(spec.name.to_string()));
    }
    if !spec.pubsub_allowed && request.session().is_subscriber() {
        return Err(CommandError::SubscriberContext(spec.name.to_string()));
    }
    if !spec.read_only && request.context().is_read_only() {
        return Err(CommandError::ReadOnly);
    }
    Ok(())
}

fn invoke(spec: &CommandSpec, db: &Database, request: &Request<'_>) -> CommandResult {
    if spec.no_script && request.is_from_script() {
        return Err(CommandError::NotAllowedFromScript);
    }
    trace!(command = spec.name, params = request.len(), "Dispatching");
    (spec.handler)(db, request)
}
