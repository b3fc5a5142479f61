//! Parsed command requests.

use crate::error::{CommandError, CommandResult};
use crate::protocol::RespValue;
use crate::server::ServerContext;
use crate::session::Session;
use crate::storage::value::{parse_float, parse_integer};
use bytes::Bytes;

/// A command name and its raw parameters, lifted out of a RESP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub name: String,
    pub params: Vec<Bytes>,
}

impl CommandLine {
    pub fn new(name: impl AsRef<str>, params: Vec<Bytes>) -> Self {
        Self {
            name: name.as_ref().to_ascii_lowercase(),
            params,
        }
    }

    /// Accepts an array of bulk (or simple) strings; the first element is
    /// the command name.
    pub fn from_frame(frame: RespValue) -> CommandResult<Self> {
        let parts = frame
            .into_array()
            .ok_or(CommandError::InvalidRequest("expected an array of bulk strings"))?;

        let mut words = parts.into_iter().map(|part| match part {
            RespValue::BulkString(data) => Ok(data),
            RespValue::SimpleString(s) => Ok(Bytes::from(s)),
            _ => Err(CommandError::InvalidRequest("expected an array of bulk strings")),
        });

        let name = words
            .next()
            .ok_or(CommandError::InvalidRequest("empty command"))??;
        let params = words.collect::<CommandResult<Vec<_>>>()?;

        Ok(Self::new(String::from_utf8_lossy(&name), params))
    }
}

/// One command invocation as seen by a handler.
///
/// Requests are immutable. Nested calls from a script build a fresh one
/// with [`Request::scripted`].
#[derive(Debug)]
pub struct Request<'a> {
    name: String,
    params: Vec<Bytes>,
    session: &'a Session,
    context: &'a ServerContext,
    from_script: bool,
}

impl<'a> Request<'a> {
    pub fn new(line: CommandLine, session: &'a Session, context: &'a ServerContext) -> Self {
        Self {
            name: line.name,
            params: line.params,
            session,
            context,
            from_script: false,
        }
    }

    /// A request issued by a script through `redis.call`.
    pub fn scripted(line: CommandLine, session: &'a Session, context: &'a ServerContext) -> Self {
        Self {
            from_script: true,
            ..Self::new(line, session, context)
        }
    }

    /// Lowercase command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Bytes] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn session(&self) -> &'a Session {
        self.session
    }

    pub fn context(&self) -> &'a ServerContext {
        self.context
    }

    pub fn is_from_script(&self) -> bool {
        self.from_script
    }

    /// Parameter `index`; the dispatcher has already checked arity, so a
    /// miss here means a handler asked for an optional slot.
    pub fn param(&self, index: usize) -> CommandResult<&Bytes> {
        self.params
            .get(index)
            .ok_or_else(|| CommandError::WrongArgCount(self.name.clone()))
    }

    pub fn optional_param(&self, index: usize) -> Option<&Bytes> {
        self.params.get(index)
    }

    pub fn param_i64(&self, index: usize) -> CommandResult<i64> {
        parse_integer(self.param(index)?)
    }

    pub fn param_f64(&self, index: usize) -> CommandResult<f64> {
        parse_float(self.param(index)?)
    }

    /// Parameters from `index` to the end.
    pub fn params_from(&self, index: usize) -> &[Bytes] {
        self.params.get(index..).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(words: &[&str]) -> RespValue {
        RespValue::bulk_array(words.iter().map(|w| Bytes::from(w.to_string())))
    }

    #[test]
    fn test_command_line_from_frame() {
        let line = CommandLine::from_frame(frame(&["SeT", "k", "v"])).unwrap();
        assert_eq!(line.name, "set");
        assert_eq!(line.params, vec![Bytes::from("k"), Bytes::from("v")]);
    }

    #[test]
    fn test_command_line_rejects_bad_frames() {
        assert_eq!(
            CommandLine::from_frame(RespValue::array(vec![])).unwrap_err(),
            CommandError::InvalidRequest("empty command")
        );
        assert!(CommandLine::from_frame(RespValue::integer(1)).is_err());
        assert!(CommandLine::from_frame(RespValue::array(vec![
            RespValue::bulk_string(Bytes::from("get")),
            RespValue::integer(1),
        ]))
        .is_err());
    }
}
