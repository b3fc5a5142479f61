//! Lua scripting bridge.
//!
//! Every `EVAL` gets a fresh interpreter with `KEYS`, `ARGV` and a `redis`
//! table. `redis.call` and `redis.pcall` build a scripted [`Request`] and run
//! it through the dispatcher against the database the script was started on.
//!
//! ## Value conversion
//!
//! ```text
//!   reply token          ->  Lua                 Lua            ->  reply token
//!   ─────────────────────────────────────        ──────────────────────────────
//!   status / bulk        ->  string              nil / false    ->  nil
//!   integer              ->  integer             true           ->  integer 1
//!   nil                  ->  false               integer        ->  integer
//!   array                ->  table (1-indexed)   number         ->  integer (truncated)
//!   error                ->  raised error        string         ->  bulk
//!                                                {err = msg}    ->  error
//!                                                {ok = msg}     ->  status
//!                                                table          ->  array
//! ```
//!
//! Nested calls take and release their own shard locks; nothing is held
//! across the whole script.

use crate::commands::handler::dispatch_in;
use crate::commands::request::{CommandLine, Request};
use crate::error::{CommandError, CommandResult};
use crate::protocol::RespValue;
use crate::server::ServerContext;
use crate::session::Session;
use crate::storage::Database;
use bytes::Bytes;
use mlua::{Lua, MultiValue, Table, Value as LuaValue};
use tracing::debug;

/// Globals removed from every interpreter before the script runs.
const BLOCKED_GLOBALS: [&str; 8] = [
    "os", "io", "debug", "package", "require", "dofile", "loadfile", "load",
];

/// Runs scripts on behalf of one session against one database.
pub struct ScriptBridge<'a> {
    db: &'a Database,
    session: &'a Session,
    context: &'a ServerContext,
}

impl<'a> ScriptBridge<'a> {
    pub fn new(db: &'a Database, session: &'a Session, context: &'a ServerContext) -> Self {
        Self {
            db,
            session,
            context,
        }
    }

    /// Executes one command on behalf of the script.
    pub fn call(&self, name: &str, args: Vec<Bytes>) -> CommandResult {
        let request = Request::scripted(CommandLine::new(name, args), self.session, self.context);
        dispatch_in(self.db, &request)
    }

    /// Runs `script` with the given `KEYS` and `ARGV` and converts its
    /// return value into a reply token.
    pub fn eval(&self, script: &str, keys: &[Bytes], argv: &[Bytes]) -> CommandResult {
        let lua = Lua::new();
        self.prepare(&lua, keys, argv).map_err(script_error)?;

        lua.scope(|scope| {
            let call = scope.create_function(|lua, args: MultiValue| self.lua_call(lua, args, false))?;
            let pcall = scope.create_function(|lua, args: MultiValue| self.lua_call(lua, args, true))?;

            let redis = lua.create_table()?;
            redis.set("call", call)?;
            redis.set("pcall", pcall)?;
            lua.globals().set("redis", redis)?;

            let result: LuaValue = lua.load(script).set_name("@user_script").eval()?;
            Ok(lua_to_resp(result))
        })
        .map_err(|err| {
            let err = script_error(err);
            debug!(session = self.session.id(), error = %err, "Script failed");
            err
        })
    }

    fn prepare(&self, lua: &Lua, keys: &[Bytes], argv: &[Bytes]) -> mlua::Result<()> {
        let globals = lua.globals();
        for name in BLOCKED_GLOBALS {
            globals.set(name, mlua::Nil)?;
        }
        globals.set("KEYS", string_table(lua, keys)?)?;
        globals.set("ARGV", string_table(lua, argv)?)?;
        Ok(())
    }

    /// Body of `redis.call` (raises on error) and `redis.pcall` (returns an
    /// `{err = ...}` table instead).
    fn lua_call(&self, lua: &Lua, args: MultiValue, protected: bool) -> mlua::Result<LuaValue> {
        let outcome = args
            .into_iter()
            .map(script_argument)
            .collect::<CommandResult<Vec<_>>>()
            .and_then(|mut words| {
                if words.is_empty() {
                    return Err(CommandError::Script(
                        "Please specify at least one argument for redis.call()".into(),
                    ));
                }
                let name = words.remove(0);
                self.call(&String::from_utf8_lossy(&name), words)
            });

        let message = match outcome {
            Ok(RespValue::Error(message)) => message,
            Ok(value) => return resp_to_lua(lua, value),
            Err(err) => err.to_string(),
        };
        if protected {
            let table = lua.create_table()?;
            table.set("err", message)?;
            Ok(LuaValue::Table(table))
        } else {
            Err(mlua::Error::RuntimeError(message))
        }
    }
}

fn string_table(lua: &Lua, items: &[Bytes]) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    for (i, item) in items.iter().enumerate() {
        table.set(i + 1, lua.create_string(&item[..])?)?;
    }
    Ok(table)
}

/// Arguments to `redis.call` must be strings or numbers.
fn script_argument(value: LuaValue) -> CommandResult<Bytes> {
    match value {
        LuaValue::String(s) => Ok(Bytes::copy_from_slice(&s.as_bytes())),
        LuaValue::Integer(n) => Ok(Bytes::from(n.to_string())),
        LuaValue::Number(n) => Ok(Bytes::from(n.to_string())),
        _ => Err(CommandError::Script(
            "Lua redis() command arguments must be strings or integers".into(),
        )),
    }
}

/// Converts a reply token into a Lua value. Error tokens become a raised
/// Lua error.
pub fn resp_to_lua(lua: &Lua, value: RespValue) -> mlua::Result<LuaValue> {
    match value {
        RespValue::SimpleString(s) => Ok(LuaValue::String(lua.create_string(&s)?)),
        RespValue::BulkString(data) => Ok(LuaValue::String(lua.create_string(&data[..])?)),
        RespValue::Integer(n) => Ok(LuaValue::Integer(n)),
        RespValue::Null => Ok(LuaValue::Boolean(false)),
        RespValue::Error(message) => Err(mlua::Error::RuntimeError(message)),
        RespValue::Array(items) => {
            let table = lua.create_table()?;
            for (i, item) in items.into_iter().enumerate() {
                table.set(i + 1, resp_to_lua(lua, item)?)?;
            }
            Ok(LuaValue::Table(table))
        }
    }
}

/// Converts a script's return value into a reply token.
pub fn lua_to_resp(value: LuaValue) -> RespValue {
    match value {
        LuaValue::Nil | LuaValue::Boolean(false) => RespValue::Null,
        LuaValue::Boolean(true) => RespValue::integer(1),
        LuaValue::Integer(n) => RespValue::integer(n),
        LuaValue::Number(n) => RespValue::integer(n as i64),
        LuaValue::String(s) => RespValue::BulkString(Bytes::copy_from_slice(&s.as_bytes())),
        LuaValue::Table(table) => table_to_resp(table),
        _ => RespValue::Null,
    }
}

fn table_to_resp(table: Table) -> RespValue {
    if let Ok(Some(message)) = table.get::<Option<String>>("err") {
        return RespValue::error(message);
    }
    if let Ok(Some(status)) = table.get::<Option<String>>("ok") {
        return RespValue::simple_string(status);
    }
    let items = table
        .sequence_values::<LuaValue>()
        .map_while(Result::ok)
        .map(lua_to_resp)
        .collect();
    RespValue::array(items)
}

/// Unwraps callback errors so the client sees the message that was raised.
fn script_error(err: mlua::Error) -> CommandError {
    match err {
        mlua::Error::CallbackError { cause, .. } => script_error(cause.as_ref().clone()),
        mlua::Error::RuntimeError(message) => CommandError::Script(message),
        other => CommandError::Script(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Databases;
    use std::sync::Arc;

    fn context() -> ServerContext {
        ServerContext::with_databases(Arc::new(Databases::new(2)), 6379, false)
    }

    fn words(items: &[&str]) -> Vec<Bytes> {
        items.iter().map(|w| Bytes::from(w.to_string())).collect()
    }

    #[test]
    fn test_call_round_trip() {
        let ctx = context();
        let session = Session::with_id("script", None);
        let db = ctx.databases().select(0).unwrap();
        let bridge = ScriptBridge::new(db, &session, &ctx);

        let reply = bridge
            .eval(
                "redis.call('set', 'k', 'v'); return redis.call('get', 'k')",
                &[],
                &[],
            )
            .unwrap();
        assert_eq!(reply, RespValue::bulk_string(Bytes::from("v")));

        let reply = bridge.eval("return redis.call('incr', 'missing')", &[], &[]).unwrap();
        assert_eq!(reply, RespValue::integer(1));
    }

    #[test]
    fn test_keys_and_argv() {
        let ctx = context();
        let session = Session::with_id("script", None);
        let db = ctx.databases().select(0).unwrap();
        let bridge = ScriptBridge::new(db, &session, &ctx);

        let reply = bridge
            .eval(
                "redis.call('set', KEYS[1], ARGV[1]); return {KEYS[1], ARGV[1], #ARGV}",
                &words(&["name"]),
                &words(&["ariz", "extra"]),
            )
            .unwrap();
        assert_eq!(
            reply,
            RespValue::array(vec![
                RespValue::bulk_string(Bytes::from("name")),
                RespValue::bulk_string(Bytes::from("ariz")),
                RespValue::integer(2),
            ])
        );
        assert_eq!(db.get_value(b"name").unwrap().as_string().unwrap(), "ariz");
    }

    #[test]
    fn test_call_raises_and_pcall_returns_error() {
        let ctx = context();
        let session = Session::with_id("script", None);
        let db = ctx.databases().select(0).unwrap();
        let bridge = ScriptBridge::new(db, &session, &ctx);
        db.put(Bytes::from("list"), crate::storage::Entry::string("not a list"));

        let err = bridge.eval("return redis.call('lpush', 'list', 'x')", &[], &[]).unwrap_err();
        assert_eq!(err, CommandError::Script(CommandError::WrongType.to_string()));

        let reply = bridge.eval("return redis.pcall('lpush', 'list', 'x')", &[], &[]).unwrap();
        assert_eq!(reply, RespValue::Error(CommandError::WrongType.to_string()));

        let reply = bridge
            .eval(
                "local ok, e = pcall(redis.call, 'nosuch'); if ok then return 1 end; return 0",
                &[],
                &[],
            )
            .unwrap();
        assert_eq!(reply, RespValue::integer(0));
    }

    #[test]
    fn test_return_value_conversion() {
        let ctx = context();
        let session = Session::with_id("script", None);
        let db = ctx.databases().select(0).unwrap();
        let bridge = ScriptBridge::new(db, &session, &ctx);

        assert_eq!(bridge.eval("return nil", &[], &[]).unwrap(), RespValue::Null);
        assert_eq!(bridge.eval("return true", &[], &[]).unwrap(), RespValue::integer(1));
        assert_eq!(bridge.eval("return 3.9", &[], &[]).unwrap(), RespValue::integer(3));
        assert_eq!(
            bridge.eval("return {ok = 'FINE'}", &[], &[]).unwrap(),
            RespValue::simple_string("FINE")
        );
        assert_eq!(
            bridge.eval("return {err = 'boom'}", &[], &[]).unwrap(),
            RespValue::error("boom")
        );
        assert_eq!(
            bridge.eval("return redis.call('get', 'nothing')", &[], &[]).unwrap(),
            RespValue::Null
        );
    }

    #[test]
    fn test_nested_blocked_commands_and_sandbox() {
        let ctx = context();
        let session = Session::with_id("script", None);
        let db = ctx.databases().select(0).unwrap();
        let bridge = ScriptBridge::new(db, &session, &ctx);

        let err = bridge.eval("return redis.call('subscribe', 'x')", &[], &[]).unwrap_err();
        assert_eq!(
            err,
            CommandError::Script(CommandError::NotAllowedFromScript.to_string())
        );
        assert!(!session.is_subscriber());

        assert_eq!(bridge.eval("return os == nil", &[], &[]).unwrap(), RespValue::integer(1));
        assert!(bridge.eval("this is not lua", &[], &[]).is_err());
    }
}
