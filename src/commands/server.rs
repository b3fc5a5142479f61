//! Connection and server commands: `PING`, `ECHO`, `SELECT`, `QUIT`,
//! `INFO`, `DBSIZE`, `FLUSHDB`, `FLUSHALL`, `TIME`, `COMMAND`.

use crate::commands::request::Request;
use crate::commands::table::{Arity, CommandSpec, CommandTable};
use crate::error::{CommandError, CommandResult};
use crate::protocol::RespValue;
use crate::pubsub;
use crate::server::ServerContext;
use crate::storage::Database;
use bytes::Bytes;
use std::fmt::Write as _;
use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub fn register(table: &mut CommandTable) {
    table.register(CommandSpec::read("ping", Arity::AtLeast(0), ping).pubsub());
    table.register(CommandSpec::read("echo", Arity::Exact(1), echo));
    table.register(CommandSpec::read("select", Arity::Exact(1), select).no_script());
    table.register(CommandSpec::read("quit", Arity::Exact(0), quit).pubsub().no_script());
    table.register(CommandSpec::read("info", Arity::AtLeast(0), info));
    table.register(CommandSpec::read("dbsize", Arity::Exact(0), dbsize));
    table.register(CommandSpec::write("flushdb", Arity::Exact(0), flushdb));
    table.register(CommandSpec::write("flushall", Arity::Exact(0), flushall));
    table.register(CommandSpec::read("time", Arity::Exact(0), time));
    table.register(CommandSpec::read("command", Arity::AtLeast(0), command));
}

/// PING [message]
fn ping(_db: &Database, req: &Request<'_>) -> CommandResult {
    match req.params() {
        [] => Ok(RespValue::pong()),
        [message] => Ok(RespValue::BulkString(message.clone())),
        _ => Err(CommandError::WrongArgCount(req.name().to_string())),
    }
}

fn echo(_db: &Database, req: &Request<'_>) -> CommandResult {
    Ok(RespValue::BulkString(req.param(0)?.clone()))
}

/// SELECT index
fn select(_db: &Database, req: &Request<'_>) -> CommandResult {
    let index = req.param_i64(0)?;
    req.context().databases().select(index)?;
    req.session().select(index as usize);
    Ok(RespValue::ok())
}

/// QUIT. The connection closes once the reply is written.
fn quit(_db: &Database, req: &Request<'_>) -> CommandResult {
    req.session().close();
    Ok(RespValue::ok())
}

// ============================================================================
// INFO
// ============================================================================

const SECTIONS: [&str; 5] = ["server", "replication", "clients", "stats", "keyspace"];

fn section(context: &ServerContext, name: &str) -> Option<Vec<(String, String)>> {
    let entries: Vec<(String, String)> = match name {
        "server" => vec![
            ("redis_version".into(), crate::VERSION.into()),
            ("tcp_port".into(), context.port().to_string()),
            ("os".into(), std::env::consts::OS.into()),
            ("uptime_in_seconds".into(), context.uptime().as_secs().to_string()),
        ],
        "replication" => vec![
            ("role".into(), context.role().into()),
            ("connected_slaves".into(), context.connected_slaves().to_string()),
        ],
        "clients" => vec![(
            "connected_clients".into(),
            context.clients().len().to_string(),
        )],
        "stats" => {
            let stats = context.stats();
            let expired: u64 = context.databases().iter().map(|db| db.stats().expired).sum();
            vec![
                (
                    "total_connections_received".into(),
                    stats.connections_accepted.load(Ordering::Relaxed).to_string(),
                ),
                (
                    "total_commands_processed".into(),
                    stats.commands_processed.load(Ordering::Relaxed).to_string(),
                ),
                ("expired_keys".into(), expired.to_string()),
                (
                    "pubsub_channels".into(),
                    pubsub::channel_count(context.admin()).to_string(),
                ),
            ]
        }
        "keyspace" => context
            .databases()
            .iter()
            .enumerate()
            .filter(|(_, db)| !db.is_empty())
            .map(|(i, db)| {
                (
                    format!("db{}", i),
                    format!("keys={},expires={}", db.size(), db.expires_count()),
                )
            })
            .collect(),
        _ => return None,
    };
    Some(entries)
}

/// Renders `# section` headers followed by `key:value` lines, with a blank
/// line after each section.
pub fn render_info(context: &ServerContext, filter: Option<&str>) -> String {
    let names: Vec<&str> = match filter {
        Some(name) => vec![name],
        None => SECTIONS.to_vec(),
    };

    let mut out = String::new();
    for name in names {
        let Some(entries) = section(context, name) else {
            continue;
        };
        let _ = write!(out, "# {}\r\n", name);
        for (key, value) in entries {
            let _ = write!(out, "{}:{}\r\n", key, value);
        }
        out.push_str("\r\n");
    }
    out
}

/// INFO [section]
fn info(_db: &Database, req: &Request<'_>) -> CommandResult {
    let filter = req
        .optional_param(0)
        .map(|name| String::from_utf8_lossy(name).to_ascii_lowercase());
    let text = render_info(req.context(), filter.as_deref());
    Ok(RespValue::bulk_string(Bytes::from(text)))
}

// ============================================================================
// Keyspace maintenance
// ============================================================================

fn dbsize(db: &Database, _req: &Request<'_>) -> CommandResult {
    Ok(RespValue::integer(db.size() as i64))
}

fn flushdb(db: &Database, _req: &Request<'_>) -> CommandResult {
    db.clear();
    Ok(RespValue::ok())
}

/// FLUSHALL. The admin database is left alone.
fn flushall(_db: &Database, req: &Request<'_>) -> CommandResult {
    for db in req.context().databases().iter() {
        db.clear();
    }
    Ok(RespValue::ok())
}

/// TIME, as `[seconds, microseconds]`.
fn time(_db: &Database, _req: &Request<'_>) -> CommandResult {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    Ok(RespValue::bulk_array([
        Bytes::from(now.as_secs().to_string()),
        Bytes::from(now.subsec_micros().to_string()),
    ]))
}

/// COMMAND. Lists registered command names.
fn command(_db: &Database, req: &Request<'_>) -> CommandResult {
    let names = req.context().commands().names();
    Ok(RespValue::bulk_array(
        names.into_iter().map(|name| Bytes::from_static(name.as_bytes())),
    ))
}
