//! Shared server state.
//!
//! One [`ServerContext`] is built at startup and shared by every connection.
//! It owns the database registry, the command table and the client registry,
//! and it handles the session lifecycle events the transport reports.

use crate::commands::CommandTable;
use crate::config::Config;
use crate::connection::{ClientRegistry, ConnectionStats};
use crate::protocol::RespValue;
use crate::pubsub;
use crate::session::Session;
use crate::storage::{Database, Databases, Entry, Value};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::Receiver;
use tracing::{debug, info};

/// Admin key holding the replication role.
pub const ROLE_KEY: &[u8] = b"role";

/// Admin key holding the set of attached replicas.
pub const SLAVES_KEY: &[u8] = b"slaves";

pub const ROLE_MASTER: &str = "master";
pub const ROLE_SLAVE: &str = "slave";

#[derive(Debug)]
pub struct ServerContext {
    databases: Arc<Databases>,
    commands: CommandTable,
    clients: ClientRegistry,
    stats: Arc<ConnectionStats>,
    port: u16,
    started_at: Instant,
}

impl ServerContext {
    pub fn new(config: &Config) -> Self {
        Self::with_databases(
            Arc::new(Databases::new(config.databases)),
            config.port,
            config.read_only,
        )
    }

    /// Builds a context around an existing registry and records the role in
    /// the admin database.
    pub fn with_databases(databases: Arc<Databases>, port: u16, read_only: bool) -> Self {
        let role = if read_only { ROLE_SLAVE } else { ROLE_MASTER };
        databases
            .admin()
            .put(Bytes::from_static(ROLE_KEY), Entry::string(role));

        Self {
            databases,
            commands: CommandTable::with_defaults(),
            clients: ClientRegistry::new(),
            stats: Arc::new(ConnectionStats::new()),
            port,
            started_at: Instant::now(),
        }
    }

    pub fn databases(&self) -> &Arc<Databases> {
        &self.databases
    }

    pub fn admin(&self) -> &Database {
        self.databases.admin()
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// `master` or `slave`, as recorded in the admin database.
    pub fn role(&self) -> &'static str {
        match self.admin().get_value(ROLE_KEY) {
            Some(Value::String(role)) if role.as_ref() == ROLE_SLAVE.as_bytes() => ROLE_SLAVE,
            _ => ROLE_MASTER,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.role() == ROLE_SLAVE
    }

    /// Number of replicas listed in the admin database.
    pub fn connected_slaves(&self) -> usize {
        self.admin().read(SLAVES_KEY, |entry| match entry.map(|e| &e.value) {
            Some(Value::Set(slaves)) => slaves.len(),
            _ => 0,
        })
    }

    /// A new client connected. Returns the queue its pushed frames arrive on.
    pub fn connect(&self, session: &Session) -> Receiver<RespValue> {
        debug!(session = session.id(), "Session opened");
        self.clients.register(session.id())
    }

    /// A client went away: drop its push queue and every subscription it held.
    pub fn disconnect(&self, session: &Session) {
        self.clients.unregister(session.id());
        let channels = pubsub::unsubscribe_all(self.admin(), session.id());
        session.clear_subscriptions();
        if !channels.is_empty() {
            info!(
                session = session.id(),
                channels = channels.len(),
                "Dropped subscriptions of disconnected session"
            );
        }
        debug!(session = session.id(), "Session closed");
    }
}
