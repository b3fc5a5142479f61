//! # EmberKV - An In-Memory, Redis-Compatible Key-Value Server
//!
//! EmberKV speaks RESP and keeps typed values (strings, lists, sets, hashes,
//! sorted sets) in a set of numbered databases. Keys can carry a deadline,
//! clients can publish and subscribe, and Lua scripts can call back into the
//! command set.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              EmberKV                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐   ┌───────────┐  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │<──│  Script   │  │
//! │  │ (Listener)  │    │  + Session  │    │  Handler    │──>│  Bridge   │  │
//! │  └─────────────┘    └──────▲──────┘    └──────┬──────┘   └───────────┘  │
//! │                            │ push             │                         │
//! │                     ┌──────┴──────┐           ▼                         │
//! │                     │  Clients    │    ┌──────────────────────────────┐ │
//! │                     │  Registry   │    │ Databases: db0 .. dbN, admin │ │
//! │                     └──────▲──────┘    │  each 64 RwLock shards       │ │
//! │                            │           └──────────────▲───────────────┘ │
//! │                     PUBLISH fan-out                   │                 │
//! │                     (channel sets in admin db)        │                 │
//! │                                        ┌──────────────┴───────────────┐ │
//! │                                        │ ExpirySweeper (Tokio task)   │ │
//! │                                        └──────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use emberkv::commands::CommandHandler;
//! use emberkv::connection::handle_connection;
//! use emberkv::storage::ExpirySweeper;
//! use emberkv::{Config, ServerContext};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let context = Arc::new(ServerContext::new(&config));
//!     let _sweeper = ExpirySweeper::start(Arc::clone(context.databases()), config.expiry());
//!
//!     let listener = TcpListener::bind(config.bind_address()).await?;
//!     let handler = CommandHandler::new(context);
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         tokio::spawn(handle_connection(stream, addr, handler.clone()));
//!     }
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP frames and parser
//! - [`storage`]: values, sharded databases, registry, expiry sweeper
//! - [`commands`]: command table, dispatcher, and handlers
//! - [`pubsub`]: channel membership kept in the admin database
//! - [`scripting`]: Lua bridge used by `EVAL`
//! - [`session`], [`server`], [`connection`]: per-client and shared state
//!
//! ## Design Highlights
//!
//! ### Per-key atomicity
//!
//! Every compound operation (conditional set, increment, collection
//! mutation) runs under its key's shard write lock, so concurrent clients
//! never observe a half-applied change and set-if-absent has one winner.
//!
//! ### Lazy + Active Expiry
//!
//! 1. **Lazy**: a lookup that finds an expired key removes it and reports
//!    it absent
//! 2. **Active**: a background task walks every database through the same
//!    lookup path

pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod pubsub;
pub mod scripting;
pub mod server;
pub mod session;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::{Config, DEFAULT_HOST, DEFAULT_PORT};
pub use connection::{handle_connection, ClientRegistry, ConnectionStats};
pub use error::{CommandError, CommandResult};
pub use protocol::{ParseError, RespParser, RespValue};
pub use server::ServerContext;
pub use session::Session;
pub use storage::{Database, Databases, Entry, ExpiryConfig, ExpirySweeper, Value};

/// Version of EmberKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
