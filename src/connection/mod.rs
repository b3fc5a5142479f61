//! Connection Module
//!
//! One async task per TCP client, plus the registry that lets other
//! sessions push frames to it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (main.rs)                                │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ accept() + spawn
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read bytes  │───>│ Parse RESP  │───>│ Execute cmd │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │                                               ▼             │
//! │  ┌─────────────┐                       ┌─────────────┐      │
//! │  │ Push queue  │──────────────────────>│ Write frame │      │
//! │  └──────▲──────┘                       └─────────────┘      │
//! └─────────┼───────────────────────────────────────────────────┘
//!           │ deliver(session, frame)
//! ┌─────────┴──────────┐
//! │   ClientRegistry   │ <── PUBLISH from any session
//! └────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use emberkv::commands::CommandHandler;
//! use emberkv::connection::handle_connection;
//! use emberkv::{Config, ServerContext};
//! use std::sync::Arc;
//!
//! let context = Arc::new(ServerContext::new(&Config::default()));
//! let handler = CommandHandler::new(context);
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, handler.clone()));
//! ```

pub mod clients;
pub mod handler;

pub use clients::ClientRegistry;
pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
