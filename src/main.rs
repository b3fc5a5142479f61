//! EmberKV server binary.
//!
//! Parses the configuration, installs logging, and accepts connections until
//! Ctrl+C.

use clap::Parser;
use emberkv::commands::CommandHandler;
use emberkv::connection::handle_connection;
use emberkv::storage::ExpirySweeper;
use emberkv::{Config, ServerContext};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_banner(config: &Config, context: &ServerContext) {
    println!(
        r#"
   ___           _               _  ____   __
  | __|_ __  ___| |__  ___ _ _  | |/ /\ \ / /
  | _|| '  \/ _ \ '_ \/ -_) '_| | ' <  \ V /
  |___|_|_|_\___/_.__/\___|_|   |_|\_\  \_/

EmberKV v{} - In-Memory Key-Value Server
──────────────────────────────────────────────────────────────
Listening on {} ({} databases, role: {})
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        emberkv::VERSION,
        config.bind_address(),
        context.databases().len(),
        context.role(),
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let context = Arc::new(ServerContext::new(&config));
    info!(
        databases = context.databases().len(),
        role = context.role(),
        "Keyspace initialized"
    );

    let _sweeper = ExpirySweeper::start(Arc::clone(context.databases()), config.expiry());

    let listener = TcpListener::bind(config.bind_address()).await?;
    print_banner(&config, &context);
    info!("Listening on {}", config.bind_address());

    let handler = CommandHandler::new(Arc::clone(&context));

    tokio::select! {
        _ = accept_loop(listener, handler) => {}
        result = signal::ctrl_c() => {
            result?;
            info!("Shutdown signal received, stopping server...");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Accepts connections forever, one task per client.
async fn accept_loop(listener: TcpListener, handler: CommandHandler) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle_connection(stream, addr, handler.clone()));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
