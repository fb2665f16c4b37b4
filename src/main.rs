//! wheelkv server entry point.
//!
//! Reads the configuration, starts the engine and its timing wheel, and
//! serves clients until Ctrl+C.

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wheelkv::config::{help_text, Config, Startup};
use wheelkv::connection::{handle_connection, ConnectionStats};
use wheelkv::storage::Db;

fn print_banner(config: &Config) {
    println!(
        r#"
wheelkv v{} - in-memory key-value store
──────────────────────────────────────────────
Listening on {}
Use Ctrl+C to shut down.
"#,
        wheelkv::VERSION,
        config.bind_address()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_args(std::env::args().skip(1))? {
        Startup::Run(config) => config,
        Startup::Help => {
            print!("{}", help_text());
            return Ok(());
        }
        Startup::Version => {
            println!("wheelkv {}", wheelkv::VERSION);
            return Ok(());
        }
    };

    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let db_config = config.db_config();
    let db = Arc::new(Db::new(db_config.clone()));
    info!(
        shards = db_config.shard_count,
        locks = db_config.lock_count,
        tick_ms = db_config.wheel.tick.as_millis() as u64,
        slots = db_config.wheel.slots,
        "Engine started"
    );

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    print_banner(&config);

    let stats = Arc::new(ConnectionStats::new());

    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&db), Arc::clone(&stats)) => {}
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Shutdown signal received");
        }
    }

    db.shutdown();
    info!(
        connections = stats.accepted(),
        commands = stats.commands(),
        keys = db.len(),
        "Server stopped"
    );
    Ok(())
}

async fn accept_loop(listener: TcpListener, db: Arc<Db>, stats: Arc<ConnectionStats>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    error!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
                }
                tokio::spawn(handle_connection(
                    stream,
                    addr,
                    Arc::clone(&db),
                    Arc::clone(&stats),
                ));
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
