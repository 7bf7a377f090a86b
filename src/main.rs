//! respframe server
//!
//! This is the main entry point for the server binary.
//! It parses the configuration, builds the command registry and handles
//! incoming connections.

use respframe::commands::{builtin, Dispatcher, Keyspace};
use respframe::config::{help_text, ConfigAction, ServerConfig};
use respframe::connection::{handle_connection, ConnectionStats};
use respframe::protocol::DecoderLimits;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn print_banner(config: &ServerConfig) {
    println!(
        r#"
respframe v{} - RESP command framing and dispatch
──────────────────────────────────────────────────
Server started on {}
Limits: {} args, {} byte bulk, {} byte inline
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        respframe::VERSION,
        config.bind_address(),
        config.limits.max_array_len,
        config.limits.max_bulk_len,
        config.limits.max_inline_len,
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = match ServerConfig::from_args(std::env::args().skip(1)) {
        Ok(ConfigAction::Run(config)) => config,
        Ok(ConfigAction::Help) => {
            println!("{}", help_text());
            return Ok(());
        }
        Ok(ConfigAction::Version) => {
            println!("respframe version {}", respframe::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", help_text());
            std::process::exit(1);
        }
    };

    // Set up logging; RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Print the banner
    print_banner(&config);

    // Build the command table (shared across all connections)
    let registry = Arc::new(builtin::registry(Arc::new(Keyspace::new())));
    info!(commands = registry.len(), "Command registry initialized");
    let dispatcher = Arc::new(Dispatcher::new(registry));

    // Create connection statistics
    let stats = Arc::new(ConnectionStats::new());

    // Bind the TCP listener
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    // Main accept loop
    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&dispatcher), config.limits, Arc::clone(&stats)) => {}
        _ = shutdown => {}
    }

    let faults = dispatcher.faults();
    if faults > 0 {
        warn!(faults, "Command handlers failed unexpectedly during this run");
    }
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        protocol_errors = stats.protocol_errors.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    limits: DecoderLimits,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let dispatcher = Arc::clone(&dispatcher);
                let stats = Arc::clone(&stats);

                // Spawn a task to handle this connection
                tokio::spawn(async move {
                    handle_connection(stream, addr, dispatcher, limits, stats).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
