//! Rock/paper/scissors match server - Entry Point
//!
//! Loads configuration, starts the TCP listener and accepts connections.

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rps_server::{Args, GameServer, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // RUST_LOG takes precedence, e.g. RUST_LOG=rps_server=trace
    let default_filter = if args.debug {
        "rps_server=debug"
    } else {
        "rps_server=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = ServerConfig::load(&args)?;

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(
        "Match server listening on {} (max {} clients, {}s to move)",
        addr, config.max_clients, config.move_timeout_secs
    );

    GameServer::new(&config).run(listener).await;
    Ok(())
}
