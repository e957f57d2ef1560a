//! Game server accept loop
//!
//! Owns the shared registry and spawns one handler task per accepted
//! connection. The loop never waits on the tasks it spawns.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::{ServerConfig, SessionConfig};
use crate::connection::SharedConnection;
use crate::handler::handle_connection;
use crate::registry::Registry;

/// The match server
#[derive(Debug, Clone)]
pub struct GameServer {
    registry: Arc<Registry>,
    session: SessionConfig,
}

impl GameServer {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            registry: Arc::new(Registry::new(config.max_clients)),
            session: config.session(),
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Spawn the handler task for one connection
    pub fn spawn_connection(&self, connection: SharedConnection) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let session = self.session;
        tokio::spawn(async move {
            if let Err(e) = handle_connection(connection, registry, session).await {
                error!("Connection handler error: {}", e);
            }
        })
    }

    /// Accept connections forever
    pub async fn run(self, listener: TcpListener) {
        info!("Match server started");

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    self.spawn_connection(Arc::new(stream));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
