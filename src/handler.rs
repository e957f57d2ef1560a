//! Connection handler
//!
//! Handles one client from handshake to hand-off: reads the name, registers
//! the player, tells it to wait, and searches for an opponent. The task that
//! claims a pair runs the match; the claimed player's task simply returns,
//! leaving its connection to the opponent's session.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::connection::SharedConnection;
use crate::error::AppError;
use crate::matchmaker::{Matchmaker, WaitOutcome};
use crate::message::{decode_name, ServerMessage, NAME_BUF_LEN};
use crate::registry::Registry;
use crate::session::MatchSession;

/// Handle a newly accepted connection
///
/// The name is whatever a single receive delivers, so a name split across
/// several TCP segments is cut at the first one.
pub async fn handle_connection(
    connection: SharedConnection,
    registry: Arc<Registry>,
    config: SessionConfig,
) -> Result<(), AppError> {
    let peer_addr = connection.peer_addr();

    let mut buf = [0u8; NAME_BUF_LEN - 1];
    let n = match connection.recv(&mut buf).await {
        Ok(0) => {
            debug!("Connection from {} closed before sending a name", peer_addr);
            connection.close();
            return Ok(());
        }
        Ok(n) => n,
        Err(e) => {
            connection.close();
            return Err(e.into());
        }
    };
    let name = decode_name(&buf[..n]);

    let slot = match registry.register(connection.clone(), name.clone()).await {
        Ok(slot) => slot,
        Err(AppError::RegistryFull) => {
            warn!("Maximum number of clients reached, rejecting {}", peer_addr);
            connection.close();
            return Ok(());
        }
        Err(e) => {
            connection.close();
            return Err(e);
        }
    };
    info!("Client {} '{}' registered from {}", slot, name, peer_addr);

    if let Err(e) = connection.send(&ServerMessage::Waiting.to_bytes()).await {
        warn!("Failed to send waiting notice to {}: {}", slot, e);
    }

    let matchmaker = Matchmaker::new(registry.clone(), config.poll_interval)
        .with_opponent_timeout(config.opponent_timeout);

    match matchmaker.await_opponent(slot).await? {
        WaitOutcome::Paired(pairing) => {
            MatchSession::new(registry, pairing, config.move_timeout)
                .run()
                .await;
        }
        WaitOutcome::Claimed => {
            debug!("Client {} handed over to its opponent's session", slot);
        }
        WaitOutcome::TimedOut(connection) => {
            let _ = connection.send(&ServerMessage::Incomplete.to_bytes()).await;
            connection.close();
        }
    }

    Ok(())
}
