//! Two-player Rock/Paper/Scissors Match Server Library
//!
//! A plain-TCP server that pairs connected clients into two-player matches,
//! collects one move from each under a shared deadline, and reports the
//! winner to both.
//!
//! # Flow
//! - A client connects and sends its name
//! - It is registered in the shared `Registry` and told to wait
//! - The `Matchmaker` claims the lowest-index idle opponent for it
//! - A `MatchSession` announces the match, collects both moves, sends the
//!   result and closes both connections
//!
//! # Architecture
//! - `Registry` is the only shared state, guarded by a single lock
//! - Each connection runs in its own task; the task that makes a pairing
//!   runs the session for both players
//! - No I/O happens while the registry lock is held
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use rps_server::{GameServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let listener = TcpListener::bind(config.listen_addr()).await.unwrap();
//!     GameServer::new(&config).run(listener).await;
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod matchmaker;
pub mod message;
pub mod outcome;
pub mod player;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use config::{Args, ServerConfig, SessionConfig};
pub use connection::{Connection, SharedConnection};
pub use error::{AppError, MatchError};
pub use handler::handle_connection;
pub use matchmaker::{Matchmaker, WaitOutcome};
pub use message::ServerMessage;
pub use outcome::{resolve, Outcome};
pub use player::Player;
pub use registry::{Pairing, Participant, Registry};
pub use server::GameServer;
pub use session::{MatchOutcome, MatchSession, SessionState};
pub use types::{MatchId, SlotId};
