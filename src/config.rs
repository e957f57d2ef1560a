//! Server configuration
//!
//! Settings come from built-in defaults, optionally replaced by a JSON file
//! (`--config`), then overridden by individual command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::error::AppError;
use crate::matchmaker::DEFAULT_POLL_INTERVAL;
use crate::registry::DEFAULT_CAPACITY;
use crate::session::DEFAULT_MOVE_TIMEOUT;

/// Upper bound for the move and opponent timeouts (one day)
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Upper bound for the matchmaking poll interval (one minute)
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;

/// Command-line arguments
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Port to listen on
    pub port: Option<u16>,

    /// Address to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum number of concurrently registered clients
    #[arg(long)]
    pub max_clients: Option<usize>,

    /// Seconds both players get to send their move
    #[arg(long)]
    pub move_timeout: Option<u64>,

    /// Seconds a client waits for an opponent before giving up
    #[arg(long)]
    pub opponent_timeout: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

/// Server settings
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Registry capacity
    pub max_clients: usize,
    pub move_timeout_secs: u64,
    /// Fallback interval between opponent searches
    pub poll_interval_ms: u64,
    /// Unset means wait for an opponent forever
    pub opponent_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_clients: DEFAULT_CAPACITY,
            move_timeout_secs: DEFAULT_MOVE_TIMEOUT.as_secs(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            opponent_timeout_secs: None,
        }
    }
}

impl ServerConfig {
    /// Parse a JSON configuration file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Build the effective configuration from command-line arguments
    pub fn load(args: &Args) -> Result<Self, AppError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(args);
        config.validate()?;
        Ok(config)
    }

    /// Reject timing values the server cannot schedule
    pub fn validate(&self) -> Result<(), AppError> {
        check_range("move_timeout_secs", self.move_timeout_secs, MAX_TIMEOUT_SECS)?;
        check_range("poll_interval_ms", self.poll_interval_ms, MAX_POLL_INTERVAL_MS)?;
        if let Some(secs) = self.opponent_timeout_secs {
            check_range("opponent_timeout_secs", secs, MAX_TIMEOUT_SECS)?;
        }
        Ok(())
    }

    fn apply(&mut self, args: &Args) {
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(max_clients) = args.max_clients {
            self.max_clients = max_clients;
        }
        if let Some(secs) = args.move_timeout {
            self.move_timeout_secs = secs;
        }
        if args.opponent_timeout.is_some() {
            self.opponent_timeout_secs = args.opponent_timeout;
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Timing settings handed to every connection task
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            move_timeout: Duration::from_secs(self.move_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            opponent_timeout: self.opponent_timeout_secs.map(Duration::from_secs),
        }
    }
}

fn check_range(name: &'static str, value: u64, max: u64) -> Result<(), AppError> {
    if (1..=max).contains(&value) {
        Ok(())
    } else {
        Err(AppError::InvalidSetting {
            name,
            reason: format!("{} is not in 1..={}", value, max),
        })
    }
}

/// Per-connection timing settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub move_timeout: Duration,
    pub poll_interval: Duration,
    pub opponent_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        ServerConfig::default().session()
    }
}
