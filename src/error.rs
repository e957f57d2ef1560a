//! Error types for the match server
//!
//! Defines application-level errors and the reasons a match can end
//! without a result. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::types::SlotId;

/// Application-level errors
///
/// Covers I/O and configuration failures as well as registry rejections.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal for the connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A setting is outside its accepted range
    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    /// Registry has no free slot left
    #[error("Registry is full")]
    RegistryFull,

    /// Slot is vacant or was reused by another connection
    #[error("Unknown slot: {0}")]
    UnknownSlot(SlotId),
}

/// Reasons a match ends as Incomplete
///
/// All variants produce the same notification to both participants;
/// they only differ in how they are logged.
#[derive(Debug, Error)]
pub enum MatchError {
    /// Deadline passed before both moves arrived
    #[error("Move collection timed out")]
    Timeout,

    /// A participant closed the connection or it was reset
    #[error("Player {0} disconnected")]
    PeerDisconnected(SlotId),

    /// The readiness wait itself failed
    #[error("Waiting for moves failed: {0}")]
    WaitFailed(std::io::Error),
}
