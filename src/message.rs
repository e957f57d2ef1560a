//! Text protocol definitions
//!
//! The protocol is plain newline-terminated text with no framing. The server
//! sends the fixed notifications of `ServerMessage`; the client sends its name
//! once after connecting and later a single move, each read with one receive
//! call into a bounded buffer.

use std::fmt;

/// Size of the name buffer; at most `NAME_BUF_LEN - 1` bytes are read
pub const NAME_BUF_LEN: usize = 50;

/// Size of the move buffer; at most `MOVE_BUF_LEN - 1` bytes are read
pub const MOVE_BUF_LEN: usize = 16;

/// Name used when a client sends an empty one
pub const DEFAULT_NAME: &str = "Player";

/// Server → Client notification
///
/// `Display` renders the exact line sent on the wire, trailing newline
/// included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Registered, no opponent yet
    Waiting,
    /// Paired with an opponent
    MatchFound { opponent: String },
    /// Both moves, from the receiver's point of view
    MovesRevealed { mine: String, theirs: String },
    /// Both players made the same move
    Draw,
    /// A player won
    Winner { name: String },
    /// The match ended without a result
    Incomplete,
}

impl ServerMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Waiting => writeln!(f, "Waiting for an opponent..."),
            ServerMessage::MatchFound { opponent } => {
                writeln!(f, "Match found with {}! Please make your move.", opponent)
            }
            ServerMessage::MovesRevealed { mine, theirs } => {
                writeln!(f, "Your move is {}. Your opponent's move is {}.", mine, theirs)
            }
            ServerMessage::Draw => writeln!(f, "It's a draw!"),
            ServerMessage::Winner { name } => writeln!(f, "{} wins!", name),
            ServerMessage::Incomplete => {
                writeln!(f, "An error occurred. The game could not be completed.")
            }
        }
    }
}

/// Take the first line of a received chunk
///
/// Stops at the first newline or NUL; anything after it in the same chunk is
/// dropped.
fn first_line(bytes: &[u8]) -> String {
    let end = bytes
        .iter()
        .position(|&b| b == b'\n' || b == 0)
        .unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Decode the display name from the handshake chunk
///
/// The caller reads at most `NAME_BUF_LEN - 1` bytes, so longer names arrive
/// already truncated.
pub fn decode_name(bytes: &[u8]) -> String {
    let bytes = &bytes[..bytes.len().min(NAME_BUF_LEN - 1)];
    let name = first_line(bytes).trim_end().to_string();
    if name.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        name
    }
}

/// Decode a move token
///
/// No validation: whatever the client sent is the token. Comparison against
/// the known moves stays case-sensitive.
pub fn decode_move(bytes: &[u8]) -> String {
    let bytes = &bytes[..bytes.len().min(MOVE_BUF_LEN - 1)];
    first_line(bytes).trim().to_string()
}
