//! Player record definition
//!
//! Represents a registered client: name, current move, matched flag and
//! the connection handle used to talk to it.

use crate::connection::SharedConnection;

/// Registered player
///
/// Lives in a registry slot from registration until its match closes.
/// The `matched` flag and the move are only mutated under the registry lock.
#[derive(Debug)]
pub struct Player {
    /// Display name
    pub name: String,
    /// Last move received, empty when unset
    pub current_move: String,
    /// Currently paired into a match
    pub matched: bool,
    /// Connection to the client
    pub connection: SharedConnection,
}

impl Player {
    /// Create an idle player with no move
    pub fn new(name: String, connection: SharedConnection) -> Self {
        Self {
            name,
            current_move: String::new(),
            matched: false,
            connection,
        }
    }

    /// Available to be picked as an opponent
    pub fn is_idle(&self) -> bool {
        !self.matched
    }

    /// Record a move, replacing any earlier one
    pub fn set_move(&mut self, token: String) {
        self.current_move = token;
    }
}
