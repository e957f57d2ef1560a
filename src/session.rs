//! Match session state machine
//!
//! Drives one pair of players from the match announcement to closing both
//! connections:
//!
//! `Announcing -> CollectingMoves -> Resolving -> Closing`
//!
//! Moves are collected under a single deadline shared by both players. Both
//! connections are watched at once, so whichever move arrives first is taken
//! and the session keeps waiting for the other until the same deadline. A
//! timeout, a disconnect or a failed wait skips `Resolving` and closes the
//! match as Incomplete.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep_until;
use tracing::{debug, error, info, warn};

use crate::connection::is_disconnect;
use crate::error::MatchError;
use crate::matchmaker::deadline_after;
use crate::message::{decode_move, ServerMessage, MOVE_BUF_LEN};
use crate::outcome::{resolve, Outcome};
use crate::registry::{Pairing, Participant, Registry};
use crate::types::MatchId;

/// Default time both players get to send their move
pub const DEFAULT_MOVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Telling both players who they face
    Announcing,
    /// Waiting for both moves
    CollectingMoves,
    /// Computing and sending the result
    Resolving,
    /// Releasing slots and closing connections
    Closing,
}

/// How a match ended
#[derive(Debug)]
pub enum MatchOutcome {
    /// Both moves arrived; outcome relative to (first, second)
    Resolved(Outcome),
    /// No result could be computed
    Incomplete(MatchError),
}

/// One running match between two claimed players
#[derive(Debug)]
pub struct MatchSession {
    id: MatchId,
    registry: Arc<Registry>,
    first: Participant,
    second: Participant,
    move_timeout: Duration,
    state: SessionState,
}

impl MatchSession {
    /// Create a session for a pairing returned by the matchmaker
    pub fn new(registry: Arc<Registry>, pairing: Pairing, move_timeout: Duration) -> Self {
        Self {
            id: MatchId::new(),
            registry,
            first: pairing.first,
            second: pairing.second,
            move_timeout,
            state: SessionState::Announcing,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the match to completion
    ///
    /// Both connections are closed when this returns, whatever the outcome.
    pub async fn run(mut self) -> MatchOutcome {
        info!(
            "Match {} started: {} ({}) vs {} ({})",
            self.id, self.first.name, self.first.slot, self.second.name, self.second.slot
        );

        self.announce().await;

        self.transition(SessionState::CollectingMoves);
        let outcome = match self.collect_moves().await {
            Ok((first_move, second_move)) => {
                self.transition(SessionState::Resolving);
                MatchOutcome::Resolved(self.send_result(&first_move, &second_move).await)
            }
            Err(e) => {
                match &e {
                    MatchError::WaitFailed(_) => error!("Match {} aborted: {}", self.id, e),
                    _ => info!("Match {} incomplete: {}", self.id, e),
                }
                MatchOutcome::Incomplete(e)
            }
        };

        self.transition(SessionState::Closing);
        self.close(&outcome).await;
        outcome
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Match {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }

    /// Best-effort send; failures are logged and otherwise ignored
    async fn notify(&self, to: &Participant, msg: &ServerMessage) {
        if let Err(e) = to.connection.send(&msg.to_bytes()).await {
            warn!("Match {}: failed to notify {}: {}", self.id, to.slot, e);
        }
    }

    async fn announce(&self) {
        let to_first = ServerMessage::MatchFound {
            opponent: self.second.name.clone(),
        };
        let to_second = ServerMessage::MatchFound {
            opponent: self.first.name.clone(),
        };
        self.notify(&self.first, &to_first).await;
        self.notify(&self.second, &to_second).await;
    }

    /// Wait for one move from each player under a shared deadline
    async fn collect_moves(&self) -> Result<(String, String), MatchError> {
        let deadline = sleep_until(deadline_after(self.move_timeout));
        tokio::pin!(deadline);

        let mut first_buf = [0u8; MOVE_BUF_LEN - 1];
        let mut second_buf = [0u8; MOVE_BUF_LEN - 1];
        let mut first_move: Option<String> = None;
        let mut second_move: Option<String> = None;

        loop {
            if let (Some(a), Some(b)) = (&first_move, &second_move) {
                return Ok((a.clone(), b.clone()));
            }

            tokio::select! {
                result = self.first.connection.recv(&mut first_buf), if first_move.is_none() => {
                    let n = self.received(&self.first, result)?;
                    first_move = Some(self.record_move(&self.first, &first_buf[..n]).await);
                }
                result = self.second.connection.recv(&mut second_buf), if second_move.is_none() => {
                    let n = self.received(&self.second, result)?;
                    second_move = Some(self.record_move(&self.second, &second_buf[..n]).await);
                }
                _ = &mut deadline => return Err(MatchError::Timeout),
            }
        }
    }

    fn received(&self, from: &Participant, result: io::Result<usize>) -> Result<usize, MatchError> {
        match result {
            Ok(0) => Err(MatchError::PeerDisconnected(from.slot)),
            Ok(n) => Ok(n),
            Err(e) if is_disconnect(&e) => Err(MatchError::PeerDisconnected(from.slot)),
            Err(e) => Err(MatchError::WaitFailed(e)),
        }
    }

    async fn record_move(&self, from: &Participant, bytes: &[u8]) -> String {
        let token = decode_move(bytes);
        debug!("Match {}: client {} chose {:?}", self.id, from.slot, token);
        if let Err(e) = self.registry.set_move(from.slot, token.clone()).await {
            warn!("Match {}: could not store move: {}", self.id, e);
        }
        token
    }

    async fn send_result(&self, first_move: &str, second_move: &str) -> Outcome {
        let outcome = resolve(first_move, second_move);

        let to_first = ServerMessage::MovesRevealed {
            mine: first_move.to_string(),
            theirs: second_move.to_string(),
        };
        let to_second = ServerMessage::MovesRevealed {
            mine: second_move.to_string(),
            theirs: first_move.to_string(),
        };
        self.notify(&self.first, &to_first).await;
        self.notify(&self.second, &to_second).await;

        let result = match outcome {
            Outcome::Draw => ServerMessage::Draw,
            Outcome::FirstWins => ServerMessage::Winner {
                name: self.first.name.clone(),
            },
            Outcome::SecondWins => ServerMessage::Winner {
                name: self.second.name.clone(),
            },
        };
        info!("Match {} result: {}", self.id, result.to_string().trim_end());
        self.notify(&self.first, &result).await;
        self.notify(&self.second, &result).await;

        outcome
    }

    async fn close(&self, outcome: &MatchOutcome) {
        if let MatchOutcome::Incomplete(_) = outcome {
            self.notify(&self.first, &ServerMessage::Incomplete).await;
            self.notify(&self.second, &ServerMessage::Incomplete).await;
        }

        let freed = self.registry.end_match(self.first.slot, self.second.slot).await;
        if freed != 2 {
            warn!("Match {}: only {} of 2 slots were still registered", self.id, freed);
        }

        self.first.connection.close();
        self.second.connection.close();
        info!("Match {} closed", self.id);
    }
}
