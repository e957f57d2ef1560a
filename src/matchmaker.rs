//! Matchmaker
//!
//! Pairs an idle player with the lowest-index idle opponent. The scan and the
//! claim of both players happen in one registry critical section, so two
//! waiting tasks can never both take the same opponent. Between attempts the
//! caller sleeps until the registry reports a change or the polling interval
//! elapses, whichever comes first; the registry lock is never held while
//! sleeping.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

use crate::connection::SharedConnection;
use crate::error::AppError;
use crate::registry::{Abandon, PairAttempt, Pairing, Registry};
use crate::types::SlotId;

/// Default interval between pairing attempts
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

// About 30 years, the same horizon tokio uses for a timer that never fires
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + duration`, saturating to a far-future instant instead of panicking
pub(crate) fn deadline_after(duration: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(duration)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// How a wait for an opponent ended
#[derive(Debug)]
pub enum WaitOutcome {
    /// The caller claimed an opponent and runs the match
    Paired(Pairing),
    /// Another task claimed the caller and owns its connection now
    Claimed,
    /// Opponent timeout expired; the slot was released
    TimedOut(SharedConnection),
}

/// Opponent search over a shared registry
#[derive(Debug, Clone)]
pub struct Matchmaker {
    registry: Arc<Registry>,
    poll_interval: Duration,
    opponent_timeout: Option<Duration>,
}

impl Matchmaker {
    pub fn new(registry: Arc<Registry>, poll_interval: Duration) -> Self {
        Self {
            registry,
            poll_interval,
            opponent_timeout: None,
        }
    }

    /// Give up waiting after `timeout`; `None` waits forever
    pub fn with_opponent_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.opponent_timeout = timeout;
        self
    }

    /// Wait until `id` is paired
    ///
    /// Only the task hosting a match frees its players' slots, so finding our
    /// own slot vacant (or reused) means we were claimed and the match may
    /// already be over.
    pub async fn await_opponent(&self, id: SlotId) -> Result<WaitOutcome, AppError> {
        let deadline = self.opponent_timeout.map(deadline_after);

        loop {
            let changed = self.registry.changed();
            tokio::pin!(changed);
            changed.as_mut().enable();

            let attempt = match self.registry.try_pair(id).await {
                Err(AppError::UnknownSlot(slot)) if slot == id => PairAttempt::AlreadyMatched,
                other => other?,
            };
            match attempt {
                PairAttempt::Paired(pairing) => {
                    info!(
                        "Client {} matched with client {}",
                        pairing.first.slot, pairing.second.slot
                    );
                    return Ok(WaitOutcome::Paired(pairing));
                }
                PairAttempt::AlreadyMatched => {
                    debug!("Client {} was claimed by its opponent", id);
                    return Ok(WaitOutcome::Claimed);
                }
                PairAttempt::NoOpponent => {}
            }

            let mut wake_at = deadline_after(self.poll_interval);
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    let abandoned = match self.registry.abandon_wait(id).await {
                        Err(AppError::UnknownSlot(slot)) if slot == id => Abandon::AlreadyMatched,
                        other => other?,
                    };
                    return match abandoned {
                        Abandon::AlreadyMatched => Ok(WaitOutcome::Claimed),
                        Abandon::Released(connection) => {
                            info!("Client {} gave up waiting for an opponent", id);
                            Ok(WaitOutcome::TimedOut(connection))
                        }
                    };
                }
                wake_at = wake_at.min(deadline);
            }

            // Elapsed just means "poll again"
            let _ = timeout_at(wake_at, changed).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::connection::testing::MemoryConnection;

    fn conn() -> SharedConnection {
        MemoryConnection::new().0
    }

    #[tokio::test]
    async fn test_waiter_paired_by_later_registration() {
        let registry = Arc::new(Registry::default());
        let matchmaker = Matchmaker::new(registry.clone(), Duration::from_secs(30));

        let a = registry.register(conn(), "Alice".to_string()).await.unwrap();
        let waiter = {
            let matchmaker = matchmaker.clone();
            tokio::spawn(async move { matchmaker.await_opponent(a).await })
        };
        tokio::task::yield_now().await;

        let b = registry.register(conn(), "Bob".to_string()).await.unwrap();
        let outcome_b = matchmaker.await_opponent(b).await.unwrap();
        let outcome_a = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter should wake well before the poll interval")
            .unwrap()
            .unwrap();

        // Exactly one of the two hosts the match
        let pairing = match (outcome_a, outcome_b) {
            (WaitOutcome::Paired(p), WaitOutcome::Claimed) => p,
            (WaitOutcome::Claimed, WaitOutcome::Paired(p)) => p,
            other => panic!("unexpected outcomes: {:?}", other),
        };
        assert_eq!(pairing.first.slot, a);
        assert_eq!(pairing.second.slot, b);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pairing_is_exclusive() {
        const PLAYERS: usize = 10;
        let registry = Arc::new(Registry::new(PLAYERS));
        let matchmaker = Matchmaker::new(registry.clone(), Duration::from_millis(20));

        let mut handles = Vec::new();
        for i in 0..PLAYERS {
            let registry = registry.clone();
            let matchmaker = matchmaker.clone();
            handles.push(tokio::spawn(async move {
                let id = registry.register(conn(), format!("p{}", i)).await.unwrap();
                matchmaker.await_opponent(id).await.unwrap()
            }));
        }

        let mut seen = HashSet::new();
        let mut pairs = 0;
        for handle in handles {
            if let WaitOutcome::Paired(pairing) = handle.await.unwrap() {
                pairs += 1;
                assert!(seen.insert(pairing.first.slot), "slot paired twice");
                assert!(seen.insert(pairing.second.slot), "slot paired twice");
            }
        }
        assert_eq!(pairs, PLAYERS / 2);
        assert_eq!(seen.len(), PLAYERS);
    }

    #[tokio::test]
    async fn test_opponent_timeout_releases_slot() {
        let registry = Arc::new(Registry::default());
        let matchmaker = Matchmaker::new(registry.clone(), Duration::from_millis(10))
            .with_opponent_timeout(Some(Duration::from_millis(50)));

        let a = registry.register(conn(), "Alice".to_string()).await.unwrap();
        let outcome = matchmaker.await_opponent(a).await.unwrap();

        assert!(matches!(outcome, WaitOutcome::TimedOut(_)));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_match_finished_before_claimed_task_polls() {
        let registry = Arc::new(Registry::default());
        let matchmaker = Matchmaker::new(registry.clone(), DEFAULT_POLL_INTERVAL);

        let a = registry.register(conn(), "Alice".to_string()).await.unwrap();
        let b = registry.register(conn(), "Bob".to_string()).await.unwrap();

        // Bob's task hosts the whole match and frees both slots
        assert!(matches!(
            matchmaker.await_opponent(b).await.unwrap(),
            WaitOutcome::Paired(_)
        ));
        assert_eq!(registry.end_match(a, b).await, 2);

        // Alice's task only wakes up now
        assert!(matches!(
            matchmaker.await_opponent(a).await.unwrap(),
            WaitOutcome::Claimed
        ));
    }

    #[tokio::test]
    async fn test_reused_slot_counts_as_claimed() {
        let registry = Arc::new(Registry::default());
        let matchmaker = Matchmaker::new(registry.clone(), DEFAULT_POLL_INTERVAL);

        let a = registry.register(conn(), "Alice".to_string()).await.unwrap();
        registry.release(a).await.unwrap();
        let carol = registry.register(conn(), "Carol".to_string()).await.unwrap();
        assert_eq!(carol.index, a.index);

        assert!(matches!(
            matchmaker.await_opponent(a).await.unwrap(),
            WaitOutcome::Claimed
        ));
        // Carol keeps her slot
        assert!(!registry.is_matched(carol).await.unwrap());
    }

    #[tokio::test]
    async fn test_unbounded_timeouts_do_not_overflow() {
        let registry = Arc::new(Registry::default());
        let matchmaker = Matchmaker::new(registry.clone(), Duration::MAX)
            .with_opponent_timeout(Some(Duration::MAX));

        let a = registry.register(conn(), "Alice".to_string()).await.unwrap();
        let waiter = {
            let matchmaker = matchmaker.clone();
            tokio::spawn(async move { matchmaker.await_opponent(a).await })
        };
        tokio::task::yield_now().await;

        let b = registry.register(conn(), "Bob".to_string()).await.unwrap();
        matchmaker.await_opponent(b).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter should wake on the registration")
            .unwrap()
            .unwrap();

        assert!(deadline_after(Duration::MAX) > Instant::now());
    }
}
