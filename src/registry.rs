//! Client registry
//!
//! Bounded slot table of registered players, shared by every connection
//! task. All reads and writes go through one exclusive lock, held only for
//! the duration of a scan or a field update; callers do their I/O after the
//! lock is released.
//!
//! Slots are freed when a match closes and reused lowest index first. Every
//! reuse bumps the slot generation so ids held by finished tasks cannot
//! address the new occupant.

use tokio::sync::futures::Notified;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::connection::SharedConnection;
use crate::error::AppError;
use crate::player::Player;
use crate::types::SlotId;

/// Default maximum number of concurrent clients
pub const DEFAULT_CAPACITY: usize = 10;

/// One side of a match
#[derive(Debug, Clone)]
pub struct Participant {
    pub slot: SlotId,
    pub name: String,
    pub connection: SharedConnection,
}

/// Two participants claimed together, ordered by slot index
#[derive(Debug, Clone)]
pub struct Pairing {
    pub first: Participant,
    pub second: Participant,
}

/// Result of one atomic scan-and-claim
#[derive(Debug)]
pub enum PairAttempt {
    /// Both players are now marked matched; the caller runs the match
    Paired(Pairing),
    /// Another task already claimed the caller
    AlreadyMatched,
    /// Nobody else is idle
    NoOpponent,
}

/// Result of giving up on the opponent wait
#[derive(Debug)]
pub enum Abandon {
    /// Claimed by another task in the meantime; the slot stays
    AlreadyMatched,
    /// Slot freed; the connection is returned for closing
    Released(SharedConnection),
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    player: Option<Player>,
}

#[derive(Debug, Default)]
struct Slots {
    entries: Vec<Slot>,
    used: usize,
}

impl Slots {
    fn get(&self, id: SlotId) -> Result<&Player, AppError> {
        self.entries
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.player.as_ref())
            .ok_or(AppError::UnknownSlot(id))
    }

    fn get_mut(&mut self, id: SlotId) -> Result<&mut Player, AppError> {
        self.entries
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.player.as_mut())
            .ok_or(AppError::UnknownSlot(id))
    }

    fn take(&mut self, id: SlotId) -> Result<Player, AppError> {
        let player = self
            .entries
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.player.take())
            .ok_or(AppError::UnknownSlot(id))?;
        self.used -= 1;
        Ok(player)
    }

    fn find_idle(&self, excluding: SlotId) -> Option<SlotId> {
        self.entries.iter().enumerate().find_map(|(index, slot)| {
            let player = slot.player.as_ref()?;
            let id = SlotId::new(index, slot.generation);
            (player.is_idle() && id != excluding).then_some(id)
        })
    }

    fn participant(&self, id: SlotId) -> Result<Participant, AppError> {
        let player = self.get(id)?;
        Ok(Participant {
            slot: id,
            name: player.name.clone(),
            connection: player.connection.clone(),
        })
    }
}

/// Shared registry of connected players
#[derive(Debug)]
pub struct Registry {
    slots: Mutex<Slots>,
    /// Woken on registration, idle transitions and claims
    changed: Notify,
    capacity: usize,
}

impl Registry {
    /// Create an empty registry holding at most `capacity` players
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            changed: Notify::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of occupied slots
    pub async fn len(&self) -> usize {
        self.slots.lock().await.used
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Future resolving on the next registration, idle transition or claim
    ///
    /// Enable it before inspecting the registry so a change made between the
    /// inspection and the wait is not missed.
    pub fn changed(&self) -> Notified<'_> {
        self.changed.notified()
    }

    /// Register a new idle player
    ///
    /// Reuses the lowest free slot, or appends while under capacity.
    pub async fn register(
        &self,
        connection: SharedConnection,
        name: String,
    ) -> Result<SlotId, AppError> {
        let id = {
            let mut slots = self.slots.lock().await;
            let vacant = slots.entries.iter().position(|slot| slot.player.is_none());
            let index = match vacant {
                Some(index) => {
                    let slot = &mut slots.entries[index];
                    slot.generation = slot.generation.wrapping_add(1);
                    index
                }
                None if slots.entries.len() < self.capacity => {
                    slots.entries.push(Slot::default());
                    slots.entries.len() - 1
                }
                None => return Err(AppError::RegistryFull),
            };
            let slot = &mut slots.entries[index];
            slot.player = Some(Player::new(name, connection));
            let id = SlotId::new(index, slot.generation);
            slots.used += 1;
            debug!("Slot {} registered, {} of {} in use", id, slots.used, self.capacity);
            id
        };
        self.changed.notify_waiters();
        Ok(id)
    }

    pub async fn mark_matched(&self, id: SlotId) -> Result<(), AppError> {
        self.slots.lock().await.get_mut(id)?.matched = true;
        Ok(())
    }

    pub async fn mark_idle(&self, id: SlotId) -> Result<(), AppError> {
        self.slots.lock().await.get_mut(id)?.matched = false;
        self.changed.notify_waiters();
        Ok(())
    }

    /// Store a move, overwriting any earlier one
    pub async fn set_move(&self, id: SlotId, token: String) -> Result<(), AppError> {
        self.slots.lock().await.get_mut(id)?.set_move(token);
        Ok(())
    }

    /// Lowest-index idle player other than `excluding`
    pub async fn find_idle_opponent(&self, excluding: SlotId) -> Option<SlotId> {
        self.slots.lock().await.find_idle(excluding)
    }

    /// Scan for an idle opponent and claim both players in one critical section
    ///
    /// Waiters are woken after a claim so the claimed player's task notices
    /// it has been taken without waiting out its polling interval.
    pub async fn try_pair(&self, id: SlotId) -> Result<PairAttempt, AppError> {
        let pairing = {
            let mut slots = self.slots.lock().await;
            if slots.get(id)?.matched {
                return Ok(PairAttempt::AlreadyMatched);
            }
            let Some(opponent) = slots.find_idle(id) else {
                return Ok(PairAttempt::NoOpponent);
            };

            slots.get_mut(id)?.matched = true;
            slots.get_mut(opponent)?.matched = true;

            let (first, second) = if id.index < opponent.index {
                (id, opponent)
            } else {
                (opponent, id)
            };
            Pairing {
                first: slots.participant(first)?,
                second: slots.participant(second)?,
            }
        };
        self.changed.notify_waiters();
        Ok(PairAttempt::Paired(pairing))
    }

    /// Remove a waiting player unless someone claimed it first
    pub async fn abandon_wait(&self, id: SlotId) -> Result<Abandon, AppError> {
        let mut slots = self.slots.lock().await;
        if slots.get(id)?.matched {
            return Ok(Abandon::AlreadyMatched);
        }
        let player = slots.take(id)?;
        Ok(Abandon::Released(player.connection))
    }

    /// Return both players to idle and free their slots
    ///
    /// Stale ids are skipped. Returns the number of slots freed; closing the
    /// connections is left to the caller, outside the lock.
    pub async fn end_match(&self, first: SlotId, second: SlotId) -> usize {
        let mut slots = self.slots.lock().await;
        let mut freed = 0;
        for id in [first, second] {
            if let Ok(player) = slots.get_mut(id) {
                player.matched = false;
            }
            match slots.take(id) {
                Ok(_) => freed += 1,
                Err(e) => debug!("end_match: {}", e),
            }
        }
        freed
    }

    /// Free a single slot
    pub async fn release(&self, id: SlotId) -> Result<SharedConnection, AppError> {
        let player = self.slots.lock().await.take(id)?;
        Ok(player.connection)
    }

    pub async fn player_name(&self, id: SlotId) -> Result<String, AppError> {
        Ok(self.slots.lock().await.get(id)?.name.clone())
    }

    pub async fn current_move(&self, id: SlotId) -> Result<String, AppError> {
        Ok(self.slots.lock().await.get(id)?.current_move.clone())
    }

    pub async fn is_matched(&self, id: SlotId) -> Result<bool, AppError> {
        Ok(self.slots.lock().await.get(id)?.matched)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::MemoryConnection;

    fn conn() -> SharedConnection {
        MemoryConnection::new().0
    }

    #[tokio::test]
    async fn test_register_until_full() {
        let registry = Registry::new(3);

        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(registry.register(conn(), format!("p{}", i)).await.unwrap());
        }
        let indices: Vec<usize> = ids.iter().map(|id| id.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(registry.len().await, 3);

        let err = registry.register(conn(), "late".to_string()).await;
        assert!(matches!(err, Err(AppError::RegistryFull)));
        assert_eq!(registry.len().await, 3);
    }

    #[tokio::test]
    async fn test_new_player_is_idle_without_move() {
        let registry = Registry::default();
        let id = registry.register(conn(), "Alice".to_string()).await.unwrap();

        assert!(!registry.is_matched(id).await.unwrap());
        assert_eq!(registry.current_move(id).await.unwrap(), "");
        assert_eq!(registry.player_name(id).await.unwrap(), "Alice");
    }

    #[tokio::test]
    async fn test_set_move_overwrites() {
        let registry = Registry::default();
        let id = registry.register(conn(), "Alice".to_string()).await.unwrap();

        registry.set_move(id, "rock".to_string()).await.unwrap();
        registry.set_move(id, "paper".to_string()).await.unwrap();
        assert_eq!(registry.current_move(id).await.unwrap(), "paper");
    }

    #[tokio::test]
    async fn test_find_idle_opponent_lowest_index() {
        let registry = Registry::default();
        let a = registry.register(conn(), "a".to_string()).await.unwrap();
        let b = registry.register(conn(), "b".to_string()).await.unwrap();
        let c = registry.register(conn(), "c".to_string()).await.unwrap();

        assert_eq!(registry.find_idle_opponent(c).await, Some(a));
        assert_eq!(registry.find_idle_opponent(a).await, Some(b));

        registry.mark_matched(a).await.unwrap();
        assert_eq!(registry.find_idle_opponent(c).await, Some(b));

        registry.mark_matched(b).await.unwrap();
        assert_eq!(registry.find_idle_opponent(c).await, None);

        registry.mark_idle(a).await.unwrap();
        assert_eq!(registry.find_idle_opponent(c).await, Some(a));
    }

    #[tokio::test]
    async fn test_try_pair_claims_both() {
        let registry = Registry::default();
        let a = registry.register(conn(), "Alice".to_string()).await.unwrap();

        assert!(matches!(registry.try_pair(a).await.unwrap(), PairAttempt::NoOpponent));

        let b = registry.register(conn(), "Bob".to_string()).await.unwrap();
        let PairAttempt::Paired(pairing) = registry.try_pair(b).await.unwrap() else {
            panic!("expected a pairing");
        };
        // Ordered by slot index regardless of who claimed
        assert_eq!(pairing.first.slot, a);
        assert_eq!(pairing.first.name, "Alice");
        assert_eq!(pairing.second.slot, b);
        assert!(registry.is_matched(a).await.unwrap());
        assert!(registry.is_matched(b).await.unwrap());

        assert!(matches!(registry.try_pair(a).await.unwrap(), PairAttempt::AlreadyMatched));
    }

    #[tokio::test]
    async fn test_end_match_frees_slots() {
        let registry = Registry::new(2);
        let a = registry.register(conn(), "a".to_string()).await.unwrap();
        let b = registry.register(conn(), "b".to_string()).await.unwrap();
        registry.try_pair(a).await.unwrap();

        assert_eq!(registry.end_match(a, b).await, 2);
        assert!(registry.is_empty().await);

        // Second call finds nothing
        assert_eq!(registry.end_match(a, b).await, 0);
    }

    #[tokio::test]
    async fn test_reused_slot_rejects_stale_id() {
        let registry = Registry::new(1);
        let old = registry.register(conn(), "old".to_string()).await.unwrap();
        registry.release(old).await.unwrap();

        let new = registry.register(conn(), "new".to_string()).await.unwrap();
        assert_eq!(new.index, old.index);
        assert_ne!(new.generation, old.generation);

        assert!(matches!(
            registry.set_move(old, "rock".to_string()).await,
            Err(AppError::UnknownSlot(_))
        ));
        assert!(registry.release(old).await.is_err());
        assert_eq!(registry.player_name(new).await.unwrap(), "new");
    }

    #[tokio::test]
    async fn test_abandon_wait() {
        let registry = Registry::default();
        let a = registry.register(conn(), "a".to_string()).await.unwrap();
        assert!(matches!(registry.abandon_wait(a).await.unwrap(), Abandon::Released(_)));
        assert!(registry.is_empty().await);

        let b = registry.register(conn(), "b".to_string()).await.unwrap();
        let c = registry.register(conn(), "c".to_string()).await.unwrap();
        registry.try_pair(c).await.unwrap();
        assert!(matches!(registry.abandon_wait(b).await.unwrap(), Abandon::AlreadyMatched));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_register_wakes_waiters() {
        let registry = std::sync::Arc::new(Registry::default());
        let notified = registry.changed();
        tokio::pin!(notified);
        notified.as_mut().enable();

        registry.register(conn(), "a".to_string()).await.unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(1), notified)
            .await
            .expect("registration should notify");
    }
}
