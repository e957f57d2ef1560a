//! Basic type definitions for the match server
//!
//! Provides newtype wrappers for type safety:
//! - `SlotId`: registry slot index plus reuse generation
//! - `MatchId`: UUID-based identifier for one match session

use uuid::Uuid;

/// Registry slot identifier
///
/// The index is stable for as long as the connection occupying the slot is
/// open. The generation is bumped each time a freed slot is handed to a new
/// connection, so a stale id never addresses the new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId {
    pub index: usize,
    pub generation: u32,
}

impl SlotId {
    pub fn new(index: usize, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.index)?;
        if self.generation > 0 {
            write!(f, ".{}", self.generation)?;
        }
        Ok(())
    }
}

/// Unique match identifier (newtype pattern)
///
/// Only used to correlate log lines of one session; matches are never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchId(pub Uuid);

impl MatchId {
    /// Create a new random match ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_id_unique() {
        let id1 = MatchId::new();
        let id2 = MatchId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_slot_id_display() {
        assert_eq!(SlotId::new(3, 0).to_string(), "#3");
        assert_eq!(SlotId::new(3, 2).to_string(), "#3.2");
    }

    #[test]
    fn test_slot_id_orders_by_index_first() {
        assert!(SlotId::new(1, 5) < SlotId::new(2, 0));
    }
}
