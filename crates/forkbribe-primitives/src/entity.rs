//! Compact entity identities.
//!
//! Chain-string tags are mapped to dense `EntityId`s once per game; the
//! engine, the ledgers and the analysis tensors only ever see the ids. The
//! enumeration is stable for a game: honest is 0, the adversary is 1 and
//! bribees follow in sorted tag order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Dense per-game identity of an entity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EntityId(pub u8);

impl EntityId {
    pub const HONEST: EntityId = EntityId(0);
    pub const ADVERSARY: EntityId = EntityId(1);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}
