//! Entity trait - common interface for aggregates written with revision checks

use serde::{de::DeserializeOwned, Serialize};

/// Aggregate the [`Store`](crate::core::Store) writes under optimistic locking
pub trait Entity: Serialize + DeserializeOwned + Clone {
    /// Revision the entity was loaded at (0 = never committed)
    fn revision(&self) -> u32;

    /// Overwrite the revision after a successful commit
    fn set_revision(&mut self, revision: u32);
}
