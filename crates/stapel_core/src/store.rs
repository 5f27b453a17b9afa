//! Entity storage interface.

use crate::entity::{validate_envelope, EntityId, Replicated};
use crate::error::CoreResult;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Narrow storage interface the sync layer depends on.
///
/// Implementations provide one collection per entity kind. Any key-value
/// or relational backing store can sit behind this trait; the sync
/// components never assume more than these four operations.
pub trait EntityStore<T: Replicated>: Send + Sync {
    /// Returns the entity with the given id, if present.
    fn get(&self, id: EntityId) -> CoreResult<Option<T>>;

    /// Inserts or replaces an entity.
    fn put(&self, entity: T) -> CoreResult<()>;

    /// Physically removes an entity. Removing an absent id is a no-op.
    fn delete(&self, id: EntityId) -> CoreResult<()>;

    /// Returns all entities matching the predicate.
    fn filter(&self, predicate: &dyn Fn(&T) -> bool) -> CoreResult<Vec<T>>;

    /// Returns all entities.
    fn list(&self) -> CoreResult<Vec<T>> {
        self.filter(&|_| true)
    }

    /// Returns true if an entity with the given id exists.
    fn contains(&self, id: EntityId) -> CoreResult<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Returns the number of stored entities.
    fn count(&self) -> CoreResult<usize> {
        Ok(self.list()?.len())
    }
}

/// In-memory reference implementation of [`EntityStore`].
///
/// Used by tests and as the default local replica when no durable
/// backend is configured.
#[derive(Debug, Default)]
pub struct MemoryStore<T: Replicated> {
    rows: RwLock<HashMap<EntityId, T>>,
}

impl<T: Replicated> MemoryStore<T> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Replicated> EntityStore<T> for MemoryStore<T> {
    fn get(&self, id: EntityId) -> CoreResult<Option<T>> {
        Ok(self.rows.read().get(&id).cloned())
    }

    fn put(&self, entity: T) -> CoreResult<()> {
        validate_envelope(&entity)?;
        self.rows.write().insert(entity.id(), entity);
        Ok(())
    }

    fn delete(&self, id: EntityId) -> CoreResult<()> {
        self.rows.write().remove(&id);
        Ok(())
    }

    fn filter(&self, predicate: &dyn Fn(&T) -> bool) -> CoreResult<Vec<T>> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|row| predicate(row))
            .cloned()
            .collect())
    }
}
