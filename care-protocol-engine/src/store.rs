use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{EntityKind, ProtocolError, Result};
use crate::models::{CareProtocol, CompletionReport, ProtocolExecution};

/// An entity addressable by id in an [`InMemoryStore`]
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> Uuid;
}

impl Entity for CareProtocol {
    const KIND: EntityKind = EntityKind::Protocol;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Entity for ProtocolExecution {
    const KIND: EntityKind = EntityKind::Execution;

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Reports are keyed by the execution they summarise
impl Entity for CompletionReport {
    const KIND: EntityKind = EntityKind::Report;

    fn id(&self) -> Uuid {
        self.execution_id
    }
}

/// Keyed in-memory arena.
///
/// Reads hand out clones. Mutations go through [`InMemoryStore::update`],
/// which holds the entry's exclusive guard for the duration of the closure,
/// so two writers never interleave on the same entity. The closure must not
/// call back into the same store.
pub struct InMemoryStore<T: Entity> {
    entries: DashMap<Uuid, T>,
}

impl<T: Entity> InMemoryStore<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn insert(&self, entity: T) {
        self.entries.insert(entity.id(), entity);
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub fn get(&self, id: Uuid) -> Result<T> {
        self.find(id).ok_or_else(|| ProtocolError::not_found(T::KIND, id))
    }

    pub fn find(&self, id: Uuid) -> Option<T> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.entries.contains_key(&id)
    }

    /// Read-modify-write one entity under its entry lock.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, or whatever the closure returns.
    pub fn update<R>(&self, id: Uuid, mutate: impl FnOnce(&mut T) -> Result<R>) -> Result<R> {
        let mut entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| ProtocolError::not_found(T::KIND, id))?;
        mutate(entry.value_mut())
    }

    pub fn remove(&self, id: Uuid) -> Option<T> {
        self.entries.remove(&id).map(|(_, entity)| entity)
    }

    pub fn filter(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.entries
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn values(&self) -> Vec<T> {
        self.filter(|_| true)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Entity> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub type ProtocolStore = InMemoryStore<CareProtocol>;
pub type ExecutionStore = InMemoryStore<ProtocolExecution>;
pub type ReportStore = InMemoryStore<CompletionReport>;
