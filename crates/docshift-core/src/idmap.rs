//! Identifier map: source document ids to allocated relational ids.
//!
//! The map is the single source of truth for cross-referencing. It is
//! writable during the row-creation pass, sealed before the link pass,
//! and persisted as an audit trail at the end of the run.

use std::collections::HashMap;

use crate::error::{MigrateError, Result};

/// One allocation: a source id bound to a surrogate id in a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdEntry {
    pub source_id: String,
    pub collection: String,
    pub id: i64,
}

/// Writable identifier map used during the row-creation pass.
///
/// Surrogate ids are monotonic per collection, starting at 1.
#[derive(Debug, Default)]
pub struct IdMap {
    entries: Vec<IdEntry>,
    by_source: HashMap<String, usize>,
    counters: HashMap<String, i64>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate (or return the existing) surrogate id for a source id.
    ///
    /// Idempotent: allocating the same pair twice returns the same id
    /// without advancing the collection counter.
    pub fn allocate(&mut self, source_id: &str, collection: &str) -> i64 {
        if let Some(&idx) = self.by_source.get(source_id) {
            let entry = &self.entries[idx];
            if entry.collection != collection {
                tracing::warn!(
                    source_id,
                    first = %entry.collection,
                    second = %collection,
                    "source id already allocated under another collection, reusing existing id"
                );
            }
            return entry.id;
        }

        let counter = self.counters.entry(collection.to_string()).or_insert(0);
        *counter += 1;
        let id = *counter;

        self.by_source.insert(source_id.to_string(), self.entries.len());
        self.entries.push(IdEntry {
            source_id: source_id.to_string(),
            collection: collection.to_string(),
            id,
        });
        id
    }

    /// Tolerant lookup, for references that may legitimately dangle.
    pub fn try_resolve(&self, source_id: &str) -> Option<i64> {
        self.by_source.get(source_id).map(|&idx| self.entries[idx].id)
    }

    /// Hard lookup. A miss means referential integrity would be violated
    /// and must abort the run.
    pub fn resolve(&self, source_id: &str) -> Result<i64> {
        self.try_resolve(source_id)
            .ok_or_else(|| MigrateError::MissingMapping {
                source_id: source_id.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freeze the map for the link pass. Allocation is unrepresentable
    /// on the returned handle.
    pub fn seal(self) -> SealedIdMap {
        SealedIdMap { inner: self }
    }
}

/// Read-only identifier map handed to the link pass.
#[derive(Debug)]
pub struct SealedIdMap {
    inner: IdMap,
}

impl SealedIdMap {
    pub fn try_resolve(&self, source_id: &str) -> Option<i64> {
        self.inner.try_resolve(source_id)
    }

    pub fn resolve(&self, source_id: &str) -> Result<i64> {
        self.inner.resolve(source_id)
    }

    /// All allocations in insertion order, for persistence.
    pub fn entries(&self) -> &[IdEntry] {
        &self.inner.entries
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
