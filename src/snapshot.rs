//! Snapshot registry: outstanding point-in-time views of a store.
//!
//! - Each snapshot gets an id that is unique across every store in the process;
//!   release removes the entry by id, so a handle from another store never
//!   matches.
//! - The caller and the registry share the handle. Release or force-close takes
//!   the engine snapshot out of the shared cell, so any later read through a
//!   stale handle fails with Closed instead of touching freed engine state.
//! - Reads through an open snapshot do not take the store gate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::engine::EngineSnapshot;
use crate::error::{Result, StoreError};

static NEXT_SNAPSHOT_ID: AtomicU64 = AtomicU64::new(1);

struct SnapshotCell<S> {
    id: u64,
    generation: u64,
    inner: Mutex<Option<S>>,
}

/// Point-in-time read view handed out by `Store::new_snapshot`.
pub struct Snapshot<S: EngineSnapshot> {
    cell: Arc<SnapshotCell<S>>,
}

impl<S: EngineSnapshot> Clone for Snapshot<S> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<S: EngineSnapshot> std::fmt::Debug for Snapshot<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("id", &self.cell.id)
            .field("generation", &self.cell.generation)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<S: EngineSnapshot> Snapshot<S> {
    fn lock(&self) -> MutexGuard<'_, Option<S>> {
        self.cell.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> u64 {
        self.cell.id
    }

    /// Store generation at the time the snapshot was taken.
    pub fn generation(&self) -> u64 {
        self.cell.generation
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.lock().as_ref() {
            Some(sp) => sp
                .get(key)
                .map_err(|e| StoreError::underlying("snapshot get", e)),
            None => Err(StoreError::Closed),
        }
    }

    /// Engine iterator over the snapshot state (not pooled).
    pub fn new_iterator(&self) -> Result<S::Iter> {
        match self.lock().as_ref() {
            Some(sp) => sp
                .new_iterator()
                .map_err(|e| StoreError::underlying("snapshot iterator", e)),
            None => Err(StoreError::Closed),
        }
    }

    /// Close the engine snapshot; returns false if it was already closed.
    pub(crate) fn close(&self) -> bool {
        match self.lock().take() {
            Some(mut sp) => {
                sp.close();
                true
            }
            None => false,
        }
    }
}

pub(crate) struct SnapshotRegistry<S: EngineSnapshot> {
    entries: Vec<Snapshot<S>>,
}

impl<S: EngineSnapshot> SnapshotRegistry<S> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Track `sp` and return the shared handle.
    pub(crate) fn register(&mut self, sp: S, generation: u64) -> Snapshot<S> {
        let id = NEXT_SNAPSHOT_ID.fetch_add(1, Ordering::Relaxed);
        let handle = Snapshot {
            cell: Arc::new(SnapshotCell {
                id,
                generation,
                inner: Mutex::new(Some(sp)),
            }),
        };
        self.entries.push(handle.clone());
        handle
    }

    /// Drop the entry with `id`; returns whether one was found.
    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id() != id);
        self.entries.len() != before
    }

    /// Force-close every registered snapshot, in registration order.
    pub(crate) fn close_all(&mut self) -> usize {
        let n = self.entries.len();
        for sp in self.entries.drain(..) {
            sp.close();
        }
        n
    }
}
