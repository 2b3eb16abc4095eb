//! engine: capability set the coordinator needs from an ordered KV engine.
//!
//! The coordinator never looks at on-disk formats; everything goes through these
//! traits. Engine calls report failures as `anyhow::Error`; the store wraps them
//! into `StoreError::Underlying`.
//!
//! Implementations:
//! - `mem::MemEngine`: in-memory BTreeMap engine with copy-on-write snapshots.

use anyhow::Result;

use crate::batch::Batch;

/// Forward cursor over an ordered key space.
pub trait EngineIterator: Send {
    fn seek_to_first(&mut self);

    /// Position at the first key >= `key`.
    fn seek(&mut self, key: &[u8]);

    fn valid(&self) -> bool;

    fn next(&mut self);

    /// Current key; empty when the cursor is not valid.
    fn key(&self) -> &[u8];

    /// Current value; empty when the cursor is not valid.
    fn value(&self) -> &[u8];

    /// Stored error state. An iterator carrying an error is never pooled.
    fn error(&self) -> Option<&anyhow::Error>;

    /// Release engine resources. Must be idempotent.
    fn close(&mut self);
}

/// Point-in-time read view.
pub trait EngineSnapshot: Send {
    type Iter: EngineIterator;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn new_iterator(&self) -> Result<Self::Iter>;

    /// Release engine resources. Must be idempotent.
    fn close(&mut self);
}

pub trait Engine: Send {
    type Snapshot: EngineSnapshot;
    type Iter: EngineIterator;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Apply all operations of `batch` atomically.
    fn commit(&mut self, batch: &Batch) -> Result<()>;

    fn new_snapshot(&self) -> Result<Self::Snapshot>;

    fn new_iterator(&self) -> Result<Self::Iter>;

    /// Compact the key range [start, limit); `None` means unbounded on that side.
    fn compact(&mut self, start: Option<&[u8]>, limit: Option<&[u8]>) -> Result<()>;

    /// Drop all data.
    fn clear(&mut self) -> Result<()>;

    fn close(&mut self);
}
