//! mem: in-memory ordered engine.
//!
//! - Data lives in a BTreeMap behind an Arc; commits copy-on-write (Arc::make_mut),
//!   so snapshots and iterators are O(1) to create and never see later writes.
//! - MemProbe is shared with the caller: fault injection (one-shot failures of
//!   commit/clear/compact/snapshot/iterator creation, iterators that carry a stored
//!   error) and resource accounting (live snapshots/iterators, compactions, closed).

use anyhow::{anyhow, bail, Result};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::batch::{Batch, BatchOp};
use crate::engine::{Engine, EngineIterator, EngineSnapshot};

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Debug, Default)]
pub struct MemProbe {
    fail_commit: AtomicBool,
    fail_clear: AtomicBool,
    fail_compact: AtomicBool,
    fail_snapshot: AtomicBool,
    fail_iterator: AtomicBool,
    poison_iterators: AtomicBool,

    live_snapshots: AtomicUsize,
    live_iterators: AtomicUsize,
    compactions: AtomicU64,
    closed: AtomicBool,
}

impl MemProbe {
    #[inline]
    fn take(flag: &AtomicBool) -> bool {
        flag.swap(false, Ordering::SeqCst)
    }

    pub fn fail_next_commit(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_clear(&self) {
        self.fail_clear.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_compact(&self) {
        self.fail_compact.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_snapshot(&self) {
        self.fail_snapshot.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_iterator(&self) {
        self.fail_iterator.store(true, Ordering::SeqCst);
    }

    /// While on, every new iterator carries a stored error.
    pub fn set_poison_iterators(&self, on: bool) {
        self.poison_iterators.store(on, Ordering::SeqCst);
    }

    pub fn live_snapshots(&self) -> usize {
        self.live_snapshots.load(Ordering::SeqCst)
    }

    pub fn live_iterators(&self) -> usize {
        self.live_iterators.load(Ordering::SeqCst)
    }

    pub fn compactions(&self) -> u64 {
        self.compactions.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct MemEngine {
    table: Arc<Table>,
    probe: Arc<MemProbe>,
}

impl Default for MemEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemEngine {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Table::new()),
            probe: Arc::new(MemProbe::default()),
        }
    }

    pub fn probe(&self) -> Arc<MemProbe> {
        self.probe.clone()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.probe.is_closed() {
            bail!("mem engine is closed");
        }
        Ok(())
    }
}

impl Engine for MemEngine {
    type Snapshot = MemSnapshot;
    type Iter = MemIterator;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        Ok(self.table.get(key).cloned())
    }

    fn commit(&mut self, batch: &Batch) -> Result<()> {
        self.ensure_open()?;
        if MemProbe::take(&self.probe.fail_commit) {
            bail!("mem engine: injected commit failure");
        }
        let table = Arc::make_mut(&mut self.table);
        for op in batch.ops() {
            match op {
                BatchOp::Put { key, value } => {
                    table.insert(key.clone(), value.clone());
                }
                BatchOp::Del { key } => {
                    table.remove(key);
                }
            }
        }
        Ok(())
    }

    fn new_snapshot(&self) -> Result<MemSnapshot> {
        self.ensure_open()?;
        if MemProbe::take(&self.probe.fail_snapshot) {
            bail!("mem engine: injected snapshot failure");
        }
        Ok(MemSnapshot::new(self.table.clone(), self.probe.clone()))
    }

    fn new_iterator(&self) -> Result<MemIterator> {
        self.ensure_open()?;
        if MemProbe::take(&self.probe.fail_iterator) {
            bail!("mem engine: injected iterator failure");
        }
        Ok(MemIterator::new(self.table.clone(), self.probe.clone()))
    }

    fn compact(&mut self, _start: Option<&[u8]>, _limit: Option<&[u8]>) -> Result<()> {
        self.ensure_open()?;
        if MemProbe::take(&self.probe.fail_compact) {
            bail!("mem engine: injected compact failure");
        }
        self.probe.compactions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.ensure_open()?;
        if MemProbe::take(&self.probe.fail_clear) {
            bail!("mem engine: injected clear failure");
        }
        self.table = Arc::new(Table::new());
        Ok(())
    }

    fn close(&mut self) {
        self.probe.closed.store(true, Ordering::SeqCst);
        self.table = Arc::new(Table::new());
    }
}

pub struct MemSnapshot {
    table: Arc<Table>,
    probe: Arc<MemProbe>,
    closed: bool,
}

impl MemSnapshot {
    fn new(table: Arc<Table>, probe: Arc<MemProbe>) -> Self {
        probe.live_snapshots.fetch_add(1, Ordering::SeqCst);
        Self {
            table,
            probe,
            closed: false,
        }
    }
}

impl EngineSnapshot for MemSnapshot {
    type Iter = MemIterator;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.closed {
            bail!("mem snapshot is closed");
        }
        Ok(self.table.get(key).cloned())
    }

    fn new_iterator(&self) -> Result<MemIterator> {
        if self.closed {
            bail!("mem snapshot is closed");
        }
        Ok(MemIterator::new(self.table.clone(), self.probe.clone()))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.table = Arc::new(Table::new());
            self.probe.live_snapshots.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemSnapshot {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct MemIterator {
    table: Arc<Table>,
    probe: Arc<MemProbe>,
    current: Option<(Vec<u8>, Vec<u8>)>,
    err: Option<anyhow::Error>,
    closed: bool,
}

impl MemIterator {
    fn new(table: Arc<Table>, probe: Arc<MemProbe>) -> Self {
        probe.live_iterators.fetch_add(1, Ordering::SeqCst);
        let err = if probe.poison_iterators.load(Ordering::SeqCst) {
            Some(anyhow!("mem engine: injected iterator error"))
        } else {
            None
        };
        Self {
            table,
            probe,
            current: None,
            err,
            closed: false,
        }
    }

    fn position(&mut self, lower: Bound<&[u8]>) {
        if self.closed {
            return;
        }
        self.current = self
            .table
            .range::<[u8], _>((lower, Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone()));
    }
}

impl EngineIterator for MemIterator {
    fn seek_to_first(&mut self) {
        self.position(Bound::Unbounded);
    }

    fn seek(&mut self, key: &[u8]) {
        self.position(Bound::Included(key));
    }

    fn valid(&self) -> bool {
        !self.closed && self.err.is_none() && self.current.is_some()
    }

    fn next(&mut self) {
        if let Some((key, _)) = self.current.take() {
            self.position(Bound::Excluded(key.as_slice()));
        }
    }

    fn key(&self) -> &[u8] {
        self.current.as_ref().map(|(k, _)| k.as_slice()).unwrap_or(&[])
    }

    fn value(&self) -> &[u8] {
        self.current.as_ref().map(|(_, v)| v.as_slice()).unwrap_or(&[])
    }

    fn error(&self) -> Option<&anyhow::Error> {
        self.err.as_ref()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.current = None;
            self.table = Arc::new(Table::new());
            self.probe.live_iterators.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemIterator {
    fn drop(&mut self) {
        self.close();
    }
}
