//! store: the coordinator in front of an engine.
//!
//! One gate (mutex) serializes every mutating/administrative call. `acquire()`
//! hands out a scoped StoreGuard; dropping it releases the gate. Collaborator
//! layers (the command layer) work through the guard: commit, raw get, borrow /
//! return pooled iterators. Public one-shot operations acquire internally.
//!
//! Generation:
//! - +1 on every successful non-empty commit and every successful reset; never
//!   decreases. Pooled iterators tagged with an older generation are discarded.
//!
//! Lifecycle: Open -> Closed (close, or a failed reset). Once closed, every
//! engine-dependent operation fails with StoreError::Closed and changes nothing.

use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::batch::Batch;
use crate::config::{StoreBuilder, StoreConfig};
use crate::engine::Engine;
use crate::error::{Result, StoreError};
use crate::forward::{Forward, ForwardHandler, ObserverChain};
use crate::metrics::{MetricsSnapshot, StoreMetrics};
use crate::pool::{IteratorPool, PooledIterator, Returned};
use crate::snapshot::{Snapshot, SnapshotRegistry};

/// Snapshot handle type of a store over engine `E`.
pub type StoreSnapshot<E> = Snapshot<<E as Engine>::Snapshot>;

/// Pooled iterator type of a store over engine `E`.
pub type StoreIterator<E> = PooledIterator<<E as Engine>::Iter>;

struct Inner<E: Engine> {
    engine: Option<E>,
    generation: u64,
    snapshots: SnapshotRegistry<E::Snapshot>,
    iterators: IteratorPool<E::Iter>,
    pre_commit: ObserverChain,
    post_commit: ObserverChain,
}

impl<E: Engine> Inner<E> {
    fn engine(&self) -> Result<&E> {
        self.engine.as_ref().ok_or(StoreError::Closed)
    }

    fn engine_mut(&mut self) -> Result<&mut E> {
        self.engine.as_mut().ok_or(StoreError::Closed)
    }

    /// Force-close every snapshot and pooled iterator.
    fn close_views(&mut self, metrics: &StoreMetrics) {
        let sps = self.snapshots.close_all();
        let its = self.iterators.close_all();
        metrics.record_snapshots_force_closed(sps);
        metrics.record_iterators_discarded(its);
        if sps + its > 0 {
            debug!("store: force-closed {} snapshot(s), {} iterator(s)", sps, its);
        }
    }

    /// Close and drop the engine; the handle is Closed afterwards.
    fn shutdown_engine(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.close();
        }
    }
}

pub struct Store<E: Engine> {
    inner: Mutex<Inner<E>>,
    delete_if_expired: AtomicBool,
    config: StoreConfig,
    metrics: StoreMetrics,
}

impl<E: Engine> Store<E> {
    /// Wrap an already-open engine; configuration comes from the environment.
    pub fn open(engine: E) -> Self {
        Self::open_with_config(engine, StoreConfig::from_env())
    }

    pub fn open_with_config(engine: E, config: StoreConfig) -> Self {
        debug!("store open: {}", config);
        Self {
            inner: Mutex::new(Inner {
                engine: Some(engine),
                generation: 0,
                snapshots: SnapshotRegistry::new(),
                iterators: IteratorPool::new(config.max_pooled_iterators),
                pre_commit: ObserverChain::new("pre-commit"),
                post_commit: ObserverChain::new("post-commit"),
            }),
            delete_if_expired: AtomicBool::new(config.delete_if_expired),
            config,
            metrics: StoreMetrics::default(),
        }
    }

    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block for exclusive access. Fails with Closed (without holding the gate)
    /// if the store is already closed.
    pub fn acquire(&self) -> Result<StoreGuard<'_, E>> {
        let inner = self.lock();
        if inner.engine.is_none() {
            return Err(StoreError::Closed);
        }
        Ok(StoreGuard { store: self, inner })
    }

    /// Release a gate obtained by `acquire`. Dropping the guard does the same.
    pub fn release(&self, guard: StoreGuard<'_, E>) {
        drop(guard);
    }

    pub fn is_closed(&self) -> bool {
        self.lock().engine.is_none()
    }

    /// Current generation (readable after close as well).
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Zero every counter (e.g. between benchmark phases).
    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    /// Close the store: force-close all snapshots and pooled iterators, then
    /// close the engine. A no-op if already closed.
    pub fn close(&self) {
        let mut g = match self.acquire() {
            Ok(g) => g,
            Err(_) => return,
        };
        info!("store is closing ...");
        g.inner.close_views(&self.metrics);
        g.inner.shutdown_engine();
        info!("store is closed");
    }

    pub fn new_snapshot(&self) -> Result<StoreSnapshot<E>> {
        self.new_snapshot_with(|| {})
    }

    /// Take a snapshot, then run `f` while still holding the gate, so the
    /// caller's action is atomic with snapshot creation.
    pub fn new_snapshot_with<F: FnOnce()>(&self, f: F) -> Result<StoreSnapshot<E>> {
        let mut g = self.acquire()?;
        let inner = &mut *g.inner;
        let sp = inner
            .engine()?
            .new_snapshot()
            .map_err(|e| StoreError::underlying("store new snapshot", e))?;
        let handle = inner.snapshots.register(sp, inner.generation);
        self.metrics.record_snapshot_opened();
        if self.config.log_snapshots {
            info!(
                "store create new snapshot, id = {}, generation = {}",
                handle.id(),
                handle.generation()
            );
        } else {
            debug!("store create new snapshot, id = {}", handle.id());
        }

        f();

        Ok(handle)
    }

    /// Unregister and close `sp`. Releasing twice, after close/reset, or
    /// through a store that did not create `sp` is a no-op.
    pub fn release_snapshot(&self, sp: &StoreSnapshot<E>) {
        let mut g = match self.acquire() {
            Ok(g) => g,
            Err(_) => return,
        };
        if self.config.log_snapshots {
            info!("store release snapshot, id = {}", sp.id());
        } else {
            debug!("store release snapshot, id = {}", sp.id());
        }
        if g.inner.snapshots.remove(sp.id()) {
            sp.close();
            self.metrics.record_snapshot_released();
        }
    }

    /// Drop all data. Every snapshot and pooled iterator is force-closed first.
    /// If the engine fails to clear, it is closed and the store becomes Closed.
    pub fn reset(&self) -> Result<()> {
        let mut g = self.acquire()?;
        info!("store is resetting ...");
        let inner = &mut *g.inner;
        inner.close_views(&self.metrics);

        let cleared = inner.engine_mut()?.clear();
        match cleared {
            Ok(()) => {
                inner.generation += 1;
                self.metrics.record_reset(true);
                info!("store is reset, generation = {}", inner.generation);
                Ok(())
            }
            Err(e) => {
                inner.shutdown_engine();
                self.metrics.record_reset(false);
                error!("store reset failed - {:#}", e);
                Err(StoreError::underlying("store reset", e))
            }
        }
    }

    /// Compact [start, limit) in the engine. Logical content is unchanged, so
    /// the generation, pool and snapshots are left alone.
    pub fn compact(&self, start: Option<&[u8]>, limit: Option<&[u8]>) -> Result<()> {
        let mut g = self.acquire()?;
        if let (Some(s), Some(l)) = (start, limit) {
            if s > l {
                return Err(StoreError::invalid_argument(format!(
                    "compact: start {:?} > limit {:?}",
                    String::from_utf8_lossy(s),
                    String::from_utf8_lossy(l)
                )));
            }
        }
        match g.inner.engine_mut()?.compact(start, limit) {
            Ok(()) => {
                self.metrics.record_compaction(true);
                Ok(())
            }
            Err(e) => {
                self.metrics.record_compaction(false);
                error!("store compact failed - {:#}", e);
                Err(StoreError::underlying("store compact", e))
            }
        }
    }

    /// Policy toggle consulted by the command layer. With `false`, expired keys
    /// are only removed by explicit deletes (e.g. when following a primary).
    pub fn set_delete_if_expired(&self, on: bool) {
        self.delete_if_expired.store(on, Ordering::SeqCst);
    }

    pub fn delete_if_expired(&self) -> bool {
        self.delete_if_expired.load(Ordering::SeqCst)
    }

    pub fn add_pre_commit_handler<H: ForwardHandler + 'static>(&self, h: H) -> Result<()> {
        let mut g = self.acquire()?;
        g.inner.pre_commit.register(Box::new(h));
        Ok(())
    }

    pub fn add_post_commit_handler<H: ForwardHandler + 'static>(&self, h: H) -> Result<()> {
        let mut g = self.acquire()?;
        g.inner.post_commit.register(Box::new(h));
        Ok(())
    }
}

impl<E: Engine> Drop for Store<E> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Exclusive access to a store; the gate is released on drop.
pub struct StoreGuard<'a, E: Engine> {
    store: &'a Store<E>,
    inner: MutexGuard<'a, Inner<E>>,
}

impl<'a, E: Engine> StoreGuard<'a, E> {
    pub fn generation(&self) -> u64 {
        self.inner.generation
    }

    pub fn pooled_iterators(&self) -> usize {
        self.inner.iterators.len()
    }

    pub fn open_snapshots(&self) -> usize {
        self.inner.snapshots.len()
    }

    pub fn delete_if_expired(&self) -> bool {
        self.store.delete_if_expired()
    }

    /// Raw row read from the live engine state.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner
            .engine()?
            .get(key)
            .map_err(|e| StoreError::underlying("store get", e))
    }

    /// Commit `batch`, running the observer chains around it.
    ///
    /// - Empty batch: Ok, no observers, no generation bump.
    /// - Engine failure: the error is returned; the pool, the generation and the
    ///   post-commit chain are left untouched.
    /// - Success: pooled iterators are closed, generation += 1, then post-commit.
    pub fn commit(&mut self, batch: &Batch, fw: &Forward) -> Result<()> {
        let store = self.store;
        if batch.is_empty() {
            store.metrics.record_empty_commit();
            return Ok(());
        }
        let inner = &mut *self.inner;
        inner.engine()?;

        let failed = inner.pre_commit.invoke(fw);
        store.metrics.record_pre_commit_failures(failed);

        if let Err(e) = inner.engine_mut()?.commit(batch) {
            warn!("store commit failed - {:#}", e);
            store.metrics.record_commit_failed();
            return Err(StoreError::underlying("store commit", e));
        }

        let stale = inner.iterators.close_all();
        store.metrics.record_iterators_discarded(stale);
        inner.generation += 1;
        store.metrics.record_commit();

        let failed = inner.post_commit.invoke(fw);
        store.metrics.record_post_commit_failures(failed);
        Ok(())
    }

    /// Pop the most recently returned iterator, or create one at the current
    /// generation.
    pub fn borrow_iterator(&mut self) -> Result<StoreIterator<E>> {
        let store = self.store;
        let inner = &mut *self.inner;
        if let Some(it) = inner.iterators.pop() {
            debug_assert_eq!(it.generation(), inner.generation);
            store.metrics.record_iterator_reused();
            return Ok(it);
        }
        let it = inner
            .engine()?
            .new_iterator()
            .map_err(|e| StoreError::underlying("store new iterator", e))?;
        store.metrics.record_iterator_created();
        Ok(PooledIterator::new(it, inner.generation))
    }

    /// Hand an iterator back; stale or errored iterators are closed.
    pub fn return_iterator(&mut self, it: StoreIterator<E>) {
        let store = self.store;
        let inner = &mut *self.inner;
        match inner.iterators.put(it, inner.generation) {
            Returned::Pooled => store.metrics.record_iterator_pooled(),
            _ => store.metrics.record_iterators_discarded(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::MemEngine;

    fn store() -> Store<MemEngine> {
        Store::open_with_config(MemEngine::new(), StoreConfig::default())
    }

    fn one(key: &str) -> Batch {
        let mut b = Batch::new();
        b.put(key.as_bytes(), b"v").unwrap();
        b
    }

    #[test]
    fn failed_acquire_does_not_hold_the_gate() {
        let s = store();
        s.close();
        assert!(matches!(s.acquire(), Err(StoreError::Closed)));
        // The gate is free: lock-only readers still work.
        assert!(s.is_closed());
        assert_eq!(s.generation(), 0);
    }

    #[test]
    fn guard_release_allows_next_acquire() {
        let s = store();
        let mut g = s.acquire().unwrap();
        g.commit(&one("a"), &Forward::default()).unwrap();
        s.release(g);
        let g = s.acquire().unwrap();
        assert_eq!(g.generation(), 1);
        assert_eq!(g.get(b"a").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn compact_rejects_inverted_range() {
        let s = store();
        let err = s.compact(Some(b"z"), Some(b"a")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        s.compact(Some(b"a"), Some(b"z")).unwrap();
        s.compact(None, None).unwrap();
        assert_eq!(s.metrics().compactions, 2);
        assert_eq!(s.generation(), 0);
    }

    #[test]
    fn drop_closes_engine() {
        let engine = MemEngine::new();
        let probe = engine.probe();
        {
            let s = Store::open_with_config(engine, StoreConfig::default());
            let _sp = s.new_snapshot().unwrap();
        }
        assert!(probe.is_closed());
        assert_eq!(probe.live_snapshots(), 0);
    }
}
