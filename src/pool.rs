//! Iterator pool: generation-tagged engine cursors recycled across requests.
//!
//! - Each pooled iterator carries the store generation it was created against.
//! - Reuse is LIFO (most recently returned first).
//! - An iterator goes back into the pool only if its tag equals the current
//!   generation and it carries no stored error; anything else is closed.
//! - Every generation bump empties the pool, so all pooled entries are current.

use log::debug;
use std::ops::{Deref, DerefMut};

use crate::engine::EngineIterator;

/// Engine iterator borrowed from a store, tagged with its creation generation.
pub struct PooledIterator<I: EngineIterator> {
    iter: I,
    generation: u64,
}

impl<I: EngineIterator> PooledIterator<I> {
    pub(crate) fn new(iter: I, generation: u64) -> Self {
        Self { iter, generation }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn close(mut self) {
        self.iter.close();
    }
}

impl<I: EngineIterator> Deref for PooledIterator<I> {
    type Target = I;

    fn deref(&self) -> &I {
        &self.iter
    }
}

impl<I: EngineIterator> DerefMut for PooledIterator<I> {
    fn deref_mut(&mut self) -> &mut I {
        &mut self.iter
    }
}

/// What happened to an iterator handed back to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Returned {
    Pooled,
    Stale,
    Errored,
    Full,
}

pub(crate) struct IteratorPool<I: EngineIterator> {
    free: Vec<PooledIterator<I>>,
    limit: Option<usize>,
}

impl<I: EngineIterator> IteratorPool<I> {
    pub(crate) fn new(limit: Option<usize>) -> Self {
        Self {
            free: Vec::new(),
            limit,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.free.len()
    }

    pub(crate) fn pop(&mut self) -> Option<PooledIterator<I>> {
        self.free.pop()
    }

    /// Pool `it` if it is still reusable at `generation`, otherwise close it.
    pub(crate) fn put(&mut self, it: PooledIterator<I>, generation: u64) -> Returned {
        let verdict = if it.generation != generation {
            Returned::Stale
        } else if it.iter.error().is_some() {
            Returned::Errored
        } else if self.limit.map_or(false, |max| self.free.len() >= max) {
            Returned::Full
        } else {
            Returned::Pooled
        };

        if verdict == Returned::Pooled {
            self.free.push(it);
        } else {
            debug!(
                "iterator pool: discard iterator (tag={}, current={}, reason={:?})",
                it.generation, generation, verdict
            );
            it.close();
        }
        verdict
    }

    /// Close and drop every pooled iterator; returns how many were closed.
    pub(crate) fn close_all(&mut self) -> usize {
        let n = self.free.len();
        for it in self.free.drain(..) {
            it.close();
        }
        n
    }
}
