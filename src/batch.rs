//! batch: ordered set of pending writes applied atomically by the engine.
//!
//! Operations are buffered in insertion order; the engine applies them in that
//! order on commit (later ops on the same key win).

use crate::error::{Result, StoreError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Del { key: Vec<u8> },
}

impl BatchOp {
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } => key,
            BatchOp::Del { key } => key,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a put. Empty keys are rejected.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(StoreError::invalid_argument("batch put: empty key"));
        }
        self.ops.push(BatchOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        });
        Ok(())
    }

    /// Buffer a delete (tombstone). Empty keys are rejected.
    pub fn del(&mut self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(StoreError::invalid_argument("batch del: empty key"));
        }
        self.ops.push(BatchOp::Del { key: key.to_vec() });
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }
}
