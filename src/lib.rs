#![allow(non_snake_case)]

// Engine-facing layer
pub mod engine; // capability traits the coordinator needs from a KV engine
pub mod batch;  // ordered write batch
pub mod mem;    // in-memory ordered engine (BTreeMap, COW snapshots)

// Coordinator
pub mod store;    // gate, commit pipeline, reset/compact/close
pub mod pool;     // generation-tagged iterator pool
pub mod snapshot; // snapshot registry + shared handles
pub mod forward;  // Forward record + observer chains

// Ambient
pub mod config;
pub mod error;
pub mod metrics;

// Re-exports
pub use batch::{Batch, BatchOp};
pub use config::{StoreBuilder, StoreConfig};
pub use engine::{Engine, EngineIterator, EngineSnapshot};
pub use error::{Result, StoreError};
pub use forward::{Forward, ForwardHandler};
pub use mem::{MemEngine, MemIterator, MemProbe, MemSnapshot};
pub use metrics::MetricsSnapshot;
pub use pool::PooledIterator;
pub use snapshot::Snapshot;
pub use store::{Store, StoreGuard, StoreIterator, StoreSnapshot};
