//! vigil-store — the shared counter store behind Vigil.
//!
//! Every record the monitoring engine keeps lives here as a string value
//! with a per-key expiry. Nothing is ever deleted explicitly; TTL is the
//! only garbage collection.
//!
//! # Backends
//!
//! ```text
//! CounterStore (trait)
//!   ├── MemoryStore  — BTreeMap + injected Clock (tests, single process)
//!   ├── RedbStore    — redb file or in-memory db, JSON envelopes with expiry
//!   └── RedisStore   — shared across processes, native EX/INCR/SCAN
//! ```
//!
//! `increment` is atomic per backend, but callers that follow it with a
//! `set` (to re-arm a TTL) form a read-then-write sequence that can lose
//! concurrent updates. That trade-off is accepted by the engine.

pub mod error;
pub mod memory;
pub mod redb_store;
pub mod redis_store;
pub mod store;
pub mod tables;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redb_store::RedbStore;
pub use redis_store::RedisStore;
pub use store::CounterStore;
