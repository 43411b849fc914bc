//! # ISCC Hub Store
//!
//! The durable append-only event log behind an async trait, with SQLite
//! (primary) and in-memory (testing) implementations.
//!
//! ## Contract
//!
//! - **Append-only**: events are inserted once, never mutated or deleted.
//! - **Unique constraints**: `seq`, `iscc_id`, and `nonce` are unique; a
//!   nonce collision is reported as [`AppendOutcome::NonceExists`], not an
//!   error, so the caller can return the original receipt.
//! - **Durability**: the SQLite store runs in WAL mode with
//!   `synchronous=FULL`; `append` returns only after the commit is on disk.
//! - **Readers don't block the writer**: all queries are point or range
//!   reads outside the append transaction.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{rolling_digest, AppendOutcome, Event, EventStore, Tail};
