//! # ISCC Hub
//!
//! A content-declaration timestamping authority. The hub accepts signed
//! [`IsccNote`] declarations, mints a globally unique 64-bit
//! [`IsccId`] (52-bit microsecond timestamp + 12-bit server-id), records
//! the event durably with gapless sequence numbers, and returns a signed
//! [`IsccReceipt`].
//!
//! ## Guarantees
//!
//! Under concurrent submissions:
//!
//! 1. Sequence numbers are gapless: `1..=N` after N admissions.
//! 2. Hub timestamps are strictly monotone: `ts = max(now, last + 1)`.
//! 3. At-most-once admission per nonce; identical resubmission returns
//!    the original receipt.
//! 4. Commits are durable before a receipt is issued.
//! 5. Receipts are reproducible byte-for-byte from committed state.
//!
//! ## Example
//!
//! ```no_run
//! use iscc_hub::{Hub, HubConfig};
//!
//! # async fn example() -> Result<(), iscc_hub::HubError> {
//! let config = HubConfig::new(1, "a".repeat(64), "hub.example.com", "events.db");
//! let hub = Hub::open(config)?;
//! let declared = hub.declare(br#"{...}"#).await?;
//! println!("minted {} at seq {}", declared.iscc_id, declared.seq);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod hub;
pub mod sequencer;

pub use config::{ConfigError, HubConfig};
pub use error::HubError;
pub use hub::{Declared, Health, Hub, PolicyHook, Resolved};
pub use sequencer::{system_clock, MicrosClock, Sequencer};

pub use iscc_hub_core::{IsccId, IsccNote, IsccReceipt};
pub use iscc_hub_store::{Event, EventStore, MemoryStore, SqliteStore};
