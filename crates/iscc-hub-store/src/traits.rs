//! EventStore trait: the abstract interface for event log persistence.

use async_trait::async_trait;
use iscc_hub_core::{IsccId, IsccNote};

use crate::error::{Result, StoreError};

/// A committed declaration event.
///
/// Created only by the sequencer inside the critical section; immutable
/// once committed. Lookup columns are projected from the note at
/// construction so every store indexes the same values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Gapless sequence number, starting at 1.
    pub seq: u64,
    /// The minted ISCC-ID.
    pub iscc_id: IsccId,
    /// The note exactly as admitted.
    pub note: IsccNote,
    /// Canonical bytes of the note (receipt reproducibility).
    pub note_bytes: Vec<u8>,
    /// Projected: `signature.pubkey`, lowercase hex.
    pub pubkey: String,
    /// Projected: the 128-bit nonce, lowercase hex. Unique per log.
    pub nonce: String,
    /// Projected: the declared datahash.
    pub datahash: String,
    /// Projected: the declared composite ISCC-CODE.
    pub iscc_code: String,
    /// Projected: declared units, empty when absent.
    pub units: Vec<String>,
    /// Wallclock at ingress in unix milliseconds. Diagnostic only.
    pub received_at: i64,
}

impl Event {
    /// Assemble an event from a minted identity and an admitted note.
    pub fn new(
        seq: u64,
        iscc_id: IsccId,
        note: IsccNote,
        received_at: i64,
    ) -> Result<Self> {
        let note_bytes = note
            .canonical_bytes()
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;
        Ok(Self {
            seq,
            iscc_id,
            pubkey: note.signature.pubkey.clone(),
            nonce: note.nonce.clone(),
            datahash: note.datahash.clone(),
            iscc_code: note.iscc_code.clone(),
            units: note.units.clone().unwrap_or_default(),
            note_bytes,
            note,
            received_at,
        })
    }

    /// Hub timestamp in microseconds (from the ISCC-ID).
    pub fn ts_micros(&self) -> u64 {
        self.iscc_id.timestamp_micros()
    }

    /// Server-id (from the ISCC-ID).
    pub fn server_id(&self) -> u16 {
        self.iscc_id.server_id()
    }

    /// The event's contribution to the log digest: seq, ISCC-ID body, and
    /// length-prefixed note bytes.
    pub fn digest_frame(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(24 + self.note_bytes.len());
        frame.extend_from_slice(&self.seq.to_be_bytes());
        frame.extend_from_slice(&self.iscc_id.body_bytes());
        frame.extend_from_slice(&(self.note_bytes.len() as u64).to_be_bytes());
        frame.extend_from_slice(&self.note_bytes);
        frame
    }
}

/// 32-byte rolling digest over events in log order.
///
/// Depends only on committed event bytes; used for external anchoring.
pub fn rolling_digest<'a>(events: impl IntoIterator<Item = &'a Event>) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for event in events {
        hasher.update(&event.digest_frame());
    }
    *hasher.finalize().as_bytes()
}

/// The log tail: zeros for an empty log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tail {
    pub last_seq: u64,
    pub last_ts_micros: u64,
}

/// Result of appending an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Event was committed durably.
    Appended,
    /// The nonce is already admitted; nothing was written.
    NonceExists {
        /// Sequence number of the event holding the nonce.
        seq: u64,
    },
}

/// Async interface for event log persistence.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one event atomically and durably.
    ///
    /// Honors the unique constraints on `seq`, `iscc_id`, and `nonce`.
    async fn append(&self, event: &Event) -> Result<AppendOutcome>;

    /// The last committed `(seq, ts_micros)`. O(1).
    async fn tail(&self) -> Result<Tail>;

    /// Number of committed events.
    async fn count(&self) -> Result<u64>;

    /// Point lookup by sequence number.
    async fn get_by_seq(&self, seq: u64) -> Result<Option<Event>>;

    /// Point lookup by ISCC-ID.
    async fn get_by_iscc_id(&self, iscc_id: &IsccId) -> Result<Option<Event>>;

    /// Point lookup by nonce.
    async fn get_by_nonce(&self, nonce: &str) -> Result<Option<Event>>;

    /// Contiguous slice `seq >= from_seq`, ordered by seq, at most `limit`.
    async fn scan(&self, from_seq: u64, limit: u32) -> Result<Vec<Event>>;

    /// All events declaring this datahash, in log order.
    async fn lookup_by_datahash(&self, datahash: &str) -> Result<Vec<Event>>;

    /// All events declaring this ISCC-CODE, in log order.
    async fn lookup_by_iscc_code(&self, iscc_code: &str) -> Result<Vec<Event>>;

    /// All events whose units contain this ISCC-UNIT, in log order.
    async fn lookup_by_unit(&self, unit: &str) -> Result<Vec<Event>>;

    /// All events declared by this public key, in log order.
    async fn lookup_by_pubkey(&self, pubkey: &str) -> Result<Vec<Event>>;

    /// Rolling digest over `from_seq..=to_seq`.
    async fn digest(&self, from_seq: u64, to_seq: u64) -> Result<[u8; 32]>;
}
