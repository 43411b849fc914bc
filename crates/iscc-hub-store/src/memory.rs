//! In-memory implementation of the EventStore trait.
//!
//! Primarily for tests. Same semantics as SQLite without persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use iscc_hub_core::IsccId;

use crate::error::{Result, StoreError};
use crate::traits::{rolling_digest, AppendOutcome, Event, EventStore, Tail};

/// In-memory event store. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    events: BTreeMap<u64, Event>,
    by_nonce: HashMap<String, u64>,
    by_iscc_id: HashMap<u64, u64>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append(&self, event: &Event) -> Result<AppendOutcome> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;

        if let Some(&seq) = inner.by_nonce.get(&event.nonce) {
            return Ok(AppendOutcome::NonceExists { seq });
        }
        if inner.events.contains_key(&event.seq) {
            return Err(StoreError::Constraint(format!(
                "seq {} already exists",
                event.seq
            )));
        }
        if inner.by_iscc_id.contains_key(&event.iscc_id.body_uint()) {
            return Err(StoreError::Constraint(format!(
                "iscc_id {} already exists",
                event.iscc_id
            )));
        }

        inner.by_nonce.insert(event.nonce.clone(), event.seq);
        inner
            .by_iscc_id
            .insert(event.iscc_id.body_uint(), event.seq);
        inner.events.insert(event.seq, event.clone());
        Ok(AppendOutcome::Appended)
    }

    async fn tail(&self) -> Result<Tail> {
        let inner = self.read()?;
        Ok(inner
            .events
            .values()
            .next_back()
            .map(|e| Tail {
                last_seq: e.seq,
                last_ts_micros: e.ts_micros(),
            })
            .unwrap_or_default())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.read()?.events.len() as u64)
    }

    async fn get_by_seq(&self, seq: u64) -> Result<Option<Event>> {
        Ok(self.read()?.events.get(&seq).cloned())
    }

    async fn get_by_iscc_id(&self, iscc_id: &IsccId) -> Result<Option<Event>> {
        let inner = self.read()?;
        Ok(inner
            .by_iscc_id
            .get(&iscc_id.body_uint())
            .and_then(|seq| inner.events.get(seq))
            .cloned())
    }

    async fn get_by_nonce(&self, nonce: &str) -> Result<Option<Event>> {
        let inner = self.read()?;
        Ok(inner
            .by_nonce
            .get(nonce)
            .and_then(|seq| inner.events.get(seq))
            .cloned())
    }

    async fn scan(&self, from_seq: u64, limit: u32) -> Result<Vec<Event>> {
        let inner = self.read()?;
        Ok(inner
            .events
            .range(from_seq..)
            .take(limit as usize)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn lookup_by_datahash(&self, datahash: &str) -> Result<Vec<Event>> {
        let inner = self.read()?;
        Ok(inner
            .events
            .values()
            .filter(|e| e.datahash == datahash)
            .cloned()
            .collect())
    }

    async fn lookup_by_iscc_code(&self, iscc_code: &str) -> Result<Vec<Event>> {
        let inner = self.read()?;
        Ok(inner
            .events
            .values()
            .filter(|e| e.iscc_code == iscc_code)
            .cloned()
            .collect())
    }

    async fn lookup_by_unit(&self, unit: &str) -> Result<Vec<Event>> {
        let inner = self.read()?;
        Ok(inner
            .events
            .values()
            .filter(|e| e.units.iter().any(|u| u == unit))
            .cloned()
            .collect())
    }

    async fn lookup_by_pubkey(&self, pubkey: &str) -> Result<Vec<Event>> {
        let inner = self.read()?;
        Ok(inner
            .events
            .values()
            .filter(|e| e.pubkey == pubkey)
            .cloned()
            .collect())
    }

    async fn digest(&self, from_seq: u64, to_seq: u64) -> Result<[u8; 32]> {
        let inner = self.read()?;
        Ok(rolling_digest(
            inner.events.range(from_seq..=to_seq).map(|(_, e)| e),
        ))
    }
}
