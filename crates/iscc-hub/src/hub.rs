//! The ingress facade: one declaration in, one receipt out.
//!
//! `declare` runs parse -> validate -> sequence -> receipt. Once an event
//! is sequenced it is permanent, whether or not the client sticks around
//! for the receipt; resubmitting the identical note recovers it via the
//! nonce index.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tracing::{debug, info, warn};

use iscc_hub_core::gateway::{expand_gateway, GatewayContext};
use iscc_hub_core::{
    validate_note, IsccId, IsccNote, IsccReceipt, ReceiptSigner, ValidationContext,
    MAX_NOTE_BYTES,
};
use iscc_hub_store::{Event, EventStore, SqliteStore};

use crate::config::HubConfig;
use crate::error::HubError;
use crate::sequencer::{system_clock, MicrosClock, SequenceOutcome, Sequencer};

/// A successfully processed declaration.
#[derive(Debug)]
pub struct Declared {
    /// Gapless sequence number of the event.
    pub seq: u64,
    /// The minted ISCC-ID.
    pub iscc_id: IsccId,
    /// The hub-signed receipt.
    pub receipt: IsccReceipt,
    /// False when an identical note was already admitted and the original
    /// receipt is being returned.
    pub created: bool,
}

/// An event resolved by ISCC-ID, with its gateway redirect hint.
#[derive(Debug)]
pub struct Resolved {
    pub event: Event,
    /// Expanded gateway URL when the note declared one.
    pub gateway_url: Option<String>,
}

/// Service health and identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub issuer: String,
}

/// Optional policy hook (rate limits, fees) run after parsing, before
/// validation.
pub type PolicyHook = Arc<dyn Fn(&IsccNote) -> Result<(), HubError> + Send + Sync>;

/// A hub node: sequencer, event log, and receipt issuer behind one API.
pub struct Hub<S> {
    server_id: u16,
    skew_secs: i64,
    store: Arc<S>,
    sequencer: Sequencer<S>,
    signer: ReceiptSigner,
    policy: Option<PolicyHook>,
}

impl Hub<SqliteStore> {
    /// Open a hub over the SQLite store at `config.db_path`.
    pub fn open(config: HubConfig) -> Result<Self, HubError> {
        let store = SqliteStore::open(&config.db_path)?;
        Self::with_store(config, store)
    }
}

impl<S: EventStore> Hub<S> {
    /// Open a hub over an explicit store (tests, alternative backends).
    pub fn with_store(config: HubConfig, store: S) -> Result<Self, HubError> {
        Self::with_store_and_clock(config, store, system_clock())
    }

    /// Open with an explicit time source.
    pub fn with_store_and_clock(
        config: HubConfig,
        store: S,
        clock: MicrosClock,
    ) -> Result<Self, HubError> {
        let keypair = config.keypair()?;
        let store = Arc::new(store);
        let sequencer = Sequencer::new(
            Arc::clone(&store),
            config.server_id,
            config.queue_depth,
            clock,
        );
        Ok(Self {
            server_id: config.server_id,
            skew_secs: config.skew_secs as i64,
            store,
            sequencer,
            signer: ReceiptSigner::new(keypair, &config.domain),
            policy: None,
        })
    }

    /// Install a policy hook. Runs on every parsed note before validation.
    pub fn with_policy(mut self, policy: PolicyHook) -> Self {
        self.policy = Some(policy);
        self
    }

    /// The hub's receipt verification key.
    pub fn public_key(&self) -> iscc_hub_core::Ed25519PublicKey {
        self.signer.public_key()
    }

    /// The hub's issuer DID.
    pub fn issuer_did(&self) -> &str {
        self.signer.issuer_did()
    }

    /// Service health and identity.
    pub fn health(&self) -> Health {
        Health {
            status: "pass",
            version: env!("CARGO_PKG_VERSION"),
            issuer: self.signer.issuer_did().to_string(),
        }
    }

    /// Process one declaration: parse, validate, sequence, receipt.
    ///
    /// Dropping the returned future before the sequencer commits leaves no
    /// state. A commit that completes after the caller has gone away is
    /// durable anyway; resubmitting the identical note recovers the
    /// receipt via the nonce index.
    pub async fn declare(&self, note_bytes: &[u8]) -> Result<Declared, HubError> {
        if note_bytes.len() > MAX_NOTE_BYTES {
            return Err(iscc_hub_core::ValidationError::Malformed {
                field: "note".into(),
                message: format!("exceeds maximum size of {MAX_NOTE_BYTES} bytes"),
            }
            .into());
        }

        let note = IsccNote::from_json_bytes(note_bytes).map_err(|e| {
            debug!(error = %e, "rejected unparseable note");
            e
        })?;

        if let Some(policy) = &self.policy {
            policy(&note)?;
        }

        let now_micros = self.sequencer.now_micros();
        let ctx = ValidationContext {
            server_id: self.server_id,
            skew_secs: self.skew_secs,
            now: Utc
                .timestamp_micros(now_micros as i64)
                .single()
                .ok_or_else(|| HubError::Internal("hub clock out of range".into()))?,
        };
        validate_note(&note, &ctx).map_err(|e| {
            warn!(nonce = %note.nonce, error = %e, "rejected declaration");
            e
        })?;

        // Nonce replay: identical bytes return the original receipt,
        // anything else is a conflict carrying the original receipt.
        let submitted = note.canonical_bytes()?;
        if let Some(existing) = self.store.get_by_nonce(&note.nonce).await? {
            return self.replay_outcome(&submitted, existing);
        }

        let received_at = (now_micros / 1_000) as i64;
        let event = match self.sequencer.sequence(note, received_at).await? {
            SequenceOutcome::Sequenced(event) => event,
            SequenceOutcome::NonceExists { seq } => {
                // Lost the race after the pre-check; recover the winner.
                let existing = self
                    .store
                    .get_by_seq(seq)
                    .await?
                    .ok_or_else(|| HubError::Internal("nonce holder vanished".into()))?;
                return self.replay_outcome(&submitted, existing);
            }
        };

        let receipt = self.receipt_for(&event)?;
        info!(seq = event.seq, iscc_id = %event.iscc_id, "declaration sequenced");
        Ok(Declared {
            seq: event.seq,
            iscc_id: event.iscc_id,
            receipt,
            created: true,
        })
    }

    fn replay_outcome(&self, submitted: &[u8], existing: Event) -> Result<Declared, HubError> {
        let receipt = self.receipt_for(&existing)?;
        if submitted == existing.note_bytes {
            debug!(seq = existing.seq, "idempotent resubmission");
            return Ok(Declared {
                seq: existing.seq,
                iscc_id: existing.iscc_id,
                receipt,
                created: false,
            });
        }
        Err(HubError::DuplicateNonce {
            iscc_id: existing.iscc_id.to_string(),
            receipt: Box::new(receipt),
        })
    }

    /// Rebuild the receipt for a committed event. Pure function of the
    /// event; auditors get byte-identical signing input.
    pub fn receipt_for(&self, event: &Event) -> Result<IsccReceipt, HubError> {
        Ok(self.signer.issue(event.seq, event.iscc_id, &event.note)?)
    }

    /// Event lookup by sequence number.
    pub async fn event_by_seq(&self, seq: u64) -> Result<Option<Event>, HubError> {
        Ok(self.store.get_by_seq(seq).await?)
    }

    /// Resolve an ISCC-ID to its event and gateway redirect hint.
    pub async fn resolve(&self, iscc_id: &str) -> Result<Option<Resolved>, HubError> {
        let id = IsccId::parse(iscc_id).map_err(|e| {
            HubError::Validation(iscc_hub_core::ValidationError::Malformed {
                field: "iscc_id".into(),
                message: e.to_string(),
            })
        })?;
        let Some(event) = self.store.get_by_iscc_id(&id).await? else {
            return Ok(None);
        };
        let gateway_url = event.note.gateway.as_ref().map(|gateway| {
            expand_gateway(
                gateway,
                &GatewayContext {
                    iscc_id: event.iscc_id.to_string(),
                    iscc_code: event.iscc_code.clone(),
                    pubkey: event.pubkey.clone(),
                    datahash: event.datahash.clone(),
                },
            )
        });
        Ok(Some(Resolved { event, gateway_url }))
    }

    /// Contiguous log slice for bulk export and replication feeds.
    pub async fn events_from(&self, from_seq: u64, limit: u32) -> Result<Vec<Event>, HubError> {
        Ok(self.store.scan(from_seq, limit).await?)
    }

    /// Events declaring a datahash.
    pub async fn events_by_datahash(&self, datahash: &str) -> Result<Vec<Event>, HubError> {
        Ok(self.store.lookup_by_datahash(datahash).await?)
    }

    /// Events declaring an ISCC-CODE.
    pub async fn events_by_iscc_code(&self, iscc_code: &str) -> Result<Vec<Event>, HubError> {
        Ok(self.store.lookup_by_iscc_code(iscc_code).await?)
    }

    /// Events declaring an ISCC-UNIT.
    pub async fn events_by_unit(&self, unit: &str) -> Result<Vec<Event>, HubError> {
        Ok(self.store.lookup_by_unit(unit).await?)
    }

    /// Events declared by a public key.
    pub async fn events_by_pubkey(&self, pubkey: &str) -> Result<Vec<Event>, HubError> {
        Ok(self.store.lookup_by_pubkey(pubkey).await?)
    }

    /// Rolling log digest for external anchoring.
    pub async fn log_digest(&self, from_seq: u64, to_seq: u64) -> Result<[u8; 32], HubError> {
        Ok(self.store.digest(from_seq, to_seq).await?)
    }

    /// Number of committed events.
    pub async fn event_count(&self) -> Result<u64, HubError> {
        Ok(self.store.count().await?)
    }
}
