//! The atomic critical section: minting `(seq, ts, iscc_id)` and
//! committing one event at a time.
//!
//! A single writer lane guarantees gapless sequence numbers and strictly
//! monotone timestamps. Parsing, validation, and signature checks all run
//! outside the lane; only tail arithmetic and one durable append happen
//! inside it.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{Mutex, Semaphore};

use iscc_hub_core::codec::MAX_TIMESTAMP_MICROS;
use iscc_hub_core::{IsccId, IsccNote};
use iscc_hub_store::{AppendOutcome, Event, EventStore, Tail};

use crate::error::HubError;

/// Microseconds-since-epoch time source. Advisory: the mint rule
/// `max(now, last + 1)` tolerates non-monotonic wall clocks.
pub type MicrosClock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// The system wall clock.
pub fn system_clock() -> MicrosClock {
    Arc::new(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    })
}

/// How far the persisted tail may run ahead of the wall clock before the
/// sequencer refuses to mint further into the future.
const MAX_DRIFT_MICROS: u64 = 1_000_000;

/// Result of sequencing one admitted note.
#[derive(Debug)]
pub enum SequenceOutcome {
    /// The event is committed and durable.
    Sequenced(Event),
    /// Lost a nonce race; the nonce is already held by `seq`.
    NonceExists { seq: u64 },
}

/// Allocates identities and commits events through a single writer lane.
pub struct Sequencer<S> {
    store: Arc<S>,
    server_id: u16,
    clock: MicrosClock,
    /// Cached log tail; `None` until first use.
    lane: Mutex<Option<Tail>>,
    /// Bounds the writer queue. Exhausted permits mean `Busy`.
    permits: Semaphore,
}

impl<S: EventStore> Sequencer<S> {
    /// Create a sequencer over the given store.
    pub fn new(store: Arc<S>, server_id: u16, queue_depth: usize, clock: MicrosClock) -> Self {
        Self {
            store,
            server_id,
            clock,
            lane: Mutex::new(None),
            permits: Semaphore::new(queue_depth),
        }
    }

    /// Current wall time in microseconds.
    pub fn now_micros(&self) -> u64 {
        (self.clock)()
    }

    /// Mint the next `(seq, ts, iscc_id)` and commit one event.
    ///
    /// The caller must have validated the note already.
    pub async fn sequence(
        &self,
        note: IsccNote,
        received_at: i64,
    ) -> Result<SequenceOutcome, HubError> {
        let _permit = self.permits.try_acquire().map_err(|_| HubError::Busy)?;
        let mut lane = self.lane.lock().await;

        let tail = match *lane {
            Some(tail) => tail,
            None => {
                let tail = self.store.tail().await?;
                *lane = Some(tail);
                tail
            }
        };

        let now = (self.clock)();
        if tail.last_ts_micros > now.saturating_add(MAX_DRIFT_MICROS) {
            return Err(HubError::Transient(
                "log tail is ahead of the wall clock".into(),
            ));
        }

        let ts_micros = now.max(tail.last_ts_micros + 1);
        if ts_micros > MAX_TIMESTAMP_MICROS {
            return Err(HubError::ClockExhausted);
        }
        let seq = tail.last_seq + 1;
        let iscc_id = IsccId::from_parts(ts_micros, self.server_id)
            .map_err(|e| HubError::Internal(e.to_string()))?;

        let event = Event::new(seq, iscc_id, note, received_at)?;
        match self.store.append(&event).await? {
            AppendOutcome::Appended => {
                *lane = Some(Tail {
                    last_seq: seq,
                    last_ts_micros: ts_micros,
                });
                Ok(SequenceOutcome::Sequenced(event))
            }
            AppendOutcome::NonceExists { seq } => Ok(SequenceOutcome::NonceExists { seq }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iscc_hub_core::{testkit, Keypair};
    use iscc_hub_store::MemoryStore;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn fixed_clock(micros: u64) -> MicrosClock {
        Arc::new(move || micros)
    }

    fn sequencer_with(clock: MicrosClock) -> Sequencer<MemoryStore> {
        Sequencer::new(Arc::new(MemoryStore::new()), 1, 8, clock)
    }

    fn note(n: u64) -> IsccNote {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        testkit::signed_note(&keypair, 1, n).unwrap()
    }

    async fn expect_event(seq: &Sequencer<MemoryStore>, n: u64) -> Event {
        match seq.sequence(note(n), 0).await.unwrap() {
            SequenceOutcome::Sequenced(event) => event,
            other => panic!("expected sequenced event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mints_monotone_ids_under_fixed_clock() {
        let seq = sequencer_with(fixed_clock(testkit::TEST_NOW_MICROS));

        let first = expect_event(&seq, 1).await;
        assert_eq!(first.seq, 1);
        assert_eq!(first.ts_micros(), testkit::TEST_NOW_MICROS);
        assert_eq!(first.iscc_id.to_string(), "ISCC:MAIWHOEVLVBGBAAB");

        // Frozen clock: each mint advances by exactly one microsecond.
        let second = expect_event(&seq, 2).await;
        assert_eq!(second.seq, 2);
        assert_eq!(second.ts_micros(), testkit::TEST_NOW_MICROS + 1);
    }

    #[tokio::test]
    async fn tolerates_clock_regression() {
        let ticks = Arc::new(AtomicU64::new(0));
        let t = Arc::clone(&ticks);
        let clock: MicrosClock = Arc::new(move || {
            // Second reading is one second in the past.
            match t.fetch_add(1, Ordering::SeqCst) {
                0 => testkit::TEST_NOW_MICROS,
                _ => testkit::TEST_NOW_MICROS - 1_000_000,
            }
        });
        let seq = sequencer_with(clock);

        let first = expect_event(&seq, 1).await;
        let second = expect_event(&seq, 2).await;
        assert_eq!(second.ts_micros(), first.ts_micros() + 1);
        assert!(second.iscc_id > first.iscc_id);
    }

    #[tokio::test]
    async fn refuses_when_timestamp_space_exhausted() {
        let seq = sequencer_with(fixed_clock(MAX_TIMESTAMP_MICROS));
        expect_event(&seq, 1).await;
        // Next mint would need MAX + 1.
        let err = seq.sequence(note(2), 0).await.unwrap_err();
        assert!(matches!(err, HubError::ClockExhausted));
    }

    #[tokio::test]
    async fn refuses_to_mint_far_ahead_of_wall_clock() {
        let store = Arc::new(MemoryStore::new());
        let ahead = Sequencer::new(
            Arc::clone(&store),
            1,
            8,
            fixed_clock(testkit::TEST_NOW_MICROS + 10_000_000),
        );
        match ahead.sequence(note(1), 0).await.unwrap() {
            SequenceOutcome::Sequenced(_) => {}
            other => panic!("unexpected {other:?}"),
        }

        // A fresh sequencer over the same log, with the clock 10s behind
        // the persisted tail, must not mint further into the future.
        let behind = Sequencer::new(store, 1, 8, fixed_clock(testkit::TEST_NOW_MICROS));
        let err = behind.sequence(note(2), 0).await.unwrap_err();
        assert!(matches!(err, HubError::Transient(_)));
    }

    #[tokio::test]
    async fn exhausted_lane_rejects_busy() {
        let seq = Sequencer::new(
            Arc::new(MemoryStore::new()),
            1,
            0,
            fixed_clock(testkit::TEST_NOW_MICROS),
        );
        let err = seq.sequence(note(1), 0).await.unwrap_err();
        assert!(matches!(err, HubError::Busy));
    }

    #[tokio::test]
    async fn nonce_race_is_reported_not_committed() {
        let seq = sequencer_with(fixed_clock(testkit::TEST_NOW_MICROS));
        expect_event(&seq, 1).await;

        match seq.sequence(note(1), 0).await.unwrap() {
            SequenceOutcome::NonceExists { seq } => assert_eq!(seq, 1),
            other => panic!("unexpected {other:?}"),
        }
    }
}
