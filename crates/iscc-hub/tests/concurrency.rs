//! Invariants under concurrent submission: gapless sequence, strict
//! timestamp monotonicity, ISCC-ID composition, nonce uniqueness.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::*;
use iscc_hub::{Hub, MemoryStore, SqliteStore};
use iscc_hub_core::testkit;

fn assert_log_invariants(events: &[iscc_hub::Event], server_id: u16) {
    // Gapless: seqs are exactly 1..=N.
    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (1..=events.len() as u64).collect::<Vec<_>>());

    // Strictly monotone timestamps and composition invariant.
    for pair in events.windows(2) {
        assert!(pair[0].ts_micros() < pair[1].ts_micros());
    }
    for event in events {
        assert_eq!(event.iscc_id.body_uint() >> 12, event.ts_micros());
        assert_eq!(event.iscc_id.server_id(), server_id);
    }

    // Nonce uniqueness.
    let nonces: HashSet<&String> = events.iter().map(|e| &e.nonce).collect();
    assert_eq!(nonces.len(), events.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn burst_of_1000_unique_notes() {
    const N: u64 = 1000;

    let mut config = test_config(1);
    config.queue_depth = N as usize + 8;
    let hub: Arc<Hub<MemoryStore>> = Arc::new(memory_hub_with(config, testkit::TEST_NOW_MICROS));

    let mut handles = Vec::new();
    for n in 1..=N {
        let hub = Arc::clone(&hub);
        handles.push(tokio::spawn(async move {
            hub.declare(&note_bytes(1, n)).await
        }));
    }

    let mut minted = Vec::new();
    for handle in handles {
        let declared = handle.await.unwrap().unwrap();
        assert!(declared.created);
        minted.push((declared.seq, declared.iscc_id));
    }

    assert_eq!(hub.event_count().await.unwrap(), N);

    let events = hub.events_from(1, N as u32 + 1).await.unwrap();
    assert_eq!(events.len(), N as usize);
    assert_log_invariants(&events, 1);

    // Returned identities match the log.
    minted.sort();
    for (seq, iscc_id) in minted {
        assert_eq!(events[seq as usize - 1].iscc_id, iscc_id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn parallel_submitters_with_replays() {
    const SUBMITTERS: u64 = 8;
    const NOTES_EACH: u64 = 16;

    let mut config = test_config(1);
    config.queue_depth = (SUBMITTERS * NOTES_EACH) as usize;
    let hub: Arc<Hub<MemoryStore>> = Arc::new(memory_hub_with(config, testkit::TEST_NOW_MICROS));

    // Every submitter sends the same NOTES_EACH notes: one admission per
    // note, the rest resolve idempotently to the original receipt.
    let mut handles = Vec::new();
    for _ in 0..SUBMITTERS {
        let hub = Arc::clone(&hub);
        handles.push(tokio::spawn(async move {
            let mut outcomes = Vec::new();
            for n in 1..=NOTES_EACH {
                outcomes.push(hub.declare(&note_bytes(1, n)).await);
            }
            outcomes
        }));
    }

    let mut created = 0u64;
    let mut replayed = 0u64;
    for handle in handles {
        for outcome in handle.await.unwrap() {
            let declared = outcome.unwrap();
            if declared.created {
                created += 1;
            } else {
                replayed += 1;
            }
        }
    }

    assert_eq!(created, NOTES_EACH);
    assert_eq!(replayed, SUBMITTERS * NOTES_EACH - NOTES_EACH);
    assert_eq!(hub.event_count().await.unwrap(), NOTES_EACH);

    let events = hub.events_from(1, 100).await.unwrap();
    assert_log_invariants(&events, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_burst_holds_invariants() {
    const N: u64 = 100;

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(3);
    config.db_path = dir.path().join("events.db");
    config.queue_depth = N as usize + 8;

    let store = SqliteStore::open(&config.db_path).unwrap();
    let hub: Arc<Hub<SqliteStore>> = Arc::new(
        Hub::with_store_and_clock(config, store, fixed_clock(testkit::TEST_NOW_MICROS)).unwrap(),
    );

    let mut handles = Vec::new();
    for n in 1..=N {
        let hub = Arc::clone(&hub);
        handles.push(tokio::spawn(async move {
            hub.declare(&note_bytes(3, n)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let events = hub.events_from(1, N as u32).await.unwrap();
    assert_eq!(events.len(), N as usize);
    assert_log_invariants(&events, 3);

    // Digest over the full range is stable across reads.
    assert_eq!(
        hub.log_digest(1, N).await.unwrap(),
        hub.log_digest(1, N).await.unwrap()
    );
}
