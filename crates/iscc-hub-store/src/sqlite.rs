//! SQLite implementation of the EventStore trait.
//!
//! Uses rusqlite with bundled SQLite in WAL mode with `synchronous=FULL`,
//! so a successful append implies the commit is on disk. All operations run
//! on the blocking pool via `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};

use iscc_hub_core::{IsccId, IsccNote};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{AppendOutcome, Event, EventStore, Tail};

const EVENT_COLUMNS: &str = "seq, iscc_id, note_bytes, received_at";

/// SQLite-based event store.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (and migrate) a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory database. Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

type EventRow = (i64, Vec<u8>, Vec<u8>, i64);

fn read_event_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode_event((seq, iscc_id, note_bytes, received_at): EventRow) -> Result<Event> {
    let body: [u8; 8] = iscc_id
        .try_into()
        .map_err(|_| StoreError::InvalidData("iscc_id must be 8 bytes".into()))?;
    let note = IsccNote::from_json_bytes(&note_bytes)
        .map_err(|e| StoreError::InvalidData(e.to_string()))?;
    Ok(Event {
        seq: seq as u64,
        iscc_id: IsccId::from_body_bytes(body),
        pubkey: note.signature.pubkey.clone(),
        nonce: note.nonce.clone(),
        datahash: note.datahash.clone(),
        iscc_code: note.iscc_code.clone(),
        units: note.units.clone().unwrap_or_default(),
        note,
        note_bytes,
        received_at,
    })
}

fn query_one(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Option<Event>> {
    let row = conn.query_row(sql, params, read_event_row).optional()?;
    row.map(decode_event).transpose()
}

fn query_many(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, read_event_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(decode_event).collect()
}

fn is_unique_violation(err: &rusqlite::Error, column: &str) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg)) => {
            e.code == ErrorCode::ConstraintViolation && msg.contains(column)
        }
        _ => false,
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn append(&self, event: &Event) -> Result<AppendOutcome> {
        let event = event.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let inserted = tx.execute(
                "INSERT INTO events (
                    seq, iscc_id, ts_micros, server_id, nonce, pubkey,
                    datahash, iscc_code, note_bytes, received_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    event.seq as i64,
                    event.iscc_id.body_bytes().as_slice(),
                    event.ts_micros() as i64,
                    i64::from(event.server_id()),
                    &event.nonce,
                    &event.pubkey,
                    &event.datahash,
                    &event.iscc_code,
                    &event.note_bytes,
                    event.received_at,
                ],
            );

            match inserted {
                Ok(_) => {}
                Err(err) if is_unique_violation(&err, "events.nonce") => {
                    drop(tx);
                    let existing: i64 = conn.query_row(
                        "SELECT seq FROM events WHERE nonce = ?1",
                        params![&event.nonce],
                        |row| row.get(0),
                    )?;
                    return Ok(AppendOutcome::NonceExists {
                        seq: existing as u64,
                    });
                }
                Err(err) if is_unique_violation(&err, "events.") => {
                    return Err(StoreError::Constraint(err.to_string()));
                }
                Err(err) => return Err(err.into()),
            }

            for unit in &event.units {
                tx.execute(
                    "INSERT OR IGNORE INTO event_units (event_seq, unit) VALUES (?1, ?2)",
                    params![event.seq as i64, unit],
                )?;
            }

            tx.commit()?;
            Ok(AppendOutcome::Appended)
        })
        .await
    }

    async fn tail(&self) -> Result<Tail> {
        self.with_conn(|conn| {
            let row: Option<(i64, i64)> = conn
                .query_row(
                    "SELECT seq, ts_micros FROM events ORDER BY seq DESC LIMIT 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            Ok(row
                .map(|(seq, ts)| Tail {
                    last_seq: seq as u64,
                    last_ts_micros: ts as u64,
                })
                .unwrap_or_default())
        })
        .await
    }

    async fn count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
            Ok(n as u64)
        })
        .await
    }

    async fn get_by_seq(&self, seq: u64) -> Result<Option<Event>> {
        self.with_conn(move |conn| {
            query_one(
                conn,
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE seq = ?1"),
                params![seq as i64],
            )
        })
        .await
    }

    async fn get_by_iscc_id(&self, iscc_id: &IsccId) -> Result<Option<Event>> {
        let body = iscc_id.body_bytes();
        self.with_conn(move |conn| {
            query_one(
                conn,
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE iscc_id = ?1"),
                params![body.as_slice()],
            )
        })
        .await
    }

    async fn get_by_nonce(&self, nonce: &str) -> Result<Option<Event>> {
        let nonce = nonce.to_string();
        self.with_conn(move |conn| {
            query_one(
                conn,
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE nonce = ?1"),
                params![nonce],
            )
        })
        .await
    }

    async fn scan(&self, from_seq: u64, limit: u32) -> Result<Vec<Event>> {
        self.with_conn(move |conn| {
            query_many(
                conn,
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM events
                     WHERE seq >= ?1 ORDER BY seq LIMIT ?2"
                ),
                params![from_seq as i64, i64::from(limit)],
            )
        })
        .await
    }

    async fn lookup_by_datahash(&self, datahash: &str) -> Result<Vec<Event>> {
        let datahash = datahash.to_string();
        self.with_conn(move |conn| {
            query_many(
                conn,
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM events
                     WHERE datahash = ?1 ORDER BY seq"
                ),
                params![datahash],
            )
        })
        .await
    }

    async fn lookup_by_iscc_code(&self, iscc_code: &str) -> Result<Vec<Event>> {
        let iscc_code = iscc_code.to_string();
        self.with_conn(move |conn| {
            query_many(
                conn,
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM events
                     WHERE iscc_code = ?1 ORDER BY seq"
                ),
                params![iscc_code],
            )
        })
        .await
    }

    async fn lookup_by_unit(&self, unit: &str) -> Result<Vec<Event>> {
        let unit = unit.to_string();
        self.with_conn(move |conn| {
            query_many(
                conn,
                &format!(
                    "SELECT e.seq, e.iscc_id, e.note_bytes, e.received_at
                     FROM events e
                     JOIN event_units u ON u.event_seq = e.seq
                     WHERE u.unit = ?1 ORDER BY e.seq"
                ),
                params![unit],
            )
        })
        .await
    }

    async fn lookup_by_pubkey(&self, pubkey: &str) -> Result<Vec<Event>> {
        let pubkey = pubkey.to_string();
        self.with_conn(move |conn| {
            query_many(
                conn,
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM events
                     WHERE pubkey = ?1 ORDER BY seq"
                ),
                params![pubkey],
            )
        })
        .await
    }

    async fn digest(&self, from_seq: u64, to_seq: u64) -> Result<[u8; 32]> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT seq, iscc_id, note_bytes FROM events
                 WHERE seq >= ?1 AND seq <= ?2 ORDER BY seq",
            )?;
            let mut hasher = blake3::Hasher::new();
            let mut rows = stmt.query(params![from_seq as i64, to_seq as i64])?;
            while let Some(row) = rows.next()? {
                let seq: i64 = row.get(0)?;
                let body: Vec<u8> = row.get(1)?;
                let note_bytes: Vec<u8> = row.get(2)?;
                hasher.update(&(seq as u64).to_be_bytes());
                hasher.update(&body);
                hasher.update(&(note_bytes.len() as u64).to_be_bytes());
                hasher.update(&note_bytes);
            }
            Ok(*hasher.finalize().as_bytes())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::rolling_digest;
    use iscc_hub_core::{testkit, Keypair};

    fn make_event(seq: u64, n: u64) -> Event {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let note = testkit::signed_note(&keypair, 1, n).unwrap();
        let iscc_id = IsccId::from_parts(testkit::TEST_NOW_MICROS + seq, 1).unwrap();
        Event::new(seq, iscc_id, note, 1_754_310_896_789).unwrap()
    }

    #[tokio::test]
    async fn append_and_lookup() {
        let store = SqliteStore::open_memory().unwrap();
        let event = make_event(1, 1);

        assert_eq!(
            store.append(&event).await.unwrap(),
            AppendOutcome::Appended
        );

        let by_seq = store.get_by_seq(1).await.unwrap().unwrap();
        assert_eq!(by_seq, event);

        let by_id = store.get_by_iscc_id(&event.iscc_id).await.unwrap().unwrap();
        assert_eq!(by_id.seq, 1);

        let by_nonce = store.get_by_nonce(&event.nonce).await.unwrap().unwrap();
        assert_eq!(by_nonce.note_bytes, event.note_bytes);

        assert!(store.get_by_seq(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn nonce_reuse_reports_existing_seq() {
        let store = SqliteStore::open_memory().unwrap();
        let event = make_event(1, 1);
        store.append(&event).await.unwrap();

        // Same nonce under a new seq/iscc_id.
        let mut replay = make_event(2, 1);
        replay.iscc_id = IsccId::from_parts(testkit::TEST_NOW_MICROS + 99, 1).unwrap();
        assert_eq!(
            store.append(&replay).await.unwrap(),
            AppendOutcome::NonceExists { seq: 1 }
        );
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn seq_reuse_is_a_constraint_error() {
        let store = SqliteStore::open_memory().unwrap();
        store.append(&make_event(1, 1)).await.unwrap();

        let clash = make_event(1, 2);
        assert!(matches!(
            store.append(&clash).await,
            Err(StoreError::Constraint(_))
        ));
    }

    #[tokio::test]
    async fn tail_tracks_last_event() {
        let store = SqliteStore::open_memory().unwrap();
        assert_eq!(store.tail().await.unwrap(), Tail::default());

        store.append(&make_event(1, 1)).await.unwrap();
        store.append(&make_event(2, 2)).await.unwrap();

        let tail = store.tail().await.unwrap();
        assert_eq!(tail.last_seq, 2);
        assert_eq!(tail.last_ts_micros, testkit::TEST_NOW_MICROS + 2);
    }

    #[tokio::test]
    async fn scan_returns_contiguous_slice() {
        let store = SqliteStore::open_memory().unwrap();
        for seq in 1..=5 {
            store.append(&make_event(seq, seq)).await.unwrap();
        }

        let slice = store.scan(2, 3).await.unwrap();
        let seqs: Vec<u64> = slice.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn lookups_by_projection() {
        let store = SqliteStore::open_memory().unwrap();
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let unit = testkit::unit_code(3, 7);
        let note = testkit::note_builder(&keypair, 1, 1)
            .units(vec![unit.clone()])
            .sign(&keypair)
            .unwrap();
        let iscc_id = IsccId::from_parts(testkit::TEST_NOW_MICROS, 1).unwrap();
        let event = Event::new(1, iscc_id, note, 0).unwrap();
        store.append(&event).await.unwrap();

        assert_eq!(
            store
                .lookup_by_datahash(&event.datahash)
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            store
                .lookup_by_iscc_code(&event.iscc_code)
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(store.lookup_by_unit(&unit).await.unwrap().len(), 1);
        assert_eq!(
            store.lookup_by_pubkey(&event.pubkey).await.unwrap().len(),
            1
        );
        assert!(store.lookup_by_unit("ISCC:UNKNOWN").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn digest_matches_in_memory_rolling_digest() {
        let store = SqliteStore::open_memory().unwrap();
        let events: Vec<Event> = (1..=4).map(|seq| make_event(seq, seq)).collect();
        for event in &events {
            store.append(event).await.unwrap();
        }

        let full = store.digest(1, 4).await.unwrap();
        assert_eq!(full, rolling_digest(events.iter()));

        let partial = store.digest(2, 3).await.unwrap();
        assert_eq!(partial, rolling_digest(events[1..3].iter()));
        assert_ne!(full, partial);

        // Depends only on committed bytes in range: recomputing is stable.
        assert_eq!(store.digest(1, 4).await.unwrap(), full);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.append(&make_event(1, 1)).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.tail().await.unwrap().last_seq, 1);
        assert!(store.get_by_seq(1).await.unwrap().is_some());
    }
}
