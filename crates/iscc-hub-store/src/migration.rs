//! Database schema migrations for SQLite.
//!
//! Simple versioned migrations; each transforms the schema from version N
//! to N+1 inside one transaction.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;
        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }
        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: the event log and its lookup indexes.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Append-only event log. Rows are never updated or deleted.
        CREATE TABLE events (
            seq INTEGER PRIMARY KEY,          -- gapless, starts at 1
            iscc_id BLOB NOT NULL UNIQUE,     -- 8-byte ISCC-ID body
            ts_micros INTEGER NOT NULL,       -- hub timestamp (52-bit us)
            server_id INTEGER NOT NULL,
            nonce TEXT NOT NULL UNIQUE,       -- 32 hex chars
            pubkey TEXT NOT NULL,             -- Ed25519 public key, hex
            datahash TEXT NOT NULL,
            iscc_code TEXT NOT NULL,
            note_bytes BLOB NOT NULL,         -- canonical IsccNote JSON
            received_at INTEGER NOT NULL      -- ingress wallclock, unix ms
        );

        -- Multi-valued index over declared ISCC-UNITs.
        CREATE TABLE event_units (
            event_seq INTEGER NOT NULL REFERENCES events(seq),
            unit TEXT NOT NULL,
            PRIMARY KEY (event_seq, unit)
        );

        CREATE INDEX idx_events_datahash ON events(datahash);
        CREATE INDEX idx_events_iscc_code ON events(iscc_code);
        CREATE INDEX idx_events_pubkey ON events(pubkey);
        CREATE INDEX idx_events_ts ON events(ts_micros);
        CREATE INDEX idx_event_units_unit ON event_units(unit);
        "#,
    )?;

    Ok(())
}

/// Current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"events".to_string()));
        assert!(tables.contains(&"event_units".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }
}
