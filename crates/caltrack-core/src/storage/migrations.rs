//! Database schema migrations for caltrack.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::{info, warn};

/// Schema version after all migrations have run.
pub const CURRENT_VERSION: i32 = 4;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < 3 {
        migrate_v3(conn)?;
    }
    if current_version < 4 {
        migrate_v4(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!("failed to read schema_version: {e}");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration v1: tracking keys and matched events.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS tracking_keys (
            id            TEXT PRIMARY KEY,
            name          TEXT NOT NULL,
            color         TEXT NOT NULL DEFAULT '#000000',
            calendar_id   TEXT,
            total_minutes INTEGER NOT NULL DEFAULT 0,
            event_count   INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tracked_events (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            summary          TEXT NOT NULL,
            key_id           TEXT NOT NULL REFERENCES tracking_keys(id) ON DELETE CASCADE,
            key_name         TEXT NOT NULL,
            start_time       TEXT NOT NULL,
            end_time         TEXT NOT NULL,
            duration_minutes INTEGER NOT NULL DEFAULT 0,
            event_date       TEXT NOT NULL,
            created_at       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tracked_events_key_id ON tracked_events(key_id);
        CREATE INDEX IF NOT EXISTS idx_tracked_events_start_time ON tracked_events(start_time);
        CREATE INDEX IF NOT EXISTS idx_tracked_events_event_date ON tracked_events(event_date);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: separate search term from the display name.
///
/// Existing keys search on their name, which is what they did implicitly.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch("ALTER TABLE tracking_keys ADD COLUMN search_key TEXT;")?;
    tx.execute(
        "UPDATE tracking_keys SET search_key = name WHERE search_key IS NULL",
        [],
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()
}

/// Migration v3: enforce match identity uniqueness.
///
/// Older databases may already hold duplicate `(key_id, summary, start_time)`
/// rows from overlapping passes. Those are collapsed to the earliest row and
/// the affected keys' totals are recomputed before the unique index is built.
fn migrate_v3(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    let removed = tx.execute(
        "DELETE FROM tracked_events
         WHERE id NOT IN (
             SELECT MIN(id) FROM tracked_events
             GROUP BY key_id, summary, start_time
         )",
        [],
    )?;

    if removed > 0 {
        info!(removed, "collapsed duplicate tracked events");
        tx.execute(
            "UPDATE tracking_keys SET
                event_count = (SELECT COUNT(*) FROM tracked_events e WHERE e.key_id = tracking_keys.id),
                total_minutes = (SELECT COALESCE(SUM(duration_minutes), 0)
                                 FROM tracked_events e WHERE e.key_id = tracking_keys.id)",
            [],
        )?;
    }

    tx.execute_batch(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_tracked_events_identity
            ON tracked_events(key_id, summary, start_time);",
    )?;

    set_schema_version(&tx, 3)?;
    tx.commit()
}

fn has_column(conn: &Connection, table: &str, column: &str) -> SqliteResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<SqliteResult<Vec<_>>>()?;
    Ok(names.iter().any(|name| name == column))
}

/// Migration v4: categories for grouping keys.
fn migrate_v4(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS categories (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            description TEXT,
            created_at  TEXT NOT NULL
        );",
    )?;
    if !has_column(&tx, "tracking_keys", "category_id")? {
        tx.execute_batch(
            "ALTER TABLE tracking_keys
                ADD COLUMN category_id TEXT REFERENCES categories(id) ON DELETE SET NULL;",
        )?;
    }

    set_schema_version(&tx, 4)?;
    tx.commit()
}
