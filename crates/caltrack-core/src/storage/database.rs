//! SQLite-based storage for tracking keys and matched events.
//!
//! Provides persistent storage for:
//! - Tracking keys and their running totals
//! - Categories grouping keys for display
//! - Matched event records (the dedup ledger), synced or entered by hand
//! - Summary statistics over both

use std::collections::HashSet;
use std::path::Path;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{data_dir, migrations};
use crate::error::{DatabaseError, Result, ValidationError};
use crate::tracking::matcher;
use crate::tracking::types::default_color;
use crate::tracking::{DedupKey, DedupLedger, KeyDelta, KeyRegistry, MatchedEventRecord, TrackingKey};

/// Fields for a new tracking key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewKey {
    pub name: String,
    pub search_key: Option<String>,
    pub color: Option<String>,
    pub calendar_id: Option<String>,
    pub category_id: Option<String>,
}

/// Partial update of a tracking key. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyPatch {
    pub name: Option<String>,
    pub search_key: Option<String>,
    pub color: Option<String>,
    /// `Some(None)` removes the calendar restriction.
    pub calendar_id: Option<Option<String>>,
    /// `Some(None)` removes the key from its category.
    pub category_id: Option<Option<String>>,
}

/// A named group of tracking keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryPatch {
    pub name: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
}

/// A matched event entered by hand rather than found by a sync pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualEvent {
    pub key_id: String,
    pub summary: String,
    pub start_time: String,
    pub end_time: String,
    /// Computed from the bounds when absent.
    pub duration_minutes: Option<i64>,
}

/// Filter for browsing matched events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub key_id: Option<String>,
    /// Case-insensitive substring of the summary.
    pub search: Option<String>,
    pub limit: Option<usize>,
}

/// A matched event record as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: i64,
    #[serde(flatten)]
    pub record: MatchedEventRecord,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyStats {
    pub key_id: String,
    pub name: String,
    pub color: String,
    pub hours: f64,
    pub event_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total_hours: f64,
    pub total_events: i64,
    pub active_keys: usize,
    pub this_week_hours: f64,
    pub last_week_hours: f64,
    pub per_key: Vec<KeyStats>,
}

/// Minutes to hours, one decimal place.
fn to_hours(minutes: i64) -> f64 {
    (minutes as f64 / 60.0 * 10.0).round() / 10.0
}

const KEY_COLUMNS: &str =
    "id, name, search_key, color, calendar_id, total_minutes, event_count, created_at, category_id";

const EVENT_COLUMNS: &str =
    "id, summary, key_id, key_name, start_time, end_time, duration_minutes, event_date, created_at";

fn key_from_row(row: &Row<'_>) -> rusqlite::Result<TrackingKey> {
    Ok(TrackingKey {
        id: row.get(0)?,
        name: row.get(1)?,
        search_key: row.get(2)?,
        color: row.get(3)?,
        calendar_id: row.get(4)?,
        total_minutes: row.get(5)?,
        event_count: row.get(6)?,
        created_at: row.get(7)?,
        category_id: row.get(8)?,
    })
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<StoredEvent> {
    Ok(StoredEvent {
        id: row.get(0)?,
        record: MatchedEventRecord {
            summary: row.get(1)?,
            key_id: row.get(2)?,
            key_name: row.get(3)?,
            start_time: row.get(4)?,
            end_time: row.get(5)?,
            duration_minutes: row.get(6)?,
            event_date: row.get(7)?,
        },
        created_at: row.get(8)?,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// SQLite database holding keys and matched events.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data dir>/caltrack.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("caltrack.db");
        Self::open_at(&path)
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Create a key with zeroed totals.
    ///
    /// The search term defaults to the name and the color to black.
    pub fn create_key(&self, new: &NewKey) -> Result<TrackingKey> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(ValidationError::Required("name").into());
        }

        let key = TrackingKey {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            search_key: Some(non_blank(new.search_key.clone()).unwrap_or_else(|| name.to_string())),
            color: non_blank(new.color.clone()).unwrap_or_else(default_color),
            calendar_id: non_blank(new.calendar_id.clone()),
            category_id: non_blank(new.category_id.clone()),
            total_minutes: 0,
            event_count: 0,
            created_at: Utc::now().to_rfc3339(),
        };
        if let Some(category_id) = &key.category_id {
            self.require_category(category_id)?;
        }

        self.conn.execute(
            "INSERT INTO tracking_keys
                (id, name, search_key, color, calendar_id, category_id, total_minutes, event_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, ?7)",
            params![
                key.id,
                key.name,
                key.search_key,
                key.color,
                key.calendar_id,
                key.category_id,
                key.created_at,
            ],
        )?;
        debug!(key_id = %key.id, name = %key.name, "tracking key created");
        Ok(key)
    }

    pub fn get_key(&self, id: &str) -> Result<Option<TrackingKey>> {
        let key = self
            .conn
            .query_row(
                &format!("SELECT {KEY_COLUMNS} FROM tracking_keys WHERE id = ?1"),
                params![id],
                key_from_row,
            )
            .optional()?;
        Ok(key)
    }

    /// Edit a key's definition. Totals are never touched here.
    pub fn update_key(&self, id: &str, patch: &KeyPatch) -> Result<TrackingKey> {
        let mut key = self.get_key(id)?.ok_or_else(|| DatabaseError::NotFound {
            entity: "tracking key",
            id: id.to_string(),
        })?;

        if let Some(name) = &patch.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ValidationError::Required("name").into());
            }
            key.name = name.to_string();
        }
        if let Some(search_key) = &patch.search_key {
            key.search_key = non_blank(Some(search_key.clone()));
        }
        if let Some(color) = &patch.color {
            key.color = non_blank(Some(color.clone())).unwrap_or_else(default_color);
        }
        if let Some(calendar_id) = &patch.calendar_id {
            key.calendar_id = non_blank(calendar_id.clone());
        }
        if let Some(category_id) = &patch.category_id {
            key.category_id = non_blank(category_id.clone());
            if let Some(category_id) = &key.category_id {
                self.require_category(category_id)?;
            }
        }

        self.conn.execute(
            "UPDATE tracking_keys
             SET name = ?2, search_key = ?3, color = ?4, calendar_id = ?5, category_id = ?6
             WHERE id = ?1",
            params![
                key.id,
                key.name,
                key.search_key,
                key.color,
                key.calendar_id,
                key.category_id,
            ],
        )?;
        Ok(key)
    }

    /// Delete a key together with all of its matched events.
    pub fn delete_key(&self, id: &str) -> Result<()> {
        let removed = self
            .conn
            .execute("DELETE FROM tracking_keys WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "tracking key",
                id: id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// All keys, newest first.
    pub fn list_keys(&self) -> Result<Vec<TrackingKey>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {KEY_COLUMNS} FROM tracking_keys ORDER BY created_at DESC, rowid DESC"
        ))?;
        let keys = stmt
            .query_map([], key_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }

    /// Matched events, most recent start first.
    ///
    /// The search is a Unicode-aware, case-insensitive literal substring
    /// match. It runs before the limit is applied.
    pub fn list_events(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>> {
        let key_id = filter
            .key_id
            .as_deref()
            .filter(|k| !k.is_empty() && *k != "all");
        let needle = filter
            .search
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM tracked_events
             WHERE ?1 IS NULL OR key_id = ?1
             ORDER BY start_time DESC"
        ))?;
        let rows = stmt.query_map(params![key_id], event_from_row)?;

        let limit = filter.limit.unwrap_or(usize::MAX);
        let mut events = Vec::new();
        for event in rows {
            if events.len() >= limit {
                break;
            }
            let event = event?;
            if let Some(needle) = &needle {
                if !event.record.summary.to_lowercase().contains(needle.as_str()) {
                    continue;
                }
            }
            events.push(event);
        }
        Ok(events)
    }

    /// Record an event by hand and count it towards its key, in one
    /// transaction.
    ///
    /// The key name is taken from the key and the event date from the start.
    /// Without an explicit duration the bounds are measured, and bounds that
    /// cannot be measured count as 0 minutes.
    pub fn add_manual_event(&self, event: &ManualEvent) -> Result<StoredEvent> {
        let summary = event.summary.trim();
        if summary.is_empty() {
            return Err(ValidationError::Required("summary").into());
        }
        if event.key_id.trim().is_empty() {
            return Err(ValidationError::Required("key_id").into());
        }
        let start_time = event.start_time.trim();
        if start_time.is_empty() {
            return Err(ValidationError::Required("start_time").into());
        }
        let end_time = event.end_time.trim();
        if end_time.is_empty() {
            return Err(ValidationError::Required("end_time").into());
        }

        let key = self.get_key(&event.key_id)?.ok_or_else(|| DatabaseError::NotFound {
            entity: "tracking key",
            id: event.key_id.clone(),
        })?;
        let minutes = event
            .duration_minutes
            .or_else(|| matcher::duration_minutes(start_time, end_time))
            .unwrap_or(0);
        if minutes < 0 {
            return Err(ValidationError::InvalidValue {
                field: "duration_minutes".into(),
                message: format!("must not be negative, got {minutes}"),
            }
            .into());
        }

        let record = MatchedEventRecord {
            summary: summary.to_string(),
            key_id: key.id.clone(),
            key_name: key.name.clone(),
            start_time: start_time.to_string(),
            end_time: end_time.to_string(),
            duration_minutes: minutes,
            event_date: matcher::event_date(start_time).to_string(),
        };

        let tx = self.conn.unchecked_transaction()?;
        self.insert_record(&record)?;
        let id = self.conn.last_insert_rowid();
        self.increment_stats(&key.id, minutes)?;
        tx.commit()?;
        debug!(key_id = %key.id, minutes, "manual event recorded");

        let stored = self.conn.query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM tracked_events WHERE id = ?1"),
            params![id],
            event_from_row,
        )?;
        Ok(stored)
    }

    pub fn create_category(&self, new: &NewCategory) -> Result<Category> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(ValidationError::Required("name").into());
        }
        let category = Category {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: non_blank(new.description.clone()),
            created_at: Utc::now().to_rfc3339(),
        };
        self.conn.execute(
            "INSERT INTO categories (id, name, description, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![category.id, category.name, category.description, category.created_at],
        )?;
        Ok(category)
    }

    pub fn get_category(&self, id: &str) -> Result<Option<Category>> {
        let category = self
            .conn
            .query_row(
                "SELECT id, name, description, created_at FROM categories WHERE id = ?1",
                params![id],
                category_from_row,
            )
            .optional()?;
        Ok(category)
    }

    fn require_category(&self, id: &str) -> Result<Category> {
        self.get_category(id)?.ok_or_else(|| {
            DatabaseError::NotFound {
                entity: "category",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// All categories, newest first.
    pub fn list_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, created_at FROM categories
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let categories = stmt
            .query_map([], category_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(categories)
    }

    pub fn update_category(&self, id: &str, patch: &CategoryPatch) -> Result<Category> {
        let mut category = self.require_category(id)?;
        if let Some(name) = &patch.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ValidationError::Required("name").into());
            }
            category.name = name.to_string();
        }
        if let Some(description) = &patch.description {
            category.description = non_blank(description.clone());
        }
        self.conn.execute(
            "UPDATE categories SET name = ?2, description = ?3 WHERE id = ?1",
            params![category.id, category.name, category.description],
        )?;
        Ok(category)
    }

    /// Delete a category. Its keys stay, without a category.
    pub fn delete_category(&self, id: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE tracking_keys SET category_id = NULL WHERE category_id = ?1",
            params![id],
        )?;
        let removed = tx.execute("DELETE FROM categories WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(DatabaseError::NotFound {
                entity: "category",
                id: id.to_string(),
            }
            .into());
        }
        tx.commit()?;
        Ok(())
    }

    /// Totals across all keys, with week-over-week hours relative to `today`.
    ///
    /// Weeks start on Monday.
    pub fn summary_stats(&self, today: NaiveDate) -> Result<SummaryStats> {
        let keys = self.load_all()?;

        let week_start = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
        let next_week = week_start + Duration::days(7);
        let last_week = week_start - Duration::days(7);

        let minutes_between = |from: NaiveDate, to: NaiveDate| -> rusqlite::Result<i64> {
            self.conn.query_row(
                "SELECT COALESCE(SUM(duration_minutes), 0) FROM tracked_events
                 WHERE event_date >= ?1 AND event_date < ?2",
                params![from.to_string(), to.to_string()],
                |row| row.get(0),
            )
        };
        let this_week_minutes = minutes_between(week_start, next_week)?;
        let last_week_minutes = minutes_between(last_week, week_start)?;

        let total_minutes: i64 = keys.iter().map(|k| k.total_minutes).sum();
        let mut per_key: Vec<KeyStats> = keys
            .iter()
            .map(|k| KeyStats {
                key_id: k.id.clone(),
                name: k.name.clone(),
                color: k.color.clone(),
                hours: to_hours(k.total_minutes),
                event_count: k.event_count,
            })
            .collect();
        per_key.sort_by(|a, b| b.hours.total_cmp(&a.hours));

        Ok(SummaryStats {
            total_hours: to_hours(total_minutes),
            total_events: keys.iter().map(|k| k.event_count).sum(),
            active_keys: keys.iter().filter(|k| k.event_count > 0).count(),
            this_week_hours: to_hours(this_week_minutes),
            last_week_hours: to_hours(last_week_minutes),
            per_key,
        })
    }
}

impl KeyRegistry for Database {
    /// Oldest first, so newly added keys come last in matching order.
    fn load_all(&self) -> Result<Vec<TrackingKey>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {KEY_COLUMNS} FROM tracking_keys ORDER BY created_at ASC, rowid ASC"
        ))?;
        let keys = stmt
            .query_map([], key_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }

    fn increment_stats(&self, key_id: &str, minutes: i64) -> Result<(), DatabaseError> {
        self.apply_aggregate_delta(
            key_id,
            KeyDelta {
                add_minutes: minutes,
                add_events: 1,
            },
        )
    }

    fn apply_aggregate_delta(&self, key_id: &str, delta: KeyDelta) -> Result<(), DatabaseError> {
        let updated = self.conn.execute(
            "UPDATE tracking_keys
             SET total_minutes = total_minutes + ?2, event_count = event_count + ?3
             WHERE id = ?1",
            params![key_id, delta.add_minutes, delta.add_events],
        )?;
        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "tracking key",
                id: key_id.to_string(),
            });
        }
        Ok(())
    }
}

impl DedupLedger for Database {
    fn load_existing(&self) -> Result<HashSet<DedupKey>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key_id, summary, start_time FROM tracked_events")?;
        let keys = stmt
            .query_map([], |row| {
                Ok(DedupKey {
                    key_id: row.get(0)?,
                    summary: row.get(1)?,
                    start_time: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(keys)
    }

    fn insert_record(&self, record: &MatchedEventRecord) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO tracked_events
                (summary, key_id, key_name, start_time, end_time, duration_minutes, event_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.summary,
                record.key_id,
                record.key_name,
                record.start_time,
                record.end_time,
                record.duration_minutes,
                record.event_date,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}
