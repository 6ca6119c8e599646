//! Data carried through a sync pass.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A user-defined matching rule plus its running totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingKey {
    pub id: String,
    pub name: String,
    /// Substring searched for in event titles. Falls back to `name` when blank.
    #[serde(default)]
    pub search_key: Option<String>,
    #[serde(default = "default_color")]
    pub color: String,
    /// Restricts matching to one calendar when set.
    #[serde(default)]
    pub calendar_id: Option<String>,
    /// Grouping for display only; never affects matching.
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub total_minutes: i64,
    #[serde(default)]
    pub event_count: i64,
    #[serde(default)]
    pub created_at: String,
}

pub(crate) fn default_color() -> String {
    "#000000".to_string()
}

impl TrackingKey {
    /// Build a key with zeroed counters.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            search_key: None,
            color: default_color(),
            calendar_id: None,
            category_id: None,
            total_minutes: 0,
            event_count: 0,
            created_at: String::new(),
        }
    }

    pub fn with_search_key(mut self, search_key: impl Into<String>) -> Self {
        self.search_key = Some(search_key.into());
        self
    }

    pub fn with_calendar(mut self, calendar_id: impl Into<String>) -> Self {
        self.calendar_id = Some(calendar_id.into());
        self
    }

    /// The trimmed term this key matches on, or `None` if neither the search
    /// key nor the name has any non-whitespace content.
    pub fn effective_search_term(&self) -> Option<&str> {
        let search = self.search_key.as_deref().map(str::trim).unwrap_or("");
        let term = if search.is_empty() {
            self.name.trim()
        } else {
            search
        };
        (!term.is_empty()).then_some(term)
    }
}

/// A calendar as listed by the remote source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarInfo {
    pub id: String,
    pub name: String,
}

/// One remote calendar entry, as fetched for a single pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub id: String,
    /// Empty when the remote entry has no title.
    pub summary: String,
    /// ISO date-time (with or without offset), or a bare `YYYY-MM-DD` date
    /// for all-day entries.
    pub start: Option<String>,
    pub end: Option<String>,
    pub all_day: bool,
    pub calendar_id: String,
    pub calendar_name: String,
}

impl RawEvent {
    /// Convenience constructor for a timed event.
    pub fn timed(
        id: impl Into<String>,
        summary: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
        calendar_id: impl Into<String>,
    ) -> Self {
        let calendar_id = calendar_id.into();
        Self {
            id: id.into(),
            summary: summary.into(),
            start: Some(start.into()),
            end: Some(end.into()),
            all_day: false,
            calendar_name: calendar_id.clone(),
            calendar_id,
        }
    }
}

/// Identity of a recorded match: `(key id, summary, start time)`, compared
/// by exact string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DedupKey {
    pub key_id: String,
    pub summary: String,
    pub start_time: String,
}

impl DedupKey {
    pub fn new(
        key_id: impl Into<String>,
        summary: impl Into<String>,
        start_time: impl Into<String>,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            summary: summary.into(),
            start_time: start_time.into(),
        }
    }
}

/// A persisted "this key matched this calendar event" fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedEventRecord {
    pub summary: String,
    pub key_id: String,
    /// Snapshot of the key's name when the match was recorded. Later renames
    /// of the key do not rewrite history.
    pub key_name: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: i64,
    /// `YYYY-MM-DD` portion of `start_time`.
    pub event_date: String,
}

impl MatchedEventRecord {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(&self.key_id, &self.summary, &self.start_time)
    }
}

/// Stats increments accumulated for one key during a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDelta {
    pub add_minutes: i64,
    pub add_events: i64,
}

impl KeyDelta {
    pub fn add(&mut self, minutes: i64) {
        self.add_minutes += minutes;
        self.add_events += 1;
    }

    /// Undo one `add` for a record that failed to persist.
    pub fn retract(&mut self, minutes: i64) {
        self.add_minutes -= minutes;
        self.add_events -= 1;
    }

    pub fn is_empty(&self) -> bool {
        self.add_events <= 0
    }
}

/// Per-key deltas in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyDeltas {
    order: Vec<String>,
    deltas: HashMap<String, KeyDelta>,
}

impl KeyDeltas {
    pub fn entry(&mut self, key_id: &str) -> &mut KeyDelta {
        if !self.deltas.contains_key(key_id) {
            self.order.push(key_id.to_string());
        }
        self.deltas.entry(key_id.to_string()).or_default()
    }

    pub fn get(&self, key_id: &str) -> Option<&KeyDelta> {
        self.deltas.get(key_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate `(key id, delta)` in the order keys first received a match.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeyDelta)> {
        self.order
            .iter()
            .filter_map(|id| self.deltas.get(id).map(|d| (id.as_str(), d)))
    }
}

/// Counters produced by the matching engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCounters {
    /// Key/event pairs that satisfied the match condition, duplicates included.
    pub matched: usize,
    pub skipped_duplicates: usize,
    pub skipped_all_day: usize,
}

/// Classification of a failure that ended (or refused) a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncErrorKind {
    AuthenticationError,
    RemoteFetchError,
    PerCalendarFetchError,
    PersistenceLoadError,
    PerRecordPersistenceError,
    AggregateUpdateError,
    UnexpectedError,
    /// Another pass for the same user is still running.
    PassInProgress,
}

impl SyncErrorKind {
    /// Whether this kind aborts the pass.
    pub fn is_fatal(self) -> bool {
        !matches!(
            self,
            SyncErrorKind::PerCalendarFetchError
                | SyncErrorKind::PerRecordPersistenceError
                | SyncErrorKind::AggregateUpdateError
        )
    }
}

/// Error attached to a report that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub kind: SyncErrorKind,
    pub message: String,
}

/// Outcome of one sync pass. Always produced, even when the pass aborts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub message: String,
    pub total_calendar_events_scanned: usize,
    pub matched: usize,
    pub new_events: usize,
    pub skipped_duplicates: usize,
    pub skipped_all_day: usize,
    pub keys_updated: usize,
    pub matched_samples: Vec<String>,
    pub debug_trace: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SyncFailure>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Refusal returned when `user` already has a pass running.
    pub fn in_progress(user: &str) -> Self {
        Self {
            message: "Sync already in progress".to_string(),
            error: Some(SyncFailure {
                kind: SyncErrorKind::PassInProgress,
                message: format!("a sync pass for {user} is already running"),
            }),
            ..Self::default()
        }
    }
}
