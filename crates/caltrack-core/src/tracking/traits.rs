use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::{CalendarInfo, DedupKey, KeyDelta, MatchedEventRecord, RawEvent, TrackingKey};
use crate::error::{AuthError, DatabaseError, SourceError};

/// Remote calendar provider read during a sync pass.
///
/// Implementations own their credential; the pass only asks whether it is
/// usable before doing any work.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Fail fast if no usable credential is present.
    fn check_auth(&self) -> Result<(), AuthError>;

    /// Every calendar visible to the user.
    async fn list_calendars(&self) -> Result<Vec<CalendarInfo>, SourceError>;

    /// Events of one calendar overlapping `[time_min, time_max)`, recurring
    /// series expanded into single instances.
    async fn list_events(
        &self,
        calendar: &CalendarInfo,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>, SourceError>;
}

/// Store of tracking keys and their running totals.
pub trait KeyRegistry {
    /// All keys, in the order matching should consider them.
    fn load_all(&self) -> Result<Vec<TrackingKey>, DatabaseError>;

    /// Add `minutes` to the key's total and exactly one to its event count.
    fn increment_stats(&self, key_id: &str, minutes: i64) -> Result<(), DatabaseError>;

    /// Apply a whole pass's delta for one key.
    ///
    /// The default drives [`increment_stats`](Self::increment_stats) once per
    /// matched event: the full minute sum goes with the first call and zero
    /// with the rest, so the count grows by `add_events` while the minutes
    /// are added once. The first failing call abandons the remainder.
    /// Stores with multi-column atomic increments should override this.
    fn apply_aggregate_delta(&self, key_id: &str, delta: KeyDelta) -> Result<(), DatabaseError> {
        for i in 0..delta.add_events {
            let minutes = if i == 0 { delta.add_minutes } else { 0 };
            self.increment_stats(key_id, minutes)?;
        }
        Ok(())
    }
}

/// Store of previously recorded matches.
pub trait DedupLedger {
    /// Identities of every recorded match.
    fn load_existing(&self) -> Result<HashSet<DedupKey>, DatabaseError>;

    fn insert_record(&self, record: &MatchedEventRecord) -> Result<(), DatabaseError>;
}
