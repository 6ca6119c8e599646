//! Test doubles for the sync pass collaborators.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use caltrack_core::error::{AuthError, DatabaseError, SourceError};
use caltrack_core::tracking::{
    CalendarInfo, CalendarSource, DedupKey, DedupLedger, KeyRegistry, MatchedEventRecord,
    RawEvent, TrackingKey,
};
use chrono::{DateTime, TimeZone, Utc};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 15, 12, 0, 0).unwrap()
}

pub fn calendar(id: &str) -> CalendarInfo {
    CalendarInfo {
        id: id.to_string(),
        name: format!("Calendar {id}"),
    }
}

/// A timed event on 2026-02-`day` lasting `minutes` from 10:00 UTC.
pub fn event(id: &str, summary: &str, day: u32, minutes: i64, calendar_id: &str) -> RawEvent {
    let start = Utc.with_ymd_and_hms(2026, 2, day, 10, 0, 0).unwrap();
    let end = start + chrono::Duration::minutes(minutes);
    RawEvent::timed(id, summary, start.to_rfc3339(), end.to_rfc3339(), calendar_id)
}

pub fn all_day(id: &str, summary: &str, calendar_id: &str) -> RawEvent {
    RawEvent {
        start: Some("2026-02-10".into()),
        end: Some("2026-02-11".into()),
        all_day: true,
        ..RawEvent::timed(id, summary, "", "", calendar_id)
    }
}

/// How `list_calendars` should fail, if at all.
#[derive(Debug, Clone, Copy)]
pub enum ListFailure {
    Unauthorized,
    ServerError,
}

/// In-memory calendar source.
#[derive(Default)]
pub struct FakeSource {
    pub authenticated: bool,
    pub calendars: Vec<CalendarInfo>,
    pub events: HashMap<String, Vec<RawEvent>>,
    pub failing_calendars: HashSet<String>,
    pub list_failure: Option<ListFailure>,
    pub requests: Mutex<Vec<String>>,
    pub windows: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            authenticated: true,
            ..Self::default()
        }
    }

    pub fn with_events(mut self, calendar_id: &str, events: Vec<RawEvent>) -> Self {
        self.calendars.push(calendar(calendar_id));
        self.events.insert(calendar_id.to_string(), events);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CalendarSource for FakeSource {
    fn check_auth(&self) -> Result<(), AuthError> {
        if self.authenticated {
            Ok(())
        } else {
            Err(AuthError::NotAuthenticated {
                service: "google".into(),
            })
        }
    }

    async fn list_calendars(&self) -> Result<Vec<CalendarInfo>, SourceError> {
        self.requests.lock().unwrap().push("calendarList".into());
        match self.list_failure {
            Some(ListFailure::Unauthorized) => Err(SourceError::Unauthorized { status: 401 }),
            Some(ListFailure::ServerError) => Err(SourceError::Http {
                status: 500,
                message: "backend error".into(),
            }),
            None => Ok(self.calendars.clone()),
        }
    }

    async fn list_events(
        &self,
        calendar: &CalendarInfo,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>, SourceError> {
        self.requests.lock().unwrap().push(format!("events:{}", calendar.id));
        self.windows.lock().unwrap().push((time_min, time_max));
        if self.failing_calendars.contains(&calendar.id) {
            return Err(SourceError::Http {
                status: 404,
                message: "Not Found".into(),
            });
        }
        Ok(self.events.get(&calendar.id).cloned().unwrap_or_default())
    }
}

/// In-memory key registry and ledger. Uses the trait's default aggregate
/// update, so every increment call is observable.
#[derive(Default)]
pub struct FakeStore {
    pub keys: Mutex<Vec<TrackingKey>>,
    pub records: Mutex<Vec<MatchedEventRecord>>,
    pub increments: Mutex<Vec<(String, i64)>>,
    pub fail_load_keys: bool,
    pub fail_load_ledger: bool,
    pub fail_insert_summary: Option<String>,
    pub fail_increment_key: Option<String>,
}

impl FakeStore {
    pub fn with_keys(keys: Vec<TrackingKey>) -> Self {
        Self {
            keys: Mutex::new(keys),
            ..Self::default()
        }
    }

    pub fn key(&self, id: &str) -> TrackingKey {
        self.keys
            .lock()
            .unwrap()
            .iter()
            .find(|k| k.id == id)
            .cloned()
            .unwrap()
    }

    pub fn increment_minutes(&self, id: &str) -> Vec<i64> {
        self.increments
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == id)
            .map(|(_, m)| *m)
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

impl KeyRegistry for FakeStore {
    fn load_all(&self) -> Result<Vec<TrackingKey>, DatabaseError> {
        if self.fail_load_keys {
            return Err(DatabaseError::QueryFailed("connection refused".into()));
        }
        Ok(self.keys.lock().unwrap().clone())
    }

    fn increment_stats(&self, key_id: &str, minutes: i64) -> Result<(), DatabaseError> {
        if self.fail_increment_key.as_deref() == Some(key_id) {
            return Err(DatabaseError::QueryFailed("stats write failed".into()));
        }
        let mut keys = self.keys.lock().unwrap();
        let key = keys
            .iter_mut()
            .find(|k| k.id == key_id)
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "tracking key",
                id: key_id.to_string(),
            })?;
        key.total_minutes += minutes;
        key.event_count += 1;
        self.increments
            .lock()
            .unwrap()
            .push((key_id.to_string(), minutes));
        Ok(())
    }
}

impl DedupLedger for FakeStore {
    fn load_existing(&self) -> Result<HashSet<DedupKey>, DatabaseError> {
        if self.fail_load_ledger {
            return Err(DatabaseError::Locked);
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(MatchedEventRecord::dedup_key)
            .collect())
    }

    fn insert_record(&self, record: &MatchedEventRecord) -> Result<(), DatabaseError> {
        if self.fail_insert_summary.as_deref() == Some(record.summary.as_str()) {
            return Err(DatabaseError::QueryFailed("disk full".into()));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
