//! One end-to-end sync pass: fetch, match, persist, aggregate.
//!
//! Pass states, in order:
//!
//! 1. auth check (fatal)
//! 2. load keys (fatal; zero keys ends the pass without error)
//! 3. load recorded matches (best effort, empty on failure)
//! 4. list calendars (fatal)
//! 5. list events per calendar (failures skip that calendar)
//! 6. match
//! 7. persist each new record (failures skip that record)
//! 8. apply per-key aggregates (failures skip that key)
//!
//! Every state appends to the report's diagnostic trace, which is returned
//! whether or not the pass completes.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use super::matcher::{self, MatchOutcome};
use super::pass_lock::PassLock;
use super::single_flight::SingleFlight;
use super::traits::{CalendarSource, DedupLedger, KeyRegistry};
use super::types::{RawEvent, SyncErrorKind, SyncFailure, SyncReport};
use crate::error::DatabaseError;
use crate::storage::config::SyncConfig;

pub const DEFAULT_LOOKBACK_DAYS: i64 = 90;
pub const DEFAULT_LOOKAHEAD_DAYS: i64 = 30;
pub const DEFAULT_SAMPLE_LIMIT: usize = 10;

/// Scan window relative to the moment the pass starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub lookback_days: i64,
    pub lookahead_days: i64,
}

impl Default for SyncWindow {
    fn default() -> Self {
        Self {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            lookahead_days: DEFAULT_LOOKAHEAD_DAYS,
        }
    }
}

impl SyncWindow {
    /// `(now - lookback, now + lookahead)`, or `None` if out of range.
    pub fn bounds(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let min = now.checked_sub_signed(Duration::try_days(self.lookback_days)?)?;
        let max = now.checked_add_signed(Duration::try_days(self.lookahead_days)?)?;
        Some((min, max))
    }
}

/// Tunables for a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub window: SyncWindow,
    /// Maximum number of "matched X -> key Y" lines kept in the report.
    pub sample_limit: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            window: SyncWindow::default(),
            sample_limit: DEFAULT_SAMPLE_LIMIT,
        }
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(cfg: &SyncConfig) -> Self {
        Self {
            window: SyncWindow {
                lookback_days: i64::from(cfg.lookback_days),
                lookahead_days: i64::from(cfg.lookahead_days),
            },
            sample_limit: cfg.sample_limit,
        }
    }
}

/// Runs sync passes against injected collaborators.
pub struct SyncOrchestrator<'a> {
    source: &'a dyn CalendarSource,
    registry: &'a dyn KeyRegistry,
    ledger: &'a dyn DedupLedger,
    options: SyncOptions,
}

fn failure(kind: SyncErrorKind, message: impl Into<String>) -> SyncFailure {
    SyncFailure {
        kind,
        message: message.into(),
    }
}

fn note(report: &mut SyncReport, line: String) {
    info!(target: "caltrack::sync", "{line}");
    report.debug_trace.push(line);
}

fn caution(report: &mut SyncReport, kind: SyncErrorKind, line: String) {
    warn!(target: "caltrack::sync", kind = ?kind, "{line}");
    report.debug_trace.push(format!("warning: {line}"));
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(
        source: &'a dyn CalendarSource,
        registry: &'a dyn KeyRegistry,
        ledger: &'a dyn DedupLedger,
    ) -> Self {
        Self {
            source,
            registry,
            ledger,
            options: SyncOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Run one pass anchored at `now`.
    pub async fn run(&self, now: DateTime<Utc>) -> SyncReport {
        let mut report = SyncReport::default();
        if let Err(fail) = self.execute(now, &mut report).await {
            warn!(target: "caltrack::sync", kind = ?fail.kind, "sync pass aborted: {}", fail.message);
            report.message = "Failed to sync tracking".to_string();
            report.debug_trace.push(format!("Fatal: {}", fail.message));
            report.error = Some(fail);
        }
        report
    }

    /// Like [`run`](Self::run), but refuses to start while another pass for
    /// `user` holds a slot in `flights`.
    pub async fn run_exclusive(
        &self,
        flights: &SingleFlight,
        user: &str,
        now: DateTime<Utc>,
    ) -> SyncReport {
        let Some(_guard) = flights.try_acquire(user) else {
            warn!(target: "caltrack::sync", user, "sync pass already running");
            return SyncReport::in_progress(user);
        };
        self.run(now).await
    }

    /// Like [`run`](Self::run), but holds `lock` for the whole pass so that
    /// other processes sharing the data directory are refused.
    pub async fn run_locked(&self, lock: &mut PassLock, now: DateTime<Utc>) -> SyncReport {
        let user = lock.user().to_string();
        let path = lock.path().to_path_buf();
        match lock.try_acquire() {
            Ok(Some(_guard)) => self.run(now).await,
            Ok(None) => {
                warn!(target: "caltrack::sync", user, "sync lock held by another process");
                SyncReport::in_progress(&user)
            }
            Err(e) => SyncReport {
                message: "Failed to sync tracking".to_string(),
                debug_trace: vec![format!("Fatal: cannot lock {}: {e}", path.display())],
                error: Some(failure(SyncErrorKind::UnexpectedError, e.to_string())),
                ..SyncReport::default()
            },
        }
    }

    async fn execute(&self, now: DateTime<Utc>, report: &mut SyncReport) -> Result<(), SyncFailure> {
        self.source
            .check_auth()
            .map_err(|e| failure(SyncErrorKind::AuthenticationError, e.to_string()))?;

        let keys = self.registry.load_all().map_err(|e| {
            failure(
                SyncErrorKind::PersistenceLoadError,
                format!("Failed to load tracking keys: {e}"),
            )
        })?;

        if keys.is_empty() {
            report.message = "No tracking keys found".to_string();
            note(report, "No tracking keys in the database.".to_string());
            return Ok(());
        }

        let described: Vec<String> = keys
            .iter()
            .map(|k| {
                format!(
                    "\"{}\" (search: \"{}\")",
                    k.name,
                    k.effective_search_term().unwrap_or("")
                )
            })
            .collect();
        note(report, format!("{} keys loaded: {}", keys.len(), described.join(", ")));

        let mut ledger = match self.ledger.load_existing() {
            Ok(set) => set,
            Err(e) => {
                caution(
                    report,
                    SyncErrorKind::PersistenceLoadError,
                    format!("could not load recorded matches ({e}); assuming none"),
                );
                HashSet::new()
            }
        };
        note(report, format!("{} matches already recorded.", ledger.len()));

        let events = self.fetch_events(now, report).await?;
        report.total_calendar_events_scanned = events.len();

        let MatchOutcome {
            records,
            mut deltas,
            counters,
        } = matcher::match_events(&keys, &events, &mut ledger);
        report.matched = counters.matched;
        report.skipped_duplicates = counters.skipped_duplicates;
        report.skipped_all_day = counters.skipped_all_day;

        for record in &records {
            match self.ledger.insert_record(record) {
                Ok(()) => {
                    report.new_events += 1;
                    if report.matched_samples.len() < self.options.sample_limit {
                        report.matched_samples.push(format!(
                            "\"{}\" → {} ({}min)",
                            record.summary, record.key_name, record.duration_minutes
                        ));
                    }
                }
                Err(e) => {
                    deltas.entry(&record.key_id).retract(record.duration_minutes);
                    if matches!(e, DatabaseError::Duplicate(_)) {
                        // Recorded by someone else since the ledger was loaded.
                        report.skipped_duplicates += 1;
                    }
                    caution(
                        report,
                        SyncErrorKind::PerRecordPersistenceError,
                        format!("could not save \"{}\": {e}", record.summary),
                    );
                }
            }
        }

        note(
            report,
            format!(
                "Matching: {} matches, {} new, {} duplicates skipped, {} all-day skipped.",
                report.matched, report.new_events, report.skipped_duplicates, report.skipped_all_day
            ),
        );

        for (key_id, delta) in deltas.iter() {
            if delta.is_empty() {
                continue;
            }
            match self.registry.apply_aggregate_delta(key_id, *delta) {
                Ok(()) => report.keys_updated += 1,
                Err(e) => caution(
                    report,
                    SyncErrorKind::AggregateUpdateError,
                    format!("stats update failed for key {key_id}: {e}"),
                ),
            }
        }
        note(report, format!("{} keys updated.", report.keys_updated));

        report.message = "Tracking sync complete".to_string();
        Ok(())
    }

    /// List calendars, then every calendar's events inside the window. All
    /// fetches finish before matching starts.
    async fn fetch_events(
        &self,
        now: DateTime<Utc>,
        report: &mut SyncReport,
    ) -> Result<Vec<RawEvent>, SyncFailure> {
        let (time_min, time_max) = self.options.window.bounds(now).ok_or_else(|| {
            failure(SyncErrorKind::UnexpectedError, "scan window is out of range")
        })?;

        let calendars = self.source.list_calendars().await.map_err(|e| {
            let kind = if e.is_unauthorized() {
                SyncErrorKind::AuthenticationError
            } else {
                SyncErrorKind::RemoteFetchError
            };
            failure(kind, format!("Failed to list calendars: {e}"))
        })?;

        let names: Vec<&str> = calendars.iter().map(|c| c.name.as_str()).collect();
        note(
            report,
            format!("{} calendars found: {}", calendars.len(), names.join(", ")),
        );

        let mut events = Vec::new();
        for calendar in &calendars {
            match self.source.list_events(calendar, time_min, time_max).await {
                Ok(mut batch) => events.append(&mut batch),
                Err(e) => caution(
                    report,
                    SyncErrorKind::PerCalendarFetchError,
                    format!("calendar \"{}\" could not be read: {e}", calendar.name),
                ),
            }
        }

        let all_day = events.iter().filter(|e| e.all_day).count();
        note(
            report,
            format!(
                "{} calendar events fetched ({} timed, {} all-day).",
                events.len(),
                events.len() - all_day,
                all_day
            ),
        );
        Ok(events)
    }
}
