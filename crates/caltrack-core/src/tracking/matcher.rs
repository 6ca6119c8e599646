//! Matching engine: decides which fetched events are new, relevant matches.
//!
//! Pure function over the pass inputs. It never touches storage; the
//! orchestrator persists what comes out of here.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime};
use tracing::trace;

use super::types::{
    DedupKey, KeyDeltas, MatchCounters, MatchedEventRecord, RawEvent, TrackingKey,
};

/// Everything the engine decided for one pass.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    /// New records, in emission order (event order, then key order).
    pub records: Vec<MatchedEventRecord>,
    pub deltas: KeyDeltas,
    pub counters: MatchCounters,
}

/// How an event's time span qualifies it for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timing<'a> {
    Timed {
        start: &'a str,
        end: &'a str,
        minutes: i64,
    },
    /// Date-only entry, or one with a missing bound.
    AllDay,
    /// Zero, negative or unparseable span. Dropped without counting.
    Degenerate,
}

fn classify(event: &RawEvent) -> Timing<'_> {
    let (Some(start), Some(end)) = (event.start.as_deref(), event.end.as_deref()) else {
        return Timing::AllDay;
    };
    if event.all_day || !start.contains('T') {
        return Timing::AllDay;
    }
    match duration_minutes(start, end) {
        Some(minutes) if minutes > 0 => Timing::Timed { start, end, minutes },
        _ => Timing::Degenerate,
    }
}

/// Offset-less ISO date-time, as sent for events pinned to a named time zone.
const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Length of `start..end` in whole minutes, rounded half away from zero.
///
/// Both bounds are RFC 3339 timestamps, or both lack an offset and are read
/// as wall-clock times in the same zone. Anything else yields `None`.
pub fn duration_minutes(start: &str, end: &str) -> Option<i64> {
    let span = match (
        DateTime::parse_from_rfc3339(start),
        DateTime::parse_from_rfc3339(end),
    ) {
        (Ok(start), Ok(end)) => end - start,
        (Err(_), Err(_)) => {
            let start = NaiveDateTime::parse_from_str(start, NAIVE_FORMAT).ok()?;
            let end = NaiveDateTime::parse_from_str(end, NAIVE_FORMAT).ok()?;
            end - start
        }
        _ => return None,
    };
    Some((span.num_milliseconds() as f64 / 60_000.0).round() as i64)
}

/// Date portion of an ISO timestamp.
pub fn event_date(start: &str) -> &str {
    start.split('T').next().unwrap_or(start)
}

/// Match `events` against `keys`.
///
/// `ledger` holds the identities already recorded. Every emitted record's
/// identity is inserted into it before the next comparison, so the same
/// key/event pair is never emitted twice, even within one pass.
pub fn match_events(
    keys: &[TrackingKey],
    events: &[RawEvent],
    ledger: &mut HashSet<DedupKey>,
) -> MatchOutcome {
    let mut outcome = MatchOutcome::default();

    // Resolve terms once per pass instead of once per event.
    let terms: Vec<(&TrackingKey, String)> = keys
        .iter()
        .filter_map(|key| {
            key.effective_search_term()
                .map(|term| (key, term.to_lowercase()))
        })
        .collect();

    for event in events {
        if event.summary.is_empty() {
            continue;
        }

        let (start, end, minutes) = match classify(event) {
            Timing::Timed { start, end, minutes } => (start, end, minutes),
            Timing::AllDay => {
                outcome.counters.skipped_all_day += 1;
                continue;
            }
            Timing::Degenerate => continue,
        };

        let summary_lower = event.summary.to_lowercase();

        for (key, term) in &terms {
            if !summary_lower.contains(term.as_str()) {
                continue;
            }
            if key
                .calendar_id
                .as_deref()
                .is_some_and(|cal| cal != event.calendar_id)
            {
                continue;
            }

            outcome.counters.matched += 1;

            let identity = DedupKey::new(&key.id, &event.summary, start);
            if ledger.contains(&identity) {
                trace!(key_id = %key.id, summary = %event.summary, "duplicate match skipped");
                outcome.counters.skipped_duplicates += 1;
                continue;
            }

            outcome.records.push(MatchedEventRecord {
                summary: event.summary.clone(),
                key_id: key.id.clone(),
                key_name: key.name.clone(),
                start_time: start.to_string(),
                end_time: end.to_string(),
                duration_minutes: minutes,
                event_date: event_date(start).to_string(),
            });
            ledger.insert(identity);
            outcome.deltas.entry(&key.id).add(minutes);
        }
    }

    outcome
}
