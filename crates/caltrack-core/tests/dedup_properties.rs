//! Property tests for the matching engine's dedup guarantees.

use std::collections::HashSet;

use caltrack_core::tracking::{match_events, DedupKey, RawEvent, TrackingKey};
use proptest::prelude::*;

const TITLES: &[&str] = &["GPM", "gpm übung", "Mathe", "GPM Mathe", "Sport", ""];

fn arb_event() -> impl Strategy<Value = RawEvent> {
    (0..TITLES.len(), 1u32..28, 0u32..24, 0i64..240, any::<bool>(), 0..2usize).prop_map(
        |(title, day, hour, minutes, all_day, cal)| {
            let start = format!("2026-02-{day:02}T{hour:02}:00:00Z");
            let end = format!(
                "2026-02-{day:02}T{:02}:{:02}:00Z",
                hour + (minutes / 60) as u32 % 24,
                minutes % 60
            );
            let mut event = RawEvent::timed("e", TITLES[title], start, end, format!("cal-{cal}"));
            if all_day {
                event.start = Some(format!("2026-02-{day:02}"));
                event.all_day = true;
            }
            event
        },
    )
}

fn keys() -> Vec<TrackingKey> {
    vec![
        TrackingKey::new("k1", "GPM"),
        TrackingKey::new("k2", "Mathe"),
        TrackingKey::new("k3", "Sport").with_calendar("cal-1"),
    ]
}

proptest! {
    #[test]
    fn emitted_records_are_unique_and_new(
        events in prop::collection::vec(arb_event(), 0..40),
        seen in prop::collection::vec(arb_event(), 0..10),
    ) {
        let keys = keys();
        let mut ledger: HashSet<DedupKey> = match_events(&keys, &seen, &mut HashSet::new())
            .records
            .iter()
            .map(|r| r.dedup_key())
            .collect();
        let before = ledger.clone();

        let outcome = match_events(&keys, &events, &mut ledger);

        let mut identities = HashSet::new();
        for record in &outcome.records {
            let identity = record.dedup_key();
            prop_assert!(!before.contains(&identity));
            prop_assert!(identities.insert(identity));
            prop_assert!(record.duration_minutes > 0);
        }
        prop_assert_eq!(
            outcome.counters.matched,
            outcome.records.len() + outcome.counters.skipped_duplicates
        );

        let total: i64 = outcome.deltas.iter().map(|(_, d)| d.add_minutes).sum();
        let expected: i64 = outcome.records.iter().map(|r| r.duration_minutes).sum();
        prop_assert_eq!(total, expected);
    }

    #[test]
    fn replaying_a_pass_emits_nothing(events in prop::collection::vec(arb_event(), 0..40)) {
        let keys = keys();
        let mut ledger = HashSet::new();
        let first = match_events(&keys, &events, &mut ledger);

        let second = match_events(&keys, &events, &mut ledger);

        prop_assert!(second.records.is_empty());
        prop_assert_eq!(second.counters.matched, first.counters.matched);
        prop_assert_eq!(second.counters.skipped_duplicates, second.counters.matched);
    }
}
