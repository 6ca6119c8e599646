//! Calendar event tracking: key matching and the sync pass.

pub mod matcher;
pub mod orchestrator;
pub mod pass_lock;
pub mod single_flight;
pub mod traits;
pub mod types;

pub use matcher::{match_events, MatchOutcome};
pub use orchestrator::{SyncOptions, SyncOrchestrator, SyncWindow};
pub use pass_lock::PassLock;
pub use single_flight::{FlightGuard, SingleFlight};
pub use traits::{CalendarSource, DedupLedger, KeyRegistry};
pub use types::{
    CalendarInfo, DedupKey, KeyDelta, KeyDeltas, MatchCounters, MatchedEventRecord, RawEvent,
    SyncErrorKind, SyncFailure, SyncReport, TrackingKey,
};
