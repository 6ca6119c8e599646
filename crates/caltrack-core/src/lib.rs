//! # Caltrack Core Library
//!
//! This library tracks time spent on user-defined topics by matching calendar
//! event titles against tracking keys. All operations are exposed through the
//! standalone `caltrack` CLI, which is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Tracking**: The matching engine (pure) and the sync orchestrator that
//!   drives one fetch/match/persist/aggregate pass over injected collaborators
//! - **Storage**: SQLite-based key registry, categories and dedup ledger, TOML
//!   configuration
//! - **Integrations**: Google Calendar event source and credential lookup
//!
//! ## Key Components
//!
//! - [`SyncOrchestrator`]: Runs a sync pass and produces a [`SyncReport`]
//! - [`match_events`]: Matches events against keys without side effects
//! - [`Database`]: Tracking key and matched event persistence
//! - [`Config`]: Application configuration management
//! - [`GoogleCalendarSource`]: Remote calendar collaborator

pub mod error;
pub mod integrations;
pub mod storage;
pub mod tracking;

pub use error::{AuthError, ConfigError, CoreError, DatabaseError, SourceError, ValidationError};
pub use integrations::{GoogleCalendarSource, StoredToken, TokenOrigin};
pub use storage::{
    Category, CategoryPatch, Config, Database, EventFilter, KeyPatch, ManualEvent, NewCategory,
    NewKey, StoredEvent, SummaryStats,
};
pub use tracking::{
    match_events, CalendarInfo, CalendarSource, DedupKey, DedupLedger, KeyRegistry,
    MatchedEventRecord, PassLock, RawEvent, SingleFlight, SyncErrorKind, SyncOptions,
    SyncOrchestrator, SyncReport, TrackingKey,
};
