pub mod auth;
pub mod calendars;
pub mod categories;
pub mod config;
pub mod events;
pub mod keys;
pub mod stats;
pub mod sync;
