//! At most one sync pass per user at a time.
//!
//! Two overlapping passes would both read the ledger before either writes
//! and then record the same matches twice.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Registry of users with a pass in flight. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    active: Arc<Mutex<HashSet<String>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `user`. Returns `None` while another guard for the
    /// same user is alive.
    pub fn try_acquire(&self, user: &str) -> Option<FlightGuard> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(user.to_string()) {
            return None;
        }
        Some(FlightGuard {
            active: Arc::clone(&self.active),
            user: user.to_string(),
        })
    }

    pub fn is_active(&self, user: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(user)
    }
}

/// Releases the user's slot on drop.
#[derive(Debug)]
pub struct FlightGuard {
    active: Arc<Mutex<HashSet<String>>>,
    user: String,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.user);
    }
}
