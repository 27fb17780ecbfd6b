// File: ./src/scheduler.rs
//! Coalesces change notifications into one recomputation per view.
//!
//! Each view key owns at most one pending deadline. Scheduling again before
//! the deadline passes cancels the pending one and starts a new quiet window,
//! so only the last change within a window leads to a recomputation. The
//! scheduler itself never sleeps: callers ask for `next_deadline()` and hand
//! the current time to `take_due()`.
use crate::view::ViewHandle;
use indexmap::IndexMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct PendingRefresh {
    view: ViewHandle,
    deadline: Instant,
}

#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    quiet_window: Duration,
    timers: IndexMap<String, PendingRefresh>,
}

impl RefreshScheduler {
    pub fn new(quiet_window: Duration) -> Self {
        Self {
            quiet_window,
            timers: IndexMap::new(),
        }
    }

    /// (Re)starts the timer for `view`. Returns true if a pending timer was
    /// cancelled in the process.
    pub fn schedule(&mut self, view: &ViewHandle, now: Instant) -> bool {
        let pending = PendingRefresh {
            view: view.clone(),
            deadline: now + self.quiet_window,
        };
        // Re-insert at the back so ties fire in scheduling order
        let replaced = self.timers.shift_remove(view.key()).is_some();
        self.timers.insert(view.key().to_string(), pending);
        replaced
    }

    pub fn cancel(&mut self, view_key: &str) -> bool {
        self.timers.shift_remove(view_key).is_some()
    }

    pub fn is_pending(&self, view_key: &str) -> bool {
        self.timers.contains_key(view_key)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|p| p.deadline).min()
    }

    /// Removes and returns every timer whose deadline is at or before `now`,
    /// earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<ViewHandle> {
        let mut due: Vec<PendingRefresh> = Vec::new();
        self.timers.retain(|_, p| {
            if p.deadline <= now {
                due.push(p.clone());
                false
            } else {
                true
            }
        });
        due.sort_by_key(|p| p.deadline);
        due.into_iter().map(|p| p.view).collect()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
