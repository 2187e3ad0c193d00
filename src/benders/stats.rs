//! Callback statistics
use crate::solver::CallbackWhere;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Invocation counters and time spent, partitioned by context and by whether
/// the invocation added a cut. Updated from any worker thread.
#[derive(Debug, Default)]
pub struct CallbackStats {
    integer: AtomicU64,
    integer_success: AtomicU64,
    general: AtomicU64,
    general_success: AtomicU64,
    integer_ns: AtomicU64,
    integer_success_ns: AtomicU64,
    general_ns: AtomicU64,
    general_success_ns: AtomicU64,
}

/// Snapshot of [`CallbackStats`], times in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CallbackReport {
    pub callback_counter_integer: u64,
    pub callback_counter_integer_success: u64,
    pub callback_counter_general: u64,
    pub callback_counter_general_success: u64,
    pub total_time_integer: f64,
    pub total_time_integer_success: f64,
    pub total_time_general: f64,
    pub total_time_general_success: f64,
}

impl CallbackStats {
    pub fn new() -> Self {
        CallbackStats::default()
    }

    /// Record one finished invocation.
    pub fn record(&self, location: CallbackWhere, success: bool, elapsed: Duration) {
        let ns = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        let (calls, successes, time, success_time) = match location {
            CallbackWhere::Integer => (
                &self.integer,
                &self.integer_success,
                &self.integer_ns,
                &self.integer_success_ns,
            ),
            CallbackWhere::General => (
                &self.general,
                &self.general_success,
                &self.general_ns,
                &self.general_success_ns,
            ),
        };
        calls.fetch_add(1, Ordering::Relaxed);
        time.fetch_add(ns, Ordering::Relaxed);
        if success {
            successes.fetch_add(1, Ordering::Relaxed);
            success_time.fetch_add(ns, Ordering::Relaxed);
        }
    }

    pub fn report(&self) -> CallbackReport {
        let seconds = |ns: &AtomicU64| ns.load(Ordering::Relaxed) as f64 / 1e9;
        CallbackReport {
            callback_counter_integer: self.integer.load(Ordering::Relaxed),
            callback_counter_integer_success: self.integer_success.load(Ordering::Relaxed),
            callback_counter_general: self.general.load(Ordering::Relaxed),
            callback_counter_general_success: self.general_success.load(Ordering::Relaxed),
            total_time_integer: seconds(&self.integer_ns),
            total_time_integer_success: seconds(&self.integer_success_ns),
            total_time_general: seconds(&self.general_ns),
            total_time_general_success: seconds(&self.general_success_ns),
        }
    }
}
