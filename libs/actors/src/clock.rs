//! Simulated ledger time

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Logical clock in seconds shared by every account of a ledger.
///
/// Time only moves when a test or driver advances it; each transaction reads
/// it once at delivery.
#[derive(Debug, Clone, Default)]
pub struct LedgerClock {
    now: Arc<AtomicU64>,
}

impl LedgerClock {
    pub fn starting_at(secs: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(secs)),
        }
    }

    pub fn now(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }

    /// Move forward by `secs`, returning the new time
    pub fn advance(&self, secs: u64) -> u64 {
        self.now.fetch_add(secs, Ordering::AcqRel).saturating_add(secs)
    }

    /// Jump to `secs`; the clock never runs backwards
    pub fn set(&self, secs: u64) {
        self.now.fetch_max(secs, Ordering::AcqRel);
    }
}
