//! Process-wide counters for memory activity.
//!
//! Incremented at the call site without locking; [`Metrics::flush`] logs
//! the current values in one `info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Global counters shared by every conversation in the process.
pub static METRICS: Metrics = Metrics::new();

/// Copy of the counters at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub messages_added: u64,
    pub summaries_created: u64,
    pub backups_written: u64,
    pub backup_failures: u64,
}

pub struct Metrics {
    messages_added: AtomicU64,
    summaries_created: AtomicU64,
    backups_written: AtomicU64,
    backup_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            messages_added: AtomicU64::new(0),
            summaries_created: AtomicU64::new(0),
            backups_written: AtomicU64::new(0),
            backup_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_messages_added(&self) {
        self.messages_added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_summaries_created(&self) {
        self.summaries_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_backups_written(&self) {
        self.backups_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_backup_failures(&self) {
        self.backup_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "backup_failures", "counter incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_added: self.messages_added.load(Ordering::Relaxed),
            summaries_created: self.summaries_created.load(Ordering::Relaxed),
            backups_written: self.backups_written.load(Ordering::Relaxed),
            backup_failures: self.backup_failures.load(Ordering::Relaxed),
        }
    }

    /// Log all counters as a single event.
    pub fn flush(&self) {
        let snap = self.snapshot();
        tracing::info!(
            metric = "flush",
            messages_added = snap.messages_added,
            summaries_created = snap.summaries_created,
            backups_written = snap.backups_written,
            backup_failures = snap.backup_failures,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let m = Metrics::new();
        m.inc_messages_added();
        m.inc_messages_added();
        m.inc_summaries_created();
        m.inc_backup_failures();

        assert_eq!(
            m.snapshot(),
            MetricsSnapshot {
                messages_added: 2,
                summaries_created: 1,
                backups_written: 0,
                backup_failures: 1,
            }
        );
        m.flush();
    }
}
