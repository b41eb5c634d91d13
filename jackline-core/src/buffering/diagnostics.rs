//! Lock-free counters shared by the producer, the transfer loop and resize.
//!
//! All updates are `Relaxed` increments: the counters are for observability
//! and never gate control flow.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct RingDiagnostics {
    pub blocks_written: AtomicU64,
    pub blocks_delivered: AtomicU64,
    /// Blocks overwritten before the consumer got to them.
    pub blocks_dropped: AtomicU64,
    /// Cycles the producer skipped because its slot or the store was busy.
    /// A skipped slot's index is later counted in `blocks_dropped` too.
    pub writes_rejected: AtomicU64,
    pub frames_truncated: AtomicU64,
    pub sink_errors: AtomicU64,
    /// Successful resizes only.
    pub resizes: AtomicU64,
    pub idle_polls: AtomicU64,
}

impl RingDiagnostics {
    #[inline]
    pub(crate) fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            blocks_written: self.blocks_written.load(Ordering::Relaxed),
            blocks_delivered: self.blocks_delivered.load(Ordering::Relaxed),
            blocks_dropped: self.blocks_dropped.load(Ordering::Relaxed),
            writes_rejected: self.writes_rejected.load(Ordering::Relaxed),
            frames_truncated: self.frames_truncated.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
            resizes: self.resizes.load(Ordering::Relaxed),
            idle_polls: self.idle_polls.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub blocks_written: u64,
    pub blocks_delivered: u64,
    pub blocks_dropped: u64,
    pub writes_rejected: u64,
    pub frames_truncated: u64,
    pub sink_errors: u64,
    pub resizes: u64,
    pub idle_polls: u64,
}
