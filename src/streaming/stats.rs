//! Pipeline counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters shared by the capture and encode stages.
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_captured: AtomicU64,
    frames_invalid: AtomicU64,
    frames_dropped: AtomicU64,
    frames_encoded: AtomicU64,
    capture_timeouts: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Frames read from the source with the expected length
    pub frames_captured: u64,
    /// Empty or wrongly-sized buffers discarded before the relay
    pub frames_invalid: u64,
    /// Frames dropped at the relay because the encoder was busy
    pub frames_dropped: u64,
    pub frames_encoded: u64,
    pub capture_timeouts: u64,
}

impl PipelineStats {
    pub fn record_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid(&self) {
        self.frames_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_encoded(&self) {
        self.frames_encoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.capture_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_invalid: self.frames_invalid.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_encoded: self.frames_encoded.load(Ordering::Relaxed),
            capture_timeouts: self.capture_timeouts.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Frames per second captured between `previous` and `self`.
    pub fn capture_fps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let delta = self.frames_captured.saturating_sub(previous.frames_captured);
        delta as f64 / elapsed_secs
    }

    /// Share of captured frames that never reached the encoder.
    pub fn drop_rate(&self) -> f64 {
        if self.frames_captured == 0 {
            return 0.0;
        }

        self.frames_dropped as f64 / self.frames_captured as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = PipelineStats::default();
        stats.record_captured();
        stats.record_captured();
        stats.record_dropped();
        stats.record_encoded();

        let snap = stats.snapshot();
        assert_eq!(snap.frames_captured, 2);
        assert_eq!(snap.frames_dropped, 1);
        assert_eq!(snap.frames_encoded, 1);
        assert_eq!(snap.drop_rate(), 0.5);
    }

    #[test]
    fn test_capture_fps() {
        let prev = StatsSnapshot {
            frames_captured: 100,
            ..Default::default()
        };
        let current = StatsSnapshot {
            frames_captured: 400,
            ..Default::default()
        };

        assert_eq!(current.capture_fps(&prev, 10.0), 30.0);
        assert_eq!(current.capture_fps(&prev, 0.0), 0.0);
    }
}
