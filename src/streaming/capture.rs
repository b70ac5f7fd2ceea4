//! Hardware capture loop.
//!
//! Runs on a dedicated blocking thread: it waits on the device, validates the
//! buffer, and offers it to the encoder through the relay. It only touches
//! its buffer again once the encoder has handed it back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::relay::{RawFrame, Rejected, RelaySender};
use super::stats::{PipelineStats, StatsSnapshot};
use crate::camera::{FrameSource, SourceError};

const FPS_REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Periodic capture-rate report built from successive stats snapshots.
struct FpsReport {
    window_start: Instant,
    previous: StatsSnapshot,
}

impl FpsReport {
    fn new(start: Instant, snapshot: StatsSnapshot) -> Self {
        Self {
            window_start: start,
            previous: snapshot,
        }
    }

    /// Returns the rate over the last window once it is longer than the
    /// report interval, and starts a new window.
    fn poll(&mut self, now: Instant, current: StatsSnapshot) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed <= FPS_REPORT_INTERVAL {
            return None;
        }

        let fps = current.capture_fps(&self.previous, elapsed.as_secs_f64());
        self.window_start = now;
        self.previous = current;
        Some(fps)
    }
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("frame source failed: {0}")]
    Source(#[from] SourceError),

    #[error("encoder is gone")]
    EncoderGone,
}

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Upper bound for a single wait on the device
    pub frame_timeout: Duration,
    /// Log the capture frame rate every ten seconds
    pub report_fps: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            frame_timeout: Duration::from_secs(5),
            report_fps: false,
        }
    }
}

/// Runs until the source fails or the encoder disappears.
///
/// A read timeout is retried. Every other source error ends the loop, since
/// there is no way to recover a failed device handle.
pub fn run_capture<S: FrameSource>(
    mut source: S,
    relay: RelaySender,
    stats: Arc<PipelineStats>,
    options: CaptureOptions,
) -> Result<(), CaptureError> {
    let format = source.format();
    let expected_len = format.frame_len();

    info!(
        format = %format.fourcc,
        resolution = %format!("{}x{}", format.width, format.height),
        timeout_ms = options.frame_timeout.as_millis() as u64,
        "Capture loop started"
    );

    let mut buf = Vec::with_capacity(expected_len);
    let mut fps_report = FpsReport::new(Instant::now(), stats.snapshot());

    loop {
        match source.read_frame(options.frame_timeout, &mut buf) {
            Ok(()) => {}
            Err(SourceError::Timeout) => {
                stats.record_timeout();
                warn!("Timed out waiting for frame, retrying");
                continue;
            }
            Err(e) => return Err(e.into()),
        }

        if buf.len() != expected_len {
            stats.record_invalid();
            debug!(
                len = buf.len(),
                expected = expected_len,
                "Discarding frame with unexpected length"
            );
            continue;
        }
        stats.record_captured();

        if options.report_fps {
            let current = stats.snapshot();
            if let Some(fps) = fps_report.poll(Instant::now(), current) {
                info!(
                    fps = format!("{:.1}", fps),
                    dropped = format!("{:.1}%", current.drop_rate() * 100.0),
                    "Capture rate"
                );
            }
        }

        let frame = RawFrame::new(std::mem::take(&mut buf), format);
        buf = match relay.push(frame) {
            Ok(pending) => pending.wait().map_err(|_| CaptureError::EncoderGone)?,
            Err(Rejected::Busy(frame)) => {
                stats.record_dropped();
                frame.into_data()
            }
            Err(Rejected::Closed(_)) => return Err(CaptureError::EncoderGone),
        };
    }
}
