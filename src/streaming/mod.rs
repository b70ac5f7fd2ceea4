//! Frame pipeline: capture → relay → convert → encode → distribute.

pub mod capture;
pub mod convert;
pub mod encoder;
pub mod frame_distributor;
pub mod relay;
pub mod rendezvous;
pub mod stats;

pub use capture::{run_capture, CaptureError, CaptureOptions};
pub use convert::{ConvertError, PlanarImage};
pub use encoder::{run_encoder, EncodeStage, EncoderError, JpegEncoder};
pub use frame_distributor::{EncodedFrame, FrameDistributor, FrameStats, FrameSubscriber};
pub use relay::{relay, RawFrame};
pub use stats::{PipelineStats, StatsSnapshot};

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::camera::FrameSource;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub capture: CaptureOptions,
    pub quality: u8,
    pub max_waiters: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            capture: CaptureOptions::default(),
            quality: encoder::DEFAULT_QUALITY,
            max_waiters: frame_distributor::DEFAULT_MAX_WAITERS,
        }
    }
}

/// Handles to a running pipeline.
pub struct Pipeline {
    pub distributor: Arc<FrameDistributor>,
    pub stats: Arc<PipelineStats>,
    pub capture: JoinHandle<Result<(), CaptureError>>,
    pub encoder: JoinHandle<Result<(), EncoderError>>,
}

/// Starts the capture thread and the encode task.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_pipeline<S: FrameSource>(source: S, options: PipelineOptions) -> Pipeline {
    let stats = Arc::new(PipelineStats::default());
    let distributor = Arc::new(FrameDistributor::new(options.max_waiters));
    let (relay_tx, relay_rx) = relay();

    let capture_stats = Arc::clone(&stats);
    let capture_options = options.capture.clone();
    let capture = tokio::task::spawn_blocking(move || {
        run_capture(source, relay_tx, capture_stats, capture_options)
    });

    let encoder = tokio::spawn(run_encoder(
        relay_rx,
        Arc::clone(&distributor),
        EncodeStage::new(options.quality),
        Arc::clone(&stats),
    ));

    Pipeline {
        distributor,
        stats,
        capture,
        encoder,
    }
}
