//! Convert + encode stage.
//!
//! Receives raw frames from the relay, deinterleaves them, acknowledges the
//! relay as soon as the raw bytes have been read, encodes to JPEG and hands
//! the result to the distributor.

use std::sync::Arc;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder as BaselineEncoder;
use image::ExtendedColorType;
use thiserror::Error;
use tracing::{debug, info};

use super::convert::{convert, ConvertError, PlanarImage};
use super::frame_distributor::{EncodedFrame, FrameDistributor};
use super::relay::{Lease, RelayReceiver};
use super::stats::PipelineStats;

pub const DEFAULT_QUALITY: u8 = 75;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("pixel conversion failed: {0}")]
    Convert(#[from] ConvertError),

    #[error("JPEG encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),

    #[error("encoder worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Baseline JPEG encoder for planar 4:2:2 images.
pub struct JpegEncoder {
    quality: u8,
    rgb: Vec<u8>,
}

impl JpegEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            rgb: Vec::new(),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encodes `img`. The returned buffer is complete or not produced at all.
    pub fn encode(&mut self, img: &PlanarImage) -> Result<Bytes, EncoderError> {
        planar_to_rgb(img, &mut self.rgb);

        let mut out = Vec::with_capacity(img.y.len() / 4);
        BaselineEncoder::new_with_quality(&mut out, self.quality).encode(
            &self.rgb,
            img.width,
            img.height,
            ExtendedColorType::Rgb8,
        )?;

        Ok(Bytes::from(out))
    }
}

/// BT.601 full-range (JFIF) YCbCr to packed RGB, each chroma pair shared by
/// the two horizontally adjacent pixels it was sampled from.
pub fn planar_to_rgb(img: &PlanarImage, rgb: &mut Vec<u8>) {
    rgb.clear();
    rgb.reserve(img.y.len() * 3);

    for (i, &y) in img.y.iter().enumerate() {
        let c = i / 2;
        let y = i32::from(y);
        let cb = i32::from(img.cb[c]) - 128;
        let cr = i32::from(img.cr[c]) - 128;

        // 16.16 fixed point
        let r = y + ((91_881 * cr + 32_768) >> 16);
        let g = y - ((22_554 * cb + 46_802 * cr + 32_768) >> 16);
        let b = y + ((116_130 * cb + 32_768) >> 16);

        rgb.push(r.clamp(0, 255) as u8);
        rgb.push(g.clamp(0, 255) as u8);
        rgb.push(b.clamp(0, 255) as u8);
    }
}

/// Conversion scratch space and encoder, moved onto the blocking pool for
/// each frame.
pub struct EncodeStage {
    planar: PlanarImage,
    jpeg: JpegEncoder,
}

impl EncodeStage {
    pub fn new(quality: u8) -> Self {
        Self {
            planar: PlanarImage::default(),
            jpeg: JpegEncoder::new(quality),
        }
    }

    /// Reads the leased frame, releases it, then encodes.
    pub fn process(&mut self, lease: Lease) -> Result<Bytes, EncoderError> {
        let converted = convert(lease.frame(), &mut self.planar);
        lease.release();
        converted?;

        self.jpeg.encode(&self.planar)
    }
}

/// Runs the encode loop until the relay closes or a frame cannot be
/// converted or encoded. Either failure is fatal.
pub async fn run_encoder(
    relay: RelayReceiver,
    distributor: Arc<FrameDistributor>,
    mut stage: EncodeStage,
    stats: Arc<PipelineStats>,
) -> Result<(), EncoderError> {
    info!(quality = stage.jpeg.quality(), "Encoder started");

    let mut seq = 0u64;
    while let Some(lease) = relay.recv().await {
        let (returned, encoded) = tokio::task::spawn_blocking(move || {
            let encoded = stage.process(lease);
            (stage, encoded)
        })
        .await?;
        stage = returned;
        let jpeg = encoded?;

        stats.record_encoded();
        seq += 1;
        debug!(seq, bytes = jpeg.len(), "Frame encoded");

        distributor.distribute(EncodedFrame::new(seq, jpeg)).await;
    }

    info!("Relay closed, encoder stopping");
    Ok(())
}
