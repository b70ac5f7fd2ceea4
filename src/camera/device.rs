use std::io;
use std::time::Duration;

use thiserror::Error;
use tracing::info;
use v4l::{
    buffer::Type,
    framesize::FrameSizeEnum,
    io::{mmap::Stream as MmapStream, traits::CaptureStream},
    video::Capture,
    Device, Format, FourCC,
};

use super::{FourCc, FrameSource, NegotiatedFormat, SourceError};
use crate::config::parse_size;

const MMAP_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum NegotiationError {
    #[error("device error: {0}")]
    Device(#[from] io::Error),

    #[error("format {0} is not supported by the pipeline")]
    UnsupportedFormat(String),

    #[error("device does not offer format {0}")]
    FormatNotFound(String),

    #[error("no supported format offered by the device")]
    NoSupportedFormat,

    #[error("no matching frame size {0}")]
    SizeNotFound(String),

    #[error("device reports no frame sizes")]
    NoFrameSizes,
}

/// A format as listed by the device.
#[derive(Debug, Clone)]
pub struct FormatEntry {
    pub fourcc: FourCc,
    pub description: String,
}

/// Picks the capture format.
///
/// `requested` may be a fourcc (`YUYV`) or the driver's description
/// (`YUYV 4:2:2`). Without a request the first supported entry wins.
pub fn select_format(
    available: &[FormatEntry],
    requested: Option<&str>,
) -> Result<FourCc, NegotiationError> {
    match requested {
        None => available
            .iter()
            .find(|f| f.fourcc.is_supported())
            .map(|f| f.fourcc)
            .ok_or(NegotiationError::NoSupportedFormat),
        Some(name) => {
            let entry = available
                .iter()
                .find(|f| f.fourcc.to_string() == name || f.description == name)
                .ok_or_else(|| NegotiationError::FormatNotFound(name.to_string()))?;
            if !entry.fourcc.is_supported() {
                return Err(NegotiationError::UnsupportedFormat(entry.description.clone()));
            }
            Ok(entry.fourcc)
        }
    }
}

/// Picks the frame size: the requested `WxH` or the largest by area.
pub fn select_size(
    sizes: &[(u32, u32)],
    requested: Option<&str>,
) -> Result<(u32, u32), NegotiationError> {
    let mut sorted = sizes.to_vec();
    sorted.sort_by_key(|(w, h)| u64::from(*w) * u64::from(*h));

    match requested {
        None => sorted.last().copied().ok_or(NegotiationError::NoFrameSizes),
        Some(s) => {
            let wanted = parse_size(s);
            sorted
                .iter()
                .copied()
                .find(|size| Some(*size) == wanted)
                .ok_or_else(|| NegotiationError::SizeNotFound(s.to_string()))
        }
    }
}

/// Enumerates formats and sizes on `device`, applies the selection and
/// returns what the driver actually configured.
pub fn negotiate(
    device: &Device,
    format: Option<&str>,
    size: Option<&str>,
) -> Result<NegotiatedFormat, NegotiationError> {
    let formats: Vec<FormatEntry> = device
        .enum_formats()?
        .into_iter()
        .map(|d| FormatEntry {
            fourcc: FourCc(d.fourcc.repr),
            description: d.description,
        })
        .collect();

    info!("Available formats:");
    for f in &formats {
        info!("  {} ({})", f.fourcc, f.description);
    }

    let fourcc = select_format(&formats, format)?;

    let sizes: Vec<(u32, u32)> = device
        .enum_framesizes(FourCC::new(&fourcc.0))?
        .into_iter()
        .map(|fs| match fs.size {
            FrameSizeEnum::Discrete(d) => (d.width, d.height),
            FrameSizeEnum::Stepwise(s) => (s.max_width, s.max_height),
        })
        .collect();

    info!("Supported frame sizes for {}:", fourcc);
    for (w, h) in &sizes {
        info!("  {}x{}", w, h);
    }

    let (width, height) = select_size(&sizes, size)?;
    info!("Requesting {} {}x{}", fourcc, width, height);

    let applied = device.set_format(&Format::new(width, height, FourCC::new(&fourcc.0)))?;
    let negotiated = NegotiatedFormat {
        width: applied.width,
        height: applied.height,
        fourcc: FourCc(applied.fourcc.repr),
    };
    info!(
        "Resulting image format: {} {}x{}",
        negotiated.fourcc, negotiated.width, negotiated.height
    );

    Ok(negotiated)
}

/// V4L2 capture device streaming through mmap buffers.
pub struct V4lCamera {
    stream: MmapStream<'static>,
    format: NegotiatedFormat,
}

impl V4lCamera {
    pub fn open(path: &str, format: Option<&str>, size: Option<&str>) -> anyhow::Result<Self> {
        let device = Device::with_path(path)?;
        info!("Selected {}", path);

        let format = negotiate(&device, format, size)?;

        // Leak device to static for MmapStream; there is one camera per process
        let static_dev: &'static mut Device = Box::leak(Box::new(device));
        let stream = MmapStream::with_buffers(static_dev, Type::VideoCapture, MMAP_BUFFERS)?;

        Ok(Self { stream, format })
    }
}

impl FrameSource for V4lCamera {
    fn format(&self) -> NegotiatedFormat {
        self.format
    }

    fn read_frame(&mut self, timeout: Duration, buf: &mut Vec<u8>) -> Result<(), SourceError> {
        self.stream.set_timeout(timeout);
        match self.stream.next() {
            Ok((data, meta)) => {
                let used = (meta.bytesused as usize).min(data.len());
                buf.clear();
                buf.extend_from_slice(&data[..used]);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Err(SourceError::Timeout),
            Err(e) => Err(SourceError::Device(e)),
        }
    }
}
