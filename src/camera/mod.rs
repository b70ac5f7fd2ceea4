//! Raw frame sources: the V4L2 camera and a synthetic test pattern.

mod device;
mod test_pattern;

pub use device::{negotiate, V4lCamera};
pub use test_pattern::TestPattern;

use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Four-character pixel format code as used by V4L2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    /// Packed 4:2:2, `Y0 Cb Y1 Cr`.
    pub const YUYV: FourCc = FourCc(*b"YUYV");
    /// Motion-JPEG as produced by some USB webcams.
    pub const MJPG: FourCc = FourCc(*b"MJPG");

    pub fn parse(s: &str) -> Option<Self> {
        let bytes: [u8; 4] = s.as_bytes().try_into().ok()?;
        Some(FourCc(bytes))
    }

    /// Whether the conversion stage understands this layout.
    pub fn is_supported(&self) -> bool {
        *self == FourCc::YUYV
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

/// Result of format negotiation with the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedFormat {
    pub width: u32,
    pub height: u32,
    pub fourcc: FourCc,
}

impl NegotiatedFormat {
    /// Byte length of one packed 4:2:2 frame.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 2
    }
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("timed out waiting for frame")]
    Timeout,

    #[error("device error: {0}")]
    Device(#[from] io::Error),

    #[error("source closed")]
    Closed,
}

/// A device that hands out raw frames one at a time.
///
/// `read_frame` blocks for at most `timeout`. On success `buf` holds exactly
/// the bytes the device produced for that frame (possibly zero).
pub trait FrameSource: Send + 'static {
    fn format(&self) -> NegotiatedFormat;

    fn read_frame(&mut self, timeout: Duration, buf: &mut Vec<u8>) -> Result<(), SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_parse_and_display() {
        assert_eq!(FourCc::parse("YUYV"), Some(FourCc::YUYV));
        assert_eq!(FourCc::parse("YUV"), None);
        assert_eq!(FourCc::YUYV.to_string(), "YUYV");
        assert!(FourCc::YUYV.is_supported());
        assert!(!FourCc::MJPG.is_supported());
    }

    #[test]
    fn test_frame_len() {
        let fmt = NegotiatedFormat {
            width: 640,
            height: 480,
            fourcc: FourCc::YUYV,
        };
        assert_eq!(fmt.frame_len(), 640 * 480 * 2);
    }
}
