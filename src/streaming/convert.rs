//! Packed YUYV to planar 4:2:2.

use thiserror::Error;

use super::relay::RawFrame;
use crate::camera::FourCc;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConvertError {
    #[error("unsupported pixel format {0}")]
    UnsupportedFormat(FourCc),

    #[error("frame is {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("width {0} is not even")]
    OddWidth(u32),
}

/// Planar YCbCr with chroma halved horizontally (4:2:2).
///
/// `y` has `width * height` samples; `cb` and `cr` have `width / 2` samples
/// per row at full vertical resolution.
#[derive(Debug, Clone, Default)]
pub struct PlanarImage {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub cb: Vec<u8>,
    pub cr: Vec<u8>,
}

impl PlanarImage {
    fn reshape(&mut self, width: u32, height: u32) {
        let luma = width as usize * height as usize;
        self.width = width;
        self.height = height;
        self.y.resize(luma, 0);
        self.cb.resize(luma / 2, 0);
        self.cr.resize(luma / 2, 0);
    }
}

/// Deinterleaves `frame` into `out`, reusing its planes.
pub fn convert(frame: &RawFrame, out: &mut PlanarImage) -> Result<(), ConvertError> {
    let format = frame.format();
    if format.fourcc != FourCc::YUYV {
        return Err(ConvertError::UnsupportedFormat(format.fourcc));
    }
    yuyv_to_planar(frame.data(), format.width, format.height, out)
}

pub fn yuyv_to_planar(
    data: &[u8],
    width: u32,
    height: u32,
    out: &mut PlanarImage,
) -> Result<(), ConvertError> {
    if width % 2 != 0 {
        return Err(ConvertError::OddWidth(width));
    }
    let expected = width as usize * height as usize * 2;
    if data.len() != expected {
        return Err(ConvertError::LengthMismatch {
            expected,
            actual: data.len(),
        });
    }

    out.reshape(width, height);

    let groups = data.chunks_exact(4);
    let luma = out.y.chunks_exact_mut(2);
    let chroma = out.cb.iter_mut().zip(out.cr.iter_mut());
    for ((group, y), (cb, cr)) in groups.zip(luma).zip(chroma) {
        y[0] = group[0];
        *cb = group[1];
        y[1] = group[2];
        *cr = group[3];
    }

    Ok(())
}
