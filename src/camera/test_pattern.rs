use std::thread;
use std::time::{Duration, Instant};

use super::{FourCc, FrameSource, NegotiatedFormat, SourceError};

/// (Y, Cb, Cr) for white, yellow, cyan, green, magenta, red, blue, black.
const BARS: [(u8, u8, u8); 8] = [
    (235, 128, 128),
    (210, 16, 146),
    (170, 166, 16),
    (145, 54, 34),
    (106, 202, 222),
    (81, 90, 240),
    (41, 240, 110),
    (16, 128, 128),
];

/// Synthetic YUYV source producing colour bars with a sweeping luma line,
/// paced at a fixed frame rate. Used when no camera hardware is present.
pub struct TestPattern {
    format: NegotiatedFormat,
    interval: Duration,
    next_due: Instant,
    frame_index: u64,
}

impl TestPattern {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        let width = width & !1;
        Self {
            format: NegotiatedFormat {
                width,
                height,
                fourcc: FourCc::YUYV,
            },
            interval: Duration::from_secs(1) / fps.max(1),
            next_due: Instant::now(),
            frame_index: 0,
        }
    }

    fn render(&self, buf: &mut Vec<u8>) {
        let w = self.format.width as usize;
        let h = self.format.height as usize;
        let sweep_row = (self.frame_index as usize) % h.max(1);

        buf.clear();
        buf.reserve(w * h * 2);
        for row in 0..h {
            for pair in 0..w / 2 {
                let (y, cb, cr) = if row == sweep_row {
                    (235, 128, 128)
                } else {
                    BARS[(pair * 2 * BARS.len()) / w.max(1)]
                };
                buf.extend_from_slice(&[y, cb, y, cr]);
            }
        }
    }
}

impl FrameSource for TestPattern {
    fn format(&self) -> NegotiatedFormat {
        self.format
    }

    fn read_frame(&mut self, timeout: Duration, buf: &mut Vec<u8>) -> Result<(), SourceError> {
        let now = Instant::now();
        if self.next_due > now {
            let wait = self.next_due - now;
            if wait > timeout {
                thread::sleep(timeout);
                return Err(SourceError::Timeout);
            }
            thread::sleep(wait);
        }
        self.next_due = Instant::now() + self.interval;

        self.render(buf);
        self.frame_index += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_have_packed_length() {
        let mut source = TestPattern::new(64, 16, 1000);
        let mut buf = Vec::new();
        source.read_frame(Duration::from_secs(1), &mut buf).unwrap();
        assert_eq!(buf.len(), source.format().frame_len());
    }

    #[test]
    fn test_odd_width_is_rounded_down() {
        let source = TestPattern::new(65, 16, 30);
        assert_eq!(source.format().width, 64);
    }

    #[test]
    fn test_short_timeout_reports_timeout() {
        let mut source = TestPattern::new(16, 16, 1);
        let mut buf = Vec::new();
        source.read_frame(Duration::from_secs(1), &mut buf).unwrap();
        let result = source.read_frame(Duration::from_millis(5), &mut buf);
        assert!(matches!(result, Err(SourceError::Timeout)));
    }
}
