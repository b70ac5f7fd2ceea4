//! MJPEG camera streaming for the Raspberry Pi
//!
//! A V4L2 camera is captured on a dedicated thread, converted and encoded to
//! JPEG on one task and fanned out to every connected browser as a
//! `multipart/x-mixed-replace` stream. The viewer's phone orientation can
//! steer a pan/tilt servo mount.

pub mod camera;
pub mod config;
pub mod mjpeg;
pub mod servo;
pub mod streaming;
pub mod web;

pub use camera::{FourCc, FrameSource, NegotiatedFormat, SourceError};
pub use config::{Config, ConfigError};
pub use servo::{HardwareContext, Orientation, ServoState};
pub use streaming::{spawn_pipeline, Pipeline, PipelineOptions};
pub use web::{run_server, AppState};
