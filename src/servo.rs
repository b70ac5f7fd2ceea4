//! Pan/tilt servos steered by the viewer's device orientation.
//!
//! The browser reports `deviceorientation` angles; they are mapped onto two
//! hobby servos on the hardware PWM channels (GPIO18 pans, GPIO19 tilts).

use parking_lot::Mutex;
use rppal::pwm::{Channel, Polarity, Pwm};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const SERVO_FREQUENCY_HZ: f64 = 50.0;
pub const MIN_ANGLE: f64 = 0.0;
pub const MAX_ANGLE: f64 = 180.0;
pub const CENTER_ANGLE: f64 = 90.0;

#[derive(Error, Debug)]
pub enum ServoError {
    #[error("PWM error: {0}")]
    Pwm(#[from] rppal::pwm::Error),
}

/// Angles reported by the browser's `deviceorientation` event, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Orientation {
    pub alpha: f64,
    #[serde(default)]
    pub beta: f64,
    pub gamma: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisState {
    pub target_angle: f64,
    /// The requested angle was outside the servo's travel
    pub clamped: bool,
}

impl AxisState {
    fn new(angle: f64) -> Self {
        let (target_angle, clamped) = clamp_angle(angle);
        Self {
            target_angle,
            clamped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ServoState {
    pub x: AxisState,
    pub y: AxisState,
}

impl ServoState {
    /// Maps a phone held in landscape onto pan (x) and tilt (y) angles.
    ///
    /// `gamma` flips sign as the phone tilts past vertical, so the pan
    /// reference for `alpha` moves by half a turn with it.
    pub fn from_orientation(o: &Orientation) -> Self {
        let (x, y) = if o.gamma > 0.0 {
            (270.0 - o.alpha, o.gamma)
        } else if o.alpha < 180.0 {
            (90.0 - o.alpha, 180.0 + o.gamma)
        } else {
            (450.0 - o.alpha, 180.0 + o.gamma)
        };

        Self {
            x: AxisState::new(x),
            y: AxisState::new(y),
        }
    }

    pub fn clamped(&self) -> bool {
        self.x.clamped || self.y.clamped
    }
}

/// Clamps `angle` into the servo's travel; the flag is set if it moved.
pub fn clamp_angle(angle: f64) -> (f64, bool) {
    if angle < MIN_ANGLE {
        (MIN_ANGLE, true)
    } else if angle > MAX_ANGLE {
        (MAX_ANGLE, true)
    } else {
        (angle, false)
    }
}

/// Duty cycle for `angle`: a 1 ms to 2 ms pulse in a 20 ms period.
pub fn duty_cycle(angle: f64) -> f64 {
    0.05 + angle / MAX_ANGLE * 0.05
}

pub trait ServoDriver: Send + Sync {
    fn set_angles(&self, x: f64, y: f64) -> Result<(), ServoError>;
}

/// Both servos on the BCM hardware PWM block.
pub struct PwmServos {
    pan: Mutex<Pwm>,
    tilt: Mutex<Pwm>,
}

impl PwmServos {
    /// Opens PWM0 and PWM1 and centres both servos.
    pub fn open() -> Result<Self, ServoError> {
        let centre = duty_cycle(CENTER_ANGLE);
        let pan = Pwm::with_frequency(
            Channel::Pwm0,
            SERVO_FREQUENCY_HZ,
            centre,
            Polarity::Normal,
            true,
        )?;
        let tilt = Pwm::with_frequency(
            Channel::Pwm1,
            SERVO_FREQUENCY_HZ,
            centre,
            Polarity::Normal,
            true,
        )?;

        Ok(Self {
            pan: Mutex::new(pan),
            tilt: Mutex::new(tilt),
        })
    }
}

impl ServoDriver for PwmServos {
    fn set_angles(&self, x: f64, y: f64) -> Result<(), ServoError> {
        self.pan.lock().set_duty_cycle(duty_cycle(x))?;
        self.tilt.lock().set_duty_cycle(duty_cycle(y))?;
        Ok(())
    }
}

/// Hardware the process found at startup.
pub struct HardwareContext {
    servos: Option<Box<dyn ServoDriver>>,
}

impl HardwareContext {
    /// Probes the PWM channels. Missing hardware disables the servos.
    pub fn detect() -> Self {
        match PwmServos::open() {
            Ok(servos) => {
                info!("PWM servos ready, centred at {} degrees", CENTER_ANGLE);
                Self::with_servos(Box::new(servos))
            }
            Err(e) => {
                warn!(error = %e, "PWM unavailable, servo control disabled");
                Self::without_servos()
            }
        }
    }

    pub fn without_servos() -> Self {
        Self { servos: None }
    }

    pub fn with_servos(servos: Box<dyn ServoDriver>) -> Self {
        Self {
            servos: Some(servos),
        }
    }

    pub fn has_servos(&self) -> bool {
        self.servos.is_some()
    }

    /// Maps `orientation` and moves the servos, if any.
    pub fn apply(&self, orientation: &Orientation) -> Result<ServoState, ServoError> {
        let state = ServoState::from_orientation(orientation);
        debug!(
            x = state.x.target_angle,
            y = state.y.target_angle,
            clamped = state.clamped(),
            "Orientation mapped"
        );

        if let Some(servos) = &self.servos {
            servos.set_angles(state.x.target_angle, state.y.target_angle)?;
        }
        Ok(state)
    }
}
