//! Device Clients
//!
//! Blocking request/response clients for the motion controller and the touch
//! probe. Acquisition talks to both through the `MotionDevice` and
//! `TouchProbe` traits.

pub mod motion;
pub mod probe;

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::error::DeviceError;

pub use motion::MotionClient;
pub use probe::ProbeClient;

/// A byte stream with a per-read deadline
pub trait Connection: Read + Write {
    fn set_read_deadline(&mut self, timeout: Duration) -> io::Result<()>;
}

impl Connection for TcpStream {
    fn set_read_deadline(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_read_timeout(Some(timeout))
    }
}

/// Something that moves the print head.
///
/// Each move returns how long the caller must wait before the head can be
/// assumed to be in place.
pub trait MotionDevice {
    fn move_xy(&mut self, x: f64, y: f64, speed: f64) -> Result<Duration, DeviceError>;
    fn move_z(&mut self, z: f64, speed: f64) -> Result<Duration, DeviceError>;
}

/// A touch probe that can be deployed and asked whether it hit the bed
pub trait TouchProbe {
    fn retract(&mut self) -> Result<(), DeviceError>;
    fn extend(&mut self) -> Result<(), DeviceError>;
    fn has_touched(&mut self) -> Result<bool, DeviceError>;
    /// Z range the probe may be driven within
    fn z_bounds(&self) -> ZBounds;
}

/// Inclusive Z limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZBounds {
    pub min: f64,
    pub max: f64,
}

impl ZBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Pass `z` through if it lies within the bounds
    pub fn check(&self, z: f64) -> Result<f64, DeviceError> {
        if z >= self.min && z <= self.max {
            Ok(z)
        } else {
            Err(DeviceError::ZOutOfBounds {
                z,
                min: self.min,
                max: self.max,
            })
        }
    }
}

/// Travel time for `distance` mm at `speed` mm/s, stretched by `multiplier`
pub(crate) fn travel_time(distance: f64, speed: f64, multiplier: f64) -> Duration {
    Duration::try_from_secs_f64(distance / speed * multiplier).unwrap_or(Duration::ZERO)
}
