//! Transformer registers
//!
//! Tracks positioning modes and the last known value of every axis while a
//! program is rewritten, one line at a time.

use crate::parser::{HomeCommand, HomeTarget, ModeCommand};

/// Value of one axis register
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AxisValue {
    Known(f64),
    /// Undefined since the last reset or home-to-minimum
    Unknown,
    /// Parked at the positive end stop after a home-to-maximum
    AtPositiveLimit,
}

impl AxisValue {
    pub fn known(self) -> Option<f64> {
        match self {
            AxisValue::Known(v) => Some(v),
            _ => None,
        }
    }

    /// Shift a known value; sentinels stay as they are
    pub fn offset_by(self, delta: f64) -> Self {
        match self {
            AxisValue::Known(v) => AxisValue::Known(v + delta),
            other => other,
        }
    }
}

/// Register file for one rewrite run
#[derive(Debug, Clone, PartialEq)]
pub struct TransformState {
    pub xyz_absolute: bool,
    pub extruder_absolute: bool,
    pub x: AxisValue,
    pub y: AxisValue,
    /// Program Z, before mesh correction
    pub z: AxisValue,
    /// Program extruder position
    pub e: AxisValue,
    /// Program feed rate
    pub f: AxisValue,
    /// Last Z written out, after mesh correction
    pub adjusted_z: AxisValue,
    /// Last extruder position written out, after flow compensation
    pub emitted_e: AxisValue,
    /// Last feed rate written out, after speed compensation
    pub emitted_f: AxisValue,
}

impl Default for TransformState {
    fn default() -> Self {
        Self {
            xyz_absolute: false,
            extruder_absolute: false,
            x: AxisValue::Unknown,
            y: AxisValue::Unknown,
            z: AxisValue::Unknown,
            e: AxisValue::Known(0.0),
            f: AxisValue::Known(0.0),
            adjusted_z: AxisValue::Unknown,
            emitted_e: AxisValue::Known(0.0),
            emitted_f: AxisValue::Known(0.0),
        }
    }
}

impl TransformState {
    pub fn apply_mode(&mut self, mode: ModeCommand) {
        match mode {
            ModeCommand::Absolute => {
                self.xyz_absolute = true;
                self.extruder_absolute = true;
            }
            ModeCommand::Relative => {
                self.xyz_absolute = false;
                self.extruder_absolute = false;
            }
            ModeCommand::AbsoluteExtruder => self.extruder_absolute = true,
            ModeCommand::RelativeExtruder => self.extruder_absolute = false,
        }
    }

    /// Homing to minimum makes X/Y unknown and zeroes Z; homing to maximum
    /// parks the named axes at the positive limit.
    pub fn apply_home(&mut self, home: HomeCommand) {
        let (xy, z, adjusted_z) = match home.target {
            HomeTarget::Minimum => (AxisValue::Unknown, AxisValue::Known(0.0), AxisValue::Unknown),
            HomeTarget::Maximum => (
                AxisValue::AtPositiveLimit,
                AxisValue::AtPositiveLimit,
                AxisValue::AtPositiveLimit,
            ),
        };

        if home.axes.x {
            self.x = xy;
        }
        if home.axes.y {
            self.y = xy;
        }
        if home.axes.z {
            self.z = z;
            self.adjusted_z = adjusted_z;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::AxisSet;

    #[test]
    fn test_initial_state() {
        let state = TransformState::default();
        assert!(!state.xyz_absolute);
        assert!(!state.extruder_absolute);
        assert_eq!(state.x, AxisValue::Unknown);
        assert_eq!(state.e, AxisValue::Known(0.0));
    }

    #[test]
    fn test_mode_switches() {
        let mut state = TransformState::default();
        state.apply_mode(ModeCommand::Absolute);
        assert!(state.xyz_absolute && state.extruder_absolute);

        state.apply_mode(ModeCommand::RelativeExtruder);
        assert!(state.xyz_absolute);
        assert!(!state.extruder_absolute);

        state.apply_mode(ModeCommand::Relative);
        state.apply_mode(ModeCommand::AbsoluteExtruder);
        assert!(!state.xyz_absolute);
        assert!(state.extruder_absolute);
    }

    #[test]
    fn test_home_minimum_named_axes() {
        let mut state = TransformState {
            x: AxisValue::Known(5.0),
            y: AxisValue::Known(6.0),
            z: AxisValue::Known(7.0),
            adjusted_z: AxisValue::Known(7.1),
            ..TransformState::default()
        };
        state.apply_home(HomeCommand {
            target: HomeTarget::Minimum,
            axes: AxisSet {
                x: false,
                y: false,
                z: true,
            },
        });
        assert_eq!(state.x, AxisValue::Known(5.0));
        assert_eq!(state.z, AxisValue::Known(0.0));
        assert_eq!(state.adjusted_z, AxisValue::Unknown);
    }

    #[test]
    fn test_home_maximum() {
        let mut state = TransformState::default();
        state.apply_home(HomeCommand {
            target: HomeTarget::Maximum,
            axes: AxisSet::ALL,
        });
        assert_eq!(state.x, AxisValue::AtPositiveLimit);
        assert_eq!(state.z, AxisValue::AtPositiveLimit);
    }

    #[test]
    fn test_sentinels_absorb_offsets() {
        assert_eq!(AxisValue::Known(1.0).offset_by(0.5), AxisValue::Known(1.5));
        assert_eq!(AxisValue::Unknown.offset_by(3.0), AxisValue::Unknown);
        assert_eq!(AxisValue::AtPositiveLimit.offset_by(-3.0), AxisValue::AtPositiveLimit);
        assert_eq!(AxisValue::AtPositiveLimit.known(), None);
    }
}
