//! Mesh Acquisition
//!
//! Drives the motion controller and the touch probe over a rectangular grid
//! and records the height at which the probe first reports contact.

use std::time::Duration;

use crate::config::{GridSettings, ProbeSettings};
use crate::device::{MotionDevice, TouchProbe};
use crate::error::AcquisitionError;
use crate::mesh::{Mesh, Point};

fn round_mm(z: f64) -> f64 {
    (z * 1000.0).round() / 1000.0
}

/// Grid coordinates in serpentine order: columns along X, with the Y
/// direction reversed on every other column.
pub fn serpentine_grid(grid: &GridSettings) -> Result<Vec<(f64, f64)>, AcquisitionError> {
    let n = grid.points_per_side;
    if n < 2 {
        return Err(AcquisitionError::InvalidGrid(format!(
            "need at least 2 points per side, got {}",
            n
        )));
    }
    if ![grid.min_x, grid.min_y, grid.max_x, grid.max_y]
        .iter()
        .all(|v| v.is_finite())
    {
        return Err(AcquisitionError::InvalidGrid(
            "grid corners must be finite".into(),
        ));
    }

    let along = |min: f64, max: f64, i: usize| min + (max - min) * (i as f64 / (n - 1) as f64);

    let mut points = Vec::with_capacity(n * n);
    for xi in 0..n {
        let x = along(grid.min_x, grid.max_x, xi);
        for yi in 0..n {
            let yi = if xi % 2 == 1 { n - 1 - yi } else { yi };
            points.push((x, along(grid.min_y, grid.max_y, yi)));
        }
    }
    Ok(points)
}

/// Samples the bed with a motion device and a touch probe
pub struct ProbeController<M, P> {
    motion: M,
    probe: P,
    settings: ProbeSettings,
    grid: GridSettings,
}

impl<M: MotionDevice, P: TouchProbe> ProbeController<M, P> {
    pub fn new(motion: M, probe: P, settings: &ProbeSettings, grid: &GridSettings) -> Self {
        Self {
            motion,
            probe,
            settings: settings.clone(),
            grid: grid.clone(),
        }
    }

    /// Give the devices back, e.g. to close them explicitly
    pub fn into_parts(self) -> (M, P) {
        (self.motion, self.probe)
    }

    /// Probe the whole grid. Any failure aborts the run without a mesh.
    pub fn acquire(&mut self) -> Result<Mesh, AcquisitionError> {
        if self.grid.repeats_per_point == 0 {
            return Err(AcquisitionError::InvalidGrid(
                "repeats_per_point must be at least 1".into(),
            ));
        }
        let plan = serpentine_grid(&self.grid)?;
        let repeats = self.grid.repeats_per_point;
        let total = plan.len() * repeats;
        let mut done = 0usize;

        let mut points = Vec::with_capacity(plan.len());
        for (x, y) in plan {
            let mut sum = 0.0;
            for _ in 0..repeats {
                log::info!("probing X{:.3} Y{:.3}", x, y);
                sum += self.probe_point(x, y)?;
                done += 1;
                log::info!("{:.1}%", done as f64 / total as f64 * 100.0);
            }
            points.push(Point::new(x, y, sum / repeats as f64));
        }

        self.probe.retract()?;
        Ok(Mesh::from_samples(points))
    }

    /// Height of the bed under `(x, y)`, in probe coordinates
    pub fn probe_point(&mut self, x: f64, y: f64) -> Result<f64, AcquisitionError> {
        if !(self.settings.z_step > 0.0 && self.settings.z_step.is_finite()) {
            return Err(AcquisitionError::InvalidGrid(format!(
                "z_step must be a positive distance, got {}",
                self.settings.z_step
            )));
        }
        let bounds = self.probe.z_bounds();
        let start_z = bounds.check(self.settings.start_z)?;
        let floor = self.settings.floor_z.max(bounds.min);

        self.probe.retract()?;
        let wait = self.motion.move_z(start_z, self.settings.speed_z_fast)?;
        pause(wait);
        let wait = self.motion.move_xy(x, y, self.settings.speed_xy)?;
        pause(wait);
        self.probe.extend()?;

        // Step down from the start height; never below the floor
        let steps = ((start_z - floor) / self.settings.z_step + 1e-9).floor() as u64;
        for step in 1..=steps {
            let z = bounds.check(round_mm(start_z - step as f64 * self.settings.z_step))?;
            let wait = self.motion.move_z(z, self.settings.speed_z_slow)?;
            pause(wait);
            if self.probe.has_touched()? {
                log::debug!("contact at X{:.3} Y{:.3} Z{:.3}", x, y, z);
                return Ok(z);
            }
        }

        self.probe.retract()?;
        Err(AcquisitionError::NoContact { x, y, floor })
    }
}

fn pause(wait: Duration) {
    if !wait.is_zero() {
        std::thread::sleep(wait);
    }
}
