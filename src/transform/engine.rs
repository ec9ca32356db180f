//! Rewrite Engine
//!
//! Single forward pass over a program. Move commands are re-emitted with
//! mesh-corrected Z, flow-compensated E and F, and only the parameters whose
//! rounded value changed. All other lines are copied unchanged.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use crate::config::TransformSettings;
use crate::error::TransformError;
use crate::mesh::MeshModel;
use crate::parser::{classify_line, LineKind, MoveCommand, MoveKind};
use crate::transform::state::{AxisValue, TransformState};

const E_PRECISION: usize = 5;
const F_PRECISION: usize = 0;
const XYZ_PRECISION: usize = 3;

fn round_to(value: f64, precision: usize) -> f64 {
    let scale = 10f64.powi(precision as i32);
    (value * scale).round() / scale
}

/// Register values a move leads to
#[derive(Debug, Clone, Copy)]
struct Target {
    x: AxisValue,
    y: AxisValue,
    z: AxisValue,
    adjusted_z: AxisValue,
}

/// Levels G-code against one mesh and material
#[derive(Debug, Clone, Copy)]
pub struct Transformer<'a> {
    mesh: &'a MeshModel,
    material: &'a str,
    settings: &'a TransformSettings,
}

impl<'a> Transformer<'a> {
    /// Fails with `MaterialNotFound` when the mesh has no offset for `material`
    pub fn new(
        mesh: &'a MeshModel,
        material: &'a str,
        settings: &'a TransformSettings,
    ) -> Result<Self, TransformError> {
        mesh.material_offset(material)?;
        Ok(Self {
            mesh,
            material,
            settings,
        })
    }

    /// Rewrite a whole program. Nothing is returned unless every line succeeds.
    pub fn transform(&self, input: &str) -> Result<String, TransformError> {
        let mut state = TransformState::default();
        let mut output: Vec<Cow<'_, str>> = Vec::new();
        let mut moves = 0usize;

        for (idx, line) in input.lines().enumerate() {
            let line_no = idx + 1;
            let emitted = match classify_line(line) {
                LineKind::Move(cmd) => {
                    moves += 1;
                    Cow::Owned(self.rewrite_move(&mut state, &cmd, line_no)?)
                }
                LineKind::Mode(mode) => {
                    state.apply_mode(mode);
                    Cow::Borrowed(line)
                }
                LineKind::Home(home) => {
                    state.apply_home(home);
                    Cow::Borrowed(line)
                }
                LineKind::Comment | LineKind::Other => Cow::Borrowed(line),
            };
            output.push(emitted);
        }

        log::info!(
            "levelled {} lines ({} moves) for material '{}'",
            output.len(),
            moves,
            self.material
        );
        Ok(output.join("\n"))
    }

    /// Rewrite `input` into its processed sibling file and return that path.
    ///
    /// The output file is only created once the whole program transformed.
    pub fn transform_file(&self, input: &Path) -> Result<PathBuf, TransformError> {
        let program = std::fs::read_to_string(input)?;
        let levelled = self.transform(&program)?;
        let output = processed_path(input, &self.settings.suffix);
        std::fs::write(&output, levelled)?;
        log::info!("wrote {}", output.display());
        Ok(output)
    }

    fn rewrite_move(
        &self,
        state: &mut TransformState,
        cmd: &MoveCommand<'_>,
        line_no: usize,
    ) -> Result<String, TransformError> {
        let params = cmd.parameters(line_no)?;

        // G92 declares positions, so its values are absolute and nothing moves
        let set_position = cmd.kind == MoveKind::SetPosition;
        let xyz_relative = !set_position && !state.xyz_absolute;
        let e_relative = !set_position && !state.extruder_absolute;

        let resolve = |old: AxisValue, token: Option<f64>, relative: bool| match token {
            Some(v) if relative => old.offset_by(v),
            Some(v) => AxisValue::Known(v),
            None => old,
        };

        let new_e = resolve(state.e, params.e, e_relative);
        let new_f = resolve(state.f, params.f, false);
        let new_x = resolve(state.x, params.x, xyz_relative);
        let new_y = resolve(state.y, params.y, xyz_relative);
        let new_z = resolve(state.z, params.z, xyz_relative);

        let offset = self.offset_at(new_x, new_y)?;
        let target = Target {
            x: new_x,
            y: new_y,
            z: new_z,
            adjusted_z: new_z.offset_by(offset),
        };

        let mut factor = 1.0;
        if !set_position {
            self.check_deviation(state, &target, line_no)?;
            if let Some(f) = distance_factor(state, &target) {
                factor = f;
            }
        }

        let new_emitted_f = match new_f {
            AxisValue::Known(f) => AxisValue::Known(f * factor),
            other => other,
        };
        let new_emitted_e = match (state.e, new_e, state.emitted_e) {
            (AxisValue::Known(old), AxisValue::Known(new), AxisValue::Known(emitted))
                if !set_position =>
            {
                AxisValue::Known(emitted + (new - old) * factor)
            }
            _ => new_e,
        };

        log::trace!(
            "line {}: offset {:.4} factor {:.5} -> {:?}",
            line_no,
            offset,
            factor,
            target
        );

        let mut words: Vec<String> = vec![cmd.code.to_string()];
        let emissions = [
            ('E', state.emitted_e, new_emitted_e, params.e, E_PRECISION, e_relative),
            ('F', state.emitted_f, new_emitted_f, params.f, F_PRECISION, false),
            ('X', state.x, target.x, params.x, XYZ_PRECISION, xyz_relative),
            ('Y', state.y, target.y, params.y, XYZ_PRECISION, xyz_relative),
            ('Z', state.adjusted_z, target.adjusted_z, params.z, XYZ_PRECISION, xyz_relative),
        ];
        for (letter, old, new, token, precision, relative) in emissions {
            if let Some(value) = emitted_value(old, new, token, precision, relative) {
                words.push(format!("{}{:.*}", letter, precision, value));
            }
        }
        words.extend(params.passthrough.iter().map(|w| w.to_string()));
        if let Some(comment) = cmd.comment {
            words.push(comment.to_string());
        }

        state.e = new_e;
        state.f = new_f;
        state.x = target.x;
        state.y = target.y;
        state.z = target.z;
        state.adjusted_z = target.adjusted_z;
        state.emitted_e = new_emitted_e;
        state.emitted_f = new_emitted_f;

        Ok(words.join(" "))
    }

    /// Mesh correction at a target; no correction where X or Y is not known
    fn offset_at(&self, x: AxisValue, y: AxisValue) -> Result<f64, TransformError> {
        match (x.known(), y.known()) {
            (Some(x), Some(y)) => Ok(self.mesh.offset_at(x, y, self.material)?),
            _ => Ok(0.0),
        }
    }

    /// Walk the XY path of a move and make sure the straight line the firmware
    /// will follow between the corrected end points stays on the mesh.
    fn check_deviation(
        &self,
        state: &TransformState,
        target: &Target,
        line_no: usize,
    ) -> Result<(), TransformError> {
        let (Some(ox), Some(oy), Some(nx), Some(ny)) =
            (state.x.known(), state.y.known(), target.x.known(), target.y.known())
        else {
            return Ok(());
        };
        let (Some(oz), Some(nz), Some(oa), Some(na)) = (
            state.z.known(),
            target.z.known(),
            state.adjusted_z.known(),
            target.adjusted_z.known(),
        ) else {
            return Ok(());
        };

        let (dx, dy) = (nx - ox, ny - oy);
        let distance = dx.hypot(dy);
        let resolution = self.settings.resolution;
        let limit = self.settings.max_deviance;

        let mut travelled = 0.0;
        let mut step = 0u64;
        while travelled < distance {
            let t = travelled / distance;
            let (px, py) = (ox + dx * t, oy + dy * t);
            let surface = oz + (nz - oz) * t + self.mesh.offset_at(px, py, self.material)?;
            let straight = oa + (na - oa) * t;
            let deviation = (straight - surface).abs();
            if deviation > limit {
                return Err(TransformError::PathDeviation {
                    line: line_no,
                    x: px,
                    y: py,
                    deviation,
                    limit,
                });
            }
            step += 1;
            travelled = step as f64 * resolution;
        }

        Ok(())
    }
}

/// Ratio of the corrected to the programmed travel distance, when both are defined
fn distance_factor(state: &TransformState, target: &Target) -> Option<f64> {
    let dx = target.x.known()? - state.x.known()?;
    let dy = target.y.known()? - state.y.known()?;
    let dz = target.z.known()? - state.z.known()?;
    let dz_adjusted = target.adjusted_z.known()? - state.adjusted_z.known()?;

    let nominal = (dx * dx + dy * dy + dz * dz).sqrt();
    if nominal == 0.0 {
        return None;
    }
    let adjusted = (dx * dx + dy * dy + dz_adjusted * dz_adjusted).sqrt();
    let factor = adjusted / nominal;
    factor.is_finite().then_some(factor)
}

/// Value to write for one parameter, or `None` to leave it out.
///
/// Absolute values are written when the rounded value changed. Relative
/// deltas need both ends known; when the previous value is not, the
/// programmed delta is passed on uncorrected.
fn emitted_value(
    old: AxisValue,
    new: AxisValue,
    token: Option<f64>,
    precision: usize,
    relative: bool,
) -> Option<f64> {
    if relative {
        return match (old.known(), new.known()) {
            (Some(o), Some(n)) => {
                (round_to(n, precision) != round_to(o, precision)).then_some(n - o)
            }
            _ => token,
        };
    }

    let n = new.known()?;
    match old.known() {
        Some(o) if round_to(o, precision) == round_to(n, precision) => None,
        _ => Some(n),
    }
}

/// `part.gcode` -> `part-processed.gcode`; inputs without an extension get `.gcode`
pub fn processed_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "gcode".to_string());
    input.with_file_name(format!("{}{}.{}", stem, suffix, extension))
}
