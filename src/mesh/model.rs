//! Mesh record and runtime model
//!
//! `Mesh` is the persisted record; `MeshModel` adds the cached surface
//! interpolator used to answer offset queries.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::OnceLock;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::MeshError;
use crate::mesh::interpolate::SurfaceInterpolator;

/// A probed sample of the bed surface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// How a refreshed grid was reconciled with the mesh it replaces
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergeStrategy {
    /// Both grids sampled this (x, y)
    SharedPoint { x: f64, y: f64 },
    /// No shared sample, mean heights were aligned instead
    Average,
}

/// Persisted height map plus per-material offsets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mesh {
    pub points: Vec<Point>,
    /// Kept in file order
    pub material_offsets: IndexMap<String, f64>,
    /// Probe height that corresponds to the nozzle touching the bed
    pub reference_height: f64,
}

impl Mesh {
    pub fn new(points: Vec<Point>, reference_height: f64) -> Self {
        Self {
            points,
            material_offsets: IndexMap::new(),
            reference_height,
        }
    }

    /// Build a mesh whose reference height is the mean of its samples
    pub fn from_samples(points: Vec<Point>) -> Self {
        let reference_height = average_z(&points).unwrap_or(0.0);
        Self::new(points, reference_height)
    }

    /// Read a mesh from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MeshError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Deserialize and validate a mesh record
    pub fn from_reader(reader: impl Read) -> Result<Self, MeshError> {
        let mesh: Mesh = serde_json::from_reader(reader)?;
        mesh.validate()?;
        Ok(mesh)
    }

    /// Write the mesh to a file, replacing any existing content
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), MeshError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.to_writer(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn to_writer(&self, mut writer: impl Write) -> Result<(), MeshError> {
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    fn validate(&self) -> Result<(), MeshError> {
        if !self.reference_height.is_finite() {
            return Err(MeshError::Format("referenceHeight is not finite".into()));
        }
        for (i, p) in self.points.iter().enumerate() {
            if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
                return Err(MeshError::Format(format!("point {} is not finite", i)));
            }
        }
        for (name, offset) in &self.material_offsets {
            if name.is_empty() {
                return Err(MeshError::Format("empty material name".into()));
            }
            if !offset.is_finite() {
                return Err(MeshError::Format(format!(
                    "offset for material '{}' is not finite",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Mean sampled height, `None` for an empty mesh
    pub fn average_z(&self) -> Option<f64> {
        average_z(&self.points)
    }

    /// Material names in sorted order
    pub fn materials(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.material_offsets.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Register a material with a zero offset. Existing entries are kept.
    pub fn add_material(&mut self, name: &str) -> Result<(), MeshError> {
        if name.is_empty() {
            return Err(MeshError::EmptyMaterialName);
        }
        self.material_offsets.entry(name.to_string()).or_insert(0.0);
        Ok(())
    }

    pub fn set_material_offset(&mut self, name: &str, offset: f64) -> Result<(), MeshError> {
        if name.is_empty() {
            return Err(MeshError::EmptyMaterialName);
        }
        self.material_offsets.insert(name.to_string(), offset);
        Ok(())
    }

    /// Replace this mesh's samples with a freshly probed grid.
    ///
    /// The reference height is rebased first so the old calibration still
    /// holds: by the height difference at the first sample both grids share,
    /// or by the difference of their mean heights when none is shared.
    pub fn merge(&mut self, fresh: &Mesh) -> MergeStrategy {
        let shared = fresh.points.iter().find_map(|new| {
            self.points
                .iter()
                .find(|old| old.x == new.x && old.y == new.y)
                .map(|old| (old, new))
        });

        let strategy = match shared {
            Some((old, new)) => {
                self.reference_height += old.z - new.z;
                MergeStrategy::SharedPoint { x: new.x, y: new.y }
            }
            None => {
                if let (Some(old_avg), Some(new_avg)) = (self.average_z(), fresh.average_z()) {
                    self.reference_height += old_avg - new_avg;
                }
                MergeStrategy::Average
            }
        };

        self.points = fresh.points.clone();
        strategy
    }
}

fn average_z(points: &[Point]) -> Option<f64> {
    if points.is_empty() {
        return None;
    }
    Some(points.iter().map(|p| p.z).sum::<f64>() / points.len() as f64)
}

/// A mesh with its surface interpolator, built on first use
#[derive(Debug)]
pub struct MeshModel {
    mesh: Mesh,
    interpolator: OnceLock<SurfaceInterpolator>,
}

impl MeshModel {
    pub fn new(mesh: Mesh) -> Self {
        Self {
            mesh,
            interpolator: OnceLock::new(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, MeshError> {
        Mesh::load(path).map(Self::new)
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn into_mesh(self) -> Mesh {
        self.mesh
    }

    /// Mutate the underlying mesh. The interpolator is rebuilt on the next query.
    pub fn update<R>(&mut self, f: impl FnOnce(&mut Mesh) -> R) -> R {
        self.interpolator = OnceLock::new();
        f(&mut self.mesh)
    }

    pub fn set_reference_height(&mut self, value: f64) {
        self.update(|mesh| mesh.reference_height = value);
    }

    /// Height correction at `(x, y)` for `material`.
    ///
    /// Outside the sampled region, or wherever the spline has no finite
    /// answer, the correction is zero.
    pub fn offset_at(&self, x: f64, y: f64, material: &str) -> Result<f64, MeshError> {
        let material_offset = self.material_offset(material)?;
        let offset = self.surface().evaluate(x, y) + material_offset;
        Ok(if offset.is_finite() { offset } else { 0.0 })
    }

    /// Offset configured for `material`
    pub fn material_offset(&self, material: &str) -> Result<f64, MeshError> {
        self.mesh
            .material_offsets
            .get(material)
            .copied()
            .ok_or_else(|| MeshError::MaterialNotFound {
                material: material.to_string(),
            })
    }

    fn surface(&self) -> &SurfaceInterpolator {
        self.interpolator.get_or_init(|| {
            let reference = self.mesh.reference_height;
            let samples: Vec<_> = self
                .mesh
                .points
                .iter()
                .map(|p| (p.x, p.y, p.z - reference))
                .collect();
            log::debug!("building surface interpolator from {} samples", samples.len());
            SurfaceInterpolator::new(&samples)
        })
    }
}

impl From<Mesh> for MeshModel {
    fn from(mesh: Mesh) -> Self {
        Self::new(mesh)
    }
}
