//! Bed Mesh
//!
//! Probed height samples, material offsets and the surface interpolation
//! that turns them into a Z correction at any X/Y.

pub mod interpolate;
pub mod model;

pub use interpolate::SurfaceInterpolator;
pub use model::{MergeStrategy, Mesh, MeshModel, Point};
