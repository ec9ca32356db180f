//! Mesh Leveller
//!
//! Bed levelling for a networked 3D printer.
//!
//! This library provides:
//! - Bed probing over the motion controller and touch probe sockets
//! - Mesh persistence, material offsets and surface interpolation
//! - G-code rewriting that makes moves follow the measured bed
//! - Configuration management

pub mod acquisition;
pub mod app;
pub mod config;
pub mod device;
pub mod error;
pub mod mesh;
pub mod parser;
pub mod transform;

// Re-exports for a compact public API
pub use acquisition::ProbeController;
pub use config::{Config, Settings};
pub use error::{AcquisitionError, DeviceError, MeshError, TransformError};
pub use mesh::{Mesh, MeshModel, Point};
pub use transform::Transformer;
