//! Error types
//!
//! One enum per component. Data and safety failures carry the line number or
//! grid coordinate needed to find the offending input.

use thiserror::Error;

/// Mesh persistence and lookup errors
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("mesh I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The mesh record is malformed or missing fields
    #[error("malformed mesh record: {0}")]
    Format(String),

    #[error("material names must not be empty")]
    EmptyMaterialName,

    #[error("material not found: {material}")]
    MaterialNotFound { material: String },
}

impl From<serde_json::Error> for MeshError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            MeshError::Io(err.into())
        } else {
            MeshError::Format(err.to_string())
        }
    }
}

/// Transport and device-protocol errors
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("device did not answer within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("device closed the connection")]
    ConnectionClosed,

    /// Every touch query attempt failed
    #[error("failed to read probe after {attempts} attempts: {}", .errors.join("; "))]
    TouchQueryFailed { attempts: u32, errors: Vec<String> },

    #[error("Z {z:.3} is outside the allowed range [{min:.3}, {max:.3}]")]
    ZOutOfBounds { z: f64, min: f64, max: f64 },
}

impl DeviceError {
    /// Map a read error, turning socket deadline expiry into `Timeout`
    pub(crate) fn from_read(err: std::io::Error, timeout_ms: u64) -> Self {
        match err.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                DeviceError::Timeout { timeout_ms }
            }
            _ => DeviceError::Io(err),
        }
    }
}

/// Mesh acquisition errors
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("invalid probing grid: {0}")]
    InvalidGrid(String),

    /// The probe reached its floor without reporting contact
    #[error("no bed contact at X{x:.3} Y{y:.3} before reaching the safe floor Z{floor:.3}")]
    NoContact { x: f64, y: f64, floor: f64 },
}

/// G-code rewrite errors
#[derive(Error, Debug)]
pub enum TransformError {
    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error("G-code I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: malformed parameter '{text}'")]
    MalformedParameter { line: usize, text: String },

    #[error("line {line}: parameter '{letter}' given more than once")]
    AmbiguousParameter { line: usize, letter: char },

    /// Straight-line travel would leave the mesh surface by more than the limit
    #[error(
        "line {line}: path deviates {deviation:.4}mm from the mesh at X{x:.3} Y{y:.3} (limit {limit:.4}mm)"
    )]
    PathDeviation {
        line: usize,
        x: f64,
        y: f64,
        deviation: f64,
        limit: f64,
    },
}
