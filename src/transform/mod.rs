//! G-code Transformer
//!
//! Rewrites a motion program so every move follows the measured bed surface.

pub mod engine;
pub mod state;

pub use engine::{processed_path, Transformer};
pub use state::{AxisValue, TransformState};
