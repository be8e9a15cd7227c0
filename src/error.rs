use thiserror::Error;

use crate::grid::ControlId;

/// Errors raised by the deformation engine.
///
/// All of them are recoverable: a failing cell or control never aborts a
/// regularize/project pass over the rest of the mesh.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum DeformError {
    #[error("degenerate cell geometry: homography system is singular")]
    DegenerateGeometry,

    #[error("no lattice cell contains ({x}, {y})")]
    NoContainingCell { x: f64, y: f64 },

    #[error("unknown control {0}")]
    UnknownControl(ControlId),

    #[error("pixel buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },
}
