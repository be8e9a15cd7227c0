//! As-rigid-as-possible image deformation
//!
//! A lattice of square cells is laid over the foreground of an image. Users
//! pin lattice points and drag them; every frame each cell is fitted
//! rigidly to its current boundary, shared points are reconciled to the
//! mean of their cells' rigid copies, and every cell's pixels are warped
//! into its new shape through a per-cell homography.

pub mod cell;
pub mod config;
pub mod error;
pub mod grid;
pub mod handles;
pub mod overlay;
pub mod point;
pub mod projector;
pub mod raster;
pub mod script;
pub mod session;
pub mod source;
pub mod transform;

pub use config::Config;
pub use error::DeformError;
pub use grid::{ControlId, DeformationGrid};
pub use projector::{PixelProjector, SoftwareProjector};
pub use session::{FrameStats, Session};
pub use source::ImageSource;
