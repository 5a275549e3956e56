//! Data module: per-cell mesh input

/// Per-face boundary condition codes.
pub mod bc;
/// Per-cell velocities, lengths and faces.
pub mod cells;

pub use bc::FaceType;
pub use cells::{CellData, CellFlags};
