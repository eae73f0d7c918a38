//! Terrain level-of-detail pyramids.
//!
//! A pyramid stores the same DEM at several ground sample distances, finest
//! first. [`DemPyramid`] parses the header once and then streams individual
//! levels on demand, re-reading the file only when the selected level
//! changes.

mod level;
mod payload;
mod projection;
mod pyramid;

pub use level::*;
pub use payload::*;
pub use projection::*;
pub use pyramid::*;
