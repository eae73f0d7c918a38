//! # Quipu
//!
//! Reader and writer for the Quipu binary container and the terrain LOD
//! pyramids (`.qld`) built on it.
//!
//! ## Modules
//!
//! - [`util`] - Basic types (type tags, images, errors, math)
//! - [`core`] - Block compression and I/O accounting
//! - [`quipu`] - Low-level Quipu stream codec
//! - [`dem`] - DEM pyramid container, level payloads and mesh generation
//!
//! ## Example
//!
//! ```ignore
//! use quipu::prelude::*;
//!
//! let mut pyramid = DemPyramid::open("moon.qld")?;
//! if let Some(mesh) = pyramid.read_buffers(2.0, DVec3::ZERO)? {
//!     println!("level {}: {} vertices", mesh.level, mesh.vertices.len());
//! }
//! ```

#[cfg(target_endian = "big")]
compile_error!("quipu files are little-endian and bulk payloads are copied as host bytes");

pub mod util;
pub mod core;
pub mod quipu;
pub mod dem;

// Re-export commonly used types
pub use util::{ClassId, Error, Result};
pub use dem::{DemLevel, DemPyramid, DemReaderOptions, DemWriterOptions};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{ClassId, DAffine3, DVec3, Error, Image, Resolution, Result, Spectral};
    pub use crate::quipu::{IStream, OStream};
    pub use crate::dem::{
        Albedo, DemLevel, DemProjection, DemPyramid, DemReaderOptions, DemWriterOptions, MeshBuffers,
        SharedDemPyramid,
    };
}
