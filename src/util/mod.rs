//! Utility types shared by every layer of the crate.
//!
//! - [`ClassId`] / [`QuipuPod`] / [`Scalar`] - the type tag registry
//! - [`Image`] / [`Resolution`] / [`Spectral`] - raster payload types
//! - [`Error`] / [`Result`] - error handling
//! - Math type re-exports from glam plus transform decomposition

mod class_id;
mod error;
mod image;
mod math;

pub use class_id::*;
pub use error::*;
pub use image::*;
pub use math::*;
