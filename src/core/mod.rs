//! Codec building blocks below the stream layer.

mod compression;
mod io_counter;

pub use compression::*;
pub use io_counter::*;
