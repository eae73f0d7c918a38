//! Low-level Quipu container primitives.
//!
//! A Quipu file is a flat byte stream: the magic identifier followed by
//! self-describing records. Nothing here knows about terrain; the DEM pyramid
//! in [`crate::dem`] is one record layout built on these primitives.
//!
//! ## Record shapes
//!
//! ```text
//! magic          "QUIPU"                               5 bytes
//! value          raw bytes                             sizeof(T)
//! typed value    class id (u16) + value                2 + sizeof(T)
//! vector         count (u32) + byte len (u32) + data   8 + n * sizeof(T)
//! string         len (u32) + UTF-8 bytes               4 + len
//! vec<N>         class id + N (u8) + N values
//! mat<C,R>       class id + C (u8) + R (u8) + C*R values, column major
//! transform      vec3 position + mat3x3 rotation + vec3 scale (float64)
//! block          compressed len (u64) + zlib bytes
//! image          class id + width (u32) + height (u32) + flag (u8)
//!                + block | row-major pixels
//! ```
//!
//! All multi-byte values are little-endian.

mod format;
mod istream;
mod ostream;

pub use format::*;
pub use istream::*;
pub use ostream::*;
