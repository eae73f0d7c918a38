//! Quipu format constants.

/// Magic bytes at the start of every Quipu file.
pub const QUIPU_MAGIC: &[u8; 5] = b"QUIPU";

/// Size of the magic identifier in bytes.
pub const MAGIC_SIZE: usize = QUIPU_MAGIC.len();

/// File extension of terrain LOD pyramids.
pub const DEM_EXTENSION: &str = "qld";

/// File extension of star catalogues (same container, different payload).
pub const STAR_EXTENSION: &str = "qsc";

/// Byte size of a persisted class id.
pub const CLASS_ID_SIZE: u64 = 2;

/// Byte size of one level-table entry: f64 gsd + u64 offset.
pub const LEVEL_ENTRY_SIZE: u64 = 16;

/// Compressed-flag values used by image records.
pub const RAW_FLAG: u8 = 0x00;
pub const COMPRESSED_FLAG: u8 = 0x01;

/// Byte size of the level table for `levels` entries.
#[inline]
pub const fn level_table_size(levels: usize) -> u64 {
    levels as u64 * LEVEL_ENTRY_SIZE
}
