//! Error types for the Quipu container codec.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Quipu operations.
///
/// Every codec error is fatal for the asset being loaded: nothing here is
/// retried or papered over. A level that legitimately carries no albedo is
/// *not* an error (see [`crate::dem::Albedo`]).
#[derive(Error, Debug)]
pub enum Error {
    /// File does not exist
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Path exists but is a directory (or otherwise not a regular file)
    #[error("Not a file: {0}")]
    NotAFile(PathBuf),

    /// Leading bytes do not match the Quipu identifier
    #[error("Invalid Quipu file: expected QUIPU magic bytes")]
    BadMagic,

    /// Persisted type tag is not in the registry
    #[error("Unsupported class id: {0}")]
    UnsupportedClassId(u16),

    /// Persisted vector/matrix shape differs from the requested one
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },

    /// Stored spectral channel count differs from the compiled-in count
    #[error("Channel count mismatch: expected {expected}, got {actual}")]
    ChannelCountMismatch { expected: usize, actual: usize },

    /// Block decompressor rejected the payload
    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    /// A length does not fit in its on-disk field
    #[error("Stream size overflow: {len} exceeds {max}")]
    StreamSizeOverflow { len: u64, max: u64 },

    /// Invalid data structure in file or input
    #[error("Invalid file structure: {0}")]
    InvalidStructure(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 conversion error
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl Error {
    /// Create an invalid structure error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    /// Create a dimension mismatch error from any displayable shapes.
    pub fn dimension_mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        Self::DimensionMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Check a length against the maximum of its on-disk field.
    pub fn check_len(len: usize, max: u64) -> Result<()> {
        if len as u64 > max {
            return Err(Self::StreamSizeOverflow { len: len as u64, max });
        }
        Ok(())
    }
}

/// Result type alias for Quipu operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::BadMagic;
        assert!(e.to_string().contains("magic"));

        let e = Error::ChannelCountMismatch { expected: 3, actual: 5 };
        assert!(e.to_string().contains('3'));
        assert!(e.to_string().contains('5'));

        let e = Error::dimension_mismatch("vec4", "vec3");
        assert_eq!(e.to_string(), "Dimension mismatch: expected vec4, got vec3");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_check_len() {
        assert!(Error::check_len(10, u32::MAX as u64).is_ok());
        let err = Error::check_len(300, u8::MAX as u64).unwrap_err();
        assert!(matches!(err, Error::StreamSizeOverflow { len: 300, max: 255 }));
    }
}
