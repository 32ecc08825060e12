//! Error types for the hdfmesh library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for container and mesh operations.
#[derive(Error, Debug)]
pub enum Error {
    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Path is not a readable container or lacks the expected root group
    #[error("Not a mesh container: {0}")]
    NotAContainer(String),

    /// Stored schema major version is newer than this implementation
    #[error("Unsupported schema version {major}.{minor} (supported up to {supported}.x)")]
    UnsupportedVersion { major: i64, minor: i64, supported: i64 },

    /// A required count or offset table is absent
    #[error("Missing metadata: {0}")]
    MissingMetadata(String),

    /// Transient offset tables are empty or disagree in length
    #[error("Inconsistent step metadata: {0}")]
    InconsistentStepMetadata(String),

    /// Points, connectivity, or coordinates are absent
    #[error("Missing required array: {0}")]
    MissingRequiredArray(String),

    /// Stored element type cannot be reconciled with the expected one
    #[error("Array '{name}' has type {actual}, expected {expected}")]
    ArrayTypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// Isolated failure while reading one attribute array
    #[error("Failed to read array '{array}': {reason}")]
    ReadError { array: String, reason: String },

    /// Dataset creation, extension, or file creation failed
    #[error("Write failed: {0}")]
    WriteError(String),

    /// File is truncated or corrupted
    #[error("Unexpected end of file at position {0}")]
    UnexpectedEof(u64),

    /// Invalid data structure in file
    #[error("Invalid file structure: {0}")]
    InvalidStructure(String),

    /// Object not found by path
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Hyperslab or row range lies outside the dataset
    #[error("Selection out of bounds: {0}")]
    OutOfBounds(String),

    /// Container writer was already closed
    #[error("Container is frozen and cannot be modified")]
    Frozen,

    /// Cooperative abort requested by the caller
    #[error("Read aborted by caller")]
    Aborted,

    /// Memory mapping failed
    #[error("Memory mapping failed: {0}")]
    MmapFailed(String),

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

    /// Create a write error.
    pub fn write(msg: impl Into<String>) -> Self {
        Self::WriteError(msg.into())
    }

    /// Create a missing metadata error.
    pub fn missing_metadata(name: impl Into<String>) -> Self {
        Self::MissingMetadata(name.into())
    }

    /// Create an inconsistent step metadata error.
    pub fn inconsistent_steps(msg: impl Into<String>) -> Self {
        Self::InconsistentStepMetadata(msg.into())
    }

    /// Create a type mismatch error for a named array.
    pub fn type_mismatch(
        name: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ArrayTypeMismatch {
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Wrap any failure as an isolated read failure of one array.
    pub fn read_failure(array: impl Into<String>, cause: &Error) -> Self {
        Self::ReadError {
            array: array.into(),
            reason: cause.to_string(),
        }
    }

    /// Whether this failure only concerns a single attribute array.
    ///
    /// Isolated failures may be degraded to a warning by the reader when
    /// strict mode is off.
    pub fn is_isolated(&self) -> bool {
        matches!(
            self,
            Self::ReadError { .. } | Self::ArrayTypeMismatch { .. } | Self::OutOfBounds(_)
        )
    }
}

/// Result type alias for hdfmesh operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::UnsupportedVersion { major: 3, minor: 0, supported: 2 };
        assert!(e.to_string().contains("3.0"));
        assert!(e.to_string().contains("2.x"));

        let e = Error::type_mismatch("Points", "float", "string");
        assert!(e.to_string().contains("Points"));
        assert!(e.to_string().contains("string"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_isolated_classification() {
        let base = Error::invalid("bad chunk");
        assert!(!base.is_isolated());
        assert!(Error::read_failure("Temperature", &base).is_isolated());
        assert!(!Error::MissingRequiredArray("Points".into()).is_isolated());
        assert!(!Error::Aborted.is_isolated());
    }
}
