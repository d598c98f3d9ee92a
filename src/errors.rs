//! Custom error types for the upload guard.
//!
//! Two policy boundaries consume these errors. The verdict aggregator turns
//! every error into an unsafe verdict, while the archive bomb detector hands
//! them to its caller, which must reject the upload.

use std::path::PathBuf;

/// The main error type for upload inspection.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// I/O error (file read/write, permissions, etc.)
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    /// Memory-mapped file error
    #[error("Failed to memory-map file {path:?}: {source}")]
    Mmap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// ZIP central directory could not be read
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Audit store error
    #[error("Audit database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Raster decoding failed (unsupported or malformed pixel data)
    #[error("Pixel decoding failed: {0}")]
    Decode(String),

    /// Extension handed to the archive bomb detector is not .zip or .rar
    #[error("Unsupported archive extension: {0}")]
    UnsupportedArchive(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Tokio task join error
    #[error("Async task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// Generic error for external library errors
    #[error("{context}: {message}")]
    External { context: String, message: String },
}

/// Result type alias using GuardError
pub type GuardResult<T> = Result<T, GuardError>;

impl GuardError {
    /// Create an I/O error with path context
    pub fn io(source: std::io::Error, path: impl Into<Option<PathBuf>>) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an mmap error with path context
    pub fn mmap(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Mmap {
            path: path.into(),
            source,
        }
    }

    /// Create an external error with context
    pub fn external(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::External {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Whether this error only means the optional pixel decoder could not
    /// handle the input.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

/// Convert from raw I/O errors (without path context)
impl From<std::io::Error> for GuardError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { path: None, source }
    }
}
