//! Error types for the normalization pipeline.
//!
//! Classification problems (unknown status codes, missing keys) are never
//! errors: they are values in the report model. Only input that cannot be
//! read at all ends up here.

/// Core errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Engine result document could not be parsed.
    #[error("malformed engine result: {message}")]
    MalformedInput { message: String },

    /// Key snapshot could not be read or parsed.
    #[error("key snapshot error: {message}")]
    Snapshot { message: String },
}

impl CoreError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MalformedInput { .. } => 2,
            Self::Snapshot { .. } => 2,
        }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
