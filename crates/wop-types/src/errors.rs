use thiserror::Error;

/// Main error type for the optimization client
#[derive(Error, Debug)]
pub enum WopError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Optimization error: {0}")]
    Optimization(String),

    #[error("Empty history: tell observations before asking for a new point")]
    EmptyHistory,

    #[error("Size mismatch: {message}")]
    SizeMismatch { message: String },

    #[error("Timeout: remote optimizer still running after {attempts} polls")]
    Timeout { attempts: u32 },

    #[error("Valid optimum not found: no observation satisfies all constraints")]
    ValidOptimumNotFound,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WopError {
    /// Whether the error came from the remote service or the link to it,
    /// as opposed to a local precondition.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Optimization(_) | Self::Timeout { .. })
    }
}

/// Result type alias for optimization client operations
pub type WopResult<T> = Result<T, WopError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::WopError::Config(format!($($arg)*))
    };
}

/// Macro for creating optimization (remote) errors
#[macro_export]
macro_rules! optimization_error {
    ($($arg:tt)*) => {
        $crate::WopError::Optimization(format!($($arg)*))
    };
}

/// Macro for creating size mismatch errors
#[macro_export]
macro_rules! size_mismatch {
    ($($arg:tt)*) => {
        $crate::WopError::SizeMismatch {
            message: format!($($arg)*),
        }
    };
}
