//! Error types shared across framefx crates.

/// Top-level error type for framefx operations.
///
/// Per-frame outcomes never travel through this type; they are delivered
/// to completion sinks as tagged results. This covers setup and loading.
#[derive(Debug, thiserror::Error)]
pub enum FramefxError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Filter catalog error: {message}")]
    Catalog { message: String },

    #[error("Instruction error: {message}")]
    Instruction { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using FramefxError.
pub type FramefxResult<T> = Result<T, FramefxError>;

impl FramefxError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog {
            message: msg.into(),
        }
    }

    pub fn instruction(msg: impl Into<String>) -> Self {
        Self::Instruction {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }
}
