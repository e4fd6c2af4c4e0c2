//! Fatal error classes that decide the process exit code.
//!
//! Everything else travels as `anyhow::Error`; `main` downcasts to
//! `ArenaError` to tell configuration and persistence failures apart.

use std::path::PathBuf;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Exit status for errors that are neither configuration nor persistence.
pub const EXIT_FAILURE: u8 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    /// Invalid roster, interval or market window. Detected before the loop starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// The snapshot could not be read or written. The previous snapshot is intact.
    #[error("persistence failure at {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
}

impl ArenaError {
    pub fn config(msg: impl Into<String>) -> Self {
        ArenaError::Config(msg.into())
    }

    pub fn persistence(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        ArenaError::Persistence {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn exit_status(&self) -> u8 {
        match self {
            ArenaError::Config(_) => 2,
            ArenaError::Persistence { .. } => 3,
        }
    }
}

/// Exit status for a top-level error.
pub fn exit_status_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<ArenaError>()
        .map(ArenaError::exit_status)
        .unwrap_or(EXIT_FAILURE)
}
