use std::{path::PathBuf, time::Duration};

/// Core error type for the bot runtime.
///
/// Startup-time variants are fatal (the process refuses to start); everything
/// raised inside the poll loop is isolated to the iteration or handler that
/// produced it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("duplicate command registration: /{name}")]
    DuplicateCommand { name: String },

    #[error("corrupt status snapshot {path}: {source}")]
    CorruptStatus {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("handler error: {0}")]
    Handler(String),

    #[error("handler timed out after {0:?}")]
    HandlerTimeout(Duration),

    #[error("failed to persist status to {path}: {source}")]
    StatusPersist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Configuration problems detected while wiring the bot together.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Config(_) | Error::DuplicateCommand { .. })
    }

    /// Errors that must abort startup rather than be retried by the loop.
    pub fn is_fatal(&self) -> bool {
        self.is_configuration() || matches!(self, Error::CorruptStatus { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
