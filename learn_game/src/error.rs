use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("action {action} is out of range (must be 0-8)")]
    ActionOutOfRange { action: usize },

    #[error("cell ({row}, {col}) is off the board (rows and columns are 0-2)")]
    CellOutOfRange { row: usize, col: usize },

    #[error("unknown policy kind '{kind}' (expected 'greedy', 'softmax' or 'random')")]
    UnknownPolicyKind { kind: String },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("invalid state key '{key}': expected 9 characters from '0', '1', '2'")]
    InvalidStateKey { key: String },

    #[error("policy distribution for state '{state}' has no positive mass")]
    InvalidDistribution { state: String },

    #[error("input closed before a move was entered")]
    InputClosed,

    #[error("failed to {operation} {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("pickle error: {0}")]
    Pickle(#[from] serde_pickle::Error),

    #[error("config error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn io(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Error::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::InvalidConfiguration {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
