use std::path::PathBuf;
use thiserror::Error;

/// Failures of the answer generator. The set is closed: every transport or
/// provider failure is classified into one of these kinds.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeneratorError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("quota or rate limit exceeded: {0}")]
    Quota(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl GeneratorError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Auth(_) => "auth",
            Self::Quota(_) => "quota",
            Self::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// Failures of a semantic index backend.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("index backend unavailable: {0}")]
    Backend(String),

    #[error("index response could not be decoded: {0}")]
    Decode(String),
}

/// Fatal startup failures while loading the record store.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse CSV {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to open spreadsheet {}: {message}", path.display())]
    Spreadsheet { path: PathBuf, message: String },

    #[error("{} contains no data", .0.display())]
    Empty(PathBuf),

    #[error("unsupported file type: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("missing columns: cannot compute 'Sales'. Ensure 'Quantity' and 'Price' are present")]
    MissingSales,
}
