// src/error.rs
//! Error taxonomy for single fetches and whole races.

use std::time::Duration;

use thiserror::Error;

/// Why a single fetcher failed. Every variant is fatal to that fetcher only.
///
/// Causes are kept as rendered strings so results stay `Clone`/`PartialEq`
/// regardless of which transport produced them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("cannot build request for {url}: {message}")]
    RequestConstruction { url: String, message: String },

    #[error("transport error talking to {url}: {message}")]
    Transport { url: String, message: String },

    #[error("error: received status code {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("failed reading response body from {url}: {message}")]
    BodyRead { url: String, message: String },

    /// The race resolved while this fetch was in flight. Never reported as an outcome.
    #[error("fetch of {url} cancelled")]
    Cancelled { url: String },
}

impl FetchError {
    /// Stable label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::RequestConstruction { .. } => "request_construction",
            FetchError::Transport { .. } => "transport",
            FetchError::UnexpectedStatus { .. } => "unexpected_status",
            FetchError::BodyRead { .. } => "body_read",
            FetchError::Cancelled { .. } => "cancelled",
        }
    }

    pub fn url(&self) -> &str {
        match self {
            FetchError::RequestConstruction { url, .. }
            | FetchError::Transport { url, .. }
            | FetchError::UnexpectedStatus { url, .. }
            | FetchError::BodyRead { url, .. }
            | FetchError::Cancelled { url } => url,
        }
    }
}

/// Race-level failure, obtained from [`crate::race::RaceOutcome::into_result`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RaceError {
    #[error("request timeout: no source answered within {0:?}")]
    Timeout(Duration),

    #[error("source {source_name} failed first: {cause}")]
    Fetch {
        source_name: String,
        #[source]
        cause: FetchError,
    },

    #[error("no source was able to report a result")]
    Exhausted,
}
