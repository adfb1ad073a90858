//! Error types
//!
//! The query engine, matcher and tree builder never fail; errors only come
//! from URL handling and the page source layer.

use thiserror::Error;

/// Failure while resolving a link against a base URL
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid base url {url}: {source}")]
    InvalidBase {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Failure while fetching or downloading a page
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid url {0}")]
    InvalidUrl(String),

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("non 200 status code {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while running a site parser
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("host parser({expected}) does not match search url: {actual}")]
    HostMismatch { expected: String, actual: String },

    #[error(transparent)]
    Source(#[from] SourceError),
}
