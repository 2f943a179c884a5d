//! Error handling for catalog operations.

use thiserror::Error;

/// Common error type for catalog operations.
///
/// Lookups that find nothing are not errors, they resolve to `Ok(None)`.
/// An entity request answered with a non-success status is likewise reported
/// as `Ok(None)` rather than through this type.
#[derive(Debug, Error)]
pub enum CatalogClientError {
    /// The request could not be sent, or the index or issues endpoint
    /// answered with a non-success status.
    #[error("request to catalog failed")]
    Request(#[source] reqwest::Error),
    /// The response body was not the expected JSON document.
    #[error("could not decode response from '{url}'")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid URL configured for '{field}'")]
    InvalidUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("could not load catalog configuration")]
    InvalidConfig(#[from] config::ConfigError),
    #[error("{}", .0)]
    Other(String),
}

impl From<reqwest::Error> for CatalogClientError {
    fn from(err: reqwest::Error) -> Self {
        CatalogClientError::Request(err)
    }
}
