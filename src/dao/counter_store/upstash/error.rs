//! Error types shared by the Redis REST storage implementation.

use reqwest::StatusCode;
use thiserror::Error;

/// Convenient result alias returning [`UpstashDaoError`] failures.
pub type UpstashResult<T> = Result<T, UpstashDaoError>;

/// Failures that can occur while interacting with the Redis REST endpoint.
#[derive(Debug, Error)]
pub enum UpstashDaoError {
    /// Required environment variable is missing.
    #[error("missing Redis REST environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build Redis REST client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// A request could not be sent.
    #[error("failed to send Redis REST request to `{path}`")]
    RequestSend {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The endpoint returned an unexpected status code.
    #[error("unexpected Redis REST response status {status} for `{path}`")]
    RequestStatus { path: String, status: StatusCode },
    /// Response payload could not be parsed into JSON.
    #[error("failed to decode Redis REST response for `{path}`")]
    DecodeResponse {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// The endpoint answered with a different number of replies than commands sent.
    #[error("expected {expected} replies from `{path}`, got {actual}")]
    ReplyCount {
        path: String,
        expected: usize,
        actual: usize,
    },
    /// One command of a batch was rejected by the server.
    #[error("command `{command}` rejected: {message}")]
    CommandRejected {
        command: &'static str,
        message: String,
    },
}
