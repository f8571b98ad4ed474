//! Error types for stevedore-registry.

use thiserror::Error;

/// A registry write command could not be spawned or exited non-zero.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The registry tool binary could not be started at all.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The registry tool ran and reported failure.
    #[error("'{program}' exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: i32,
        stderr: String,
    },

    /// The registry tool exceeded its deadline and was killed.
    #[error("'{program}' timed out after {after_secs}s")]
    TimedOut { program: String, after_secs: u64 },
}

/// A registry inventory read failed. Non-fatal per registry: the read phase
/// records the error and continues with the other registries.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The registry name cannot be split into host and repository prefix.
    #[error("registry name '{name}' is not of the form <host>/<path>")]
    BadRegistryName { name: String },

    /// The tags-list URL could not be constructed.
    #[error("bad registry URL '{url}': {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Transport-level failure talking to the registry.
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The registry answered with a non-success status.
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The tags-list body was not the expected JSON shape.
    #[error("failed to parse tags-list from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}
