//! Error types for stevedore-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::RegistryName;

/// A malformed or inconsistent promotion manifest. Always fatal: promotion
/// aborts before any registry mutation.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Underlying I/O failure, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load — includes file path and line context from
    /// serde_yaml.
    #[error("failed to parse manifest at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// No registry in the manifest is marked `src: true`.
    #[error("manifest declares no source registry (one registry must set `src: true`)")]
    NoSourceRegistry,

    /// More than one registry is marked `src: true`.
    #[error("manifest declares {count} source registries; exactly one is allowed")]
    MultipleSourceRegistries { count: usize },

    /// The manifest has a source but nothing to promote into.
    #[error("manifest declares no destination registries")]
    NoDestinationRegistries,

    /// A destination shares the source registry's name; promotion onto
    /// itself is never meaningful.
    #[error("registry '{registry}' is declared as both source and destination")]
    DestinationEqualsSource { registry: RegistryName },

    /// A digest key failed syntax validation.
    #[error("invalid digest '{digest}' for image '{image}'")]
    InvalidDigest { image: String, digest: String },

    /// A tag failed syntax validation.
    #[error("invalid tag '{tag}' for image '{image}'")]
    InvalidTag { image: String, tag: String },

    /// Two manifests reference the same registry with different service
    /// accounts.
    #[error("conflicting service accounts for registry '{registry}' across manifests")]
    ServiceAccountConflict { registry: RegistryName },
}

/// Convenience constructor for [`ManifestError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ManifestError {
    ManifestError::Io {
        path: path.into(),
        source,
    }
}
