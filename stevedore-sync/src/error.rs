//! Error types for stevedore-sync.
//!
//! The taxonomy mirrors the promotion error model: manifest errors are fatal
//! and abort before any mutation; read, source-missing, move-forbidden, and
//! execution errors are recorded per registry or per edge while the run
//! continues; cancellation is distinct from failure.

use thiserror::Error;

use stevedore_core::{Digest, ImageName, ManifestError, RegistryName, Tag};
use stevedore_registry::{ClientError, ReadError};

/// All errors that can arise from a promotion or snapshot run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed or inconsistent manifest. Fatal.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// A registry inventory read failed. Recorded; the run continues with an
    /// empty inventory for that registry.
    #[error("failed to read registry '{registry}': {source}")]
    Read {
        registry: RegistryName,
        #[source]
        source: ReadError,
    },

    /// An edge's source was not observed in the source registry. The edge is
    /// dropped, never executed.
    #[error(
        "source {src_registry}/{src_image}@{digest} not observed; \
         dropping promotion to {dst_registry}/{dst_image}"
    )]
    SourceMissing {
        src_registry: RegistryName,
        src_image: ImageName,
        digest: Digest,
        dst_registry: RegistryName,
        dst_image: ImageName,
    },

    /// A tag reassignment was planned but not permitted. The edge is dropped.
    #[error(
        "tag '{tag}' on {registry}/{image} points at {current}, manifest wants {wanted}; \
         refusing the move (pass move permission to allow)"
    )]
    MoveForbidden {
        registry: RegistryName,
        image: ImageName,
        tag: Tag,
        current: Digest,
        wanted: Digest,
    },

    /// A registry write failed while executing an edge.
    #[error("executing '{op}' failed: {source}")]
    Exec {
        op: String,
        #[source]
        source: ClientError,
    },

    /// The run was cancelled; `pending` edges were never dispatched.
    #[error("promotion cancelled with {pending} edges pending")]
    Cancelled { pending: usize },

    /// The merged manifests bind one destination tag to two digests. The
    /// whole plan is refused; nothing executes.
    #[error(
        "conflicting desired state: tag '{tag}' on {registry}/{image} \
         is bound to both {first} and {second}"
    )]
    TagConflict {
        registry: RegistryName,
        image: ImageName,
        tag: Tag,
        first: Digest,
        second: Digest,
    },

    /// Snapshot serialization failed.
    #[error("snapshot rendering failed: {0}")]
    Snapshot(#[from] serde_yaml::Error),

    /// A worker task died instead of reporting an outcome.
    #[error("worker task failure: {0}")]
    Task(String),

    /// Terminal summary when any edge failed or was dropped.
    #[error("promotion incomplete: {failed} edges failed, {dropped} candidates dropped")]
    Aggregate { failed: usize, dropped: usize },
}

impl SyncError {
    /// Whether this error represents a dropped planner candidate
    /// (source-missing or move-forbidden), as opposed to a recorded
    /// read failure.
    pub fn is_dropped_candidate(&self) -> bool {
        matches!(
            self,
            SyncError::SourceMissing { .. } | SyncError::MoveForbidden { .. }
        )
    }
}
