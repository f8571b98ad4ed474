//! End-to-end promotion and snapshot orchestration.
//!
//! `run_promotion` is the canonical entrypoint: parse manifests, build the
//! sync context (inventory reads), plan edges, execute them, and fold the
//! results into a single outcome. The CLI front-end and any embedding caller
//! share this path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use stevedore_core::{manifest, RegistryContext, RegistryName};
use stevedore_registry::{OpRunner, RegistryReader, DEFAULT_TOOL};

use crate::context::{SyncContext, DEFAULT_THREADS};
use crate::error::SyncError;
use crate::pipeline::{make_producer, promote_edges, PromotionReport};
use crate::plan::{plan, PlanOptions};
use crate::snapshot::{render, SnapshotFormat};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for one promotion run. An explicit value threaded through
/// construction; there is no process-wide default.
#[derive(Debug, Clone)]
pub struct PromoteOptions {
    /// Manifest files to load and merge.
    pub manifests: Vec<PathBuf>,
    /// Worker-pool size for inventory reads and edge execution.
    pub threads: usize,
    /// Actually mutate registries. Without it the run is a dry run.
    pub confirm: bool,
    /// Permit tag reassignment for every image.
    pub allow_moves: bool,
    /// Delete destination digests no manifest declares.
    pub thin: bool,
    /// Run write commands under each destination's service account.
    pub use_service_account: bool,
    /// External registry tool binary.
    pub tool: String,
}

impl Default for PromoteOptions {
    fn default() -> Self {
        Self {
            manifests: Vec::new(),
            threads: DEFAULT_THREADS,
            confirm: false,
            allow_moves: false,
            thin: false,
            use_service_account: false,
            tool: DEFAULT_TOOL.to_string(),
        }
    }
}

/// Configuration for one snapshot run.
#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    pub registry: RegistryName,
    pub format: SnapshotFormat,
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// The structured result of a promotion run: per-edge accounting plus the
/// read errors and dropped candidates recorded along the way.
#[derive(Debug)]
pub struct PromotionOutcome {
    pub report: PromotionReport,
    pub errors: Vec<SyncError>,
}

impl PromotionOutcome {
    /// True iff nothing failed, nothing was dropped, and nothing was
    /// cancelled. Read errors alone do not fail a run — they surface as
    /// dropped candidates when they matter.
    pub fn ok(&self) -> bool {
        self.report.ok() && !self.errors.iter().any(SyncError::is_dropped_candidate)
    }

    /// Collapse into the aggregate result: `Err` iff any candidate was
    /// dropped or any edge failed, with cancellation reported distinctly.
    pub fn into_result(self) -> Result<PromotionReport, SyncError> {
        let dropped = self
            .errors
            .iter()
            .filter(|e| e.is_dropped_candidate())
            .count();
        let failed = self.report.failed.len();
        if failed > 0 || dropped > 0 {
            return Err(SyncError::Aggregate { failed, dropped });
        }
        if !self.report.cancelled.is_empty() {
            return Err(SyncError::Cancelled {
                pending: self.report.cancelled.len(),
            });
        }
        Ok(self.report)
    }
}

// ---------------------------------------------------------------------------
// Promotion
// ---------------------------------------------------------------------------

/// Run a full promotion: manifests → context → plan → execute.
///
/// Manifest errors (including a tag-conflicted plan) are fatal and return
/// before any mutation. Everything else is accounted per edge in the
/// returned outcome.
pub async fn run_promotion(
    options: &PromoteOptions,
    reader: Arc<dyn RegistryReader>,
    runner: Arc<dyn OpRunner>,
    cancel: broadcast::Receiver<()>,
) -> Result<PromotionOutcome, SyncError> {
    let started = Instant::now();
    let manifests = manifest::load_files(&options.manifests)?;

    let mut ctx = SyncContext::build(
        manifests,
        options.threads,
        options.use_service_account,
        !options.confirm,
        reader,
    )
    .await?;

    let plan_options = PlanOptions {
        allow_moves: options.allow_moves,
        thin: options.thin,
    };
    let computed = plan(&ctx, &plan_options)?;
    tracing::info!(
        edges = computed.edges.len(),
        dropped = computed.errors.len(),
        dry_run = ctx.dry_run,
        "promotion plan ready",
    );

    let producer = make_producer(&ctx.registries, ctx.use_service_account);
    let report = promote_edges(
        &ctx.inv,
        computed.edges,
        ctx.threads,
        producer,
        runner,
        cancel,
    )
    .await;

    let mut errors = std::mem::take(&mut ctx.errors);
    errors.extend(computed.errors);

    tracing::info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        cancelled = report.cancelled.len(),
        duration_ms = started.elapsed().as_millis() as u64,
        "promotion finished",
    );
    Ok(PromotionOutcome { report, errors })
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Read one registry and render its inventory in canonical form.
pub async fn snapshot_registry(
    options: &SnapshotOptions,
    reader: Arc<dyn RegistryReader>,
) -> Result<String, SyncError> {
    let rc = RegistryContext {
        name: options.registry.clone(),
        service_account: None,
        src: false,
    };
    let inv = reader.read(&rc).await.map_err(|e| SyncError::Read {
        registry: options.registry.clone(),
        source: e,
    })?;
    render(&inv, options.format)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PromotionEdge;

    fn outcome(
        succeeded: usize,
        failed: usize,
        cancelled: usize,
        errors: Vec<SyncError>,
    ) -> PromotionOutcome {
        use stevedore_core::{Digest, ImageName, Tag};
        use stevedore_registry::ClientError;

        let edge = |n: usize| PromotionEdge {
            src_registry: RegistryName::from("gcr.io/src"),
            src_image: ImageName::from(format!("img-{n}")),
            digest: Digest::from(format!("sha256:{}", "ab".repeat(32))),
            dst_registry: RegistryName::from("gcr.io/dst"),
            dst_image: ImageName::from(format!("img-{n}")),
            tag: Tag::from("v1"),
            tag_op: crate::plan::TagOp::Add,
        };

        let mut report = PromotionReport::default();
        for n in 0..succeeded {
            report.succeeded.push(edge(n));
        }
        for n in 0..failed {
            report.failed.push((
                edge(100 + n),
                SyncError::Exec {
                    op: "copy".to_string(),
                    source: ClientError::CommandFailed {
                        program: "crane".to_string(),
                        status: 1,
                        stderr: "boom".to_string(),
                    },
                },
            ));
        }
        for n in 0..cancelled {
            report.cancelled.push(edge(200 + n));
        }
        PromotionOutcome { report, errors }
    }

    #[test]
    fn clean_outcome_is_ok() {
        let o = outcome(3, 0, 0, vec![]);
        assert!(o.ok());
        let report = o.into_result().expect("ok");
        assert_eq!(report.succeeded.len(), 3);
    }

    #[test]
    fn failed_edges_aggregate() {
        let o = outcome(1, 2, 0, vec![]);
        assert!(!o.ok());
        let err = o.into_result().unwrap_err();
        assert!(
            matches!(err, SyncError::Aggregate { failed: 2, dropped: 0 }),
            "got: {err}"
        );
    }

    #[test]
    fn dropped_candidates_aggregate_even_when_all_edges_succeed() {
        use stevedore_core::{Digest, ImageName, Tag};
        let o = outcome(
            2,
            0,
            0,
            vec![SyncError::MoveForbidden {
                registry: RegistryName::from("gcr.io/dst"),
                image: ImageName::from("foo"),
                tag: Tag::from("v1"),
                current: Digest::from(format!("sha256:{}", "aa".repeat(32))),
                wanted: Digest::from(format!("sha256:{}", "bb".repeat(32))),
            }],
        );
        assert!(!o.ok());
        let err = o.into_result().unwrap_err();
        assert!(
            matches!(err, SyncError::Aggregate { failed: 0, dropped: 1 }),
            "got: {err}"
        );
    }

    #[test]
    fn read_errors_alone_do_not_fail_the_run() {
        use stevedore_registry::ReadError;
        let o = outcome(
            1,
            0,
            0,
            vec![SyncError::Read {
                registry: RegistryName::from("gcr.io/dst"),
                source: ReadError::Status {
                    url: "https://gcr.io/v2/dst/tags/list".to_string(),
                    status: 503,
                },
            }],
        );
        assert!(o.ok(), "a read error with no dropped candidates is not a failure");
        o.into_result().expect("ok");
    }

    #[test]
    fn cancellation_is_distinct_from_failure() {
        let o = outcome(1, 0, 2, vec![]);
        let err = o.into_result().unwrap_err();
        assert!(matches!(err, SyncError::Cancelled { pending: 2 }), "got: {err}");
    }
}
