//! The execution pipeline: a fan-out/fan-in worker pool that consumes
//! promotion edges exactly once each.
//!
//! A bounded request channel (capacity = pool size) carries edges to N
//! workers; outcomes flow through a result channel into a collector that
//! owns the report. The bounded channel gives backpressure on huge plans.
//!
//! Within one edge, copy strictly happens-before tag. Between edges there is
//! no ordering: the planner's tag-uniqueness check makes edges independent,
//! and copying the same digest twice concurrently is idempotent at the
//! registry protocol level.
//!
//! On cancellation, in-flight edges complete; edges not yet executed are
//! reported `Cancelled`, distinct from failure.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};

use stevedore_core::{MasterInventory, RegistryContext, RegistryName};
use stevedore_registry::{OpRunner, RegistryCommand, RegistryOp};

use crate::error::SyncError;
use crate::plan::{PromotionEdge, TagOp};

// ---------------------------------------------------------------------------
// Producer functions
// ---------------------------------------------------------------------------

/// Resolves an edge into the concrete commands that realize it.
///
/// The second argument says whether the destination already holds the edge's
/// digest; when it does, the copy is skipped and only the tag is applied.
pub type EdgeProducerFn = dyn Fn(&PromotionEdge, bool) -> Vec<RegistryCommand> + Send + Sync;

/// An [`EdgeProducerFn`] shared across workers.
pub type EdgeProducer = Arc<EdgeProducerFn>;

/// The default producer: copy-then-tag for add/move edges, untag or delete
/// for delete edges, with the destination's service account attached when
/// service-account mode is on.
pub fn make_producer(
    registries: &BTreeMap<RegistryName, RegistryContext>,
    use_service_account: bool,
) -> EdgeProducer {
    let accounts: BTreeMap<RegistryName, String> = if use_service_account {
        registries
            .iter()
            .filter_map(|(name, rc)| {
                rc.service_account
                    .clone()
                    .map(|account| (name.clone(), account))
            })
            .collect()
    } else {
        BTreeMap::new()
    };

    Arc::new(move |edge, digest_present| {
        let account = accounts.get(&edge.dst_registry).cloned();
        let mut ops = Vec::new();
        match edge.tag_op {
            TagOp::Add | TagOp::Move => {
                if !digest_present {
                    ops.push(RegistryOp::Copy {
                        src_registry: edge.src_registry.clone(),
                        src_image: edge.src_image.clone(),
                        digest: edge.digest.clone(),
                        dst_registry: edge.dst_registry.clone(),
                        dst_image: edge.dst_image.clone(),
                    });
                }
                if !edge.tag.is_empty() {
                    ops.push(RegistryOp::SetTag {
                        registry: edge.dst_registry.clone(),
                        image: edge.dst_image.clone(),
                        digest: edge.digest.clone(),
                        tag: edge.tag.clone(),
                    });
                }
            }
            TagOp::Delete => {
                if edge.tag.is_empty() {
                    ops.push(RegistryOp::DeleteDigest {
                        registry: edge.dst_registry.clone(),
                        image: edge.dst_image.clone(),
                        digest: edge.digest.clone(),
                    });
                } else {
                    ops.push(RegistryOp::DeleteTag {
                        registry: edge.dst_registry.clone(),
                        image: edge.dst_image.clone(),
                        tag: edge.tag.clone(),
                    });
                }
            }
            TagOp::Keep => {}
        }
        ops.into_iter()
            .map(|op| RegistryCommand::with_account(op, account.clone()))
            .collect()
    })
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum EdgeOutcome {
    Succeeded,
    Failed(SyncError),
    Cancelled,
}

/// Per-edge accounting for one pipeline run.
#[derive(Debug, Default)]
pub struct PromotionReport {
    pub succeeded: Vec<PromotionEdge>,
    pub failed: Vec<(PromotionEdge, SyncError)>,
    pub cancelled: Vec<PromotionEdge>,
}

impl PromotionReport {
    /// True iff every edge ran to completion successfully.
    pub fn ok(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.cancelled.len()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Execute every edge exactly once with `threads` workers.
///
/// The inventory is consulted only to decide whether each edge needs a copy;
/// it is never mutated (dry-run purity holds by construction).
pub async fn promote_edges(
    inv: &MasterInventory,
    edges: Vec<PromotionEdge>,
    threads: usize,
    producer: EdgeProducer,
    runner: Arc<dyn OpRunner>,
    mut cancel: broadcast::Receiver<()>,
) -> PromotionReport {
    let mut report = PromotionReport::default();
    if edges.is_empty() {
        return report;
    }
    let threads = threads.max(1);
    let total = edges.len();

    // Resolve the copy decision against the observed inventory up front, so
    // workers carry owned data only.
    let work: Vec<(PromotionEdge, bool)> = edges
        .into_iter()
        .map(|edge| {
            let present = inv
                .get(&edge.dst_registry)
                .is_some_and(|dst| dst.has_digest(&edge.dst_image, &edge.digest));
            (edge, present)
        })
        .collect();

    let (req_tx, req_rx) = mpsc::channel::<(PromotionEdge, bool)>(threads);
    let (res_tx, mut res_rx) = mpsc::channel::<(PromotionEdge, EdgeOutcome)>(threads);
    let req_rx = Arc::new(Mutex::new(req_rx));
    let cancelled = Arc::new(AtomicBool::new(false));

    // Flip the flag on the first cancellation signal. A lagged receiver also
    // means a signal was sent.
    let watcher = {
        let cancelled = cancelled.clone();
        tokio::spawn(async move {
            match cancel.recv().await {
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    tracing::warn!("cancellation received; draining without dispatching");
                    cancelled.store(true, Ordering::SeqCst);
                }
                Err(broadcast::error::RecvError::Closed) => {}
            }
        })
    };

    let mut workers = Vec::with_capacity(threads);
    for _ in 0..threads {
        let req_rx = req_rx.clone();
        let res_tx = res_tx.clone();
        let producer = producer.clone();
        let runner = runner.clone();
        let cancelled = cancelled.clone();
        workers.push(tokio::spawn(async move {
            loop {
                let next = {
                    let mut rx = req_rx.lock().await;
                    rx.recv().await
                };
                let Some((edge, digest_present)) = next else {
                    break;
                };
                let outcome = if cancelled.load(Ordering::SeqCst) {
                    EdgeOutcome::Cancelled
                } else {
                    run_edge(&*runner, producer.as_ref(), &edge, digest_present).await
                };
                if res_tx.send((edge, outcome)).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(res_tx);

    // Feed every edge; once the flag is set workers mark the remainder
    // cancelled without executing.
    let feeder = tokio::spawn(async move {
        for pair in work {
            if req_tx.send(pair).await.is_err() {
                break;
            }
        }
    });

    while let Some((edge, outcome)) = res_rx.recv().await {
        match outcome {
            EdgeOutcome::Succeeded => {
                tracing::info!(edge = %edge, "promoted");
                report.succeeded.push(edge);
            }
            EdgeOutcome::Failed(err) => {
                tracing::error!(edge = %edge, error = %err, "edge failed");
                report.failed.push((edge, err));
            }
            EdgeOutcome::Cancelled => {
                tracing::warn!(edge = %edge, "edge cancelled");
                report.cancelled.push(edge);
            }
        }
    }

    if let Err(err) = feeder.await {
        tracing::error!(error = %err, "edge feeder task died");
    }
    for worker in workers {
        if let Err(err) = worker.await {
            tracing::error!(error = %err, "pipeline worker died");
        }
    }
    watcher.abort();

    if report.total() != total {
        tracing::error!(
            expected = total,
            accounted = report.total(),
            "pipeline lost edge outcomes",
        );
    }
    report
}

/// Run one edge's command sequence in order; the first failure is terminal
/// for the edge (a failed copy means no tag is ever attempted).
async fn run_edge(
    runner: &dyn OpRunner,
    producer: &EdgeProducerFn,
    edge: &PromotionEdge,
    digest_present: bool,
) -> EdgeOutcome {
    for command in producer(edge, digest_present) {
        if let Err(err) = runner.run(&command).await {
            return EdgeOutcome::Failed(SyncError::Exec {
                op: command.op.to_string(),
                source: err,
            });
        }
    }
    EdgeOutcome::Succeeded
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
