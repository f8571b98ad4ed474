//! # stevedore-sync
//!
//! The reconciliation engine: diff declared desired state against observed
//! registry inventories, plan promotion edges, and execute them through a
//! bounded worker pool.
//!
//! Call [`run_promotion`] for a full promotion run, or [`snapshot_registry`]
//! to materialize one registry's inventory as canonical text.

pub mod context;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod promote;
pub mod snapshot;

pub use context::{SyncContext, DEFAULT_THREADS};
pub use error::SyncError;
pub use pipeline::{make_producer, promote_edges, EdgeProducer, PromotionReport};
pub use plan::{plan, Plan, PlanOptions, PromotionEdge, TagOp};
pub use promote::{
    run_promotion, snapshot_registry, PromoteOptions, PromotionOutcome, SnapshotOptions,
};
pub use snapshot::{render, SnapshotFormat};
