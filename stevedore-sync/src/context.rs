//! The run-scoped sync context: manifests, merged registry contexts, observed
//! inventories, worker-pool configuration, and accumulated errors.
//!
//! Built in two phases: registry contexts are merged (a service-account
//! conflict is fatal), then every referenced registry is read concurrently,
//! bounded by the worker-pool size. The read phase completes entirely before
//! the planner runs; afterwards the inventory is read-only.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;

use stevedore_core::{manifest, Manifest, MasterInventory, RegInvImage, RegistryContext, RegistryName};
use stevedore_registry::RegistryReader;

use crate::error::SyncError;

/// Default worker-pool size for inventory reads and edge execution.
pub const DEFAULT_THREADS: usize = 10;

/// Everything one promotion run needs, assembled once.
pub struct SyncContext {
    pub manifests: Vec<Manifest>,
    /// Registry contexts deduplicated by name across all manifests.
    pub registries: BTreeMap<RegistryName, RegistryContext>,
    /// Observed state of every referenced registry. Read-only after build.
    pub inv: MasterInventory,
    pub threads: usize,
    pub use_service_account: bool,
    pub dry_run: bool,
    /// Read errors recorded during the build phase, then planner drops.
    pub errors: Vec<SyncError>,
}

impl SyncContext {
    /// Merge registry contexts and populate inventories with bounded
    /// parallel reads.
    ///
    /// A per-registry read failure is recorded in `errors` and leaves that
    /// registry's inventory empty; the planner will then reject affected
    /// edges against source truth rather than guessing.
    pub async fn build(
        manifests: Vec<Manifest>,
        threads: usize,
        use_service_account: bool,
        dry_run: bool,
        reader: Arc<dyn RegistryReader>,
    ) -> Result<Self, SyncError> {
        let registries = manifest::merge_registry_contexts(&manifests)?;
        let mut ctx = SyncContext {
            manifests,
            registries,
            inv: MasterInventory::new(),
            threads: threads.max(1),
            use_service_account,
            dry_run,
            errors: Vec::new(),
        };
        ctx.read_inventories(reader).await;
        Ok(ctx)
    }

    async fn read_inventories(&mut self, reader: Arc<dyn RegistryReader>) {
        let semaphore = Arc::new(Semaphore::new(self.threads));
        let mut pending = Vec::new();

        for rc in self.registries.values().cloned() {
            let reader = reader.clone();
            let semaphore = semaphore.clone();
            let name = rc.name.clone();
            let handle = tokio::spawn(async move {
                // The semaphore is never closed, so acquisition cannot fail.
                let _permit = semaphore.acquire_owned().await.ok();
                reader.read(&rc).await
            });
            pending.push((name, handle));
        }

        // Hard barrier: every read completes before planning may begin.
        for (name, handle) in pending {
            match handle.await {
                Ok(Ok(inv)) => {
                    tracing::debug!(registry = %name, digests = inv.digest_count(), "inventory read");
                    self.inv.set(name, inv);
                }
                Ok(Err(err)) => {
                    tracing::warn!(registry = %name, error = %err, "registry read failed");
                    self.inv.set(name.clone(), RegInvImage::new());
                    self.errors.push(SyncError::Read {
                        registry: name,
                        source: err,
                    });
                }
                Err(err) => {
                    tracing::error!(registry = %name, error = %err, "inventory read task died");
                    self.inv.set(name.clone(), RegInvImage::new());
                    self.errors
                        .push(SyncError::Task(format!("inventory read for '{name}': {err}")));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
