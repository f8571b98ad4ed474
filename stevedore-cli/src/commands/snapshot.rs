//! `stevedore snapshot` — print a registry's observed inventory.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use stevedore_core::RegistryName;
use stevedore_registry::HttpReader;
use stevedore_sync::{snapshot_registry, SnapshotFormat, SnapshotOptions};

/// Arguments for `stevedore snapshot`.
#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Registry to snapshot, e.g. `gcr.io/my-project`.
    pub registry: String,

    /// Output format.
    #[arg(long, default_value = "yaml")]
    pub format: SnapshotFormat,
}

impl SnapshotArgs {
    pub fn run(self) -> Result<()> {
        super::runtime()?.block_on(self.run_async())
    }

    async fn run_async(self) -> Result<()> {
        let options = SnapshotOptions {
            registry: RegistryName::from(self.registry),
            format: self.format,
        };
        let text = snapshot_registry(&options, Arc::new(HttpReader::new()))
            .await
            .with_context(|| format!("snapshot of '{}' failed", options.registry))?;
        print!("{text}");
        Ok(())
    }
}
