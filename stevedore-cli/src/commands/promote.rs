//! `stevedore promote` — reconcile destinations against promotion manifests.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio::sync::broadcast;

use stevedore_registry::{
    DryRunRunner, HttpReader, OpRunner, ProcessRunner, RegistryReader, DEFAULT_TOOL,
};
use stevedore_sync::{run_promotion, PromoteOptions, PromotionOutcome, DEFAULT_THREADS};

/// Arguments for `stevedore promote`.
#[derive(Args, Debug)]
pub struct PromoteArgs {
    /// Manifest file to promote from (repeatable).
    #[arg(long = "manifest", required = true, value_name = "PATH")]
    pub manifests: Vec<PathBuf>,

    /// Worker-pool size for inventory reads and edge execution.
    #[arg(long, default_value_t = DEFAULT_THREADS)]
    pub threads: usize,

    /// Apply the mutations. Without this flag the run is a preview: commands
    /// are logged but never executed.
    #[arg(long)]
    pub confirm: bool,

    /// Permit tag reassignment for every image in the manifests.
    #[arg(long)]
    pub allow_moves: bool,

    /// Delete destination digests not declared by any manifest.
    #[arg(long)]
    pub thin: bool,

    /// Run write commands under each destination's service account.
    #[arg(long)]
    pub use_service_account: bool,

    /// External registry tool binary.
    #[arg(long, default_value = DEFAULT_TOOL)]
    pub tool: String,
}

impl PromoteArgs {
    pub fn run(self) -> Result<()> {
        super::runtime()?.block_on(self.run_async())
    }

    async fn run_async(self) -> Result<()> {
        let options = PromoteOptions {
            manifests: self.manifests,
            threads: self.threads,
            confirm: self.confirm,
            allow_moves: self.allow_moves,
            thin: self.thin,
            use_service_account: self.use_service_account,
            tool: self.tool,
        };

        let reader: Arc<dyn RegistryReader> = Arc::new(HttpReader::new());
        let runner: Arc<dyn OpRunner> = if options.confirm {
            Arc::new(ProcessRunner::new(options.tool.clone()))
        } else {
            Arc::new(DryRunRunner::new(options.tool.clone()))
        };

        // Ctrl-C finishes in-flight edges and cancels the rest.
        let (cancel_tx, cancel_rx) = broadcast::channel(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; no further edges will be dispatched");
                let _ = cancel_tx.send(());
            }
        });

        let confirm = options.confirm;
        let outcome = run_promotion(&options, reader, runner, cancel_rx)
            .await
            .context("running promotion")?;

        print_outcome(&outcome, confirm);
        outcome.into_result()?;
        Ok(())
    }
}

fn print_outcome(outcome: &PromotionOutcome, confirm: bool) {
    let prefix = if confirm { "" } else { "[dry-run] " };

    for err in &outcome.errors {
        eprintln!("{prefix}⚠ {err}");
    }
    for (edge, err) in &outcome.report.failed {
        eprintln!("{prefix}✗ {edge}: {err}");
    }

    let report = &outcome.report;
    if report.total() == 0 && outcome.errors.is_empty() {
        println!("{prefix}✓ up to date, nothing to promote");
        return;
    }

    // In preview mode the "succeeded" edges are the plan; show it.
    if !confirm {
        for edge in &report.succeeded {
            println!("{prefix}~ {edge}");
        }
    }

    println!(
        "{prefix}{} {} promoted, {} failed, {} cancelled",
        if outcome.ok() { "✓" } else { "✗" },
        report.succeeded.len(),
        report.failed.len(),
        report.cancelled.len(),
    );
}
