//! Stevedore — declarative container image promotion.
//!
//! # Usage
//!
//! ```text
//! stevedore promote --manifest <path>... [--threads N] [--confirm]
//!                   [--allow-moves] [--thin] [--use-service-account] [--tool BIN]
//! stevedore snapshot <registry> [--format yaml|csv]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{promote::PromoteArgs, snapshot::SnapshotArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "stevedore",
    version,
    about = "Promote container images between registries from declarative manifests",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile destination registries against promotion manifests.
    Promote(PromoteArgs),

    /// Print a registry's observed inventory in canonical form.
    Snapshot(SnapshotArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Promote(args) => args.run(),
        Commands::Snapshot(args) => args.run(),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
