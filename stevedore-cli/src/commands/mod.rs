pub mod promote;
pub mod snapshot;

use anyhow::{Context, Result};

/// Build the multi-thread runtime the async command bodies run on.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")
}
