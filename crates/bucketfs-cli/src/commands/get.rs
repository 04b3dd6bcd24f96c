//! Get command - download one object, or every match of a pattern.
//!
//! A pattern may only use wildcards in its last segment: `logs/*.gz`
//! matches files directly inside `logs/`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use bucketfs_core::Session;
use bucketfs_core::path::has_wildcards;

use super::finish_batch;
use crate::GlobalOptions;
use crate::output::transfer_bar;

#[derive(ClapArgs)]
pub struct Args {
    /// Object key or wildcard pattern
    pub remote: String,

    /// Local file or directory (default: current directory)
    pub local: Option<PathBuf>,
}

#[instrument(level = "info", name = "cmd::get", skip_all, fields(remote = %args.remote))]
pub async fn execute(session: &Session, args: &Args, global: GlobalOptions) -> Result<()> {
    if !has_wildcards(&args.remote) {
        let path = session
            .get(&args.remote, args.local.as_deref())
            .await
            .with_context(|| format!("Failed to download {}", args.remote))?;
        if !global.quiet {
            eprintln!("Downloaded {}", path.display());
        }
        return Ok(());
    }

    let dest = args.local.clone().unwrap_or_else(|| PathBuf::from("."));
    let bar = transfer_bar(0, global.quiet);
    let progress = |done: usize, total: usize, key: &str| {
        bar.set_length(total as u64);
        bar.set_position(done as u64);
        bar.set_message(key.to_string());
    };
    let outcome = session
        .get_matching(&args.remote, &dest, Some(&progress))
        .await?;
    bar.finish_and_clear();

    if outcome.total() == 0 {
        anyhow::bail!("No files match {}", args.remote);
    }
    if !global.quiet {
        eprintln!(
            "Downloaded {} of {} files to {}",
            outcome.succeeded.len(),
            outcome.total(),
            dest.display()
        );
    }
    finish_batch(&outcome, session.cancel_flag().is_cancelled())
}
