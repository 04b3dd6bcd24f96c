use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use bucketfs_core::Session;

use crate::GlobalOptions;

#[derive(ClapArgs)]
pub struct Args {
    /// Local file to upload
    pub local: PathBuf,

    /// Destination key; a trailing '/' keeps the local file name
    #[arg(default_value = "")]
    pub remote: String,
}

#[instrument(level = "info", name = "cmd::put", skip_all, fields(local = %args.local.display()))]
pub async fn execute(session: &Session, args: &Args, global: GlobalOptions) -> Result<()> {
    let key = session
        .put(&args.local, &args.remote)
        .await
        .with_context(|| format!("Failed to upload {}", args.local.display()))?;
    if !global.quiet {
        eprintln!("Uploaded {} to /{key}", args.local.display());
    }
    Ok(())
}
