use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Args as ClapArgs;

use bucketfs_core::Session;
use bucketfs_core::session::CAT_CONFIRM_BYTES;

#[derive(ClapArgs)]
pub struct Args {
    /// Object to print
    pub path: String,

    /// Print objects above 1MB too
    #[arg(short, long)]
    pub force: bool,
}

pub async fn execute(session: &Session, args: &Args) -> Result<()> {
    let limit = (!args.force).then_some(CAT_CONFIRM_BYTES);
    let (_, data) = session
        .read(&args.path, limit)
        .await
        .with_context(|| {
            format!(
                "Cannot print {} (use --force for large objects, or peek)",
                args.path
            )
        })?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(&data)?;
    stdout.flush()?;
    Ok(())
}
