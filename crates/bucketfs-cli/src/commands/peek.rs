use std::io::{self, Write};

use anyhow::Result;
use clap::Args as ClapArgs;

use bucketfs_core::Session;

#[derive(ClapArgs)]
pub struct Args {
    /// Object to read
    pub path: String,

    /// Number of bytes to show (default 2048, at most 10MB)
    pub bytes: Option<u64>,
}

pub async fn execute(session: &Session, args: &Args) -> Result<()> {
    let (_, data) = session.peek(&args.path, args.bytes).await?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(&data)?;
    if !data.ends_with(b"\n") {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}
