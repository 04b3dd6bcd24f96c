//! Diff command - compare two files, local or remote.
//!
//! Paths starting with `./`, `../`, `~/` or `/` are local files; anything
//! else is resolved in the store.
//!
//! ```bash
//! # Remote object against a local copy
//! bucketfs --store ~/bucket diff config/app.toml ./app.toml
//!
//! # Two remote objects
//! bucketfs --store ~/bucket diff releases/v1.bin releases/v2.bin
//! ```

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use bucketfs_core::size::format_size;
use bucketfs_core::{DiffReport, Session};

use crate::output::{align_right, create_table};

/// Hex digits of the hash shown for binary files.
const HASH_PREFIX_LEN: usize = 16;

#[derive(ClapArgs)]
pub struct Args {
    /// First file
    pub left: String,

    /// Second file
    pub right: String,
}

#[instrument(level = "info", name = "cmd::diff", skip_all, fields(left = %args.left, right = %args.right))]
pub async fn execute(session: &Session, args: &Args) -> Result<()> {
    let report = session
        .diff(&args.left, &args.right)
        .await
        .with_context(|| format!("Failed to compare {} and {}", args.left, args.right))?;

    if let Some(unified) = &report.unified {
        print!("{unified}");
    } else if !report.is_text() {
        print_binary(&report);
    }

    if report.is_identical() {
        println!("Files are identical.");
    } else if !report.is_text() {
        println!("Files differ.");
    }
    Ok(())
}

fn print_binary(report: &DiffReport) {
    let mut table = create_table();
    table.set_header(vec!["File", "Size", "SHA-256"]);
    for file in [&report.left, &report.right] {
        table.add_row(vec![
            file.name.clone(),
            format_size(file.size),
            file.sha256[..HASH_PREFIX_LEN].to_string(),
        ]);
    }
    align_right(&mut table, 1);
    println!("{table}");
}
