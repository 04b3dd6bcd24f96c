pub mod cat;
pub mod diff;
pub mod du;
pub mod find;
pub mod get;
pub mod info;
pub mod ls;
pub mod mirror;
pub mod peek;
pub mod put;
pub mod stat;
pub mod tree;

use anyhow::Result;
use bucketfs_core::TransferOutcome;

use crate::exit_code::CommandFailure;

/// Print per-item problems of a batch and turn them into a command failure.
pub fn finish_batch(outcome: &TransferOutcome, cancelled: bool) -> Result<()> {
    for (key, reason) in &outcome.skipped {
        eprintln!("skipped {key}: {reason}");
    }
    for (key, error) in &outcome.errors {
        eprintln!("failed {key}: {error:#}");
    }
    if cancelled {
        return Err(CommandFailure::Cancelled.into());
    }
    if !outcome.errors.is_empty() {
        return Err(CommandFailure::Partial {
            failed: outcome.errors.len(),
            total: outcome.total(),
        }
        .into());
    }
    Ok(())
}
