//! Mirror command - download a prefix recursively.
//!
//! # Examples
//!
//! ```bash
//! # Preview what would be fetched
//! bucketfs --store ~/bucket mirror photos ./photos --dry-run
//!
//! # Only images, skipping thumbnails and anything over 20MB
//! bucketfs --store ~/bucket mirror photos ./photos \
//!     --include '*.jpg' --include '*.png' --exclude 'thumb_*' --max-size 20MB
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use bucketfs_core::crawl::WalkProgress;
use bucketfs_core::session::{DEFAULT_MIRROR_DEPTH, MirrorPlan};
use bucketfs_core::size::{format_size, parse_size};
use bucketfs_core::{Glob, MirrorOptions, Session};

use super::finish_batch;
use crate::GlobalOptions;
use crate::output::{crawl_message, crawl_spinner, transfer_bar};

#[allow(clippy::struct_excessive_bools)]
#[derive(ClapArgs)]
pub struct Args {
    /// Remote directory to mirror
    pub prefix: String,

    /// Local destination (default: current directory)
    #[arg(default_value = ".")]
    pub local: PathBuf,

    /// Maximum crawl depth
    #[arg(short, long, default_value_t = DEFAULT_MIRROR_DEPTH)]
    pub depth: usize,

    /// Skip objects larger than this (e.g. 500KB, 100MB, 2GB)
    #[arg(long, default_value = "100MB", value_parser = parse_max_size)]
    pub max_size: u64,

    /// Download objects of any size
    #[arg(long, conflicts_with = "max_size")]
    pub no_max_size: bool,

    /// Only names matching this pattern (repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub include: Vec<String>,

    /// Skip names matching this pattern (repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Put every file directly in the destination
    #[arg(long)]
    pub flat: bool,

    /// Show the plan without downloading
    #[arg(long)]
    pub dry_run: bool,
}

fn parse_max_size(input: &str) -> Result<u64, String> {
    parse_size(input).ok_or_else(|| format!("invalid size '{input}' (examples: 500KB, 100MB, 2GB)"))
}

fn compile(patterns: &[String]) -> Result<Vec<Glob>> {
    patterns
        .iter()
        .map(|p| Glob::new(p).map_err(anyhow::Error::from))
        .collect()
}

#[instrument(level = "info", name = "cmd::mirror", skip_all, fields(prefix = %args.prefix))]
pub async fn execute(session: &Session, args: &Args, global: GlobalOptions) -> Result<()> {
    let options = MirrorOptions {
        depth: args.depth,
        max_size: (!args.no_max_size).then_some(args.max_size),
        include: compile(&args.include)?,
        exclude: compile(&args.exclude)?,
        flat: args.flat,
        dry_run: args.dry_run,
    };

    let spinner = crawl_spinner(global.quiet);
    let walk_progress = |p: &WalkProgress| spinner.set_message(crawl_message(p));
    let bar = transfer_bar(0, global.quiet);
    let transfer_progress = |done: usize, total: usize, key: &str| {
        if done == 1 {
            spinner.finish_and_clear();
        }
        bar.set_length(total as u64);
        bar.set_position(done as u64);
        bar.set_message(key.to_string());
    };

    let outcome = session
        .mirror(
            &args.prefix,
            &args.local,
            &options,
            Some(&walk_progress),
            Some(&transfer_progress),
        )
        .await;
    spinner.finish_and_clear();
    bar.finish_and_clear();

    let plan = &outcome.plan;
    for (prefix, error) in &plan.walk_errors {
        eprintln!("warning: cannot list {prefix}: {error}");
    }

    let Some(transfer) = outcome.transfer else {
        print_plan(plan, args.dry_run);
        return finish_batch(&Default::default(), session.cancel_flag().is_cancelled());
    };

    if !global.quiet {
        eprintln!(
            "Mirrored {} files ({}) into {}",
            transfer.succeeded.len(),
            format_size(plan.download_bytes()),
            args.local.display()
        );
    }
    finish_batch(&transfer, session.cancel_flag().is_cancelled())
}

fn print_plan(plan: &MirrorPlan, dry_run: bool) {
    let heading = if dry_run { "Would download" } else { "Planned" };
    println!(
        "{heading} {} files ({})",
        plan.to_download().count(),
        format_size(plan.download_bytes())
    );
    for item in plan.to_download() {
        println!("  {} ({})", item.key, format_size(item.size));
    }
    let too_large: Vec<_> = plan.too_large().collect();
    if !too_large.is_empty() {
        println!("Skipping {} files above the size limit", too_large.len());
        for item in too_large {
            println!("  {} ({})", item.key, format_size(item.size));
        }
    }
    if plan.filtered > 0 {
        println!("{} files excluded by filters", plan.filtered);
    }
}
