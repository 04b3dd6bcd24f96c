use anyhow::Result;
use clap::Args as ClapArgs;

use bucketfs_core::crawl::WalkProgress;
use bucketfs_core::session::DEFAULT_FIND_DEPTH;
use bucketfs_core::Session;

use crate::GlobalOptions;
use crate::exit_code::CommandFailure;
use crate::output::{crawl_message, crawl_spinner, file_table};

#[derive(ClapArgs)]
pub struct Args {
    /// Shell pattern matched against file names, e.g. '*.log'
    pub pattern: String,

    /// Directory to search (default: current)
    #[arg(long)]
    pub path: Option<String>,

    /// Maximum depth to search
    #[arg(short, long, default_value_t = DEFAULT_FIND_DEPTH)]
    pub depth: usize,

    /// Show sizes and modification times
    #[arg(short, long)]
    pub long: bool,
}

pub async fn execute(session: &Session, args: &Args, global: GlobalOptions) -> Result<()> {
    let spinner = crawl_spinner(global.quiet);
    let progress = |p: &WalkProgress| spinner.set_message(crawl_message(p));
    let found = session
        .find(&args.pattern, args.path.as_deref(), args.depth, Some(&progress))
        .await?;
    spinner.finish_and_clear();

    if args.long {
        let rows: Vec<_> = found.matches.iter().map(|(k, e)| (k.clone(), e)).collect();
        println!("{}", file_table(&rows));
    } else {
        for (key, _) in &found.matches {
            println!("{key}");
        }
    }
    if !global.quiet {
        eprintln!(
            "{} matches among {} files",
            found.matches.len(),
            found.scanned
        );
    }
    for (prefix, error) in &found.errors {
        eprintln!("warning: cannot list {prefix}: {error}");
    }
    if found.cancelled {
        return Err(CommandFailure::Cancelled.into());
    }
    Ok(())
}
