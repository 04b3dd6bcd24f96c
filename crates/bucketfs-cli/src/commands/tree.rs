use anyhow::Result;
use clap::Args as ClapArgs;

use bucketfs_core::Session;
use bucketfs_core::crawl::WalkProgress;
use bucketfs_core::size::format_size;

use crate::GlobalOptions;
use crate::output::{crawl_message, crawl_spinner, render_tree, report_walk_problems};

#[derive(ClapArgs)]
pub struct Args {
    /// Starting directory (default: current)
    #[arg(default_value = ".")]
    pub path: String,

    /// Maximum depth to display
    #[arg(short, long, default_value_t = 3)]
    pub depth: usize,
}

pub async fn execute(session: &Session, args: &Args, global: GlobalOptions) -> Result<()> {
    let spinner = crawl_spinner(global.quiet);
    let progress = |p: &WalkProgress| spinner.set_message(crawl_message(p));
    let view = session
        .tree(Some(args.path.as_str()), args.depth, Some(&progress))
        .await;
    spinner.finish_and_clear();

    print!("{}", render_tree(&view.tree));
    let usage = view.tree.usage(view.tree.root());
    println!(
        "\n{} directories, {} files, {}",
        view.walk.all_dirs.len(),
        usage.files,
        format_size(usage.bytes)
    );
    report_walk_problems(&view.walk);
    Ok(())
}
