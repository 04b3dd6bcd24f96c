//! Disk usage per immediate subdirectory, from a single crawl.

use anyhow::Result;
use clap::Args as ClapArgs;

use bucketfs_core::Session;
use bucketfs_core::crawl::WalkProgress;
use bucketfs_core::path;
use bucketfs_core::size::format_size;

use crate::GlobalOptions;
use crate::output::{align_right, crawl_message, crawl_spinner, create_table, report_walk_problems};

#[derive(ClapArgs)]
pub struct Args {
    /// Directory to measure (default: current)
    #[arg(default_value = ".")]
    pub path: String,

    /// Crawl depth; deeper content is not counted
    #[arg(short, long, default_value_t = 50)]
    pub depth: usize,
}

pub async fn execute(session: &Session, args: &Args, global: GlobalOptions) -> Result<()> {
    let spinner = crawl_spinner(global.quiet);
    let progress = |p: &WalkProgress| spinner.set_message(crawl_message(p));
    let view = session
        .tree(Some(args.path.as_str()), args.depth, Some(&progress))
        .await;
    spinner.finish_and_clear();

    let tree = &view.tree;
    let root = tree.root();
    let mut rows: Vec<(String, u64, u64)> = tree
        .node(root)
        .map(|node| {
            node.directories
                .iter()
                .map(|dir| {
                    let usage = tree.usage(dir);
                    (format!("{}/", path::dir_name(dir)), usage.files, usage.bytes)
                })
                .collect()
        })
        .unwrap_or_default();
    rows.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));

    let mut table = create_table();
    table.set_header(vec!["Directory", "Files", "Size"]);
    for (name, files, bytes) in &rows {
        table.add_row(vec![name.clone(), files.to_string(), format_size(*bytes)]);
    }
    if let Some(node) = tree.node(root)
        && !node.files.is_empty()
    {
        let bytes = node.files.iter().map(|f| f.size).sum();
        table.add_row(vec![
            "(files here)".to_string(),
            node.files.len().to_string(),
            format_size(bytes),
        ]);
    }
    let total = tree.usage(root);
    table.add_row(vec![
        "Total".to_string(),
        total.files.to_string(),
        format_size(total.bytes),
    ]);
    align_right(&mut table, 1);
    align_right(&mut table, 2);
    println!("{table}");

    if !view.walk.is_complete() {
        println!("(partial: some directories could not be listed)");
    }
    report_walk_problems(&view.walk);
    Ok(())
}
