//! Info command - store statistics, access probe and cache contents.
//!
//! Runs the warm-up crawl and the statistics job in the background, the way
//! an interactive session starts, and reports once both have settled.

use anyhow::Result;
use clap::Args as ClapArgs;

use bucketfs_core::session::{CacheSummary, CrawlStatus, Permissions, StatsStatus};
use bucketfs_core::size::format_size;
use bucketfs_core::Session;

use crate::GlobalOptions;
use crate::output::{create_table, crawl_spinner};

#[derive(ClapArgs)]
pub struct Args {
    /// Depth of the warm-up crawl (default: from config)
    #[arg(short, long)]
    pub depth: Option<usize>,

    /// Number of extensions to list
    #[arg(long, default_value_t = 10)]
    pub top: usize,
}

pub async fn execute(session: &Session, args: &Args, global: GlobalOptions) -> Result<()> {
    let depth = args
        .depth
        .unwrap_or(session.config().general.crawl_depth);

    let spinner = crawl_spinner(global.quiet);
    let mut crawl = session.crawl_status();
    let warmup = session.spawn_warmup(depth);
    let stats_job = session.spawn_stats();
    let permissions = session.probe_permissions().await;

    loop {
        let status = crawl.borrow_and_update().clone();
        match status {
            CrawlStatus::Running {
                depth,
                cached_prefixes,
            } => spinner.set_message(format!(
                "Warming cache: depth {depth}, {cached_prefixes} directories listed"
            )),
            CrawlStatus::Complete { .. } | CrawlStatus::Failed { .. } => break,
            CrawlStatus::Pending => {}
        }
        if crawl.changed().await.is_err() {
            break;
        }
    }
    warmup.await?;
    stats_job.await?;
    spinner.finish_and_clear();

    println!("Store: {}", session.store().display_root());
    print_stats(&session.stats_status().borrow());
    print_permissions(permissions);
    print_crawl(&session.crawl_status().borrow());
    print_cache(&session.cache_summary(), args.top);
    Ok(())
}

fn print_stats(status: &StatsStatus) {
    match status {
        StatsStatus::Ready(stats) => {
            let mut table = create_table();
            table.set_header(vec!["Statistic", "Value"]);
            for (name, value) in &stats.entries {
                table.add_row(vec![name.clone(), value.clone()]);
            }
            println!("{table}");
        }
        StatsStatus::Failed { message } => println!("Statistics unavailable: {message}"),
        StatsStatus::Pending | StatsStatus::Loading => println!("Statistics still loading"),
    }
}

fn print_permissions(perms: Permissions) {
    let mark = |ok: bool| if ok { "yes" } else { "no" };
    let mut table = create_table();
    table.set_header(vec!["Permission", "Granted"]);
    table.add_row(vec!["List", mark(perms.list)]);
    table.add_row(vec!["Read", mark(perms.read)]);
    table.add_row(vec!["Statistics", mark(perms.stats)]);
    println!("{table}");
}

fn print_crawl(status: &CrawlStatus) {
    match status {
        CrawlStatus::Complete {
            depth,
            cached_prefixes,
            errors,
        } => {
            print!("Warm-up crawl: {cached_prefixes} directories to depth {depth}");
            if *errors > 0 {
                print!(", {errors} failed");
            }
            println!();
        }
        CrawlStatus::Failed { message } => println!("Warm-up crawl failed: {message}"),
        CrawlStatus::Pending | CrawlStatus::Running { .. } => {
            println!("Warm-up crawl did not finish");
        }
    }
}

fn print_cache(summary: &CacheSummary, top: usize) {
    println!(
        "Cache: {} records, {} directories, {} files, {}",
        summary.records,
        summary.directories,
        summary.files,
        format_size(summary.bytes)
    );
    if summary.extensions.is_empty() {
        return;
    }
    let mut table = create_table();
    table.set_header(vec!["Extension", "Files"]);
    for (ext, count) in summary.extensions.iter().take(top) {
        table.add_row(vec![ext.clone(), count.to_string()]);
    }
    println!("{table}");
}
