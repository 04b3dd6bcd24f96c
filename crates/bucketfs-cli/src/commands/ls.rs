//! List command - list the contents of a directory.
//!
//! # Examples
//!
//! ```bash
//! # List the root
//! bucketfs --store ~/bucket ls
//!
//! # Newest files first, with details
//! bucketfs --store ~/bucket ls -l --sort date logs/
//!
//! # Page through a huge directory 100 entries at a time
//! bucketfs --store ~/bucket ls --limit 100 events/
//! bucketfs --store ~/bucket ls --limit 100 --after 'events/0099.json' events/
//!
//! # JSON for scripting
//! bucketfs --store ~/bucket ls --json | jq '.files[].name'
//! ```

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use serde::Serialize;
use tracing::instrument;

use bucketfs_core::size::format_size;
use bucketfs_core::{FileEntry, Listing, PageToken, Session, SortKey};

use crate::output::{align_right, create_table, format_time};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Directory to list (default: root)
    #[arg(default_value = "/")]
    pub path: String,

    /// Show size, modification time and content type
    #[arg(short, long)]
    pub long: bool,

    /// File order: name, date (newest first) or size (largest first)
    #[arg(long, default_value_t = SortKey::Name)]
    pub sort: SortKey,

    /// Fetch a single page of at most N entries (uncached)
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Continue a paged listing after this token
    #[arg(long, value_name = "TOKEN", requires = "limit")]
    pub after: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct LsOutput<'a> {
    prefix: &'a str,
    directories: &'a [String],
    files: &'a [FileEntry],
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

#[instrument(level = "info", name = "cmd::ls", skip_all, fields(path = %args.path))]
pub async fn execute(session: &Session, args: &Args) -> Result<()> {
    let prefix = session.resolve_dir(&args.path);
    let listing = match args.limit {
        Some(limit) => {
            let token = args.after.as_deref().map(PageToken::new);
            session
                .list_page(&prefix, args.sort, limit, token.as_ref())
                .await
        }
        None => session.list(&prefix, args.sort).await,
    }
    .with_context(|| format!("Failed to list /{prefix}"))?;

    if args.json {
        let out = LsOutput {
            prefix: &prefix,
            directories: &listing.directories,
            files: &listing.files,
            next_token: listing.next_token.as_ref().map(PageToken::as_str),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if args.long {
        print_long(&listing);
    } else {
        print_short(&listing);
    }
    if let Some(token) = &listing.next_token {
        eprintln!(
            "More entries: --limit {} --after '{}'",
            args.limit.unwrap_or_default(),
            token.as_str()
        );
    }
    Ok(())
}

fn print_short(listing: &Listing) {
    for dir in &listing.directories {
        println!("{dir}/");
    }
    for file in &listing.files {
        println!("{}", file.name);
    }
}

fn print_long(listing: &Listing) {
    let mut table = create_table();
    table.set_header(vec!["Type", "Name", "Size", "Modified", "Content-Type"]);
    for dir in &listing.directories {
        table.add_row(vec![
            "d".to_string(),
            format!("{dir}/"),
            String::new(),
            String::new(),
            String::new(),
        ]);
    }
    for file in &listing.files {
        table.add_row(vec![
            "-".to_string(),
            file.name.clone(),
            format_size(file.size),
            format_time(file.last_modified),
            file.content_type.clone().unwrap_or_default(),
        ]);
    }
    align_right(&mut table, 2);
    println!("{table}");
    println!(
        "{} directories, {} files, {}",
        listing.directories.len(),
        listing.files.len(),
        format_size(listing.files.iter().map(|f| f.size).sum())
    );
}
