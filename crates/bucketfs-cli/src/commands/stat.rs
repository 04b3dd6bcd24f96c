use anyhow::Result;
use clap::Args as ClapArgs;

use bucketfs_core::Session;
use bucketfs_core::size::format_size;

use crate::output::{create_table, format_time};

#[derive(ClapArgs)]
pub struct Args {
    /// Object to describe
    pub path: String,
}

pub async fn execute(session: &Session, args: &Args) -> Result<()> {
    let (key, meta) = session.stat(&args.path).await?;

    let mut table = create_table();
    table.set_header(vec!["Property", "Value"]);
    table.add_row(vec!["Key".to_string(), format!("/{key}")]);
    table.add_row(vec![
        "Size".to_string(),
        format!("{} ({} bytes)", format_size(meta.size), meta.size),
    ]);
    table.add_row(vec!["Modified".to_string(), format_time(meta.last_modified)]);
    table.add_row(vec!["Content-Type".to_string(), meta.content_type]);
    println!("{table}");
    Ok(())
}
