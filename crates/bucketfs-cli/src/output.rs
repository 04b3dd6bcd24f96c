//! Terminal rendering: tables, progress bars and trees.

use std::time::Duration;

use bucketfs_core::crawl::{DirTree, WalkProgress};
use bucketfs_core::path;
use bucketfs_core::size::format_size;
use bucketfs_core::{FileEntry, TraversalResult};
use chrono::{DateTime, Local, Utc};
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{CellAlignment, Table};
use indicatif::{ProgressBar, ProgressStyle};

/// Create a styled table for output
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);
    table
}

/// Right-align the size column of a table built with [`create_table`].
pub fn align_right(table: &mut Table, column: usize) {
    if let Some(col) = table.column_mut(column) {
        col.set_cell_alignment(CellAlignment::Right);
    }
}

pub fn format_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Table of files with name, size and modification time.
pub fn file_table(files: &[(String, &FileEntry)]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Name", "Size", "Modified"]);
    for (name, entry) in files {
        table.add_row(vec![
            name.clone(),
            format_size(entry.size),
            format_time(entry.last_modified),
        ]);
    }
    align_right(&mut table, 1);
    table
}

/// Progress bar for a batch of `total` transfers.
pub fn transfer_bar(total: usize, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("  {spinner} [{bar:30}] {pos}/{len} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░");
    bar.set_style(style);
    bar
}

/// Spinner reporting crawl totals.
pub fn crawl_spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("  {spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"]);
    spinner.set_style(style);
    spinner.set_message("Crawling...");
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

pub fn crawl_message(p: &WalkProgress) -> String {
    format!(
        "Crawling: depth {}, {} directories, {} files, {}",
        p.depth,
        p.directories,
        p.files,
        format_size(p.total_size)
    )
}

/// Warn about listings that failed or a walk that was cut short.
pub fn report_walk_problems(walk: &TraversalResult) {
    for (prefix, error) in &walk.errors {
        let shown = if prefix.is_empty() { "/" } else { prefix };
        eprintln!("warning: cannot list {shown}: {error}");
    }
    if walk.cancelled {
        eprintln!("warning: crawl interrupted, results are partial");
    }
}

/// Render a tree with box-drawing connectors.
pub fn render_tree(tree: &DirTree) -> String {
    let mut out = String::new();
    let root = tree.root();
    out.push_str(if root.is_empty() { "/" } else { root });
    out.push('\n');
    render_children(tree, root, "", &mut out);
    out
}

fn render_children(tree: &DirTree, prefix: &str, indent: &str, out: &mut String) {
    let Some(node) = tree.node(prefix) else {
        return;
    };
    let total = node.directories.len() + node.files.len();
    let mut current = 0;

    for dir in &node.directories {
        current += 1;
        let is_last = current == total;
        let connector = if is_last { "└── " } else { "├── " };
        let expanded = tree.node(dir).is_some_and(|n| n.listed);
        let marker = if expanded { "" } else { " …" };
        out.push_str(&format!("{indent}{connector}{}/{marker}\n", path::dir_name(dir)));

        let child_indent = if is_last {
            format!("{indent}    ")
        } else {
            format!("{indent}│   ")
        };
        render_children(tree, dir, &child_indent, out);
    }

    for file in &node.files {
        current += 1;
        let connector = if current == total { "└── " } else { "├── " };
        out.push_str(&format!(
            "{indent}{connector}{} ({})\n",
            file.name,
            format_size(file.size)
        ));
    }
}
