//! Repository statistics and listings.
//!
//! Renders the `status` and `list` summaries: file and chunk counts, vector
//! storage size, model identity, and per-file rows. Gives confidence that
//! indexing runs are keeping the stores in sync.

use crate::indexer::StatusReport;
use crate::tracker::FileRecord;

/// Print the repository status summary.
pub fn print_status(report: &StatusReport) {
    println!("semdex — Repository Status");
    println!("==========================");
    println!();
    println!("  Root:        {}", report.root.display());
    println!("  Files:       {}", report.file_count);
    println!(
        "  Text files:  {} ({} other)",
        report.text_files,
        report.file_count - report.text_files
    );
    println!("  Chunks:      {}", report.chunk_count);
    println!("  Vectors:     {}", format_bytes(report.storage_bytes));
    match (&report.model, report.embedding_dim) {
        (Some(model), Some(dims)) => println!("  Model:       {} ({} dims)", model, dims),
        _ => println!("  Model:       (nothing indexed yet)"),
    }
    println!();
}

/// Print tracked files, one row each.
pub fn print_list(records: &[FileRecord]) {
    if records.is_empty() {
        println!("No files indexed.");
        return;
    }

    println!(
        "{:<8} {:>8} {:>8}   {:<14} {}",
        "EXT", "SIZE", "CHUNKS", "INDEXED", "PATH"
    );
    println!("{}", "-".repeat(72));
    for r in records {
        println!(
            "{:<8} {:>8} {:>8}   {:<14} {}",
            r.extension,
            format_bytes(r.byte_size.max(0) as u64),
            r.chunk_count,
            format_ts_relative(r.indexed_time),
            r.path
        );
    }
    println!();
    println!("{} file(s)", records.len());
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
