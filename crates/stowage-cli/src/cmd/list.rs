use chrono::Utc;
use comfy_table::Cell;

use stowage_core::app::{self, RuntimeConfig};
use stowage_core::retention::is_expired;

use super::CmdResult;
use crate::format::{format_age, format_bytes};
use crate::table::CliTableTheme;

pub(crate) fn run_list(runtime: &RuntimeConfig) -> CmdResult {
    let cfg = &runtime.resolved;
    let store = app::open_store(cfg)?;
    let objects = store.list("")?;

    if objects.is_empty() {
        println!("No backups found in {}.", store.describe());
        return Ok(true);
    }

    let now = Utc::now();
    let retention_days = cfg.job.retention_days;
    let theme = CliTableTheme::detect();
    let mut table = theme.new_data_table(&["Key", "Size", "Last modified", "Age", "Retention"]);

    let mut expired = 0usize;
    let mut total = 0u64;
    for object in &objects {
        let purge = is_expired(object, retention_days, now);
        expired += usize::from(purge);
        total += object.size_bytes;
        table.add_row(vec![
            Cell::new(&object.key),
            Cell::new(format_bytes(object.size_bytes)),
            Cell::new(object.last_modified.format("%Y-%m-%d %H:%M:%S UTC")),
            Cell::new(format_age(now - object.last_modified)),
            Cell::new(if purge { "purge" } else { "keep" }),
        ]);
    }
    println!("{table}");
    println!(
        "{} object(s), {} total, {expired} older than {retention_days} day(s) in {}",
        objects.len(),
        format_bytes(total),
        store.describe()
    );
    Ok(true)
}
