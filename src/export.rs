use crate::stats::history::HistoryEntry;
use anyhow::{Context, Result};
use csv::Writer;
use log::info;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

/// Writes `time,<class...>` rows, one per history entry. Classes are the
/// sorted union over all entries; a class absent from an entry is written as 0.
pub fn write_history<W: Write>(out: W, history: &[HistoryEntry]) -> Result<()> {
    let classes: BTreeSet<&str> = history
        .iter()
        .flat_map(|e| e.counts.keys().map(String::as_str))
        .collect();

    let mut writer = Writer::from_writer(out);
    let mut header = vec!["time"];
    header.extend(classes.iter().copied());
    writer.write_record(&header)?;

    for entry in history {
        let mut row = vec![entry.time.clone()];
        row.extend(
            classes
                .iter()
                .map(|c| entry.counts.get(*c).copied().unwrap_or(0).to_string()),
        );
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

pub fn export_history(path: &Path, history: &[HistoryEntry]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_history(file, history)?;
    info!("Exported {} history entries to {}", history.len(), path.display());
    Ok(())
}
