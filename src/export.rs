use crate::models::{Record, Stored};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};

/// Export the rows of a list view to a CSV file in `dir`.
///
/// Columns are the table columns of the record type plus the record id and
/// its creation time; credentials never appear.
pub fn export_rows<T: Record>(rows: &[Stored<T>], dir: &Path) -> Result<PathBuf> {
    if rows.is_empty() {
        anyhow::bail!("No {} records to export", T::LABEL.to_lowercase());
    }

    // Generate filename with timestamp
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let filename = format!("{}_{}.csv", T::COLLECTION, timestamp);
    let filepath = dir.join(filename);

    let mut headers = vec!["id".to_string(), "created_at".to_string()];
    headers.extend(T::COLUMNS.iter().map(|c| c.to_string()));

    let mut wtr = csv::Writer::from_path(&filepath)
        .with_context(|| format!("Failed to create {}", filepath.display()))?;

    wtr.write_record(&headers)
        .context("Failed to write CSV headers")?;

    for stored in rows {
        let mut record = vec![stored.id.clone(), stored.created_at.to_rfc3339()];
        record.extend(stored.record.cells());

        wtr.write_record(&record)
            .context("Failed to write CSV record")?;
    }

    wtr.flush().context("Failed to flush CSV writer")?;

    Ok(filepath)
}
