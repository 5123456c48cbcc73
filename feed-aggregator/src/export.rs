//! Writers for the displayed feed: JSON lines, or CSV with one column per
//! record field.

use crate::types::{AggregatorError, DateRange, Item, Result};
use serde_json::Value;
use std::io::Write;
use tracing::{debug, info};

pub const SOURCE_TYPE_COLUMN: &str = "source_type";
pub const FORMATTED_TIME_COLUMN: &str = "formatted_time";

/// `source_type`, then every record field in first-seen order, then `formatted_time`.
pub fn csv_columns(items: &[Item]) -> Vec<String> {
    let mut columns = vec![SOURCE_TYPE_COLUMN.to_string()];
    for item in items {
        for name in item.fields.keys() {
            if name != SOURCE_TYPE_COLUMN
                && name != FORMATTED_TIME_COLUMN
                && !columns.iter().any(|c| c == name)
            {
                columns.push(name.clone());
            }
        }
    }
    columns.push(FORMATTED_TIME_COLUMN.to_string());
    columns
}

/// Write `items` as CSV with a header row. Returns the number of data rows.
/// An empty feed is an error rather than a header-only file.
pub fn write_csv<W: Write>(items: &[Item], writer: W) -> Result<usize> {
    if items.is_empty() {
        return Err(AggregatorError::Export("No data found".to_string()));
    }

    let columns = csv_columns(items);
    debug!("Exporting {} items across {} columns", items.len(), columns.len());

    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(&columns)?;
    for item in items {
        let row: Vec<String> = columns.iter().map(|column| cell(item, column)).collect();
        csv.write_record(&row)?;
    }
    csv.flush()?;

    info!("Exported {} rows as CSV", items.len());
    Ok(items.len())
}

/// One JSON object per line. Returns the number of lines written.
pub fn write_jsonl<W: Write>(items: &[Item], mut writer: W) -> Result<usize> {
    for item in items {
        serde_json::to_writer(&mut writer, item)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(items.len())
}

/// CSV exports are scoped to one device and a bounded time window.
pub fn validate_csv_scope(device_id: Option<&str>, date_range: &DateRange) -> Result<()> {
    if device_id.map_or(true, |id| id.trim().is_empty()) {
        return Err(AggregatorError::Export("device_id is required".to_string()));
    }
    if !date_range.is_active() {
        return Err(AggregatorError::Export(
            "A start and end time are required".to_string(),
        ));
    }
    Ok(())
}

fn cell(item: &Item, column: &str) -> String {
    match column {
        SOURCE_TYPE_COLUMN => item.source_type.to_string(),
        FORMATTED_TIME_COLUMN => item.formatted_time().unwrap_or_default(),
        name => match item.fields.get(name) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        },
    }
}
