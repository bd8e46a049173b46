// CSV export/import of reading tables.
// Columns: Heart Rate,Temperature,ECG,SpO2[,timestamp]. The first line is always a header.

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::models::{Channel, Reading};

pub const HEADER: &str = "Heart Rate,Temperature,ECG,SpO2,timestamp";

/// Serializes a buffer snapshot, header included, timestamps as RFC 3339.
pub fn export(readings: &[Reading]) -> String {
    let mut out = String::with_capacity(HEADER.len() + 1 + readings.len() * 64);
    out.push_str(HEADER);
    out.push('\n');
    for r in readings {
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            r.heart_rate,
            r.temperature,
            r.ecg,
            r.spo2,
            r.timestamp.to_rfc3339()
        ));
    }
    out
}

/// Parses an uploaded table. The first non-blank line is dropped as the header; blank lines
/// are skipped. Rows without a timestamp column get the import time.
pub fn import(text: &str) -> Result<Vec<Reading>, ValidationError> {
    let now = Utc::now();
    let mut out = Vec::new();
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());
    lines.next();

    for (idx, line) in lines {
        let line_no = idx + 1;
        let cells: Vec<&str> = line.split(',').map(|c| c.trim()).collect();
        if cells.len() != 4 && cells.len() != 5 {
            return Err(ValidationError::ColumnCount {
                line: line_no,
                got: cells.len(),
            });
        }

        let mut values = [0.0f64; 4];
        for (slot, (channel, cell)) in values.iter_mut().zip(Channel::ALL.iter().zip(&cells)) {
            *slot = parse_cell(cell, line_no, *channel)?;
        }

        let timestamp = match cells.get(4) {
            Some(ts) if !ts.is_empty() => parse_timestamp(ts).ok_or_else(|| {
                ValidationError::Timestamp {
                    line: line_no,
                    value: ts.to_string(),
                }
            })?,
            _ => now,
        };

        out.push(Reading::new(
            values[0], values[1], values[2], values[3], timestamp,
        ));
    }
    Ok(out)
}

/// Empty cells count as missing and become NaN; anything else must parse as a number.
fn parse_cell(cell: &str, line: usize, channel: Channel) -> Result<f64, ValidationError> {
    if cell.is_empty() {
        return Ok(f64::NAN);
    }
    cell.parse::<f64>()
        .map_err(|_| ValidationError::NotNumeric {
            line,
            column: channel.label(),
            value: cell.to_string(),
        })
}

/// RFC 3339, or the "YYYY-MM-DD HH:MM:SS[.fff]" form SQLite and spreadsheets produce (UTC).
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
