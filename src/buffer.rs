// In-memory time series for one session.
// Append-only: rows are never reordered, deduplicated or removed; clear() resets to a placeholder.

use crate::models::Reading;

/// Ordered readings of one session. Insertion order is chronological order because
/// a single poll run appends sequentially.
#[derive(Debug, Clone)]
pub struct TimeSeriesBuffer {
    rows: Vec<Reading>,
}

impl TimeSeriesBuffer {
    /// Fresh buffer holding only the zero placeholder.
    pub fn new() -> Self {
        Self {
            rows: vec![Reading::placeholder()],
        }
    }

    /// Buffer seeded from persisted history; falls back to the placeholder when empty.
    pub fn seeded(history: Vec<Reading>) -> Self {
        if history.is_empty() {
            Self::new()
        } else {
            Self { rows: history }
        }
    }

    pub fn append(&mut self, reading: Reading) {
        self.rows.push(reading);
    }

    pub fn snapshot(&self) -> &[Reading] {
        &self.rows
    }

    /// Rows appended after position `cursor`. A cursor at or past the end yields nothing.
    pub fn rows_since(&self, cursor: usize) -> &[Reading] {
        self.rows.get(cursor..).unwrap_or(&[])
    }

    /// Position to pass to the next `rows_since` call.
    pub fn cursor(&self) -> usize {
        self.rows.len()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.rows.push(Reading::placeholder());
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.rows.last()
    }
}

impl Default for TimeSeriesBuffer {
    fn default() -> Self {
        Self::new()
    }
}
