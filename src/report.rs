// Health report: twelve statistics (heart rate, temperature, SpO2) plus a templated narrative.
// Rows with a zero or missing channel value are dropped before anything is computed.

use serde::Serialize;

use crate::aggregate::summarize;
use crate::error::ReportError;
use crate::models::{AggregateSummary, Channel, Reading};

/// Channels covered by the report, in table order.
const REPORT_CHANNELS: [Channel; 3] = [Channel::HeartRate, Channel::Temperature, Channel::Spo2];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetric {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub rows_used: usize,
    pub rows_dropped: usize,
    pub summary: AggregateSummary,
    pub metrics: Vec<ReportMetric>,
    pub narrative: String,
}

/// Rows the report can use: every channel present and non-zero.
pub fn usable_rows(readings: &[Reading]) -> Vec<Reading> {
    readings
        .iter()
        .filter(|r| r.channels().iter().all(|v| v.is_finite() && *v != 0.0))
        .copied()
        .collect()
}

pub fn generate(readings: &[Reading]) -> Result<HealthReport, ReportError> {
    let rows = usable_rows(readings);
    if rows.is_empty() {
        return Err(ReportError::NoUsableRows);
    }
    let summary = summarize(&rows);

    let mut metrics = Vec::with_capacity(REPORT_CHANNELS.len() * 4);
    for channel in REPORT_CHANNELS {
        let s = summary.channel(channel);
        let label = channel.label();
        metrics.push(metric(format!("Average {}", label), s.mean));
        metrics.push(metric(format!("{} Std Dev", label), s.std));
        metrics.push(metric(format!("Max {}", label), s.max));
        metrics.push(metric(format!("Min {}", label), s.min));
    }

    Ok(HealthReport {
        rows_used: rows.len(),
        rows_dropped: readings.len() - rows.len(),
        narrative: narrative(&summary),
        summary,
        metrics,
    })
}

/// Parses a CSV upload and builds the report from it.
pub fn generate_from_csv(text: &str) -> Result<HealthReport, ReportError> {
    let readings = crate::csv::import(text)?;
    generate(&readings)
}

fn metric(name: String, value: f64) -> ReportMetric {
    ReportMetric { name, value }
}

fn narrative(summary: &AggregateSummary) -> String {
    let mut out = String::from("Analysis:\n---------\n");
    let phrases = [
        (Channel::HeartRate, "heart rate"),
        (Channel::Temperature, "body temperature"),
        (Channel::Spo2, "SpO2"),
    ];
    for (channel, phrase) in phrases {
        let s = summary.channel(channel);
        let unit = channel.unit();
        out.push_str(&format!(
            "- The average {} over the monitoring period was {:.2} {}.\n",
            phrase, s.mean, unit
        ));
        out.push_str(&format!("  - Standard deviation: {:.2}\n", s.std));
        out.push_str(&format!("  - Maximum: {:.2} {}\n", s.max, unit));
        out.push_str(&format!("  - Minimum: {:.2} {}\n\n", s.min, unit));
    }
    out.push_str(
        "Significant deviations from these averages might indicate periods of increased\n\
         physical activity or potential health issues that warrant further investigation.\n\n\
         Recommendations:\n\
         ----------------\n\
         - Maintain regular monitoring to ensure consistent heart rate, temperature, and SpO2.\n\
         - Consult with a healthcare provider if there are significant anomalies or concerns.\n\
         - Maintain a healthy lifestyle with a balanced diet, regular exercise, and adequate rest.\n\n\
         This report is based on the data provided and should not replace professional medical advice.\n",
    );
    out
}

impl HealthReport {
    /// Plain-text document: title, narrative, then the metric table.
    pub fn render_text(&self) -> String {
        let mut out = String::from("Health Report\n=============\n\n");
        out.push_str(&format!(
            "Rows analysed: {} ({} dropped)\n\n",
            self.rows_used, self.rows_dropped
        ));
        out.push_str(&self.narrative);
        out.push_str("\nSummary Table\n-------------\n");
        let width = self
            .metrics
            .iter()
            .map(|m| m.name.len())
            .max()
            .unwrap_or(0);
        for m in &self.metrics {
            out.push_str(&format!("{:<width$}  {:>10.2}\n", m.name, m.value, width = width));
        }
        out
    }
}
