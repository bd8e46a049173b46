// Vital-sign reading and channel identifiers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the four measured channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    HeartRate,
    Temperature,
    Ecg,
    Spo2,
}

impl Channel {
    /// Column order used everywhere (CSV, tables, correlation matrix).
    pub const ALL: [Channel; 4] = [
        Channel::HeartRate,
        Channel::Temperature,
        Channel::Ecg,
        Channel::Spo2,
    ];

    /// Human-facing column label (CSV header, report table).
    pub fn label(self) -> &'static str {
        match self {
            Channel::HeartRate => "Heart Rate",
            Channel::Temperature => "Temperature",
            Channel::Ecg => "ECG",
            Channel::Spo2 => "SpO2",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Channel::HeartRate => "bpm",
            Channel::Temperature => "°C",
            Channel::Ecg => "mV",
            Channel::Spo2 => "%",
        }
    }
}

/// A single timestamped sample. Values are stored as received; physiological
/// range is not checked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub heart_rate: f64,
    pub temperature: f64,
    pub ecg: f64,
    pub spo2: f64,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn new(
        heart_rate: f64,
        temperature: f64,
        ecg: f64,
        spo2: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            heart_rate,
            temperature,
            ecg,
            spo2,
            timestamp,
        }
    }

    /// All-zero reading that seeds an empty buffer.
    pub fn placeholder() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0, Utc::now())
    }

    pub fn value(&self, channel: Channel) -> f64 {
        match channel {
            Channel::HeartRate => self.heart_rate,
            Channel::Temperature => self.temperature,
            Channel::Ecg => self.ecg,
            Channel::Spo2 => self.spo2,
        }
    }

    /// Channel values in `Channel::ALL` order.
    pub fn channels(&self) -> [f64; 4] {
        [self.heart_rate, self.temperature, self.ecg, self.spo2]
    }

    pub fn is_finite(&self) -> bool {
        self.channels().iter().all(|v| v.is_finite())
    }

    pub fn is_placeholder(&self) -> bool {
        self.channels().iter().all(|v| *v == 0.0)
    }

    /// Milliseconds since the Unix epoch (storage representation).
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}
