// Per-channel summary statistics (derived, never stored)

use serde::{Deserialize, Serialize};

use super::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl ChannelStats {
    /// Result for an empty input: every field NaN.
    pub const UNDEFINED: ChannelStats = ChannelStats {
        mean: f64::NAN,
        std: f64::NAN,
        min: f64::NAN,
        max: f64::NAN,
    };

    pub fn is_defined(&self) -> bool {
        [self.mean, self.std, self.min, self.max]
            .iter()
            .all(|v| !v.is_nan())
    }
}

/// mean/std/min/max for each channel plus the number of rows summarised.
/// JSON serialization turns NaN into `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSummary {
    pub count: usize,
    pub heart_rate: ChannelStats,
    pub temperature: ChannelStats,
    pub ecg: ChannelStats,
    pub spo2: ChannelStats,
}

impl AggregateSummary {
    pub fn channel(&self, channel: Channel) -> &ChannelStats {
        match channel {
            Channel::HeartRate => &self.heart_rate,
            Channel::Temperature => &self.temperature,
            Channel::Ecg => &self.ecg,
            Channel::Spo2 => &self.spo2,
        }
    }

    /// False for an empty input or when any channel saw a non-finite value.
    pub fn is_defined(&self) -> bool {
        Channel::ALL.iter().all(|c| self.channel(*c).is_defined())
    }
}
