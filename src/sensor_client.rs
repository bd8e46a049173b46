// Sensor device client: GET {endpoint}/data -> {heartRate, temperature, ecg, spo2}.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Deserializer};
use tracing::instrument;

use crate::error::PollError;
use crate::models::Reading;

/// Where the poller gets one reading per tick.
#[async_trait]
pub trait ReadingSource: Send + Sync {
    async fn fetch(&self) -> Result<Reading, PollError>;
}

/// Device payload. Channels may arrive as JSON numbers or numeric strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceReading {
    #[serde(deserialize_with = "number_or_string")]
    heart_rate: f64,
    #[serde(deserialize_with = "number_or_string")]
    temperature: f64,
    #[serde(deserialize_with = "number_or_string")]
    ecg: f64,
    #[serde(deserialize_with = "number_or_string")]
    spo2: f64,
}

fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Str(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Num(v) => Ok(v),
        Raw::Str(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}

/// Parses a device response body into a reading stamped with the current wall-clock time.
pub fn parse_device_body(body: &str) -> Result<Reading, PollError> {
    let raw: DeviceReading = serde_json::from_str(body)
        .map_err(|e| PollError::MalformedResponse(format!("invalid body: {}", e)))?;
    let reading = Reading::new(raw.heart_rate, raw.temperature, raw.ecg, raw.spo2, Utc::now());
    if !reading.is_finite() {
        return Err(PollError::MalformedResponse(
            "non-finite channel value".into(),
        ));
    }
    Ok(reading)
}

/// Prepends `http://` when the endpoint has no scheme and strips trailing slashes.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

pub struct HttpSensorClient {
    client: reqwest::Client,
    data_url: String,
}

impl HttpSensorClient {
    /// Client for `endpoint` whose every request is bounded by `timeout`.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, PollError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PollError::Connection(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            data_url: format!("{}/data", normalize_endpoint(endpoint)),
        })
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }
}

#[async_trait]
impl ReadingSource for HttpSensorClient {
    #[instrument(skip(self), fields(operation = "fetch_reading", url = %self.data_url))]
    async fn fetch(&self) -> Result<Reading, PollError> {
        let resp = self
            .client
            .get(&self.data_url)
            .send()
            .await
            .map_err(|e| PollError::Connection(e.to_string()))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(PollError::MalformedResponse(format!(
                "unexpected status {}",
                status
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| PollError::Connection(format!("reading body: {}", e)))?;
        parse_device_body(&body)
    }
}
