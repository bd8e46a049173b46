// Chart-ready view data. Each view is a plain function over a reading slice; ViewSelection
// picks which ones a request wants. Rendering itself happens client-side.

use serde::{Deserialize, Serialize};

use crate::aggregate::pearson;
use crate::models::{Channel, Reading};

const HISTOGRAM_BINS: usize = 50;
const DENSITY_POINTS: usize = 64;

/// Channels shown by the distribution views (ECG has its own signal view).
const DISTRIBUTION_CHANNELS: [Channel; 3] =
    [Channel::HeartRate, Channel::Temperature, Channel::Spo2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewSelection {
    pub time_series: bool,
    pub histograms: bool,
    pub scatter_plots: bool,
    pub box_plots: bool,
    pub violin_plots: bool,
    pub heatmap: bool,
    pub ecg_signal: bool,
}

impl Default for ViewSelection {
    fn default() -> Self {
        Self {
            time_series: true,
            histograms: true,
            scatter_plots: true,
            box_plots: true,
            violin_plots: true,
            heatmap: true,
            ecg_signal: true,
        }
    }
}

/// (row index, value) points of one channel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    pub title: String,
    pub channel: Channel,
    pub points: Vec<(usize, f64)>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Histogram {
    pub title: String,
    pub channel: Channel,
    pub bins: Vec<HistogramBin>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scatter {
    pub title: String,
    pub x: Channel,
    pub y: Channel,
    pub points: Vec<(f64, f64)>,
}

/// Five-number summary for box plots.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxStats {
    pub channel: Channel,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violin {
    pub channel: Channel,
    pub quartiles: BoxStats,
    /// (value, estimated density) pairs from a Gaussian kernel density estimate.
    pub density: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationHeatmap {
    pub labels: Vec<&'static str>,
    pub matrix: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewBundle {
    pub rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_series: Option<Vec<Series>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub histograms: Option<Vec<Histogram>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scatter_plots: Option<Vec<Scatter>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub box_plots: Option<Vec<BoxStats>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violin_plots: Option<Vec<Violin>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heatmap: Option<CorrelationHeatmap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ecg_signal: Option<Series>,
}

/// Runs every selected view over `readings`.
pub fn build(selection: &ViewSelection, readings: &[Reading]) -> ViewBundle {
    ViewBundle {
        rows: readings.len(),
        time_series: selection.time_series.then(|| time_series(readings)),
        histograms: selection.histograms.then(|| histograms(readings)),
        scatter_plots: selection.scatter_plots.then(|| scatter_plots(readings)),
        box_plots: selection.box_plots.then(|| box_plots(readings)),
        violin_plots: selection.violin_plots.then(|| violin_plots(readings)),
        heatmap: selection.heatmap.then(|| heatmap(readings)),
        ecg_signal: selection.ecg_signal.then(|| ecg_signal(readings)),
    }
}

pub fn time_series(readings: &[Reading]) -> Vec<Series> {
    DISTRIBUTION_CHANNELS
        .iter()
        .map(|c| series(readings, *c))
        .collect()
}

pub fn ecg_signal(readings: &[Reading]) -> Series {
    series(readings, Channel::Ecg)
}

fn series(readings: &[Reading], channel: Channel) -> Series {
    Series {
        title: format!("{} over Time", channel.label()),
        channel,
        points: readings
            .iter()
            .enumerate()
            .map(|(i, r)| (i, r.value(channel)))
            .collect(),
    }
}

pub fn histograms(readings: &[Reading]) -> Vec<Histogram> {
    DISTRIBUTION_CHANNELS
        .iter()
        .map(|c| Histogram {
            title: format!("{} Distribution", c.label()),
            channel: *c,
            bins: histogram_bins(&finite_column(readings, *c), HISTOGRAM_BINS),
        })
        .collect()
}

/// Equal-width bins over [min, max]; the last bin is closed on the right.
pub fn histogram_bins(values: &[f64], nbins: usize) -> Vec<HistogramBin> {
    if values.is_empty() || nbins == 0 {
        return Vec::new();
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        return vec![HistogramBin {
            start: min,
            end: max,
            count: values.len(),
        }];
    }
    let width = (max - min) / nbins as f64;
    let mut counts = vec![0usize; nbins];
    for v in values {
        let idx = (((v - min) / width) as usize).min(nbins - 1);
        counts[idx] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            start: min + i as f64 * width,
            end: min + (i + 1) as f64 * width,
            count,
        })
        .collect()
}

pub fn scatter_plots(readings: &[Reading]) -> Vec<Scatter> {
    [
        (Channel::HeartRate, Channel::Temperature),
        (Channel::HeartRate, Channel::Spo2),
    ]
    .iter()
    .map(|(x, y)| Scatter {
        title: format!("{} vs {}", x.label(), y.label()),
        x: *x,
        y: *y,
        points: readings.iter().map(|r| (r.value(*x), r.value(*y))).collect(),
    })
    .collect()
}

pub fn box_plots(readings: &[Reading]) -> Vec<BoxStats> {
    DISTRIBUTION_CHANNELS
        .iter()
        .filter_map(|c| box_stats(*c, &finite_column(readings, *c)))
        .collect()
}

/// None for an empty column. Quartiles use linear interpolation between order statistics.
pub fn box_stats(channel: Channel, values: &[f64]) -> Option<BoxStats> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(BoxStats {
        channel,
        min: sorted[0],
        q1: quantile(&sorted, 0.25),
        median: quantile(&sorted, 0.5),
        q3: quantile(&sorted, 0.75),
        max: sorted[sorted.len() - 1],
    })
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

pub fn violin_plots(readings: &[Reading]) -> Vec<Violin> {
    DISTRIBUTION_CHANNELS
        .iter()
        .filter_map(|c| {
            let values = finite_column(readings, *c);
            let quartiles = box_stats(*c, &values)?;
            Some(Violin {
                channel: *c,
                quartiles,
                density: kernel_density(&values, DENSITY_POINTS),
            })
        })
        .collect()
}

/// Gaussian KDE on an even grid spanning the data, Silverman's rule-of-thumb bandwidth.
fn kernel_density(values: &[f64], points: usize) -> Vec<(f64, f64)> {
    let n = values.len();
    if n == 0 || points < 2 {
        return Vec::new();
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
    let bandwidth = {
        let h = 1.06 * var.sqrt() * (n as f64).powf(-0.2);
        if h > 0.0 { h } else { 1.0 }
    };
    let min = values.iter().copied().fold(f64::INFINITY, f64::min) - 3.0 * bandwidth;
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max) + 3.0 * bandwidth;
    let step = (max - min) / (points - 1) as f64;
    let norm = 1.0 / (n as f64 * bandwidth * (2.0 * std::f64::consts::PI).sqrt());

    (0..points)
        .map(|i| {
            let x = min + i as f64 * step;
            let density: f64 = values
                .iter()
                .map(|v| {
                    let u = (x - v) / bandwidth;
                    (-0.5 * u * u).exp()
                })
                .sum::<f64>()
                * norm;
            (x, density)
        })
        .collect()
}

/// Pearson correlation between every pair of channels. Constant columns give NaN (null in JSON).
/// Pairwise-complete correlations: each cell only uses rows where both channels are finite.
pub fn heatmap(readings: &[Reading]) -> CorrelationHeatmap {
    let matrix = Channel::ALL
        .iter()
        .map(|a| {
            Channel::ALL
                .iter()
                .map(|b| pairwise_pearson(readings, *a, *b))
                .collect()
        })
        .collect();
    CorrelationHeatmap {
        labels: Channel::ALL.iter().map(|c| c.label()).collect(),
        matrix,
    }
}

fn pairwise_pearson(readings: &[Reading], a: Channel, b: Channel) -> f64 {
    let (xs, ys): (Vec<f64>, Vec<f64>) = readings
        .iter()
        .map(|r| (r.value(a), r.value(b)))
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .unzip();
    pearson(&xs, &ys)
}

fn finite_column(readings: &[Reading], channel: Channel) -> Vec<f64> {
    readings
        .iter()
        .map(|r| r.value(channel))
        .filter(|v| v.is_finite())
        .collect()
}
