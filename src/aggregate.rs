// Summary statistics over a slice of readings: mean/std/min/max per channel.
// Pure functions; no filtering happens here (the report pipeline drops rows itself).

use crate::models::{AggregateSummary, Channel, ChannelStats, Reading};

/// Summarises every channel of `readings`.
///
/// Empty input yields NaN in every field, a single row yields std 0, and any
/// non-finite value turns that channel's statistics into NaN.
pub fn summarize(readings: &[Reading]) -> AggregateSummary {
    let stats = |channel: Channel| {
        let values: Vec<f64> = readings.iter().map(|r| r.value(channel)).collect();
        channel_stats(&values)
    };
    AggregateSummary {
        count: readings.len(),
        heart_rate: stats(Channel::HeartRate),
        temperature: stats(Channel::Temperature),
        ecg: stats(Channel::Ecg),
        spo2: stats(Channel::Spo2),
    }
}

/// Statistics for one column of values. Std is the sample standard deviation.
pub fn channel_stats(values: &[f64]) -> ChannelStats {
    if values.is_empty() {
        return ChannelStats::UNDEFINED;
    }
    if values.iter().any(|v| !v.is_finite()) {
        return ChannelStats::UNDEFINED;
    }
    let mean = mean_f64(values);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    ChannelStats {
        mean,
        std: sample_std(values, mean),
        min,
        max,
    }
}

pub(crate) fn mean_f64(v: &[f64]) -> f64 {
    if v.is_empty() {
        return f64::NAN;
    }
    v.iter().sum::<f64>() / (v.len() as f64)
}

fn sample_std(v: &[f64], mean: f64) -> f64 {
    if v.len() < 2 {
        return 0.0;
    }
    let ss: f64 = v.iter().map(|x| (x - mean) * (x - mean)).sum();
    (ss / (v.len() - 1) as f64).sqrt()
}

/// Pearson correlation of two equally long columns. NaN when either column is constant
/// or fewer than two rows are available.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return f64::NAN;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let (ma, mb) = (mean_f64(a), mean_f64(b));
    let mut cov = 0.0;
    let mut va = 0.0;
    let mut vb = 0.0;
    for (x, y) in a.iter().zip(b) {
        cov += (x - ma) * (y - mb);
        va += (x - ma) * (x - ma);
        vb += (y - mb) * (y - mb);
    }
    if va == 0.0 || vb == 0.0 {
        return f64::NAN;
    }
    cov / (va.sqrt() * vb.sqrt())
}
