// Summary statistics

mod common;

use common::reading;
use vitals_dashboard::aggregate::summarize;
use vitals_dashboard::models::Channel;

#[test]
fn two_rows_summary() {
    let rows = [reading(60.0, 36.5, 1.0, 98.0), reading(80.0, 37.0, 1.2, 97.0)];
    let s = summarize(&rows);
    assert_eq!(s.count, 2);
    assert_eq!(s.heart_rate.mean, 70.0);
    assert_eq!(s.heart_rate.min, 60.0);
    assert_eq!(s.heart_rate.max, 80.0);
    assert!(s.heart_rate.std > 0.0);
    assert!((s.temperature.mean - 36.75).abs() < 1e-9);
    assert_eq!(s.spo2.min, 97.0);
    assert!(s.is_defined());
}

#[test]
fn empty_input_is_undefined_not_a_panic() {
    let s = summarize(&[]);
    assert_eq!(s.count, 0);
    assert!(!s.is_defined());
    for c in Channel::ALL {
        assert!(s.channel(c).mean.is_nan());
    }
}

#[test]
fn single_row_has_zero_std() {
    let s = summarize(&[reading(72.0, 36.6, 1.1, 99.0)]);
    assert_eq!(s.heart_rate.std, 0.0);
    assert_eq!(s.heart_rate.min, s.heart_rate.max);
}

#[test]
fn non_finite_value_only_poisons_its_channel() {
    let s = summarize(&[reading(72.0, f64::NAN, 1.1, 99.0), reading(74.0, 36.6, 1.0, 98.0)]);
    assert!(s.temperature.mean.is_nan());
    assert_eq!(s.heart_rate.mean, 73.0);
    assert!(!s.is_defined());
}

#[test]
fn summary_json_uses_null_for_undefined() {
    let json = serde_json::to_value(summarize(&[])).unwrap();
    assert!(json["heartRate"]["mean"].is_null());
    assert_eq!(json["count"], 0);
}
