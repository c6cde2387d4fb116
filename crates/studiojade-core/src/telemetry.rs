//! Aggregation of client performance samples and server response times.
//!
//! Samples are appended to plain lists guarded by one mutex. Once per
//! truncation interval every list is cut down to its most recent
//! `max_samples` entries; this bounds memory and is not a sliding window.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ValidationError;

/// Retention and reporting thresholds.
pub mod thresholds {
    use std::time::Duration;

    /// Samples kept per list after a truncation pass.
    pub const DEFAULT_MAX_SAMPLES: usize = 1000;

    /// How often lists are truncated.
    pub const DEFAULT_TRUNCATE_INTERVAL: Duration = Duration::from_secs(3600);

    /// Minimum sample counts before a percentile is reported instead of `"N/A"`.
    /// Smaller lists make the tail percentiles equal to the maximum.
    pub const P50_MIN_SAMPLES: usize = 1;
    pub const P75_MIN_SAMPLES: usize = 5;
    pub const P95_MIN_SAMPLES: usize = 21;
    pub const P99_MIN_SAMPLES: usize = 101;

    /// Decimal places in reported values. CLS is a unitless score near zero.
    pub const MS_DECIMALS: i32 = 2;
    pub const CLS_DECIMALS: i32 = 4;
}

/// Device classes the dashboard distinguishes; anything else is `other`.
pub const DEVICE_CLASSES: [&str; 3] = ["mobile", "tablet", "desktop"];

/// Connection classes the dashboard distinguishes; anything else is `other`.
pub const CONNECTION_CLASSES: [&str; 6] = ["slow-2g", "2g", "3g", "4g", "wifi", "ethernet"];

const OTHER: &str = "other";

/// A reported statistic, or `"N/A"` when there are too few samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stat {
    Value(f64),
    NotAvailable,
}

impl Serialize for Stat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => serializer.serialize_f64(*v),
            Self::NotAvailable => serializer.serialize_str("N/A"),
        }
    }
}

impl std::fmt::Display for Stat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::NotAvailable => f.write_str("N/A"),
        }
    }
}

/// One browser-reported performance sample. All fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClientSample {
    #[serde(default, alias = "TTFB")]
    pub ttfb: Option<f64>,
    #[serde(default, alias = "FCP")]
    pub fcp: Option<f64>,
    #[serde(default, alias = "LCP")]
    pub lcp: Option<f64>,
    #[serde(default, alias = "FID")]
    pub fid: Option<f64>,
    #[serde(default, alias = "CLS")]
    pub cls: Option<f64>,
    #[serde(default, alias = "pageLoad", alias = "load_time")]
    pub page_load: Option<f64>,
    #[serde(default, alias = "deviceType")]
    pub device: Option<String>,
    #[serde(default, alias = "connectionType", alias = "effectiveType")]
    pub connection: Option<String>,
}

impl ClientSample {
    /// Parse and validate a JSON payload.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ValidationError> {
        if !value.is_object() {
            return Err(ValidationError::invalid_field(
                "body",
                "expected a JSON object",
            ));
        }
        let sample: Self = serde_json::from_value(value)
            .map_err(|e| ValidationError::invalid_field("body", e.to_string()))?;
        sample.validate()?;
        Ok(sample)
    }

    fn numeric_fields(&self) -> [(&'static str, Option<f64>); 6] {
        [
            ("ttfb", self.ttfb),
            ("fcp", self.fcp),
            ("lcp", self.lcp),
            ("fid", self.fid),
            ("cls", self.cls),
            ("page_load", self.page_load),
        ]
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut any = self.device.is_some() || self.connection.is_some();
        for (field, value) in self.numeric_fields() {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(ValidationError::invalid_field(
                        field,
                        "must be a non-negative number",
                    ));
                }
                any = true;
            }
        }
        if any {
            Ok(())
        } else {
            Err(ValidationError::EmptyPayload)
        }
    }
}

fn bucket<'a>(value: &str, known: &[&'a str]) -> &'a str {
    let value = value.trim().to_ascii_lowercase();
    known
        .iter()
        .find(|k| **k == value)
        .copied()
        .unwrap_or(OTHER)
}

/// Device bucket for a reported device class.
pub fn device_bucket(device: &str) -> &'static str {
    bucket(device, &DEVICE_CLASSES)
}

/// Connection bucket for a reported connection class.
pub fn connection_bucket(connection: &str) -> &'static str {
    bucket(connection, &CONNECTION_CLASSES)
}

/// Aggregator retention settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
    pub max_samples: usize,
    pub truncate_interval: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_samples: thresholds::DEFAULT_MAX_SAMPLES,
            truncate_interval: thresholds::DEFAULT_TRUNCATE_INTERVAL,
        }
    }
}

#[derive(Debug, Default)]
struct VitalSamples {
    ttfb: Vec<f64>,
    fcp: Vec<f64>,
    lcp: Vec<f64>,
    fid: Vec<f64>,
    cls: Vec<f64>,
    page_load: Vec<f64>,
}

impl VitalSamples {
    fn lists_mut(&mut self) -> [&mut Vec<f64>; 6] {
        [
            &mut self.ttfb,
            &mut self.fcp,
            &mut self.lcp,
            &mut self.fid,
            &mut self.cls,
            &mut self.page_load,
        ]
    }

    fn retained(&self) -> usize {
        self.ttfb.len()
            + self.fcp.len()
            + self.lcp.len()
            + self.fid.len()
            + self.cls.len()
            + self.page_load.len()
    }
}

#[derive(Debug)]
struct Inner {
    response_times_ms: Vec<f64>,
    vitals: VitalSamples,
    devices: BTreeMap<String, u64>,
    connections: BTreeMap<String, u64>,
    samples_received: u64,
    responses_timed: u64,
    truncations: u64,
    last_truncation: Instant,
}

/// Summary of server-side response times in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseTimeReport {
    pub count: usize,
    pub avg: f64,
    pub p50: Stat,
    pub p95: Stat,
    pub p99: Stat,
}

/// Mean and 75th percentile of one web vital.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VitalReport {
    pub avg: f64,
    pub p75: Stat,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebVitalsReport {
    #[serde(rename = "TTFB")]
    pub ttfb: VitalReport,
    #[serde(rename = "FCP")]
    pub fcp: VitalReport,
    #[serde(rename = "LCP")]
    pub lcp: VitalReport,
    #[serde(rename = "FID")]
    pub fid: VitalReport,
    #[serde(rename = "CLS")]
    pub cls: VitalReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionReport {
    pub samples_received: u64,
    pub responses_timed: u64,
    pub retained_samples: usize,
    pub max_samples: usize,
    pub truncations: u64,
}

/// Aggregated view returned by [`MetricsAggregator::snapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub response_times: ResponseTimeReport,
    pub web_vitals: WebVitalsReport,
    pub page_load: VitalReport,
    pub device_distribution: BTreeMap<String, u64>,
    pub connection_types: BTreeMap<String, u64>,
    pub retention: RetentionReport,
}

/// Thread-safe store of telemetry samples.
#[derive(Debug)]
pub struct MetricsAggregator {
    inner: Mutex<Inner>,
    config: AggregatorConfig,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(AggregatorConfig::default())
    }
}

impl MetricsAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self::new_at(config, Instant::now())
    }

    /// Create an aggregator whose truncation clock starts at `now`.
    pub fn new_at(config: AggregatorConfig, now: Instant) -> Self {
        Self {
            inner: Mutex::new(Inner {
                response_times_ms: Vec::new(),
                vitals: VitalSamples::default(),
                devices: BTreeMap::new(),
                connections: BTreeMap::new(),
                samples_received: 0,
                responses_timed: 0,
                truncations: 0,
                last_truncation: now,
            }),
            config,
        }
    }

    pub fn record(&self, sample: &ClientSample) {
        self.record_at(sample, Instant::now());
    }

    pub fn record_at(&self, sample: &ClientSample, now: Instant) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        self.maybe_truncate(inner, now);

        let pairs = [
            (&mut inner.vitals.ttfb, sample.ttfb),
            (&mut inner.vitals.fcp, sample.fcp),
            (&mut inner.vitals.lcp, sample.lcp),
            (&mut inner.vitals.fid, sample.fid),
            (&mut inner.vitals.cls, sample.cls),
            (&mut inner.vitals.page_load, sample.page_load),
        ];
        for (list, value) in pairs {
            if let Some(v) = value {
                list.push(v);
            }
        }

        if let Some(device) = sample.device.as_deref() {
            *inner
                .devices
                .entry(device_bucket(device).to_string())
                .or_insert(0) += 1;
        }
        if let Some(connection) = sample.connection.as_deref() {
            *inner
                .connections
                .entry(connection_bucket(connection).to_string())
                .or_insert(0) += 1;
        }
        inner.samples_received += 1;
    }

    pub fn record_response_time(&self, elapsed: Duration) {
        self.record_response_time_at(elapsed, Instant::now());
    }

    pub fn record_response_time_at(&self, elapsed: Duration, now: Instant) {
        let mut inner = self.inner.lock();
        self.maybe_truncate(&mut inner, now);
        inner.response_times_ms.push(elapsed.as_secs_f64() * 1000.0);
        inner.responses_timed += 1;
    }

    fn maybe_truncate(&self, inner: &mut Inner, now: Instant) {
        if now.saturating_duration_since(inner.last_truncation) < self.config.truncate_interval {
            return;
        }
        let max = self.config.max_samples;
        truncate_front(&mut inner.response_times_ms, max);
        for list in inner.vitals.lists_mut() {
            truncate_front(list, max);
        }
        inner.last_truncation = now;
        inner.truncations += 1;
        tracing::debug!(max_samples = max, "Telemetry samples truncated");
    }

    /// Aggregate the current samples. Has no side effects.
    pub fn snapshot(&self) -> MetricsReport {
        let inner = self.inner.lock();
        use thresholds::{CLS_DECIMALS, MS_DECIMALS};

        let times = &inner.response_times_ms;
        MetricsReport {
            response_times: ResponseTimeReport {
                count: times.len(),
                avg: round(mean(times), MS_DECIMALS),
                p50: percentile_stat(times, 50, thresholds::P50_MIN_SAMPLES, MS_DECIMALS),
                p95: percentile_stat(times, 95, thresholds::P95_MIN_SAMPLES, MS_DECIMALS),
                p99: percentile_stat(times, 99, thresholds::P99_MIN_SAMPLES, MS_DECIMALS),
            },
            web_vitals: WebVitalsReport {
                ttfb: vital_report(&inner.vitals.ttfb, MS_DECIMALS),
                fcp: vital_report(&inner.vitals.fcp, MS_DECIMALS),
                lcp: vital_report(&inner.vitals.lcp, MS_DECIMALS),
                fid: vital_report(&inner.vitals.fid, MS_DECIMALS),
                cls: vital_report(&inner.vitals.cls, CLS_DECIMALS),
            },
            page_load: vital_report(&inner.vitals.page_load, MS_DECIMALS),
            device_distribution: inner.devices.clone(),
            connection_types: inner.connections.clone(),
            retention: RetentionReport {
                samples_received: inner.samples_received,
                responses_timed: inner.responses_timed,
                retained_samples: inner.response_times_ms.len() + inner.vitals.retained(),
                max_samples: self.config.max_samples,
                truncations: inner.truncations,
            },
        }
    }
}

fn truncate_front(list: &mut Vec<f64>, max: usize) {
    if list.len() > max {
        list.drain(..list.len() - max);
    }
}

fn vital_report(samples: &[f64], decimals: i32) -> VitalReport {
    VitalReport {
        avg: round(mean(samples), decimals),
        p75: percentile_stat(samples, 75, thresholds::P75_MIN_SAMPLES, decimals),
        samples: samples.len(),
    }
}

fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    }
}

fn round(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn percentile_stat(samples: &[f64], percentile: u32, min_samples: usize, decimals: i32) -> Stat {
    if samples.is_empty() || samples.len() < min_samples {
        return Stat::NotAvailable;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    Stat::Value(round(sorted[percentile_index(sorted.len(), percentile)], decimals))
}

/// Nearest-rank index: `ceil(percentile/100 * len) - 1`, clamped to the slice.
fn percentile_index(len: usize, percentile: u32) -> usize {
    if len == 0 {
        return 0;
    }
    let rank = (u64::from(percentile) * len as u64).div_ceil(100) as usize;
    rank.saturating_sub(1).min(len - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ttfb(v: f64) -> ClientSample {
        ClientSample {
            ttfb: Some(v),
            ..Default::default()
        }
    }

    #[test]
    fn test_single_sample_mean() {
        let agg = MetricsAggregator::default();
        agg.record(&ttfb(120.0));

        let report = agg.snapshot();
        assert_eq!(report.web_vitals.ttfb.avg, 120.0);
        assert_eq!(report.web_vitals.ttfb.samples, 1);
        assert_eq!(report.web_vitals.ttfb.p75, Stat::NotAvailable);
        assert_eq!(report.web_vitals.fcp.avg, 0.0);
    }

    #[test]
    fn test_snapshot_is_idempotent() {
        let agg = MetricsAggregator::default();
        agg.record(&ClientSample {
            ttfb: Some(80.0),
            lcp: Some(1200.0),
            device: Some("mobile".into()),
            connection: Some("4g".into()),
            ..Default::default()
        });
        agg.record_response_time(Duration::from_millis(15));

        assert_eq!(agg.snapshot(), agg.snapshot());
    }

    #[test]
    fn test_percentile_thresholds() {
        let agg = MetricsAggregator::default();
        for ms in 1..=20 {
            agg.record_response_time(Duration::from_millis(ms));
        }
        let report = agg.snapshot();
        assert_eq!(report.response_times.count, 20);
        assert_eq!(report.response_times.avg, 10.5);
        assert_eq!(report.response_times.p50, Stat::Value(10.0));
        assert_eq!(report.response_times.p95, Stat::NotAvailable);

        agg.record_response_time(Duration::from_millis(21));
        let report = agg.snapshot();
        assert_eq!(report.response_times.p95, Stat::Value(20.0));
        assert_eq!(report.response_times.p99, Stat::NotAvailable);
    }

    #[test]
    fn test_p75_nearest_rank() {
        let agg = MetricsAggregator::default();
        for v in [100.0, 200.0, 300.0, 400.0, 500.0] {
            agg.record(&ttfb(v));
        }
        let report = agg.snapshot();
        assert_eq!(report.web_vitals.ttfb.p75, Stat::Value(400.0));
        assert_eq!(report.web_vitals.ttfb.avg, 300.0);
    }

    #[test]
    fn test_percentile_index() {
        assert_eq!(percentile_index(0, 50), 0);
        assert_eq!(percentile_index(1, 99), 0);
        assert_eq!(percentile_index(100, 95), 94);
        assert_eq!(percentile_index(10, 100), 9);
    }

    #[test]
    fn test_device_and_connection_buckets() {
        let agg = MetricsAggregator::default();
        for (device, connection) in [
            ("mobile", "4g"),
            ("Desktop", "wifi"),
            ("smart-fridge", "5g"),
            ("tablet", "3G"),
        ] {
            agg.record(&ClientSample {
                device: Some(device.into()),
                connection: Some(connection.into()),
                ..Default::default()
            });
        }
        agg.record(&ttfb(10.0));

        let report = agg.snapshot();
        assert_eq!(report.device_distribution.get("mobile"), Some(&1));
        assert_eq!(report.device_distribution.get("desktop"), Some(&1));
        assert_eq!(report.device_distribution.get("tablet"), Some(&1));
        assert_eq!(report.device_distribution.get("other"), Some(&1));
        assert_eq!(report.connection_types.get("3g"), Some(&1));
        assert_eq!(report.connection_types.get("other"), Some(&1));
        assert_eq!(report.device_distribution.values().sum::<u64>(), 4);
        assert_eq!(report.retention.samples_received, 5);
    }

    #[test]
    fn test_truncation_keeps_most_recent() {
        let start = Instant::now();
        let config = AggregatorConfig {
            max_samples: 3,
            truncate_interval: Duration::from_secs(3600),
        };
        let agg = MetricsAggregator::new_at(config, start);
        for v in 1..=5 {
            agg.record_at(&ttfb(v as f64), start + Duration::from_secs(v));
        }
        // Below the interval nothing is dropped.
        assert_eq!(agg.snapshot().web_vitals.ttfb.samples, 5);

        agg.record_at(&ttfb(6.0), start + Duration::from_secs(3600));
        let report = agg.snapshot();
        // Truncation runs before the new sample is appended.
        assert_eq!(report.web_vitals.ttfb.samples, 4);
        assert_eq!(report.web_vitals.ttfb.avg, 4.5);
        assert_eq!(report.retention.truncations, 1);
    }

    #[test]
    fn test_cls_rounding() {
        let agg = MetricsAggregator::default();
        agg.record(&ClientSample {
            cls: Some(0.123456),
            ..Default::default()
        });
        assert_eq!(agg.snapshot().web_vitals.cls.avg, 0.1235);
    }

    #[test]
    fn test_sample_from_json() {
        let sample = ClientSample::from_json(json!({
            "TTFB": 120,
            "deviceType": "mobile",
            "effectiveType": "4g",
            "unknown": true
        }))
        .unwrap();
        assert_eq!(sample.ttfb, Some(120.0));
        assert_eq!(sample.device.as_deref(), Some("mobile"));
        assert_eq!(sample.connection.as_deref(), Some("4g"));
    }

    #[test]
    fn test_sample_validation() {
        assert_eq!(
            ClientSample::from_json(json!({})).unwrap_err(),
            ValidationError::EmptyPayload
        );
        assert!(matches!(
            ClientSample::from_json(json!({"ttfb": -1})).unwrap_err(),
            ValidationError::InvalidField { ref field, .. } if field == "ttfb"
        ));
        assert!(matches!(
            ClientSample::from_json(json!({"ttfb": "fast"})).unwrap_err(),
            ValidationError::InvalidField { .. }
        ));
        assert!(matches!(
            ClientSample::from_json(json!([1, 2, 3])).unwrap_err(),
            ValidationError::InvalidField { .. }
        ));
    }

    #[test]
    fn test_report_serialization() {
        let agg = MetricsAggregator::default();
        agg.record(&ttfb(120.0));
        let value = serde_json::to_value(agg.snapshot()).unwrap();
        assert_eq!(value["web_vitals"]["TTFB"]["avg"], json!(120.0));
        assert_eq!(value["web_vitals"]["TTFB"]["p75"], json!("N/A"));
        assert_eq!(value["response_times"]["p95"], json!("N/A"));
    }
}
