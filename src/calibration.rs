use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::config::Config;
use crate::metrics::{MetricDegrees, RawMetrics};

/// Persisted resting posture and optional per-segment angle limits.
///
/// `spine_baseline` only writes `baseline` and keeps whatever angle arrays
/// the file already had. Per-segment neutral/min/max angles are measured on
/// the rig with external servo tooling and edited into the file by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpineCalibration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<u64>,
    #[serde(default)]
    pub baseline: MetricDegrees,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neutral_angles: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_angles: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_angles: Option<Vec<f64>>,
}

impl SpineCalibration {
    pub fn from_baseline(baseline: MetricDegrees, samples: u64) -> Self {
        Self {
            captured_at: Some(Utc::now()),
            samples: Some(samples),
            baseline,
            neutral_angles: None,
            min_angles: None,
            max_angles: None,
        }
    }

    /// Overlay onto a config. Call `Config::normalize` afterwards so the
    /// angle arrays are fitted to the segment count.
    pub fn apply_to(&self, config: &mut Config) {
        config.calibration.baseline = self.baseline;
        if let Some(v) = &self.neutral_angles {
            config.mapping.neutral_angles = v.clone();
        }
        if let Some(v) = &self.min_angles {
            config.mapping.min_angles = v.clone();
        }
        if let Some(v) = &self.max_angles {
            config.mapping.max_angles = v.clone();
        }
    }
}

pub fn save_calibration<P: AsRef<Path>>(path: P, cal: &SpineCalibration) -> Result<()> {
    let json = serde_json::to_string_pretty(cal)?;
    fs::write(path, json).context("Failed to write calibration file")?;
    Ok(())
}

pub fn load_calibration<P: AsRef<Path>>(path: P) -> Result<SpineCalibration> {
    let content = fs::read_to_string(path).context("Failed to read calibration file")?;
    let cal: SpineCalibration =
        serde_json::from_str(&content).context("Failed to parse calibration file")?;
    Ok(cal)
}

/// Apply `calibration.file` if configured, then re-normalize
pub fn apply_calibration_file(config: &mut Config) -> Result<()> {
    let Some(path) = config.calibration.file.clone() else {
        return Ok(());
    };
    let cal = load_calibration(&path).with_context(|| format!("calibration file {}", path))?;
    cal.apply_to(config);
    config.normalize();
    info!(
        "Loaded calibration {} (baseline lean={:.1} neck={:.1} tilt={:.1})",
        path, cal.baseline.lean_deg, cal.baseline.neck_deg, cal.baseline.tilt_deg
    );
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
struct Mean {
    sum: f64,
    count: u64,
}

impl Mean {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            self.sum += v;
            self.count += 1;
        }
    }

    fn value(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Averages raw metrics while the user holds a resting posture
#[derive(Debug, Clone, Default)]
pub struct BaselineCollector {
    lean: Mean,
    neck: Mean,
    tilt: Mean,
    frames: u64,
}

impl BaselineCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, metrics: &RawMetrics) {
        self.frames += 1;
        self.lean.push(metrics.lean_deg);
        self.neck.push(metrics.neck_deg);
        self.tilt.push(metrics.tilt_deg);
    }

    /// Frames offered, including ones with nothing resolved
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Fewest resolved samples across the three metrics
    pub fn min_samples(&self) -> u64 {
        self.lean.count.min(self.neck.count).min(self.tilt.count)
    }

    /// Mean of the resolved samples per metric; 0 for a metric never seen
    pub fn baseline(&self) -> MetricDegrees {
        MetricDegrees::new(self.lean.value(), self.neck.value(), self.tilt.value())
    }

    pub fn finish(&self) -> SpineCalibration {
        SpineCalibration::from_baseline(self.baseline(), self.frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_means() {
        let mut c = BaselineCollector::new();
        c.add(&RawMetrics {
            lean_deg: Some(2.0),
            neck_deg: Some(10.0),
            tilt_deg: None,
        });
        c.add(&RawMetrics {
            lean_deg: Some(4.0),
            neck_deg: None,
            tilt_deg: None,
        });
        c.add(&RawMetrics::UNKNOWN);
        let b = c.baseline();
        assert_eq!(b.lean_deg, 3.0);
        assert_eq!(b.neck_deg, 10.0);
        assert_eq!(b.tilt_deg, 0.0);
        assert_eq!(c.frames(), 3);
        assert_eq!(c.min_samples(), 0);
    }

    #[test]
    fn test_parse_minimal_file() {
        let cal: SpineCalibration =
            serde_json::from_str(r#"{"baseline": {"lean_deg": 1.5, "neck_deg": -3.0}}"#).unwrap();
        assert_eq!(cal.baseline, MetricDegrees::new(1.5, -3.0, 0.0));
        assert_eq!(cal.neutral_angles, None);
        assert_eq!(cal.captured_at, None);
    }

    #[test]
    fn test_parse_full_file() {
        let json = r#"{
            "captured_at": "2026-03-01T12:00:00Z",
            "samples": 240,
            "baseline": {"lean_deg": 0.5, "neck_deg": 12.0, "tilt_deg": -1.0},
            "neutral_angles": [85.0, 95.0],
            "max_angles": [120.0]
        }"#;
        let cal: SpineCalibration = serde_json::from_str(json).unwrap();
        assert_eq!(cal.samples, Some(240));
        assert!(cal.captured_at.is_some());

        let mut config = Config::default();
        config.mapping.segments = 2;
        cal.apply_to(&mut config);
        config.normalize();
        assert_eq!(config.calibration.baseline.neck_deg, 12.0);
        assert_eq!(config.mapping.neutral_angles, vec![85.0, 95.0]);
        assert_eq!(config.mapping.max_angles, vec![120.0, 150.0]);
        assert_eq!(config.mapping.min_angles.len(), 2);
    }

    #[test]
    fn test_serialized_form_omits_unset_fields() {
        let cal = SpineCalibration {
            captured_at: None,
            samples: None,
            baseline: MetricDegrees::new(1.0, 2.0, 3.0),
            neutral_angles: None,
            min_angles: None,
            max_angles: None,
        };
        let json = serde_json::to_string(&cal).unwrap();
        assert_eq!(
            json,
            r#"{"baseline":{"lean_deg":1.0,"neck_deg":2.0,"tilt_deg":3.0}}"#
        );
    }

    #[test]
    fn test_no_file_configured_is_noop() {
        let mut config = Config::default();
        apply_calibration_file(&mut config).unwrap();
        assert_eq!(config.calibration.baseline, MetricDegrees::ZERO);
    }

    #[test]
    fn test_missing_file_is_error() {
        let mut config = Config::default();
        config.calibration.file = Some("/nonexistent/spine-calibration.json".to_string());
        assert!(apply_calibration_file(&mut config).is_err());
    }
}
