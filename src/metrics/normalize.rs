use super::{MetricDegrees, MetricKind, RawMetrics};

/// Calibrated posture signals, each in [-1, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalizedMetrics {
    pub lean: f64,
    pub neck: f64,
    pub tilt: f64,
}

impl NormalizedMetrics {
    pub const NEUTRAL: NormalizedMetrics = NormalizedMetrics {
        lean: 0.0,
        neck: 0.0,
        tilt: 0.0,
    };

    pub fn new(lean: f64, neck: f64, tilt: f64) -> Self {
        Self { lean, neck, tilt }
    }

    pub fn get(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::Lean => self.lean,
            MetricKind::Neck => self.neck,
            MetricKind::Tilt => self.tilt,
        }
    }
}

/// Map one angle onto [-1, 1] around its calibrated baseline.
///
/// Unknown input, offsets inside the deadband and a zero (or non-finite)
/// scale all produce 0.
pub fn normalize_one(value: Option<f64>, baseline: f64, scale: f64, deadband: f64) -> f64 {
    let Some(value) = value else {
        return 0.0;
    };
    let centered = value - baseline;
    if centered.abs() < deadband {
        return 0.0;
    }
    if scale == 0.0 || !scale.is_finite() {
        return 0.0;
    }
    let norm = centered / scale;
    if norm.is_nan() {
        return 0.0;
    }
    norm.clamp(-1.0, 1.0)
}

pub fn normalize_metrics(
    values: &RawMetrics,
    baseline: &MetricDegrees,
    scale: &MetricDegrees,
    deadband: f64,
) -> NormalizedMetrics {
    NormalizedMetrics {
        lean: normalize_one(values.lean_deg, baseline.lean_deg, scale.lean_deg, deadband),
        neck: normalize_one(values.neck_deg, baseline.neck_deg, scale.neck_deg, deadband),
        tilt: normalize_one(values.tilt_deg, baseline.tilt_deg, scale.tilt_deg, deadband),
    }
}
