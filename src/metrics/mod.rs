pub mod extract;
pub mod normalize;

use serde::{Deserialize, Serialize};

pub use extract::{angle_between, compute_metrics, RawMetrics};
pub use normalize::{normalize_metrics, normalize_one, NormalizedMetrics};

/// Which posture angle a consumer follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Lean,
    Neck,
    Tilt,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [MetricKind::Lean, MetricKind::Neck, MetricKind::Tilt];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lean => "lean",
            Self::Neck => "neck",
            Self::Tilt => "tilt",
        }
    }
}

/// One number per metric, in degrees. Used for calibration baselines and
/// normalization scales.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricDegrees {
    #[serde(default)]
    pub lean_deg: f64,
    #[serde(default)]
    pub neck_deg: f64,
    #[serde(default)]
    pub tilt_deg: f64,
}

impl MetricDegrees {
    pub const ZERO: MetricDegrees = MetricDegrees {
        lean_deg: 0.0,
        neck_deg: 0.0,
        tilt_deg: 0.0,
    };

    pub fn new(lean_deg: f64, neck_deg: f64, tilt_deg: f64) -> Self {
        Self {
            lean_deg,
            neck_deg,
            tilt_deg,
        }
    }

    pub fn get(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::Lean => self.lean_deg,
            MetricKind::Neck => self.neck_deg,
            MetricKind::Tilt => self.tilt_deg,
        }
    }
}

impl Default for MetricDegrees {
    fn default() -> Self {
        Self::ZERO
    }
}
