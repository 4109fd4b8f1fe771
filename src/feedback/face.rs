use crate::config::FeedbackConfig;
use crate::pose::{LandmarkIndex, Landmarks};

use super::signal::PostureSignalMapper;

const FACE_PAIRS: [(LandmarkIndex, LandmarkIndex); 4] = [
    (LandmarkIndex::LeftEyeInner, LandmarkIndex::RightEyeInner),
    (LandmarkIndex::LeftEye, LandmarkIndex::RightEye),
    (LandmarkIndex::MouthLeft, LandmarkIndex::MouthRight),
    (LandmarkIndex::LeftEar, LandmarkIndex::RightEar),
];

const MIN_PAIR_DISTANCE: f64 = 1e-6;
const MIN_BASELINE: f64 = 1e-6;

/// Apparent face size: median width of the visible left/right facial pairs.
/// `None` when no pair is visible.
pub fn compute_face_scale(landmarks: Option<&Landmarks>, visibility_threshold: f64) -> Option<f64> {
    let lm = landmarks?;
    let mut distances: Vec<f64> = FACE_PAIRS
        .iter()
        .filter(|(a, b)| {
            lm.get(*a).is_visible(visibility_threshold) && lm.get(*b).is_visible(visibility_threshold)
        })
        .map(|(a, b)| lm.get(*a).distance(lm.get(*b)))
        .filter(|&d| d > MIN_PAIR_DISTANCE)
        .collect();

    if distances.is_empty() {
        return None;
    }
    distances.sort_by(f64::total_cmp);
    Some(distances[distances.len() / 2])
}

/// Feedback level from how much larger the face appears than its resting size.
///
/// The resting size is learned from the first `baseline_samples` valid
/// scales (output stays 0 meanwhile), then keeps adapting only while the
/// ratio stays at or below the activation threshold.
#[derive(Debug, Clone)]
pub struct FaceProximitySignalMapper {
    visibility_threshold: f64,
    baseline_samples: u32,
    baseline_alpha: f64,
    activation_ratio: f64,
    baseline: Option<f64>,
    samples: u32,
    mapper: PostureSignalMapper,
}

impl FaceProximitySignalMapper {
    pub fn from_config(config: &FeedbackConfig) -> Self {
        let face = &config.face_proximity;
        Self {
            visibility_threshold: face.visibility_threshold,
            baseline_samples: face.baseline_samples.max(1),
            baseline_alpha: face.baseline_alpha.clamp(0.0, 1.0),
            activation_ratio: config.activation_threshold,
            baseline: None,
            samples: 0,
            mapper: PostureSignalMapper::new(
                false,
                config.activation_threshold,
                config.full_scale,
                config.smoothing_alpha,
            ),
        }
    }

    pub fn map_landmarks(&mut self, landmarks: Option<&Landmarks>) -> f64 {
        let scale = compute_face_scale(landmarks, self.visibility_threshold);
        self.map_scale(scale)
    }

    pub fn map_scale(&mut self, scale: Option<f64>) -> f64 {
        let Some(scale) = scale else {
            return self.mapper.map_value(self.activation_ratio);
        };

        let Some(baseline) = self.baseline else {
            self.baseline = Some(scale);
            self.samples = 1;
            return 0.0;
        };

        if self.samples < self.baseline_samples {
            self.baseline = Some(self.blend(baseline, scale));
            self.samples += 1;
            return 0.0;
        }

        let ratio = scale / baseline.max(MIN_BASELINE);
        if ratio <= self.activation_ratio {
            self.baseline = Some(self.blend(baseline, scale));
        }
        self.mapper.map_value(ratio)
    }

    fn blend(&self, baseline: f64, scale: f64) -> f64 {
        (1.0 - self.baseline_alpha) * baseline + self.baseline_alpha * scale
    }

    pub fn baseline(&self) -> Option<f64> {
        self.baseline
    }

    pub fn is_calibrating(&self) -> bool {
        self.samples < self.baseline_samples
    }
}
