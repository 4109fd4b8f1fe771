pub mod face;
pub mod signal;
pub mod sink;

pub use face::{compute_face_scale, FaceProximitySignalMapper};
pub use signal::PostureSignalMapper;
pub use sink::{BrightnessSink, DryRunSink, FeedbackSink};

use crate::config::FeedbackConfig;
use crate::metrics::{MetricKind, NormalizedMetrics};
use crate::pose::Landmarks;

/// Feedback level source selected by `feedback.source`
#[derive(Debug, Clone)]
pub enum FeedbackSignal {
    FaceProximity(FaceProximitySignalMapper),
    Posture {
        source: MetricKind,
        mapper: PostureSignalMapper,
    },
}

impl FeedbackSignal {
    pub fn from_config(config: &FeedbackConfig) -> Self {
        match config.source.metric() {
            None => Self::FaceProximity(FaceProximitySignalMapper::from_config(config)),
            Some(source) => Self::Posture {
                source,
                mapper: PostureSignalMapper::from_config(config),
            },
        }
    }

    /// Level in [0, 1] for the latest frame and normalized posture
    pub fn update(&mut self, landmarks: Option<&Landmarks>, metrics: &NormalizedMetrics) -> f64 {
        match self {
            Self::FaceProximity(mapper) => mapper.map_landmarks(landmarks),
            Self::Posture { source, mapper } => mapper.map_metrics(metrics, *source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedbackSource;

    #[test]
    fn test_source_selection() {
        let config = FeedbackConfig::default();
        assert!(matches!(
            FeedbackSignal::from_config(&config),
            FeedbackSignal::FaceProximity(_)
        ));

        let config = FeedbackConfig {
            source: FeedbackSource::Lean,
            use_absolute: true,
            activation_threshold: 0.0,
            full_scale: 1.0,
            smoothing_alpha: 1.0,
            ..FeedbackConfig::default()
        };
        let mut signal = FeedbackSignal::from_config(&config);
        let level = signal.update(None, &NormalizedMetrics::new(-0.4, 0.9, 0.0));
        assert!((level - 0.4).abs() < 1e-12);
    }
}
