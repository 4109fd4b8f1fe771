use crate::config::{FeedbackConfig, Ramp};
use crate::metrics::{MetricKind, NormalizedMetrics};

/// Maps one posture scalar to a smoothed 0..1 feedback level.
///
/// The smoothed level is seeded with the first ramp output. An alpha of 0
/// or at least 1 disables smoothing.
#[derive(Debug, Clone)]
pub struct PostureSignalMapper {
    use_absolute: bool,
    ramp: Ramp,
    alpha: f64,
    smoothed: Option<f64>,
}

impl PostureSignalMapper {
    pub fn new(use_absolute: bool, activation_threshold: f64, full_scale: f64, smoothing_alpha: f64) -> Self {
        Self {
            use_absolute,
            ramp: Ramp::new(activation_threshold, full_scale),
            alpha: smoothing_alpha.clamp(0.0, 1.0),
            smoothed: None,
        }
    }

    pub fn from_config(config: &FeedbackConfig) -> Self {
        Self::new(
            config.use_absolute,
            config.activation_threshold,
            config.full_scale,
            config.smoothing_alpha,
        )
    }

    pub fn map_metrics(&mut self, metrics: &NormalizedMetrics, source: MetricKind) -> f64 {
        self.map_value(metrics.get(source))
    }

    pub fn map_value(&mut self, value: f64) -> f64 {
        let value = if self.use_absolute {
            value.abs()
        } else {
            value.max(0.0)
        };
        let raw = self.ramp.apply(value);

        let level = match self.smoothed {
            Some(prev) if self.alpha > 0.0 && self.alpha < 1.0 => {
                self.alpha * raw + (1.0 - self.alpha) * prev
            }
            _ => raw,
        };
        self.smoothed = Some(level);
        level
    }

    pub fn level(&self) -> f64 {
        self.smoothed.unwrap_or(0.0)
    }

    pub fn reset(&mut self) {
        self.smoothed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_call_seeded_with_ramp_output() {
        let mut m = PostureSignalMapper::new(true, 0.1, 0.8, 0.25);
        assert!((m.map_value(0.8) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_smoothing_moves_part_way() {
        let mut m = PostureSignalMapper::new(true, 0.1, 0.8, 0.25);
        m.map_value(0.0);
        assert!((m.map_value(0.8) - 0.25).abs() < 1e-12);
        assert!((m.map_value(0.8) - 0.4375).abs() < 1e-12);
    }

    #[test]
    fn test_instantaneous_alpha() {
        for alpha in [0.0, 1.0, 3.0] {
            let mut m = PostureSignalMapper::new(true, 0.0, 1.0, alpha);
            m.map_value(0.0);
            assert_eq!(m.map_value(0.6), 0.6);
        }
    }

    #[test]
    fn test_signed_mode_ignores_negative() {
        let mut m = PostureSignalMapper::new(false, 0.1, 0.8, 1.0);
        assert_eq!(m.map_value(-0.9), 0.0);
        let mut m = PostureSignalMapper::new(true, 0.1, 0.8, 1.0);
        assert_eq!(m.map_value(-0.9), 1.0);
    }

    #[test]
    fn test_output_bounded() {
        let mut m = PostureSignalMapper::new(true, 0.2, 0.1, 0.5);
        for v in [-10.0, -0.3, 0.0, 0.15, 0.2000005, 4.0] {
            let out = m.map_value(v);
            assert!((0.0..=1.0).contains(&out), "{} -> {}", v, out);
        }
    }

    #[test]
    fn test_map_metrics_selects_source() {
        let mut m = PostureSignalMapper::new(true, 0.0, 1.0, 1.0);
        let metrics = NormalizedMetrics::new(0.1, 0.5, -0.9);
        assert_eq!(m.map_metrics(&metrics, MetricKind::Neck), 0.5);
        assert_eq!(m.map_metrics(&metrics, MetricKind::Tilt), 0.9);
    }
}
