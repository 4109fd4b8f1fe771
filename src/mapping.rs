use crate::config::{ControlMode, GainConfig, HunchPushConfig, MappingConfig, Ramp};
use crate::metrics::NormalizedMetrics;

/// Clamp without panicking when a misconfigured segment has min > max
fn clamp_angle(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

/// Per-segment slew limit in degrees per second.
///
/// The first call (and any call with a non-positive dt) passes the target
/// through and becomes the new reference.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_deg_per_sec: f64,
    last: Option<Vec<f64>>,
    last_time: Option<f64>,
}

impl RateLimiter {
    /// A negative rate is treated as 0, which holds every segment in place
    pub fn new(max_deg_per_sec: f64) -> Self {
        Self {
            max_deg_per_sec: max_deg_per_sec.max(0.0),
            last: None,
            last_time: None,
        }
    }

    pub fn apply(&mut self, target: Vec<f64>, now: f64) -> Vec<f64> {
        let dt = self.last_time.map(|t| now - t);
        self.last_time = Some(now);

        let (last, dt) = match (self.last.as_ref(), dt) {
            (Some(last), Some(dt)) if dt > 0.0 && last.len() == target.len() => (last, dt),
            _ => {
                self.last = Some(target.clone());
                return target;
            }
        };

        let max_delta = self.max_deg_per_sec * dt;
        let limited: Vec<f64> = last
            .iter()
            .zip(&target)
            .map(|(&prev, &want)| {
                let delta = want - prev;
                if delta.abs() > max_delta {
                    prev + max_delta.copysign(delta)
                } else {
                    want
                }
            })
            .collect();

        self.last = Some(limited.clone());
        limited
    }

    pub fn last(&self) -> Option<&[f64]> {
        self.last.as_deref()
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.last_time = None;
    }
}

/// Turns normalized posture into one target angle per spine segment
#[derive(Debug, Clone)]
pub struct SpineMapper {
    mode: ControlMode,
    neutral: Vec<f64>,
    min_angles: Vec<f64>,
    max_angles: Vec<f64>,
    weights: Vec<f64>,
    upper_weights: Vec<f64>,
    directions: Vec<f64>,
    upper_start: usize,
    gain: GainConfig,
    hunch: HunchPushConfig,
    hunch_ramp: Ramp,
    limiter: RateLimiter,
}

impl SpineMapper {
    /// Expects a normalized config: every per-segment array has `segments` entries
    pub fn from_config(config: &MappingConfig) -> Self {
        let n = config.segments;
        let take = |v: &Vec<f64>, fill: f64| {
            let mut v = v.clone();
            v.resize(n, fill);
            v
        };
        Self {
            mode: config.control_mode,
            neutral: take(&config.neutral_angles, 90.0),
            min_angles: take(&config.min_angles, f64::NEG_INFINITY),
            max_angles: take(&config.max_angles, f64::INFINITY),
            weights: take(&config.weights, 1.0),
            upper_weights: take(&config.upper_weights, 1.0),
            directions: take(&config.directions, 1.0),
            upper_start: config.upper_start(),
            gain: config.gain,
            hunch: config.hunch_push.clone(),
            hunch_ramp: config.hunch_push.ramp(),
            limiter: RateLimiter::new(config.max_deg_per_sec),
        }
    }

    pub fn segments(&self) -> usize {
        self.neutral.len()
    }

    pub fn neutral(&self) -> &[f64] {
        &self.neutral
    }

    /// Target angles for this tick after rate limiting
    pub fn map_metrics(&mut self, metrics: &NormalizedMetrics, now: f64) -> Vec<f64> {
        let raw = self.target_angles(metrics);
        self.limiter.apply(raw, now)
    }

    /// Target angles before rate limiting
    pub fn target_angles(&self, metrics: &NormalizedMetrics) -> Vec<f64> {
        match self.mode {
            ControlMode::SpineBlend => self.spine_blend(metrics),
            ControlMode::HunchPush => self.hunch_push(metrics),
        }
    }

    fn spine_blend(&self, m: &NormalizedMetrics) -> Vec<f64> {
        (0..self.segments())
            .map(|i| {
                let dir = self.directions[i];
                let weight = self.weights[i];
                let mut angle = self.neutral[i];
                angle += dir * self.gain.lean * weight * m.lean;
                if i >= self.upper_start {
                    angle += dir * self.gain.neck * self.upper_weights[i] * m.neck;
                }
                angle += dir * self.gain.tilt * weight * m.tilt;
                clamp_angle(angle, self.min_angles[i], self.max_angles[i])
            })
            .collect()
    }

    /// 0..1 push strength from the configured source metric
    pub fn hunch_amount(&self, m: &NormalizedMetrics) -> f64 {
        let source = m.get(self.hunch.source);
        let source = if self.hunch.use_absolute {
            source.abs()
        } else {
            source.max(0.0)
        };
        self.hunch_ramp.apply(source)
    }

    fn hunch_push(&self, m: &NormalizedMetrics) -> Vec<f64> {
        let amount = self.hunch_amount(m);
        (0..self.segments())
            .map(|i| {
                let push = self.directions[i] * self.hunch.max_push_deg * self.weights[i] * amount;
                clamp_angle(self.neutral[i] + push, self.min_angles[i], self.max_angles[i])
            })
            .collect()
    }

    pub fn reset(&mut self) {
        self.limiter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricKind;

    const EPS: f64 = 1e-9;

    fn two_segment(mode: ControlMode) -> MappingConfig {
        let mut config = MappingConfig {
            control_mode: mode,
            segments: 2,
            neutral_angles: vec![0.0, 0.0],
            min_angles: vec![-180.0, -180.0],
            max_angles: vec![180.0, 180.0],
            weights: vec![1.0, 1.0],
            upper_weights: vec![1.0, 1.0],
            directions: vec![1.0, -1.0],
            upper_segment_start: Some(1),
            gain: GainConfig {
                lean: 30.0,
                neck: 0.0,
                tilt: 0.0,
            },
            max_deg_per_sec: 1e9,
            ..MappingConfig::default()
        };
        config.normalize();
        config
    }

    fn assert_angles(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < EPS, "{:?} != {:?}", actual, expected);
        }
    }

    #[test]
    fn test_spine_blend_lean() {
        let mut mapper = SpineMapper::from_config(&two_segment(ControlMode::SpineBlend));
        let out = mapper.map_metrics(&NormalizedMetrics::new(0.5, 0.0, 0.0), 0.0);
        assert_angles(&out, &[15.0, -15.0]);
    }

    #[test]
    fn test_spine_blend_neck_only_upper_segments() {
        let mut config = two_segment(ControlMode::SpineBlend);
        config.gain = GainConfig {
            lean: 0.0,
            neck: 20.0,
            tilt: 0.0,
        };
        let mapper = SpineMapper::from_config(&config);
        let out = mapper.target_angles(&NormalizedMetrics::new(0.0, 1.0, 0.0));
        assert_angles(&out, &[0.0, -20.0]);
    }

    #[test]
    fn test_spine_blend_tilt() {
        let mut config = two_segment(ControlMode::SpineBlend);
        config.gain = GainConfig {
            lean: 0.0,
            neck: 0.0,
            tilt: 10.0,
        };
        let mapper = SpineMapper::from_config(&config);
        let out = mapper.target_angles(&NormalizedMetrics::new(0.0, 0.0, 0.5));
        assert_angles(&out, &[5.0, -5.0]);
    }

    #[test]
    fn test_spine_blend_terms_add_up() {
        let mut config = two_segment(ControlMode::SpineBlend);
        config.gain = GainConfig {
            lean: 30.0,
            neck: 20.0,
            tilt: 10.0,
        };
        config.weights = vec![1.0, 0.5];
        config.upper_weights = vec![1.0, 2.0];
        let mapper = SpineMapper::from_config(&config);
        let out = mapper.target_angles(&NormalizedMetrics::new(0.5, 0.25, -0.4));
        // lower: 15 lean - 4 tilt; upper: -7.5 lean - 10 neck + 2 tilt
        assert_angles(&out, &[11.0, -15.5]);
    }

    #[test]
    fn test_spine_blend_clamped() {
        let mut config = two_segment(ControlMode::SpineBlend);
        config.max_angles = vec![10.0, 10.0];
        config.min_angles = vec![-5.0, -5.0];
        let mapper = SpineMapper::from_config(&config);
        let out = mapper.target_angles(&NormalizedMetrics::new(1.0, 0.0, 0.0));
        assert_angles(&out, &[10.0, -5.0]);
    }

    #[test]
    fn test_hunch_push_full() {
        let mut mapper = SpineMapper::from_config(&two_segment(ControlMode::HunchPush));
        let m = NormalizedMetrics::new(0.0, 0.8, 0.0);
        assert!((mapper.hunch_amount(&m) - 1.0).abs() < EPS);
        let out = mapper.map_metrics(&m, 0.0);
        assert_angles(&out, &[30.0, -30.0]);
    }

    #[test]
    fn test_hunch_push_absolute_symmetric() {
        let mapper = SpineMapper::from_config(&two_segment(ControlMode::HunchPush));
        for &x in &[0.05, 0.3, 0.45, 0.8, 1.0] {
            let pos = mapper.target_angles(&NormalizedMetrics::new(0.0, x, 0.0));
            let neg = mapper.target_angles(&NormalizedMetrics::new(0.0, -x, 0.0));
            assert_angles(&pos, &neg);
        }
    }

    #[test]
    fn test_hunch_push_signed_ignores_negative() {
        let mut config = two_segment(ControlMode::HunchPush);
        config.hunch_push.use_absolute = false;
        let mapper = SpineMapper::from_config(&config);
        let out = mapper.target_angles(&NormalizedMetrics::new(0.0, -0.8, 0.0));
        assert_angles(&out, &[0.0, 0.0]);
    }

    #[test]
    fn test_hunch_push_upright_is_neutral() {
        let config = MappingConfig {
            control_mode: ControlMode::HunchPush,
            ..MappingConfig::default()
        };
        let mapper = SpineMapper::from_config(&config);
        let out = mapper.target_angles(&NormalizedMetrics::new(0.7, 0.0, -0.4));
        assert_angles(&out, &config.neutral_angles);
    }

    #[test]
    fn test_hunch_push_source_selection() {
        let mut config = two_segment(ControlMode::HunchPush);
        config.hunch_push.source = MetricKind::Tilt;
        let mapper = SpineMapper::from_config(&config);
        assert_eq!(mapper.hunch_amount(&NormalizedMetrics::new(0.0, 1.0, 0.0)), 0.0);
        assert!(mapper.hunch_amount(&NormalizedMetrics::new(0.0, 0.0, 0.45)) > 0.0);
    }

    #[test]
    fn test_rate_limit_bounds_every_tick() {
        let mut config = two_segment(ControlMode::SpineBlend);
        config.max_deg_per_sec = 60.0;
        let mut mapper = SpineMapper::from_config(&config);

        let mut prev = mapper.map_metrics(&NormalizedMetrics::NEUTRAL, 0.0);
        let inputs = [1.0, -1.0, 0.3, 1.0, 1.0, -0.2, 0.0];
        let mut now = 0.0;
        for (k, &lean) in inputs.iter().enumerate() {
            let dt = 0.05 * (k + 1) as f64;
            now += dt;
            let out = mapper.map_metrics(&NormalizedMetrics::new(lean, 0.0, 0.0), now);
            for (a, b) in out.iter().zip(&prev) {
                assert!((a - b).abs() <= 60.0 * dt + EPS, "step {} moved {}", k, (a - b).abs());
            }
            prev = out;
        }
    }

    #[test]
    fn test_rate_limit_negative_rate_holds() {
        let mut limiter = RateLimiter::new(-50.0);
        limiter.apply(vec![0.0], 0.0);
        assert_eq!(limiter.apply(vec![1.0], 1.0), vec![0.0]);
        assert_eq!(limiter.apply(vec![-1.0], 2.0), vec![0.0]);
    }

    #[test]
    fn test_rate_limit_first_call_and_zero_dt_pass_through() {
        let mut limiter = RateLimiter::new(10.0);
        assert_eq!(limiter.apply(vec![50.0], 1.0), vec![50.0]);
        assert_eq!(limiter.apply(vec![0.0], 1.0), vec![0.0]);
        let out = limiter.apply(vec![100.0], 2.0);
        assert!((out[0] - 10.0).abs() < EPS);
        assert_eq!(limiter.last(), Some(&[10.0][..]));
    }
}
