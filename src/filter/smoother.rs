use crate::config::MetricsConfig;
use crate::metrics::{MetricKind, RawMetrics};

use super::ScalarFilter;

/// One filtered metric and where its value came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    /// Observed this tick and filtered
    Live(f64),
    /// Missing this tick; last value frozen inside the hold window
    Held(f64),
    /// Missing past the hold window; returning toward neutral
    Decaying(f64),
    /// Never observed
    Unknown,
}

impl Sample {
    /// Value fed downstream; an unknown metric contributes 0
    pub fn value(&self) -> f64 {
        self.known().unwrap_or(0.0)
    }

    pub fn known(&self) -> Option<f64> {
        match *self {
            Self::Live(v) | Self::Held(v) | Self::Decaying(v) => Some(v),
            Self::Unknown => None,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilteredMetrics {
    pub lean: Sample,
    pub neck: Sample,
    pub tilt: Sample,
}

impl FilteredMetrics {
    pub const UNKNOWN: FilteredMetrics = FilteredMetrics {
        lean: Sample::Unknown,
        neck: Sample::Unknown,
        tilt: Sample::Unknown,
    };

    pub fn get(&self, kind: MetricKind) -> Sample {
        match kind {
            MetricKind::Lean => self.lean,
            MetricKind::Neck => self.neck,
            MetricKind::Tilt => self.tilt,
        }
    }

    /// Held and decaying values count as known for normalization
    pub fn to_raw(&self) -> RawMetrics {
        RawMetrics {
            lean_deg: self.lean.known(),
            neck_deg: self.neck.known(),
            tilt_deg: self.tilt.known(),
        }
    }
}

impl Default for FilteredMetrics {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

#[derive(Debug, Clone)]
struct Channel {
    filter: ScalarFilter,
    last_value: f64,
    last_valid: Option<f64>,
}

impl Channel {
    fn new(filter: ScalarFilter) -> Self {
        Self {
            filter,
            last_value: 0.0,
            last_valid: None,
        }
    }

    fn update(&mut self, value: Option<f64>, now: f64, dt: f64, hold: f64, decay: f64) -> Sample {
        if let Some(value) = value {
            let filtered = self.filter.update(value, dt);
            self.last_value = filtered;
            self.last_valid = Some(now);
            return Sample::Live(filtered);
        }

        let Some(last_seen) = self.last_valid else {
            self.last_value = 0.0;
            return Sample::Unknown;
        };

        if now - last_seen <= hold {
            return Sample::Held(self.last_value);
        }

        if decay > 0.0 {
            self.last_value *= (-dt / decay).exp();
        } else {
            self.last_value = 0.0;
        }
        Sample::Decaying(self.last_value)
    }
}

/// Smooths lean/neck/tilt and bridges detection gaps.
///
/// A metric that drops out keeps its last value for `hold_seconds`, then
/// decays exponentially toward 0 with time constant `decay_seconds`
/// (or snaps to 0 when that is not positive).
#[derive(Debug, Clone)]
pub struct MetricSmoother {
    lean: Channel,
    neck: Channel,
    tilt: Channel,
    hold_seconds: f64,
    decay_seconds: f64,
    last_time: Option<f64>,
}

impl MetricSmoother {
    pub fn new(filter: ScalarFilter, hold_seconds: f64, decay_seconds: f64) -> Self {
        Self {
            lean: Channel::new(filter.clone()),
            neck: Channel::new(filter.clone()),
            tilt: Channel::new(filter),
            hold_seconds,
            decay_seconds,
            last_time: None,
        }
    }

    pub fn from_config(config: &MetricsConfig) -> Self {
        Self::new(
            ScalarFilter::from_config(&config.smoothing),
            config.hold_seconds,
            config.decay_seconds,
        )
    }

    /// `now` is a monotonic timestamp in seconds
    pub fn update(&mut self, metrics: &RawMetrics, now: f64) -> FilteredMetrics {
        let dt = match self.last_time {
            Some(last) => (now - last).max(0.0),
            None => 0.0,
        };
        self.last_time = Some(now);

        let (hold, decay) = (self.hold_seconds, self.decay_seconds);
        FilteredMetrics {
            lean: self.lean.update(metrics.lean_deg, now, dt, hold, decay),
            neck: self.neck.update(metrics.neck_deg, now, dt, hold, decay),
            tilt: self.tilt.update(metrics.tilt_deg, now, dt, hold, decay),
        }
    }

    pub fn reset(&mut self) {
        for channel in [&mut self.lean, &mut self.neck, &mut self.tilt] {
            channel.filter.reset();
            channel.last_value = 0.0;
            channel.last_valid = None;
        }
        self.last_time = None;
    }
}
