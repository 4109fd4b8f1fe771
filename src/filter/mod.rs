pub mod ema;
pub mod one_euro;
pub mod smoother;

pub use ema::EmaFilter;
pub use one_euro::OneEuroFilter;
pub use smoother::{FilteredMetrics, MetricSmoother, Sample};

use crate::config::{FilterKind, SmoothingConfig};

/// The per-metric filter chosen at startup
#[derive(Debug, Clone)]
pub enum ScalarFilter {
    Ema(EmaFilter),
    OneEuro(OneEuroFilter),
    Passthrough,
}

impl ScalarFilter {
    pub fn from_config(config: &SmoothingConfig) -> Self {
        if !config.enabled {
            return Self::Passthrough;
        }
        match config.kind {
            FilterKind::Ema => Self::Ema(EmaFilter::new(config.alpha)),
            FilterKind::OneEuro => Self::OneEuro(OneEuroFilter::new(
                config.one_euro_min_cutoff,
                config.one_euro_beta,
                config.one_euro_d_cutoff,
            )),
        }
    }

    pub fn update(&mut self, value: f64, dt: f64) -> f64 {
        match self {
            Self::Ema(f) => f.filter(value),
            Self::OneEuro(f) => f.filter(value, dt),
            Self::Passthrough => value,
        }
    }

    pub fn reset(&mut self) {
        match self {
            Self::Ema(f) => f.reset(),
            Self::OneEuro(f) => f.reset(),
            Self::Passthrough => {}
        }
    }
}
