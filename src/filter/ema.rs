/// Exponential moving average, seeded by its first sample
#[derive(Debug, Clone)]
pub struct EmaFilter {
    alpha: f64,
    prev: Option<f64>,
}

impl EmaFilter {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            prev: None,
        }
    }

    pub fn filter(&mut self, value: f64) -> f64 {
        let result = match self.prev {
            Some(prev) => self.alpha * value + (1.0 - self.alpha) * prev,
            None => value,
        };
        self.prev = Some(result);
        result
    }

    pub fn value(&self) -> Option<f64> {
        self.prev
    }

    pub fn reset(&mut self) {
        self.prev = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_passthrough() {
        let mut f = EmaFilter::new(0.2);
        assert_eq!(f.filter(42.0), 42.0);
    }

    #[test]
    fn test_no_smoothing() {
        let mut f = EmaFilter::new(1.0);
        f.filter(0.0);
        assert_eq!(f.filter(7.0), 7.0);
    }

    #[test]
    fn test_full_smoothing() {
        let mut f = EmaFilter::new(0.0);
        f.filter(3.0);
        assert_eq!(f.filter(9.0), 3.0);
    }

    #[test]
    fn test_half_step() {
        let mut f = EmaFilter::new(0.5);
        f.filter(0.0);
        assert!((f.filter(10.0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_input_converges_monotonically() {
        let mut f = EmaFilter::new(0.2);
        f.filter(0.0);
        let target = 10.0;
        let mut prev_err = target;
        for _ in 0..50 {
            let out = f.filter(target);
            let err = target - out;
            assert!(err > 0.0 && err < prev_err, "err={} prev_err={}", err, prev_err);
            prev_err = err;
        }
    }

    #[test]
    fn test_reset() {
        let mut f = EmaFilter::new(0.1);
        f.filter(1.0);
        f.reset();
        assert_eq!(f.value(), None);
        assert_eq!(f.filter(5.0), 5.0);
    }
}
