/// alpha = 1 / (1 + tau/dt), tau = 1/(2*pi*fc)
fn smoothing_factor(dt: f64, cutoff: f64) -> f64 {
    if dt <= 0.0 {
        return 1.0;
    }
    let tau = 1.0 / (2.0 * std::f64::consts::PI * cutoff);
    1.0 / (1.0 + tau / dt)
}

/// One Euro Filter for a single scalar value.
///
/// The derivative is taken against the previous filtered value and smoothed
/// with its own cutoff `d_cutoff`; the value cutoff then rises with speed as
/// `min_cutoff + beta * |derivative|`.
#[derive(Debug, Clone)]
pub struct OneEuroFilter {
    min_cutoff: f64,
    beta: f64,
    d_cutoff: f64,
    value: Option<f64>,
    derivative: f64,
}

impl OneEuroFilter {
    pub fn new(min_cutoff: f64, beta: f64, d_cutoff: f64) -> Self {
        Self {
            min_cutoff,
            beta,
            d_cutoff,
            value: None,
            derivative: 0.0,
        }
    }

    pub fn filter(&mut self, value: f64, dt: f64) -> f64 {
        let prev = match self.value {
            Some(prev) => prev,
            None => {
                self.value = Some(value);
                return value;
            }
        };

        let dx = (value - prev) / dt.max(1e-6);
        let alpha_d = smoothing_factor(dt, self.d_cutoff);
        self.derivative = alpha_d * dx + (1.0 - alpha_d) * self.derivative;

        let cutoff = self.min_cutoff + self.beta * self.derivative.abs();
        let alpha = smoothing_factor(dt, cutoff);
        let result = alpha * value + (1.0 - alpha) * prev;
        self.value = Some(result);
        result
    }

    pub fn derivative(&self) -> f64 {
        self.derivative
    }

    pub fn reset(&mut self) {
        self.value = None;
        self.derivative = 0.0;
    }
}
