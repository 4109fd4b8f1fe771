use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::ActuatorError;
use crate::config::{MotorConfig, StepperConfig};

/// Digital outputs driving step/dir/enable lines
pub trait StepperPins {
    fn write(&mut self, pin: u8, high: bool) -> Result<(), ActuatorError>;

    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<P: StepperPins + ?Sized> StepperPins for Box<P> {
    fn write(&mut self, pin: u8, high: bool) -> Result<(), ActuatorError> {
        (**self).write(pin, high)
    }

    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration)
    }
}

/// Absolute step targets per motor; `None` when the motor's angle index is
/// outside the angle vector.
pub fn step_targets(angles: &[f64], motors: &[MotorConfig], steps_per_deg: f64) -> Vec<Option<i64>> {
    motors
        .iter()
        .enumerate()
        .map(|(i, motor)| {
            let index = motor.angle_index.unwrap_or(i);
            angles
                .get(index)
                .map(|angle| (angle * steps_per_deg).round() as i64)
        })
        .collect()
}

/// Steps a motor may take in `dt` seconds. Zero when the rate is not positive.
pub fn step_budget(max_steps_per_sec: f64, dt: f64) -> u64 {
    if max_steps_per_sec <= 0.0 || dt <= 0.0 {
        return 0;
    }
    (max_steps_per_sec * dt).floor() as u64
}

/// Half of one step period
pub fn half_period(max_steps_per_sec: f64, min_pulse_us: f64) -> Duration {
    let min_pulse = min_pulse_us.max(0.0) / 1_000_000.0;
    let secs = if max_steps_per_sec > 0.0 {
        min_pulse.max(0.5 / max_steps_per_sec)
    } else {
        min_pulse
    };
    Duration::from_secs_f64(secs)
}

/// Step/dir drivers (DRV8825-style), one per motor.
///
/// Tracks each motor's absolute position in steps. The first command only
/// seeds positions; later commands move every motor toward its target by at
/// most `floor(max_steps_per_sec * dt)` steps, leaving the remainder for
/// following ticks.
pub struct StepperActuator<P: StepperPins> {
    pins: P,
    motors: Vec<MotorConfig>,
    steps_per_deg: f64,
    max_steps_per_sec: f64,
    half_period: Duration,
    positions: Vec<i64>,
    seeded: bool,
    last_update: Option<Instant>,
    closed: bool,
}

impl<P: StepperPins> StepperActuator<P> {
    pub fn new(pins: P, config: &StepperConfig) -> Self {
        let mut actuator = Self {
            pins,
            motors: config.motors.clone(),
            steps_per_deg: config.steps_per_deg(),
            max_steps_per_sec: config.max_steps_per_sec,
            half_period: half_period(config.max_steps_per_sec, config.min_pulse_us),
            positions: vec![0; config.motors.len()],
            seeded: false,
            last_update: None,
            closed: false,
        };
        actuator.set_enabled(true);
        actuator
    }

    pub fn positions(&self) -> &[i64] {
        &self.positions
    }

    pub fn set_angles(&mut self, angles: &[f64]) {
        let now = Instant::now();
        let dt = self
            .last_update
            .map(|t| now.saturating_duration_since(t).as_secs_f64())
            .unwrap_or(0.0);
        self.last_update = Some(now);
        self.step_towards(angles, dt);
    }

    /// Move toward `angles` using the step budget for `dt` seconds
    pub fn step_towards(&mut self, angles: &[f64], dt: f64) {
        if self.closed || self.motors.is_empty() {
            return;
        }

        let targets = step_targets(angles, &self.motors, self.steps_per_deg);
        if !self.seeded {
            self.positions = targets.iter().map(|t| t.unwrap_or(0)).collect();
            self.seeded = true;
            info!("Stepper initialized at targets: {:?}", targets);
            return;
        }

        let budget = step_budget(self.max_steps_per_sec, dt);
        for (idx, target) in targets.into_iter().enumerate() {
            let Some(target) = target else {
                continue;
            };
            let delta = target - self.positions[idx];
            let steps = delta.unsigned_abs().min(budget);
            if steps == 0 {
                continue;
            }
            let issued = self.pulse(idx, delta > 0, steps);
            if delta > 0 {
                self.positions[idx] += issued as i64;
            } else {
                self.positions[idx] -= issued as i64;
            }
        }
    }

    /// Returns the number of steps actually issued
    fn pulse(&mut self, idx: usize, forward: bool, steps: u64) -> u64 {
        let step_pin = self.motors[idx].step_pin;
        let dir_pin = self.motors[idx].dir_pin;

        if let Err(e) = self.pins.write(dir_pin, forward) {
            error!(motor = idx, "Stepper direction write failed: {}", e);
            return 0;
        }

        for issued in 0..steps {
            let result = self
                .pins
                .write(step_pin, true)
                .and_then(|_| {
                    self.pins.delay(self.half_period);
                    self.pins.write(step_pin, false)
                });
            if let Err(e) = result {
                error!(motor = idx, "Stepper pulse failed after {} steps: {}", issued, e);
                return issued;
            }
            self.pins.delay(self.half_period);
        }
        debug!(motor = idx, steps, forward, "Stepped");
        steps
    }

    fn set_enabled(&mut self, enabled: bool) {
        for (idx, motor) in self.motors.iter().enumerate() {
            let Some(pin) = motor.enable_pin else {
                continue;
            };
            let level = enabled != motor.enable_active_low;
            if let Err(e) = self.pins.write(pin, level) {
                error!(motor = idx, "Stepper enable write failed: {}", e);
            }
        }
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.set_enabled(false);
        info!("Stepper output closed");
    }

    pub fn pins(&self) -> &P {
        &self.pins
    }
}

impl<P: StepperPins> Drop for StepperActuator<P> {
    fn drop(&mut self) {
        self.close();
    }
}
