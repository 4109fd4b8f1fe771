use tracing::{debug, info};

use super::stepper::step_targets;
use crate::config::{MotorConfig, StepperConfig};

#[derive(Debug, Clone)]
enum Target {
    Servo { channels: Vec<u8> },
    Stepper {
        motors: Vec<MotorConfig>,
        steps_per_deg: f64,
        seeded: bool,
    },
}

/// Logs commanded angles instead of driving hardware
#[derive(Debug, Clone)]
pub struct DryRunActuator {
    target: Target,
    last: Option<Vec<f64>>,
    commands: u64,
}

impl DryRunActuator {
    pub fn servo(channels: Vec<u8>) -> Self {
        Self {
            target: Target::Servo { channels },
            last: None,
            commands: 0,
        }
    }

    /// Translates angles to step targets like the real driver, without pulsing
    pub fn stepper(config: &StepperConfig) -> Self {
        Self {
            target: Target::Stepper {
                motors: config.motors.clone(),
                steps_per_deg: config.steps_per_deg(),
                seeded: false,
            },
            last: None,
            commands: 0,
        }
    }

    pub fn set_angles(&mut self, angles: &[f64]) {
        self.commands += 1;
        match &mut self.target {
            Target::Servo { channels } => {
                let rounded: Vec<f64> = angles
                    .iter()
                    .take(channels.len())
                    .map(|a| (a * 10.0).round() / 10.0)
                    .collect();
                debug!("Dry-run angles: {:?}", rounded);
            }
            Target::Stepper {
                motors,
                steps_per_deg,
                seeded,
            } => {
                if motors.is_empty() {
                    return;
                }
                let targets = step_targets(angles, motors, *steps_per_deg);
                if !*seeded {
                    *seeded = true;
                    info!("Dry-run stepper initialized at targets: {:?}", targets);
                } else {
                    debug!("Dry-run stepper targets: {:?}", targets);
                }
            }
        }
        self.last = Some(angles.to_vec());
    }

    pub fn close(&mut self) {}

    /// Most recent command, if any
    pub fn last_angles(&self) -> Option<&[f64]> {
        self.last.as_deref()
    }

    pub fn commands(&self) -> u64 {
        self.commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_last_command() {
        let mut a = DryRunActuator::servo(vec![0, 1]);
        assert_eq!(a.last_angles(), None);
        a.set_angles(&[10.0, 20.0]);
        a.set_angles(&[11.0, 21.0]);
        assert_eq!(a.last_angles(), Some(&[11.0, 21.0][..]));
        assert_eq!(a.commands(), 2);
    }

    #[test]
    fn test_stepper_dry_run_accepts_commands() {
        let mut a = DryRunActuator::stepper(&StepperConfig::default());
        a.set_angles(&[90.0; 8]);
        a.set_angles(&[95.0; 8]);
        assert_eq!(a.commands(), 2);
        assert_eq!(a.last_angles().map(|v| v.len()), Some(8));
    }
}
