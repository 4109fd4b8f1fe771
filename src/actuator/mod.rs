pub mod dry_run;
#[cfg(feature = "rpi")]
pub mod rpi;
pub mod servo;
pub mod stepper;

pub use dry_run::DryRunActuator;
pub use servo::{ServoActuator, ServoBus};
pub use stepper::{StepperActuator, StepperPins};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{ActuatorBackend, Config};

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("bus error on channel {channel}: {message}")]
    Bus { channel: u8, message: String },
    #[error("gpio error on pin {pin}: {message}")]
    Pin { pin: u8, message: String },
    #[error("actuator hardware unavailable: {0}")]
    Unavailable(String),
}

/// The segment driver selected at startup.
///
/// Backends never fail a tick: per-unit errors are logged and skipped.
/// Each backend releases its hardware on `close()` or on drop, whichever
/// comes first.
pub enum Actuator {
    Servo(ServoActuator<Box<dyn ServoBus>>),
    Stepper(StepperActuator<Box<dyn StepperPins>>),
    DryRun(DryRunActuator),
}

impl Actuator {
    /// Open the configured backend, falling back to dry-run when it is
    /// disabled, `dry_run` is set, or the hardware cannot be opened.
    pub fn from_config(config: &Config, dry_run: bool) -> Self {
        match config.actuator.backend {
            ActuatorBackend::Servo => {
                if dry_run || !config.servo.enabled {
                    info!("Servo output: dry-run");
                    return Self::DryRun(DryRunActuator::servo(config.servo.channels.clone()));
                }
                match open_servo_bus(config) {
                    Ok(bus) => {
                        info!(
                            "Servo output: PCA9685 at 0x{:02x}, {} channels",
                            config.servo.i2c_address,
                            config.servo.channels.len()
                        );
                        Self::Servo(ServoActuator::new(bus, config.servo.channels.clone()))
                    }
                    Err(e) => {
                        error!("Failed to initialize servo driver: {}", e);
                        warn!("Falling back to dry-run servo output");
                        Self::DryRun(DryRunActuator::servo(config.servo.channels.clone()))
                    }
                }
            }
            ActuatorBackend::Stepper => {
                if dry_run || !config.stepper.enabled {
                    info!("Stepper output: dry-run");
                    return Self::DryRun(DryRunActuator::stepper(&config.stepper));
                }
                match open_stepper_pins(config) {
                    Ok(pins) => {
                        info!("Stepper output: {} motors", config.stepper.motors.len());
                        Self::Stepper(StepperActuator::new(pins, &config.stepper))
                    }
                    Err(e) => {
                        error!("Failed to initialize stepper driver: {}", e);
                        warn!("Falling back to dry-run stepper output");
                        Self::DryRun(DryRunActuator::stepper(&config.stepper))
                    }
                }
            }
        }
    }

    pub fn set_angles(&mut self, angles: &[f64]) {
        match self {
            Self::Servo(a) => a.set_angles(angles),
            Self::Stepper(a) => a.set_angles(angles),
            Self::DryRun(a) => a.set_angles(angles),
        }
    }

    pub fn close(&mut self) {
        match self {
            Self::Servo(a) => a.close(),
            Self::Stepper(a) => a.close(),
            Self::DryRun(a) => a.close(),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, Self::DryRun(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Servo(_) => "servo",
            Self::Stepper(_) => "stepper",
            Self::DryRun(_) => "dry-run",
        }
    }
}

#[cfg(feature = "rpi")]
fn open_servo_bus(config: &Config) -> Result<Box<dyn ServoBus>, ActuatorError> {
    Ok(Box::new(rpi::Pca9685::open(&config.servo)?))
}

#[cfg(not(feature = "rpi"))]
fn open_servo_bus(_config: &Config) -> Result<Box<dyn ServoBus>, ActuatorError> {
    Err(ActuatorError::Unavailable(
        "built without the `rpi` feature".to_string(),
    ))
}

#[cfg(feature = "rpi")]
fn open_stepper_pins(config: &Config) -> Result<Box<dyn StepperPins>, ActuatorError> {
    Ok(Box::new(rpi::GpioStepperPins::open(&config.stepper)?))
}

#[cfg(not(feature = "rpi"))]
fn open_stepper_pins(_config: &Config) -> Result<Box<dyn StepperPins>, ActuatorError> {
    Err(ActuatorError::Unavailable(
        "built without the `rpi` feature".to_string(),
    ))
}
