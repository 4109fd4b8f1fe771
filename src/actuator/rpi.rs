//! Raspberry Pi hardware: PCA9685 servo driver over I2C and GPIO step/dir pins.

use rppal::gpio::{Gpio, Level, OutputPin};
use rppal::i2c::I2c;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use super::servo::{angle_to_pulse_us, prescale_for, pulse_to_ticks, ServoBus};
use super::stepper::StepperPins;
use super::ActuatorError;
use crate::config::{ServoConfig, StepperConfig};

const MODE1: u8 = 0x00;
const PRESCALE: u8 = 0xFE;
const LED0_ON_L: u8 = 0x06;
const ALL_LED_OFF_H: u8 = 0xFD;

const MODE1_SLEEP: u8 = 0x10;
const MODE1_AUTO_INCREMENT: u8 = 0x20;
const MODE1_RESTART: u8 = 0x80;
const LED_FULL_OFF: u8 = 0x10;

pub struct Pca9685 {
    i2c: I2c,
    frequency_hz: u32,
    pulse_min_us: f64,
    pulse_max_us: f64,
    actuation_range: f64,
}

fn unavailable(context: &str, e: impl std::fmt::Display) -> ActuatorError {
    ActuatorError::Unavailable(format!("{}: {}", context, e))
}

impl Pca9685 {
    pub fn open(config: &ServoConfig) -> Result<Self, ActuatorError> {
        let mut i2c = I2c::new().map_err(|e| unavailable("open i2c bus", e))?;
        i2c.set_slave_address(config.i2c_address)
            .map_err(|e| unavailable("set i2c address", e))?;

        let mut driver = Self {
            i2c,
            frequency_hz: config.frequency_hz,
            pulse_min_us: config.pulse_min_us as f64,
            pulse_max_us: config.pulse_max_us as f64,
            actuation_range: config.actuation_range,
        };
        driver
            .configure_frequency()
            .map_err(|e| unavailable("configure PCA9685", e))?;
        Ok(driver)
    }

    fn configure_frequency(&mut self) -> rppal::i2c::Result<()> {
        // prescale is only writable while asleep
        self.i2c.smbus_write_byte(MODE1, MODE1_SLEEP)?;
        self.i2c
            .smbus_write_byte(PRESCALE, prescale_for(self.frequency_hz))?;
        self.i2c.smbus_write_byte(MODE1, MODE1_AUTO_INCREMENT)?;
        thread::sleep(Duration::from_millis(5));
        self.i2c
            .smbus_write_byte(MODE1, MODE1_AUTO_INCREMENT | MODE1_RESTART)
    }

    fn write_channel(&mut self, channel: u8, off_ticks: u16) -> rppal::i2c::Result<()> {
        let base = LED0_ON_L + 4 * channel;
        self.i2c.smbus_write_byte(base, 0)?;
        self.i2c.smbus_write_byte(base + 1, 0)?;
        self.i2c.smbus_write_byte(base + 2, (off_ticks & 0xFF) as u8)?;
        self.i2c.smbus_write_byte(base + 3, (off_ticks >> 8) as u8)
    }
}

impl ServoBus for Pca9685 {
    fn set_angle(&mut self, channel: u8, angle: f64) -> Result<(), ActuatorError> {
        if channel > 15 {
            return Err(ActuatorError::Bus {
                channel,
                message: "PCA9685 has 16 channels".to_string(),
            });
        }
        let pulse = angle_to_pulse_us(angle, self.pulse_min_us, self.pulse_max_us, self.actuation_range);
        let ticks = pulse_to_ticks(pulse, self.frequency_hz);
        self.write_channel(channel, ticks)
            .map_err(|e| ActuatorError::Bus {
                channel,
                message: e.to_string(),
            })
    }

    fn release(&mut self) -> Result<(), ActuatorError> {
        self.i2c
            .smbus_write_byte(ALL_LED_OFF_H, LED_FULL_OFF)
            .and_then(|_| self.i2c.smbus_write_byte(MODE1, MODE1_SLEEP))
            .map_err(|e| ActuatorError::Bus {
                channel: 0,
                message: e.to_string(),
            })
    }
}

/// Output pins for every configured motor, driven low at open
pub struct GpioStepperPins {
    pins: HashMap<u8, OutputPin>,
}

impl GpioStepperPins {
    pub fn open(config: &StepperConfig) -> Result<Self, ActuatorError> {
        let gpio = Gpio::new().map_err(|e| unavailable("open gpio", e))?;
        let mut pins = HashMap::new();
        for motor in &config.motors {
            let numbers = [Some(motor.step_pin), Some(motor.dir_pin), motor.enable_pin];
            for number in numbers.into_iter().flatten() {
                if pins.contains_key(&number) {
                    continue;
                }
                let pin = gpio
                    .get(number)
                    .map_err(|e| ActuatorError::Pin {
                        pin: number,
                        message: e.to_string(),
                    })?
                    .into_output_low();
                pins.insert(number, pin);
            }
        }
        Ok(Self { pins })
    }
}

impl StepperPins for GpioStepperPins {
    fn write(&mut self, pin: u8, high: bool) -> Result<(), ActuatorError> {
        let output = self.pins.get_mut(&pin).ok_or_else(|| ActuatorError::Pin {
            pin,
            message: "pin not configured".to_string(),
        })?;
        output.write(if high { Level::High } else { Level::Low });
        Ok(())
    }
}
