use tracing::{error, info};

use super::ActuatorError;

/// PCA9685 internal oscillator (Hz)
pub const PCA9685_OSC_HZ: f64 = 25_000_000.0;
/// PWM counter resolution
pub const PCA9685_TICKS: f64 = 4096.0;

/// One PWM driver addressed by channel
pub trait ServoBus {
    fn set_angle(&mut self, channel: u8, angle: f64) -> Result<(), ActuatorError>;

    /// Stop driving all outputs
    fn release(&mut self) -> Result<(), ActuatorError> {
        Ok(())
    }
}

impl<B: ServoBus + ?Sized> ServoBus for Box<B> {
    fn set_angle(&mut self, channel: u8, angle: f64) -> Result<(), ActuatorError> {
        (**self).set_angle(channel, angle)
    }

    fn release(&mut self) -> Result<(), ActuatorError> {
        (**self).release()
    }
}

/// Pulse width (µs) for an angle, linear over `[0, actuation_range]`
pub fn angle_to_pulse_us(angle: f64, pulse_min_us: f64, pulse_max_us: f64, actuation_range: f64) -> f64 {
    if actuation_range <= 0.0 || !angle.is_finite() {
        return pulse_min_us;
    }
    let fraction = (angle / actuation_range).clamp(0.0, 1.0);
    pulse_min_us + fraction * (pulse_max_us - pulse_min_us)
}

/// PRESCALE register value for a PWM frequency
pub fn prescale_for(frequency_hz: u32) -> u8 {
    let freq = frequency_hz.max(1) as f64;
    let value = (PCA9685_OSC_HZ / (PCA9685_TICKS * freq)).round() - 1.0;
    value.clamp(3.0, 255.0) as u8
}

/// Counter value at which a channel turns off for the given pulse width
pub fn pulse_to_ticks(pulse_us: f64, frequency_hz: u32) -> u16 {
    let period_us = 1_000_000.0 / frequency_hz.max(1) as f64;
    let ticks = (pulse_us / period_us * PCA9685_TICKS).round();
    ticks.clamp(0.0, PCA9685_TICKS - 1.0) as u16
}

/// Drives one servo per segment on a PWM bus
pub struct ServoActuator<B: ServoBus> {
    bus: B,
    channels: Vec<u8>,
    closed: bool,
}

impl<B: ServoBus> ServoActuator<B> {
    pub fn new(bus: B, channels: Vec<u8>) -> Self {
        Self {
            bus,
            channels,
            closed: false,
        }
    }

    /// Extra angles beyond the channel count are ignored
    pub fn set_angles(&mut self, angles: &[f64]) {
        if self.closed {
            return;
        }
        for (&channel, &angle) in self.channels.iter().zip(angles) {
            if let Err(e) = self.bus.set_angle(channel, angle) {
                error!(channel, "Servo write failed: {}", e);
            }
        }
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.bus.release() {
            error!("Servo release failed: {}", e);
        }
        info!("Servo output closed");
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B: ServoBus> Drop for ServoActuator<B> {
    fn drop(&mut self) {
        self.close();
    }
}
