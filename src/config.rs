use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::metrics::{MetricDegrees, MetricKind};

/// Minimum gap kept between a ramp's activation threshold and its full scale
pub const FULL_SCALE_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub actuator: ActuatorConfig,
    #[serde(default)]
    pub servo: ServoConfig,
    #[serde(default)]
    pub stepper: StepperConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

// --- metrics ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Ema,
    OneEuro,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmoothingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_filter_kind")]
    pub kind: FilterKind,
    /// EMA weight of the newest sample
    #[serde(default = "default_smoothing_alpha")]
    pub alpha: f64,
    #[serde(default = "default_one_euro_min_cutoff")]
    pub one_euro_min_cutoff: f64,
    #[serde(default = "default_one_euro_beta")]
    pub one_euro_beta: f64,
    #[serde(default = "default_one_euro_d_cutoff")]
    pub one_euro_d_cutoff: f64,
}

fn default_true() -> bool { true }
fn default_filter_kind() -> FilterKind { FilterKind::Ema }
fn default_smoothing_alpha() -> f64 { 0.2 }
fn default_one_euro_min_cutoff() -> f64 { 1.2 }
fn default_one_euro_beta() -> f64 { 0.02 }
fn default_one_euro_d_cutoff() -> f64 { 1.0 }

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            kind: default_filter_kind(),
            alpha: default_smoothing_alpha(),
            one_euro_min_cutoff: default_one_euro_min_cutoff(),
            one_euro_beta: default_one_euro_beta(),
            one_euro_d_cutoff: default_one_euro_d_cutoff(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f64,
    /// Estimate neck angle from ear + shoulders when hips are out of frame
    #[serde(default = "default_true")]
    pub enable_upper_body_fallback: bool,
    #[serde(default)]
    pub smoothing: SmoothingConfig,
    /// Freeze the last value this long after a metric drops out
    #[serde(default = "default_hold_seconds")]
    pub hold_seconds: f64,
    /// Time constant of the return to neutral after the hold expires
    #[serde(default = "default_decay_seconds")]
    pub decay_seconds: f64,
}

fn default_visibility_threshold() -> f64 { 0.5 }
fn default_hold_seconds() -> f64 { 0.5 }
fn default_decay_seconds() -> f64 { 1.5 }

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: default_visibility_threshold(),
            enable_upper_body_fallback: default_true(),
            smoothing: SmoothingConfig::default(),
            hold_seconds: default_hold_seconds(),
            decay_seconds: default_decay_seconds(),
        }
    }
}

// --- mapping ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    SpineBlend,
    HunchPush,
}

/// Degrees of bend per unit of normalized signal
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GainConfig {
    #[serde(default = "default_gain_lean")]
    pub lean: f64,
    #[serde(default = "default_gain_neck")]
    pub neck: f64,
    #[serde(default = "default_gain_tilt")]
    pub tilt: f64,
}

fn default_gain_lean() -> f64 { 30.0 }
fn default_gain_neck() -> f64 { 25.0 }
fn default_gain_tilt() -> f64 { 10.0 }

impl Default for GainConfig {
    fn default() -> Self {
        Self {
            lean: default_gain_lean(),
            neck: default_gain_neck(),
            tilt: default_gain_tilt(),
        }
    }
}

/// Threshold → full-scale ramp shared by hunch_push and the feedback mappers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ramp {
    pub activation_threshold: f64,
    pub full_scale: f64,
}

impl Ramp {
    pub fn new(activation_threshold: f64, full_scale: f64) -> Self {
        Self {
            activation_threshold,
            full_scale: repaired_full_scale(activation_threshold, full_scale),
        }
    }

    /// Linear 0..1 response between threshold and full scale
    pub fn apply(&self, value: f64) -> f64 {
        if value <= self.activation_threshold {
            return 0.0;
        }
        let span = self.full_scale - self.activation_threshold;
        ((value - self.activation_threshold) / span).clamp(0.0, 1.0)
    }
}

pub fn repaired_full_scale(activation_threshold: f64, full_scale: f64) -> f64 {
    if full_scale <= activation_threshold {
        activation_threshold + FULL_SCALE_EPSILON
    } else {
        full_scale
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HunchPushConfig {
    #[serde(default = "default_hunch_source")]
    pub source: MetricKind,
    #[serde(default = "default_true")]
    pub use_absolute: bool,
    #[serde(default = "default_hunch_threshold")]
    pub activation_threshold: f64,
    #[serde(default = "default_hunch_full_scale")]
    pub full_scale: f64,
    #[serde(default = "default_max_push_deg")]
    pub max_push_deg: f64,
}

fn default_hunch_source() -> MetricKind { MetricKind::Neck }
fn default_hunch_threshold() -> f64 { 0.1 }
fn default_hunch_full_scale() -> f64 { 0.8 }
fn default_max_push_deg() -> f64 { 30.0 }

impl Default for HunchPushConfig {
    fn default() -> Self {
        Self {
            source: default_hunch_source(),
            use_absolute: default_true(),
            activation_threshold: default_hunch_threshold(),
            full_scale: default_hunch_full_scale(),
            max_push_deg: default_max_push_deg(),
        }
    }
}

impl HunchPushConfig {
    pub fn ramp(&self) -> Ramp {
        Ramp::new(self.activation_threshold, self.full_scale)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MappingConfig {
    #[serde(default = "default_control_mode")]
    pub control_mode: ControlMode,
    #[serde(default = "default_segments")]
    pub segments: usize,
    #[serde(default = "default_neutral_angles")]
    pub neutral_angles: Vec<f64>,
    #[serde(default = "default_min_angles")]
    pub min_angles: Vec<f64>,
    #[serde(default = "default_max_angles")]
    pub max_angles: Vec<f64>,
    #[serde(default = "default_weights")]
    pub weights: Vec<f64>,
    #[serde(default = "default_upper_weights")]
    pub upper_weights: Vec<f64>,
    #[serde(default = "default_directions")]
    pub directions: Vec<f64>,
    /// First segment that also follows the neck signal; `segments / 2` when unset
    #[serde(default)]
    pub upper_segment_start: Option<usize>,
    #[serde(default)]
    pub gain: GainConfig,
    #[serde(default)]
    pub hunch_push: HunchPushConfig,
    #[serde(default = "default_deadband_deg")]
    pub deadband_deg: f64,
    #[serde(default = "default_max_deg_per_sec")]
    pub max_deg_per_sec: f64,
}

const DEFAULT_SEGMENTS: usize = 8;
const NEUTRAL_FILL: f64 = 90.0;
const MIN_ANGLE_FILL: f64 = 30.0;
const MAX_ANGLE_FILL: f64 = 150.0;
const DIRECTION_FILL: f64 = 1.0;
const WEIGHT_FILL: f64 = 0.5;

fn default_control_mode() -> ControlMode { ControlMode::SpineBlend }
fn default_segments() -> usize { DEFAULT_SEGMENTS }
fn default_neutral_angles() -> Vec<f64> { vec![NEUTRAL_FILL; DEFAULT_SEGMENTS] }
fn default_min_angles() -> Vec<f64> { vec![MIN_ANGLE_FILL; DEFAULT_SEGMENTS] }
fn default_max_angles() -> Vec<f64> { vec![MAX_ANGLE_FILL; DEFAULT_SEGMENTS] }
fn default_weights() -> Vec<f64> { vec![0.2, 0.4, 0.6, 0.8, 0.8, 0.6, 0.4, 0.2] }
fn default_upper_weights() -> Vec<f64> { vec![0.1, 0.2, 0.4, 0.6, 0.8, 0.8, 0.6, 0.4] }
fn default_directions() -> Vec<f64> { vec![DIRECTION_FILL; DEFAULT_SEGMENTS] }
fn default_deadband_deg() -> f64 { 1.0 }
fn default_max_deg_per_sec() -> f64 { 120.0 }

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            control_mode: default_control_mode(),
            segments: default_segments(),
            neutral_angles: default_neutral_angles(),
            min_angles: default_min_angles(),
            max_angles: default_max_angles(),
            weights: default_weights(),
            upper_weights: default_upper_weights(),
            directions: default_directions(),
            upper_segment_start: Some(DEFAULT_SEGMENTS / 2),
            gain: GainConfig::default(),
            hunch_push: HunchPushConfig::default(),
            deadband_deg: default_deadband_deg(),
            max_deg_per_sec: default_max_deg_per_sec(),
        }
    }
}

/// Bell-shaped weights peaking in the middle segments
pub fn bell_weights(count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let mid = (count - 1) as f64 / 2.0;
            let span = mid.max(1.0);
            (0..count)
                .map(|i| 0.2 + 0.8 * (1.0 - (i as f64 - mid).abs() / span))
                .collect()
        }
    }
}

fn fit_to_len(values: &mut Vec<f64>, len: usize, fill: f64) {
    values.resize(len, fill);
}

impl MappingConfig {
    pub fn upper_start(&self) -> usize {
        self.upper_segment_start.unwrap_or(self.segments / 2)
    }

    pub fn normalize(&mut self) {
        self.segments = self.segments.max(1);
        let n = self.segments;

        if self.weights.is_empty() {
            self.weights = bell_weights(n);
        }
        fit_to_len(&mut self.weights, n, WEIGHT_FILL);
        if self.upper_weights.is_empty() {
            self.upper_weights = self.weights.clone();
        }
        fit_to_len(&mut self.upper_weights, n, WEIGHT_FILL);
        fit_to_len(&mut self.neutral_angles, n, NEUTRAL_FILL);
        fit_to_len(&mut self.min_angles, n, MIN_ANGLE_FILL);
        fit_to_len(&mut self.max_angles, n, MAX_ANGLE_FILL);
        fit_to_len(&mut self.directions, n, DIRECTION_FILL);

        let start = self.upper_segment_start.unwrap_or(n / 2);
        self.upper_segment_start = Some(start.min(n - 1));

        self.hunch_push.full_scale = repaired_full_scale(
            self.hunch_push.activation_threshold,
            self.hunch_push.full_scale,
        );
        self.deadband_deg = self.deadband_deg.max(0.0);
        self.max_deg_per_sec = self.max_deg_per_sec.max(0.0);
    }
}

// --- calibration ---

#[derive(Debug, Clone, Deserialize)]
pub struct CalibrationConfig {
    /// Resting posture offsets (degrees)
    #[serde(default)]
    pub baseline: MetricDegrees,
    /// Degrees that map to a full-scale ±1 signal
    #[serde(default = "default_normalization")]
    pub normalization: MetricDegrees,
    /// Optional calibration JSON overriding baseline and segment angles
    #[serde(default)]
    pub file: Option<String>,
}

fn default_normalization() -> MetricDegrees {
    MetricDegrees::new(25.0, 25.0, 15.0)
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            baseline: MetricDegrees::ZERO,
            normalization: default_normalization(),
            file: None,
        }
    }
}

// --- actuators ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorBackend {
    Servo,
    Stepper,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActuatorConfig {
    #[serde(default = "default_actuator_backend")]
    pub backend: ActuatorBackend,
}

fn default_actuator_backend() -> ActuatorBackend { ActuatorBackend::Servo }

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            backend: default_actuator_backend(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServoConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_i2c_address", deserialize_with = "deserialize_address")]
    pub i2c_address: u16,
    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: u32,
    #[serde(default = "default_channels")]
    pub channels: Vec<u8>,
    #[serde(default = "default_pulse_min_us")]
    pub pulse_min_us: u32,
    #[serde(default = "default_pulse_max_us")]
    pub pulse_max_us: u32,
    #[serde(default = "default_actuation_range")]
    pub actuation_range: f64,
}

fn default_i2c_address() -> u16 { 0x40 }
fn default_frequency_hz() -> u32 { 50 }
fn default_channels() -> Vec<u8> { (0..DEFAULT_SEGMENTS as u8).collect() }
fn default_pulse_min_us() -> u32 { 500 }
fn default_pulse_max_us() -> u32 { 2500 }
fn default_actuation_range() -> f64 { 180.0 }

/// Accepts `64`, `0x40` or `"0x40"`
fn deserialize_address<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Address {
        Int(u16),
        Text(String),
    }

    match Address::deserialize(deserializer)? {
        Address::Int(v) => Ok(v),
        Address::Text(s) => parse_address(&s).map_err(serde::de::Error::custom),
    }
}

fn parse_address(s: &str) -> std::result::Result<u16, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid i2c address {:?}: {}", s, e))
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            i2c_address: default_i2c_address(),
            frequency_hz: default_frequency_hz(),
            channels: default_channels(),
            pulse_min_us: default_pulse_min_us(),
            pulse_max_us: default_pulse_max_us(),
            actuation_range: default_actuation_range(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MotorConfig {
    pub step_pin: u8,
    pub dir_pin: u8,
    #[serde(default)]
    pub enable_pin: Option<u8>,
    #[serde(default = "default_true")]
    pub enable_active_low: bool,
    /// Entry of the angle vector this motor follows; its own position when unset
    #[serde(default)]
    pub angle_index: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepperConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_steps_per_rev")]
    pub steps_per_rev: u32,
    #[serde(default = "default_microstep")]
    pub microstep: u32,
    #[serde(default = "default_max_steps_per_sec")]
    pub max_steps_per_sec: f64,
    #[serde(default = "default_min_pulse_us")]
    pub min_pulse_us: f64,
    #[serde(default = "default_motors")]
    pub motors: Vec<MotorConfig>,
}

fn default_steps_per_rev() -> u32 { 200 }
fn default_microstep() -> u32 { 1 }
fn default_max_steps_per_sec() -> f64 { 800.0 }
fn default_min_pulse_us() -> f64 { 2.0 }
fn default_motors() -> Vec<MotorConfig> {
    vec![MotorConfig {
        step_pin: 18,
        dir_pin: 23,
        enable_pin: Some(24),
        enable_active_low: true,
        angle_index: Some(0),
    }]
}

impl Default for StepperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            steps_per_rev: default_steps_per_rev(),
            microstep: default_microstep(),
            max_steps_per_sec: default_max_steps_per_sec(),
            min_pulse_us: default_min_pulse_us(),
            motors: default_motors(),
        }
    }
}

impl StepperConfig {
    pub fn steps_per_deg(&self) -> f64 {
        (self.steps_per_rev * self.microstep) as f64 / 360.0
    }
}

// --- feedback ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackMode {
    Brightness,
    DryRun,
    /// Brightness plus dry-run logging
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSource {
    FaceProximity,
    Lean,
    Neck,
    Tilt,
}

impl FeedbackSource {
    pub fn metric(&self) -> Option<MetricKind> {
        match self {
            Self::FaceProximity => None,
            Self::Lean => Some(MetricKind::Lean),
            Self::Neck => Some(MetricKind::Neck),
            Self::Tilt => Some(MetricKind::Tilt),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaceProximityConfig {
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f64,
    /// Valid face scales collected before proximity is reported
    #[serde(default = "default_baseline_samples")]
    pub baseline_samples: u32,
    #[serde(default = "default_baseline_alpha")]
    pub baseline_alpha: f64,
}

fn default_baseline_samples() -> u32 { 20 }
fn default_baseline_alpha() -> f64 { 0.2 }

impl Default for FaceProximityConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: default_visibility_threshold(),
            baseline_samples: default_baseline_samples(),
            baseline_alpha: default_baseline_alpha(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrightnessConfig {
    #[serde(default = "default_min_percent")]
    pub min_percent: f64,
    #[serde(default = "default_max_percent")]
    pub max_percent: f64,
    #[serde(default = "default_brightness_interval")]
    pub update_interval_sec: f64,
    #[serde(default = "default_min_delta_percent")]
    pub min_delta_percent: f64,
    /// Shell command run per update; `{percent}` and `{scalar}` are substituted
    #[serde(default)]
    pub command_template: String,
}

fn default_min_percent() -> f64 { 35.0 }
fn default_max_percent() -> f64 { 100.0 }
fn default_brightness_interval() -> f64 { 0.3 }
fn default_min_delta_percent() -> f64 { 2.0 }

impl Default for BrightnessConfig {
    fn default() -> Self {
        Self {
            min_percent: default_min_percent(),
            max_percent: default_max_percent(),
            update_interval_sec: default_brightness_interval(),
            min_delta_percent: default_min_delta_percent(),
            command_template: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_feedback_mode")]
    pub mode: FeedbackMode,
    #[serde(default = "default_feedback_source")]
    pub source: FeedbackSource,
    #[serde(default)]
    pub use_absolute: bool,
    #[serde(default = "default_feedback_threshold")]
    pub activation_threshold: f64,
    #[serde(default = "default_feedback_full_scale")]
    pub full_scale: f64,
    #[serde(default = "default_feedback_alpha")]
    pub smoothing_alpha: f64,
    #[serde(default)]
    pub face_proximity: FaceProximityConfig,
    #[serde(default)]
    pub brightness: BrightnessConfig,
}

fn default_feedback_mode() -> FeedbackMode { FeedbackMode::Brightness }
fn default_feedback_source() -> FeedbackSource { FeedbackSource::FaceProximity }
fn default_feedback_threshold() -> f64 { 1.05 }
fn default_feedback_full_scale() -> f64 { 1.25 }
fn default_feedback_alpha() -> f64 { 0.25 }

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: default_feedback_mode(),
            source: default_feedback_source(),
            use_absolute: false,
            activation_threshold: default_feedback_threshold(),
            full_scale: default_feedback_full_scale(),
            smoothing_alpha: default_feedback_alpha(),
            face_proximity: FaceProximityConfig::default(),
            brightness: BrightnessConfig::default(),
        }
    }
}

impl FeedbackConfig {
    pub fn ramp(&self) -> Ramp {
        Ramp::new(self.activation_threshold, self.full_scale)
    }
}

// --- runtime ---

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Never touch hardware; actuators and sinks only log
    #[serde(default = "default_true")]
    pub dry_run: bool,
    #[serde(default = "default_vision_hz")]
    pub vision_hz: u32,
    #[serde(default = "default_servo_hz")]
    pub servo_hz: u32,
    #[serde(default = "default_feedback_hz")]
    pub feedback_hz: u32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Sleep between loop iterations
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,
}

fn default_vision_hz() -> u32 { 10 }
fn default_servo_hz() -> u32 { 20 }
fn default_feedback_hz() -> u32 { 10 }
fn default_log_level() -> String { "info".to_string() }
fn default_idle_ms() -> u64 { 1 }

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dry_run: default_true(),
            vision_hz: default_vision_hz(),
            servo_hz: default_servo_hz(),
            feedback_hz: default_feedback_hz(),
            log_level: default_log_level(),
            idle_ms: default_idle_ms(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.normalize();
        Ok(config)
    }

    /// Load, or fall back to defaults when the file is missing or broken
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Using default config ({:#})", e);
                let mut config = Self::default();
                config.normalize();
                config
            }
        }
    }

    /// Parse without repairing; call `normalize` afterwards
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Repair out-of-range or inconsistent values in place
    pub fn normalize(&mut self) {
        self.mapping.normalize();
        let n = self.mapping.segments;

        if self.servo.channels.len() < n {
            self.servo.channels = (0..n).map(|c| c as u8).collect();
        } else {
            self.servo.channels.truncate(n);
        }
        if self.servo.pulse_max_us < self.servo.pulse_min_us {
            std::mem::swap(&mut self.servo.pulse_min_us, &mut self.servo.pulse_max_us);
        }
        if self.servo.actuation_range <= 0.0 {
            self.servo.actuation_range = default_actuation_range();
        }
        self.servo.frequency_hz = self.servo.frequency_hz.max(1);

        self.stepper.steps_per_rev = self.stepper.steps_per_rev.max(1);
        self.stepper.microstep = self.stepper.microstep.max(1);
        self.stepper.min_pulse_us = self.stepper.min_pulse_us.max(0.0);

        let sm = &mut self.metrics.smoothing;
        sm.alpha = sm.alpha.clamp(0.0, 1.0);

        let fb = &mut self.feedback;
        fb.full_scale = repaired_full_scale(fb.activation_threshold, fb.full_scale);
        fb.smoothing_alpha = fb.smoothing_alpha.clamp(0.0, 1.0);
        fb.face_proximity.baseline_samples = fb.face_proximity.baseline_samples.max(1);
        fb.face_proximity.baseline_alpha = fb.face_proximity.baseline_alpha.clamp(0.0, 1.0);
        let br = &mut fb.brightness;
        br.min_percent = br.min_percent.clamp(1.0, 100.0);
        br.max_percent = br.max_percent.clamp(br.min_percent, 100.0);
        br.update_interval_sec = br.update_interval_sec.max(0.05);
        br.min_delta_percent = br.min_delta_percent.max(0.0);

        let rt = &mut self.runtime;
        rt.vision_hz = rt.vision_hz.max(1);
        rt.servo_hz = rt.servo_hz.max(1);
        rt.feedback_hz = rt.feedback_hz.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Config {
        let mut config = Config::from_toml(content).unwrap();
        config.normalize();
        config
    }

    #[test]
    fn test_defaults() {
        let config = parse("");
        assert_eq!(config.mapping.segments, 8);
        assert_eq!(config.mapping.control_mode, ControlMode::SpineBlend);
        assert_eq!(config.mapping.upper_start(), 4);
        assert_eq!(config.metrics.smoothing.kind, FilterKind::Ema);
        assert_eq!(config.servo.channels, vec![0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(config.servo.i2c_address, 0x40);
        assert_eq!(config.calibration.normalization.tilt_deg, 15.0);
        assert!(config.runtime.dry_run);
        assert!(!config.stepper.enabled);
        assert_eq!(config.actuator.backend, ActuatorBackend::Servo);
        assert_eq!(config.stepper.motors.len(), 1);
    }

    #[test]
    fn test_short_arrays_padded_to_segments() {
        let config = parse(
            r#"
            [mapping]
            segments = 4
            neutral_angles = [80.0]
            min_angles = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0]
            weights = []
            upper_weights = []
            directions = [-1.0, 1.0]
            "#,
        );
        let m = &config.mapping;
        assert_eq!(m.neutral_angles, vec![80.0, 90.0, 90.0, 90.0]);
        assert_eq!(m.min_angles, vec![10.0, 20.0, 30.0, 40.0]);
        assert_eq!(m.max_angles.len(), 4);
        assert_eq!(m.directions, vec![-1.0, 1.0, 1.0, 1.0]);
        assert_eq!(m.weights, bell_weights(4));
        assert_eq!(m.upper_weights, m.weights);
        assert_eq!(m.upper_start(), 2);
        assert_eq!(config.servo.channels, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_zero_segments_becomes_one() {
        let config = parse("[mapping]\nsegments = 0\nupper_segment_start = 9\n");
        assert_eq!(config.mapping.segments, 1);
        assert_eq!(config.mapping.neutral_angles.len(), 1);
        assert_eq!(config.mapping.upper_start(), 0);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = parse("[mapping.gain]\nlean = 20.0\n");
        assert_eq!(config.mapping.gain.lean, 20.0);
        assert_eq!(config.mapping.gain.neck, 25.0);
        assert_eq!(config.mapping.gain.tilt, 10.0);
        assert_eq!(config.mapping.max_deg_per_sec, 120.0);
    }

    #[test]
    fn test_sample_config_parses() {
        let config = parse(include_str!("../config.toml"));
        assert_eq!(config.mapping.segments, 8);
        assert_eq!(config.stepper.motors[0].enable_pin, Some(24));
        assert_eq!(config.feedback.source, FeedbackSource::FaceProximity);
    }

    #[test]
    fn test_negative_limits_floored() {
        let config = parse("[mapping]\ndeadband_deg = -2.0\nmax_deg_per_sec = -45.0\n");
        assert_eq!(config.mapping.deadband_deg, 0.0);
        assert_eq!(config.mapping.max_deg_per_sec, 0.0);
    }

    #[test]
    fn test_bell_weights() {
        assert_eq!(bell_weights(1), vec![1.0]);
        let w = bell_weights(5);
        assert!((w[0] - 0.2).abs() < 1e-12);
        assert!((w[2] - 1.0).abs() < 1e-12);
        assert!((w[4] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_inverted_ramp_repaired() {
        let config = parse(
            r#"
            [mapping.hunch_push]
            activation_threshold = 0.5
            full_scale = 0.2

            [feedback]
            activation_threshold = 1.3
            full_scale = 1.1
            "#,
        );
        let hp = &config.mapping.hunch_push;
        assert!(hp.full_scale > hp.activation_threshold);
        assert!((hp.full_scale - 0.5 - FULL_SCALE_EPSILON).abs() < 1e-12);
        assert!(config.feedback.full_scale > config.feedback.activation_threshold);
    }

    #[test]
    fn test_enum_names() {
        let config = parse(
            r#"
            [metrics.smoothing]
            kind = "one_euro"

            [mapping]
            control_mode = "hunch_push"

            [mapping.hunch_push]
            source = "lean"

            [feedback]
            mode = "both"
            source = "neck"

            [actuator]
            backend = "stepper"
            "#,
        );
        assert_eq!(config.metrics.smoothing.kind, FilterKind::OneEuro);
        assert_eq!(config.mapping.control_mode, ControlMode::HunchPush);
        assert_eq!(config.mapping.hunch_push.source, MetricKind::Lean);
        assert_eq!(config.feedback.mode, FeedbackMode::Both);
        assert_eq!(config.feedback.source.metric(), Some(MetricKind::Neck));
        assert_eq!(config.actuator.backend, ActuatorBackend::Stepper);
    }

    #[test]
    fn test_i2c_address_formats() {
        assert_eq!(parse("[servo]\ni2c_address = \"0x41\"\n").servo.i2c_address, 0x41);
        assert_eq!(parse("[servo]\ni2c_address = 0x42\n").servo.i2c_address, 0x42);
        assert_eq!(parse("[servo]\ni2c_address = 64\n").servo.i2c_address, 64);
        assert!(Config::from_toml("[servo]\ni2c_address = \"zz\"\n").is_err());
    }

    #[test]
    fn test_rates_and_samples_floored() {
        let config = parse(
            r#"
            [runtime]
            vision_hz = 0
            servo_hz = 0

            [feedback.face_proximity]
            baseline_samples = 0
            baseline_alpha = 3.0
            "#,
        );
        assert_eq!(config.runtime.vision_hz, 1);
        assert_eq!(config.runtime.servo_hz, 1);
        assert_eq!(config.feedback.face_proximity.baseline_samples, 1);
        assert_eq!(config.feedback.face_proximity.baseline_alpha, 1.0);
    }

    #[test]
    fn test_ramp() {
        let ramp = Ramp::new(0.2, 0.8);
        assert_eq!(ramp.apply(0.1), 0.0);
        assert_eq!(ramp.apply(0.2), 0.0);
        assert!((ramp.apply(0.5) - 0.5).abs() < 1e-12);
        assert_eq!(ramp.apply(0.8), 1.0);
        assert_eq!(ramp.apply(5.0), 1.0);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("/nonexistent/spine/config.toml");
        assert_eq!(config.mapping.segments, 8);
    }
}
