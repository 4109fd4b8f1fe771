use anyhow::Result;
use tracing::{debug, info};

use crate::actuator::Actuator;
use crate::config::Config;
use crate::feedback::{FeedbackSignal, FeedbackSink};
use crate::filter::{FilteredMetrics, MetricSmoother};
use crate::mapping::SpineMapper;
use crate::metrics::{compute_metrics, normalize_metrics, MetricDegrees, NormalizedMetrics};
use crate::pose::{Frame, Landmarks};

/// Fires at most once per `1/hz` seconds of caller time
#[derive(Debug, Clone)]
pub struct TickScheduler {
    interval: f64,
    last: Option<f64>,
}

impl TickScheduler {
    pub fn new(hz: u32) -> Self {
        Self {
            interval: 1.0 / hz.max(1) as f64,
            last: None,
        }
    }

    pub fn due(&mut self, now: f64) -> bool {
        match self.last {
            Some(last) if now - last < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }
}

#[derive(Debug, Clone, Default)]
struct Summary {
    window_start: Option<f64>,
    frames: u64,
    fps: f64,
}

/// All per-tick state of the posture → spine and posture → feedback paths.
///
/// Owned by the driver loop; every call takes the current time in seconds.
pub struct SpinePipeline {
    visibility_threshold: f64,
    allow_upper_body_fallback: bool,
    baseline: MetricDegrees,
    scale: MetricDegrees,
    deadband: f64,
    smoother: MetricSmoother,
    mapper: SpineMapper,
    actuator: Actuator,
    signal: FeedbackSignal,
    sink: FeedbackSink,
    vision: TickScheduler,
    actuation: TickScheduler,
    feedback: TickScheduler,
    last_landmarks: Option<Landmarks>,
    last_filtered: FilteredMetrics,
    last_normalized: NormalizedMetrics,
    last_angles: Vec<f64>,
    last_level: f64,
    fresh_frame: bool,
    summary: Summary,
    closed: bool,
}

impl SpinePipeline {
    /// `config` must already be normalized
    pub fn new(config: &Config, actuator: Actuator, sink: FeedbackSink) -> Self {
        let mapper = SpineMapper::from_config(&config.mapping);
        let last_angles = mapper.neutral().to_vec();
        Self {
            visibility_threshold: config.metrics.visibility_threshold,
            allow_upper_body_fallback: config.metrics.enable_upper_body_fallback,
            baseline: config.calibration.baseline,
            scale: config.calibration.normalization,
            deadband: config.mapping.deadband_deg,
            smoother: MetricSmoother::from_config(&config.metrics),
            mapper,
            actuator,
            signal: FeedbackSignal::from_config(&config.feedback),
            sink,
            vision: TickScheduler::new(config.runtime.vision_hz),
            actuation: TickScheduler::new(config.runtime.servo_hz),
            feedback: TickScheduler::new(config.runtime.feedback_hz),
            last_landmarks: None,
            last_filtered: FilteredMetrics::UNKNOWN,
            last_normalized: NormalizedMetrics::NEUTRAL,
            last_angles,
            last_level: 0.0,
            fresh_frame: false,
            summary: Summary::default(),
            closed: false,
        }
    }

    /// Builds the actuator and feedback sink from config
    pub fn from_config(config: &Config) -> Self {
        let dry_run = config.runtime.dry_run;
        let actuator = Actuator::from_config(config, dry_run);
        let sink = FeedbackSink::from_config(&config.feedback, dry_run);
        Self::new(config, actuator, sink)
    }

    /// Extract, filter and normalize one frame
    pub fn vision_tick(&mut self, frame: &Frame, now: f64) -> NormalizedMetrics {
        let landmarks = frame.landmarks();
        let raw = compute_metrics(
            landmarks,
            self.visibility_threshold,
            self.allow_upper_body_fallback,
        );
        let filtered = self.smoother.update(&raw, now);
        let normalized = normalize_metrics(&filtered.to_raw(), &self.baseline, &self.scale, self.deadband);

        self.last_landmarks = landmarks.cloned();
        self.last_filtered = filtered;
        self.last_normalized = normalized;
        self.fresh_frame = true;
        self.summary.frames += 1;
        normalized
    }

    /// Map the latest normalized metrics and send them to the actuator
    pub fn actuation_tick(&mut self, now: f64) -> &[f64] {
        let angles = self.mapper.map_metrics(&self.last_normalized, now);
        self.actuator.set_angles(&angles);
        self.last_angles = angles;
        &self.last_angles
    }

    /// Advance the feedback signal and send its level to the sink.
    ///
    /// The signal only consumes each vision frame once; ticks without a new
    /// frame resend the previous level.
    pub fn feedback_tick(&mut self, now: f64) -> f64 {
        if self.sink.is_noop() {
            return 0.0;
        }
        let level = if self.fresh_frame {
            self.fresh_frame = false;
            self.signal
                .update(self.last_landmarks.as_ref(), &self.last_normalized)
        } else {
            self.last_level
        };
        self.sink.set_level(level, now);
        self.last_level = level;
        level
    }

    /// One loop iteration: run whichever tasks are due.
    ///
    /// `next_frame` is only called when a vision tick is due. Returns
    /// `Ok(false)` once it reports end of input.
    pub fn step<F>(&mut self, now: f64, next_frame: F) -> Result<bool>
    where
        F: FnOnce() -> Result<Option<Frame>>,
    {
        if self.vision.due(now) {
            match next_frame()? {
                Some(frame) => {
                    self.vision_tick(&frame, now);
                }
                None => return Ok(false),
            }
        }
        if self.actuation.due(now) {
            self.actuation_tick(now);
        }
        if self.feedback.due(now) {
            self.feedback_tick(now);
        }
        self.log_summary(now);
        Ok(true)
    }

    fn log_summary(&mut self, now: f64) {
        let start = *self.summary.window_start.get_or_insert(now);
        let elapsed = now - start;
        if elapsed < 1.0 {
            return;
        }
        self.summary.fps = self.summary.frames as f64 / elapsed;
        self.summary.frames = 0;
        self.summary.window_start = Some(now);

        let f = &self.last_filtered;
        let n = &self.last_normalized;
        let fmt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{:.1}", v));
        let line = format!(
            "fps {:.1} | deg lean/neck/tilt {} {} {} | norm {:.2} {:.2} {:.2}",
            self.summary.fps,
            fmt(f.lean.known()),
            fmt(f.neck.known()),
            fmt(f.tilt.known()),
            n.lean,
            n.neck,
            n.tilt,
        );
        if self.actuator.is_dry_run() {
            info!("{}", line);
        } else {
            debug!("{}", line);
        }
    }

    pub fn filtered(&self) -> &FilteredMetrics {
        &self.last_filtered
    }

    pub fn normalized(&self) -> &NormalizedMetrics {
        &self.last_normalized
    }

    pub fn angles(&self) -> &[f64] {
        &self.last_angles
    }

    pub fn feedback_level(&self) -> f64 {
        self.last_level
    }

    pub fn actuator(&self) -> &Actuator {
        &self.actuator
    }

    pub fn sink(&self) -> &FeedbackSink {
        &self.sink
    }

    pub fn signal(&self) -> &FeedbackSignal {
        &self.signal
    }

    pub fn fps(&self) -> f64 {
        self.summary.fps
    }

    /// Release hardware; idempotent
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.actuator.close();
        self.sink.close();
        info!("Pipeline closed");
    }
}

impl Drop for SpinePipeline {
    fn drop(&mut self) {
        self.close();
    }
}
