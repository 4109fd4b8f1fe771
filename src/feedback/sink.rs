use std::env;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

use crate::config::{BrightnessConfig, FeedbackConfig, FeedbackMode};

#[derive(Debug, Clone, PartialEq)]
enum BrightnessBackend {
    /// `sh -c` with `{percent}` / `{scalar}` substituted
    Template(String),
    Brightnessctl,
}

fn on_path(program: &str) -> bool {
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

/// Expands a command template for one brightness target
pub fn render_template(template: &str, percent: f64) -> String {
    template
        .replace("{percent}", &format!("{}", percent.round() as i64))
        .replace("{scalar}", &format!("{:.3}", percent / 100.0))
}

/// Dims the screen as the feedback level rises.
///
/// Level 0 maps to `max_percent`, level 1 to `min_percent`. Updates smaller
/// than `min_delta_percent` or sooner than `update_interval_sec` after the
/// previous one are skipped.
#[derive(Debug, Clone)]
pub struct BrightnessSink {
    min_percent: f64,
    max_percent: f64,
    update_interval: f64,
    min_delta_percent: f64,
    dry_run: bool,
    backend: Option<BrightnessBackend>,
    last_percent: Option<f64>,
    last_update: f64,
}

impl BrightnessSink {
    pub fn from_config(config: &BrightnessConfig, dry_run: bool) -> Self {
        let backend = if dry_run {
            None
        } else {
            detect_backend(config)
        };
        if !dry_run && backend.is_none() {
            warn!(
                "Brightness feedback unavailable; set feedback.brightness.command_template \
                 or install brightnessctl"
            );
        }
        Self {
            min_percent: config.min_percent,
            max_percent: config.max_percent,
            update_interval: config.update_interval_sec,
            min_delta_percent: config.min_delta_percent,
            dry_run,
            backend,
            last_percent: None,
            last_update: 0.0,
        }
    }

    pub fn target_percent(&self, level: f64) -> f64 {
        let level = level.clamp(0.0, 1.0);
        self.max_percent - level * (self.max_percent - self.min_percent)
    }

    pub fn set_level(&mut self, level: f64, now: f64) {
        let percent = self.target_percent(level);

        if let Some(last) = self.last_percent {
            if (percent - last).abs() < self.min_delta_percent {
                return;
            }
            if now - self.last_update < self.update_interval {
                return;
            }
        }

        if self.dry_run {
            debug!("Dry-run brightness target: {:.1}%", percent);
            self.last_percent = Some(percent);
            self.last_update = now;
            return;
        }

        let Some(backend) = &self.backend else {
            return;
        };
        if apply_percent(backend, percent) {
            self.last_percent = Some(percent);
            self.last_update = now;
        }
    }

    pub fn last_percent(&self) -> Option<f64> {
        self.last_percent
    }
}

fn detect_backend(config: &BrightnessConfig) -> Option<BrightnessBackend> {
    let template = config.command_template.trim();
    if !template.is_empty() {
        return Some(BrightnessBackend::Template(template.to_string()));
    }
    if cfg!(target_os = "linux") && on_path("brightnessctl") {
        return Some(BrightnessBackend::Brightnessctl);
    }
    None
}

fn apply_percent(backend: &BrightnessBackend, percent: f64) -> bool {
    let mut command = match backend {
        BrightnessBackend::Template(template) => {
            let mut c = Command::new("sh");
            c.arg("-c").arg(render_template(template, percent));
            c
        }
        BrightnessBackend::Brightnessctl => {
            let mut c = Command::new("brightnessctl");
            c.arg("set").arg(format!("{}%", percent.round() as i64));
            c
        }
    };
    match command.stdout(Stdio::null()).stderr(Stdio::null()).status() {
        Ok(status) => status.success(),
        Err(e) => {
            debug!("Brightness command failed: {}", e);
            false
        }
    }
}

/// Logs the feedback level without side effects
#[derive(Debug, Clone, Default)]
pub struct DryRunSink {
    last_level: Option<f64>,
}

impl DryRunSink {
    pub fn set_level(&mut self, level: f64) {
        let level = level.clamp(0.0, 1.0);
        if self.last_level.map_or(true, |last| (last - level).abs() >= 0.01) {
            debug!("Dry-run feedback level: {:.2}", level);
        }
        self.last_level = Some(level);
    }

    pub fn last_level(&self) -> Option<f64> {
        self.last_level
    }
}

/// Where feedback levels go, chosen once at startup
#[derive(Debug, Clone)]
pub enum FeedbackSink {
    Noop,
    DryRun(DryRunSink),
    Brightness(BrightnessSink),
    Combined(Vec<FeedbackSink>),
}

impl FeedbackSink {
    pub fn from_config(config: &FeedbackConfig, dry_run: bool) -> Self {
        if !config.enabled {
            return Self::Noop;
        }
        let sink = match config.mode {
            FeedbackMode::Brightness => {
                Self::Brightness(BrightnessSink::from_config(&config.brightness, dry_run))
            }
            FeedbackMode::DryRun => Self::DryRun(DryRunSink::default()),
            FeedbackMode::Both => Self::Combined(vec![
                Self::Brightness(BrightnessSink::from_config(&config.brightness, dry_run)),
                Self::DryRun(DryRunSink::default()),
            ]),
        };
        info!("Feedback output: {:?} (dry_run={})", config.mode, dry_run);
        sink
    }

    /// `level` in [0, 1]; `now` in seconds
    pub fn set_level(&mut self, level: f64, now: f64) {
        match self {
            Self::Noop => {}
            Self::DryRun(s) => s.set_level(level),
            Self::Brightness(s) => s.set_level(level, now),
            Self::Combined(sinks) => {
                for sink in sinks {
                    sink.set_level(level, now);
                }
            }
        }
    }

    pub fn close(&mut self) {
        if let Self::Combined(sinks) = self {
            for sink in sinks {
                sink.close();
            }
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Noop)
    }
}
