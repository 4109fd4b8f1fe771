use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use spine_driver::calibration::{load_calibration, save_calibration, BaselineCollector};
use spine_driver::config::Config;
use spine_driver::metrics::compute_metrics;
use spine_driver::pose::FrameSource;

const DEFAULT_OUTPUT: &str = "calibration.json";

/// Record a resting posture baseline from landmark frames
#[derive(Parser, Debug)]
#[command(name = "spine_baseline", version = env!("SPINE_BUILD_VERSION"))]
struct Args {
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// JSON-lines landmark frames ("-" for stdin)
    #[arg(long, value_name = "PATH", default_value = "-")]
    landmarks: PathBuf,

    /// Frames with a detection to average
    #[arg(long, default_value = "100")]
    frames: u64,

    /// Defaults to calibration.file from the config
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = Config::load_or_default(&args.config);
    let output = args
        .output
        .clone()
        .or_else(|| config.calibration.file.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

    let stop = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop))?;
    }

    info!("Hold a relaxed upright posture; averaging {} frames", args.frames);
    let mut source = FrameSource::open(Some(args.landmarks.as_path()))?;
    let mut collector = BaselineCollector::new();
    let mut detected = 0u64;
    while detected < args.frames && !stop.load(Ordering::Relaxed) {
        let Some(frame) = source.next_frame()? else {
            warn!("Landmark input ended after {} detections", detected);
            break;
        };
        let Some(landmarks) = frame.landmarks() else {
            continue;
        };
        let metrics = compute_metrics(
            Some(landmarks),
            config.metrics.visibility_threshold,
            config.metrics.enable_upper_body_fallback,
        );
        collector.add(&metrics);
        detected += 1;
    }

    if detected == 0 {
        bail!("No detections received; baseline not written");
    }
    if collector.min_samples() == 0 {
        warn!("Some metrics were never resolved; their baseline is 0");
    }

    let mut calibration = collector.finish();
    // keep segment angles from an earlier calibration
    if output.exists() {
        match load_calibration(&output) {
            Ok(previous) => {
                calibration.neutral_angles = previous.neutral_angles;
                calibration.min_angles = previous.min_angles;
                calibration.max_angles = previous.max_angles;
            }
            Err(e) => warn!("Overwriting unreadable calibration ({:#})", e),
        }
    }

    save_calibration(&output, &calibration)?;
    let b = calibration.baseline;
    info!(
        "Baseline lean={:.1} neck={:.1} tilt={:.1} written to {}",
        b.lean_deg,
        b.neck_deg,
        b.tilt_deg,
        output.display()
    );
    Ok(())
}
