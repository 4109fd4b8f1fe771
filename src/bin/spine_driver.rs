use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use spine_driver::calibration::apply_calibration_file;
use spine_driver::config::Config;
use spine_driver::pose::FrameSource;
use spine_driver::runtime::SpinePipeline;

#[derive(Parser, Debug)]
#[command(name = "spine_driver", version = env!("SPINE_BUILD_VERSION"), about = "Drive the spine from pose landmarks")]
struct Args {
    /// TOML config file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Never touch hardware
    #[arg(long)]
    dry_run: bool,

    /// JSON-lines landmark frames ("-" for stdin)
    #[arg(long, value_name = "PATH", default_value = "-")]
    landmarks: PathBuf,

    /// Overrides runtime.log_level
    #[arg(long)]
    log_level: Option<String>,
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.to_lowercase().into()),
        )
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = Config::load(&args.config);
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => {
            let mut config = Config::default();
            config.normalize();
            config
        }
    };
    if args.dry_run {
        config.runtime.dry_run = true;
    }
    let level = args.log_level.as_deref().unwrap_or(&config.runtime.log_level);
    init_tracing(level);

    info!("spine_driver {}", env!("SPINE_BUILD_VERSION"));
    match loaded {
        Ok(_) => info!("Config: {}", args.config.display()),
        Err(e) => warn!("Using default config ({:#})", e),
    }
    if let Err(e) = apply_calibration_file(&mut config) {
        warn!("Calibration not applied ({:#})", e);
    }
    info!(
        "Mode {:?}, {} segments, vision {} Hz, actuation {} Hz, dry_run={}",
        config.mapping.control_mode,
        config.mapping.segments,
        config.runtime.vision_hz,
        config.runtime.servo_hz,
        config.runtime.dry_run
    );

    let stop = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop))?;
    }

    let mut source = FrameSource::open(Some(args.landmarks.as_path()))?;
    let mut pipeline = SpinePipeline::from_config(&config);
    info!("Actuator: {}", pipeline.actuator().name());

    let idle = Duration::from_millis(config.runtime.idle_ms);
    let result = run(&mut pipeline, &mut source, &stop, idle);
    pipeline.close();

    match &result {
        Ok(()) => info!("Stopped after {} frames", source.frames_read()),
        Err(e) => warn!("Stopped on error after {} frames: {:#}", source.frames_read(), e),
    }
    result
}

fn run<R: std::io::BufRead>(
    pipeline: &mut SpinePipeline,
    source: &mut FrameSource<R>,
    stop: &AtomicBool,
    idle: Duration,
) -> Result<()> {
    let start = Instant::now();
    while !stop.load(Ordering::Relaxed) {
        let now = start.elapsed().as_secs_f64();
        if !pipeline.step(now, || source.next_frame())? {
            info!("End of landmark input");
            break;
        }
        if !idle.is_zero() {
            std::thread::sleep(idle);
        }
    }
    Ok(())
}
