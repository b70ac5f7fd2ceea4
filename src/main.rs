use anyhow::{Context, Result};
use clap::Parser;
use std::process;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use rpi_mjpeg_streamer::camera::{TestPattern, V4lCamera};
use rpi_mjpeg_streamer::config::Config;
use rpi_mjpeg_streamer::servo::HardwareContext;
use rpi_mjpeg_streamer::streaming::spawn_pipeline;
use rpi_mjpeg_streamer::web::{run_server, AppState};

#[derive(Parser, Debug)]
#[command(name = "rpi-mjpeg-streamer")]
#[command(about = "MJPEG camera streaming with phone-steered pan/tilt for Raspberry Pi")]
#[command(version)]
struct Cli {
    /// Video device, e.g. /dev/video0
    #[arg(short, long)]
    device: Option<String>,

    /// Pixel format fourcc, e.g. YUYV
    #[arg(short, long)]
    format: Option<String>,

    /// Frame size as WxH, e.g. 640x480
    #[arg(short, long)]
    size: Option<String>,

    /// Address to serve on
    #[arg(short, long)]
    listen: Option<String>,

    /// Log the capture frame rate every 10 seconds
    #[arg(short = 'p', long = "fps")]
    report_fps: bool,

    /// Optional TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Stream a generated pattern instead of a camera
    #[arg(long)]
    test_pattern: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(device) = &self.device {
            config.camera.device = device.clone();
        }
        if let Some(format) = &self.format {
            config.camera.format = Some(format.clone());
        }
        if let Some(size) = &self.size {
            config.camera.size = Some(size.clone());
        }
        if let Some(listen) = &self.listen {
            config.server.listen = listen.clone();
        }
        config.camera.report_fps |= self.report_fps;
        config.camera.test_pattern |= self.test_pattern;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    fmt().with_env_filter(filter).with_target(false).init();

    info!("RPi MJPEG Streamer starting");

    let mut config = match &cli.config {
        Some(path) => {
            info!(config_path = %path, "Loading configuration");
            Config::load(path).with_context(|| format!("loading {}", path))?
        }
        None => Config::default(),
    };
    cli.apply(&mut config);
    config.validate()?;

    let options = config.pipeline_options();
    let cam = &config.camera;
    let mut pipeline = if cam.test_pattern {
        info!(
            resolution = %format!("{}x{}", cam.width, cam.height),
            fps = cam.fps,
            "Using test pattern source"
        );
        spawn_pipeline(TestPattern::new(cam.width, cam.height, cam.fps), options)
    } else {
        let camera = V4lCamera::open(&cam.device, cam.format.as_deref(), cam.size.as_deref())
            .with_context(|| format!("opening camera {}", cam.device))?;
        spawn_pipeline(camera, options)
    };

    let hardware = if config.servo.enabled {
        HardwareContext::detect()
    } else {
        info!("Servo control disabled by configuration");
        HardwareContext::without_servos()
    };

    let listener = TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("binding {}", config.server.listen))?;
    let state = AppState::new(
        pipeline.distributor.clone(),
        pipeline.stats.clone(),
        hardware,
        config.server.site_dir.clone(),
    );
    let mut server = tokio::spawn(run_server(listener, state));

    info!("Streaming started, press Ctrl+C to stop");

    // The capture thread never returns on its own while the device is
    // healthy, so every exit path leaves through process::exit.
    tokio::select! {
        res = &mut pipeline.capture => {
            match res {
                Ok(Ok(())) => warn!("Capture stopped"),
                Ok(Err(e)) => error!(error = %e, "Capture failed"),
                Err(e) => error!(error = %e, "Capture thread panicked"),
            }
            process::exit(1);
        }
        res = &mut pipeline.encoder => {
            match res {
                Ok(Ok(())) => warn!("Encoder stopped"),
                Ok(Err(e)) => error!(error = %e, "Encoder failed"),
                Err(e) => error!(error = %e, "Encoder task panicked"),
            }
            process::exit(1);
        }
        res = &mut server => {
            match res {
                Ok(Ok(())) => warn!("Web server stopped"),
                Ok(Err(e)) => error!(error = %e, "Web server failed"),
                Err(e) => error!(error = %e, "Web server task panicked"),
            }
            process::exit(1);
        }
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("Shutting down");
            process::exit(0);
        }
    }
}
