//! camera_probe - open a camera and report what the capture pipeline delivers
//!
//! This tool:
//! 1. Enumerates devices on the selected backend
//! 2. Opens a session with the requested size and the environment/file config
//! 3. Pulls frames until the count is reached or Ctrl-C is pressed
//! 4. Logs the layout, hit/miss counts and achieved frame rate

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Instant;

use tracker_camera::backend::generic::DEFAULT_DEVICE_DIR;
use tracker_camera::{
    Backend, CameraConfig, CameraSession, DeviceCount, GenericCaptureBackend, OpenParams,
    StubDriver,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    /// V4L2 device nodes, or the configured file/stream source.
    Generic,
    /// Synthetic frames numbered like the device nodes in --device-dir.
    StubGeneric,
    /// In-process fixed-format driver with synthetic cameras.
    StubEye,
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, value_enum, default_value_t = BackendChoice::Generic)]
    backend: BackendChoice,
    /// Logical camera index (-1 picks the first).
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    device: i32,
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    width: i32,
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    height: i32,
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    fps: i32,
    /// Number of queries to issue (0 runs until Ctrl-C).
    #[arg(long, default_value_t = 120)]
    frames: u64,
    /// Directory holding video device nodes.
    #[arg(long, default_value = DEFAULT_DEVICE_DIR)]
    device_dir: PathBuf,
    /// Keep only the odd field and line-double it.
    #[arg(long)]
    deinterlace: bool,
    /// Normalized exposure (0..1) for backends with manual exposure.
    #[arg(long)]
    exposure: Option<f32>,
    #[arg(long)]
    mirror: bool,
    /// Number of synthetic cameras for --backend stub-eye.
    #[arg(long, default_value_t = 1)]
    stub_cameras: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = CameraConfig::load()?;

    let backend = match args.backend {
        BackendChoice::Generic => Backend::GenericCapture(GenericCaptureBackend::new()),
        BackendChoice::StubGeneric => {
            Backend::GenericCapture(GenericCaptureBackend::synthetic(&args.device_dir))
        }
        BackendChoice::StubEye => {
            Backend::fixed_format(Arc::new(StubDriver::new(args.stub_cameras)))
        }
    };

    match backend.enumerate() {
        DeviceCount::Connected(count) => log::info!("{} camera(s) connected", count),
        DeviceCount::Unsupported => log::info!("camera enumeration unsupported on this platform"),
    }

    let params = OpenParams {
        device_index: args.device,
        width: args.width,
        height: args.height,
        framerate: args.fps,
    };
    let mut session = CameraSession::open(backend, params, &config)
        .map_err(|e| anyhow!("camera_probe: {}", e))?;
    if args.deinterlace {
        session.set_deinterlace(true);
    }
    if let Some(exposure) = args.exposure {
        session.configure_exposure_and_mirror(exposure, args.mirror);
    }

    let info = session.camera_info();
    log::info!(
        "{} ({}) camera {}: {}x{} frames",
        info.display_name,
        info.driver_name,
        session.device_index(),
        info.frame_width,
        info.frame_height
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    let started = Instant::now();
    let mut misses = 0u64;
    let mut queries = 0u64;
    while args.frames == 0 || queries < args.frames {
        if rx.try_recv().is_ok() {
            log::info!("shutdown signal received, stopping capture...");
            break;
        }
        queries += 1;
        match session.query_frame() {
            Some(frame) => log::debug!(
                "frame {}: {}x{}, center pixel {:?}",
                queries - misses,
                frame.width(),
                frame.height(),
                frame.pixel(frame.width() / 2, frame.height() / 2)
            ),
            None => misses += 1,
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    let captured = session.frames_captured();
    log::info!(
        "{} frame(s) in {:.2}s ({:.1} fps), {} miss(es)",
        captured,
        elapsed,
        if elapsed > 0.0 { captured as f64 / elapsed } else { 0.0 },
        misses
    );

    session.close();
    Ok(())
}
