use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use tracker_camera::backend::{DriverParameter, MAX_EXPOSURE};
use tracker_camera::{
    Backend, BackendKind, CalibrationMap, CameraConfig, CameraSession, CaptureMode,
    GenericCaptureBackend, OpenError, OpenParams, StubDriver,
};

fn stub_config(source: &str) -> CameraConfig {
    CameraConfig {
        source_override: Some(source.to_string()),
        ..CameraConfig::default()
    }
}

fn stub_generic() -> Backend {
    Backend::GenericCapture(GenericCaptureBackend::synthetic("/nonexistent/dev"))
}

fn device_dir(nodes: &[&str]) -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    for node in nodes {
        std::fs::write(dir.path().join(node), b"").expect("create node");
    }
    dir
}

fn write_json(dir: &Path, name: &str, json: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, json).expect("write calibration");
    path
}

#[test]
fn unspecified_size_opens_at_default_layout() -> anyhow::Result<()> {
    let mut session = CameraSession::open(
        stub_generic(),
        OpenParams::default(),
        &stub_config("stub://cam"),
    )?;
    let layout = *session.layout();
    assert_eq!((layout.capture_width, layout.capture_height), (640, 480));
    assert_eq!((layout.crop_x, layout.crop_y), (0, 0));
    assert_eq!((layout.crop_width, layout.crop_height), (640, 480));
    assert_eq!(session.backend_kind(), BackendKind::GenericCapture);

    let frame = session.query_frame().expect("synthetic frame");
    assert_eq!((frame.width(), frame.height()), (640, 480));
    assert_eq!(frame.pixel(5, 7), [7, 5, 0]);
    assert_eq!(session.frames_captured(), 1);
    session.close();
    Ok(())
}

#[test]
fn transient_misses_return_none_and_session_stays_usable() -> anyhow::Result<()> {
    let mut session = CameraSession::open(
        stub_generic(),
        OpenParams::default(),
        &stub_config("stub://cam?drop_every=3"),
    )?;
    let hits: Vec<bool> = (0..6).map(|_| session.query_frame().is_some()).collect();
    assert_eq!(hits, vec![true, true, false, true, true, false]);
    assert_eq!(session.frames_captured(), 4);
    Ok(())
}

#[test]
fn deinterlace_keeps_the_odd_field() -> anyhow::Result<()> {
    let params = OpenParams {
        width: 64,
        height: 48,
        ..OpenParams::default()
    };
    let mut session = CameraSession::open(stub_generic(), params, &stub_config("stub://cam"))?;
    assert!(!session.deinterlace());
    session.set_deinterlace(true);
    assert!(session.deinterlace());

    let frame = session.query_frame().expect("synthetic frame");
    assert_eq!((frame.width(), frame.height()), (64, 48));
    let rows: Vec<u8> = (0..6).map(|y| frame.pixel(0, y)[0]).collect();
    assert_eq!(rows, vec![1, 1, 3, 3, 5, 5]);
    assert_eq!(frame.pixel(0, 47)[0], 47);
    Ok(())
}

#[test]
fn deinterlace_can_be_enabled_from_config() -> anyhow::Result<()> {
    let config = CameraConfig {
        deinterlace: true,
        ..stub_config("stub://cam")
    };
    let session = CameraSession::open(stub_generic(), OpenParams::default(), &config)?;
    assert!(session.deinterlace());
    Ok(())
}

#[test]
fn failed_calibration_load_passes_frames_through() -> anyhow::Result<()> {
    let mut session = CameraSession::open(
        stub_generic(),
        OpenParams::default(),
        &stub_config("stub://cam"),
    )?;
    assert!(session.set_calibration_map(CalibrationMap::identity(640, 480)));
    assert!(!session.load_calibration(
        Path::new("/nonexistent/intrinsics.json"),
        Path::new("/nonexistent/distortion.json"),
    ));
    assert!(!session.is_calibrated());

    let frame = session.query_frame().expect("synthetic frame");
    assert_eq!(frame.pixel(100, 50), [50, 100, 0]);
    Ok(())
}

#[test]
fn configured_calibration_is_loaded_at_open() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let intrinsics = write_json(
        dir.path(),
        "intrinsics.json",
        r#"{"rows": 3, "cols": 3, "data": [500.0, 0.0, 32.0, 0.0, 500.0, 24.0, 0.0, 0.0, 1.0]}"#,
    );
    let distortion = write_json(
        dir.path(),
        "distortion.json",
        r#"{"rows": 1, "cols": 5, "data": [0.0, 0.0, 0.0, 0.0, 0.0]}"#,
    );
    let config = CameraConfig {
        intrinsics_path: Some(intrinsics),
        distortion_path: Some(distortion),
        ..stub_config("stub://cam")
    };
    let params = OpenParams {
        width: 64,
        height: 48,
        ..OpenParams::default()
    };
    let mut session = CameraSession::open(stub_generic(), params, &config)?;
    assert!(session.is_calibrated());

    // Zero distortion maps every pixel onto itself, up to rounding.
    let frame = session.query_frame().expect("synthetic frame");
    let [r, g, _] = frame.pixel(20, 10);
    assert!((i32::from(r) - 10).abs() <= 1);
    assert!((i32::from(g) - 20).abs() <= 1);
    Ok(())
}

#[test]
fn identity_map_leaves_frames_unchanged() -> anyhow::Result<()> {
    let params = OpenParams {
        width: 32,
        height: 32,
        ..OpenParams::default()
    };
    let mut session = CameraSession::open(stub_generic(), params, &stub_config("stub://cam"))?;
    assert!(session.set_calibration_map(CalibrationMap::identity(32, 32)));
    let frame = session.query_frame().expect("synthetic frame");
    for (x, y) in [(0, 0), (31, 0), (7, 19), (31, 31)] {
        assert_eq!(frame.pixel(x, y), [y as u8, x as u8, 0]);
    }
    Ok(())
}

#[test]
fn fixed_format_center_crops_to_request() -> anyhow::Result<()> {
    let driver = Arc::new(StubDriver::new(1));
    let params = OpenParams {
        device_index: 0,
        width: 300,
        height: 200,
        ..OpenParams::default()
    };
    let mut session =
        CameraSession::open(Backend::fixed_format(driver), params, &CameraConfig::default())?;
    let layout = *session.layout();
    assert_eq!((layout.capture_width, layout.capture_height), (320, 240));
    assert_eq!((layout.crop_x, layout.crop_y), (10, 20));

    let info = session.camera_info();
    assert_eq!(info.display_name, "Synthetic Eye");
    assert_eq!(info.driver_name, "stub-eye");
    assert_eq!((info.frame_width, info.frame_height), (300, 200));

    let frame = session.query_frame().expect("fixed driver frame");
    assert_eq!((frame.width(), frame.height()), (300, 200));
    assert_eq!(frame.pixel(0, 0), [20, 10, 0]);
    Ok(())
}

#[test]
fn fixed_format_rejects_request_larger_than_every_mode() {
    let driver = Arc::new(StubDriver::new(1));
    let params = OpenParams {
        width: 1280,
        height: 720,
        ..OpenParams::default()
    };
    let err = CameraSession::open(
        Backend::fixed_format(driver.clone()),
        params,
        &CameraConfig::default(),
    )
    .err()
    .expect("no mode holds 1280x720");
    assert!(matches!(err, OpenError::LayoutNegotiationFailed(_)));
    assert_eq!(driver.stats().init_calls, 0);
}

#[test]
fn driver_stays_initialized_while_any_session_is_open() -> anyhow::Result<()> {
    let driver = Arc::new(StubDriver::new(2));
    let backend = Backend::fixed_format(driver.clone());
    let first = OpenParams {
        device_index: 0,
        ..OpenParams::default()
    };
    let second = OpenParams {
        device_index: 1,
        ..OpenParams::default()
    };

    let a = CameraSession::open(backend.clone(), first, &CameraConfig::default())?;
    let b = CameraSession::open(backend, second, &CameraConfig::default())?;
    assert_eq!(driver.stats().init_calls, 1);
    assert_eq!(driver.stats().open_devices, 2);

    a.close();
    assert!(driver.stats().initialized);
    assert_eq!(driver.stats().open_devices, 1);

    drop(b);
    let stats = driver.stats();
    assert!(!stats.initialized);
    assert_eq!(stats.open_devices, 0);
    assert_eq!(stats.init_calls, 1);
    assert_eq!(stats.uninit_calls, 1);
    Ok(())
}

#[test]
fn failed_open_releases_driver() {
    let driver = Arc::new(StubDriver::new(1));
    let params = OpenParams {
        device_index: 3,
        ..OpenParams::default()
    };
    let err = CameraSession::open(
        Backend::fixed_format(driver.clone()),
        params,
        &CameraConfig::default(),
    )
    .err()
    .expect("index out of range");
    assert!(matches!(err, OpenError::DeviceUnavailable { index: 3, .. }));
    let stats = driver.stats();
    assert!(!stats.initialized);
    assert_eq!(stats.init_calls, stats.uninit_calls);

    let busy = Arc::new(StubDriver::new(1).failing_open());
    let err = CameraSession::open(
        Backend::fixed_format(busy.clone()),
        OpenParams::default(),
        &CameraConfig::default(),
    )
    .err()
    .expect("busy camera");
    assert!(err.to_string().contains("busy"));
    assert!(!busy.stats().initialized);
    assert_eq!(busy.stats().open_devices, 0);
}

#[test]
fn exposure_is_clamped_and_mirror_applied() -> anyhow::Result<()> {
    let driver = Arc::new(StubDriver::new(1));
    let params = OpenParams {
        width: 320,
        height: 240,
        ..OpenParams::default()
    };
    let mut session = CameraSession::open(
        Backend::fixed_format(driver.clone()),
        params,
        &CameraConfig::default(),
    )?;
    session.configure_exposure_and_mirror(1.5, true);
    let writes = driver.parameters();
    assert!(writes.contains(&(DriverParameter::Exposure, MAX_EXPOSURE)));
    assert!(writes.contains(&(DriverParameter::HorizontalFlip, 1)));

    let frame = session.query_frame().expect("fixed driver frame");
    assert_eq!(frame.pixel(0, 0)[1], 319u32 as u8);
    Ok(())
}

#[test]
fn custom_driver_modes_drive_layout() -> anyhow::Result<()> {
    let driver =
        Arc::new(StubDriver::new(1).with_modes(vec![CaptureMode::new(160, 120)]));
    let session = CameraSession::open(
        Backend::fixed_format(driver),
        OpenParams::default(),
        &CameraConfig {
            width_override: Some(100),
            height_override: Some(100),
            ..CameraConfig::default()
        },
    )?;
    let layout = *session.layout();
    assert_eq!((layout.capture_width, layout.capture_height), (160, 120));
    assert_eq!((layout.crop_x, layout.crop_y), (30, 10));
    Ok(())
}

#[test]
fn logical_index_follows_present_device_nodes() -> anyhow::Result<()> {
    let dir = device_dir(&["video3", "video5"]);
    let backend = Backend::GenericCapture(GenericCaptureBackend::synthetic(dir.path()));
    let params = OpenParams {
        device_index: 1,
        ..OpenParams::default()
    };
    let session = CameraSession::open(backend, params, &CameraConfig::default())?;
    assert_eq!(session.device_index(), 5);
    Ok(())
}

#[test]
fn remap_falls_back_to_requested_index() -> anyhow::Result<()> {
    let dir = device_dir(&["video0"]);
    let backend = Backend::GenericCapture(GenericCaptureBackend::synthetic(dir.path()));
    let params = OpenParams {
        device_index: 4,
        ..OpenParams::default()
    };
    let session = CameraSession::open(backend, params, &CameraConfig::default())?;
    assert_eq!(session.device_index(), 4);
    Ok(())
}
