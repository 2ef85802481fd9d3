//! Fixed-format high-speed USB camera driver.
//!
//! The driver itself lives outside this crate (a vendor library or an in-process
//! synthetic one, see `fixed_stub`). This module owns everything around it:
//! - reference-counted driver initialization (`DriverLease`)
//! - device selection against the driver's device table
//! - the capture buffer the driver writes into on every grab
//! - mapping normalized exposure onto the driver's native range
//!
//! Drivers only capture at a few fixed resolutions; the layout resolver center-crops
//! those down to whatever the session asked for.

use anyhow::{anyhow, Context, Result};
use std::sync::{Arc, Mutex};

use crate::frame::{FrameView, CHANNELS};
use crate::layout::{CaptureMode, FrameLayout};

/// Largest native exposure value.
pub const MAX_EXPOSURE: i32 = 0x1FF;

/// Driver-side tunables touched by `configure_exposure_and_mirror`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverParameter {
    AutoGain,
    AutoWhiteBalance,
    Exposure,
    Gain,
    HorizontalFlip,
}

/// A fixed-format camera driver.
///
/// `init`/`uninit` manage driver-wide state. They are never called directly by the
/// crate; a `DriverLease` calls `init` when the first lease is taken and `uninit`
/// when the last one is dropped.
pub trait FixedFormatDriver: Send + Sync {
    /// Driver identifier (reported as `CameraInfo::driver_name`).
    fn name(&self) -> &'static str;

    /// Human-readable camera model (reported as `CameraInfo::display_name`).
    fn camera_name(&self) -> &'static str;

    fn init(&self);

    fn uninit(&self);

    /// Number of cameras in the driver's device table. Requires an active lease.
    fn count_connected(&self) -> usize;

    /// Capture resolutions the hardware supports.
    fn supported_modes(&self) -> &[CaptureMode];

    /// Open device `index` at `mode`, producing RGB24 frames.
    fn open(
        &self,
        index: usize,
        mode: CaptureMode,
        framerate: u32,
    ) -> Result<Box<dyn FixedFormatDevice>>;
}

/// One open fixed-format camera.
pub trait FixedFormatDevice: Send {
    /// Block until the next frame is available and write it into `rgb`.
    fn grab_frame(&mut self, rgb: &mut [u8]) -> Result<()>;

    fn set_parameter(&mut self, param: DriverParameter, value: i32) -> Result<()>;

    /// Stop streaming. Called once before the device is dropped.
    fn close(&mut self) {}
}

struct DriverShared {
    driver: Arc<dyn FixedFormatDriver>,
    leases: Mutex<usize>,
}

/// Keeps a driver initialized for as long as it is alive.
pub struct DriverLease {
    shared: Arc<DriverShared>,
}

impl DriverLease {
    fn acquire(shared: &Arc<DriverShared>) -> Self {
        let mut leases = shared.leases.lock().unwrap_or_else(|e| e.into_inner());
        if *leases == 0 {
            log::debug!("initializing driver {}", shared.driver.name());
            shared.driver.init();
        }
        *leases += 1;
        Self {
            shared: Arc::clone(shared),
        }
    }

    pub fn driver(&self) -> &dyn FixedFormatDriver {
        self.shared.driver.as_ref()
    }
}

impl Drop for DriverLease {
    fn drop(&mut self) {
        let mut leases = self.shared.leases.lock().unwrap_or_else(|e| e.into_inner());
        *leases = leases.saturating_sub(1);
        if *leases == 0 {
            log::debug!("releasing driver {}", self.shared.driver.name());
            self.shared.driver.uninit();
        }
    }
}

/// Backend wrapper around a fixed-format driver.
#[derive(Clone)]
pub struct FixedFormatBackend {
    shared: Arc<DriverShared>,
}

impl FixedFormatBackend {
    pub fn new(driver: Arc<dyn FixedFormatDriver>) -> Self {
        Self {
            shared: Arc::new(DriverShared {
                driver,
                leases: Mutex::new(0),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.shared.driver.name()
    }

    pub fn lease(&self) -> DriverLease {
        DriverLease::acquire(&self.shared)
    }

    pub fn supported_modes(&self) -> &[CaptureMode] {
        self.shared.driver.supported_modes()
    }

    /// Count connected cameras. Initializes the driver for the duration of the call
    /// unless a session already holds it.
    pub fn enumerate(&self) -> usize {
        self.lease().driver().count_connected()
    }

    /// Open a device at the layout's capture size. The lease taken here is released
    /// again on every failure path.
    pub fn open(
        &self,
        device_index: i32,
        layout: &FrameLayout,
        framerate: u32,
    ) -> Result<FixedFormatHandle> {
        let lease = self.lease();
        let driver = lease.driver();
        let index = usize::try_from(device_index).unwrap_or(0);
        let connected = driver.count_connected();
        if index >= connected {
            return Err(anyhow!(
                "{} reports {} connected camera(s), cannot open index {}",
                driver.name(),
                connected,
                index
            ));
        }

        let mode = CaptureMode::new(layout.capture_width, layout.capture_height);
        let device = driver
            .open(index, mode, framerate)
            .with_context(|| {
                format!(
                    "{}: open camera {} at {}x{}@{}",
                    driver.name(),
                    index,
                    mode.width,
                    mode.height,
                    framerate
                )
            })?;

        log::info!(
            "{}: opened camera {} ({}x{} @ {} fps)",
            driver.name(),
            index,
            mode.width,
            mode.height,
            framerate
        );

        Ok(FixedFormatHandle {
            driver_name: driver.name(),
            camera_name: driver.camera_name(),
            device: Some(device),
            buffer: vec![0u8; mode.width as usize * mode.height as usize * CHANNELS],
            width: mode.width,
            height: mode.height,
            device_index: index,
            lease: Some(lease),
        })
    }
}

/// An open fixed-format camera plus the buffer it captures into.
pub struct FixedFormatHandle {
    driver_name: &'static str,
    camera_name: &'static str,
    device: Option<Box<dyn FixedFormatDevice>>,
    buffer: Vec<u8>,
    width: u32,
    height: u32,
    device_index: usize,
    lease: Option<DriverLease>,
}

impl FixedFormatHandle {
    /// Grab the next frame into the handle's buffer. The buffer is overwritten on every
    /// call, so the returned view cannot outlive the next one.
    pub fn retrieve_raw(&mut self) -> Option<FrameView<'_>> {
        let device = self.device.as_mut()?;
        if let Err(err) = device.grab_frame(&mut self.buffer) {
            log::warn!("{}: frame grab failed: {:#}", self.driver_name, err);
            return None;
        }
        FrameView::packed(&self.buffer, self.width, self.height).ok()
    }

    /// Disable automatic gain and white balance, set exposure and horizontal flip.
    pub fn configure_exposure_and_mirror(&mut self, exposure: f32, mirror: bool) {
        let Some(device) = self.device.as_mut() else {
            return;
        };
        let settings = [
            (DriverParameter::AutoGain, 0),
            (DriverParameter::AutoWhiteBalance, 0),
            (DriverParameter::Exposure, exposure_to_native(exposure)),
            (DriverParameter::Gain, 0),
            (DriverParameter::HorizontalFlip, i32::from(mirror)),
        ];
        for (param, value) in settings {
            if let Err(err) = device.set_parameter(param, value) {
                log::warn!(
                    "{}: failed to set {:?}={}: {:#}",
                    self.driver_name,
                    param,
                    value,
                    err
                );
            }
        }
    }

    /// Release the device, the capture buffer and the driver lease, in that order.
    /// Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.close();
            log::info!("{}: closed camera {}", self.driver_name, self.device_index);
        }
        self.buffer = Vec::new();
        self.lease.take();
    }

    pub fn driver_name(&self) -> &'static str {
        self.driver_name
    }

    pub fn camera_name(&self) -> &'static str {
        self.camera_name
    }

    pub fn device_index(&self) -> usize {
        self.device_index
    }
}

impl Drop for FixedFormatHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Map a normalized exposure onto `0..=MAX_EXPOSURE`. Out-of-range input is clamped
/// first; NaN counts as 0.
pub fn exposure_to_native(exposure: f32) -> i32 {
    let clamped = if exposure.is_nan() {
        0.0
    } else {
        exposure.clamp(0.0, 1.0)
    };
    (clamped * MAX_EXPOSURE as f32).round() as i32
}
