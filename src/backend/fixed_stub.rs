//! In-process fixed-format driver.
//!
//! Behaves like a PS3 Eye class driver (640x480 and 320x240 modes, blocking grabs,
//! hardware horizontal flip) without any hardware. Tests keep an `Arc<StubDriver>` to
//! inspect how the crate drove it.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::fixed::{DriverParameter, FixedFormatDevice, FixedFormatDriver};
use super::synthetic::fill_pattern;
use crate::frame::CHANNELS;
use crate::layout::CaptureMode;

const STUB_MODES: [CaptureMode; 2] = [CaptureMode::new(640, 480), CaptureMode::new(320, 240)];

#[derive(Default)]
struct StubState {
    init_calls: AtomicUsize,
    uninit_calls: AtomicUsize,
    initialized: AtomicBool,
    open_devices: AtomicUsize,
    parameters: Mutex<Vec<(DriverParameter, i32)>>,
}

/// Counters describing how the stub driver has been used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StubDriverStats {
    pub init_calls: usize,
    pub uninit_calls: usize,
    pub initialized: bool,
    pub open_devices: usize,
}

pub struct StubDriver {
    cameras: usize,
    modes: Vec<CaptureMode>,
    fail_open: bool,
    state: Arc<StubState>,
}

impl StubDriver {
    /// Driver with `cameras` devices in its table.
    pub fn new(cameras: usize) -> Self {
        Self {
            cameras,
            modes: STUB_MODES.to_vec(),
            fail_open: false,
            state: Arc::new(StubState::default()),
        }
    }

    pub fn with_modes(mut self, modes: Vec<CaptureMode>) -> Self {
        self.modes = modes;
        self
    }

    /// Every `open` call fails after the device-table check, like a camera that is
    /// present but busy.
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn stats(&self) -> StubDriverStats {
        StubDriverStats {
            init_calls: self.state.init_calls.load(Ordering::SeqCst),
            uninit_calls: self.state.uninit_calls.load(Ordering::SeqCst),
            initialized: self.state.initialized.load(Ordering::SeqCst),
            open_devices: self.state.open_devices.load(Ordering::SeqCst),
        }
    }

    /// Every parameter write, in order.
    pub fn parameters(&self) -> Vec<(DriverParameter, i32)> {
        self.state
            .parameters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl FixedFormatDriver for StubDriver {
    fn name(&self) -> &'static str {
        "stub-eye"
    }

    fn camera_name(&self) -> &'static str {
        "Synthetic Eye"
    }

    fn init(&self) {
        self.state.init_calls.fetch_add(1, Ordering::SeqCst);
        self.state.initialized.store(true, Ordering::SeqCst);
    }

    fn uninit(&self) {
        self.state.uninit_calls.fetch_add(1, Ordering::SeqCst);
        self.state.initialized.store(false, Ordering::SeqCst);
    }

    fn count_connected(&self) -> usize {
        if self.state.initialized.load(Ordering::SeqCst) {
            self.cameras
        } else {
            0
        }
    }

    fn supported_modes(&self) -> &[CaptureMode] {
        &self.modes
    }

    fn open(
        &self,
        index: usize,
        mode: CaptureMode,
        _framerate: u32,
    ) -> Result<Box<dyn FixedFormatDevice>> {
        if !self.state.initialized.load(Ordering::SeqCst) {
            return Err(anyhow!("driver not initialized"));
        }
        if index >= self.cameras {
            return Err(anyhow!("no camera at index {}", index));
        }
        if self.fail_open {
            return Err(anyhow!("camera {} is busy", index));
        }
        if !self.modes.contains(&mode) {
            return Err(anyhow!("unsupported mode {}x{}", mode.width, mode.height));
        }
        self.state.open_devices.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubDevice {
            mode,
            frame_count: 0,
            mirror: false,
            open: true,
            state: Arc::clone(&self.state),
        }))
    }
}

struct StubDevice {
    mode: CaptureMode,
    frame_count: u64,
    mirror: bool,
    open: bool,
    state: Arc<StubState>,
}

impl FixedFormatDevice for StubDevice {
    fn grab_frame(&mut self, rgb: &mut [u8]) -> Result<()> {
        let expected = self.mode.width as usize * self.mode.height as usize * CHANNELS;
        if rgb.len() != expected {
            return Err(anyhow!(
                "capture buffer holds {} bytes, expected {}",
                rgb.len(),
                expected
            ));
        }
        fill_pattern(
            rgb,
            self.mode.width,
            self.mode.height,
            self.frame_count,
            self.mirror,
        );
        self.frame_count += 1;
        Ok(())
    }

    fn set_parameter(&mut self, param: DriverParameter, value: i32) -> Result<()> {
        if param == DriverParameter::HorizontalFlip {
            self.mirror = value != 0;
        }
        self.state
            .parameters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((param, value));
        Ok(())
    }

    fn close(&mut self) {
        if std::mem::replace(&mut self.open, false) {
            self.state.open_devices.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for StubDevice {
    fn drop(&mut self) {
        self.close();
    }
}
