//! Session configuration.
//!
//! Loaded from an optional JSON file named by `TRACKER_CAMERA_CONFIG`, then overridden
//! field by field from `TRACKER_CAMERA_*` environment variables, then validated.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const ENV_CONFIG: &str = "TRACKER_CAMERA_CONFIG";
pub const ENV_WIDTH: &str = "TRACKER_CAMERA_WIDTH";
pub const ENV_HEIGHT: &str = "TRACKER_CAMERA_HEIGHT";
pub const ENV_SOURCE: &str = "TRACKER_CAMERA_SOURCE";
pub const ENV_INTRINSICS: &str = "TRACKER_CAMERA_INTRINSICS";
pub const ENV_DISTORTION: &str = "TRACKER_CAMERA_DISTORTION";
pub const ENV_DEINTERLACE: &str = "TRACKER_CAMERA_DEINTERLACE";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    source: Option<String>,
    deinterlace: Option<bool>,
    calibration: Option<CalibrationConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CalibrationConfigFile {
    intrinsics: Option<PathBuf>,
    distortion: Option<PathBuf>,
}

/// Session overrides that used to come from ad-hoc environment lookups.
///
/// Width/height overrides only apply when the caller leaves the size unspecified.
/// A source override replaces the physical device with a file or stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CameraConfig {
    pub width_override: Option<u32>,
    pub height_override: Option<u32>,
    pub source_override: Option<String>,
    pub intrinsics_path: Option<PathBuf>,
    pub distortion_path: Option<PathBuf>,
    pub deinterlace: bool,
}

impl CameraConfig {
    /// Optional JSON file named by `TRACKER_CAMERA_CONFIG`, then environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(ENV_CONFIG).ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CameraConfigFile) -> Self {
        let calibration = file.calibration.unwrap_or_default();
        Self {
            width_override: file.width,
            height_override: file.height,
            source_override: file.source,
            intrinsics_path: calibration.intrinsics,
            distortion_path: calibration.distortion,
            deinterlace: file.deinterlace.unwrap_or(false),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(width) = env_u32(ENV_WIDTH)? {
            self.width_override = Some(width);
        }
        if let Some(height) = env_u32(ENV_HEIGHT)? {
            self.height_override = Some(height);
        }
        if let Some(source) = env_string(ENV_SOURCE) {
            self.source_override = Some(source);
        }
        if let Some(path) = env_string(ENV_INTRINSICS) {
            self.intrinsics_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_string(ENV_DISTORTION) {
            self.distortion_path = Some(PathBuf::from(path));
        }
        if let Some(value) = env_string(ENV_DEINTERLACE) {
            self.deinterlace = parse_bool(&value)
                .ok_or_else(|| anyhow!("{} must be a boolean (1/0/true/false)", ENV_DEINTERLACE))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.width_override == Some(0) || self.height_override == Some(0) {
            return Err(anyhow!("width/height overrides must be greater than zero"));
        }
        if self.source_override.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(anyhow!("source override must not be blank"));
        }
        if self.intrinsics_path.is_some() != self.distortion_path.is_some() {
            log::warn!("only one calibration file configured; undistortion stays off");
        }
        Ok(())
    }

    /// Both calibration files, when both are configured.
    pub fn calibration_paths(&self) -> Option<(&Path, &Path)> {
        match (&self.intrinsics_path, &self.distortion_path) {
            (Some(intrinsics), Some(distortion)) => Some((intrinsics, distortion)),
            _ => None,
        }
    }
}

fn read_config_file(path: &Path) -> Result<CameraConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_u32(key: &str) -> Result<Option<u32>> {
    match env_string(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", key)),
        None => Ok(None),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
