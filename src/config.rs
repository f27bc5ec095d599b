use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs::{config_dir, download_dir, home_dir};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, StudioError};

const APP_DIR: &str = "passport-studio";
const CONFIG_FILE: &str = "config.json";

pub const MM_PER_INCH: f64 = 25.4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewportConfig {
    pub container_width: f64,
    pub container_height: f64,
    /// Share of the container the crop box may occupy along its limiting side.
    pub crop_box_fill: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub width_overfill: f64,
    pub height_overfill: f64,
    /// Auto-frame upward shift, as a fraction of the rendered image height.
    pub vertical_bias: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            container_width: 480.0,
            container_height: 600.0,
            crop_box_fill: 0.8,
            min_zoom: 0.1,
            max_zoom: 4.0,
            width_overfill: 1.6,
            height_overfill: 1.3,
            vertical_bias: 0.18,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    pub debounce_ms: u64,
    pub history_capacity: usize,
    pub preview_max_dimension: u32,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            history_capacity: 50,
            preview_max_dimension: 1440,
        }
    }
}

impl EditorConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SheetConfig {
    /// The one scale shared by sheet and photo.
    pub px_per_mm: f64,
    pub sheet_width_in: f64,
    pub sheet_height_in: f64,
    pub photo_width_mm: f64,
    pub photo_height_mm: f64,
    pub copies: u32,
    pub cut_guides: bool,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            px_per_mm: 10.0,
            sheet_width_in: 4.0,
            sheet_height_in: 6.0,
            photo_width_mm: 35.0,
            photo_height_mm: 45.0,
            copies: 8,
            cut_guides: true,
        }
    }
}

impl SheetConfig {
    pub fn mm_to_px(&self, mm: f64) -> u32 {
        (mm * self.px_per_mm).round().max(0.0) as u32
    }

    pub fn inches_to_px(&self, inches: f64) -> u32 {
        self.mm_to_px(inches * MM_PER_INCH)
    }

    pub fn photo_px(&self) -> (u32, u32) {
        (
            self.mm_to_px(self.photo_width_mm),
            self.mm_to_px(self.photo_height_mm),
        )
    }

    pub fn sheet_px(&self) -> (u32, u32) {
        (
            self.inches_to_px(self.sheet_width_in),
            self.inches_to_px(self.sheet_height_in),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 2000,
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `retry` (0-based): base, 2x base, 4x base...
    pub fn delay(&self, retry: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << retry.min(32)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudioConfig {
    pub viewport: ViewportConfig,
    pub editor: EditorConfig,
    pub sheet: SheetConfig,
    pub retry: RetryPolicy,
}

pub fn config_root() -> Result<PathBuf> {
    let base = config_dir().ok_or(StudioError::MissingDir("config"))?;
    Ok(base.join(APP_DIR))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_root()?.join(CONFIG_FILE))
}

/// Where exported sheets go when no directory is given.
pub fn default_output_dir() -> Result<PathBuf> {
    download_dir()
        .or_else(home_dir)
        .ok_or(StudioError::MissingDir("output"))
}

pub fn load_config_from(path: &Path) -> Result<StudioConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(StudioConfig::default());
    }
    let data = fs::read_to_string(path).map_err(|e| StudioError::io(path, e))?;
    Ok(serde_json::from_str(&data)?)
}

/// Explicit file if given, else the per-user config file, else defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<StudioConfig> {
    match explicit {
        Some(path) => {
            let data = fs::read_to_string(path).map_err(|e| StudioError::io(path, e))?;
            Ok(serde_json::from_str(&data)?)
        }
        None => match default_config_path() {
            Ok(path) => load_config_from(&path),
            Err(_) => Ok(StudioConfig::default()),
        },
    }
}

pub fn save_config(path: &Path, config: &StudioConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StudioError::io(parent, e))?;
    }
    let serialized = serde_json::to_string_pretty(config)?;
    fs::write(path, serialized).map_err(|e| StudioError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn physical_sizes_share_one_scale() {
        let sheet = SheetConfig::default();
        assert_eq!(sheet.photo_px(), (350, 450));
        assert_eq!(sheet.sheet_px(), (1016, 1524));
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_secs(2));
        assert_eq!(policy.delay(1), Duration::from_secs(4));
        assert_eq!(policy.delay(2), Duration::from_secs(8));
    }

    #[test]
    fn missing_file_gives_defaults_and_partial_file_merges() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert_eq!(load_config_from(&path).unwrap(), StudioConfig::default());

        fs::write(&path, r#"{"editor":{"debounceMs":80},"sheet":{"copies":4}}"#).unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.editor.debounce_ms, 80);
        assert_eq!(cfg.editor.history_capacity, 50);
        assert_eq!(cfg.sheet.copies, 4);
        assert_eq!(cfg.sheet.px_per_mm, 10.0);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config_from(&path), Err(StudioError::Json(_))));
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut cfg = StudioConfig::default();
        cfg.viewport.vertical_bias = 0.2;
        save_config(&path, &cfg).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), cfg);
    }
}
