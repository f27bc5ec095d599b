use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, StudioError};
use crate::models::CurveSettings;

fn sidecar_path(image_path: &Path) -> PathBuf {
    let mut file_name = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "photo".to_string());
    file_name.push_str(".curves.json");
    image_path
        .parent()
        .map(|p| p.join(&file_name))
        .unwrap_or_else(|| PathBuf::from(file_name))
}

pub fn save_curves_file(path: &Path, settings: &CurveSettings) -> Result<()> {
    let serialized = serde_json::to_string_pretty(settings)?;
    fs::write(path, serialized).map_err(|e| StudioError::io(path, e))?;
    debug!(path = %path.display(), "curves saved");
    Ok(())
}

/// Reads curve settings from an explicit file. Every curve is re-validated.
pub fn load_curves_file(path: &Path) -> Result<CurveSettings> {
    let data = fs::read_to_string(path).map_err(|e| StudioError::io(path, e))?;
    Ok(serde_json::from_str(&data)?)
}

/// Writes `<stem>.curves.json` next to the image and returns its path.
pub fn save_curves_for_image(image_path: &Path, settings: &CurveSettings) -> Result<PathBuf> {
    let path = sidecar_path(image_path);
    save_curves_file(&path, settings)?;
    Ok(path)
}

pub fn load_curves_for_image(image_path: &Path) -> Result<Option<CurveSettings>> {
    let path = sidecar_path(image_path);
    if !path.exists() {
        return Ok(None);
    }
    load_curves_file(&path).map(Some)
}
