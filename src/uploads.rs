//! Picture uploads: size validation, storage under the media directory,
//! and the post-save shrink pass.

use std::path::{Path, PathBuf};

use crate::humanize::naturalsize;

/// Subdirectory of the media dir where ad pictures live.
pub const ADS_IMAGES_DIR: &str = "ads_images";

/// If either dimension exceeds this, the stored picture is shrunk.
const MAX_DIMENSION: u32 = 300;
/// Bounding box the shrunk picture must fit within.
const BOUNDING_BOX: u32 = 400;

/// Reject uploads over the configured ceiling. The error message renders
/// the ceiling in binary units ("File must be < 2MB").
pub fn check_size(len: u64, limit: u64) -> Result<(), String> {
    if len > limit {
        Err(format!("File must be < {}", naturalsize(limit)))
    } else {
        Ok(())
    }
}

/// Persist uploaded bytes under `{media_dir}/ads_images/` with a fresh
/// uuid-based name, keeping the upload's extension. Returns the relative
/// path stored on the ad row (stable for the life of the upload).
pub fn store_picture(
    media_dir: &Path,
    original_filename: &str,
    bytes: &[u8],
) -> std::io::Result<String> {
    let ext = Path::new(original_filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string());

    let name = format!("{}.{}", uuid::Uuid::now_v7(), ext);
    let dir = media_dir.join(ADS_IMAGES_DIR);
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join(&name), bytes)?;

    Ok(format!("{}/{}", ADS_IMAGES_DIR, name))
}

/// Remove a previously stored picture. A missing file is not an error.
pub fn remove_picture(media_dir: &Path, relative: &str) {
    let path = media_dir.join(relative);
    if let Err(e) = std::fs::remove_file(&path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

/// Post-save pass: if the stored picture exceeds 300px in either
/// dimension, resize it to fit within a 400x400 bounding box (aspect
/// ratio preserved) and overwrite the file in place. Returns whether the
/// file was rewritten. A picture already within bounds is not touched.
pub fn shrink_oversized(path: &Path) -> anyhow::Result<bool> {
    let img = image::open(path)?;
    if img.width() <= MAX_DIMENSION && img.height() <= MAX_DIMENSION {
        return Ok(false);
    }

    let shrunk = img.thumbnail(BOUNDING_BOX, BOUNDING_BOX);
    shrunk.save(path)?;
    tracing::debug!(
        "Shrunk {} from {}x{} to {}x{}",
        path.display(),
        img.width(),
        img.height(),
        shrunk.width(),
        shrunk.height()
    );
    Ok(true)
}

/// Full path of a stored picture within the media dir.
pub fn picture_path(media_dir: &Path, relative: &str) -> PathBuf {
    media_dir.join(relative)
}
