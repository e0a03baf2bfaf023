use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::Error;

pub const ASSETS_URL_PREFIX: &str = "/assets";

/// Creates the thumbnail directory if it does not exist yet.
pub fn ensure_assets_dir(assets_root: &Path) -> Result<(), Error> {
    if !assets_root.exists() {
        log::info!("Creating assets directory {}", assets_root.display());
        std::fs::create_dir_all(assets_root).map_err(|e| {
            Error::IoError(format!(
                "Failed to create assets directory {}: {e}",
                assets_root.display()
            ))
        })?;
    }

    Ok(())
}

/// Thumbnails are stored as `<video id>.<extension>`, a new upload replaces the previous one.
pub fn thumbnail_file_name(video_id: Uuid, extension: &str) -> String {
    format!("{video_id}.{extension}")
}

pub fn thumbnail_path(assets_root: &Path, file_name: &str) -> PathBuf {
    assets_root.join(file_name)
}

pub fn thumbnail_url(file_name: &str) -> String {
    format!("{ASSETS_URL_PREFIX}/{file_name}")
}
