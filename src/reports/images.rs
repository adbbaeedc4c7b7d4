//! Local storage for report photos.

use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use image::ImageFormat;

pub const ANONYMOUS_REPORTER: &str = "anonymous";

/// Photos live under `<root>/<reporter>/<unix millis>.<ext>`. The stored
/// reference is the path relative to `root`.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn resolve(&self, image_ref: &str) -> PathBuf {
        self.root.join(image_ref)
    }

    /// Checks that `bytes` decode as an image and writes them to the reporter's folder.
    pub fn store(&self, reporter_id: &str, bytes: &[u8]) -> Result<String> {
        check_reporter_dir(reporter_id)?;

        let format = image::guess_format(bytes).context("photo is not a recognised image")?;
        image::load_from_memory_with_format(bytes, format)
            .with_context(|| format!("photo could not be decoded as {format:?}"))?;
        let extension = format.extensions_str().first().copied().unwrap_or("img");

        let dir = self.root.join(reporter_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create image folder {}", dir.display()))?;

        let mut millis = Utc::now().timestamp_millis();
        let mut file_name = format!("{millis}.{extension}");
        while dir.join(&file_name).exists() {
            millis += 1;
            file_name = format!("{millis}.{extension}");
        }

        let path = dir.join(&file_name);
        fs::write(&path, bytes)
            .with_context(|| format!("failed to write photo to {}", path.display()))?;

        Ok(format!("{reporter_id}/{file_name}"))
    }

    /// Best-effort removal of a stored photo.
    pub fn remove(&self, image_ref: &str) -> Result<()> {
        let path = self.resolve(image_ref);
        fs::remove_file(&path).with_context(|| format!("failed to remove {}", path.display()))
    }
}

fn check_reporter_dir(reporter_id: &str) -> Result<()> {
    let usable = !reporter_id.is_empty()
        && reporter_id != "."
        && reporter_id != ".."
        && reporter_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !usable {
        bail!("reporter id '{reporter_id}' cannot be used as a folder name");
    }
    Ok(())
}

/// Encodes a tiny solid image; used by tests across the crate.
#[cfg(test)]
pub(crate) fn sample_png() -> Vec<u8> {
    use std::io::Cursor;

    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(3, 2, image::Rgb([20, 120, 200])))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}
