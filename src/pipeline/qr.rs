//! QR image generation: encode a validation URL into a PNG on disk.

use crate::error::RegistryError;
use crate::pipeline::storage::temp_beside;
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Pixel size of one QR module.
const MODULE_PX: u32 = 10;

/// What to do when an image already exists at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QrWriteMode {
    /// Always regenerate and replace the image.
    #[default]
    Overwrite,
    /// Keep an existing image untouched (cache-by-existence).
    ReuseExisting,
}

/// Render `url` as a black-on-white QR code.
pub fn render_qr(url: &str) -> Result<DynamicImage, RegistryError> {
    let code = QrCode::new(url.as_bytes()).map_err(|e| RegistryError::QrEncoding {
        url: url.to_string(),
        detail: e.to_string(),
    })?;
    let image = code
        .render::<Luma<u8>>()
        .module_dimensions(MODULE_PX, MODULE_PX)
        .build();
    Ok(DynamicImage::ImageLuma8(image))
}

/// Write a PNG encoding `url` to `dest` and return `dest`.
///
/// Fails with [`RegistryError::Io`] if the destination directory is not
/// writable, and with [`RegistryError::QrEncoding`] if the URL is too long
/// for a QR symbol.
pub fn generate_qr(url: &str, dest: &Path, mode: QrWriteMode) -> Result<PathBuf, RegistryError> {
    if mode == QrWriteMode::ReuseExisting && dest.is_file() {
        debug!("Reusing existing QR image {}", dest.display());
        return Ok(dest.to_path_buf());
    }

    let image = render_qr(url)?;
    let mut png = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| RegistryError::Internal(format!("PNG encoding failed: {e}")))?;

    let mut tmp = temp_beside(dest)?;
    std::io::Write::write_all(&mut tmp, &png).map_err(|e| RegistryError::io(dest, e))?;
    tmp.persist(dest)
        .map_err(|e| RegistryError::io(dest, e.error))?;

    debug!(
        "Wrote QR {}x{} px for {} to {}",
        image.width(),
        image.height(),
        url,
        dest.display()
    );
    Ok(dest.to_path_buf())
}
