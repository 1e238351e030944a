use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use atelier_contracts::generation::UploadedImage;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageFormat;

/// Media types a reference image may have.
pub const ACCEPTED_MIME_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];

/// Reads a local image into an attachable reference.
///
/// The media type comes from the file content, falling back to the
/// extension when the content is not recognized.
pub fn read_image_file(path: &Path) -> Result<UploadedImage> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if bytes.is_empty() {
        bail!("{} is empty", path.display());
    }
    let Some(mime_type) = sniff_mime_type(&bytes).or_else(|| mime_type_from_extension(path))
    else {
        bail!(
            "unsupported image type for {} (expected png, jpeg or webp)",
            path.display()
        );
    };
    tracing::debug!(path = %path.display(), mime_type, bytes = bytes.len(), "read reference image");
    Ok(UploadedImage {
        base64: BASE64.encode(&bytes),
        mime_type: mime_type.to_string(),
    })
}

pub(crate) fn sniff_mime_type(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}

fn mime_type_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
