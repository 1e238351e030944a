use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::upload::sniff_mime_type;

const PROMPT_STEM_CHARS: usize = 30;

/// `<first 30 prompt chars, whitespace runs as _>_<id>.<ext>`.
pub fn export_filename(prompt: &str, image_id: &str, extension: &str) -> String {
    let head: String = prompt.chars().take(PROMPT_STEM_CHARS).collect();
    let mut stem = String::with_capacity(head.len());
    let mut in_space = false;
    for ch in head.chars() {
        if ch.is_whitespace() {
            if !in_space {
                stem.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        stem.push(if is_separator(ch) { '_' } else { ch });
    }
    let id: String = image_id
        .chars()
        .map(|ch| if is_separator(ch) { '_' } else { ch })
        .collect();
    format!("{stem}_{id}.{extension}")
}

fn is_separator(ch: char) -> bool {
    matches!(ch, '/' | '\\')
}

/// Decodes `base64` and writes it into `out_dir`, returning the file path.
pub fn export_image(out_dir: &Path, prompt: &str, image_id: &str, base64: &str) -> Result<PathBuf> {
    let bytes = BASE64
        .decode(base64.trim().as_bytes())
        .with_context(|| format!("image {image_id} is not valid base64"))?;
    let extension = match sniff_mime_type(&bytes) {
        Some("image/png") => "png",
        Some("image/webp") => "webp",
        _ => "jpg",
    };
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let path = out_dir.join(export_filename(prompt, image_id, extension));
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), "exported image");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_uses_prompt_head_and_id() {
        assert_eq!(
            export_filename("a castle  at\tdusk", "abc", "jpg"),
            "a_castle_at_dusk_abc.jpg"
        );
        assert_eq!(
            export_filename("an extremely long prompt that keeps going", "id1", "jpg"),
            "an_extremely_long_prompt_that__id1.jpg"
        );
        assert_eq!(export_filename("", "id2", "jpg"), "_id2.jpg");
        assert_eq!(export_filename("cats/dogs", "id3", "png"), "cats_dogs_id3.png");
    }

    #[test]
    fn ids_cannot_escape_the_export_dir() -> Result<()> {
        assert_eq!(
            export_filename("fox", "../../etc\\passwd", "jpg"),
            "fox_.._.._etc_passwd.jpg"
        );

        let temp = tempfile::tempdir()?;
        let out_dir = temp.path().join("exports");
        let payload = BASE64.encode(b"\xFF\xD8\xFF\xE0 jpeg-ish");
        let path = export_image(&out_dir, "fox", "../outside", &payload)?;
        assert_eq!(path.parent(), Some(out_dir.as_path()));
        assert!(!temp.path().join("outside.jpg").exists());
        Ok(())
    }

    #[test]
    fn export_writes_decoded_bytes() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let out_dir = temp.path().join("exports");
        let payload = BASE64.encode(b"\xFF\xD8\xFF\xE0 jpeg-ish");
        let path = export_image(&out_dir, "red fox", "f1", &payload)?;
        assert_eq!(path, out_dir.join("red_fox_f1.jpg"));
        assert_eq!(fs::read(&path)?, b"\xFF\xD8\xFF\xE0 jpeg-ish");
        Ok(())
    }

    #[test]
    fn export_rejects_invalid_base64() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let err = export_image(temp.path(), "x", "bad", "***").unwrap_err();
        assert_eq!(err.to_string(), "image bad is not valid base64");
        Ok(())
    }
}
