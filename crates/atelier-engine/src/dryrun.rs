use std::io::Cursor;

use anyhow::{Context, Result};
use atelier_contracts::generation::AspectRatio;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use crate::backend::{
    BackendError, ImageBackend, ImageConditionedCall, ImageConditionedReply, InlineImage,
    TextToImageCall, TextToImageReply, OUTPUT_MIME_TYPE,
};

/// Offline backend producing deterministic solid-color JPEGs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunBackend;

impl ImageBackend for DryrunBackend {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn text_to_image(&self, call: &TextToImageCall) -> Result<TextToImageReply, BackendError> {
        let (width, height) = dims_for_ratio(call.aspect_ratio);
        let images = (0..call.number_of_images)
            .map(|idx| {
                let color = color_from_prompt(&call.prompt, u64::from(idx));
                encode_jpeg(solid_image(width, height, color))
            })
            .collect::<Result<Vec<_>>>()
            .map_err(|err| BackendError::from_error(&err))?;
        Ok(TextToImageReply { images })
    }

    fn image_conditioned(
        &self,
        call: &ImageConditionedCall,
    ) -> Result<ImageConditionedReply, BackendError> {
        let image = tint_reference(&call.image.base64, &call.text)
            .map_err(|err| BackendError::from_error(&err))?;
        Ok(ImageConditionedReply {
            block: None,
            images: vec![InlineImage {
                data: image,
                mime_type: Some(OUTPUT_MIME_TYPE.to_string()),
            }],
            text: None,
        })
    }
}

fn dims_for_ratio(ratio: AspectRatio) -> (u32, u32) {
    match ratio {
        AspectRatio::Square => (256, 256),
        AspectRatio::Widescreen => (320, 180),
        AspectRatio::Tall => (180, 320),
        AspectRatio::Landscape => (320, 240),
        AspectRatio::Portrait => (240, 320),
    }
}

fn color_from_prompt(prompt: &str, seed: u64) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(seed.to_be_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

fn solid_image(width: u32, height: u32, (r, g, b): (u8, u8, u8)) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([r, g, b]))
}

fn tint_reference(base64: &str, prompt: &str) -> Result<String> {
    let bytes = BASE64
        .decode(base64.trim().as_bytes())
        .context("reference image base64 decode failed")?;
    let mut image = image::load_from_memory(&bytes)
        .context("reference image decode failed")?
        .to_rgb8();
    let (tr, tg, tb) = color_from_prompt(prompt, 0);
    for pixel in image.pixels_mut() {
        let [r, g, b] = pixel.0;
        *pixel = Rgb([blend(r, tr), blend(g, tg), blend(b, tb)]);
    }
    encode_jpeg(image)
}

fn blend(base: u8, tint: u8) -> u8 {
    ((u16::from(base) * 3 + u16::from(tint)) / 4) as u8
}

fn encode_jpeg(image: RgbImage) -> Result<String> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buffer, ImageFormat::Jpeg)
        .context("dryrun JPEG encode failed")?;
    Ok(BASE64.encode(buffer.into_inner()))
}

#[cfg(test)]
mod tests {
    use atelier_contracts::generation::UploadedImage;
    use image::GenericImageView;

    use super::*;
    use crate::backend::Modality;

    fn decode(base64: &str) -> DynamicImage {
        let bytes = BASE64.decode(base64).expect("base64");
        assert_eq!(image::guess_format(&bytes).expect("format"), ImageFormat::Jpeg);
        image::load_from_memory(&bytes).expect("decode")
    }

    fn call(prompt: &str, count: u32, ratio: AspectRatio) -> TextToImageCall {
        TextToImageCall {
            model: "imagen-4.0-generate-001".to_string(),
            prompt: prompt.to_string(),
            number_of_images: count,
            aspect_ratio: ratio,
            output_mime_type: OUTPUT_MIME_TYPE.to_string(),
        }
    }

    #[test]
    fn text_to_image_returns_requested_count_at_ratio() {
        let reply = DryrunBackend
            .text_to_image(&call("a lighthouse", 3, AspectRatio::Widescreen))
            .expect("dryrun");
        assert_eq!(reply.images.len(), 3);
        assert_eq!(decode(&reply.images[0]).dimensions(), (320, 180));
    }

    #[test]
    fn text_to_image_is_deterministic() {
        let first = DryrunBackend
            .text_to_image(&call("a lighthouse", 1, AspectRatio::Square))
            .expect("dryrun");
        let second = DryrunBackend
            .text_to_image(&call("a lighthouse", 1, AspectRatio::Square))
            .expect("dryrun");
        assert_eq!(first, second);
    }

    #[test]
    fn image_conditioned_tints_reference() {
        let reference = encode_jpeg(solid_image(40, 30, (10, 200, 30))).expect("encode");
        let reply = DryrunBackend
            .image_conditioned(&ImageConditionedCall {
                model: "gemini-2.5-flash-image-preview".to_string(),
                image: UploadedImage {
                    base64: reference,
                    mime_type: "image/jpeg".to_string(),
                },
                text: "make it warmer".to_string(),
                response_modalities: vec![Modality::Image, Modality::Text],
            })
            .expect("dryrun");
        assert!(reply.block.is_none());
        assert_eq!(reply.images.len(), 1);
        assert_eq!(decode(&reply.images[0].data).dimensions(), (40, 30));
    }

    #[test]
    fn image_conditioned_rejects_garbage_reference() {
        let err = DryrunBackend
            .image_conditioned(&ImageConditionedCall {
                model: "gemini-2.5-flash-image-preview".to_string(),
                image: UploadedImage {
                    base64: "bm90IGFuIGltYWdl".to_string(),
                    mime_type: "image/png".to_string(),
                },
                text: "anything".to_string(),
                response_modalities: vec![Modality::Image],
            })
            .unwrap_err();
        assert!(err.message.starts_with("reference image decode failed"));
    }
}
