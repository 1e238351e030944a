use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// An image returned by the service and not (yet) saved to the gallery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub id: String,
    pub base64: String,
}

impl GeneratedImage {
    /// Wraps a payload under a freshly generated id.
    pub fn new(base64: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            base64: base64.into(),
        }
    }
}

/// A user-supplied reference image, already base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedImage {
    pub base64: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Widescreen,
    #[serde(rename = "9:16")]
    Tall,
    #[serde(rename = "4:3")]
    Landscape,
    #[serde(rename = "3:4")]
    Portrait,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Widescreen,
        AspectRatio::Tall,
        AspectRatio::Landscape,
        AspectRatio::Portrait,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Widescreen => "16:9",
            AspectRatio::Tall => "9:16",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Portrait => "3:4",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported aspect ratio '{0}' (expected one of 1:1, 16:9, 9:16, 4:3, 3:4)")]
pub struct UnsupportedAspectRatio(pub String);

impl FromStr for AspectRatio {
    type Err = UnsupportedAspectRatio;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().replace('/', ":");
        AspectRatio::ALL
            .into_iter()
            .find(|ratio| ratio.as_str() == normalized)
            .ok_or_else(|| UnsupportedAspectRatio(raw.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    TextToImage,
    ImageConditioned,
}

impl GenerationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationMode::TextToImage => "text_to_image",
            GenerationMode::ImageConditioned => "image_conditioned",
        }
    }
}

/// One call's worth of generation parameters. Built fresh per submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub number_of_images: u32,
    pub aspect_ratio: AspectRatio,
    pub reference_image: Option<UploadedImage>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            number_of_images: 1,
            aspect_ratio: AspectRatio::default(),
            reference_image: None,
        }
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative_prompt.into());
        self
    }

    pub fn with_number_of_images(mut self, count: u32) -> Self {
        self.number_of_images = count;
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    pub fn with_reference_image(mut self, image: UploadedImage) -> Self {
        self.reference_image = Some(image);
        self
    }

    pub fn mode(&self) -> GenerationMode {
        if self.reference_image.is_some() {
            GenerationMode::ImageConditioned
        } else {
            GenerationMode::TextToImage
        }
    }
}
