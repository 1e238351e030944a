use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A saved image plus the options that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryItem {
    pub id: String,
    pub base64: String,
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub aspect_ratio: String,
    #[serde(default)]
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
}

/// A gallery entry before the manager stamps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGalleryItem {
    pub id: String,
    pub base64: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub style: String,
    pub aspect_ratio: String,
}

impl NewGalleryItem {
    pub(crate) fn stamp(self, created_at: DateTime<Utc>) -> GalleryItem {
        GalleryItem {
            id: self.id,
            base64: self.base64,
            prompt: self.prompt,
            negative_prompt: self.negative_prompt,
            style: self.style,
            aspect_ratio: self.aspect_ratio,
            is_favorite: false,
            created_at,
        }
    }
}
