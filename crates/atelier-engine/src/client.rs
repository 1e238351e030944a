use anyhow::{bail, Result};
use atelier_contracts::generation::{GeneratedImage, GenerationMode, GenerationRequest};
use thiserror::Error;

use crate::backend::{
    default_backend_registry, BackendError, ImageBackend, ImageConditionedCall, Modality,
    TextToImageCall, OUTPUT_MIME_TYPE,
};
use crate::config::EngineConfig;

pub const QUOTA_EXCEEDED_MESSAGE: &str =
    "API quota exceeded. Please check your plan and billing details.";

const QUOTA_STATUS: &str = "RESOURCE_EXHAUSTED";

/// Why a generation produced no images. Every variant renders with the
/// same `Failed to generate images: ` prefix so callers can show it as is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("Failed to generate images: {}", blocked_detail(.reason, .message))]
    Blocked {
        reason: String,
        message: Option<String>,
    },
    #[error("Failed to generate images: Image editing failed: {text}")]
    Rejected { text: String },
    #[error("Failed to generate images: {}", empty_detail(.mode))]
    Empty { mode: GenerationMode },
    #[error("Failed to generate images: {}", QUOTA_EXCEEDED_MESSAGE)]
    QuotaExceeded,
    #[error("Failed to generate images: {message}")]
    Unknown { message: String },
}

fn blocked_detail(reason: &str, message: &Option<String>) -> String {
    format!(
        "Request was blocked: {reason}. {}",
        message.as_deref().unwrap_or_default()
    )
    .trim()
    .to_string()
}

fn empty_detail(mode: &GenerationMode) -> &'static str {
    match mode {
        GenerationMode::ImageConditioned => {
            "API did not return any images for editing. The response was empty."
        }
        GenerationMode::TextToImage => "API did not return any images.",
    }
}

/// Appends the negative prompt as an exclusion sentence when it has content.
pub fn compose_prompt(prompt: &str, negative_prompt: Option<&str>) -> String {
    match negative_prompt {
        Some(negative) if !negative.trim().is_empty() => {
            format!("{prompt}. Do not include: {negative}.")
        }
        _ => prompt.to_string(),
    }
}

/// Maps a transport failure onto the error taxonomy. A structured quota
/// status wins, then a structured message, then the raw message.
pub fn normalize_backend_error(err: BackendError) -> GenerationError {
    let Some(service) = err.service else {
        return GenerationError::Unknown {
            message: err.message,
        };
    };
    if service.status.as_deref() == Some(QUOTA_STATUS) {
        return GenerationError::QuotaExceeded;
    }
    GenerationError::Unknown {
        message: service.message.unwrap_or(err.message),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub text_to_image: String,
    pub image_edit: String,
}

impl From<&EngineConfig> for ModelSelection {
    fn from(config: &EngineConfig) -> Self {
        Self {
            text_to_image: config.text_to_image_model.clone(),
            image_edit: config.image_edit_model.clone(),
        }
    }
}

pub struct GenerationClient {
    backend: Box<dyn ImageBackend>,
    models: ModelSelection,
}

impl GenerationClient {
    pub fn new(backend: Box<dyn ImageBackend>, models: ModelSelection) -> Self {
        Self { backend, models }
    }

    /// Builds a client on the backend named by `config.backend`.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let mut registry = default_backend_registry(config)?;
        let Some(backend) = registry.take(config.backend.trim()) else {
            bail!(
                "unknown backend '{}' (available: {})",
                config.backend,
                registry.names().join(", ")
            );
        };
        Ok(Self::new(backend, ModelSelection::from(config)))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn models(&self) -> &ModelSelection {
        &self.models
    }

    /// Runs exactly one remote call for `request`.
    pub fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<GeneratedImage>, GenerationError> {
        let mode = request.mode();
        tracing::info!(
            backend = self.backend.name(),
            mode = mode.as_str(),
            count = request.number_of_images,
            aspect_ratio = request.aspect_ratio.as_str(),
            "generating images"
        );
        let outcome = match mode {
            GenerationMode::ImageConditioned => self.image_conditioned(request),
            GenerationMode::TextToImage => self.text_to_image(request),
        };
        match &outcome {
            Ok(images) => tracing::debug!(count = images.len(), "generation finished"),
            Err(err) => tracing::error!(
                backend = self.backend.name(),
                mode = mode.as_str(),
                "error generating images: {err}"
            ),
        }
        outcome
    }

    fn text_to_image(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<GeneratedImage>, GenerationError> {
        let number_of_images = request.number_of_images.max(1);
        let call = TextToImageCall {
            model: self.models.text_to_image.clone(),
            prompt: compose_prompt(&request.prompt, request.negative_prompt.as_deref()),
            number_of_images,
            aspect_ratio: request.aspect_ratio,
            output_mime_type: OUTPUT_MIME_TYPE.to_string(),
        };
        let reply = self
            .backend
            .text_to_image(&call)
            .map_err(normalize_backend_error)?;
        if reply.images.is_empty() {
            return Err(GenerationError::Empty {
                mode: GenerationMode::TextToImage,
            });
        }
        Ok(reply
            .images
            .into_iter()
            .take(number_of_images as usize)
            .map(GeneratedImage::new)
            .collect())
    }

    fn image_conditioned(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<GeneratedImage>, GenerationError> {
        let Some(image) = request.reference_image.clone() else {
            return self.text_to_image(request);
        };
        let call = ImageConditionedCall {
            model: self.models.image_edit.clone(),
            image,
            text: compose_prompt(&request.prompt, request.negative_prompt.as_deref()),
            response_modalities: vec![Modality::Image, Modality::Text],
        };
        let reply = self
            .backend
            .image_conditioned(&call)
            .map_err(normalize_backend_error)?;

        if let Some(block) = reply.block {
            return Err(GenerationError::Blocked {
                reason: block.reason,
                message: block.message,
            });
        }
        if reply.images.is_empty() {
            if let Some(text) = reply
                .text
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
            {
                return Err(GenerationError::Rejected { text });
            }
            return Err(GenerationError::Empty {
                mode: GenerationMode::ImageConditioned,
            });
        }
        Ok(reply
            .images
            .into_iter()
            .map(|image| GeneratedImage::new(image.data))
            .collect())
    }
}
