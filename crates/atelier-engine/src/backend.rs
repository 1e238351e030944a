use std::collections::BTreeMap;

use atelier_contracts::generation::{AspectRatio, UploadedImage};
use serde_json::Value;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::dryrun::DryrunBackend;
use crate::gemini::GeminiBackend;

/// Text-to-image output is always requested in this format.
pub const OUTPUT_MIME_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextToImageCall {
    pub model: String,
    pub prompt: String,
    pub number_of_images: u32,
    pub aspect_ratio: AspectRatio,
    pub output_mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextToImageReply {
    /// Base64 payloads in the order the service returned them.
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Image,
    Text,
}

impl Modality {
    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Image => "IMAGE",
            Modality::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageConditionedCall {
    pub model: String,
    pub image: UploadedImage,
    pub text: String,
    pub response_modalities: Vec<Modality>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub data: String,
    pub mime_type: Option<String>,
}

/// The service refused the prompt outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptBlock {
    pub reason: String,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageConditionedReply {
    pub block: Option<PromptBlock>,
    pub images: Vec<InlineImage>,
    /// Concatenated text parts, if the service sent any.
    pub text: Option<String>,
}

/// The `error` object of a Google API error body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceError {
    pub code: Option<u16>,
    pub status: Option<String>,
    pub message: Option<String>,
}

impl ServiceError {
    /// Parses `{"error": {...}}`. Returns `None` unless the body is JSON
    /// with an `error` object carrying at least one known field.
    pub fn from_payload(body: &str) -> Option<Self> {
        let parsed: Value = serde_json::from_str(body.trim()).ok()?;
        let error = parsed.get("error").and_then(Value::as_object)?;
        let text = |key: &str| {
            error
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let service = ServiceError {
            code: error
                .get("code")
                .and_then(Value::as_u64)
                .and_then(|code| u16::try_from(code).ok()),
            status: text("status"),
            message: text("message"),
        };
        if service == ServiceError::default() {
            return None;
        }
        Some(service)
    }
}

/// A failed backend call. `service` is set when the remote side answered
/// with a structured error body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
    pub service: Option<ServiceError>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            service: None,
        }
    }

    pub fn from_response(provider: &str, status: u16, body: &str) -> Self {
        Self {
            message: format!(
                "{provider} request failed ({status}): {}",
                truncate_text(body.trim(), 512)
            ),
            service: ServiceError::from_payload(body),
        }
    }

    pub fn from_error(err: &anyhow::Error) -> Self {
        Self::new(error_chain_text(err, 1024))
    }
}

/// A remote image generation service.
///
/// Each call is a single attempt; implementations must not retry.
pub trait ImageBackend: Send + Sync {
    fn name(&self) -> &str;

    fn text_to_image(&self, call: &TextToImageCall) -> Result<TextToImageReply, BackendError>;

    fn image_conditioned(
        &self,
        call: &ImageConditionedCall,
    ) -> Result<ImageConditionedReply, BackendError>;
}

#[derive(Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Box<dyn ImageBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<B: ImageBackend + 'static>(&mut self, backend: B) {
        self.backends
            .insert(backend.name().to_string(), Box::new(backend));
    }

    pub fn get(&self, name: &str) -> Option<&dyn ImageBackend> {
        self.backends.get(name).map(|backend| backend.as_ref())
    }

    pub fn take(&mut self, name: &str) -> Option<Box<dyn ImageBackend>> {
        self.backends.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }
}

pub fn default_backend_registry(config: &EngineConfig) -> anyhow::Result<BackendRegistry> {
    let mut backends = BackendRegistry::new();
    backends.register(DryrunBackend);
    backends.register(GeminiBackend::new(config)?);
    Ok(backends)
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().map(|existing| existing == trimmed).unwrap_or(false) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(": "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
