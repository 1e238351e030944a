use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use crate::backend::{
    BackendError, ImageBackend, ImageConditionedCall, ImageConditionedReply, InlineImage,
    PromptBlock, TextToImageCall, TextToImageReply,
};
use crate::config::EngineConfig;

const MISSING_KEY_MESSAGE: &str = "GEMINI_API_KEY, GOOGLE_API_KEY or API_KEY not set";

/// Google Generative Language REST transport.
///
/// Text-to-image goes through Imagen `:predict`, image-conditioned
/// generation through Gemini `:generateContent`.
pub struct GeminiBackend {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl GeminiBackend {
    /// The HTTP client has no request timeout; a call lasts as long as
    /// the service takes.
    pub fn new(config: &EngineConfig) -> anyhow::Result<Self> {
        let http = HttpClient::builder()
            .timeout(None::<Duration>)
            .build()
            .context("failed to build Gemini HTTP client")?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            http,
        })
    }

    fn api_key(&self) -> Result<&str, BackendError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| BackendError::new(MISSING_KEY_MESSAGE))
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        let trimmed = model.trim();
        let model_id = trimmed.strip_prefix("models/").unwrap_or(trimmed);
        format!("{}/models/{model_id}:{method}", self.api_base)
    }

    fn post_json(
        &self,
        provider: &str,
        endpoint: &str,
        payload: &Value,
    ) -> Result<Value, BackendError> {
        let api_key = self.api_key()?;
        tracing::debug!(endpoint, "posting {provider} request");
        let response = self
            .http
            .post(endpoint)
            .query(&[("key", api_key)])
            .json(payload)
            .send()
            .with_context(|| format!("{provider} request failed ({endpoint})"))
            .map_err(|err| BackendError::from_error(&err))?;

        let status = response.status();
        let body = response
            .text()
            .with_context(|| format!("{provider} response body read failed"))
            .map_err(|err| BackendError::from_error(&err))?;
        if !status.is_success() {
            return Err(BackendError::from_response(provider, status.as_u16(), &body));
        }
        serde_json::from_str(&body)
            .with_context(|| format!("{provider} returned invalid JSON payload"))
            .map_err(|err| BackendError::from_error(&err))
    }
}

impl ImageBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn text_to_image(&self, call: &TextToImageCall) -> Result<TextToImageReply, BackendError> {
        let endpoint = self.endpoint(&call.model, "predict");
        let payload = predict_payload(call);
        let response = self.post_json("Imagen", &endpoint, &payload)?;
        Ok(parse_predictions(&response))
    }

    fn image_conditioned(
        &self,
        call: &ImageConditionedCall,
    ) -> Result<ImageConditionedReply, BackendError> {
        let endpoint = self.endpoint(&call.model, "generateContent");
        let payload = generate_content_payload(call);
        let response = self.post_json("Gemini", &endpoint, &payload)?;
        Ok(parse_generate_content(&response))
    }
}

pub(crate) fn predict_payload(call: &TextToImageCall) -> Value {
    json!({
        "instances": [{ "prompt": call.prompt }],
        "parameters": {
            "sampleCount": call.number_of_images,
            "aspectRatio": call.aspect_ratio.as_str(),
            "outputOptions": { "mimeType": call.output_mime_type },
        },
    })
}

pub(crate) fn generate_content_payload(call: &ImageConditionedCall) -> Value {
    let modalities: Vec<&str> = call
        .response_modalities
        .iter()
        .map(|modality| modality.as_str())
        .collect();
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                {
                    "inlineData": {
                        "mimeType": call.image.mime_type,
                        "data": call.image.base64,
                    }
                },
                { "text": call.text },
            ],
        }],
        "generationConfig": { "responseModalities": modalities },
    })
}

pub(crate) fn parse_predictions(payload: &Value) -> TextToImageReply {
    let images = payload
        .get("predictions")
        .or_else(|| payload.get("generatedImages"))
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    row.get("bytesBase64Encoded")
                        .or_else(|| row.get("image").and_then(|image| image.get("imageBytes")))
                        .and_then(Value::as_str)
                })
                .filter(|data| !data.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    TextToImageReply { images }
}

pub(crate) fn parse_generate_content(payload: &Value) -> ImageConditionedReply {
    let feedback = payload.get("promptFeedback");
    let block = feedback
        .and_then(|feedback| feedback.get("blockReason"))
        .and_then(Value::as_str)
        .filter(|reason| !reason.trim().is_empty())
        .map(|reason| PromptBlock {
            reason: reason.to_string(),
            message: feedback
                .and_then(|feedback| feedback.get("blockReasonMessage"))
                .and_then(Value::as_str)
                .map(str::to_string),
        });

    let parts = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut images = Vec::new();
    let mut texts = Vec::new();
    for part in &parts {
        let inline = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"));
        if let Some(data) = inline
            .and_then(|inline| inline.get("data"))
            .and_then(Value::as_str)
            .filter(|data| !data.is_empty())
        {
            images.push(InlineImage {
                data: data.to_string(),
                mime_type: inline
                    .and_then(|inline| inline.get("mimeType").or_else(|| inline.get("mime_type")))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            });
            continue;
        }
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            texts.push(text.to_string());
        }
    }

    ImageConditionedReply {
        block,
        images,
        text: if texts.is_empty() {
            None
        } else {
            Some(texts.join(""))
        },
    }
}
