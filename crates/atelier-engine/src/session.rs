use atelier_contracts::events::{EventLog, SessionEvent};
use atelier_contracts::gallery::NewGalleryItem;
use atelier_contracts::generation::{
    AspectRatio, GeneratedImage, GenerationRequest, UploadedImage,
};
use atelier_contracts::presets::IMAGE_COUNTS;
use thiserror::Error;

use crate::client::{GenerationClient, GenerationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading,
    Success,
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Loading => "loading",
            SessionState::Success => "success",
            SessionState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("a generation is already in progress")]
    Busy,
    #[error("enter a prompt before generating")]
    EmptyPrompt,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("image count must be one of 1, 2, 3 or 4 (got {0})")]
    InvalidImageCount(u32),
    #[error("image editing generates one image")]
    ImageCountLocked,
    #[error("aspect ratio is not applicable for image editing")]
    AspectRatioLocked,
    #[error("cannot change the reference image while generating")]
    Busy,
}

/// The form values a result was generated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptOptions {
    pub prompt: String,
    pub negative_prompt: String,
    pub style: String,
    pub aspect_ratio: AspectRatio,
}

impl PromptOptions {
    /// The prompt with the style descriptor appended, if any.
    pub fn full_prompt(&self) -> String {
        if self.style.is_empty() {
            self.prompt.clone()
        } else {
            format!("{}, {}", self.prompt, self.style)
        }
    }
}

/// Form state plus one generation cycle at a time.
///
/// `begin_submit` enters `Loading` and hands back the request to run;
/// `finish_submit` records its outcome. `submit` does both around a
/// blocking client call.
#[derive(Debug)]
pub struct GeneratorSession {
    prompt: String,
    negative_prompt: String,
    style: String,
    aspect_ratio: AspectRatio,
    image_count: u32,
    reference_image: Option<UploadedImage>,
    state: SessionState,
    error: Option<String>,
    results: Vec<GeneratedImage>,
    result_options: Option<PromptOptions>,
    pending_options: Option<PromptOptions>,
    events: Option<EventLog>,
}

impl Default for GeneratorSession {
    fn default() -> Self {
        Self::new()
    }
}

impl GeneratorSession {
    pub fn new() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            style: String::new(),
            aspect_ratio: AspectRatio::default(),
            image_count: IMAGE_COUNTS[0],
            reference_image: None,
            state: SessionState::Idle,
            error: None,
            results: Vec::new(),
            result_options: None,
            pending_options: None,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    pub fn negative_prompt(&self) -> &str {
        &self.negative_prompt
    }

    pub fn set_negative_prompt(&mut self, negative_prompt: impl Into<String>) {
        self.negative_prompt = negative_prompt.into();
    }

    /// The selected style preset value ("" for none).
    pub fn style(&self) -> &str {
        &self.style
    }

    pub fn set_style(&mut self, style: impl Into<String>) {
        self.style = style.into();
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: AspectRatio) -> Result<(), FormError> {
        if self.aspect_ratio_locked() {
            return Err(FormError::AspectRatioLocked);
        }
        self.aspect_ratio = aspect_ratio;
        Ok(())
    }

    pub fn aspect_ratio_locked(&self) -> bool {
        self.reference_image.is_some()
    }

    /// The user's last manual choice, kept while a reference is attached.
    pub fn selected_image_count(&self) -> u32 {
        self.image_count
    }

    pub fn effective_image_count(&self) -> u32 {
        if self.reference_image.is_some() {
            1
        } else {
            self.image_count
        }
    }

    pub fn set_image_count(&mut self, count: u32) -> Result<(), FormError> {
        if self.reference_image.is_some() {
            return Err(FormError::ImageCountLocked);
        }
        if !IMAGE_COUNTS.contains(&count) {
            return Err(FormError::InvalidImageCount(count));
        }
        self.image_count = count;
        Ok(())
    }

    pub fn reference_image(&self) -> Option<&UploadedImage> {
        self.reference_image.as_ref()
    }

    pub fn attach_reference(&mut self, image: UploadedImage) -> Result<(), FormError> {
        if self.state == SessionState::Loading {
            return Err(FormError::Busy);
        }
        self.reference_image = Some(image);
        Ok(())
    }

    pub fn detach_reference(&mut self) -> Result<Option<UploadedImage>, FormError> {
        if self.state == SessionState::Loading {
            return Err(FormError::Busy);
        }
        Ok(self.reference_image.take())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == SessionState::Loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn results(&self) -> &[GeneratedImage] {
        &self.results
    }

    /// Options of the submit that produced the current results.
    pub fn result_options(&self) -> Option<&PromptOptions> {
        self.result_options.as_ref()
    }

    pub fn options(&self) -> PromptOptions {
        PromptOptions {
            prompt: self.prompt.clone(),
            negative_prompt: self.negative_prompt.clone(),
            style: self.style.clone(),
            aspect_ratio: self.aspect_ratio,
        }
    }

    pub fn can_submit(&self) -> bool {
        self.state != SessionState::Loading && !self.prompt.trim().is_empty()
    }

    pub fn begin_submit(&mut self) -> Result<GenerationRequest, SubmitError> {
        if self.state == SessionState::Loading {
            return Err(SubmitError::Busy);
        }
        if self.prompt.trim().is_empty() {
            return Err(SubmitError::EmptyPrompt);
        }

        self.state = SessionState::Loading;
        self.error = None;
        self.results.clear();
        self.result_options = None;

        let options = self.options();
        let mut request = GenerationRequest::new(options.full_prompt())
            .with_negative_prompt(options.negative_prompt.clone())
            .with_number_of_images(self.effective_image_count())
            .with_aspect_ratio(options.aspect_ratio);
        if let Some(image) = self.reference_image.clone() {
            request = request.with_reference_image(image);
        }
        self.pending_options = Some(options);

        self.record(SessionEvent::GenerationStarted {
            mode: request.mode(),
            prompt: request.prompt.clone(),
            negative_prompt: self.negative_prompt.clone(),
            number_of_images: request.number_of_images,
            aspect_ratio: request.aspect_ratio,
        });
        Ok(request)
    }

    /// Records the outcome of the request handed out by `begin_submit`.
    /// Ignored unless the session is loading.
    pub fn finish_submit(&mut self, outcome: Result<Vec<GeneratedImage>, GenerationError>) {
        if self.state != SessionState::Loading {
            tracing::warn!(
                state = self.state.as_str(),
                "ignoring generation outcome outside of loading"
            );
            return;
        }
        let options = self.pending_options.take();
        match outcome {
            Ok(images) => {
                self.record(SessionEvent::GenerationSucceeded {
                    count: images.len(),
                    image_ids: images.iter().map(|image| image.id.clone()).collect(),
                });
                self.results = images;
                self.result_options = options;
                self.state = SessionState::Success;
            }
            Err(err) => {
                let message = err.to_string();
                self.record(SessionEvent::GenerationFailed {
                    error: message.clone(),
                });
                self.results.clear();
                self.error = Some(message);
                self.state = SessionState::Failed;
            }
        }
    }

    pub fn submit(&mut self, client: &GenerationClient) -> Result<SessionState, SubmitError> {
        let request = self.begin_submit()?;
        let outcome = client.generate(&request);
        self.finish_submit(outcome);
        Ok(self.state)
    }

    /// The gallery entry for one of the current results.
    pub fn gallery_entry(&self, image_id: &str) -> Option<NewGalleryItem> {
        let image = self.results.iter().find(|image| image.id == image_id)?;
        let options = self.result_options.as_ref()?;
        Some(NewGalleryItem {
            id: image.id.clone(),
            base64: image.base64.clone(),
            prompt: options.prompt.clone(),
            negative_prompt: options.negative_prompt.clone(),
            style: options.style.clone(),
            aspect_ratio: options.aspect_ratio.as_str().to_string(),
        })
    }

    fn record(&self, event: SessionEvent) {
        if let Some(events) = self.events.as_ref() {
            events.record(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::Value;

    use super::*;
    use crate::backend::BackendError;
    use crate::client::tests::{fake_client, FakeBackend};

    fn reference() -> UploadedImage {
        UploadedImage {
            base64: "cmVm".to_string(),
            mime_type: "image/png".to_string(),
        }
    }

    fn ready_session(prompt: &str) -> GeneratorSession {
        let mut session = GeneratorSession::new();
        session.set_prompt(prompt);
        session
    }

    #[test]
    fn submit_refused_for_blank_prompt() {
        let mut session = ready_session("   ");
        assert!(!session.can_submit());
        assert_eq!(session.begin_submit(), Err(SubmitError::EmptyPrompt));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn submit_refused_while_loading() {
        let mut session = ready_session("a cat");
        session.begin_submit().expect("first submit");
        assert!(session.is_loading());
        assert!(!session.can_submit());
        assert_eq!(session.begin_submit(), Err(SubmitError::Busy));
    }

    #[test]
    fn begin_submit_clears_previous_outcome() {
        let mut session = ready_session("a cat");
        session.begin_submit().expect("submit");
        session.finish_submit(Err(GenerationError::QuotaExceeded));
        assert!(session.error().is_some());

        session.begin_submit().expect("resubmit");
        assert_eq!(session.state(), SessionState::Loading);
        assert!(session.error().is_none());
        assert!(session.results().is_empty());
    }

    #[test]
    fn success_yields_requested_count_and_no_error() {
        let (client, _) = fake_client(FakeBackend::with_images(4));
        for count in IMAGE_COUNTS {
            let mut session = ready_session("a cat");
            session.set_image_count(count).expect("count");
            assert_eq!(session.submit(&client), Ok(SessionState::Success));
            assert_eq!(session.results().len(), count as usize);
            assert!(session.error().is_none());
        }
    }

    #[test]
    fn failure_yields_message_and_no_results() {
        let (client, _) = fake_client(FakeBackend::failing(BackendError::new("boom")));
        let mut session = ready_session("a cat");
        assert_eq!(session.submit(&client), Ok(SessionState::Failed));
        assert_eq!(session.error(), Some("Failed to generate images: boom"));
        assert!(session.results().is_empty());
    }

    #[test]
    fn style_is_appended_before_negative_prompt() {
        let (client, log) = fake_client(FakeBackend::with_images(1));
        let mut session = ready_session("a castle");
        session.set_style("pixel art, 16-bit, retro gaming style");
        session.set_negative_prompt("people");
        session.submit(&client).expect("submit");

        let calls = log.text_to_image.lock().expect("log lock");
        assert_eq!(
            calls[0].prompt,
            "a castle, pixel art, 16-bit, retro gaming style. Do not include: people."
        );
    }

    #[test]
    fn reference_forces_single_image_and_detach_restores() {
        let mut session = ready_session("a cat");
        session.set_image_count(3).expect("count");
        session.attach_reference(reference()).expect("attach");

        assert_eq!(session.effective_image_count(), 1);
        assert_eq!(session.set_image_count(2), Err(FormError::ImageCountLocked));
        assert!(session.aspect_ratio_locked());
        assert_eq!(
            session.set_aspect_ratio(AspectRatio::Widescreen),
            Err(FormError::AspectRatioLocked)
        );
        let request = session.begin_submit().expect("submit");
        assert_eq!(request.number_of_images, 1);
        assert_eq!(request.reference_image, Some(reference()));
        session.finish_submit(Ok(Vec::new()));

        assert_eq!(session.detach_reference(), Ok(Some(reference())));
        assert_eq!(session.effective_image_count(), 3);
        assert!(session.set_aspect_ratio(AspectRatio::Widescreen).is_ok());
    }

    #[test]
    fn attach_refused_while_loading() {
        let mut session = ready_session("a cat");
        session.begin_submit().expect("submit");
        assert_eq!(session.attach_reference(reference()), Err(FormError::Busy));
    }

    #[test]
    fn detach_refused_while_loading() {
        let mut session = ready_session("a cat");
        session.attach_reference(reference()).expect("attach");
        let request = session.begin_submit().expect("submit");

        assert_eq!(session.detach_reference(), Err(FormError::Busy));
        assert_eq!(session.reference_image(), Some(&reference()));
        assert_eq!(request.reference_image, Some(reference()));

        session.finish_submit(Ok(Vec::new()));
        assert_eq!(session.detach_reference(), Ok(Some(reference())));
        assert_eq!(session.detach_reference(), Ok(None));
    }

    #[test]
    fn invalid_image_count_rejected() {
        let mut session = GeneratorSession::new();
        assert_eq!(session.set_image_count(5), Err(FormError::InvalidImageCount(5)));
        assert_eq!(session.set_image_count(0), Err(FormError::InvalidImageCount(0)));
        assert_eq!(session.selected_image_count(), 1);
    }

    #[test]
    fn gallery_entry_uses_options_from_submit_time() {
        let (client, _) = fake_client(FakeBackend::with_images(2));
        let mut session = ready_session("a cat");
        session.set_negative_prompt("dogs");
        session.set_style("anime style");
        session
            .set_aspect_ratio(AspectRatio::Tall)
            .expect("ratio");
        session.submit(&client).expect("submit");

        session.set_prompt("something else");
        session.set_style("");
        let image_id = session.results()[1].id.clone();
        let entry = session.gallery_entry(&image_id).expect("entry");
        assert_eq!(entry.id, image_id);
        assert_eq!(entry.base64, "img1");
        assert_eq!(entry.prompt, "a cat");
        assert_eq!(entry.negative_prompt, "dogs");
        assert_eq!(entry.style, "anime style");
        assert_eq!(entry.aspect_ratio, "9:16");
        assert!(session.gallery_entry("missing").is_none());
    }

    #[test]
    fn stray_outcome_is_ignored() {
        let mut session = ready_session("a cat");
        session.finish_submit(Err(GenerationError::QuotaExceeded));
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.error().is_none());
    }

    #[test]
    fn events_follow_the_generation_cycle() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let (client, _) = fake_client(FakeBackend::with_images(2));
        let mut session = ready_session("a cat").with_events(EventLog::new(&path, "s1"));
        session.set_image_count(2).expect("count");
        session.submit(&client).expect("submit");

        let (failing, _) = client_failing();
        session.submit(&failing).expect("submit");

        let lines: Vec<Value> = fs::read_to_string(&path)?
            .lines()
            .map(serde_json::from_str::<Value>)
            .collect::<Result<_, _>>()?;
        let types: Vec<&str> = lines
            .iter()
            .filter_map(|line| line["type"].as_str())
            .collect();
        assert_eq!(
            types,
            vec![
                "generation_started",
                "generation_succeeded",
                "generation_started",
                "generation_failed"
            ]
        );
        assert_eq!(lines[0]["mode"], "text_to_image");
        assert_eq!(lines[0]["number_of_images"], 2);
        assert_eq!(lines[1]["count"], 2);
        assert_eq!(lines[3]["error"], "Failed to generate images: offline");
        assert!(lines.iter().all(|line| line["session_id"] == "s1"));
        Ok(())
    }

    fn client_failing() -> (GenerationClient, crate::client::tests::CallLog) {
        fake_client(FakeBackend::failing(BackendError::new("offline")))
    }
}
