use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::generation::{AspectRatio, GenerationMode};

/// What happened during a generator session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    GenerationStarted {
        mode: GenerationMode,
        prompt: String,
        negative_prompt: String,
        number_of_images: u32,
        aspect_ratio: AspectRatio,
    },
    GenerationSucceeded {
        count: usize,
        image_ids: Vec<String>,
    },
    GenerationFailed {
        error: String,
    },
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::GenerationStarted { .. } => "generation_started",
            SessionEvent::GenerationSucceeded { .. } => "generation_succeeded",
            SessionEvent::GenerationFailed { .. } => "generation_failed",
        }
    }
}

/// Append-only `events.jsonl` for one session.
///
/// Each line is the event's fields plus `session_id` and `ts`. The file is
/// opened on first use and kept open.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    session_id: String,
    file: Mutex<Option<File>>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: session_id.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Appends `event` and returns the line as written.
    pub fn emit(&self, event: &SessionEvent) -> anyhow::Result<Value> {
        let Value::Object(mut line) = serde_json::to_value(event)? else {
            bail!("{} did not serialize to an object", event.kind());
        };
        line.insert(
            "session_id".to_string(),
            Value::String(self.session_id.clone()),
        );
        line.insert(
            "ts".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)),
        );
        let line = Value::Object(line);
        let mut encoded = serde_json::to_vec(&line)?;
        encoded.push(b'\n');

        let mut guard = self
            .file
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        if let Some(file) = guard.as_mut() {
            file.write_all(&encoded)
                .with_context(|| format!("failed appending to {}", self.path.display()))?;
        }
        Ok(line)
    }

    /// Like [`EventLog::emit`], but a failed append is only logged.
    pub fn record(&self, event: &SessionEvent) {
        if let Err(err) = self.emit(event) {
            tracing::warn!(
                event = event.kind(),
                path = %self.path.display(),
                "failed to append session event: {err:#}"
            );
        }
    }

    fn open(&self) -> anyhow::Result<File> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed creating {}", parent.display()))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed opening {}", self.path.display()))
    }
}
