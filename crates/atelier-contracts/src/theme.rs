use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::KeyValueStore;

pub const THEME_STORAGE_KEY: &str = "theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("unknown theme '{other}'")),
        }
    }
}

/// Light/dark preference persisted through a [`KeyValueStore`].
#[derive(Debug)]
pub struct ThemeController<S> {
    store: S,
    theme: Theme,
}

impl<S: KeyValueStore> ThemeController<S> {
    /// Uses the stored theme if there is one, otherwise dark when the
    /// environment prefers it. Any read problem falls back to light.
    pub fn load(mut store: S, prefers_dark: bool) -> Self {
        let theme = match store.read(THEME_STORAGE_KEY) {
            Ok(Some(Value::String(raw))) => raw.parse().ok(),
            Ok(_) => None,
            Err(err) => {
                tracing::debug!("theme unavailable: {err:#}");
                Some(Theme::Light)
            }
        }
        .unwrap_or(if prefers_dark { Theme::Dark } else { Theme::Light });
        Self { store, theme }
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn toggle(&mut self) -> Theme {
        self.set(self.theme.toggled());
        self.theme
    }

    pub fn set(&mut self, theme: Theme) {
        self.theme = theme;
        if let Err(err) = self
            .store
            .write(THEME_STORAGE_KEY, Value::String(theme.as_str().to_string()))
        {
            tracing::warn!(theme = theme.as_str(), "failed to save theme: {err:#}");
        }
    }
}
