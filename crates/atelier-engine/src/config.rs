use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_TO_IMAGE_MODEL: &str = "imagen-4.0-generate-001";
pub const DEFAULT_IMAGE_EDIT_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_BACKEND: &str = "gemini";

/// Variables from the process environment, backed by a `.env` file.
///
/// Process values win; blank values count as unset in both sources.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    process: HashMap<String, String>,
    dotenv: HashMap<String, String>,
}

impl EnvSource {
    pub fn new(process: HashMap<String, String>, dotenv: HashMap<String, String>) -> Self {
        Self { process, dotenv }
    }

    /// Captures the process environment plus `dotenv_path` when it exists.
    pub fn load(dotenv_path: Option<&Path>) -> Self {
        let dotenv = dotenv_path
            .and_then(|path| std::fs::read_to_string(path).ok())
            .map(|content| parse_dotenv(&content))
            .unwrap_or_default();
        Self::new(std::env::vars().collect(), dotenv)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        [&self.process, &self.dotenv].into_iter().find_map(|source| {
            source
                .get(key)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        })
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        let value = self.get(key)?.to_ascii_lowercase();
        match value.as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }
}

pub fn parse_dotenv(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for raw_line in content.lines() {
        let mut line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix("export ") {
            line = stripped.trim();
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let unquoted = ['"', '\'']
            .into_iter()
            .find_map(|quote| {
                value
                    .strip_prefix(quote)
                    .and_then(|rest| rest.strip_suffix(quote))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), unquoted.to_string());
    }
    vars
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub backend: String,
    pub api_base: String,
    pub api_key: Option<String>,
    pub text_to_image_model: String,
    pub image_edit_model: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            text_to_image_model: DEFAULT_TEXT_TO_IMAGE_MODEL.to_string(),
            image_edit_model: DEFAULT_IMAGE_EDIT_MODEL.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env(env: &EnvSource) -> Self {
        let defaults = Self::default();
        Self {
            backend: env.get("ATELIER_BACKEND").unwrap_or(defaults.backend),
            api_base: env
                .get("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.api_base),
            api_key: env
                .get("GEMINI_API_KEY")
                .or_else(|| env.get("GOOGLE_API_KEY"))
                .or_else(|| env.get("API_KEY")),
            text_to_image_model: env
                .get("ATELIER_IMAGEN_MODEL")
                .unwrap_or(defaults.text_to_image_model),
            image_edit_model: env
                .get("ATELIER_EDIT_MODEL")
                .unwrap_or(defaults.image_edit_model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(process: &[(&str, &str)], dotenv: &[(&str, &str)]) -> EnvSource {
        let collect = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect::<HashMap<String, String>>()
        };
        EnvSource::new(collect(process), collect(dotenv))
    }

    #[test]
    fn parse_dotenv_handles_exports_quotes_and_comments() {
        let vars = parse_dotenv(
            "# comment\nexport GEMINI_API_KEY=\"abc 123\"\nATELIER_BACKEND = 'dryrun'\nbroken line\n=nokey\n",
        );
        assert_eq!(vars.get("GEMINI_API_KEY").map(String::as_str), Some("abc 123"));
        assert_eq!(vars.get("ATELIER_BACKEND").map(String::as_str), Some("dryrun"));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn process_env_wins_and_blank_values_fall_through() {
        let source = env(
            &[("GEMINI_API_KEY", "  "), ("API_KEY", "from-process")],
            &[("GEMINI_API_KEY", "from-dotenv")],
        );
        assert_eq!(source.get("GEMINI_API_KEY").as_deref(), Some("from-dotenv"));
        assert_eq!(source.get("API_KEY").as_deref(), Some("from-process"));
        assert_eq!(source.get("MISSING"), None);
    }

    #[test]
    fn config_defaults_when_env_is_empty() {
        assert_eq!(EngineConfig::from_env(&EnvSource::default()), EngineConfig::default());
    }

    #[test]
    fn config_reads_keys_in_priority_order() {
        let source = env(
            &[
                ("GOOGLE_API_KEY", "google"),
                ("API_KEY", "generic"),
                ("GEMINI_API_BASE", "http://localhost:9000/v1/"),
                ("ATELIER_IMAGEN_MODEL", "imagen-3.0-generate-002"),
            ],
            &[],
        );
        let config = EngineConfig::from_env(&source);
        assert_eq!(config.api_key.as_deref(), Some("google"));
        assert_eq!(config.api_base, "http://localhost:9000/v1");
        assert_eq!(config.text_to_image_model, "imagen-3.0-generate-002");
        assert_eq!(config.image_edit_model, DEFAULT_IMAGE_EDIT_MODEL);
    }

    #[test]
    fn bool_values_parse_loosely() {
        let source = env(&[("ATELIER_PREFERS_DARK", "Yes"), ("OTHER", "maybe")], &[]);
        assert_eq!(source.get_bool("ATELIER_PREFERS_DARK"), Some(true));
        assert_eq!(source.get_bool("OTHER"), None);
    }
}
