/// One line of the interactive session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Noop,
    /// Plain text, or `/generate` with an optional replacement prompt.
    Generate { prompt: Option<String> },
    SetPrompt(String),
    SetNegativePrompt(String),
    SetStyle(String),
    SetAspectRatio(String),
    SetImageCount(String),
    AttachReference(String),
    DetachReference,
    ShowStatus,
    SaveResults(Vec<String>),
    ExportImages(Vec<String>),
    SetOutputDir(String),
    ListGallery,
    SearchGallery(String),
    ToggleFavoritesOnly,
    ToggleFavorite(Vec<String>),
    RemoveFromGallery(Vec<String>),
    ListStyles,
    ToggleTheme,
    Help,
    Quit,
    Unknown { command: String, arg: String },
}

/// Splits shell-style, falling back to whitespace on unbalanced quotes.
fn split_args(arg: &str) -> Vec<String> {
    let parts = shell_words::split(arg)
        .unwrap_or_else(|_| arg.split_whitespace().map(str::to_string).collect());
    parts.into_iter().filter(|part| !part.is_empty()).collect()
}

fn single_path(arg: &str) -> String {
    split_args(arg).join(" ")
}

fn non_empty(arg: &str) -> Option<String> {
    (!arg.is_empty()).then(|| arg.to_string())
}

fn command_intent(command: &str, arg: &str) -> Option<Intent> {
    let text = arg.to_string();
    let intent = match command {
        "prompt" => Intent::SetPrompt(text),
        "negative" => Intent::SetNegativePrompt(text),
        "style" => Intent::SetStyle(text),
        "ratio" => Intent::SetAspectRatio(text),
        "count" => Intent::SetImageCount(text),
        "search" => Intent::SearchGallery(text),
        "attach" => Intent::AttachReference(single_path(arg)),
        "outdir" => Intent::SetOutputDir(single_path(arg)),
        "save" => Intent::SaveResults(split_args(arg)),
        "export" => Intent::ExportImages(split_args(arg)),
        "fav" => Intent::ToggleFavorite(split_args(arg)),
        "rm" => Intent::RemoveFromGallery(split_args(arg)),
        "generate" => Intent::Generate {
            prompt: non_empty(arg),
        },
        "detach" => Intent::DetachReference,
        "status" => Intent::ShowStatus,
        "gallery" => Intent::ListGallery,
        "favorites" => Intent::ToggleFavoritesOnly,
        "styles" => Intent::ListStyles,
        "theme" => Intent::ToggleTheme,
        "help" => Intent::Help,
        "quit" | "exit" => Intent::Quit,
        _ => return None,
    };
    Some(intent)
}

/// Parses a session line. `/name rest` is a command (name matched
/// case-insensitively, `rest` trimmed); anything else is a prompt.
pub fn parse_intent(text: &str) -> Intent {
    let line = text.trim();
    if line.is_empty() {
        return Intent::Noop;
    }

    if let Some(tail) = line.strip_prefix('/') {
        let name_len = tail
            .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
            .unwrap_or(tail.len());
        if name_len > 0 {
            let command = tail[..name_len].to_ascii_lowercase();
            let arg = tail[name_len..].trim();
            return command_intent(&command, arg).unwrap_or_else(|| Intent::Unknown {
                command,
                arg: arg.to_string(),
            });
        }
    }

    Intent::Generate {
        prompt: Some(line.to_string()),
    }
}
