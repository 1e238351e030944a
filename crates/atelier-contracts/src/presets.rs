use indexmap::IndexMap;

/// Image counts the text-to-image mode offers.
pub const IMAGE_COUNTS: [u32; 4] = [1, 2, 3, 4];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylePreset {
    pub label: String,
    /// Text appended to the prompt; empty for "None".
    pub value: String,
}

/// Ordered table of style presets, keyed by label.
#[derive(Debug, Clone)]
pub struct StyleCatalog {
    presets: IndexMap<String, StylePreset>,
}

impl Default for StyleCatalog {
    fn default() -> Self {
        Self::new(None)
    }
}

impl StyleCatalog {
    pub fn new(presets: Option<IndexMap<String, StylePreset>>) -> Self {
        Self {
            presets: presets.unwrap_or_else(default_presets),
        }
    }

    pub fn get(&self, label: &str) -> Option<&StylePreset> {
        self.presets.get(label)
    }

    pub fn list(&self) -> impl Iterator<Item = &StylePreset> {
        self.presets.values()
    }

    /// The first preset, used when nothing was chosen.
    pub fn default_preset(&self) -> Option<&StylePreset> {
        self.presets.values().next()
    }

    /// Finds a preset by label, ignoring case, spaces, `-` and `_`
    /// (`"digital-art"` finds "Digital Art"), or by its exact value.
    pub fn resolve(&self, input: &str) -> Option<&StylePreset> {
        let wanted = label_key(input);
        self.presets
            .values()
            .find(|preset| label_key(&preset.label) == wanted)
            .or_else(|| {
                let trimmed = input.trim();
                self.presets
                    .values()
                    .find(|preset| !preset.value.is_empty() && preset.value == trimmed)
            })
    }

    /// Label of the preset whose value is `value`, for display.
    pub fn label_for_value(&self, value: &str) -> Option<&str> {
        self.presets
            .values()
            .find(|preset| preset.value == value)
            .map(|preset| preset.label.as_str())
    }
}

fn label_key(raw: &str) -> String {
    raw.chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '-' && *ch != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn default_presets() -> IndexMap<String, StylePreset> {
    let mut map = IndexMap::new();
    let mut insert = |label: &str, value: &str| {
        map.insert(
            label.to_string(),
            StylePreset {
                label: label.to_string(),
                value: value.to_string(),
            },
        );
    };

    insert("None", "");
    insert(
        "Cinematic",
        "cinematic, dramatic lighting, high detail, film grain",
    );
    insert(
        "Photorealistic",
        "photorealistic, 8k, hyper-detailed, sharp focus",
    );
    insert(
        "Anime",
        "anime style, vibrant colors, cel-shaded, studio ghibli inspired",
    );
    insert(
        "Digital Art",
        "digital painting, fantasy, concept art, intricate details",
    );
    insert(
        "3D Model",
        "3d render, octane render, high quality, smooth shading",
    );
    insert("Pixel Art", "pixel art, 16-bit, retro gaming style");
    map
}
