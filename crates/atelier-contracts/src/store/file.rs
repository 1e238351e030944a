use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde_json::{Map, Value};

use super::KeyValueStore;

/// A JSON object on disk mapping keys to values.
///
/// Reads always go back to disk, and writes merge the single key into
/// whatever the file holds at that moment, so two stores pointed at the same
/// file (the gallery and the theme controller) never clobber each other's
/// keys. The file is replaced atomically. Contents that cannot be parsed are
/// copied to `<name>.bak` before the first write replaces them.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".bak");
        self.path.with_file_name(name)
    }
}

impl KeyValueStore for FileStore {
    fn read(&mut self, key: &str) -> anyhow::Result<Option<Value>> {
        let payload = read_json_object(&self.path)?.unwrap_or_default();
        Ok(payload.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: Value) -> anyhow::Result<()> {
        let mut on_disk = match read_json_object(&self.path) {
            Ok(payload) => payload.unwrap_or_default(),
            Err(err) => {
                let backup = self.backup_path();
                std::fs::copy(&self.path, &backup).with_context(|| {
                    format!(
                        "refusing to replace unreadable {} without a backup",
                        self.path.display()
                    )
                })?;
                tracing::warn!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    "replacing unreadable store contents: {err:#}"
                );
                Map::new()
            }
        };
        on_disk.insert(key.to_string(), value);
        write_json_object(&self.path, &on_disk)
    }
}

fn read_json_object(path: &Path) -> anyhow::Result<Option<Map<String, Value>>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed reading {}", path.display()));
        }
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let parsed: Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let Value::Object(payload) = parsed else {
        bail!("{} does not hold a JSON object", path.display());
    };
    Ok(Some(payload))
}

fn write_json_object(path: &Path, payload: &Map<String, Value>) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).with_context(|| format!("failed creating {}", dir.display()))?;

    let encoded = serde_json::to_string_pretty(&Value::Object(payload.clone()))?;
    let mut staged = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("failed staging a write in {}", dir.display()))?;
    staged
        .write_all(encoded.as_bytes())
        .and_then(|()| staged.as_file().sync_all())
        .with_context(|| format!("failed writing {}", staged.path().display()))?;
    staged
        .persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed replacing {}", path.display()))?;
    Ok(())
}
