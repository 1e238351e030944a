use std::collections::HashSet;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use super::item::{GalleryItem, NewGalleryItem};
use crate::store::KeyValueStore;

pub const GALLERY_STORAGE_KEY: &str = "atelier-gallery";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GalleryError {
    #[error("gallery already contains an item with id '{0}'")]
    DuplicateId(String),
}

/// In-memory gallery mirrored into a [`KeyValueStore`].
///
/// The in-memory collection is authoritative for the session. Every
/// mutation rewrites the whole collection under [`GALLERY_STORAGE_KEY`];
/// a failed write is logged and otherwise ignored.
#[derive(Debug)]
pub struct GalleryManager<S> {
    store: S,
    items: Vec<GalleryItem>,
}

impl<S: KeyValueStore> GalleryManager<S> {
    /// Reads the stored collection. Unreadable data yields an empty gallery.
    pub fn load(mut store: S) -> Self {
        let items = match read_collection(&mut store) {
            Ok(items) => items,
            Err(err) => {
                tracing::warn!("failed to read gallery, starting empty: {err:#}");
                Vec::new()
            }
        };
        Self { store, items }
    }

    /// Items in collection order (newest insertions first).
    pub fn items(&self) -> &[GalleryItem] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&GalleryItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The collection as it is written to the store.
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(&self.items).unwrap_or(Value::Array(Vec::new()))
    }

    pub fn add(&mut self, item: NewGalleryItem) -> Result<&GalleryItem, GalleryError> {
        self.add_at(item, Utc::now())
    }

    fn add_at(
        &mut self,
        item: NewGalleryItem,
        created_at: DateTime<Utc>,
    ) -> Result<&GalleryItem, GalleryError> {
        if self.get(&item.id).is_some() {
            return Err(GalleryError::DuplicateId(item.id));
        }
        self.items.insert(0, item.stamp(created_at));
        self.persist();
        Ok(&self.items[0])
    }

    /// Removes the item with `id`, returning it. Absent ids are a no-op.
    pub fn remove(&mut self, id: &str) -> Option<GalleryItem> {
        let removed = self
            .items
            .iter()
            .position(|item| item.id == id)
            .map(|idx| self.items.remove(idx));
        self.persist();
        removed
    }

    /// Flips the favorite flag, returning the new value. Absent ids are a
    /// no-op.
    pub fn toggle_favorite(&mut self, id: &str) -> Option<bool> {
        let flipped = self.items.iter_mut().find(|item| item.id == id).map(|item| {
            item.is_favorite = !item.is_favorite;
            item.is_favorite
        });
        self.persist();
        flipped
    }

    fn persist(&mut self) {
        let snapshot = match serde_json::to_value(&self.items) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                tracing::warn!("failed to serialize gallery: {err}");
                return;
            }
        };
        if let Err(err) = self.store.write(GALLERY_STORAGE_KEY, snapshot) {
            tracing::warn!(
                items = self.items.len(),
                "failed to save gallery: {err:#}"
            );
        }
    }
}

fn read_collection<S: KeyValueStore>(store: &mut S) -> anyhow::Result<Vec<GalleryItem>> {
    let Some(raw) = store.read(GALLERY_STORAGE_KEY)? else {
        return Ok(Vec::new());
    };
    if raw.is_null() {
        return Ok(Vec::new());
    }
    let parsed: Vec<GalleryItem> =
        serde_json::from_value(raw).context("stored gallery is malformed")?;

    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(parsed.len());
    for item in parsed {
        if seen.insert(item.id.clone()) {
            items.push(item);
        } else {
            tracing::warn!(id = %item.id, "dropping duplicate gallery item");
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::store::{FileStore, MemoryStore};

    fn new_item(id: &str, prompt: &str) -> NewGalleryItem {
        NewGalleryItem {
            id: id.to_string(),
            base64: "AAAA".to_string(),
            prompt: prompt.to_string(),
            negative_prompt: String::new(),
            style: String::new(),
            aspect_ratio: "1:1".to_string(),
        }
    }

    #[test]
    fn add_stamps_and_prepends() -> anyhow::Result<()> {
        let mut gallery = GalleryManager::load(MemoryStore::new());
        let first_at = Utc::now();
        gallery.add_at(new_item("a", "first"), first_at)?;
        gallery.add_at(new_item("b", "second"), first_at + Duration::seconds(1))?;

        let ids: Vec<&str> = gallery.items().iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(!gallery.items()[0].is_favorite);
        assert_eq!(gallery.items()[1].created_at, first_at);
        Ok(())
    }

    #[test]
    fn every_mutation_rewrites_the_store() -> anyhow::Result<()> {
        let mut gallery = GalleryManager::load(MemoryStore::new());
        gallery.add(new_item("a", "castle"))?;
        gallery.toggle_favorite("a");
        gallery.remove("missing");
        assert_eq!(gallery.store().writes(), 3);
        assert_eq!(
            gallery.store().get(GALLERY_STORAGE_KEY),
            Some(&gallery.snapshot())
        );
        Ok(())
    }

    #[test]
    fn add_then_remove_restores_previous_content() -> anyhow::Result<()> {
        let mut gallery = GalleryManager::load(MemoryStore::new());
        gallery.add(new_item("a", "castle"))?;
        gallery.toggle_favorite("a");
        let before = gallery.items().to_vec();

        gallery.add(new_item("b", "dragon"))?;
        let removed = gallery.remove("b");

        assert_eq!(removed.map(|item| item.prompt), Some("dragon".to_string()));
        assert_eq!(gallery.items(), before.as_slice());
        Ok(())
    }

    #[test]
    fn duplicate_ids_are_rejected() -> anyhow::Result<()> {
        let mut gallery = GalleryManager::load(MemoryStore::new());
        gallery.add(new_item("a", "castle"))?;
        let err = gallery.add(new_item("a", "again")).err();
        assert_eq!(err, Some(GalleryError::DuplicateId("a".to_string())));
        assert_eq!(gallery.len(), 1);
        Ok(())
    }

    #[test]
    fn toggle_twice_restores_flag_and_missing_id_is_noop() -> anyhow::Result<()> {
        let mut gallery = GalleryManager::load(MemoryStore::new());
        gallery.add(new_item("a", "castle"))?;
        let before = gallery.items().to_vec();

        assert_eq!(gallery.toggle_favorite("a"), Some(true));
        assert_eq!(gallery.toggle_favorite("a"), Some(false));
        assert_eq!(gallery.items(), before.as_slice());

        assert_eq!(gallery.toggle_favorite("nope"), None);
        assert_eq!(gallery.items(), before.as_slice());
        Ok(())
    }

    #[test]
    fn unreadable_store_loads_empty() {
        let gallery = GalleryManager::load(MemoryStore::new().failing_reads());
        assert!(gallery.is_empty());

        let corrupt = MemoryStore::new().with_entry(GALLERY_STORAGE_KEY, json!({"not": "a list"}));
        assert!(GalleryManager::load(corrupt).is_empty());
    }

    #[test]
    fn write_failures_keep_in_memory_state() -> anyhow::Result<()> {
        let mut gallery = GalleryManager::load(MemoryStore::new().failing_writes());
        gallery.add(new_item("a", "castle"))?;
        assert_eq!(gallery.toggle_favorite("a"), Some(true));
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.store().writes(), 0);
        Ok(())
    }

    #[test]
    fn load_drops_duplicate_ids() {
        let store = MemoryStore::new().with_entry(
            GALLERY_STORAGE_KEY,
            json!([
                {"id": "a", "base64": "AA", "prompt": "one", "createdAt": "2026-01-01T00:00:00Z"},
                {"id": "a", "base64": "BB", "prompt": "two", "createdAt": "2026-01-02T00:00:00Z"},
            ]),
        );
        let gallery = GalleryManager::load(store);
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.get("a").map(|item| item.prompt.as_str()), Some("one"));
    }

    #[test]
    fn gallery_survives_reload_from_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("store.json");
        {
            let mut gallery = GalleryManager::load(FileStore::new(&path));
            gallery.add(new_item("a", "castle"))?;
            gallery.add(new_item("b", "dragon"))?;
            gallery.toggle_favorite("a");
        }

        let reloaded = GalleryManager::load(FileStore::new(&path));
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("a").map(|item| item.is_favorite), Some(true));
        assert_eq!(reloaded.items()[0].id, "b");
        Ok(())
    }
}
