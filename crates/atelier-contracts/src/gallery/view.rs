use super::item::GalleryItem;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GalleryFilter {
    /// Case-insensitive prompt substring; empty matches everything.
    pub search: String,
    pub favorites_only: bool,
}

impl GalleryFilter {
    pub fn new(search: impl Into<String>, favorites_only: bool) -> Self {
        Self {
            search: search.into(),
            favorites_only,
        }
    }

    pub fn matches(&self, item: &GalleryItem) -> bool {
        let needle = self.search.to_lowercase();
        let matches_search = item.prompt.to_lowercase().contains(&needle);
        let matches_favorite = !self.favorites_only || item.is_favorite;
        matches_search && matches_favorite
    }
}

/// Items passing `filter`, newest first. Items with equal timestamps keep
/// their collection order.
pub fn filter_gallery<'a>(items: &'a [GalleryItem], filter: &GalleryFilter) -> Vec<&'a GalleryItem> {
    let mut visible: Vec<&GalleryItem> = items.iter().filter(|item| filter.matches(item)).collect();
    visible.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    visible
}
