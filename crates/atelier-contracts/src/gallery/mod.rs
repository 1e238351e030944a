mod item;
mod manager;
mod view;

pub use item::{GalleryItem, NewGalleryItem};
pub use manager::{GalleryError, GalleryManager, GALLERY_STORAGE_KEY};
pub use view::{filter_gallery, GalleryFilter};
