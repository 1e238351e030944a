pub mod chat;
pub mod events;
pub mod gallery;
pub mod generation;
pub mod presets;
pub mod store;
pub mod theme;
