pub mod arena;
pub mod config;
pub mod errors;
pub mod favorites_model;
pub mod notebook_model;
pub mod saved_search_model;
pub mod support;
pub mod tag_model;

pub use arena::{Arena, ModelItem, ROOT_ID};
pub use config::ModelConfig;
pub use errors::{ModelError, ModelResult};
pub use favorites_model::{FavoritedItemKey, FavoritedItemType, FavoritesModel, FavoritesModelItem};
pub use notebook_model::{NotebookColumn, NotebookFilters, NotebookModel};
pub use saved_search_model::{SavedSearchColumn, SavedSearchModel};
pub use tag_model::{TagColumn, TagModel};
