//! Engine configuration.
//!
//! Unlike the HTTP-facing `notes-api::Config`, nothing here is loaded from
//! the environment: this crate has no process entry point of its own, so
//! callers build a `StorageConfig` directly.

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// sqlx connection URL, e.g. `sqlite://notes.db` or `sqlite::memory:`.
    pub database_url: String,
    pub max_connections: u32,
    pub notebook_cache_capacity: usize,
    pub tag_cache_capacity: usize,
    pub saved_search_cache_capacity: usize,
    pub linked_notebook_cache_capacity: usize,
}

impl StorageConfig {
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            ..Self::default()
        }
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self {
            database_url: format!("sqlite://{}", path.into()),
            ..Self::default()
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 5,
            notebook_cache_capacity: 64,
            tag_cache_capacity: 128,
            saved_search_cache_capacity: 32,
            linked_notebook_cache_capacity: 32,
        }
    }
}
