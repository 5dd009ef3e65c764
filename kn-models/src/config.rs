//! Model configuration: page sizes for the "load more" pattern the
//! original views use when a list grows past what should be materialized
//! at once (§4.6).

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub notebook_page_size: usize,
    pub tag_page_size: usize,
    pub saved_search_page_size: usize,
    pub favorites_page_size: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            notebook_page_size: 100,
            tag_page_size: 100,
            saved_search_page_size: 100,
            favorites_page_size: 100,
        }
    }
}
