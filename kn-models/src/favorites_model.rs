//! In-memory flat list of favorited items across notebooks, tags, notes,
//! and saved searches.
//!
//! Grounded in `FavoritesModelItem.h`'s `Type`/`localUid`/`displayName`/
//! `numNotesTargeted` tuple. The original model listened to all four
//! local storage signal streams and kept its own denormalized copy of
//! each favorited item's display data; this keeps the same shape but as
//! a plain keyed list rather than a `boost::multi_index_container`.

use std::collections::HashMap;

use kn_domain::entities::{Note, Notebook, SavedSearch, Tag};
use kn_domain::filters::{ListOptions, NameSortColumn, NoteFilter, NoteSortColumn};
use kn_domain::ids::LocalId;
use kn_storage::facade::{CorrelationToken, Event, FavoritableKind, StorageFacade};

use crate::config::ModelConfig;
use crate::errors::{ModelError, ModelResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FavoritedItemType {
    Notebook,
    Tag,
    Note,
    SavedSearch,
}

impl From<FavoritableKind> for FavoritedItemType {
    fn from(kind: FavoritableKind) -> Self {
        match kind {
            FavoritableKind::Notebook => FavoritedItemType::Notebook,
            FavoritableKind::Tag => FavoritedItemType::Tag,
            FavoritableKind::Note => FavoritedItemType::Note,
            FavoritableKind::SavedSearch => FavoritedItemType::SavedSearch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FavoritedItemKey {
    pub item_type: FavoritedItemType,
    pub local_id: LocalId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoritesModelItem {
    pub item_type: FavoritedItemType,
    pub local_id: LocalId,
    pub display_name: String,
    /// Notes targeted by this item: meaningful for notebooks and tags
    /// (`-1` until a count refresh lands), always `0` for notes and
    /// saved searches.
    pub num_notes_targeted: i32,
}

/// Tracks which of the four population streams (notebooks/tags/notes/
/// searches) has reached its end, so `is_fully_populated` can fire the
/// "all items listed" signal exactly once (§4.7).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PopulationProgress {
    notebooks: bool,
    tags: bool,
    notes: bool,
    searches: bool,
}

impl PopulationProgress {
    fn is_complete(&self) -> bool {
        self.notebooks && self.tags && self.notes && self.searches
    }
}

#[derive(Default)]
pub struct FavoritesModel {
    items: HashMap<FavoritedItemKey, FavoritesModelItem>,
    progress: PopulationProgress,
    outstanding_count_requests: HashMap<FavoritedItemKey, CorrelationToken>,
}

impl FavoritesModel {
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
            progress: PopulationProgress::default(),
            outstanding_count_requests: HashMap::new(),
        }
    }

    pub fn upsert(&mut self, item: FavoritesModelItem) {
        let key = FavoritedItemKey { item_type: item.item_type, local_id: item.local_id };
        self.items.insert(key, item);
    }

    pub fn remove(&mut self, item_type: FavoritedItemType, local_id: LocalId) -> ModelResult<FavoritesModelItem> {
        let key = FavoritedItemKey { item_type, local_id };
        self.outstanding_count_requests.remove(&key);
        self.items.remove(&key).ok_or(ModelError::ItemNotFound(local_id))
    }

    pub fn get(&self, item_type: FavoritedItemType, local_id: LocalId) -> Option<&FavoritesModelItem> {
        self.items.get(&FavoritedItemKey { item_type, local_id })
    }

    pub fn update_display_name(&mut self, item_type: FavoritedItemType, local_id: LocalId, display_name: String) -> ModelResult<()> {
        let key = FavoritedItemKey { item_type, local_id };
        let item = self.items.get_mut(&key).ok_or(ModelError::ItemNotFound(local_id))?;
        item.display_name = display_name;
        Ok(())
    }

    pub fn update_num_notes_targeted(&mut self, item_type: FavoritedItemType, local_id: LocalId, num_notes_targeted: i32) -> ModelResult<()> {
        let key = FavoritedItemKey { item_type, local_id };
        let item = self.items.get_mut(&key).ok_or(ModelError::ItemNotFound(local_id))?;
        item.num_notes_targeted = num_notes_targeted;
        Ok(())
    }

    pub fn list(&self) -> impl Iterator<Item = &FavoritesModelItem> {
        self.items.values()
    }

    pub fn list_by_type(&self, item_type: FavoritedItemType) -> impl Iterator<Item = &FavoritesModelItem> {
        self.items.values().filter(move |item| item.item_type == item_type)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether all four population streams have reached their end (§4.7's
    /// "all items listed" signal).
    pub fn is_fully_populated(&self) -> bool {
        self.progress.is_complete()
    }

    /// Pages through favorited notebooks, tags, notes, and saved searches
    /// to completion and seeds `items` from the result. Notebooks/tags
    /// have no server-side favorited filter, so every page is fetched and
    /// filtered locally; notes go through `NoteFilter::favorited` since
    /// the storage layer already supports that restriction.
    pub async fn populate(&mut self, facade: &StorageFacade, config: &ModelConfig) -> ModelResult<()> {
        let page_size = config.favorites_page_size.max(1) as u32;

        let notebooks = Self::fetch_favorited_notebooks(facade, page_size).await?;
        let tags = Self::fetch_favorited_tags(facade, page_size).await?;
        let notes = Self::fetch_favorited_notes(facade, page_size).await?;
        let searches = Self::fetch_favorited_searches(facade, page_size).await?;

        for notebook in notebooks {
            self.upsert(FavoritesModelItem {
                item_type: FavoritedItemType::Notebook,
                local_id: notebook.local_id,
                display_name: notebook.name,
                num_notes_targeted: -1,
            });
        }
        self.progress.notebooks = true;

        for tag in tags {
            self.upsert(FavoritesModelItem {
                item_type: FavoritedItemType::Tag,
                local_id: tag.local_id,
                display_name: tag.name,
                num_notes_targeted: -1,
            });
        }
        self.progress.tags = true;

        for note in notes {
            self.upsert(FavoritesModelItem {
                item_type: FavoritedItemType::Note,
                local_id: note.local_id,
                display_name: note.title.unwrap_or_default(),
                num_notes_targeted: 0,
            });
        }
        self.progress.notes = true;

        for search in searches {
            self.upsert(FavoritesModelItem {
                item_type: FavoritedItemType::SavedSearch,
                local_id: search.local_id,
                display_name: search.name,
                num_notes_targeted: 0,
            });
        }
        self.progress.searches = true;

        Ok(())
    }

    async fn fetch_favorited_notebooks(facade: &StorageFacade, page_size: u32) -> ModelResult<Vec<Notebook>> {
        let mut out = Vec::new();
        let mut offset = 0;
        loop {
            let options = ListOptions::new(NameSortColumn::Name).with_limit(page_size).with_offset(offset);
            let page = facade.list_notebooks(options).await.map_err(ModelError::from)?;
            let page_len = page.len() as u32;
            out.extend(page.into_iter().filter(|notebook| notebook.is_favorited));
            if page_len < page_size {
                break;
            }
            offset += page_size;
        }
        Ok(out)
    }

    async fn fetch_favorited_tags(facade: &StorageFacade, page_size: u32) -> ModelResult<Vec<Tag>> {
        let mut out = Vec::new();
        let mut offset = 0;
        loop {
            let options = ListOptions::new(NameSortColumn::Name).with_limit(page_size).with_offset(offset);
            let page = facade.list_tags(options).await.map_err(ModelError::from)?;
            let page_len = page.len() as u32;
            out.extend(page.into_iter().filter(|tag| tag.is_favorited));
            if page_len < page_size {
                break;
            }
            offset += page_size;
        }
        Ok(out)
    }

    async fn fetch_favorited_notes(facade: &StorageFacade, page_size: u32) -> ModelResult<Vec<Note>> {
        let mut out = Vec::new();
        let mut offset = 0;
        let filter = NoteFilter::new().favorited();
        loop {
            let options = ListOptions::new(NoteSortColumn::CreatedAt).with_limit(page_size).with_offset(offset);
            let page = facade.list_notes(filter.clone(), options).await.map_err(ModelError::from)?;
            let page_len = page.len() as u32;
            out.extend(page);
            if page_len < page_size {
                break;
            }
            offset += page_size;
        }
        Ok(out)
    }

    async fn fetch_favorited_searches(facade: &StorageFacade, page_size: u32) -> ModelResult<Vec<SavedSearch>> {
        let mut out = Vec::new();
        let mut offset = 0;
        loop {
            let options = ListOptions::new(NameSortColumn::Name).with_limit(page_size).with_offset(offset);
            let page = facade.list_saved_searches(options).await.map_err(ModelError::from)?;
            let page_len = page.len() as u32;
            out.extend(page.into_iter().filter(|search| search.is_favorited));
            if page_len < page_size {
                break;
            }
            offset += page_size;
        }
        Ok(out)
    }

    /// Reacts to a façade fan-out event: inserts/removes/updates the
    /// matching row for create/expunge, and for an update re-fetches the
    /// entity to learn whether it is still favorited (an update that
    /// clears the flag must drop the row; one that sets it must add it).
    pub async fn apply_event(&mut self, facade: &StorageFacade, event: &Event) -> ModelResult<()> {
        match event {
            Event::EntityCreated { kind, local_id } | Event::EntityUpdated { kind, local_id } => {
                self.refresh_entity(facade, *kind, *local_id).await?;
            }
            Event::EntityExpunged { kind, local_id } => {
                let _ = self.remove((*kind).into(), *local_id);
            }
            Event::NoteMovedToAnotherNotebook { previous_notebook_local_id, new_notebook_local_id, .. } => {
                self.refresh_note_count(facade, FavoritedItemType::Notebook, *previous_notebook_local_id).await?;
                self.refresh_note_count(facade, FavoritedItemType::Notebook, *new_notebook_local_id).await?;
            }
            Event::NoteTagListChanged { previous_tag_local_ids, new_tag_local_ids, .. } => {
                for tag_id in previous_tag_local_ids.iter().chain(new_tag_local_ids.iter()) {
                    self.refresh_note_count(facade, FavoritedItemType::Tag, *tag_id).await?;
                }
            }
            Event::ExpungeNotelessTagsFromLinkedNotebooksComplete { .. } => {}
        }
        Ok(())
    }

    async fn refresh_entity(&mut self, facade: &StorageFacade, kind: FavoritableKind, local_id: LocalId) -> ModelResult<()> {
        match kind {
            FavoritableKind::Notebook => {
                let notebook = facade.find_notebook(local_id).await.map_err(ModelError::from)?;
                match notebook {
                    Some(notebook) if notebook.is_favorited => self.upsert(FavoritesModelItem {
                        item_type: FavoritedItemType::Notebook,
                        local_id,
                        display_name: notebook.name,
                        num_notes_targeted: self.get(FavoritedItemType::Notebook, local_id).map(|item| item.num_notes_targeted).unwrap_or(-1),
                    }),
                    _ => {
                        let _ = self.remove(FavoritedItemType::Notebook, local_id);
                    }
                }
            }
            FavoritableKind::Tag => {
                let tag = facade.find_tag(local_id).await.map_err(ModelError::from)?;
                match tag {
                    Some(tag) if tag.is_favorited => self.upsert(FavoritesModelItem {
                        item_type: FavoritedItemType::Tag,
                        local_id,
                        display_name: tag.name,
                        num_notes_targeted: self.get(FavoritedItemType::Tag, local_id).map(|item| item.num_notes_targeted).unwrap_or(-1),
                    }),
                    _ => {
                        let _ = self.remove(FavoritedItemType::Tag, local_id);
                    }
                }
            }
            FavoritableKind::Note => {
                let note = facade.find_note(local_id).await.map_err(ModelError::from)?;
                match note {
                    Some(note) if note.is_favorited => self.upsert(FavoritesModelItem {
                        item_type: FavoritedItemType::Note,
                        local_id,
                        display_name: note.title.unwrap_or_default(),
                        num_notes_targeted: 0,
                    }),
                    _ => {
                        let _ = self.remove(FavoritedItemType::Note, local_id);
                    }
                }
            }
            FavoritableKind::SavedSearch => {
                let search = facade.find_saved_search(local_id).await.map_err(ModelError::from)?;
                match search {
                    Some(search) if search.is_favorited => self.upsert(FavoritesModelItem {
                        item_type: FavoritedItemType::SavedSearch,
                        local_id,
                        display_name: search.name,
                        num_notes_targeted: 0,
                    }),
                    _ => {
                        let _ = self.remove(FavoritedItemType::SavedSearch, local_id);
                    }
                }
            }
        }
        Ok(())
    }

    /// Refreshes a notebook's or tag's note count, deduplicating against
    /// an already-in-flight request the same way `NotebookModel::
    /// refresh_note_count` does (§4.3's cache-consultation spirit applied
    /// to in-flight requests).
    async fn refresh_note_count(&mut self, facade: &StorageFacade, item_type: FavoritedItemType, local_id: LocalId) -> ModelResult<()> {
        let key = FavoritedItemKey { item_type, local_id };
        if !self.items.contains_key(&key) || self.outstanding_count_requests.contains_key(&key) {
            return Ok(());
        }
        let token = CorrelationToken::new();
        self.outstanding_count_requests.insert(key.clone(), token);

        let filter = match item_type {
            FavoritedItemType::Notebook => NoteFilter::new().in_notebook(local_id),
            FavoritedItemType::Tag => NoteFilter::new().with_tag(local_id),
            _ => return Ok(()),
        };
        let result = facade.get_note_count(filter).await;
        if self.outstanding_count_requests.get(&key) == Some(&token) {
            self.outstanding_count_requests.remove(&key);
        }
        let count = result.map_err(ModelError::from)?;
        let _ = self.update_num_notes_targeted(item_type, local_id, count as i32);
        Ok(())
    }

    /// Unfavorites an item via read-modify-write through the entity cache
    /// (the façade's `find_*` consults its LRU cache before hitting SQL),
    /// clearing only the favorited flag and leaving every other field
    /// untouched (§4.7).
    pub async fn unfavorite(&mut self, facade: &StorageFacade, item_type: FavoritedItemType, local_id: LocalId) -> ModelResult<()> {
        match item_type {
            FavoritedItemType::Notebook => {
                let mut notebook = facade.find_notebook(local_id).await.map_err(ModelError::from)?.ok_or(ModelError::ItemNotFound(local_id))?;
                notebook.is_favorited = false;
                facade.update_notebook(notebook).await.map_err(ModelError::from)?;
            }
            FavoritedItemType::Tag => {
                let mut tag = facade.find_tag(local_id).await.map_err(ModelError::from)?.ok_or(ModelError::ItemNotFound(local_id))?;
                tag.is_favorited = false;
                facade.update_tag(tag).await.map_err(ModelError::from)?;
            }
            FavoritedItemType::Note => {
                let mut note = facade.find_note(local_id).await.map_err(ModelError::from)?.ok_or(ModelError::ItemNotFound(local_id))?;
                note.is_favorited = false;
                facade.update_note(note).await.map_err(ModelError::from)?;
            }
            FavoritedItemType::SavedSearch => {
                let mut search = facade.find_saved_search(local_id).await.map_err(ModelError::from)?.ok_or(ModelError::ItemNotFound(local_id))?;
                search.is_favorited = false;
                facade.update_saved_search(search).await.map_err(ModelError::from)?;
            }
        }
        let _ = self.remove(item_type, local_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kn_storage::StorageConfig;

    fn item(item_type: FavoritedItemType, name: &str) -> FavoritesModelItem {
        FavoritesModelItem {
            item_type,
            local_id: LocalId::new(),
            display_name: name.to_string(),
            num_notes_targeted: 0,
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let mut model = FavoritesModel::new();
        let entry = item(FavoritedItemType::Notebook, "Work");
        let id = entry.local_id;
        model.upsert(entry);
        assert_eq!(model.get(FavoritedItemType::Notebook, id).unwrap().display_name, "Work");
    }

    #[test]
    fn same_local_id_distinct_types_do_not_collide() {
        let mut model = FavoritesModel::new();
        let id = LocalId::new();
        model.upsert(FavoritesModelItem { item_type: FavoritedItemType::Notebook, local_id: id, display_name: "Notebook".into(), num_notes_targeted: 3 });
        model.upsert(FavoritesModelItem { item_type: FavoritedItemType::Tag, local_id: id, display_name: "Tag".into(), num_notes_targeted: 1 });
        assert_eq!(model.len(), 2);
        assert_eq!(model.get(FavoritedItemType::Notebook, id).unwrap().display_name, "Notebook");
        assert_eq!(model.get(FavoritedItemType::Tag, id).unwrap().display_name, "Tag");
    }

    #[test]
    fn remove_missing_item_errors() {
        let mut model = FavoritesModel::new();
        assert!(model.remove(FavoritedItemType::Note, LocalId::new()).is_err());
    }

    #[test]
    fn list_by_type_filters() {
        let mut model = FavoritesModel::new();
        model.upsert(item(FavoritedItemType::Notebook, "A"));
        model.upsert(item(FavoritedItemType::Tag, "B"));
        assert_eq!(model.list_by_type(FavoritedItemType::Notebook).count(), 1);
    }

    async fn connected_facade() -> StorageFacade {
        StorageFacade::connect(&StorageConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn populate_collects_only_favorited_entities_and_signals_completion() {
        let facade = connected_facade().await;

        let mut favorited_notebook = Notebook::new("Favorite Notebook");
        favorited_notebook.is_favorited = true;
        facade.create_notebook(favorited_notebook.clone()).await.unwrap();
        facade.create_notebook(Notebook::new("Plain Notebook")).await.unwrap();

        let mut favorited_tag = Tag::new("important");
        favorited_tag.is_favorited = true;
        facade.create_tag(favorited_tag.clone()).await.unwrap();

        let mut model = FavoritesModel::new();
        let config = ModelConfig::default();
        model.populate(&facade, &config).await.unwrap();

        assert!(model.is_fully_populated());
        assert_eq!(model.list_by_type(FavoritedItemType::Notebook).count(), 1);
        assert_eq!(model.get(FavoritedItemType::Notebook, favorited_notebook.local_id).unwrap().num_notes_targeted, -1);
        assert_eq!(model.list_by_type(FavoritedItemType::Tag).count(), 1);
        assert_eq!(model.get(FavoritedItemType::Tag, favorited_tag.local_id).unwrap().display_name, "important");
    }

    #[tokio::test]
    async fn apply_event_drops_row_when_update_clears_favorited_flag() {
        let facade = connected_facade().await;

        let mut notebook = Notebook::new("Notebook");
        notebook.is_favorited = true;
        facade.create_notebook(notebook.clone()).await.unwrap();

        let mut model = FavoritesModel::new();
        model.upsert(FavoritesModelItem {
            item_type: FavoritedItemType::Notebook,
            local_id: notebook.local_id,
            display_name: notebook.name.clone(),
            num_notes_targeted: -1,
        });

        notebook.is_favorited = false;
        facade.update_notebook(notebook.clone()).await.unwrap();
        model
            .apply_event(&facade, &Event::EntityUpdated { kind: FavoritableKind::Notebook, local_id: notebook.local_id })
            .await
            .unwrap();

        assert!(model.get(FavoritedItemType::Notebook, notebook.local_id).is_none());
    }

    #[tokio::test]
    async fn unfavorite_clears_flag_and_removes_row() {
        let facade = connected_facade().await;

        let mut notebook = Notebook::new("Notebook");
        notebook.is_favorited = true;
        facade.create_notebook(notebook.clone()).await.unwrap();

        let mut model = FavoritesModel::new();
        model.upsert(FavoritesModelItem {
            item_type: FavoritedItemType::Notebook,
            local_id: notebook.local_id,
            display_name: notebook.name.clone(),
            num_notes_targeted: -1,
        });

        model.unfavorite(&facade, FavoritedItemType::Notebook, notebook.local_id).await.unwrap();

        assert!(model.get(FavoritedItemType::Notebook, notebook.local_id).is_none());
        let stored = facade.find_notebook(notebook.local_id).await.unwrap().unwrap();
        assert!(!stored.is_favorited);
    }

    #[tokio::test]
    async fn refresh_note_count_skips_items_not_tracked() {
        let facade = connected_facade().await;
        let mut model = FavoritesModel::new();
        model.refresh_note_count(&facade, FavoritedItemType::Notebook, LocalId::new()).await.unwrap();
    }
}
