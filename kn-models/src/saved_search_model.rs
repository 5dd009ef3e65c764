//! In-memory flat list of saved searches.
//!
//! Grounded in `SavedSearchModel.h`, which is the simplest of the four
//! original models: no stacks, no linked-notebook grouping, no parent
//! chain — just a name-unique, case-insensitively sorted list. Reuses
//! `Arena<SavedSearch>` with every entity parented directly to the root
//! so the same `ModelItem`/iteration machinery applies uniformly.

use std::collections::HashMap;

use kn_domain::entities::SavedSearch;
use kn_domain::ids::LocalId;
use kn_domain::value_objects::SavedSearchName;
use kn_domain::DomainError;

use crate::arena::{Arena, ModelItem, ROOT_ID};
use crate::errors::{ModelError, ModelResult};

/// Columns a view would bind to, matching `SavedSearchModel::Columns`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavedSearchColumn {
    Name,
    Query,
    Synchronizable,
    Dirty,
}

impl SavedSearchColumn {
    pub fn column_name(&self) -> &'static str {
        match self {
            SavedSearchColumn::Name => "name",
            SavedSearchColumn::Query => "query",
            SavedSearchColumn::Synchronizable => "synchronizable",
            SavedSearchColumn::Dirty => "dirty",
        }
    }
}

pub struct SavedSearchModel {
    arena: Arena<SavedSearch>,
    by_name: HashMap<String, LocalId>,
}

impl SavedSearchModel {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn add_saved_search(&mut self, search: SavedSearch) -> ModelResult<LocalId> {
        SavedSearchName::new(&search.name).map_err(DomainError::from)?;
        let key = search.name.to_uppercase();
        if self.by_name.contains_key(&key) {
            return Err(ModelError::DuplicateName(search.name.clone()));
        }
        let id = search.local_id;
        self.arena.insert(id, ROOT_ID, ModelItem::Entity(search))?;
        self.by_name.insert(key, id);
        Ok(id)
    }

    pub fn get(&self, id: LocalId) -> Option<&SavedSearch> {
        self.arena.get(id).and_then(ModelItem::as_entity)
    }

    /// Validates a name, builds a saved search, and inserts it in one
    /// call, the synchronous half of `SavedSearchModel::createSavedSearch`.
    pub fn create_saved_search(&mut self, name: impl Into<String>, query: impl Into<String>) -> ModelResult<LocalId> {
        self.add_saved_search(SavedSearch::new(name, query))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&SavedSearch> {
        self.by_name.get(&name.to_uppercase()).and_then(|id| self.get(*id))
    }

    /// Case-insensitively sorted names, matching `SavedSearchModel::savedSearchNames`.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .arena
            .iter()
            .filter_map(|(_, item)| item.as_entity())
            .map(|search| search.name.as_str())
            .collect();
        names.sort_by_key(|name| name.to_uppercase());
        names
    }

    pub fn rename(&mut self, id: LocalId, new_name: String) -> ModelResult<()> {
        SavedSearchName::new(&new_name).map_err(DomainError::from)?;
        let new_key = new_name.to_uppercase();
        if self.by_name.get(&new_key).is_some_and(|existing| *existing != id) {
            return Err(ModelError::DuplicateName(new_name));
        }
        let old_key = if let Some(ModelItem::Entity(search)) = self.arena.get_mut(id) {
            let old_key = search.name.to_uppercase();
            search.name = new_name.clone();
            old_key
        } else {
            return Err(ModelError::ItemNotFound(id));
        };
        self.by_name.remove(&old_key);
        self.by_name.insert(new_key, id);
        Ok(())
    }

    pub fn remove_saved_search(&mut self, id: LocalId) -> ModelResult<SavedSearch> {
        let name = self.get(id).ok_or(ModelError::ItemNotFound(id))?.name.clone();
        let item = self.arena.remove(id)?;
        self.by_name.remove(&name.to_uppercase());
        match item {
            ModelItem::Entity(search) => Ok(search),
            _ => unreachable!("arena guarantees insert/get symmetry"),
        }
    }

    pub fn len(&self) -> usize {
        self.arena.iter().filter(|(_, item)| item.as_entity().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SavedSearchModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_find_by_name() {
        let mut model = SavedSearchModel::new();
        model.add_saved_search(SavedSearch::new("Inbox", "tag:inbox")).unwrap();
        assert!(model.find_by_name("inbox").is_some());
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut model = SavedSearchModel::new();
        model.add_saved_search(SavedSearch::new("Inbox", "tag:inbox")).unwrap();
        let err = model
            .add_saved_search(SavedSearch::new("INBOX", "tag:other"))
            .unwrap_err();
        assert_eq!(err, ModelError::DuplicateName("INBOX".to_string()));
    }

    #[test]
    fn names_are_sorted_case_insensitively() {
        let mut model = SavedSearchModel::new();
        model.add_saved_search(SavedSearch::new("zebra", "q")).unwrap();
        model.add_saved_search(SavedSearch::new("Apple", "q")).unwrap();
        assert_eq!(model.names(), vec!["Apple", "zebra"]);
    }

    #[test]
    fn remove_frees_name() {
        let mut model = SavedSearchModel::new();
        let id = model.add_saved_search(SavedSearch::new("Temp", "q")).unwrap();
        model.remove_saved_search(id).unwrap();
        assert!(model.find_by_name("Temp").is_none());
    }
}
