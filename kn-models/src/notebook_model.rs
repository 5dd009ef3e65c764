//! In-memory notebook tree: root → (stack | linked notebook root) → notebook.
//!
//! Grounded in `NotebookModel.h`'s column set and stack/linked-notebook
//! grouping, reworked onto `kn_models::arena::Arena` instead of a
//! `boost::multi_index_container` of raw-pointer tree nodes. Name and
//! stack lookups that the original served from `boost::bimap` indices are
//! served here by plain `HashMap`s kept in step with the arena by hand.

use std::collections::HashMap;

use kn_domain::entities::Notebook;
use kn_domain::filters::NoteFilter;
use kn_domain::ids::{Guid, LocalId};
use kn_domain::value_objects::{NotebookName, StackName};
use kn_domain::DomainError;
use kn_storage::facade::{CorrelationToken, Event, StorageFacade};

use crate::arena::{Arena, ModelItem, ROOT_ID};
use crate::errors::{ModelError, ModelResult};
use crate::support::EmitGuard;

/// Per-item lifecycle (§4.4): a freshly created notebook sits in
/// `NotInStorage` from the moment it enters the arena until its `Add`
/// request completes, so callers can tell a pending create apart from one
/// already durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageState {
    NotInStorage,
    InStorage,
}

fn name_key(name: &str, linked_notebook_guid: Option<Guid>) -> (String, Option<Guid>) {
    (name.to_uppercase(), linked_notebook_guid)
}

/// Columns a view would bind to, matching `NotebookModel::Columns`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotebookColumn {
    Name,
    Synchronizable,
    Dirty,
    Default,
    LastUsed,
    Published,
    FromLinkedNotebook,
    NumNotesPerNotebook,
}

impl NotebookColumn {
    pub fn column_name(&self) -> &'static str {
        match self {
            NotebookColumn::Name => "name",
            NotebookColumn::Synchronizable => "synchronizable",
            NotebookColumn::Dirty => "dirty",
            NotebookColumn::Default => "default",
            NotebookColumn::LastUsed => "last used",
            NotebookColumn::Published => "published",
            NotebookColumn::FromLinkedNotebook => "from linked notebook",
            NotebookColumn::NumNotesPerNotebook => "number of notes",
        }
    }
}

/// Create/update/rename permission flags, mirroring the subset of
/// `NotebookRestrictions` that `NotebookModel::canCreateNotes` et al.
/// surface to a view so it can grey out menu entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotebookFilters {
    pub require_can_create_notes: bool,
    pub require_can_update_notebook: bool,
    pub require_can_rename_notebook: bool,
}

pub struct NotebookModel {
    arena: Arena<Notebook>,
    by_name: HashMap<(String, Option<Guid>), LocalId>,
    stack_groups: HashMap<(String, Option<Guid>), LocalId>,
    linked_notebook_roots: HashMap<Guid, LocalId>,
    default_notebook: Option<LocalId>,
    storage_state: HashMap<LocalId, StorageState>,
    outstanding_add_requests: HashMap<LocalId, CorrelationToken>,
    note_counts: HashMap<LocalId, i32>,
    outstanding_count_requests: HashMap<LocalId, CorrelationToken>,
}

impl NotebookModel {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            by_name: HashMap::new(),
            stack_groups: HashMap::new(),
            linked_notebook_roots: HashMap::new(),
            default_notebook: None,
            storage_state: HashMap::new(),
            outstanding_add_requests: HashMap::new(),
            note_counts: HashMap::new(),
            outstanding_count_requests: HashMap::new(),
        }
    }

    fn linked_notebook_root(&mut self, guid: Guid) -> LocalId {
        if let Some(id) = self.linked_notebook_roots.get(&guid) {
            return *id;
        }
        let id = LocalId::new();
        self.arena
            .insert(
                id,
                ROOT_ID,
                ModelItem::LinkedNotebookRoot {
                    guid,
                    label: guid.to_string(),
                },
            )
            .expect("root always exists");
        self.linked_notebook_roots.insert(guid, id);
        id
    }

    fn stack_group(&mut self, stack: &str, linked_notebook_guid: Option<Guid>) -> LocalId {
        let key = name_key(stack, linked_notebook_guid);
        if let Some(id) = self.stack_groups.get(&key) {
            return *id;
        }
        let parent = match linked_notebook_guid {
            Some(guid) => self.linked_notebook_root(guid),
            None => ROOT_ID,
        };
        let id = LocalId::new();
        self.arena
            .insert(id, parent, ModelItem::Group { label: stack.to_string() })
            .expect("parent was just resolved");
        self.stack_groups.insert(key, id);
        id
    }

    /// Inserts a notebook under its stack (or linked notebook root, or the
    /// tree root directly), rejecting a name collision scoped the same way
    /// storage does (§3).
    pub fn add_notebook(&mut self, notebook: Notebook) -> ModelResult<LocalId> {
        NotebookName::new(&notebook.name).map_err(DomainError::from)?;
        let key = name_key(&notebook.name, notebook.linked_notebook_guid);
        if self.by_name.contains_key(&key) {
            return Err(ModelError::DuplicateName(notebook.name.clone()));
        }

        let parent = match (&notebook.stack, notebook.linked_notebook_guid) {
            (Some(stack), guid) if !stack.is_empty() => self.stack_group(stack, guid),
            (_, Some(guid)) => self.linked_notebook_root(guid),
            (_, None) => ROOT_ID,
        };

        let id = notebook.local_id;
        let is_default = notebook.is_default;
        self.arena.insert(id, parent, ModelItem::Entity(notebook))?;
        self.by_name.insert(key, id);
        self.storage_state.insert(id, StorageState::InStorage);
        if is_default {
            self.set_default(id)?;
        }
        Ok(id)
    }

    pub fn storage_state(&self, id: LocalId) -> Option<StorageState> {
        self.storage_state.get(&id).copied()
    }

    /// Validates and inserts a new notebook into the tree, then issues its
    /// `Add` request to storage, tracking the correlation token against
    /// this item so a racing `update` can tell it is still in flight
    /// (§4.4 "state machine per notebook item"). Rolls the provisional
    /// item back out of the tree if the storage call fails.
    pub async fn begin_create_notebook(
        &mut self,
        facade: &StorageFacade,
        name: impl Into<String>,
    ) -> ModelResult<LocalId> {
        let notebook = Notebook::new(name);
        let id = notebook.local_id;
        let key = name_key(&notebook.name, notebook.linked_notebook_guid);
        self.add_notebook(notebook.clone())?;
        self.storage_state.insert(id, StorageState::NotInStorage);

        let token = CorrelationToken::new();
        self.outstanding_add_requests.insert(id, token);

        match facade.create_notebook(notebook).await {
            Ok(_) => {
                self.storage_state.insert(id, StorageState::InStorage);
                self.outstanding_add_requests.remove(&id);
                Ok(id)
            }
            Err(err) => {
                let _ = self.arena.remove(id);
                self.by_name.remove(&key);
                self.storage_state.remove(&id);
                self.outstanding_add_requests.remove(&id);
                Err(ModelError::from(err))
            }
        }
    }

    /// False while an item's `Add` request is still outstanding — callers
    /// should queue or drop an `update` targeting it rather than racing
    /// storage (§4.4).
    pub fn is_update_allowed(&self, id: LocalId) -> bool {
        !matches!(self.storage_state.get(&id), Some(StorageState::NotInStorage))
    }

    pub fn note_count(&self, notebook_local_id: LocalId) -> i32 {
        self.note_counts.get(&notebook_local_id).copied().unwrap_or(-1)
    }

    pub fn note_added(&mut self, notebook_local_id: LocalId) {
        *self.note_counts.entry(notebook_local_id).or_insert(0) += 1;
    }

    pub fn note_removed(&mut self, notebook_local_id: LocalId) {
        let count = self.note_counts.entry(notebook_local_id).or_insert(0);
        *count = (*count - 1).max(0);
    }

    /// Issues (or, if one is already outstanding for this notebook, skips)
    /// a `GetNoteCount` request, populating `note_counts` on completion —
    /// the construction-time and post-move count refresh path (§4.4).
    pub async fn refresh_note_count(&mut self, facade: &StorageFacade, notebook_local_id: LocalId) -> ModelResult<()> {
        if self.outstanding_count_requests.contains_key(&notebook_local_id) {
            return Ok(());
        }
        let token = CorrelationToken::new();
        self.outstanding_count_requests.insert(notebook_local_id, token);

        let filter = NoteFilter::new().in_notebook(notebook_local_id);
        let result = facade.get_note_count(filter).await;
        if self.outstanding_count_requests.get(&notebook_local_id) == Some(&token) {
            self.outstanding_count_requests.remove(&notebook_local_id);
        }
        let count = result.map_err(ModelError::from)?;
        self.note_counts.insert(notebook_local_id, count as i32);
        Ok(())
    }

    /// Reacts to façade fan-out events this model cares about: a note
    /// moving notebooks shifts both endpoints' note counts by one (§4.4).
    pub fn apply_event(&mut self, event: &Event) {
        if let Event::NoteMovedToAnotherNotebook {
            previous_notebook_local_id,
            new_notebook_local_id,
            ..
        } = event
        {
            self.note_removed(*previous_notebook_local_id);
            self.note_added(*new_notebook_local_id);
        }
    }

    pub fn get(&self, id: LocalId) -> Option<&Notebook> {
        self.arena.get(id).and_then(ModelItem::as_entity)
    }

    pub fn find_by_name(&self, name: &str, linked_notebook_guid: Option<Guid>) -> Option<&Notebook> {
        let key = name_key(name, linked_notebook_guid);
        self.by_name.get(&key).and_then(|id| self.get(*id))
    }

    /// Validates a name, builds a notebook, and inserts it in one call —
    /// the synchronous half of `NotebookModel::createNotebook`: the caller
    /// still has to forward the resulting entity to storage separately.
    pub fn create_notebook(&mut self, name: impl Into<String>) -> ModelResult<LocalId> {
        self.add_notebook(Notebook::new(name))
    }

    /// Notebook names restricted to those whose `NotebookRestrictions`
    /// satisfy every flag requested in `filters` — read-only bookkeeping
    /// derived from data already in the model, used to grey out actions a
    /// view should not offer for a restricted notebook.
    pub fn notebook_names_filtered(&self, filters: NotebookFilters) -> Vec<&str> {
        self.arena
            .iter()
            .filter_map(|(_, item)| item.as_entity())
            .filter(|notebook| {
                let restrictions = notebook.restrictions.as_ref();
                let allows = |blocked: bool| !blocked;
                let can_create_notes = restrictions.map(|r| allows(r.no_create_notes)).unwrap_or(true);
                let can_update_notebook = restrictions.map(|r| allows(r.no_update_notebook)).unwrap_or(true);
                let can_rename_notebook = restrictions.map(|r| allows(r.no_rename_notebook)).unwrap_or(true);
                (!filters.require_can_create_notes || can_create_notes)
                    && (!filters.require_can_update_notebook || can_update_notebook)
                    && (!filters.require_can_rename_notebook || can_rename_notebook)
            })
            .map(|notebook| notebook.name.as_str())
            .collect()
    }

    pub fn list_stacks(&self) -> Vec<&str> {
        self.stack_groups
            .keys()
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn default_notebook(&self) -> Option<&Notebook> {
        self.default_notebook.and_then(|id| self.get(id))
    }

    /// Clears the previous default, if any, then marks `id` as the new
    /// one — at most one default notebook at a time (§4.4).
    pub fn set_default(&mut self, id: LocalId) -> ModelResult<()> {
        if self.arena.get(id).and_then(ModelItem::as_entity).is_none() {
            return Err(ModelError::ItemNotFound(id));
        }
        if let Some(previous) = self.default_notebook {
            if let Some(ModelItem::Entity(notebook)) = self.arena.get_mut(previous) {
                notebook.is_default = false;
            }
        }
        if let Some(ModelItem::Entity(notebook)) = self.arena.get_mut(id) {
            notebook.is_default = true;
        }
        self.default_notebook = Some(id);
        Ok(())
    }

    pub fn rename(&mut self, id: LocalId, new_name: String) -> ModelResult<()> {
        if !self.is_update_allowed(id) {
            return Err(ModelError::ItemNotYetInStorage(id));
        }
        NotebookName::new(&new_name).map_err(DomainError::from)?;
        let linked_notebook_guid = match self.arena.get(id) {
            Some(ModelItem::Entity(notebook)) => notebook.linked_notebook_guid,
            _ => return Err(ModelError::ItemNotFound(id)),
        };
        let new_key = name_key(&new_name, linked_notebook_guid);
        if self.by_name.get(&new_key).is_some_and(|existing| *existing != id) {
            return Err(ModelError::DuplicateName(new_name));
        }

        let old_name = if let Some(ModelItem::Entity(notebook)) = self.arena.get_mut(id) {
            let old_key = name_key(&notebook.name, linked_notebook_guid);
            notebook.name = new_name.clone();
            old_key
        } else {
            unreachable!("checked above");
        };
        self.by_name.remove(&old_name);
        self.by_name.insert(new_key, id);
        Ok(())
    }

    pub fn move_to_stack(&mut self, id: LocalId, stack: Option<String>) -> ModelResult<()> {
        if !self.is_update_allowed(id) {
            return Err(ModelError::ItemNotYetInStorage(id));
        }
        if let Some(name) = &stack {
            StackName::new(name).map_err(DomainError::from)?;
        }
        let linked_notebook_guid = match self.arena.get(id) {
            Some(ModelItem::Entity(notebook)) => notebook.linked_notebook_guid,
            _ => return Err(ModelError::ItemNotFound(id)),
        };
        let parent = match &stack {
            Some(name) if !name.is_empty() => self.stack_group(name, linked_notebook_guid),
            _ => match linked_notebook_guid {
                Some(guid) => self.linked_notebook_root(guid),
                None => ROOT_ID,
            },
        };
        self.arena.reparent(id, parent)?;
        if let Some(ModelItem::Entity(notebook)) = self.arena.get_mut(id) {
            notebook.stack = stack;
        }
        Ok(())
    }

    /// Renames a stack: every notebook under `old_name` is reparented to
    /// a (possibly newly synthesized) stack node named `new_name`, then the
    /// old stack node is dropped. Grounded in `NotebookModel`'s stack-rename
    /// contract (spec.md §4.4).
    pub fn rename_stack(&mut self, old_name: &str, new_name: String, linked_notebook_guid: Option<Guid>) -> ModelResult<()> {
        StackName::new(&new_name).map_err(DomainError::from)?;
        let old_key = name_key(old_name, linked_notebook_guid);
        let Some(&old_group_id) = self.stack_groups.get(&old_key) else {
            return Ok(());
        };
        if old_key == name_key(&new_name, linked_notebook_guid) {
            return Ok(());
        }

        let members: Vec<LocalId> = self.arena.children_of(old_group_id).to_vec();
        let new_group_id = self.stack_group(&new_name, linked_notebook_guid);
        for member in &members {
            self.arena.reparent(*member, new_group_id)?;
            if let Some(ModelItem::Entity(notebook)) = self.arena.get_mut(*member) {
                notebook.stack = Some(new_name.clone());
            }
        }

        self.arena.remove(old_group_id)?;
        self.stack_groups.remove(&old_key);
        Ok(())
    }

    pub fn set_favorited(&mut self, id: LocalId, favorited: bool) -> ModelResult<()> {
        match self.arena.get_mut(id) {
            Some(ModelItem::Entity(notebook)) => {
                notebook.is_favorited = favorited;
                Ok(())
            }
            _ => Err(ModelError::ItemNotFound(id)),
        }
    }

    /// Removes a notebook, logging the defer-emit pair a view layer would
    /// otherwise hook into (§9 design notes).
    pub fn remove_notebook(&mut self, id: LocalId) -> ModelResult<Notebook> {
        let guard = EmitGuard::new(
            || tracing::trace!(local_id = %id, "notebook removal starting"),
            || tracing::trace!(local_id = %id, "notebook removal complete"),
        );

        let linked_notebook_guid = match self.arena.get(id) {
            Some(ModelItem::Entity(notebook)) => notebook.linked_notebook_guid,
            _ => return Err(ModelError::ItemNotFound(id)),
        };
        let name = match self.arena.get(id) {
            Some(ModelItem::Entity(notebook)) => notebook.name.clone(),
            _ => unreachable!(),
        };

        let item = self.arena.remove(id)?;
        self.by_name.remove(&name_key(&name, linked_notebook_guid));
        if self.default_notebook == Some(id) {
            self.default_notebook = None;
        }
        self.storage_state.remove(&id);
        self.outstanding_add_requests.remove(&id);
        self.note_counts.remove(&id);
        self.outstanding_count_requests.remove(&id);

        let notebook = match item {
            ModelItem::Entity(notebook) => notebook,
            _ => unreachable!("arena guarantees insert/get symmetry"),
        };
        drop(guard);
        Ok(notebook)
    }

    pub fn len(&self) -> usize {
        self.arena.iter().filter(|(_, item)| item.as_entity().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NotebookModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kn_storage::StorageConfig;
    use uuid::Uuid;

    #[test]
    fn add_notebook_then_find_by_name() {
        let mut model = NotebookModel::new();
        let notebook = Notebook::new("Personal");
        model.add_notebook(notebook).unwrap();
        assert!(model.find_by_name("personal", None).is_some());
    }

    #[test]
    fn add_duplicate_name_is_rejected() {
        let mut model = NotebookModel::new();
        model.add_notebook(Notebook::new("Work")).unwrap();
        let err = model.add_notebook(Notebook::new("WORK")).unwrap_err();
        assert_eq!(err, ModelError::DuplicateName("WORK".to_string()));
    }

    #[test]
    fn same_name_allowed_across_different_linked_notebooks() {
        let mut model = NotebookModel::new();
        let mut a = Notebook::new("Shared");
        a.linked_notebook_guid = Some(Guid::from_uuid(Uuid::new_v4()));
        model.add_notebook(a).unwrap();

        let mut b = Notebook::new("Shared");
        b.linked_notebook_guid = Some(Guid::from_uuid(Uuid::new_v4()));
        assert!(model.add_notebook(b).is_ok());
    }

    #[test]
    fn move_to_stack_creates_group_and_reparents() {
        let mut model = NotebookModel::new();
        let notebook = Notebook::new("Personal");
        let id = model.add_notebook(notebook).unwrap();

        model.move_to_stack(id, Some("Life".to_string())).unwrap();
        assert_eq!(model.get(id).unwrap().stack.as_deref(), Some("Life"));
        assert_eq!(model.list_stacks(), vec!["LIFE"]);
    }

    #[test]
    fn set_default_clears_previous_default() {
        let mut model = NotebookModel::new();
        let a = model.add_notebook(Notebook::new("A")).unwrap();
        let b = model.add_notebook(Notebook::new("B")).unwrap();

        model.set_default(a).unwrap();
        assert!(model.get(a).unwrap().is_default);

        model.set_default(b).unwrap();
        assert!(!model.get(a).unwrap().is_default);
        assert!(model.get(b).unwrap().is_default);
        assert_eq!(model.default_notebook().unwrap().local_id, b);
    }

    #[test]
    fn rename_updates_name_index() {
        let mut model = NotebookModel::new();
        let id = model.add_notebook(Notebook::new("Old")).unwrap();
        model.rename(id, "New".to_string()).unwrap();
        assert!(model.find_by_name("Old", None).is_none());
        assert!(model.find_by_name("New", None).is_some());
    }

    #[test]
    fn notebook_names_filtered_excludes_restricted() {
        let mut model = NotebookModel::new();
        model.create_notebook("Open").unwrap();
        let mut restricted = Notebook::new("Locked");
        restricted.restrictions = Some(kn_domain::entities::NotebookRestrictions {
            no_create_notes: true,
            ..Default::default()
        });
        model.add_notebook(restricted).unwrap();

        let names = model.notebook_names_filtered(NotebookFilters {
            require_can_create_notes: true,
            ..Default::default()
        });
        assert_eq!(names, vec!["Open"]);
    }

    #[test]
    fn rename_stack_moves_all_members_and_drops_old_group() {
        let mut model = NotebookModel::new();
        let a = model.add_notebook(Notebook::new("A")).unwrap();
        let b = model.add_notebook(Notebook::new("B")).unwrap();
        model.move_to_stack(a, Some("Old".to_string())).unwrap();
        model.move_to_stack(b, Some("Old".to_string())).unwrap();

        model.rename_stack("Old", "New".to_string(), None).unwrap();

        assert_eq!(model.get(a).unwrap().stack.as_deref(), Some("New"));
        assert_eq!(model.get(b).unwrap().stack.as_deref(), Some("New"));
        assert_eq!(model.list_stacks(), vec!["NEW"]);
    }

    #[test]
    fn remove_notebook_frees_its_name() {
        let mut model = NotebookModel::new();
        let id = model.add_notebook(Notebook::new("Gone")).unwrap();
        model.remove_notebook(id).unwrap();
        assert!(model.find_by_name("Gone", None).is_none());
        assert!(model.add_notebook(Notebook::new("Gone")).is_ok());
    }

    #[test]
    fn add_notebook_marks_in_storage_immediately() {
        let mut model = NotebookModel::new();
        let id = model.add_notebook(Notebook::new("Personal")).unwrap();
        assert_eq!(model.storage_state(id), Some(StorageState::InStorage));
    }

    #[tokio::test]
    async fn begin_create_notebook_transitions_to_in_storage_on_success() {
        let facade = StorageFacade::connect(&StorageConfig::in_memory()).await.unwrap();
        let mut model = NotebookModel::new();

        let id = model.begin_create_notebook(&facade, "Personal").await.unwrap();
        assert_eq!(model.storage_state(id), Some(StorageState::InStorage));
        assert!(model.is_update_allowed(id));
        assert!(facade.find_notebook(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn begin_create_notebook_rolls_back_on_duplicate_name() {
        let facade = StorageFacade::connect(&StorageConfig::in_memory()).await.unwrap();
        let mut model = NotebookModel::new();

        model.add_notebook(Notebook::new("Personal")).unwrap();
        let err = model.begin_create_notebook(&facade, "Personal").await.unwrap_err();
        assert!(matches!(err, ModelError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn apply_event_adjusts_note_counts_on_move() {
        let mut model = NotebookModel::new();
        let from = model.add_notebook(Notebook::new("From")).unwrap();
        let to = model.add_notebook(Notebook::new("To")).unwrap();
        model.note_added(from);

        model.apply_event(&Event::NoteMovedToAnotherNotebook {
            note_local_id: LocalId::new(),
            previous_notebook_local_id: from,
            new_notebook_local_id: to,
        });

        assert_eq!(model.note_count(from), 0);
        assert_eq!(model.note_count(to), 1);
    }

    #[tokio::test]
    async fn refresh_note_count_populates_from_storage() {
        let facade = StorageFacade::connect(&StorageConfig::in_memory()).await.unwrap();
        let mut model = NotebookModel::new();
        let notebook = facade.create_notebook(Notebook::new("Personal")).await.unwrap();

        model.refresh_note_count(&facade, notebook.local_id).await.unwrap();
        assert_eq!(model.note_count(notebook.local_id), 0);
    }

    #[tokio::test]
    async fn refresh_note_count_skips_when_already_in_flight() {
        let facade = StorageFacade::connect(&StorageConfig::in_memory()).await.unwrap();
        let mut model = NotebookModel::new();
        let notebook = facade.create_notebook(Notebook::new("Personal")).await.unwrap();
        model.note_added(notebook.local_id);
        model.outstanding_count_requests.insert(notebook.local_id, CorrelationToken::new());

        model.refresh_note_count(&facade, notebook.local_id).await.unwrap();
        assert_eq!(model.note_count(notebook.local_id), 1);
    }
}
