//! In-memory tag tree: root → (linked notebook root →) parent tag → child tag.
//!
//! Grounded in `TagModel.h`'s `promote`/`demote`/`moveToParent`/
//! `removeFromParent` operations, reworked onto `Arena<Tag>`. Unlike
//! notebooks, tags nest arbitrarily deep rather than one level into a
//! stack, so `parent_local_id` drives the arena edge directly instead of
//! going through an intermediate `Group` node — a `Group` node is only
//! synthesized for the "ungrouped tags of this linked notebook" bucket.

use std::collections::{HashMap, HashSet};

use kn_domain::entities::Tag;
use kn_domain::ids::{Guid, LocalId};
use kn_domain::value_objects::TagName;
use kn_domain::DomainError;
use kn_storage::facade::Event;

use crate::arena::{Arena, ModelItem, ROOT_ID};
use crate::errors::{ModelError, ModelResult};

fn name_key(name: &str, linked_notebook_guid: Option<Guid>) -> (String, Option<Guid>) {
    (name.to_uppercase(), linked_notebook_guid)
}

/// Columns a view would bind to, matching `TagModel::Columns`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagColumn {
    Name,
    Synchronizable,
    Dirty,
    FromLinkedNotebook,
    NumNotesPerTag,
}

impl TagColumn {
    pub fn column_name(&self) -> &'static str {
        match self {
            TagColumn::Name => "name",
            TagColumn::Synchronizable => "synchronizable",
            TagColumn::Dirty => "dirty",
            TagColumn::FromLinkedNotebook => "from linked notebook",
            TagColumn::NumNotesPerTag => "number of notes",
        }
    }
}

pub struct TagModel {
    arena: Arena<Tag>,
    by_name: HashMap<(String, Option<Guid>), LocalId>,
    linked_notebook_roots: HashMap<Guid, LocalId>,
    note_counts: HashMap<LocalId, i32>,
}

impl TagModel {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            by_name: HashMap::new(),
            linked_notebook_roots: HashMap::new(),
            note_counts: HashMap::new(),
        }
    }

    pub fn note_count(&self, tag_local_id: LocalId) -> i32 {
        self.note_counts.get(&tag_local_id).copied().unwrap_or(-1)
    }

    /// Seeds a tag's note count from the batch `tag-id -> count` map
    /// requested once on model construction (§4.5).
    pub fn seed_note_counts(&mut self, counts: HashMap<LocalId, i32>) {
        self.note_counts.extend(counts);
    }

    /// Reacts to `noteTagListChanged`: tags only in the previous list lose
    /// a note, tags only in the new list gain one (§4.5).
    pub fn apply_event(&mut self, event: &Event) {
        if let Event::NoteTagListChanged {
            previous_tag_local_ids,
            new_tag_local_ids,
            ..
        } = event
        {
            let previous: HashSet<_> = previous_tag_local_ids.iter().copied().collect();
            let new: HashSet<_> = new_tag_local_ids.iter().copied().collect();
            for removed in previous.difference(&new) {
                let count = self.note_counts.entry(*removed).or_insert(0);
                *count = (*count - 1).max(0);
            }
            for added in new.difference(&previous) {
                *self.note_counts.entry(*added).or_insert(0) += 1;
            }
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

    fn default_parent(&mut self, linked_notebook_guid: Option<Guid>) -> LocalId {
        match linked_notebook_guid {
            Some(guid) => self.linked_notebook_root(guid),
            None => ROOT_ID,
        }
    }

    pub fn add_tag(&mut self, tag: Tag) -> ModelResult<LocalId> {
        TagName::new(&tag.name).map_err(DomainError::from)?;
        let key = name_key(&tag.name, tag.linked_notebook_guid);
        if self.by_name.contains_key(&key) {
            return Err(ModelError::DuplicateName(tag.name.clone()));
        }

        let parent = match tag.parent_local_id {
            Some(parent_id) => parent_id,
            None => self.default_parent(tag.linked_notebook_guid),
        };

        let id = tag.local_id;
        self.arena.insert(id, parent, ModelItem::Entity(tag))?;
        self.by_name.insert(key, id);
        Ok(id)
    }

    pub fn get(&self, id: LocalId) -> Option<&Tag> {
        self.arena.get(id).and_then(ModelItem::as_entity)
    }

    /// Validates a name, builds a tag, and inserts it in one call, the
    /// synchronous half of `TagModel::createTag`.
    pub fn create_tag(&mut self, name: impl Into<String>) -> ModelResult<LocalId> {
        self.add_tag(Tag::new(name))
    }

    pub fn find_by_name(&self, name: &str, linked_notebook_guid: Option<Guid>) -> Option<&Tag> {
        let key = name_key(name, linked_notebook_guid);
        self.by_name.get(&key).and_then(|id| self.get(*id))
    }

    pub fn children_of(&self, id: LocalId) -> impl Iterator<Item = &Tag> {
        self.arena
            .children_of(id)
            .iter()
            .filter_map(move |child_id| self.get(*child_id))
    }

    /// Moves a tag under a new parent tag (by name), rejecting a cycle.
    /// Grounded in `TagModel::moveToParent`.
    pub fn move_to_parent(&mut self, id: LocalId, parent_name: &str) -> ModelResult<()> {
        let linked_notebook_guid = match self.get(id) {
            Some(tag) => tag.linked_notebook_guid,
            None => return Err(ModelError::ItemNotFound(id)),
        };
        let parent_id = self
            .find_by_name(parent_name, linked_notebook_guid)
            .map(|tag| tag.local_id)
            .ok_or_else(|| ModelError::ItemNotFound(id))?;

        self.arena.reparent(id, parent_id)?;
        if let Some(ModelItem::Entity(tag)) = self.arena.get_mut(id) {
            tag.parent_local_id = Some(parent_id);
        }
        Ok(())
    }

    /// Detaches a tag from its parent tag, leaving it directly under the
    /// tree root or its linked notebook root. Grounded in
    /// `TagModel::removeFromParent`.
    pub fn remove_from_parent(&mut self, id: LocalId) -> ModelResult<()> {
        let linked_notebook_guid = match self.get(id) {
            Some(tag) => tag.linked_notebook_guid,
            None => return Err(ModelError::ItemNotFound(id)),
        };
        let parent = self.default_parent(linked_notebook_guid);
        self.arena.reparent(id, parent)?;
        if let Some(ModelItem::Entity(tag)) = self.arena.get_mut(id) {
            tag.parent_local_id = None;
        }
        Ok(())
    }

    /// Moves a tag to its grandparent, collapsing one level of nesting.
    /// Grounded in `TagModel::promote`.
    pub fn promote(&mut self, id: LocalId) -> ModelResult<()> {
        let parent = self.arena.parent_of(id).ok_or(ModelError::ItemNotFound(id))?;
        let grandparent = self.arena.parent_of(parent).unwrap_or(ROOT_ID);
        self.arena.reparent(id, grandparent)?;
        let new_parent_local_id = if grandparent == ROOT_ID {
            None
        } else {
            match self.arena.get(grandparent) {
                Some(ModelItem::Entity(_)) => Some(grandparent),
                _ => None,
            }
        };
        if let Some(ModelItem::Entity(tag)) = self.arena.get_mut(id) {
            tag.parent_local_id = new_parent_local_id;
        }
        Ok(())
    }

    /// Moves a tag under its previous sibling within the current parent, if
    /// one exists. Grounded in `TagModel::demote`.
    pub fn demote(&mut self, id: LocalId) -> ModelResult<()> {
        let parent = self.arena.parent_of(id).ok_or(ModelError::ItemNotFound(id))?;
        let siblings = self.arena.children_of(parent);
        let index = siblings
            .iter()
            .position(|sibling| *sibling == id)
            .ok_or(ModelError::ItemNotFound(id))?;
        if index == 0 {
            return Ok(());
        }
        let previous_sibling = siblings[index - 1];
        self.arena.reparent(id, previous_sibling)?;
        if let Some(ModelItem::Entity(tag)) = self.arena.get_mut(id) {
            tag.parent_local_id = Some(previous_sibling);
        }
        Ok(())
    }

    pub fn rename(&mut self, id: LocalId, new_name: String) -> ModelResult<()> {
        TagName::new(&new_name).map_err(DomainError::from)?;
        let linked_notebook_guid = match self.get(id) {
            Some(tag) => tag.linked_notebook_guid,
            None => return Err(ModelError::ItemNotFound(id)),
        };
        let new_key = name_key(&new_name, linked_notebook_guid);
        if self.by_name.get(&new_key).is_some_and(|existing| *existing != id) {
            return Err(ModelError::DuplicateName(new_name));
        }

        let old_key = if let Some(ModelItem::Entity(tag)) = self.arena.get_mut(id) {
            let old_key = name_key(&tag.name, linked_notebook_guid);
            tag.name = new_name.clone();
            old_key
        } else {
            unreachable!("checked above");
        };
        self.by_name.remove(&old_key);
        self.by_name.insert(new_key, id);
        Ok(())
    }

    pub fn remove_tag(&mut self, id: LocalId) -> ModelResult<Tag> {
        let linked_notebook_guid = match self.get(id) {
            Some(tag) => tag.linked_notebook_guid,
            None => return Err(ModelError::ItemNotFound(id)),
        };
        let name = self.get(id).unwrap().name.clone();
        let item = self.arena.remove(id)?;
        self.by_name.remove(&name_key(&name, linked_notebook_guid));
        self.note_counts.remove(&id);
        match item {
            ModelItem::Entity(tag) => Ok(tag),
            _ => unreachable!("arena guarantees insert/get symmetry"),
        }
    }

    /// Drops every id in `cascaded_child_ids` plus `id` itself from the
    /// tree — the expunge-complete handler storage raises alongside an
    /// expunged tag's cascaded children (§4.5).
    pub fn apply_expunge_cascade(&mut self, id: LocalId, cascaded_child_ids: &[LocalId]) {
        for child_id in cascaded_child_ids {
            let _ = self.remove_tag(*child_id);
        }
        let _ = self.remove_tag(id);
    }

    pub fn len(&self) -> usize {
        self.arena.iter().filter(|(_, item)| item.as_entity().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TagModel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_tag_then_find_by_name() {
        let mut model = TagModel::new();
        model.add_tag(Tag::new("Work")).unwrap();
        assert!(model.find_by_name("work", None).is_some());
    }

    #[test]
    fn move_to_parent_nests_under_named_tag() {
        let mut model = TagModel::new();
        let parent_id = model.add_tag(Tag::new("Projects")).unwrap();
        let child_id = model.add_tag(Tag::new("Website")).unwrap();

        model.move_to_parent(child_id, "Projects").unwrap();
        assert_eq!(model.get(child_id).unwrap().parent_local_id, Some(parent_id));
        assert_eq!(model.children_of(parent_id).count(), 1);
    }

    #[test]
    fn remove_from_parent_detaches_to_root() {
        let mut model = TagModel::new();
        let parent_id = model.add_tag(Tag::new("Projects")).unwrap();
        let child_id = model.add_tag(Tag::new("Website")).unwrap();
        model.move_to_parent(child_id, "Projects").unwrap();

        model.remove_from_parent(child_id).unwrap();
        assert_eq!(model.get(child_id).unwrap().parent_local_id, None);
        assert_eq!(model.children_of(parent_id).count(), 0);
    }

    #[test]
    fn demote_nests_under_previous_sibling() {
        let mut model = TagModel::new();
        let first_id = model.add_tag(Tag::new("First")).unwrap();
        let second_id = model.add_tag(Tag::new("Second")).unwrap();

        model.demote(second_id).unwrap();
        assert_eq!(model.get(second_id).unwrap().parent_local_id, Some(first_id));
    }

    #[test]
    fn demote_is_noop_for_first_child() {
        let mut model = TagModel::new();
        let first_id = model.add_tag(Tag::new("Only")).unwrap();
        model.demote(first_id).unwrap();
        assert_eq!(model.get(first_id).unwrap().parent_local_id, None);
    }

    #[test]
    fn promote_moves_tag_to_grandparent() {
        let mut model = TagModel::new();
        let grandparent_id = model.add_tag(Tag::new("Areas")).unwrap();
        let parent_id = model.add_tag(Tag::new("Projects")).unwrap();
        model.move_to_parent(parent_id, "Areas").unwrap();
        let child_id = model.add_tag(Tag::new("Website")).unwrap();
        model.move_to_parent(child_id, "Projects").unwrap();

        model.promote(child_id).unwrap();
        assert_eq!(model.get(child_id).unwrap().parent_local_id, Some(grandparent_id));
    }

    #[test]
    fn remove_tag_frees_its_name() {
        let mut model = TagModel::new();
        let id = model.add_tag(Tag::new("Temp")).unwrap();
        model.remove_tag(id).unwrap();
        assert!(model.find_by_name("Temp", None).is_none());
    }

    #[test]
    fn apply_event_shifts_note_counts_on_tag_list_change() {
        let mut model = TagModel::new();
        let work = model.add_tag(Tag::new("Work")).unwrap();
        let home = model.add_tag(Tag::new("Home")).unwrap();
        model.seed_note_counts(HashMap::from([(work, 3)]));

        model.apply_event(&Event::NoteTagListChanged {
            note_local_id: LocalId::new(),
            previous_tag_local_ids: vec![work],
            new_tag_local_ids: vec![home],
        });

        assert_eq!(model.note_count(work), 2);
        assert_eq!(model.note_count(home), 1);
    }

    #[test]
    fn apply_expunge_cascade_removes_parent_and_children() {
        let mut model = TagModel::new();
        let parent = model.add_tag(Tag::new("Projects")).unwrap();
        let child = model.add_tag(Tag::new("Website")).unwrap();
        model.move_to_parent(child, "Projects").unwrap();

        model.apply_expunge_cascade(parent, &[child]);

        assert!(model.get(parent).is_none());
        assert!(model.get(child).is_none());
    }
}
