//! Query shapes passed down to the storage engine (§4.1, §6).
//!
//! These are plain data, not builders with hidden side effects — the
//! storage engine translates them into SQL `WHERE`/`ORDER BY` clauses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{Guid, LocalId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteSortColumn {
    CreatedAt,
    UpdatedAt,
    Title,
    RelevanceScore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameSortColumn {
    Name,
    CreatedAt,
    UpdatedAt,
}

/// Listing window shared by every "list entities" operation: page size and
/// offset plus a single sort key/direction pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListOptions<C> {
    pub limit: Option<u32>,
    pub offset: u32,
    pub sort_by: C,
    pub direction: SortDirection,
}

impl<C> ListOptions<C> {
    pub fn new(sort_by: C) -> Self {
        Self {
            limit: None,
            offset: 0,
            sort_by,
            direction: SortDirection::Ascending,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_direction(mut self, direction: SortDirection) -> Self {
        self.direction = direction;
        self
    }
}

/// Whether a listing/count operation should include soft-deleted rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionScope {
    ActiveOnly,
    DeletedOnly,
    All,
}

impl Default for DeletionScope {
    fn default() -> Self {
        DeletionScope::ActiveOnly
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountOptions {
    pub deletion_scope: DeletionScope,
}

/// Filters accepted by `find_notes`/`count_notes` (§4.1). Every field is an
/// independent, conjunctively-combined restriction; `None`/empty means
/// "unconstrained".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteFilter {
    pub notebook_local_id: Option<LocalId>,
    pub notebook_guid: Option<Guid>,
    pub tag_local_ids: Vec<LocalId>,
    pub deletion_scope: Option<DeletionScope>,
    pub favorited_only: bool,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub updated_after: Option<DateTime<Utc>>,
    pub updated_before: Option<DateTime<Utc>>,
    pub content_search: Option<String>,
    pub title_search: Option<String>,
}

impl NoteFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_notebook(mut self, notebook_local_id: LocalId) -> Self {
        self.notebook_local_id = Some(notebook_local_id);
        self
    }

    pub fn with_tag(mut self, tag_local_id: LocalId) -> Self {
        self.tag_local_ids.push(tag_local_id);
        self
    }

    pub fn favorited(mut self) -> Self {
        self.favorited_only = true;
        self
    }

    pub fn is_unconstrained(&self) -> bool {
        self.notebook_local_id.is_none()
            && self.notebook_guid.is_none()
            && self.tag_local_ids.is_empty()
            && self.deletion_scope.is_none()
            && !self.favorited_only
            && self.created_after.is_none()
            && self.created_before.is_none()
            && self.updated_after.is_none()
            && self.updated_before.is_none()
            && self.content_search.is_none()
            && self.title_search.is_none()
    }
}
