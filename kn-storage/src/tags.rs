//! Tag persistence (§4.1 "Tag operations").

use chrono::{DateTime, Utc};
use kn_domain::entities::Tag;
use kn_domain::filters::{ListOptions, NameSortColumn, SortDirection};
use kn_domain::ids::{Guid, LocalId};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::errors::{StorageError, StorageResult};

#[derive(Debug, sqlx::FromRow)]
struct TagRow {
    local_id: String,
    guid: Option<String>,
    update_sequence_number: Option<i64>,
    name: String,
    parent_local_id: Option<String>,
    linked_notebook_guid: Option<String>,
    deleted_at: Option<String>,
    active: i64,
    is_dirty: i64,
    is_local: i64,
    is_favorited: i64,
}

fn parse_local_id(s: &str) -> StorageResult<LocalId> {
    s.parse().map_err(|_| StorageError::MalformedId(s.to_string()))
}

fn parse_guid(s: &str) -> StorageResult<Guid> {
    s.parse().map_err(|_| StorageError::MalformedId(s.to_string()))
}

fn parse_datetime(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::MalformedId(format!("invalid timestamp {s}: {e}")))
}

impl TagRow {
    fn try_into_tag(self) -> StorageResult<Tag> {
        Ok(Tag {
            local_id: parse_local_id(&self.local_id)?,
            guid: self.guid.as_deref().map(parse_guid).transpose()?,
            update_sequence_number: self.update_sequence_number.map(|v| v as i32),
            name: self.name,
            parent_local_id: self.parent_local_id.as_deref().map(parse_local_id).transpose()?,
            linked_notebook_guid: self.linked_notebook_guid.as_deref().map(parse_guid).transpose()?,
            deleted_at: self.deleted_at.as_deref().map(parse_datetime).transpose()?,
            active: self.active != 0,
            is_dirty: self.is_dirty != 0,
            is_local: self.is_local != 0,
            is_favorited: self.is_favorited != 0,
        })
    }
}

const SELECT_TAG_COLUMNS: &str = r#"
    local_id, guid, update_sequence_number, name, parent_local_id,
    linked_notebook_guid, deleted_at, active, is_dirty, is_local, is_favorited
"#;

pub async fn insert(pool: &SqlitePool, tag: &Tag) -> StorageResult<()> {
    let name_upper = tag.name.to_uppercase();
    sqlx::query(
        r#"
        INSERT INTO tags (
            local_id, guid, update_sequence_number, name, name_upper,
            parent_local_id, linked_notebook_guid, deleted_at, active,
            is_dirty, is_local, is_favorited
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(tag.local_id.to_string())
    .bind(tag.guid.map(|g| g.to_string()))
    .bind(tag.update_sequence_number)
    .bind(&tag.name)
    .bind(name_upper)
    .bind(tag.parent_local_id.map(|id| id.to_string()))
    .bind(tag.linked_notebook_guid.map(|g| g.to_string()))
    .bind(tag.deleted_at.map(|d| d.to_rfc3339()))
    .bind(tag.active)
    .bind(tag.is_dirty)
    .bind(tag.is_local)
    .bind(tag.is_favorited)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update(pool: &SqlitePool, tag: &Tag) -> StorageResult<()> {
    let name_upper = tag.name.to_uppercase();
    let result = sqlx::query(
        r#"
        UPDATE tags SET
            guid = ?, update_sequence_number = ?, name = ?, name_upper = ?,
            parent_local_id = ?, linked_notebook_guid = ?, deleted_at = ?, active = ?,
            is_dirty = ?, is_local = ?, is_favorited = ?
        WHERE local_id = ?
        "#,
    )
    .bind(tag.guid.map(|g| g.to_string()))
    .bind(tag.update_sequence_number)
    .bind(&tag.name)
    .bind(name_upper)
    .bind(tag.parent_local_id.map(|id| id.to_string()))
    .bind(tag.linked_notebook_guid.map(|g| g.to_string()))
    .bind(tag.deleted_at.map(|d| d.to_rfc3339()))
    .bind(tag.active)
    .bind(tag.is_dirty)
    .bind(tag.is_local)
    .bind(tag.is_favorited)
    .bind(tag.local_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(format!("tag {} not found", tag.local_id)));
    }
    Ok(())
}

pub async fn find_by_local_id(pool: &SqlitePool, local_id: LocalId) -> StorageResult<Option<Tag>> {
    let row: Option<TagRow> = sqlx::query_as(&format!("SELECT {SELECT_TAG_COLUMNS} FROM tags WHERE local_id = ?"))
        .bind(local_id.to_string())
        .fetch_optional(pool)
        .await?;
    row.map(TagRow::try_into_tag).transpose()
}

pub async fn find_by_guid(pool: &SqlitePool, guid: Guid) -> StorageResult<Option<Tag>> {
    let row: Option<TagRow> = sqlx::query_as(&format!("SELECT {SELECT_TAG_COLUMNS} FROM tags WHERE guid = ?"))
        .bind(guid.to_string())
        .fetch_optional(pool)
        .await?;
    row.map(TagRow::try_into_tag).transpose()
}

pub async fn find_by_name(
    pool: &SqlitePool,
    name: &str,
    linked_notebook_guid: Option<Guid>,
) -> StorageResult<Option<Tag>> {
    let name_upper = name.to_uppercase();
    let mut query_builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {SELECT_TAG_COLUMNS} FROM tags WHERE name_upper = "));
    query_builder.push_bind(name_upper);
    match linked_notebook_guid {
        Some(guid) => {
            query_builder.push(" AND linked_notebook_guid = ").push_bind(guid.to_string());
        }
        None => {
            query_builder.push(" AND linked_notebook_guid IS NULL");
        }
    }
    let row: Option<TagRow> = query_builder.build_query_as().fetch_optional(pool).await?;
    row.map(TagRow::try_into_tag).transpose()
}

pub async fn list_children(pool: &SqlitePool, parent_local_id: Option<LocalId>) -> StorageResult<Vec<Tag>> {
    let mut query_builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {SELECT_TAG_COLUMNS} FROM tags WHERE "));
    match parent_local_id {
        Some(id) => {
            query_builder.push("parent_local_id = ").push_bind(id.to_string());
        }
        None => {
            query_builder.push("parent_local_id IS NULL");
        }
    }
    query_builder.push(" ORDER BY name_upper ASC");
    let rows: Vec<TagRow> = query_builder.build_query_as().fetch_all(pool).await?;
    rows.into_iter().map(TagRow::try_into_tag).collect()
}

pub async fn list(pool: &SqlitePool, options: &ListOptions<NameSortColumn>) -> StorageResult<Vec<Tag>> {
    let column = match options.sort_by {
        NameSortColumn::Name => "name_upper",
        NameSortColumn::CreatedAt | NameSortColumn::UpdatedAt => "name_upper",
    };
    let direction = match options.direction {
        SortDirection::Ascending => "ASC",
        SortDirection::Descending => "DESC",
    };
    let mut query_builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {SELECT_TAG_COLUMNS} FROM tags ORDER BY {column} {direction}"));
    if let Some(limit) = options.limit {
        query_builder.push(" LIMIT ").push_bind(limit as i64);
        query_builder.push(" OFFSET ").push_bind(options.offset as i64);
    }
    let rows: Vec<TagRow> = query_builder.build_query_as().fetch_all(pool).await?;
    rows.into_iter().map(TagRow::try_into_tag).collect()
}

pub async fn count(pool: &SqlitePool) -> StorageResult<u32> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tags").fetch_one(pool).await?;
    Ok(count as u32)
}

pub async fn note_count(pool: &SqlitePool, tag_local_id: LocalId) -> StorageResult<u32> {
    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM note_tags nt
        JOIN notes n ON n.local_id = nt.note_local_id
        WHERE nt.tag_local_id = ? AND n.deleted_at IS NULL
        "#,
    )
    .bind(tag_local_id.to_string())
    .fetch_one(pool)
    .await?;
    Ok(count as u32)
}

/// Walks the parent chain starting from `candidate_parent` looking for
/// `tag_local_id`. A match means assigning `candidate_parent` as the parent
/// of `tag_local_id` would close a cycle (§3 invariant: tag parent graph is
/// acyclic).
pub async fn would_create_cycle(
    pool: &SqlitePool,
    tag_local_id: LocalId,
    candidate_parent: LocalId,
) -> StorageResult<bool> {
    let mut current = Some(candidate_parent);
    while let Some(id) = current {
        if id == tag_local_id {
            return Ok(true);
        }
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT parent_local_id FROM tags WHERE local_id = ?")
                .bind(id.to_string())
                .fetch_optional(pool)
                .await?;
        current = match row {
            Some((Some(parent),)) => Some(parse_local_id(&parent)?),
            _ => None,
        };
    }
    Ok(false)
}

/// Soft-deletes a tag (§4.1: `Delete{Entity}` applies to notes, tags, and
/// users; deletion sets `deleted_at`/`active` rather than removing the row).
pub async fn mark_deleted(pool: &SqlitePool, local_id: LocalId, at: DateTime<Utc>) -> StorageResult<()> {
    let result = sqlx::query("UPDATE tags SET deleted_at = ?, active = 0, is_dirty = 1 WHERE local_id = ?")
        .bind(at.to_rfc3339())
        .bind(local_id.to_string())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(format!("tag {local_id} not found")));
    }
    Ok(())
}

pub async fn restore(pool: &SqlitePool, local_id: LocalId) -> StorageResult<()> {
    let result = sqlx::query("UPDATE tags SET deleted_at = NULL, active = 1, is_dirty = 1 WHERE local_id = ?")
        .bind(local_id.to_string())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(format!("tag {local_id} not found")));
    }
    Ok(())
}

pub async fn expunge(pool: &SqlitePool, local_id: LocalId) -> StorageResult<()> {
    let result = sqlx::query("DELETE FROM tags WHERE local_id = ?")
        .bind(local_id.to_string())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(format!("tag {local_id} not found")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::engine::LocalStorageEngine;

    async fn engine() -> LocalStorageEngine {
        LocalStorageEngine::connect(&StorageConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn insert_then_find_round_trips() {
        let engine = engine().await;
        let tag = Tag::new("todo");
        insert(engine.pool(), &tag).await.unwrap();
        let found = find_by_local_id(engine.pool(), tag.local_id).await.unwrap().unwrap();
        assert_eq!(found.name, "todo");
    }

    #[tokio::test]
    async fn would_create_cycle_detects_self_parent() {
        let engine = engine().await;
        let parent = Tag::new("parent");
        insert(engine.pool(), &parent).await.unwrap();
        let mut child = Tag::new("child");
        child.parent_local_id = Some(parent.local_id);
        insert(engine.pool(), &child).await.unwrap();

        let cycle = would_create_cycle(engine.pool(), parent.local_id, child.local_id).await.unwrap();
        assert!(cycle);
    }

    #[tokio::test]
    async fn would_create_cycle_false_for_unrelated_tags() {
        let engine = engine().await;
        let a = Tag::new("a");
        let b = Tag::new("b");
        insert(engine.pool(), &a).await.unwrap();
        insert(engine.pool(), &b).await.unwrap();

        let cycle = would_create_cycle(engine.pool(), a.local_id, b.local_id).await.unwrap();
        assert!(!cycle);
    }

    #[tokio::test]
    async fn list_children_filters_by_parent() {
        let engine = engine().await;
        let parent = Tag::new("parent");
        insert(engine.pool(), &parent).await.unwrap();
        let mut child = Tag::new("child");
        child.parent_local_id = Some(parent.local_id);
        insert(engine.pool(), &child).await.unwrap();
        insert(engine.pool(), &Tag::new("root-sibling")).await.unwrap();

        let children = list_children(engine.pool(), Some(parent.local_id)).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "child");

        let roots = list_children(engine.pool(), None).await.unwrap();
        assert_eq!(roots.len(), 2);
    }

    #[tokio::test]
    async fn mark_deleted_then_restore_round_trips() {
        let engine = engine().await;
        let tag = Tag::new("archive");
        insert(engine.pool(), &tag).await.unwrap();

        mark_deleted(engine.pool(), tag.local_id, Utc::now()).await.unwrap();
        let found = find_by_local_id(engine.pool(), tag.local_id).await.unwrap().unwrap();
        assert!(!found.active);
        assert!(found.is_deleted());

        restore(engine.pool(), tag.local_id).await.unwrap();
        let found = find_by_local_id(engine.pool(), tag.local_id).await.unwrap().unwrap();
        assert!(found.active);
        assert!(!found.is_deleted());
    }

    #[tokio::test]
    async fn mark_deleted_missing_tag_is_not_found() {
        let engine = engine().await;
        let err = mark_deleted(engine.pool(), LocalId::new(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, StorageError::Domain(kn_domain::DomainError::NotFound(_))));
    }
}
