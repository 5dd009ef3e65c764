//! Note persistence (§4.1 "Note operations", §4.3 editing contracts).

use chrono::{DateTime, Utc};
use kn_domain::codec;
use kn_domain::entities::{Note, NoteAttributes};
use kn_domain::filters::{DeletionScope, ListOptions, NoteFilter, NoteSortColumn, SortDirection};
use kn_domain::ids::{Guid, LocalId};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::errors::{StorageError, StorageResult};
use crate::resources;

#[derive(Debug, sqlx::FromRow)]
struct NoteRow {
    local_id: String,
    guid: Option<String>,
    update_sequence_number: Option<i64>,
    title: Option<String>,
    content: String,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
    active: i64,
    notebook_local_id: String,
    attributes_blob: Option<Vec<u8>>,
    thumbnail: Option<Vec<u8>>,
    is_dirty: i64,
    is_local: i64,
    is_favorited: i64,
    tags_json: String,
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

fn parse_tag_ids(tags_json: &str) -> StorageResult<Vec<LocalId>> {
    let values: Vec<Option<String>> = serde_json::from_str(tags_json)?;
    values
        .into_iter()
        .flatten()
        .map(|s| parse_local_id(&s))
        .collect()
}

impl NoteRow {
    fn try_into_note(self) -> StorageResult<Note> {
        let attributes = self
            .attributes_blob
            .as_deref()
            .map(codec::decode_note_attributes)
            .transpose()?;

        Ok(Note {
            local_id: parse_local_id(&self.local_id)?,
            guid: self.guid.as_deref().map(parse_guid).transpose()?,
            update_sequence_number: self.update_sequence_number.map(|v| v as i32),
            title: self.title,
            content: self.content,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            deleted_at: self.deleted_at.as_deref().map(parse_datetime).transpose()?,
            active: self.active != 0,
            notebook_local_id: parse_local_id(&self.notebook_local_id)?,
            tag_local_ids: parse_tag_ids(&self.tags_json)?,
            resources: Vec::new(),
            attributes,
            thumbnail: self.thumbnail,
            is_dirty: self.is_dirty != 0,
            is_local: self.is_local != 0,
            is_favorited: self.is_favorited != 0,
        })
    }
}

/// Loads the resources attached to a just-converted `Note` (§4.1's Find
/// contract: "populates the rest of the entity including sub-records").
async fn hydrate_resources(pool: &SqlitePool, mut note: Note) -> StorageResult<Note> {
    note.resources = resources::find_by_note(pool, note.local_id).await?;
    Ok(note)
}

/// Tags are ordered by `tag_index`, the assignment order set by `insert`/
/// `update`'s enumerated rewrite, via a correlated subquery rather than
/// `LEFT JOIN ... GROUP BY` so `json_group_array`'s row order is guaranteed
/// without depending on SQLite's "ORDER BY inside an aggregate" extension.
const SELECT_NOTE_WITH_TAGS: &str = r#"
    SELECT n.local_id, n.guid, n.update_sequence_number, n.title, n.content,
           n.created_at, n.updated_at, n.deleted_at, n.active, n.notebook_local_id,
           n.attributes_blob, n.thumbnail, n.is_dirty, n.is_local, n.is_favorited,
           (SELECT json_group_array(tag_local_id) FROM
               (SELECT tag_local_id FROM note_tags WHERE note_local_id = n.local_id ORDER BY tag_index)
           ) AS tags_json
    FROM notes n
"#;

pub async fn insert(pool: &SqlitePool, note: &Note) -> StorageResult<()> {
    let mut tx = pool.begin().await?;
    let blob = note.attributes.as_ref().map(codec::encode_note_attributes);
    let plain_text = note.plain_text();

    sqlx::query(
        r#"
        INSERT INTO notes (
            local_id, guid, update_sequence_number, title, content, content_plain_text,
            created_at, updated_at, deleted_at, active, notebook_local_id,
            attributes_blob, thumbnail, is_dirty, is_local, is_favorited
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(note.local_id.to_string())
    .bind(note.guid.map(|g| g.to_string()))
    .bind(note.update_sequence_number)
    .bind(&note.title)
    .bind(&note.content)
    .bind(plain_text)
    .bind(note.created_at.to_rfc3339())
    .bind(note.updated_at.to_rfc3339())
    .bind(note.deleted_at.map(|d| d.to_rfc3339()))
    .bind(note.active)
    .bind(note.notebook_local_id.to_string())
    .bind(blob)
    .bind(&note.thumbnail)
    .bind(note.is_dirty)
    .bind(note.is_local)
    .bind(note.is_favorited)
    .execute(&mut *tx)
    .await?;

    for (index, tag_id) in note.tag_local_ids.iter().enumerate() {
        sqlx::query("INSERT INTO note_tags (note_local_id, tag_local_id, tag_index) VALUES (?, ?, ?)")
            .bind(note.local_id.to_string())
            .bind(tag_id.to_string())
            .bind(index as i64)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn update(pool: &SqlitePool, note: &Note) -> StorageResult<()> {
    let mut tx = pool.begin().await?;
    let blob = note.attributes.as_ref().map(codec::encode_note_attributes);
    let plain_text = note.plain_text();

    let result = sqlx::query(
        r#"
        UPDATE notes SET
            guid = ?, update_sequence_number = ?, title = ?, content = ?, content_plain_text = ?,
            updated_at = ?, deleted_at = ?, active = ?, notebook_local_id = ?,
            attributes_blob = ?, thumbnail = ?, is_dirty = ?, is_local = ?, is_favorited = ?
        WHERE local_id = ?
        "#,
    )
    .bind(note.guid.map(|g| g.to_string()))
    .bind(note.update_sequence_number)
    .bind(&note.title)
    .bind(&note.content)
    .bind(plain_text)
    .bind(note.updated_at.to_rfc3339())
    .bind(note.deleted_at.map(|d| d.to_rfc3339()))
    .bind(note.active)
    .bind(note.notebook_local_id.to_string())
    .bind(blob)
    .bind(&note.thumbnail)
    .bind(note.is_dirty)
    .bind(note.is_local)
    .bind(note.is_favorited)
    .bind(note.local_id.to_string())
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(format!("note {} not found", note.local_id)));
    }

    sqlx::query("DELETE FROM note_tags WHERE note_local_id = ?")
        .bind(note.local_id.to_string())
        .execute(&mut *tx)
        .await?;
    for (index, tag_id) in note.tag_local_ids.iter().enumerate() {
        sqlx::query("INSERT INTO note_tags (note_local_id, tag_local_id, tag_index) VALUES (?, ?, ?)")
            .bind(note.local_id.to_string())
            .bind(tag_id.to_string())
            .bind(index as i64)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn find_by_local_id(pool: &SqlitePool, local_id: LocalId) -> StorageResult<Option<Note>> {
    let row: Option<NoteRow> = sqlx::query_as(&format!("{SELECT_NOTE_WITH_TAGS} WHERE n.local_id = ?"))
        .bind(local_id.to_string())
        .fetch_optional(pool)
        .await?;
    match row.map(NoteRow::try_into_note).transpose()? {
        Some(note) => Ok(Some(hydrate_resources(pool, note).await?)),
        None => Ok(None),
    }
}

pub async fn find_by_guid(pool: &SqlitePool, guid: Guid) -> StorageResult<Option<Note>> {
    let row: Option<NoteRow> = sqlx::query_as(&format!("{SELECT_NOTE_WITH_TAGS} WHERE n.guid = ?"))
        .bind(guid.to_string())
        .fetch_optional(pool)
        .await?;
    match row.map(NoteRow::try_into_note).transpose()? {
        Some(note) => Ok(Some(hydrate_resources(pool, note).await?)),
        None => Ok(None),
    }
}

fn push_deletion_scope(query_builder: &mut QueryBuilder<'_, Sqlite>, scope: DeletionScope) {
    match scope {
        DeletionScope::ActiveOnly => {
            query_builder.push(" AND n.deleted_at IS NULL");
        }
        DeletionScope::DeletedOnly => {
            query_builder.push(" AND n.deleted_at IS NOT NULL");
        }
        DeletionScope::All => {}
    }
}

fn push_note_filter(query_builder: &mut QueryBuilder<'_, Sqlite>, filter: &NoteFilter) {
    query_builder.push(" WHERE 1 = 1");
    if let Some(notebook_local_id) = filter.notebook_local_id {
        query_builder
            .push(" AND n.notebook_local_id = ")
            .push_bind(notebook_local_id.to_string());
    }
    if let Some(notebook_guid) = filter.notebook_guid {
        query_builder.push(" AND n.notebook_local_id IN (SELECT local_id FROM notebooks WHERE guid = ");
        query_builder.push_bind(notebook_guid.to_string());
        query_builder.push(")");
    }
    for tag_id in &filter.tag_local_ids {
        query_builder.push(" AND n.local_id IN (SELECT note_local_id FROM note_tags WHERE tag_local_id = ");
        query_builder.push_bind(tag_id.to_string());
        query_builder.push(")");
    }
    if let Some(scope) = filter.deletion_scope {
        push_deletion_scope(query_builder, scope);
    }
    if filter.favorited_only {
        query_builder.push(" AND n.is_favorited = 1");
    }
    if let Some(after) = filter.created_after {
        query_builder.push(" AND n.created_at >= ").push_bind(after.to_rfc3339());
    }
    if let Some(before) = filter.created_before {
        query_builder.push(" AND n.created_at <= ").push_bind(before.to_rfc3339());
    }
    if let Some(after) = filter.updated_after {
        query_builder.push(" AND n.updated_at >= ").push_bind(after.to_rfc3339());
    }
    if let Some(before) = filter.updated_before {
        query_builder.push(" AND n.updated_at <= ").push_bind(before.to_rfc3339());
    }
    if let Some(text) = &filter.content_search {
        query_builder.push(" AND n.content_plain_text LIKE ");
        query_builder.push_bind(format!("%{text}%"));
    }
    if let Some(text) = &filter.title_search {
        query_builder.push(" AND n.title LIKE ");
        query_builder.push_bind(format!("%{text}%"));
    }
}

pub async fn find(
    pool: &SqlitePool,
    filter: &NoteFilter,
    options: &ListOptions<NoteSortColumn>,
) -> StorageResult<Vec<Note>> {
    let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_NOTE_WITH_TAGS);
    push_note_filter(&mut query_builder, filter);

    let column = match options.sort_by {
        NoteSortColumn::CreatedAt => "n.created_at",
        NoteSortColumn::UpdatedAt => "n.updated_at",
        NoteSortColumn::Title => "n.title",
        NoteSortColumn::RelevanceScore => "n.updated_at",
    };
    let direction = match options.direction {
        SortDirection::Ascending => "ASC",
        SortDirection::Descending => "DESC",
    };
    query_builder.push(format!(" ORDER BY {column} {direction}"));

    if let Some(limit) = options.limit {
        query_builder.push(" LIMIT ").push_bind(limit as i64);
        query_builder.push(" OFFSET ").push_bind(options.offset as i64);
    }

    let rows: Vec<NoteRow> = query_builder.build_query_as().fetch_all(pool).await?;
    let notes = rows.into_iter().map(NoteRow::try_into_note).collect::<StorageResult<Vec<_>>>()?;
    let mut hydrated = Vec::with_capacity(notes.len());
    for note in notes {
        hydrated.push(hydrate_resources(pool, note).await?);
    }
    Ok(hydrated)
}

pub async fn count(pool: &SqlitePool, filter: &NoteFilter) -> StorageResult<u32> {
    let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM notes n");
    push_note_filter(&mut query_builder, filter);
    let (count,): (i64,) = query_builder.build_query_as().fetch_one(pool).await?;
    Ok(count as u32)
}

/// Soft-deletes a note (§4.3: deletion sets `deleted_at`/`active` rather
/// than removing the row; `expunge` does the latter).
pub async fn mark_deleted(pool: &SqlitePool, local_id: LocalId, at: DateTime<Utc>) -> StorageResult<()> {
    let result = sqlx::query("UPDATE notes SET deleted_at = ?, active = 0, is_dirty = 1 WHERE local_id = ?")
        .bind(at.to_rfc3339())
        .bind(local_id.to_string())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(format!("note {local_id} not found")));
    }
    Ok(())
}

pub async fn restore(pool: &SqlitePool, local_id: LocalId) -> StorageResult<()> {
    let result = sqlx::query("UPDATE notes SET deleted_at = NULL, active = 1, is_dirty = 1 WHERE local_id = ?")
        .bind(local_id.to_string())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(format!("note {local_id} not found")));
    }
    Ok(())
}

pub async fn expunge(pool: &SqlitePool, local_id: LocalId) -> StorageResult<()> {
    let result = sqlx::query("DELETE FROM notes WHERE local_id = ?")
        .bind(local_id.to_string())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(format!("note {local_id} not found")));
    }
    Ok(())
}

pub async fn list_tag_ids(pool: &SqlitePool, note_local_id: LocalId) -> StorageResult<Vec<LocalId>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT tag_local_id FROM note_tags WHERE note_local_id = ? ORDER BY tag_index")
            .bind(note_local_id.to_string())
            .fetch_all(pool)
            .await?;
    rows.into_iter().map(|(id,)| parse_local_id(&id)).collect()
}

/// Appends `tag_local_id` to a note's tag list (§4.2 `linkTagWithNote`),
/// returning the previous and new ordered tag-id lists so the caller can
/// raise `noteTagListChanged` with both. A no-op, returning the unchanged
/// list twice, if the tag is already linked.
pub async fn link_tag(
    pool: &SqlitePool,
    note_local_id: LocalId,
    tag_local_id: LocalId,
) -> StorageResult<(Vec<LocalId>, Vec<LocalId>)> {
    let mut tx = pool.begin().await?;
    let previous = {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT tag_local_id FROM note_tags WHERE note_local_id = ? ORDER BY tag_index")
                .bind(note_local_id.to_string())
                .fetch_all(&mut *tx)
                .await?;
        rows.into_iter().map(|(id,)| parse_local_id(&id)).collect::<StorageResult<Vec<_>>>()?
    };
    if previous.contains(&tag_local_id) {
        tx.commit().await?;
        return Ok((previous.clone(), previous));
    }

    let next_index = previous.len() as i64;
    sqlx::query("INSERT INTO note_tags (note_local_id, tag_local_id, tag_index) VALUES (?, ?, ?)")
        .bind(note_local_id.to_string())
        .bind(tag_local_id.to_string())
        .bind(next_index)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE notes SET is_dirty = 1 WHERE local_id = ?")
        .bind(note_local_id.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    let mut new_list = previous.clone();
    new_list.push(tag_local_id);
    Ok((previous, new_list))
}

/// Removes `tag_local_id` from a note's tag list (§4.2 `unlinkTagWithNote`),
/// re-packing the remaining rows' `tag_index` so it stays a dense
/// 0..n sequence. A no-op if the tag was never linked.
pub async fn unlink_tag(
    pool: &SqlitePool,
    note_local_id: LocalId,
    tag_local_id: LocalId,
) -> StorageResult<(Vec<LocalId>, Vec<LocalId>)> {
    let mut tx = pool.begin().await?;
    let previous = {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT tag_local_id FROM note_tags WHERE note_local_id = ? ORDER BY tag_index")
                .bind(note_local_id.to_string())
                .fetch_all(&mut *tx)
                .await?;
        rows.into_iter().map(|(id,)| parse_local_id(&id)).collect::<StorageResult<Vec<_>>>()?
    };
    if !previous.contains(&tag_local_id) {
        tx.commit().await?;
        return Ok((previous.clone(), previous));
    }

    sqlx::query("DELETE FROM note_tags WHERE note_local_id = ? AND tag_local_id = ?")
        .bind(note_local_id.to_string())
        .bind(tag_local_id.to_string())
        .execute(&mut *tx)
        .await?;

    let new_list: Vec<LocalId> = previous.iter().copied().filter(|id| *id != tag_local_id).collect();
    for (index, id) in new_list.iter().enumerate() {
        sqlx::query("UPDATE note_tags SET tag_index = ? WHERE note_local_id = ? AND tag_local_id = ?")
            .bind(index as i64)
            .bind(note_local_id.to_string())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("UPDATE notes SET is_dirty = 1 WHERE local_id = ?")
        .bind(note_local_id.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok((previous, new_list))
}

/// Moves a note to a different notebook, returning the previous notebook's
/// local id so callers can emit `noteMovedToAnotherNotebook` (§4.2).
pub async fn move_to_notebook(
    pool: &SqlitePool,
    local_id: LocalId,
    new_notebook_local_id: LocalId,
) -> StorageResult<LocalId> {
    let mut tx = pool.begin().await?;
    let row: Option<(String,)> = sqlx::query_as("SELECT notebook_local_id FROM notes WHERE local_id = ?")
        .bind(local_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;
    let Some((previous,)) = row else {
        return Err(StorageError::not_found(format!("note {local_id} not found")));
    };
    let previous_notebook = parse_local_id(&previous)?;

    sqlx::query("UPDATE notes SET notebook_local_id = ?, is_dirty = 1 WHERE local_id = ?")
        .bind(new_notebook_local_id.to_string())
        .bind(local_id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(previous_notebook)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::engine::LocalStorageEngine;
    use crate::notebooks;
    use crate::tags;

    async fn engine_with_notebook() -> (LocalStorageEngine, LocalId) {
        let engine = LocalStorageEngine::connect(&StorageConfig::in_memory()).await.unwrap();
        let notebook = kn_domain::entities::Notebook::new("Personal");
        notebooks::insert(engine.pool(), &notebook).await.unwrap();
        (engine, notebook.local_id)
    }

    #[tokio::test]
    async fn insert_then_find_round_trips_with_attributes() {
        let (engine, notebook_id) = engine_with_notebook().await;
        let mut note = Note::new(notebook_id, "Title", "<en-note>Body text</en-note>");
        note.attributes = Some(NoteAttributes {
            author: Some("me".into()),
            ..Default::default()
        });
        insert(engine.pool(), &note).await.unwrap();

        let found = find_by_local_id(engine.pool(), note.local_id).await.unwrap().unwrap();
        assert_eq!(found.title.as_deref(), Some("Title"));
        assert_eq!(found.attributes.unwrap().author.as_deref(), Some("me"));
    }

    #[tokio::test]
    async fn mark_deleted_then_restore_round_trips() {
        let (engine, notebook_id) = engine_with_notebook().await;
        let note = Note::new(notebook_id, "t", "c");
        insert(engine.pool(), &note).await.unwrap();

        mark_deleted(engine.pool(), note.local_id, Utc::now()).await.unwrap();
        let found = find_by_local_id(engine.pool(), note.local_id).await.unwrap().unwrap();
        assert!(found.is_deleted());
        assert!(!found.active);

        restore(engine.pool(), note.local_id).await.unwrap();
        let found = find_by_local_id(engine.pool(), note.local_id).await.unwrap().unwrap();
        assert!(!found.is_deleted());
    }

    #[tokio::test]
    async fn find_filters_by_notebook_and_tag() {
        let (engine, notebook_id) = engine_with_notebook().await;
        let tag = kn_domain::entities::Tag::new("work");
        tags::insert(engine.pool(), &tag).await.unwrap();

        let mut tagged = Note::new(notebook_id, "tagged", "c");
        tagged.tag_local_ids.push(tag.local_id);
        insert(engine.pool(), &tagged).await.unwrap();
        insert(engine.pool(), &Note::new(notebook_id, "untagged", "c")).await.unwrap();

        let filter = NoteFilter::new().with_tag(tag.local_id);
        let options = ListOptions::new(NoteSortColumn::CreatedAt);
        let results = find(engine.pool(), &filter, &options).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title.as_deref(), Some("tagged"));
    }

    #[tokio::test]
    async fn find_populates_attached_resources() {
        let (engine, notebook_id) = engine_with_notebook().await;
        let note = Note::new(notebook_id, "has attachment", "c");
        insert(engine.pool(), &note).await.unwrap();

        let resource = kn_domain::entities::Resource::new(
            note.local_id,
            "image/png",
            kn_domain::entities::ResourceBody::new(vec![1, 2, 3], vec![9, 9, 9]),
        );
        resources::insert(engine.pool(), &resource).await.unwrap();

        let found = find_by_local_id(engine.pool(), note.local_id).await.unwrap().unwrap();
        assert_eq!(found.resources.len(), 1);
        assert_eq!(found.resources[0].mime, "image/png");
    }

    #[tokio::test]
    async fn tags_are_returned_in_assignment_order() {
        let (engine, notebook_id) = engine_with_notebook().await;
        let first = kn_domain::entities::Tag::new("first");
        let second = kn_domain::entities::Tag::new("second");
        let third = kn_domain::entities::Tag::new("third");
        tags::insert(engine.pool(), &first).await.unwrap();
        tags::insert(engine.pool(), &second).await.unwrap();
        tags::insert(engine.pool(), &third).await.unwrap();

        let mut note = Note::new(notebook_id, "t", "c");
        note.tag_local_ids = vec![third.local_id, first.local_id, second.local_id];
        insert(engine.pool(), &note).await.unwrap();

        let found = find_by_local_id(engine.pool(), note.local_id).await.unwrap().unwrap();
        assert_eq!(found.tag_local_ids, vec![third.local_id, first.local_id, second.local_id]);
    }

    #[tokio::test]
    async fn link_tag_then_unlink_tag_round_trips() {
        let (engine, notebook_id) = engine_with_notebook().await;
        let tag_a = kn_domain::entities::Tag::new("a");
        let tag_b = kn_domain::entities::Tag::new("b");
        tags::insert(engine.pool(), &tag_a).await.unwrap();
        tags::insert(engine.pool(), &tag_b).await.unwrap();
        let note = Note::new(notebook_id, "t", "c");
        insert(engine.pool(), &note).await.unwrap();

        let (previous, new_list) = link_tag(engine.pool(), note.local_id, tag_a.local_id).await.unwrap();
        assert!(previous.is_empty());
        assert_eq!(new_list, vec![tag_a.local_id]);

        let (previous, new_list) = link_tag(engine.pool(), note.local_id, tag_b.local_id).await.unwrap();
        assert_eq!(previous, vec![tag_a.local_id]);
        assert_eq!(new_list, vec![tag_a.local_id, tag_b.local_id]);

        let (previous, new_list) = unlink_tag(engine.pool(), note.local_id, tag_a.local_id).await.unwrap();
        assert_eq!(previous, vec![tag_a.local_id, tag_b.local_id]);
        assert_eq!(new_list, vec![tag_b.local_id]);

        let found = find_by_local_id(engine.pool(), note.local_id).await.unwrap().unwrap();
        assert_eq!(found.tag_local_ids, vec![tag_b.local_id]);
    }

    #[tokio::test]
    async fn link_tag_is_idempotent() {
        let (engine, notebook_id) = engine_with_notebook().await;
        let tag = kn_domain::entities::Tag::new("a");
        tags::insert(engine.pool(), &tag).await.unwrap();
        let note = Note::new(notebook_id, "t", "c");
        insert(engine.pool(), &note).await.unwrap();

        link_tag(engine.pool(), note.local_id, tag.local_id).await.unwrap();
        let (previous, new_list) = link_tag(engine.pool(), note.local_id, tag.local_id).await.unwrap();
        assert_eq!(previous, new_list);
        assert_eq!(new_list, vec![tag.local_id]);
    }

    #[tokio::test]
    async fn move_to_notebook_returns_previous_notebook() {
        let (engine, notebook_id) = engine_with_notebook().await;
        let other = kn_domain::entities::Notebook::new("Other");
        notebooks::insert(engine.pool(), &other).await.unwrap();

        let note = Note::new(notebook_id, "t", "c");
        insert(engine.pool(), &note).await.unwrap();

        let previous = move_to_notebook(engine.pool(), note.local_id, other.local_id).await.unwrap();
        assert_eq!(previous, notebook_id);

        let found = find_by_local_id(engine.pool(), note.local_id).await.unwrap().unwrap();
        assert_eq!(found.notebook_local_id, other.local_id);
    }
}
