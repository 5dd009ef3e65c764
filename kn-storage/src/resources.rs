//! Resource (attachment) persistence (§4.1 "Resource operations").

use kn_domain::codec;
use kn_domain::entities::{Resource, ResourceAttributes, ResourceBody};
use kn_domain::ids::{Guid, LocalId};
use sqlx::SqlitePool;

use crate::errors::{StorageError, StorageResult};

#[derive(Debug, sqlx::FromRow)]
struct ResourceRow {
    local_id: String,
    guid: Option<String>,
    update_sequence_number: Option<i64>,
    note_local_id: String,
    mime: String,
    width: Option<i64>,
    height: Option<i64>,
    data: Vec<u8>,
    data_size: i64,
    data_hash: Vec<u8>,
    recognition_data: Option<Vec<u8>>,
    recognition_size: Option<i64>,
    recognition_hash: Option<Vec<u8>>,
    alternate_data: Option<Vec<u8>>,
    alternate_size: Option<i64>,
    alternate_hash: Option<Vec<u8>>,
    attributes_blob: Option<Vec<u8>>,
}

fn parse_local_id(s: &str) -> StorageResult<LocalId> {
    s.parse().map_err(|_| StorageError::MalformedId(s.to_string()))
}

fn parse_guid(s: &str) -> StorageResult<Guid> {
    s.parse().map_err(|_| StorageError::MalformedId(s.to_string()))
}

impl ResourceRow {
    fn try_into_resource(self) -> StorageResult<Resource> {
        let recognition = self
            .recognition_data
            .map(|data| ResourceBody::new(data, self.recognition_hash.unwrap_or_default()))
            .map(|mut body| {
                body.size = self.recognition_size.unwrap_or(body.size as i64) as i32;
                body
            });
        let alternate_data = self
            .alternate_data
            .map(|data| ResourceBody::new(data, self.alternate_hash.unwrap_or_default()))
            .map(|mut body| {
                body.size = self.alternate_size.unwrap_or(body.size as i64) as i32;
                body
            });

        Ok(Resource {
            local_id: parse_local_id(&self.local_id)?,
            guid: self.guid.as_deref().map(parse_guid).transpose()?,
            update_sequence_number: self.update_sequence_number.map(|v| v as i32),
            note_local_id: parse_local_id(&self.note_local_id)?,
            mime: self.mime,
            width: self.width.map(|v| v as i16),
            height: self.height.map(|v| v as i16),
            data: ResourceBody {
                data: self.data,
                size: self.data_size as i32,
                hash: self.data_hash,
            },
            recognition,
            alternate_data,
            attributes: self
                .attributes_blob
                .as_deref()
                .map(codec::decode_resource_attributes)
                .transpose()?,
        })
    }
}

const SELECT_RESOURCE_COLUMNS: &str = r#"
    local_id, guid, update_sequence_number, note_local_id, mime, width, height,
    data, data_size, data_hash, recognition_data, recognition_size, recognition_hash,
    alternate_data, alternate_size, alternate_hash, attributes_blob
"#;

pub async fn insert(pool: &SqlitePool, resource: &Resource) -> StorageResult<()> {
    let blob = resource.attributes.as_ref().map(codec::encode_resource_attributes);
    sqlx::query(
        r#"
        INSERT INTO resources (
            local_id, guid, update_sequence_number, note_local_id, mime, width, height,
            data, data_size, data_hash, recognition_data, recognition_size, recognition_hash,
            alternate_data, alternate_size, alternate_hash, attributes_blob
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(resource.local_id.to_string())
    .bind(resource.guid.map(|g| g.to_string()))
    .bind(resource.update_sequence_number)
    .bind(resource.note_local_id.to_string())
    .bind(&resource.mime)
    .bind(resource.width)
    .bind(resource.height)
    .bind(&resource.data.data)
    .bind(resource.data.size)
    .bind(&resource.data.hash)
    .bind(resource.recognition.as_ref().map(|b| b.data.clone()))
    .bind(resource.recognition.as_ref().map(|b| b.size))
    .bind(resource.recognition.as_ref().map(|b| b.hash.clone()))
    .bind(resource.alternate_data.as_ref().map(|b| b.data.clone()))
    .bind(resource.alternate_data.as_ref().map(|b| b.size))
    .bind(resource.alternate_data.as_ref().map(|b| b.hash.clone()))
    .bind(blob)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update(pool: &SqlitePool, resource: &Resource) -> StorageResult<()> {
    let blob = resource.attributes.as_ref().map(codec::encode_resource_attributes);
    let result = sqlx::query(
        r#"
        UPDATE resources SET
            guid = ?, update_sequence_number = ?, note_local_id = ?, mime = ?, width = ?, height = ?,
            data = ?, data_size = ?, data_hash = ?, recognition_data = ?, recognition_size = ?,
            recognition_hash = ?, alternate_data = ?, alternate_size = ?, alternate_hash = ?,
            attributes_blob = ?
        WHERE local_id = ?
        "#,
    )
    .bind(resource.guid.map(|g| g.to_string()))
    .bind(resource.update_sequence_number)
    .bind(resource.note_local_id.to_string())
    .bind(&resource.mime)
    .bind(resource.width)
    .bind(resource.height)
    .bind(&resource.data.data)
    .bind(resource.data.size)
    .bind(&resource.data.hash)
    .bind(resource.recognition.as_ref().map(|b| b.data.clone()))
    .bind(resource.recognition.as_ref().map(|b| b.size))
    .bind(resource.recognition.as_ref().map(|b| b.hash.clone()))
    .bind(resource.alternate_data.as_ref().map(|b| b.data.clone()))
    .bind(resource.alternate_data.as_ref().map(|b| b.size))
    .bind(resource.alternate_data.as_ref().map(|b| b.hash.clone()))
    .bind(blob)
    .bind(resource.local_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(format!(
            "resource {} not found",
            resource.local_id
        )));
    }
    Ok(())
}

pub async fn find_by_local_id(pool: &SqlitePool, local_id: LocalId) -> StorageResult<Option<Resource>> {
    let row: Option<ResourceRow> = sqlx::query_as(&format!(
        "SELECT {SELECT_RESOURCE_COLUMNS} FROM resources WHERE local_id = ?"
    ))
    .bind(local_id.to_string())
    .fetch_optional(pool)
    .await?;
    row.map(ResourceRow::try_into_resource).transpose()
}

pub async fn find_by_guid(pool: &SqlitePool, guid: Guid) -> StorageResult<Option<Resource>> {
    let row: Option<ResourceRow> = sqlx::query_as(&format!(
        "SELECT {SELECT_RESOURCE_COLUMNS} FROM resources WHERE guid = ?"
    ))
    .bind(guid.to_string())
    .fetch_optional(pool)
    .await?;
    row.map(ResourceRow::try_into_resource).transpose()
}

pub async fn find_by_note(pool: &SqlitePool, note_local_id: LocalId) -> StorageResult<Vec<Resource>> {
    let rows: Vec<ResourceRow> = sqlx::query_as(&format!(
        "SELECT {SELECT_RESOURCE_COLUMNS} FROM resources WHERE note_local_id = ?"
    ))
    .bind(note_local_id.to_string())
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(ResourceRow::try_into_resource).collect()
}

pub async fn expunge(pool: &SqlitePool, local_id: LocalId) -> StorageResult<()> {
    let result = sqlx::query("DELETE FROM resources WHERE local_id = ?")
        .bind(local_id.to_string())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(format!("resource {local_id} not found")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::engine::LocalStorageEngine;
    use crate::notebooks;
    use crate::notes;
    use kn_domain::entities::{Note, Notebook};

    async fn engine_with_note() -> (LocalStorageEngine, LocalId) {
        let engine = LocalStorageEngine::connect(&StorageConfig::in_memory()).await.unwrap();
        let notebook = Notebook::new("Personal");
        notebooks::insert(engine.pool(), &notebook).await.unwrap();
        let note = Note::new(notebook.local_id, "t", "c");
        notes::insert(engine.pool(), &note).await.unwrap();
        (engine, note.local_id)
    }

    #[tokio::test]
    async fn insert_then_find_round_trips_with_attributes() {
        let (engine, note_id) = engine_with_note().await;
        let mut resource = Resource::new(note_id, "image/png", ResourceBody::new(b"bytes".to_vec(), b"hash".to_vec()));
        resource.attributes = Some(ResourceAttributes {
            file_name: Some("photo.png".into()),
            ..Default::default()
        });
        insert(engine.pool(), &resource).await.unwrap();

        let found = find_by_local_id(engine.pool(), resource.local_id).await.unwrap().unwrap();
        assert_eq!(found.mime, "image/png");
        assert_eq!(found.attributes.unwrap().file_name.as_deref(), Some("photo.png"));
    }

    #[tokio::test]
    async fn find_by_note_returns_all_attached_resources() {
        let (engine, note_id) = engine_with_note().await;
        insert(
            engine.pool(),
            &Resource::new(note_id, "image/png", ResourceBody::new(b"a".to_vec(), b"h1".to_vec())),
        )
        .await
        .unwrap();
        insert(
            engine.pool(),
            &Resource::new(note_id, "image/jpeg", ResourceBody::new(b"b".to_vec(), b"h2".to_vec())),
        )
        .await
        .unwrap();

        let resources = find_by_note(engine.pool(), note_id).await.unwrap();
        assert_eq!(resources.len(), 2);
    }

    #[tokio::test]
    async fn note_cascade_deletes_resources() {
        let (engine, note_id) = engine_with_note().await;
        insert(
            engine.pool(),
            &Resource::new(note_id, "image/png", ResourceBody::new(b"a".to_vec(), b"h1".to_vec())),
        )
        .await
        .unwrap();

        notes::expunge(engine.pool(), note_id).await.unwrap();
        let resources = find_by_note(engine.pool(), note_id).await.unwrap();
        assert!(resources.is_empty());
    }
}
