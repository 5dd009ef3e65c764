//! Linked notebook persistence (§4.1 "LinkedNotebook operations").

use kn_domain::entities::LinkedNotebook;
use kn_domain::ids::Guid;
use sqlx::SqlitePool;

use crate::errors::{StorageError, StorageResult};

#[derive(Debug, sqlx::FromRow)]
struct LinkedNotebookRow {
    guid: String,
    update_sequence_number: Option<i64>,
    share_name: Option<String>,
    username: Option<String>,
    shard_id: Option<String>,
    share_key: Option<String>,
    uri: Option<String>,
    note_store_url: Option<String>,
    web_api_url_prefix: Option<String>,
    stack: Option<String>,
    business_id: Option<i64>,
}

fn parse_guid(s: &str) -> StorageResult<Guid> {
    s.parse().map_err(|_| StorageError::MalformedId(s.to_string()))
}

impl LinkedNotebookRow {
    fn try_into_linked_notebook(self) -> StorageResult<LinkedNotebook> {
        Ok(LinkedNotebook {
            guid: parse_guid(&self.guid)?,
            update_sequence_number: self.update_sequence_number.map(|v| v as i32),
            share_name: self.share_name,
            username: self.username,
            shard_id: self.shard_id,
            share_key: self.share_key,
            uri: self.uri,
            note_store_url: self.note_store_url,
            web_api_url_prefix: self.web_api_url_prefix,
            stack: self.stack,
            business_id: self.business_id,
        })
    }
}

const SELECT_LINKED_NOTEBOOK_COLUMNS: &str = r#"
    guid, update_sequence_number, share_name, username, shard_id, share_key,
    uri, note_store_url, web_api_url_prefix, stack, business_id
"#;

pub async fn insert(pool: &SqlitePool, linked_notebook: &LinkedNotebook) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO linked_notebooks (
            guid, update_sequence_number, share_name, username, shard_id, share_key,
            uri, note_store_url, web_api_url_prefix, stack, business_id
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(linked_notebook.guid.to_string())
    .bind(linked_notebook.update_sequence_number)
    .bind(&linked_notebook.share_name)
    .bind(&linked_notebook.username)
    .bind(&linked_notebook.shard_id)
    .bind(&linked_notebook.share_key)
    .bind(&linked_notebook.uri)
    .bind(&linked_notebook.note_store_url)
    .bind(&linked_notebook.web_api_url_prefix)
    .bind(&linked_notebook.stack)
    .bind(linked_notebook.business_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update(pool: &SqlitePool, linked_notebook: &LinkedNotebook) -> StorageResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE linked_notebooks SET
            update_sequence_number = ?, share_name = ?, username = ?, shard_id = ?, share_key = ?,
            uri = ?, note_store_url = ?, web_api_url_prefix = ?, stack = ?, business_id = ?
        WHERE guid = ?
        "#,
    )
    .bind(linked_notebook.update_sequence_number)
    .bind(&linked_notebook.share_name)
    .bind(&linked_notebook.username)
    .bind(&linked_notebook.shard_id)
    .bind(&linked_notebook.share_key)
    .bind(&linked_notebook.uri)
    .bind(&linked_notebook.note_store_url)
    .bind(&linked_notebook.web_api_url_prefix)
    .bind(&linked_notebook.stack)
    .bind(linked_notebook.business_id)
    .bind(linked_notebook.guid.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(format!(
            "linked notebook {} not found",
            linked_notebook.guid
        )));
    }
    Ok(())
}

pub async fn find_by_guid(pool: &SqlitePool, guid: Guid) -> StorageResult<Option<LinkedNotebook>> {
    let row: Option<LinkedNotebookRow> = sqlx::query_as(&format!(
        "SELECT {SELECT_LINKED_NOTEBOOK_COLUMNS} FROM linked_notebooks WHERE guid = ?"
    ))
    .bind(guid.to_string())
    .fetch_optional(pool)
    .await?;
    row.map(LinkedNotebookRow::try_into_linked_notebook).transpose()
}

pub async fn list(pool: &SqlitePool) -> StorageResult<Vec<LinkedNotebook>> {
    let rows: Vec<LinkedNotebookRow> = sqlx::query_as(&format!(
        "SELECT {SELECT_LINKED_NOTEBOOK_COLUMNS} FROM linked_notebooks ORDER BY share_name ASC"
    ))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(LinkedNotebookRow::try_into_linked_notebook).collect()
}

pub async fn expunge(pool: &SqlitePool, guid: Guid) -> StorageResult<()> {
    let result = sqlx::query("DELETE FROM linked_notebooks WHERE guid = ?")
        .bind(guid.to_string())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(format!("linked notebook {guid} not found")));
    }
    Ok(())
}
