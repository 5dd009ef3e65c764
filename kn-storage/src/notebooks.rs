//! Notebook persistence (§4.1 "Notebook operations").

use chrono::{DateTime, Utc};
use kn_domain::entities::{Notebook, NotebookBusinessInfo, NotebookPublishing, NotebookRestrictions};
use kn_domain::filters::{ListOptions, NameSortColumn, SortDirection};
use kn_domain::ids::{Guid, LocalId};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::errors::{StorageError, StorageResult};
use crate::shared_notebooks;

#[derive(Debug, sqlx::FromRow)]
struct NotebookRow {
    local_id: String,
    guid: Option<String>,
    update_sequence_number: Option<i64>,
    name: String,
    created_at: String,
    updated_at: String,
    is_default: i64,
    is_last_used: i64,
    stack: Option<String>,
    publishing_json: Option<String>,
    business_info_json: Option<String>,
    restrictions_json: Option<String>,
    linked_notebook_guid: Option<String>,
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

impl NotebookRow {
    fn try_into_notebook(self) -> StorageResult<Notebook> {
        Ok(Notebook {
            local_id: parse_local_id(&self.local_id)?,
            guid: self.guid.as_deref().map(parse_guid).transpose()?,
            update_sequence_number: self.update_sequence_number.map(|v| v as i32),
            name: self.name,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            is_default: self.is_default != 0,
            is_last_used: self.is_last_used != 0,
            stack: self.stack,
            publishing: self
                .publishing_json
                .as_deref()
                .map(serde_json::from_str::<NotebookPublishing>)
                .transpose()?,
            business_info: self
                .business_info_json
                .as_deref()
                .map(serde_json::from_str::<NotebookBusinessInfo>)
                .transpose()?,
            restrictions: self
                .restrictions_json
                .as_deref()
                .map(serde_json::from_str::<NotebookRestrictions>)
                .transpose()?,
            shared_notebooks: Vec::new(),
            linked_notebook_guid: self.linked_notebook_guid.as_deref().map(parse_guid).transpose()?,
            is_dirty: self.is_dirty != 0,
            is_local: self.is_local != 0,
            is_favorited: self.is_favorited != 0,
        })
    }
}

/// Loads the shared-notebook rows for a just-converted `Notebook`. A
/// notebook with no guid yet has never been synced and so cannot carry
/// shared-notebook rows (the table's `notebook_guid` column is `NOT NULL`).
async fn hydrate_shared_notebooks(pool: &SqlitePool, mut notebook: Notebook) -> StorageResult<Notebook> {
    if let Some(guid) = notebook.guid {
        notebook.shared_notebooks = shared_notebooks::find_by_notebook_guid(pool, guid).await?;
    }
    Ok(notebook)
}

const SELECT_NOTEBOOK_COLUMNS: &str = r#"
    local_id, guid, update_sequence_number, name, created_at, updated_at,
    is_default, is_last_used, stack, publishing_json, business_info_json,
    restrictions_json, linked_notebook_guid, is_dirty, is_local, is_favorited
"#;

pub async fn insert(pool: &SqlitePool, notebook: &Notebook) -> StorageResult<()> {
    let name_upper = notebook.name.to_uppercase();
    sqlx::query(
        r#"
        INSERT INTO notebooks (
            local_id, guid, update_sequence_number, name, name_upper, created_at, updated_at,
            is_default, is_last_used, stack, publishing_json, business_info_json,
            restrictions_json, linked_notebook_guid, is_dirty, is_local, is_favorited
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(notebook.local_id.to_string())
    .bind(notebook.guid.map(|g| g.to_string()))
    .bind(notebook.update_sequence_number)
    .bind(&notebook.name)
    .bind(name_upper)
    .bind(notebook.created_at.to_rfc3339())
    .bind(notebook.updated_at.to_rfc3339())
    .bind(notebook.is_default)
    .bind(notebook.is_last_used)
    .bind(&notebook.stack)
    .bind(notebook.publishing.as_ref().map(serde_json::to_string).transpose()?)
    .bind(
        notebook
            .business_info
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
    )
    .bind(
        notebook
            .restrictions
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
    )
    .bind(notebook.linked_notebook_guid.map(|g| g.to_string()))
    .bind(notebook.is_dirty)
    .bind(notebook.is_local)
    .bind(notebook.is_favorited)
    .execute(pool)
    .await?;

    if let Some(guid) = notebook.guid {
        shared_notebooks::replace_for_notebook(pool, guid, &notebook.shared_notebooks).await?;
    }
    Ok(())
}

pub async fn update(pool: &SqlitePool, notebook: &Notebook) -> StorageResult<()> {
    let name_upper = notebook.name.to_uppercase();
    let result = sqlx::query(
        r#"
        UPDATE notebooks SET
            guid = ?, update_sequence_number = ?, name = ?, name_upper = ?, updated_at = ?,
            is_default = ?, is_last_used = ?, stack = ?, publishing_json = ?,
            business_info_json = ?, restrictions_json = ?, linked_notebook_guid = ?,
            is_dirty = ?, is_local = ?, is_favorited = ?
        WHERE local_id = ?
        "#,
    )
    .bind(notebook.guid.map(|g| g.to_string()))
    .bind(notebook.update_sequence_number)
    .bind(&notebook.name)
    .bind(name_upper)
    .bind(notebook.updated_at.to_rfc3339())
    .bind(notebook.is_default)
    .bind(notebook.is_last_used)
    .bind(&notebook.stack)
    .bind(notebook.publishing.as_ref().map(serde_json::to_string).transpose()?)
    .bind(
        notebook
            .business_info
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
    )
    .bind(
        notebook
            .restrictions
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
    )
    .bind(notebook.linked_notebook_guid.map(|g| g.to_string()))
    .bind(notebook.is_dirty)
    .bind(notebook.is_local)
    .bind(notebook.is_favorited)
    .bind(notebook.local_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(format!(
            "notebook {} not found",
            notebook.local_id
        )));
    }

    if let Some(guid) = notebook.guid {
        shared_notebooks::replace_for_notebook(pool, guid, &notebook.shared_notebooks).await?;
    }
    Ok(())
}

pub async fn find_by_local_id(pool: &SqlitePool, local_id: LocalId) -> StorageResult<Option<Notebook>> {
    let row: Option<NotebookRow> = sqlx::query_as(&format!(
        "SELECT {SELECT_NOTEBOOK_COLUMNS} FROM notebooks WHERE local_id = ?"
    ))
    .bind(local_id.to_string())
    .fetch_optional(pool)
    .await?;

    match row.map(NotebookRow::try_into_notebook).transpose()? {
        Some(notebook) => Ok(Some(hydrate_shared_notebooks(pool, notebook).await?)),
        None => Ok(None),
    }
}

pub async fn find_by_guid(pool: &SqlitePool, guid: Guid) -> StorageResult<Option<Notebook>> {
    let row: Option<NotebookRow> = sqlx::query_as(&format!(
        "SELECT {SELECT_NOTEBOOK_COLUMNS} FROM notebooks WHERE guid = ?"
    ))
    .bind(guid.to_string())
    .fetch_optional(pool)
    .await?;

    match row.map(NotebookRow::try_into_notebook).transpose()? {
        Some(notebook) => Ok(Some(hydrate_shared_notebooks(pool, notebook).await?)),
        None => Ok(None),
    }
}

/// Case-insensitive name lookup, optionally scoped to a linked notebook
/// (two notebooks of different owners may share a display name, §3).
pub async fn find_by_name(
    pool: &SqlitePool,
    name: &str,
    linked_notebook_guid: Option<Guid>,
) -> StorageResult<Option<Notebook>> {
    let name_upper = name.to_uppercase();
    let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {SELECT_NOTEBOOK_COLUMNS} FROM notebooks WHERE name_upper = "
    ));
    query_builder.push_bind(name_upper);
    match linked_notebook_guid {
        Some(guid) => {
            query_builder.push(" AND linked_notebook_guid = ").push_bind(guid.to_string());
        }
        None => {
            query_builder.push(" AND linked_notebook_guid IS NULL");
        }
    }

    let row: Option<NotebookRow> = query_builder.build_query_as().fetch_optional(pool).await?;
    match row.map(NotebookRow::try_into_notebook).transpose()? {
        Some(notebook) => Ok(Some(hydrate_shared_notebooks(pool, notebook).await?)),
        None => Ok(None),
    }
}

pub async fn find_default(pool: &SqlitePool) -> StorageResult<Option<Notebook>> {
    let row: Option<NotebookRow> = sqlx::query_as(&format!(
        "SELECT {SELECT_NOTEBOOK_COLUMNS} FROM notebooks WHERE is_default = 1 LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;
    match row.map(NotebookRow::try_into_notebook).transpose()? {
        Some(notebook) => Ok(Some(hydrate_shared_notebooks(pool, notebook).await?)),
        None => Ok(None),
    }
}

pub async fn list(
    pool: &SqlitePool,
    options: &ListOptions<NameSortColumn>,
) -> StorageResult<Vec<Notebook>> {
    let column = match options.sort_by {
        NameSortColumn::Name => "name_upper",
        NameSortColumn::CreatedAt => "created_at",
        NameSortColumn::UpdatedAt => "updated_at",
    };
    let direction = match options.direction {
        SortDirection::Ascending => "ASC",
        SortDirection::Descending => "DESC",
    };

    let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {SELECT_NOTEBOOK_COLUMNS} FROM notebooks ORDER BY {column} {direction}"
    ));
    if let Some(limit) = options.limit {
        query_builder.push(" LIMIT ").push_bind(limit as i64);
        query_builder.push(" OFFSET ").push_bind(options.offset as i64);
    }

    let rows: Vec<NotebookRow> = query_builder.build_query_as().fetch_all(pool).await?;
    let notebooks = rows
        .into_iter()
        .map(NotebookRow::try_into_notebook)
        .collect::<StorageResult<Vec<_>>>()?;
    let mut hydrated = Vec::with_capacity(notebooks.len());
    for notebook in notebooks {
        hydrated.push(hydrate_shared_notebooks(pool, notebook).await?);
    }
    Ok(hydrated)
}

pub async fn list_stacks(pool: &SqlitePool) -> StorageResult<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT stack FROM notebooks WHERE stack IS NOT NULL AND stack != '' ORDER BY stack",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(s,)| s).collect())
}

pub async fn count(pool: &SqlitePool) -> StorageResult<u32> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notebooks").fetch_one(pool).await?;
    Ok(count as u32)
}

/// Clears `is_default` on every other row before the caller sets it on one
/// (§4.4: "at most one default notebook").
pub async fn clear_default_flag(pool: &SqlitePool) -> StorageResult<()> {
    sqlx::query("UPDATE notebooks SET is_default = 0 WHERE is_default = 1")
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn expunge(pool: &SqlitePool, local_id: LocalId) -> StorageResult<()> {
    let result = sqlx::query("DELETE FROM notebooks WHERE local_id = ?")
        .bind(local_id.to_string())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(format!("notebook {local_id} not found")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LocalStorageEngine;
    use crate::config::StorageConfig;

    async fn engine() -> LocalStorageEngine {
        LocalStorageEngine::connect(&StorageConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn insert_then_find_by_local_id_round_trips() {
        let engine = engine().await;
        let notebook = Notebook::new("Personal");
        insert(engine.pool(), &notebook).await.unwrap();

        let found = find_by_local_id(engine.pool(), notebook.local_id).await.unwrap().unwrap();
        assert_eq!(found.name, "Personal");
        assert!(found.is_dirty);
    }

    #[tokio::test]
    async fn find_by_name_is_case_insensitive() {
        let engine = engine().await;
        let notebook = Notebook::new("Work");
        insert(engine.pool(), &notebook).await.unwrap();

        let found = find_by_name(engine.pool(), "WORK", None).await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let engine = engine().await;
        insert(engine.pool(), &Notebook::new("Work")).await.unwrap();
        let err = insert(engine.pool(), &Notebook::new("work")).await.unwrap_err();
        assert!(matches!(err, StorageError::Database(_)));
    }

    #[tokio::test]
    async fn clear_default_flag_unsets_only_default() {
        let engine = engine().await;
        let mut a = Notebook::new("A");
        a.is_default = true;
        insert(engine.pool(), &a).await.unwrap();

        clear_default_flag(engine.pool()).await.unwrap();
        let found = find_by_local_id(engine.pool(), a.local_id).await.unwrap().unwrap();
        assert!(!found.is_default);
    }

    #[tokio::test]
    async fn expunge_missing_notebook_is_not_found() {
        let engine = engine().await;
        let err = expunge(engine.pool(), LocalId::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::Domain(kn_domain::DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn find_hydrates_shared_notebooks_for_synced_notebook() {
        use kn_domain::entities::{PrivilegeLevel, SharedNotebook};
        use uuid::Uuid;

        let engine = engine().await;
        let mut notebook = Notebook::new("Team");
        notebook.guid = Some(Guid::from_uuid(Uuid::new_v4()));
        let now = chrono::Utc::now();
        notebook.shared_notebooks = vec![SharedNotebook {
            id: 0,
            user_id: None,
            notebook_guid: notebook.guid.unwrap(),
            email: Some("teammate@example.com".into()),
            created_at: now,
            updated_at: now,
            share_key: None,
            username: None,
            privilege: PrivilegeLevel::Normal,
            allow_preview: true,
            recipient_reminder_notify_email: false,
            recipient_reminder_notify_in_app: false,
        }];
        insert(engine.pool(), &notebook).await.unwrap();

        let found = find_by_local_id(engine.pool(), notebook.local_id).await.unwrap().unwrap();
        assert_eq!(found.shared_notebooks.len(), 1);
        assert_eq!(found.shared_notebooks[0].email.as_deref(), Some("teammate@example.com"));
    }
}
