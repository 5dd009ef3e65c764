//! Shared-notebook persistence (§3 "zero or more shared-notebook records").
//!
//! A `shared_notebooks` row always belongs to exactly one notebook (by
//! guid) and is loaded/written alongside it, mirroring the tags-on-note
//! join pattern in `notes.rs` rather than living behind its own façade
//! operation.

use chrono::{DateTime, Utc};
use kn_domain::entities::{PrivilegeLevel, SharedNotebook};
use kn_domain::ids::{Guid, UserId};
use sqlx::SqlitePool;

use crate::errors::{StorageError, StorageResult};

#[derive(Debug, sqlx::FromRow)]
struct SharedNotebookRow {
    id: i64,
    user_id: Option<i64>,
    notebook_guid: String,
    email: Option<String>,
    created_at: String,
    updated_at: String,
    share_key: Option<String>,
    username: Option<String>,
    privilege: String,
    allow_preview: i64,
    recipient_reminder_notify_email: i64,
    recipient_reminder_notify_in_app: i64,
}

fn parse_guid(s: &str) -> StorageResult<Guid> {
    s.parse().map_err(|_| StorageError::MalformedId(s.to_string()))
}

fn parse_datetime(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::MalformedId(format!("invalid timestamp {s}: {e}")))
}

fn privilege_to_str(privilege: PrivilegeLevel) -> &'static str {
    match privilege {
        PrivilegeLevel::Normal => "normal",
        PrivilegeLevel::Premium => "premium",
        PrivilegeLevel::Vip => "vip",
        PrivilegeLevel::Manager => "manager",
        PrivilegeLevel::Support => "support",
        PrivilegeLevel::Admin => "admin",
    }
}

fn privilege_from_str(s: &str) -> StorageResult<PrivilegeLevel> {
    match s {
        "normal" => Ok(PrivilegeLevel::Normal),
        "premium" => Ok(PrivilegeLevel::Premium),
        "vip" => Ok(PrivilegeLevel::Vip),
        "manager" => Ok(PrivilegeLevel::Manager),
        "support" => Ok(PrivilegeLevel::Support),
        "admin" => Ok(PrivilegeLevel::Admin),
        other => Err(StorageError::MalformedId(format!("unknown privilege level {other}"))),
    }
}

impl SharedNotebookRow {
    fn try_into_shared_notebook(self) -> StorageResult<SharedNotebook> {
        Ok(SharedNotebook {
            id: self.id,
            user_id: self.user_id.map(UserId),
            notebook_guid: parse_guid(&self.notebook_guid)?,
            email: self.email,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            share_key: self.share_key,
            username: self.username,
            privilege: privilege_from_str(&self.privilege)?,
            allow_preview: self.allow_preview != 0,
            recipient_reminder_notify_email: self.recipient_reminder_notify_email != 0,
            recipient_reminder_notify_in_app: self.recipient_reminder_notify_in_app != 0,
        })
    }
}

const SELECT_SHARED_NOTEBOOK_COLUMNS: &str = r#"
    id, user_id, notebook_guid, email, created_at, updated_at, share_key, username,
    privilege, allow_preview, recipient_reminder_notify_email, recipient_reminder_notify_in_app
"#;

/// Inserts one shared-notebook row, ignoring `shared.id` (autoincrement).
pub async fn insert(pool: &SqlitePool, shared: &SharedNotebook) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO shared_notebooks (
            user_id, notebook_guid, email, created_at, updated_at, share_key, username,
            privilege, allow_preview, recipient_reminder_notify_email, recipient_reminder_notify_in_app
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(shared.user_id.map(|id| id.0))
    .bind(shared.notebook_guid.to_string())
    .bind(&shared.email)
    .bind(shared.created_at.to_rfc3339())
    .bind(shared.updated_at.to_rfc3339())
    .bind(&shared.share_key)
    .bind(&shared.username)
    .bind(privilege_to_str(shared.privilege))
    .bind(shared.allow_preview)
    .bind(shared.recipient_reminder_notify_email)
    .bind(shared.recipient_reminder_notify_in_app)
    .execute(pool)
    .await?;
    Ok(())
}

/// Replaces every shared-notebook row attached to `notebook_guid` with
/// `shared` (the whole-collection rewrite `notebooks::insert`/`update` use,
/// mirroring `notes.rs`'s note-tags rewrite).
pub async fn replace_for_notebook(
    pool: &SqlitePool,
    notebook_guid: Guid,
    shared: &[SharedNotebook],
) -> StorageResult<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM shared_notebooks WHERE notebook_guid = ?")
        .bind(notebook_guid.to_string())
        .execute(&mut *tx)
        .await?;
    for entry in shared {
        sqlx::query(
            r#"
            INSERT INTO shared_notebooks (
                user_id, notebook_guid, email, created_at, updated_at, share_key, username,
                privilege, allow_preview, recipient_reminder_notify_email, recipient_reminder_notify_in_app
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.user_id.map(|id| id.0))
        .bind(notebook_guid.to_string())
        .bind(&entry.email)
        .bind(entry.created_at.to_rfc3339())
        .bind(entry.updated_at.to_rfc3339())
        .bind(&entry.share_key)
        .bind(&entry.username)
        .bind(privilege_to_str(entry.privilege))
        .bind(entry.allow_preview)
        .bind(entry.recipient_reminder_notify_email)
        .bind(entry.recipient_reminder_notify_in_app)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn find_by_notebook_guid(pool: &SqlitePool, notebook_guid: Guid) -> StorageResult<Vec<SharedNotebook>> {
    let rows: Vec<SharedNotebookRow> = sqlx::query_as(&format!(
        "SELECT {SELECT_SHARED_NOTEBOOK_COLUMNS} FROM shared_notebooks WHERE notebook_guid = ? ORDER BY id ASC"
    ))
    .bind(notebook_guid.to_string())
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(SharedNotebookRow::try_into_shared_notebook).collect()
}

/// Every shared-notebook row across every notebook (spec.md §4.1's
/// `ListAllSharedNotebooks`).
pub async fn list_all(pool: &SqlitePool) -> StorageResult<Vec<SharedNotebook>> {
    let rows: Vec<SharedNotebookRow> = sqlx::query_as(&format!(
        "SELECT {SELECT_SHARED_NOTEBOOK_COLUMNS} FROM shared_notebooks ORDER BY id ASC"
    ))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(SharedNotebookRow::try_into_shared_notebook).collect()
}

pub async fn count_for_notebook(pool: &SqlitePool, notebook_guid: Guid) -> StorageResult<u32> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shared_notebooks WHERE notebook_guid = ?")
        .bind(notebook_guid.to_string())
        .fetch_one(pool)
        .await?;
    Ok(count as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::engine::LocalStorageEngine;
    use crate::notebooks;
    use kn_domain::entities::Notebook;
    use uuid::Uuid;

    async fn engine_with_synced_notebook() -> (LocalStorageEngine, Guid) {
        let engine = LocalStorageEngine::connect(&StorageConfig::in_memory()).await.unwrap();
        let mut notebook = Notebook::new("Shared");
        notebook.guid = Some(Guid::from_uuid(Uuid::new_v4()));
        notebooks::insert(engine.pool(), &notebook).await.unwrap();
        (engine, notebook.guid.unwrap())
    }

    fn sample(notebook_guid: Guid) -> SharedNotebook {
        let now = Utc::now();
        SharedNotebook {
            id: 0,
            user_id: None,
            notebook_guid,
            email: Some("friend@example.com".into()),
            created_at: now,
            updated_at: now,
            share_key: None,
            username: None,
            privilege: PrivilegeLevel::Normal,
            allow_preview: true,
            recipient_reminder_notify_email: false,
            recipient_reminder_notify_in_app: false,
        }
    }

    #[tokio::test]
    async fn insert_then_find_by_notebook_guid_round_trips() {
        let (engine, notebook_guid) = engine_with_synced_notebook().await;
        insert(engine.pool(), &sample(notebook_guid)).await.unwrap();

        let found = find_by_notebook_guid(engine.pool(), notebook_guid).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].email.as_deref(), Some("friend@example.com"));
    }

    #[tokio::test]
    async fn list_all_spans_every_notebook() {
        let (engine, guid_a) = engine_with_synced_notebook().await;
        let mut notebook_b = Notebook::new("Other");
        notebook_b.guid = Some(Guid::from_uuid(Uuid::new_v4()));
        notebooks::insert(engine.pool(), &notebook_b).await.unwrap();
        let guid_b = notebook_b.guid.unwrap();

        for _ in 0..5 {
            insert(engine.pool(), &sample(guid_a)).await.unwrap();
        }
        for _ in 0..5 {
            insert(engine.pool(), &sample(guid_b)).await.unwrap();
        }

        let all = list_all(engine.pool()).await.unwrap();
        assert_eq!(all.len(), 10);
    }

    #[tokio::test]
    async fn replace_for_notebook_drops_stale_rows() {
        let (engine, notebook_guid) = engine_with_synced_notebook().await;
        insert(engine.pool(), &sample(notebook_guid)).await.unwrap();

        replace_for_notebook(engine.pool(), notebook_guid, &[sample(notebook_guid), sample(notebook_guid)])
            .await
            .unwrap();

        let found = find_by_notebook_guid(engine.pool(), notebook_guid).await.unwrap();
        assert_eq!(found.len(), 2);
    }
}
