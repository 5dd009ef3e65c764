//! User persistence (§4.1 "User operations"). A local storage instance
//! holds at most one active `User` row, mirroring the single-account
//! desktop client this engine is embedded in.

use chrono::{DateTime, Utc};
use kn_domain::codec;
use kn_domain::entities::{Accounting, BusinessUserInfo, PremiumInfo, PrivilegeLevel, User};
use kn_domain::ids::UserId;
use sqlx::SqlitePool;

use crate::errors::{StorageError, StorageResult};

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    name: String,
    timezone: Option<String>,
    privilege: String,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
    active: i64,
    attributes_blob: Option<Vec<u8>>,
    accounting_json: Option<String>,
    premium_info_json: Option<String>,
    business_user_info_json: Option<String>,
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

impl UserRow {
    fn try_into_user(self) -> StorageResult<User> {
        Ok(User {
            id: UserId(self.id),
            username: self.username,
            email: self.email,
            name: self.name,
            timezone: self.timezone,
            privilege: privilege_from_str(&self.privilege)?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            deleted_at: self.deleted_at.as_deref().map(parse_datetime).transpose()?,
            active: self.active != 0,
            attributes: self
                .attributes_blob
                .as_deref()
                .map(codec::decode_user_attributes)
                .transpose()?,
            accounting: self
                .accounting_json
                .as_deref()
                .map(serde_json::from_str::<Accounting>)
                .transpose()?,
            premium_info: self
                .premium_info_json
                .as_deref()
                .map(serde_json::from_str::<PremiumInfo>)
                .transpose()?,
            business_user_info: self
                .business_user_info_json
                .as_deref()
                .map(serde_json::from_str::<BusinessUserInfo>)
                .transpose()?,
        })
    }
}

const SELECT_USER_COLUMNS: &str = r#"
    id, username, email, name, timezone, privilege, created_at, updated_at, deleted_at, active,
    attributes_blob, accounting_json, premium_info_json, business_user_info_json
"#;

pub async fn insert(pool: &SqlitePool, user: &User) -> StorageResult<()> {
    let blob = user.attributes.as_ref().map(codec::encode_user_attributes);
    sqlx::query(
        r#"
        INSERT INTO users (
            id, username, email, name, timezone, privilege, created_at, updated_at, deleted_at, active,
            attributes_blob, accounting_json, premium_info_json, business_user_info_json
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.id.0)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.name)
    .bind(&user.timezone)
    .bind(privilege_to_str(user.privilege))
    .bind(user.created_at.to_rfc3339())
    .bind(user.updated_at.to_rfc3339())
    .bind(user.deleted_at.map(|d| d.to_rfc3339()))
    .bind(user.active)
    .bind(blob)
    .bind(user.accounting.as_ref().map(serde_json::to_string).transpose()?)
    .bind(user.premium_info.as_ref().map(serde_json::to_string).transpose()?)
    .bind(
        user.business_user_info
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update(pool: &SqlitePool, user: &User) -> StorageResult<()> {
    let blob = user.attributes.as_ref().map(codec::encode_user_attributes);
    let result = sqlx::query(
        r#"
        UPDATE users SET
            username = ?, email = ?, name = ?, timezone = ?, privilege = ?, updated_at = ?,
            deleted_at = ?, active = ?, attributes_blob = ?, accounting_json = ?,
            premium_info_json = ?, business_user_info_json = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.name)
    .bind(&user.timezone)
    .bind(privilege_to_str(user.privilege))
    .bind(user.updated_at.to_rfc3339())
    .bind(user.deleted_at.map(|d| d.to_rfc3339()))
    .bind(user.active)
    .bind(blob)
    .bind(user.accounting.as_ref().map(serde_json::to_string).transpose()?)
    .bind(user.premium_info.as_ref().map(serde_json::to_string).transpose()?)
    .bind(
        user.business_user_info
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
    )
    .bind(user.id.0)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(format!("user {} not found", user.id)));
    }
    Ok(())
}

pub async fn find_by_id(pool: &SqlitePool, id: UserId) -> StorageResult<Option<User>> {
    let row: Option<UserRow> = sqlx::query_as(&format!("SELECT {SELECT_USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id.0)
        .fetch_optional(pool)
        .await?;
    row.map(UserRow::try_into_user).transpose()
}

/// Returns the single active user, if one has been persisted. A local
/// storage instance backs one account at a time (§3).
pub async fn find_current(pool: &SqlitePool) -> StorageResult<Option<User>> {
    let row: Option<UserRow> = sqlx::query_as(&format!(
        "SELECT {SELECT_USER_COLUMNS} FROM users WHERE deleted_at IS NULL ORDER BY id ASC LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;
    row.map(UserRow::try_into_user).transpose()
}
