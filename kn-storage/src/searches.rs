//! Saved search persistence (§4.1 "SavedSearch operations").

use kn_domain::entities::{QueryFormat, SavedSearch};
use kn_domain::filters::{ListOptions, NameSortColumn, SortDirection};
use kn_domain::ids::{Guid, LocalId};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::errors::{StorageError, StorageResult};

#[derive(Debug, sqlx::FromRow)]
struct SavedSearchRow {
    local_id: String,
    guid: Option<String>,
    update_sequence_number: Option<i64>,
    name: String,
    query: String,
    query_format: String,
    include_account: i64,
    include_business_linked_notebooks: i64,
    include_personal_linked_notebooks: i64,
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

fn query_format_to_str(format: QueryFormat) -> &'static str {
    match format {
        QueryFormat::UserQuery => "user_query",
        QueryFormat::Sexp => "sexp",
    }
}

fn query_format_from_str(s: &str) -> StorageResult<QueryFormat> {
    match s {
        "user_query" => Ok(QueryFormat::UserQuery),
        "sexp" => Ok(QueryFormat::Sexp),
        other => Err(StorageError::MalformedId(format!("unknown query format {other}"))),
    }
}

impl SavedSearchRow {
    fn try_into_saved_search(self) -> StorageResult<SavedSearch> {
        Ok(SavedSearch {
            local_id: parse_local_id(&self.local_id)?,
            guid: self.guid.as_deref().map(parse_guid).transpose()?,
            update_sequence_number: self.update_sequence_number.map(|v| v as i32),
            name: self.name,
            query: self.query,
            query_format: query_format_from_str(&self.query_format)?,
            include_account: self.include_account != 0,
            include_business_linked_notebooks: self.include_business_linked_notebooks != 0,
            include_personal_linked_notebooks: self.include_personal_linked_notebooks != 0,
            is_dirty: self.is_dirty != 0,
            is_local: self.is_local != 0,
            is_favorited: self.is_favorited != 0,
        })
    }
}

const SELECT_SEARCH_COLUMNS: &str = r#"
    local_id, guid, update_sequence_number, name, query, query_format,
    include_account, include_business_linked_notebooks, include_personal_linked_notebooks,
    is_dirty, is_local, is_favorited
"#;

pub async fn insert(pool: &SqlitePool, search: &SavedSearch) -> StorageResult<()> {
    let name_upper = search.name.to_uppercase();
    sqlx::query(
        r#"
        INSERT INTO saved_searches (
            local_id, guid, update_sequence_number, name, name_upper, query, query_format,
            include_account, include_business_linked_notebooks, include_personal_linked_notebooks,
            is_dirty, is_local, is_favorited
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(search.local_id.to_string())
    .bind(search.guid.map(|g| g.to_string()))
    .bind(search.update_sequence_number)
    .bind(&search.name)
    .bind(name_upper)
    .bind(&search.query)
    .bind(query_format_to_str(search.query_format))
    .bind(search.include_account)
    .bind(search.include_business_linked_notebooks)
    .bind(search.include_personal_linked_notebooks)
    .bind(search.is_dirty)
    .bind(search.is_local)
    .bind(search.is_favorited)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update(pool: &SqlitePool, search: &SavedSearch) -> StorageResult<()> {
    let name_upper = search.name.to_uppercase();
    let result = sqlx::query(
        r#"
        UPDATE saved_searches SET
            guid = ?, update_sequence_number = ?, name = ?, name_upper = ?, query = ?, query_format = ?,
            include_account = ?, include_business_linked_notebooks = ?, include_personal_linked_notebooks = ?,
            is_dirty = ?, is_local = ?, is_favorited = ?
        WHERE local_id = ?
        "#,
    )
    .bind(search.guid.map(|g| g.to_string()))
    .bind(search.update_sequence_number)
    .bind(&search.name)
    .bind(name_upper)
    .bind(&search.query)
    .bind(query_format_to_str(search.query_format))
    .bind(search.include_account)
    .bind(search.include_business_linked_notebooks)
    .bind(search.include_personal_linked_notebooks)
    .bind(search.is_dirty)
    .bind(search.is_local)
    .bind(search.is_favorited)
    .bind(search.local_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(format!(
            "saved search {} not found",
            search.local_id
        )));
    }
    Ok(())
}

pub async fn find_by_local_id(pool: &SqlitePool, local_id: LocalId) -> StorageResult<Option<SavedSearch>> {
    let row: Option<SavedSearchRow> = sqlx::query_as(&format!(
        "SELECT {SELECT_SEARCH_COLUMNS} FROM saved_searches WHERE local_id = ?"
    ))
    .bind(local_id.to_string())
    .fetch_optional(pool)
    .await?;
    row.map(SavedSearchRow::try_into_saved_search).transpose()
}

pub async fn find_by_name(pool: &SqlitePool, name: &str) -> StorageResult<Option<SavedSearch>> {
    let name_upper = name.to_uppercase();
    let row: Option<SavedSearchRow> = sqlx::query_as(&format!(
        "SELECT {SELECT_SEARCH_COLUMNS} FROM saved_searches WHERE name_upper = ?"
    ))
    .bind(name_upper)
    .fetch_optional(pool)
    .await?;
    row.map(SavedSearchRow::try_into_saved_search).transpose()
}

pub async fn list(
    pool: &SqlitePool,
    options: &ListOptions<NameSortColumn>,
) -> StorageResult<Vec<SavedSearch>> {
    let column = match options.sort_by {
        NameSortColumn::Name => "name_upper",
        NameSortColumn::CreatedAt | NameSortColumn::UpdatedAt => "name_upper",
    };
    let direction = match options.direction {
        SortDirection::Ascending => "ASC",
        SortDirection::Descending => "DESC",
    };
    let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {SELECT_SEARCH_COLUMNS} FROM saved_searches ORDER BY {column} {direction}"
    ));
    if let Some(limit) = options.limit {
        query_builder.push(" LIMIT ").push_bind(limit as i64);
        query_builder.push(" OFFSET ").push_bind(options.offset as i64);
    }
    let rows: Vec<SavedSearchRow> = query_builder.build_query_as().fetch_all(pool).await?;
    rows.into_iter().map(SavedSearchRow::try_into_saved_search).collect()
}

pub async fn count(pool: &SqlitePool) -> StorageResult<u32> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM saved_searches").fetch_one(pool).await?;
    Ok(count as u32)
}

pub async fn expunge(pool: &SqlitePool, local_id: LocalId) -> StorageResult<()> {
    let result = sqlx::query("DELETE FROM saved_searches WHERE local_id = ?")
        .bind(local_id.to_string())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(format!("saved search {local_id} not found")));
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
        let search = SavedSearch::new("Recent", "updated:day");
        insert(engine.pool(), &search).await.unwrap();

        let found = find_by_local_id(engine.pool(), search.local_id).await.unwrap().unwrap();
        assert_eq!(found.query, "updated:day");
        assert_eq!(found.query_format, QueryFormat::UserQuery);
    }

    #[tokio::test]
    async fn find_by_name_is_case_insensitive() {
        let engine = engine().await;
        insert(engine.pool(), &SavedSearch::new("Recent", "q")).await.unwrap();
        assert!(find_by_name(engine.pool(), "recent").await.unwrap().is_some());
    }
}
