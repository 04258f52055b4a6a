//! Raw column access for media references on content tables.
//!
//! Content tables belong to the site application, so there are no entities
//! for them here. Table and column names come only from the static
//! [`CONTENT_COLUMNS`](crate::services::rewriter::CONTENT_COLUMNS) registry
//! and are quoted as identifiers; values are always bound parameters.

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::services::rewriter::{
    ColumnKind, ContentColumn, ReferenceRow, ReferenceStore, ReferenceValue,
};

use super::DbPool;

/// Quote an identifier for PostgreSQL.
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn select_sql(column: &ContentColumn) -> String {
    let table = quote_ident(column.table);
    let col = quote_ident(column.column);
    match column.kind {
        ColumnKind::Scalar => format!(
            "SELECT id::text AS id, {col}::text AS value FROM {table} WHERE {col} IS NOT NULL"
        ),
        ColumnKind::JsonArray => format!(
            "SELECT id::text AS id, to_jsonb({col}) AS value FROM {table} \
             WHERE {col} IS NOT NULL \
             AND jsonb_typeof(to_jsonb({col})) = 'array' \
             AND jsonb_array_length(to_jsonb({col})) > 0"
        ),
    }
}

/// Row ids are carried as text and the parameter is cast to the `id`
/// column's type. The column itself is never cast.
fn update_sql(column: &ContentColumn, id_type: &str) -> String {
    format!(
        "UPDATE {} SET {} = $1 WHERE id = $2::{}",
        quote_ident(column.table),
        quote_ident(column.column),
        id_type
    )
}

const ID_TYPE_SQL: &str = "SELECT format_type(a.atttypid, a.atttypmod) AS id_type \
     FROM pg_attribute a \
     WHERE a.attrelid = to_regclass($1) AND a.attname = 'id' AND NOT a.attisdropped";

/// Type names as rendered by `format_type`, e.g. `uuid` or `character varying(36)`.
fn is_type_name(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '(' | ')' | ','))
}

impl DbPool {
    /// SQL type of the `id` column of `table`.
    async fn id_type(&self, table: &'static str) -> AppResult<String> {
        if let Some(cached) = self.id_types.lock().ok().and_then(|m| m.get(table).cloned()) {
            return Ok(cached);
        }

        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            ID_TYPE_SQL,
            [quote_ident(table).into()],
        );
        let row = self
            .connection()
            .query_one_raw(stmt)
            .await
            .map_err(|e| AppError::Database(format!("Failed to read id type of {}: {}", table, e)))?
            .ok_or_else(|| AppError::Database(format!("Table {} has no id column", table)))?;
        let id_type: String = row
            .try_get("", "id_type")
            .map_err(|e| AppError::Database(format!("Failed to read id type of {}: {}", table, e)))?;
        if !is_type_name(&id_type) {
            return Err(AppError::Database(format!(
                "Unsupported id type {} on {}",
                id_type, table
            )));
        }

        if let Ok(mut cache) = self.id_types.lock() {
            cache.insert(table, id_type.clone());
        }
        Ok(id_type)
    }

    /// Read the non-empty values of a media-reference column.
    pub async fn fetch_column_references(
        &self,
        column: &ContentColumn,
    ) -> AppResult<Vec<ReferenceRow>> {
        let stmt = Statement::from_string(DatabaseBackend::Postgres, select_sql(column));
        let rows = self.connection().query_all_raw(stmt).await.map_err(|e| {
            AppError::Database(format!(
                "Failed to scan {}.{}: {}",
                column.table, column.column, e
            ))
        })?;

        let mut references = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = match row.try_get("", "id") {
                Ok(id) => id,
                Err(e) => {
                    warn!(target: "media", table = column.table, error = %e, "Skipping row without readable id");
                    continue;
                }
            };
            let value = match column.kind {
                ColumnKind::Scalar => row.try_get::<String>("", "value").map(ReferenceValue::Scalar),
                ColumnKind::JsonArray => row.try_get::<JsonValue>("", "value").map(|v| match v {
                    JsonValue::Array(items) => ReferenceValue::List(items),
                    other => ReferenceValue::List(vec![other]),
                }),
            };
            match value {
                Ok(value) => references.push(ReferenceRow { id, value }),
                Err(e) => {
                    warn!(
                        target: "media",
                        table = column.table,
                        column = column.column,
                        id = %id,
                        error = %e,
                        "Skipping unreadable reference value"
                    );
                }
            }
        }

        Ok(references)
    }

    /// Overwrite a media-reference column on one row.
    pub async fn update_column_reference(
        &self,
        column: &ContentColumn,
        id: &str,
        value: &ReferenceValue,
    ) -> AppResult<()> {
        let bound: sea_orm::Value = match value {
            ReferenceValue::Scalar(s) => s.clone().into(),
            ReferenceValue::List(items) => JsonValue::Array(items.clone()).into(),
        };
        let id_type = self.id_type(column.table).await?;
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            update_sql(column, &id_type),
            [bound, id.into()],
        );

        let result = self.connection().execute_raw(stmt).await.map_err(|e| {
            AppError::Database(format!(
                "Failed to update {}.{} for row {}: {}",
                column.table, column.column, id, e
            ))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Row {} in {}",
                id, column.table
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl ReferenceStore for DbPool {
    async fn fetch_references(&self, column: &ContentColumn) -> AppResult<Vec<ReferenceRow>> {
        self.fetch_column_references(column).await
    }

    async fn store_reference(
        &self,
        column: &ContentColumn,
        id: &str,
        value: &ReferenceValue,
    ) -> AppResult<()> {
        self.update_column_reference(column, id, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rewriter::CONTENT_COLUMNS;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("events"), "\"events\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_select_sql_for_scalar_column() {
        let sql = select_sql(&CONTENT_COLUMNS[0]);
        assert_eq!(
            sql,
            "SELECT id::text AS id, \"image_url\"::text AS value FROM \"events\" WHERE \"image_url\" IS NOT NULL"
        );
    }

    #[test]
    fn test_select_sql_for_array_column_filters_empty() {
        let sql = select_sql(&CONTENT_COLUMNS[2]);
        assert!(sql.contains("FROM \"forum_posts\""));
        assert!(sql.contains("jsonb_array_length(to_jsonb(\"media_urls\")) > 0"));
    }

    #[test]
    fn test_update_sql_compares_id_without_casting_the_column() {
        assert_eq!(
            update_sql(&CONTENT_COLUMNS[6], "uuid"),
            "UPDATE \"users\" SET \"avatar_url\" = $1 WHERE id = $2::uuid"
        );
        assert_eq!(
            update_sql(&CONTENT_COLUMNS[0], "bigint"),
            "UPDATE \"events\" SET \"image_url\" = $1 WHERE id = $2::bigint"
        );
    }

    #[test]
    fn test_is_type_name() {
        assert!(is_type_name("uuid"));
        assert!(is_type_name("character varying(36)"));
        assert!(!is_type_name(""));
        assert!(!is_type_name("uuid; DROP TABLE users"));
    }
}
