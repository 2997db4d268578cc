//! 数据库基础设施
//!
//! 直连 Postgres 的行存储。行以 JSON 进出：读取用 `to_jsonb`，写入用
//! `jsonb_populate_record`，列名只来自 [`Table::columns`] 白名单。

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    Error,
};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::backend::{attach_embeds, project, value_text, BackendError, Query, RowStore, Table};

pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    pub async fn new(database_url: &str) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(8))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}

/// 基于连接池的行存储
#[derive(Clone)]
pub struct PgRowStore {
    pool: PgPool,
}

impl PgRowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 只保留白名单内的列，其余字段报错
    fn checked_object(table: Table, row: Value) -> Result<Map<String, Value>, BackendError> {
        let Value::Object(map) = row else {
            return Err(BackendError::InvalidQuery(format!(
                "row for {} must be an object",
                table
            )));
        };
        if let Some(column) = map.keys().find(|k| !table.has_column(k)) {
            return Err(BackendError::Api {
                status: 400,
                message: format!(
                    "Could not find the '{}' column of '{}' in the schema cache",
                    column, table
                ),
            });
        }
        Ok(map)
    }

    /// 生成 SELECT 语句，过滤值按顺序绑定
    fn select_sql(query: &Query) -> String {
        let mut sql = format!("SELECT to_jsonb(t) FROM {} t", query.table);
        for (i, filter) in query.filters.iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            sql.push_str(&format!("t.{}::text = ${}", filter.column, i + 1));
        }
        if let Some(order) = &query.order {
            sql.push_str(&format!(
                " ORDER BY t.{} {}",
                order.column,
                if order.ascending { "ASC" } else { "DESC" }
            ));
        }
        sql
    }

    /// `column_list` 决定 jsonb_populate_record 写入哪些列
    fn column_list(map: &Map<String, Value>) -> String {
        map.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

#[async_trait]
impl RowStore for PgRowStore {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, BackendError> {
        query.check_columns()?;
        let sql = Self::select_sql(query);
        debug!("{}", sql);

        let mut statement = sqlx::query_scalar::<_, Value>(&sql);
        for filter in &query.filters {
            statement = statement.bind(value_text(&filter.value));
        }

        let mut rows = statement.fetch_all(&self.pool).await?;
        attach_embeds(self, &mut rows, &query.embeds).await?;

        if query.columns.is_empty() {
            return Ok(rows);
        }
        // 嵌入字段以关联表名为键，投影时一并保留
        let mut columns = query.columns.clone();
        columns.extend(query.embeds.iter().map(|e| e.table.as_str().to_string()));
        Ok(rows.iter().map(|row| project(row, &columns)).collect())
    }

    async fn insert(&self, table: Table, rows: Vec<Value>) -> Result<Vec<Value>, BackendError> {
        let mut inserted = Vec::with_capacity(rows.len());
        let mut tx = self.pool.begin().await?;

        for row in rows {
            let map = Self::checked_object(table, row)?;
            let columns = Self::column_list(&map);
            let sql = format!(
                "INSERT INTO {table} ({columns}) \
                 SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1) \
                 RETURNING to_jsonb({table})",
            );
            let row: Value = sqlx::query_scalar(&sql)
                .bind(Value::Object(map))
                .fetch_one(&mut *tx)
                .await?;
            inserted.push(row);
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn update(&self, table: Table, id: Uuid, patch: Value) -> Result<Value, BackendError> {
        let map = Self::checked_object(table, patch)?;
        if map.is_empty() {
            return Err(BackendError::InvalidQuery("empty update".to_string()));
        }

        let assignments = map
            .keys()
            .map(|c| format!("{c} = p.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {table} SET {assignments} \
             FROM jsonb_populate_record(NULL::{table}, $1) p \
             WHERE {table}.id::text = $2 \
             RETURNING to_jsonb({table})",
        );

        sqlx::query_scalar::<_, Value>(&sql)
            .bind(Value::Object(map))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(BackendError::NotFound {
                table: table.as_str(),
                id,
            })
    }

    async fn delete(&self, table: Table, id: Uuid) -> Result<(), BackendError> {
        let sql = format!("DELETE FROM {table} WHERE id::text = $1");
        let result = sqlx::query(&sql)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(BackendError::NotFound {
                table: table.as_str(),
                id,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_select_sql() {
        let query = Query::table(Table::Products)
            .eq("category_id", "abc")
            .eq("featured", true)
            .order_by("created_at", false);

        assert_eq!(
            PgRowStore::select_sql(&query),
            "SELECT to_jsonb(t) FROM products t WHERE t.category_id::text = $1 \
             AND t.featured::text = $2 ORDER BY t.created_at DESC"
        );
    }

    #[test]
    fn test_checked_object_rejects_unknown_column() {
        let err = PgRowStore::checked_object(Table::Categories, json!({"name": "x", "bogus": 1}))
            .unwrap_err();
        assert!(err.to_string().contains("'bogus' column of 'categories'"));

        let ok = PgRowStore::checked_object(Table::Categories, json!({"name": "x"})).unwrap();
        assert_eq!(PgRowStore::column_list(&ok), "name");
    }
}
