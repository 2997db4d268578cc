//! 后端服务访问接口
//!
//! 行操作、对象存储和认证三组原语。托管服务、直连 Postgres 和内存实现都
//! 实现这里的 trait，业务层只依赖 trait 对象。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// 后端错误类型
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 后端返回了非 2xx 响应
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("row {id} not found in {table}")]
    NotFound { table: &'static str, id: Uuid },

    #[error("object not found: {bucket}/{path}")]
    ObjectNotFound { bucket: String, path: String },

    #[error("invalid row: {0}")]
    InvalidRow(#[from] serde_json::Error),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// 目录中的表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Products,
    Categories,
    ProductTypes,
    Ingredients,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Products => "products",
            Table::Categories => "categories",
            Table::ProductTypes => "product_types",
            Table::Ingredients => "ingredients",
        }
    }

    /// 允许出现在查询和写入中的列
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Products => &[
                "id",
                "name",
                "brand",
                "category",
                "category_id",
                "product_type",
                "product_type_id",
                "price",
                "featured",
                "description",
                "ingredients",
                "how_to_use",
                "size",
                "skin_type",
                "concerns",
                "image",
                "image_url",
                "tokopedia_url",
                "shopee_url",
                "created_at",
            ],
            Table::Categories => &["id", "name", "created_at"],
            Table::ProductTypes => &["id", "name", "category_id", "created_at"],
            Table::Ingredients => &[
                "id",
                "name",
                "slug",
                "description",
                "benefits",
                "safety_level",
                "created_at",
            ],
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 等值过滤条件
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

/// 排序
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// 嵌入关联表，例如 products 行上的 `categories(name)`
#[derive(Debug, Clone, PartialEq)]
pub struct Embed {
    pub table: Table,
    /// 主表上指向关联表 id 的列
    pub foreign_key: String,
    pub columns: Vec<String>,
}

/// 查询描述
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: Table,
    /// 为空表示全部列
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub embeds: Vec<Embed>,
}

impl Query {
    pub fn table(table: Table) -> Self {
        Self {
            table,
            columns: Vec::new(),
            filters: Vec::new(),
            order: None,
            embeds: Vec::new(),
        }
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn embed(mut self, table: Table, foreign_key: &str, columns: &[&str]) -> Self {
        self.embeds.push(Embed {
            table,
            foreign_key: foreign_key.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// 校验列名都在白名单内
    pub fn check_columns(&self) -> Result<(), BackendError> {
        let unknown = self
            .columns
            .iter()
            .map(String::as_str)
            .chain(self.filters.iter().map(|f| f.column.as_str()))
            .chain(self.order.iter().map(|o| o.column.as_str()))
            .chain(self.embeds.iter().map(|e| e.foreign_key.as_str()))
            .find(|c| !self.table.has_column(c));

        match unknown {
            Some(column) => Err(BackendError::InvalidQuery(format!(
                "unknown column {} on {}",
                column, self.table
            ))),
            None => Ok(()),
        }
    }
}

/// 行存储
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, BackendError>;

    /// 插入一行或多行，返回写入后的行
    async fn insert(&self, table: Table, rows: Vec<Value>) -> Result<Vec<Value>, BackendError>;

    async fn update(&self, table: Table, id: Uuid, patch: Value) -> Result<Value, BackendError>;

    async fn delete(&self, table: Table, id: Uuid) -> Result<(), BackendError>;
}

/// 对象存储
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError>;

    /// 公开访问地址，后端无法提供时返回 None
    async fn public_url(&self, bucket: &str, path: &str) -> Option<String>;

    async fn signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl: Duration,
    ) -> Result<String, BackendError>;

    async fn remove(&self, bucket: &str, paths: Vec<String>) -> Result<(), BackendError>;
}

/// 已登录用户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// 登录会话
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: AuthUser,
}

/// 认证服务
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    /// 令牌无效或过期时返回 Ok(None)
    async fn current_user(&self, access_token: &str) -> Result<Option<AuthUser>, BackendError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError>;
}

/// 三组原语的组合
#[derive(Clone)]
pub struct Backend {
    pub rows: Arc<dyn RowStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub auth: Arc<dyn AuthProvider>,
}

impl Backend {
    pub fn new(
        rows: Arc<dyn RowStore>,
        storage: Arc<dyn ObjectStorage>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            rows,
            storage,
            auth,
        }
    }
}

/// 对象的公开地址
pub fn public_object_url(base_url: &str, bucket: &str, path: &str) -> String {
    format!(
        "{}/storage/v1/object/public/{}/{}",
        base_url.trim_end_matches('/'),
        bucket,
        path.trim_start_matches('/')
    )
}

/// 在不支持服务端关联查询的实现上补齐嵌入字段
///
/// 关联表整表读取一次，结果以关联表名为键挂在每一行上，缺失时为 null。
pub(crate) async fn attach_embeds(
    store: &dyn RowStore,
    rows: &mut [Value],
    embeds: &[Embed],
) -> Result<(), BackendError> {
    for embed in embeds {
        let related = store.select(&Query::table(embed.table)).await?;
        let by_id: HashMap<String, &Value> = related
            .iter()
            .filter_map(|r| r.get("id").map(|id| (value_text(id), r)))
            .collect();

        for row in rows.iter_mut() {
            let joined = row
                .get(&embed.foreign_key)
                .filter(|v| !v.is_null())
                .and_then(|fk| by_id.get(&value_text(fk)))
                .map(|r| project(r, &embed.columns))
                .unwrap_or(Value::Null);

            if let Value::Object(map) = row {
                map.insert(embed.table.as_str().to_string(), joined);
            }
        }
    }
    Ok(())
}

/// 只保留指定列，列表为空时原样返回
pub(crate) fn project(row: &Value, columns: &[String]) -> Value {
    if columns.is_empty() {
        return row.clone();
    }
    match row {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| columns.iter().any(|c| c == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// 过滤和比较时使用的文本形式
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_rejects_unknown_columns() {
        let query = Query::table(Table::Categories).eq("name", "Serum");
        assert!(query.check_columns().is_ok());

        let query = Query::table(Table::Categories).eq("name; drop table", "x");
        assert!(matches!(
            query.check_columns(),
            Err(BackendError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_project_keeps_requested_columns() {
        let row = json!({"id": "1", "name": "Serum", "created_at": "now"});
        assert_eq!(project(&row, &["name".to_string()]), json!({"name": "Serum"}));
        assert_eq!(project(&row, &[]), row);
    }

    #[test]
    fn test_public_object_url() {
        assert_eq!(
            public_object_url("https://x.supabase.co/", "products", "/abc.jpg"),
            "https://x.supabase.co/storage/v1/object/public/products/abc.jpg"
        );
    }
}
