//! 内存后端
//!
//! 用于本地开发和测试，行为尽量贴近托管服务：写入时补 id 和 created_at，
//! 只有真实存在的对象才有公开地址和签名地址。

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use super::backend::{
    attach_embeds, project, public_object_url, value_text, AuthProvider, AuthUser, Backend,
    BackendError, ObjectStorage, Query, RowStore, Session, Table,
};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

#[derive(Debug, Default)]
struct Inner {
    rows: HashMap<Table, Vec<Value>>,
    objects: HashMap<(String, String), StoredObject>,
    /// email -> (password, user)
    users: HashMap<String, (String, AuthUser)>,
    /// access token -> user
    sessions: HashMap<String, AuthUser>,
}

/// 内存后端，三个 trait 共用一份数据
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    base_url: String,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// 注册一个可登录的用户
    pub fn with_user(self, email: &str, password: &str) -> Self {
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
        };
        self.lock()
            .users
            .insert(email.to_string(), (password.to_string(), user));
        self
    }

    /// 打包成 [`Backend`]
    pub fn into_backend(self) -> Backend {
        let shared = Arc::new(self);
        Backend::new(shared.clone(), shared.clone(), shared)
    }

    /// 对象是否存在
    pub fn has_object(&self, bucket: &str, path: &str) -> bool {
        self.lock()
            .objects
            .contains_key(&(bucket.to_string(), path.to_string()))
    }

    /// 对象的 content-type
    pub fn object_content_type(&self, bucket: &str, path: &str) -> Option<String> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), path.to_string()))
            .map(|o| o.content_type.clone())
    }

    /// 对象大小
    pub fn object_len(&self, bucket: &str, path: &str) -> Option<usize> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), path.to_string()))
            .map(|o| o.bytes.len())
    }

    /// 某个桶里的对象路径
    pub fn object_paths(&self, bucket: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .lock()
            .objects
            .iter()
            .filter(|((b, _), _)| b == bucket)
            .map(|((_, p), _)| p.clone())
            .collect();
        paths.sort();
        paths
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // 锁中毒只可能来自测试里的 panic，数据本身仍可用
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_row_columns(table: Table, row: &Value) -> Result<Map<String, Value>, BackendError> {
        let map = match row {
            Value::Object(map) => map.clone(),
            _ => {
                return Err(BackendError::InvalidQuery(format!(
                    "row for {} must be an object",
                    table
                )))
            }
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
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => value_text(x).cmp(&value_text(y)),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[async_trait]
impl RowStore for MemoryBackend {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, BackendError> {
        query.check_columns()?;

        let mut rows: Vec<Value> = {
            let inner = self.lock();
            inner
                .rows
                .get(&query.table)
                .map(|rows| {
                    rows.iter()
                        .filter(|row| {
                            query.filters.iter().all(|f| {
                                row.get(&f.column)
                                    .map(|v| value_text(v) == value_text(&f.value))
                                    .unwrap_or(false)
                            })
                        })
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }

        attach_embeds(self, &mut rows, &query.embeds).await?;
        if query.columns.is_empty() {
            return Ok(rows);
        }
        let mut columns = query.columns.clone();
        columns.extend(query.embeds.iter().map(|e| e.table.as_str().to_string()));
        Ok(rows.iter().map(|r| project(r, &columns)).collect())
    }

    async fn insert(&self, table: Table, rows: Vec<Value>) -> Result<Vec<Value>, BackendError> {
        let mut prepared = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut map = Self::check_row_columns(table, row)?;
            map.entry("id")
                .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
            map.entry("created_at")
                .or_insert_with(|| Value::String(chrono::Utc::now().to_rfc3339()));
            prepared.push(Value::Object(map));
        }

        self.lock()
            .rows
            .entry(table)
            .or_default()
            .extend(prepared.iter().cloned());

        Ok(prepared)
    }

    async fn update(&self, table: Table, id: Uuid, patch: Value) -> Result<Value, BackendError> {
        let patch = Self::check_row_columns(table, &patch)?;
        let id_text = id.to_string();

        let mut inner = self.lock();
        let row = inner
            .rows
            .get_mut(&table)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|r| r.get("id").map(value_text).as_deref() == Some(id_text.as_str()))
            })
            .ok_or(BackendError::NotFound {
                table: table.as_str(),
                id,
            })?;

        if let Value::Object(map) = row {
            for (k, v) in patch {
                map.insert(k, v);
            }
        }
        Ok(row.clone())
    }

    async fn delete(&self, table: Table, id: Uuid) -> Result<(), BackendError> {
        let id_text = id.to_string();
        let mut inner = self.lock();
        let rows = inner.rows.entry(table).or_default();
        let before = rows.len();
        rows.retain(|r| r.get("id").map(value_text).as_deref() != Some(id_text.as_str()));

        if rows.len() == before {
            return Err(BackendError::NotFound {
                table: table.as_str(),
                id,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for MemoryBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError> {
        let key = (bucket.to_string(), path.to_string());
        let mut inner = self.lock();
        if inner.objects.contains_key(&key) {
            return Err(BackendError::Api {
                status: 409,
                message: "The resource already exists".to_string(),
            });
        }
        inner.objects.insert(
            key,
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn public_url(&self, bucket: &str, path: &str) -> Option<String> {
        self.has_object(bucket, path)
            .then(|| public_object_url(&self.base_url, bucket, path))
    }

    async fn signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl: Duration,
    ) -> Result<String, BackendError> {
        if !self.has_object(bucket, path) {
            return Err(BackendError::ObjectNotFound {
                bucket: bucket.to_string(),
                path: path.to_string(),
            });
        }
        Ok(format!(
            "{}/storage/v1/object/sign/{}/{}?token={}&expires_in={}",
            self.base_url.trim_end_matches('/'),
            bucket,
            path,
            Uuid::new_v4().simple(),
            ttl.as_secs()
        ))
    }

    async fn remove(&self, bucket: &str, paths: Vec<String>) -> Result<(), BackendError> {
        let mut inner = self.lock();
        for path in paths {
            inner.objects.remove(&(bucket.to_string(), path));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let mut inner = self.lock();
        let user = match inner.users.get(email) {
            Some((stored, user)) if stored == password => user.clone(),
            _ => {
                return Err(BackendError::Api {
                    status: 400,
                    message: "Invalid login credentials".to_string(),
                })
            }
        };

        let access_token = Uuid::new_v4().simple().to_string();
        inner.sessions.insert(access_token.clone(), user.clone());

        Ok(Session {
            access_token,
            refresh_token: None,
            expires_in: Some(3600),
            user,
        })
    }

    async fn current_user(&self, access_token: &str) -> Result<Option<AuthUser>, BackendError> {
        Ok(self.lock().sessions.get(access_token).cloned())
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        self.lock().sessions.remove(access_token);
        Ok(())
    }
}
