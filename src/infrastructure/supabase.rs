//! 托管服务 REST 客户端
//!
//! 行操作走 PostgREST (`/rest/v1`)，对象存储走 `/storage/v1`，认证走 `/auth/v1`。

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::backend::{
    attach_embeds, public_object_url, value_text, AuthProvider, AuthUser, BackendError,
    ObjectStorage, Query, RowStore, Session, Table,
};

/// 托管服务客户端
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    base_url: String,
    api_key: String,
    http: Client,
}

impl SupabaseClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http: Client::new(),
        }
    }

    fn rest_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn storage_url(&self, tail: &str) -> String {
        format!("{}/storage/v1/{}", self.base_url, tail)
    }

    fn auth_url(&self, tail: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, tail)
    }

    /// 以服务密钥身份发送
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    /// 以用户令牌身份发送
    fn as_user(&self, request: RequestBuilder, access_token: &str) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
    }

    /// PostgREST 的 select 参数
    fn select_param(query: &Query) -> String {
        let mut parts: Vec<String> = if query.columns.is_empty() {
            vec!["*".to_string()]
        } else {
            query.columns.clone()
        };
        for embed in &query.embeds {
            let columns = if embed.columns.is_empty() {
                "*".to_string()
            } else {
                embed.columns.join(",")
            };
            parts.push(format!("{}({})", embed.table, columns));
        }
        parts.join(",")
    }

    fn query_params(query: &Query) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), Self::select_param(query))];
        for filter in &query.filters {
            params.push((filter.column.clone(), format!("eq.{}", value_text(&filter.value))));
        }
        if let Some(order) = &query.order {
            let direction = if order.ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
        }
        params
    }
}

/// 把非 2xx 响应转成 [`BackendError::Api`]
async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|key| body.get(key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| {
            if text.is_empty() {
                status.to_string()
            } else {
                text
            }
        });

    Err(BackendError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl RowStore for SupabaseClient {
    async fn select(&self, query: &Query) -> Result<Vec<Value>, BackendError> {
        query.check_columns()?;
        debug!("select {} {:?}", query.table, query.filters);

        let response = self
            .authorized(self.http.get(self.rest_url(query.table)))
            .query(&Self::query_params(query))
            .send()
            .await?;

        let mut rows: Vec<Value> = check(response).await?.json().await?;

        // 服务端已经完成嵌入，只有缺失的关联才需要补齐为 null
        if rows.iter().any(|r| {
            query
                .embeds
                .iter()
                .any(|e| r.get(e.table.as_str()).is_none())
        }) {
            attach_embeds(self, &mut rows, &query.embeds).await?;
        }
        Ok(rows)
    }

    async fn insert(&self, table: Table, rows: Vec<Value>) -> Result<Vec<Value>, BackendError> {
        let response = self
            .authorized(self.http.post(self.rest_url(table)))
            .header("Prefer", "return=representation")
            .json(&rows)
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }

    async fn update(&self, table: Table, id: Uuid, patch: Value) -> Result<Value, BackendError> {
        let response = self
            .authorized(self.http.patch(self.rest_url(table)))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;

        let rows: Vec<Value> = check(response).await?.json().await?;
        rows.into_iter().next().ok_or(BackendError::NotFound {
            table: table.as_str(),
            id,
        })
    }

    async fn delete(&self, table: Table, id: Uuid) -> Result<(), BackendError> {
        let response = self
            .authorized(self.http.delete(self.rest_url(table)))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .send()
            .await?;

        let rows: Vec<Value> = check(response).await?.json().await?;
        if rows.is_empty() {
            return Err(BackendError::NotFound {
                table: table.as_str(),
                id,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

#[async_trait]
impl ObjectStorage for SupabaseClient {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError> {
        let url = self.storage_url(&format!("object/{}/{}", bucket, path));
        let response = self
            .authorized(self.http.post(url))
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }

    async fn public_url(&self, bucket: &str, path: &str) -> Option<String> {
        Some(public_object_url(&self.base_url, bucket, path))
    }

    async fn signed_url(
        &self,
        bucket: &str,
        path: &str,
        ttl: Duration,
    ) -> Result<String, BackendError> {
        let url = self.storage_url(&format!("object/sign/{}/{}", bucket, path));
        let response = self
            .authorized(self.http.post(url))
            .json(&json!({ "expiresIn": ttl.as_secs() }))
            .send()
            .await?;

        let signed: SignedUrlResponse = check(response).await?.json().await?;
        Ok(format!("{}/storage/v1{}", self.base_url, signed.signed_url))
    }

    async fn remove(&self, bucket: &str, paths: Vec<String>) -> Result<(), BackendError> {
        let url = self.storage_url(&format!("object/{}", bucket));
        let response = self
            .authorized(self.http.delete(url))
            .json(&json!({ "prefixes": paths }))
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for SupabaseClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let response = self
            .http
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }

    async fn current_user(&self, access_token: &str) -> Result<Option<AuthUser>, BackendError> {
        let response = self
            .as_user(self.http.get(self.auth_url("user")), access_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            _ => Ok(Some(check(response).await?.json().await?)),
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let response = self
            .as_user(self.http.post(self.auth_url("logout")), access_token)
            .send()
            .await?;

        check(response).await?;
        Ok(())
    }
}
