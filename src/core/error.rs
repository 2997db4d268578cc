//! 核心错误处理模块

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};
use validator::ValidationErrors;

use crate::infrastructure::backend::BackendError;

/// 表单校验提示之间的分隔符
pub const MESSAGE_SEPARATOR: &str = " • ";

/// 核心错误类型
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// 表单校验失败，按字段顺序排列的提示
    #[error("{}", .0.join(MESSAGE_SEPARATOR))]
    Validation(Vec<String>),

    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("{0}")]
    Internal(String),
}

/// 错误响应结构
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    pub timestamp: String,
}

impl CoreError {
    pub fn status(&self) -> StatusCode {
        match self {
            CoreError::Validation(_) | CoreError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Backend(BackendError::NotFound { .. }) => StatusCode::NOT_FOUND,
            CoreError::Backend(_) | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("请求失败: {}", self);
        } else {
            warn!("请求被拒绝 ({}): {}", status.as_u16(), self);
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: status.as_u16(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

/// 按给定字段顺序取出校验提示
///
/// 同一字段可能有多条提示，全部保留。不在 `order` 中的字段排在最后。
pub fn validation_messages(errors: &ValidationErrors, order: &[&str]) -> Vec<String> {
    let field_errors = errors.field_errors();

    let mut fields: Vec<&str> = order
        .iter()
        .copied()
        .filter(|f| field_errors.contains_key(*f))
        .collect();
    let mut rest: Vec<&str> = field_errors
        .keys()
        .map(|k| &**k)
        .filter(|k| !order.contains(k))
        .collect();
    rest.sort_unstable();
    fields.extend(rest);

    fields
        .into_iter()
        .filter_map(|field| field_errors.get(field))
        .flat_map(|errs| errs.iter())
        .map(|e| {
            e.message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| e.code.to_string())
        })
        .collect()
}

impl From<ValidationErrors> for CoreError {
    fn from(errors: ValidationErrors) -> Self {
        CoreError::Validation(validation_messages(&errors, &[]))
    }
}
