//! 核心响应处理模块

use serde::Serialize;
use uuid::Uuid;

/// API 响应结构
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub request_id: String,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            request_id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// 表单提交成功后的结果
///
/// 页面据此显示提示，并在 `delay_ms` 之后跳回列表。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitOutcome {
    pub id: Uuid,
    pub message: String,
    pub redirect: String,
    pub delay_ms: u64,
}
