//! 登录与退出接口

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Json, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::AppState;
use crate::core::error::CoreError;
use crate::core::middleware::access_token;
use crate::core::response::ApiResponse;
use crate::infrastructure::backend::AuthUser;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: AuthUser,
    pub redirect: String,
}

fn session_cookie(name: &str, value: &str, max_age: u64) -> Result<HeaderValue, CoreError> {
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name, value, max_age
    ))
    .map_err(|e| CoreError::Internal(e.to_string()))
}

/// 登录页本身不需要内容，已登录用户会被访问控制跳转到后台
pub async fn login_page() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "login": true }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginRequest>,
) -> Result<Response, CoreError> {
    let session = state
        .backend
        .auth
        .sign_in(input.email.trim(), &input.password)
        .await
        .map_err(|e| {
            warn!("登录失败 {}: {}", input.email, e);
            CoreError::BadRequest(e.to_string())
        })?;

    info!("用户已登录: {}", session.user.id);
    let cookie = session_cookie(
        &state.config.auth.cookie_name,
        &session.access_token,
        session.expires_in.unwrap_or(3600),
    )?;

    let body = Json(ApiResponse::success(LoginResponse {
        user: session.user,
        redirect: state.config.auth.admin_prefix.clone(),
    }));
    Ok(([(header::SET_COOKIE, cookie)], body).into_response())
}

/// 退出：尽力注销会话，清除 cookie，跳回登录页
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, CoreError> {
    if let Some(token) = access_token(&headers, &state.config.auth.cookie_name) {
        if let Err(e) = state.backend.auth.sign_out(&token).await {
            warn!("注销会话失败: {}", e);
        }
    }

    let cookie = session_cookie(&state.config.auth.cookie_name, "", 0)?;
    Ok((
        [(header::SET_COOKIE, cookie)],
        Redirect::to(&state.config.auth.login_path),
    )
        .into_response())
}
