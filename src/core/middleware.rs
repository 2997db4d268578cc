//! 核心中间件模块

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::error::CoreError;
use crate::config::AuthConfig;
use crate::infrastructure::backend::{AuthProvider, AuthUser};

/// 请求日志中间件
pub async fn request_logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let user_agent = req
        .headers()
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    let response = next.run(req).await;
    let status = response.status();
    let duration = start.elapsed();

    info!(
        "{} {} - {} - {}ms - User-Agent: {:?}",
        method,
        uri,
        status,
        duration.as_millis(),
        user_agent
    );

    response
}

/// 访问控制所需的状态
#[derive(Clone)]
pub struct AccessGate {
    pub auth: Arc<dyn AuthProvider>,
    pub config: AuthConfig,
}

/// 访问控制判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    Redirect(String),
}

/// 根据路径和登录状态决定放行还是跳转
pub fn gate_decision(path: &str, signed_in: bool, config: &AuthConfig) -> GateDecision {
    if !signed_in && path.starts_with(&config.admin_prefix) {
        return GateDecision::Redirect(config.login_path.clone());
    }
    if signed_in && path == config.login_path {
        return GateDecision::Redirect(config.admin_prefix.clone());
    }
    GateDecision::Pass
}

/// 从 cookie 或 `Authorization: Bearer` 中取出访问令牌
pub fn access_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty());

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    })
}

/// 访问控制中间件
///
/// 每个请求都通过认证服务确认当前用户，查到的用户放进请求扩展，
/// 由 [`CurrentUser`] 取出。
pub async fn access_gate(State(gate): State<AccessGate>, mut req: Request, next: Next) -> Response {
    let user = match access_token(req.headers(), &gate.config.cookie_name) {
        Some(token) => match gate.auth.current_user(&token).await {
            Ok(user) => user,
            Err(e) => {
                warn!("无法确认当前用户: {}", e);
                None
            }
        },
        None => None,
    };

    let path = req.uri().path().to_string();
    match gate_decision(&path, user.is_some(), &gate.config) {
        GateDecision::Redirect(to) => {
            debug!("{} -> {}", path, to);
            Redirect::temporary(&to).into_response()
        }
        GateDecision::Pass => {
            if let Some(user) = user {
                req.extensions_mut().insert(user);
            }
            next.run(req).await
        }
    }
}

/// 已登录用户提取器，没有用户时返回 401
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthUser);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = CoreError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or(CoreError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_gate_decision() {
        let config = AuthConfig::default();

        assert_eq!(
            gate_decision("/dashboard/products", false, &config),
            GateDecision::Redirect("/login".to_string())
        );
        assert_eq!(
            gate_decision("/login", true, &config),
            GateDecision::Redirect("/dashboard".to_string())
        );
        assert_eq!(gate_decision("/login", false, &config), GateDecision::Pass);
        assert_eq!(gate_decision("/dashboard", true, &config), GateDecision::Pass);
        assert_eq!(gate_decision("/api/products", false, &config), GateDecision::Pass);
    }

    #[test]
    fn test_access_token_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(access_token(&headers, "sb-access-token"), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(access_token(&headers, "sb-access-token"), Some("abc".to_string()));

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; sb-access-token=xyz"),
        );
        assert_eq!(access_token(&headers, "sb-access-token"), Some("xyz".to_string()));
    }
}
