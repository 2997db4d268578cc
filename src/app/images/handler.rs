//! 图片解析接口

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;

use super::resolver::ResolvedImage;
use crate::app::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ImageQuery {
    pub raw: Option<String>,
}

pub async fn resolve_image(
    State(state): State<AppState>,
    Query(query): Query<ImageQuery>,
) -> Json<ResolvedImage> {
    Json(state.images.resolve(query.raw.as_deref()).await)
}

/// 图片加载失败后调用，只重试一次签名地址
pub async fn recover_image(
    State(state): State<AppState>,
    Query(query): Query<ImageQuery>,
) -> Json<ResolvedImage> {
    Json(state.images.recover(query.raw.as_deref()).await)
}
