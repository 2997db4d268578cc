//! 分类、类型、初始化和后台首页接口

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::error;

use super::model::{
    Category, DashboardCounts, NewCategory, NewProductType, ProductType, ProductTypeQuery,
};
use crate::app::AppState;
use crate::core::error::CoreError;
use crate::core::middleware::CurrentUser;
use crate::core::response::ApiResponse;

fn created_status(created: bool) -> StatusCode {
    if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Category>>>, CoreError> {
    let categories = state.catalog.categories().await?;
    Ok(Json(ApiResponse::success(categories)))
}

/// 同名分类已存在时返回 200 和已有的分类
pub async fn create_category(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(input): Json<NewCategory>,
) -> Result<(StatusCode, Json<ApiResponse<Category>>), CoreError> {
    let (category, created) = state.catalog.add_category(&input.name).await?;
    Ok((created_status(created), Json(ApiResponse::success(category))))
}

pub async fn list_product_types(
    State(state): State<AppState>,
    Query(query): Query<ProductTypeQuery>,
) -> Result<Json<ApiResponse<Vec<ProductType>>>, CoreError> {
    let types = state.catalog.product_types(query.category_id).await?;
    Ok(Json(ApiResponse::success(types)))
}

pub async fn create_product_type(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(input): Json<NewProductType>,
) -> Result<(StatusCode, Json<ApiResponse<ProductType>>), CoreError> {
    let (product_type, created) = state
        .catalog
        .add_product_type(&input.name, input.category_id)
        .await?;
    Ok((created_status(created), Json(ApiResponse::success(product_type))))
}

/// 初始化默认分类和类型，失败时返回 `{success: false, error}`
pub async fn seed(State(state): State<AppState>) -> Response {
    match state.catalog.seed().await {
        Ok(report) => Json(json!({
            "success": true,
            "message": "Database seeded successfully",
            "added_categories": report.added_categories,
            "added_types": report.added_types,
        }))
        .into_response(),
        Err(e) => {
            error!("初始化失败: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn dashboard(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<DashboardCounts>>, CoreError> {
    let counts = state.catalog.dashboard_counts().await?;
    Ok(Json(ApiResponse::success(counts)))
}
