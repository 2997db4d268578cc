//! 成分接口

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use uuid::Uuid;

use super::form::IngredientForm;
use super::model::{Ingredient, IngredientInput, IngredientQuery};
use crate::app::products::handler::Deleted;
use crate::app::AppState;
use crate::core::error::CoreError;
use crate::core::middleware::CurrentUser;
use crate::core::response::{ApiResponse, SubmitOutcome};

pub async fn list_ingredients(
    State(state): State<AppState>,
    Query(query): Query<IngredientQuery>,
) -> Result<Json<ApiResponse<Vec<Ingredient>>>, CoreError> {
    let list = state.ingredients.list().await?;
    let items = list
        .search(query.search.as_deref().unwrap_or_default())
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(ApiResponse::success(items)))
}

pub async fn get_ingredient(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Ingredient>>, CoreError> {
    let ingredient = state.ingredients.get(id).await?;
    Ok(Json(ApiResponse::success(ingredient)))
}

pub async fn create_ingredient(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(input): Json<IngredientInput>,
) -> Result<(StatusCode, Json<ApiResponse<SubmitOutcome>>), CoreError> {
    let mut form = IngredientForm::new();
    form.apply(&input);
    let outcome = form.submit(&state.ingredients).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(outcome))))
}

#[derive(Debug, Serialize)]
pub struct IngredientDraft {
    pub slug: String,
    pub progress: u8,
    pub errors: Vec<String>,
}

/// 新建表单的实时预览：slug、完成度和校验提示
pub async fn draft_ingredient(Json(input): Json<IngredientInput>) -> Json<IngredientDraft> {
    let mut form = IngredientForm::new();
    form.apply(&input);

    Json(IngredientDraft {
        slug: form.fields().slug.clone(),
        progress: form.progress(),
        errors: form.errors(),
    })
}

pub async fn update_ingredient(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<IngredientInput>,
) -> Result<Json<ApiResponse<SubmitOutcome>>, CoreError> {
    let existing = state.ingredients.get(id).await?;
    let mut form = IngredientForm::edit(&existing);
    form.apply(&input);
    let outcome = form.submit(&state.ingredients).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

pub async fn delete_ingredient(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Deleted>>, CoreError> {
    state.ingredients.delete(id).await?;
    Ok(Json(ApiResponse::success(Deleted { id })))
}
