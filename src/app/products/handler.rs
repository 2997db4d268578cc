//! 产品接口

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use uuid::Uuid;

use super::form::{FormOptions, ImageUpload, ProductFields, ProductForm};
use super::list::filter_products;
use super::model::{CreatedProduct, ProductCard, ProductFilter};
use super::service::CreateProductRequest;
use crate::app::images::resolver::ResolvedImage;
use crate::app::{AppState, FormMode};
use crate::core::error::CoreError;
use crate::core::middleware::CurrentUser;
use crate::core::response::{ApiResponse, SubmitOutcome};

/// 读取 multipart 表单，`image` 字段作为文件，其余作为文本
async fn read_multipart(mut multipart: Multipart) -> Result<CreateProductRequest, CoreError> {
    let mut request = CreateProductRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CoreError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let file_name = field.file_name().unwrap_or("image").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| CoreError::BadRequest(e.to_string()))?;
            if !bytes.is_empty() {
                request.image = Some(ImageUpload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| CoreError::BadRequest(e.to_string()))?;
            request.fields.insert(name, value);
        }
    }

    Ok(request)
}

fn fill_form(form: &mut ProductForm, request: CreateProductRequest) {
    form.apply_fields(&request.fields);
    if let Some(upload) = request.image {
        form.set_image(upload);
    }
}

pub async fn create_product(
    State(state): State<AppState>,
    user: Option<CurrentUser>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<CreatedProduct>), CoreError> {
    let request = read_multipart(multipart).await?;
    let created = state
        .products
        .create_from_api(request, user.is_some())
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<ApiResponse<Vec<ProductCard>>>, CoreError> {
    let list = state.products.list().await?;
    let cards = filter_products(&list, &filter).into_iter().cloned().collect();
    Ok(Json(ApiResponse::success(cards)))
}

#[derive(Debug, Serialize)]
pub struct DraftResponse {
    pub progress: u8,
    pub errors: Vec<String>,
}

/// 只计算完成度和校验提示，不访问后端
pub async fn draft_product(multipart: Multipart) -> Result<Json<DraftResponse>, CoreError> {
    let mut form = ProductForm::new();
    fill_form(&mut form, read_multipart(multipart).await?);

    Ok(Json(DraftResponse {
        progress: form.progress(),
        errors: form.errors(),
    }))
}

#[derive(Debug, Serialize)]
pub struct EditFormView {
    pub mode: FormMode,
    pub fields: ProductFields,
    pub skin_types: Vec<String>,
    pub concerns: Vec<String>,
    pub existing_image: Option<String>,
    pub image_display: ResolvedImage,
    pub progress: u8,
    pub options: FormOptions,
}

pub async fn edit_form(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<EditFormView>>, CoreError> {
    let product = state.products.get(id).await?;
    let form = ProductForm::edit(&product);
    let image_display = state.images.resolve(form.existing_image()).await;
    let options = FormOptions::load(state.products.catalog()).await?;

    Ok(Json(ApiResponse::success(EditFormView {
        mode: form.mode(),
        progress: form.progress(),
        existing_image: form.existing_image().map(str::to_string),
        fields: form.fields,
        skin_types: form.skin_types,
        concerns: form.concerns,
        image_display,
        options,
    })))
}

pub async fn update_product(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<SubmitOutcome>>, CoreError> {
    let product = state.products.get(id).await?;
    let mut form = ProductForm::edit(&product);
    fill_form(&mut form, read_multipart(multipart).await?);

    let outcome = form.submit(&state.products).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub id: Uuid,
}

pub async fn delete_product(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Deleted>>, CoreError> {
    state.products.delete(id).await?;
    Ok(Json(ApiResponse::success(Deleted { id })))
}

#[derive(Debug, Serialize)]
pub struct FeaturedState {
    pub id: Uuid,
    pub featured: bool,
}

pub async fn toggle_featured(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<FeaturedState>>, CoreError> {
    let featured = state.products.toggle_featured(id).await?;
    Ok(Json(ApiResponse::success(FeaturedState { id, featured })))
}
