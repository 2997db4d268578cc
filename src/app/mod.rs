//! 应用层：表单、列表、图片解析和 HTTP 路由

pub mod auth;
pub mod catalog;
pub mod images;
pub mod ingredients;
pub mod list;
pub mod products;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::config::Config;
use crate::core::middleware::{access_gate, request_logging_middleware, AccessGate};
use crate::infrastructure::backend::Backend;
use catalog::CatalogService;
use images::ImageResolver;
use ingredients::IngredientService;
use products::ProductService;

/// 表单模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "id", rename_all = "lowercase")]
pub enum FormMode {
    Create,
    Edit(Uuid),
}

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub backend: Backend,
    pub images: ImageResolver,
    pub catalog: CatalogService,
    pub products: ProductService,
    pub ingredients: IngredientService,
}

impl AppState {
    pub fn new(config: Config, backend: Backend) -> Self {
        let images = ImageResolver::new(backend.storage.clone(), config.storage.clone());
        let catalog = CatalogService::new(backend.clone());
        let products = ProductService::new(
            backend.clone(),
            config.storage.clone(),
            images.clone(),
            catalog.clone(),
        );
        let ingredients = IngredientService::new(backend.clone());

        Self {
            config: Arc::new(config),
            backend,
            images,
            catalog,
            products,
            ingredients,
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// 构建路由
pub fn router(state: AppState) -> Router {
    let gate = AccessGate {
        auth: state.backend.auth.clone(),
        config: state.config.auth.clone(),
    };
    let timeout = Duration::from_secs(state.config.server.timeout_seconds);
    let body_limit = state.config.server.max_upload_bytes;

    let api = Router::new()
        .route(
            "/products",
            post(products::handler::create_product).get(products::handler::list_products),
        )
        .route("/products/draft", post(products::handler::draft_product))
        .route("/products/:id/form", get(products::handler::edit_form))
        .route(
            "/products/:id",
            axum::routing::put(products::handler::update_product)
                .delete(products::handler::delete_product),
        )
        .route(
            "/products/:id/featured",
            patch(products::handler::toggle_featured),
        )
        .route(
            "/categories",
            get(catalog::handler::list_categories).post(catalog::handler::create_category),
        )
        .route(
            "/product-types",
            get(catalog::handler::list_product_types)
                .post(catalog::handler::create_product_type),
        )
        .route("/seed", get(catalog::handler::seed))
        .route(
            "/ingredients",
            get(ingredients::handler::list_ingredients)
                .post(ingredients::handler::create_ingredient),
        )
        .route(
            "/ingredients/draft",
            post(ingredients::handler::draft_ingredient),
        )
        .route(
            "/ingredients/:id",
            get(ingredients::handler::get_ingredient)
                .put(ingredients::handler::update_ingredient)
                .delete(ingredients::handler::delete_ingredient),
        )
        .route("/images/resolve", get(images::handler::resolve_image))
        .route("/images/recover", get(images::handler::recover_image));

    let login_path = state.config.auth.login_path.clone();
    let admin_prefix = state.config.auth.admin_prefix.clone();

    Router::new()
        .nest("/api", api)
        .route(
            &login_path,
            get(auth::handler::login_page).post(auth::handler::login),
        )
        .route("/logout", post(auth::handler::logout))
        .route(&admin_prefix, get(catalog::handler::dashboard))
        .route("/health", get(health))
        .layer(middleware::from_fn_with_state(gate, access_gate))
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(TimeoutLayer::new(timeout)),
        )
        .with_state(state)
}
