mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::error::AppError;
pub use self::state::*;
pub use self::types::IdentifyResponse;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::identify_handler,
        api::identify_base64_handler,
        api::reindex_handler,
        api::list_products_handler,
        api::add_product_handler,
        api::update_product_handler,
        api::remove_product_handler,
        api::metrics_handler,
    ),
    components(schemas(
        types::IdentifyForm,
        types::Base64Request,
        types::IdentifyResponse,
        types::AddProductForm,
        crate::db::Product,
        crate::index::RebuildStats,
        crate::matcher::NoMatchReason,
    ))
)]
pub struct ApiDoc;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/identify", post(api::identify_handler))
        .route("/identify/base64", post(api::identify_base64_handler))
        .route("/reindex", post(api::reindex_handler))
        .route("/products", get(api::list_products_handler).post(api::add_product_handler))
        .route(
            "/products/{id}",
            delete(api::remove_product_handler).put(api::update_product_handler),
        )
        .route("/metrics", get(api::metrics_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        // 上传限制：10M
        .layer(RequestBodyLimitLayer::new(1024 * 1024 * 10))
        .with_state(state)
}
