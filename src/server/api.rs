use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_typed_multipart::TypedMultipart;
use log::info;
use tokio::task::block_in_place;

use super::error::Result;
use super::state::AppState;
use super::types::*;
use crate::db::{Catalog, NewProduct, Product};
use crate::index::RebuildStats;
use crate::recognizer::RecognizeError;
use crate::{metrics, utils};

/// 识别上传的图片
#[utoipa::path(
    post,
    path = "/identify",
    request_body(content = IdentifyForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = IdentifyResponse),
        (status = 400, description = "无法解码图片"),
        (status = 409, description = "匹配到的商品已被删除，需要重建索引"),
        (status = 504, description = "匹配超时"),
    )
)]
pub async fn identify_handler(
    State(state): State<Arc<AppState>>,
    data: TypedMultipart<IdentifyRequest>,
) -> Result<Json<IdentifyResponse>> {
    info!("正在识别上传图片: {} 字节", data.image.len());
    let result = block_in_place(|| state.recognizer.match_bytes(&data.image))?;
    let identification = state.recognizer.hydrate(result).await?;
    Ok(Json(identification.into()))
}

/// 识别 base64 编码的图片
#[utoipa::path(
    post,
    path = "/identify/base64",
    request_body = Base64Request,
    responses(
        (status = 200, body = IdentifyResponse),
        (status = 400, description = "无法解码图片"),
    )
)]
pub async fn identify_base64_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<Base64Request>,
) -> Result<Json<IdentifyResponse>> {
    let bytes = state.recognizer.decode_image_data(&data.image)?;
    info!("正在识别 base64 图片: {} 字节", bytes.len());
    let result = block_in_place(|| state.recognizer.match_bytes(&bytes))?;
    let identification = state.recognizer.hydrate(result).await?;
    Ok(Json(identification.into()))
}

/// 从商品目录重建参考索引
#[utoipa::path(
    post,
    path = "/reindex",
    responses(
        (status = 200, body = RebuildStats),
    )
)]
pub async fn reindex_handler(State(state): State<Arc<AppState>>) -> Result<Json<RebuildStats>> {
    let stats = state.recognizer.reindex().await?;
    Ok(Json(stats))
}

/// 列出所有商品
#[utoipa::path(
    get,
    path = "/products",
    responses(
        (status = 200, body = Vec<Product>),
    )
)]
pub async fn list_products_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Product>>> {
    let products = state.recognizer.catalog().list().await?;
    Ok(Json(products))
}

/// 添加商品，上传的图片会作为参考图片加入索引
#[utoipa::path(
    post,
    path = "/products",
    request_body(content = AddProductForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, body = Product),
        (status = 400, description = "无法识别图片格式"),
    )
)]
pub async fn add_product_handler(
    State(state): State<Arc<AppState>>,
    TypedMultipart(data): TypedMultipart<AddProductRequest>,
) -> Result<impl IntoResponse> {
    let recognizer = &state.recognizer;
    let image = store_upload(&state, data.image.as_deref())?;

    let id = recognizer
        .add_product(NewProduct {
            name: data.name,
            category: data.category,
            brand: data.brand,
            price: data.price,
            stock: data.stock,
            image,
        })
        .await?;

    let product = recognizer
        .catalog()
        .get(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("商品 {} 添加后无法读取", id))?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// 修改商品，上传新图片时替换原有的参考图片
#[utoipa::path(
    put,
    path = "/products/{id}",
    params(("id" = i64, Path, description = "商品 ID")),
    request_body(content = AddProductForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = Product),
        (status = 400, description = "无法识别图片格式"),
        (status = 404, description = "商品不存在"),
    )
)]
pub async fn update_product_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    TypedMultipart(data): TypedMultipart<UpdateProductRequest>,
) -> Result<Response> {
    let recognizer = &state.recognizer;
    let image = store_upload(&state, data.image.as_deref())?;

    let product = NewProduct {
        name: data.name,
        category: data.category,
        brand: data.brand,
        price: data.price,
        stock: data.stock,
        image,
    };
    if !recognizer.update_product(id, product).await? {
        return Ok(StatusCode::NOT_FOUND.into_response());
    }

    let product = recognizer
        .catalog()
        .get(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("商品 {} 修改后无法读取", id))?;
    Ok(Json(product).into_response())
}

/// 检查上传的图片格式并保存到 uploads 目录
fn store_upload(state: &AppState, bytes: Option<&[u8]>) -> Result<Option<String>> {
    let Some(bytes) = bytes else {
        return Ok(None);
    };
    image::guess_format(bytes).map_err(RecognizeError::from)?;
    let stored = block_in_place(|| utils::store_image(state.recognizer.conf_dir().path(), bytes))?;
    Ok(Some(stored))
}

/// 删除商品
#[utoipa::path(
    delete,
    path = "/products/{id}",
    params(("id" = i64, Path, description = "商品 ID")),
    responses(
        (status = 204, description = "已删除"),
        (status = 404, description = "商品不存在"),
    )
)]
pub async fn remove_product_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    if state.recognizer.remove_product(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

/// prometheus 指标
#[utoipa::path(
    get,
    path = "/metrics",
    responses((status = 200, description = "文本格式的指标", content_type = "text/plain"))
)]
pub async fn metrics_handler() -> Result<impl IntoResponse> {
    let body = metrics::gather_text()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
