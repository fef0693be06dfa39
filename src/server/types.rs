use axum::body::Bytes;
use axum_typed_multipart::TryFromMultipart;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::matcher::NoMatchReason;
use crate::recognizer::Identification;

/// 识别请求参数
#[derive(TryFromMultipart)]
pub struct IdentifyRequest {
    pub image: Bytes,
}

/// 识别表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct IdentifyForm {
    /// 上传的图片文件
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub image: String,
}

/// base64 识别请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct Base64Request {
    /// base64 编码的图片，也可以是 `data:image/...;base64,` 开头的 data URL
    pub image: String,
}

/// 识别响应，匹配成功时带有商品信息
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct IdentifyResponse {
    /// 是否找到匹配的商品
    pub matched: bool,
    /// 最高分，即合格对应点的数量
    pub score: usize,
    /// 没有匹配时的原因
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<NoMatchReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl From<Identification> for IdentifyResponse {
    fn from(result: Identification) -> Self {
        let mut response = IdentifyResponse {
            matched: result.matched,
            score: result.score,
            reason: result.reason,
            ..Default::default()
        };
        if let Some(product) = result.product {
            response.id = Some(product.id);
            response.name = Some(product.name);
            response.category = product.category;
            response.brand = product.brand;
            response.price = product.price;
            response.stock = product.stock;
            response.image = product.image;
            response.created_at = Some(product.created_at);
        }
        response
    }
}

/// 添加商品请求参数
#[derive(TryFromMultipart)]
pub struct AddProductRequest {
    pub name: String,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub image: Option<Bytes>,
}

/// 添加商品表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct AddProductForm {
    /// 商品名称
    pub name: String,
    /// 分类
    pub category: Option<String>,
    /// 品牌
    pub brand: Option<String>,
    /// 价格
    pub price: Option<f64>,
    /// 库存
    pub stock: Option<i64>,
    /// 商品图片，作为识别时的参考图片
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub image: Option<String>,
}

/// 修改商品请求参数，未上传图片时保留原有图片
#[derive(TryFromMultipart)]
pub struct UpdateProductRequest {
    pub name: String,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub image: Option<Bytes>,
}
