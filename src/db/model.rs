use serde::Serialize;
use utoipa::ToSchema;

/// 商品记录
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow, ToSchema)]
pub struct Product {
    /// 商品 ID
    pub id: i64,
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
    /// 参考图片路径，相对路径以配置目录为基准
    pub image: Option<String>,
    /// 入库时间
    pub created_at: String,
}

/// 建立索引所需的商品信息，只包含有图片的商品
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct CatalogImage {
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub image: String,
}

/// 新增或修改商品时使用的字段
#[derive(Debug, Clone, Default)]
pub struct NewProduct {
    pub name: String,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub image: Option<String>,
}
