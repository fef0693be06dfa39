use std::future::Future;
use std::path::Path;

use anyhow::Result;
use log::info;
use sqlx::{SqlitePool, sqlite::*};

pub mod crud;
mod memory;
pub mod model;

pub use memory::MemoryCatalog;
pub use model::*;

pub type Database = SqlitePool;

pub async fn init_db(filename: impl AsRef<Path>) -> Result<Database, sqlx::Error> {
    let filename = filename.as_ref();
    info!("初始化数据库连接: {}", filename.display());

    let options = SqliteConnectOptions::new()
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .filename(filename)
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;

    info!("检查数据库迁移");
    sqlx::migrate!().run(&pool).await?;

    Ok(pool)
}

/// 商品目录，识别服务通过它读取参考图片和商品信息
pub trait Catalog: Send + Sync + 'static {
    /// 所有带图片的商品，用于重建索引
    fn snapshot(&self) -> impl Future<Output = Result<Vec<CatalogImage>>> + Send;
    /// 根据 ID 获取完整的商品信息
    fn get(&self, id: i64) -> impl Future<Output = Result<Option<Product>>> + Send;
    fn list(&self) -> impl Future<Output = Result<Vec<Product>>> + Send;
    fn insert(&self, product: NewProduct) -> impl Future<Output = Result<i64>> + Send;
    /// 修改商品信息，不涉及图片，商品不存在时返回 false
    fn update(&self, id: i64, product: NewProduct) -> impl Future<Output = Result<bool>> + Send;
    /// 设置或清除商品图片，商品不存在时返回 false
    fn set_image(&self, id: i64, image: Option<String>)
    -> impl Future<Output = Result<bool>> + Send;
    /// 删除商品，商品不存在时返回 false
    fn remove(&self, id: i64) -> impl Future<Output = Result<bool>> + Send;
}

/// 基于 SQLite 的商品目录
#[derive(Clone)]
pub struct SqliteCatalog {
    db: Database,
}

impl SqliteCatalog {
    /// 打开数据库，不存在时自动创建
    pub async fn open(filename: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = filename.as_ref().parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let db = init_db(filename).await?;
        Ok(Self { db })
    }

    pub fn pool(&self) -> &Database {
        &self.db
    }

    /// 检查图片是否已被某个商品使用
    pub async fn contains_image(&self, image: &str) -> Result<bool> {
        Ok(crud::check_image(&self.db, image).await?)
    }
}

impl Catalog for SqliteCatalog {
    async fn snapshot(&self) -> Result<Vec<CatalogImage>> {
        Ok(crud::list_product_images(&self.db).await?)
    }

    async fn get(&self, id: i64) -> Result<Option<Product>> {
        Ok(crud::get_product(&self.db, id).await?)
    }

    async fn list(&self) -> Result<Vec<Product>> {
        Ok(crud::list_products(&self.db).await?)
    }

    async fn insert(&self, product: NewProduct) -> Result<i64> {
        Ok(crud::add_product(&self.db, &product).await?)
    }

    async fn update(&self, id: i64, product: NewProduct) -> Result<bool> {
        Ok(crud::update_product(&self.db, id, &product).await?)
    }

    async fn set_image(&self, id: i64, image: Option<String>) -> Result<bool> {
        Ok(crud::set_product_image(&self.db, id, image.as_deref()).await?)
    }

    async fn remove(&self, id: i64) -> Result<bool> {
        Ok(crud::remove_product(&self.db, id).await?)
    }
}
