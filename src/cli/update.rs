use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::db::{Catalog, NewProduct, SqliteCatalog};
use crate::utils;

#[derive(Parser, Debug, Clone)]
pub struct UpdateCommand {
    /// 商品 ID
    pub id: i64,
    /// 商品名称
    #[arg(long)]
    pub name: Option<String>,
    /// 替换商品图片
    #[arg(short, long)]
    pub image: Option<PathBuf>,
    /// 分类
    #[arg(long)]
    pub category: Option<String>,
    /// 品牌
    #[arg(long)]
    pub brand: Option<String>,
    /// 价格
    #[arg(long)]
    pub price: Option<f64>,
    /// 库存
    #[arg(long)]
    pub stock: Option<i64>,
}

impl SubCommandExtend for UpdateCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let catalog = SqliteCatalog::open(opts.conf_dir.database()).await?;
        let product =
            catalog.get(self.id).await?.ok_or_else(|| anyhow!("商品不存在: {}", self.id))?;

        // 未指定的字段保持原值
        let updated = NewProduct {
            name: self.name.clone().unwrap_or(product.name),
            category: self.category.clone().or(product.category),
            brand: self.brand.clone().or(product.brand),
            price: self.price.or(product.price),
            stock: self.stock.or(product.stock),
            image: None,
        };
        catalog.update(self.id, updated).await?;

        if let Some(path) = &self.image {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("读取图片失败: {}", path.display()))?;
            let stored = utils::store_image(opts.conf_dir.path(), &bytes)?;
            info!("图片已保存: {}", stored);
            catalog.set_image(self.id, Some(stored)).await?;
        }

        println!("{}", self.id);
        Ok(())
    }
}
