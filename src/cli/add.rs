use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::db::{Catalog, NewProduct, SqliteCatalog};
use crate::utils;

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    /// 商品名称
    pub name: String,
    /// 商品图片，会复制到配置目录的 uploads 中
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

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let catalog = SqliteCatalog::open(opts.conf_dir.database()).await?;

        let image = match &self.image {
            Some(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("读取图片失败: {}", path.display()))?;
                let stored = utils::store_image(opts.conf_dir.path(), &bytes)?;
                info!("图片已保存: {}", stored);
                Some(stored)
            }
            None => None,
        };

        let id = catalog
            .insert(NewProduct {
                name: self.name.clone(),
                category: self.category.clone(),
                brand: self.brand.clone(),
                price: self.price,
                stock: self.stock,
                image,
            })
            .await?;

        println!("{}", id);
        Ok(())
    }
}
