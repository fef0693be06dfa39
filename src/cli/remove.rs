use anyhow::Result;
use clap::Parser;
use log::warn;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::db::{Catalog, SqliteCatalog};

#[derive(Parser, Debug, Clone)]
pub struct RemoveCommand {
    /// 商品 ID
    #[arg(required = true)]
    pub ids: Vec<i64>,
    /// 只清除商品图片，保留商品记录
    #[arg(long)]
    pub image_only: bool,
}

impl SubCommandExtend for RemoveCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let catalog = SqliteCatalog::open(opts.conf_dir.database()).await?;

        for &id in &self.ids {
            let found = if self.image_only {
                catalog.set_image(id, None).await?
            } else {
                catalog.remove(id).await?
            };
            if found {
                println!("{}", id);
            } else {
                warn!("商品不存在: {}", id);
            }
        }
        Ok(())
    }
}
