use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::{Opts, OutputFormat};
use crate::db::{Catalog, SqliteCatalog};

#[derive(Parser, Debug, Clone)]
pub struct ListCommand {
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for ListCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let catalog = SqliteCatalog::open(opts.conf_dir.database()).await?;
        let products = catalog.list().await?;

        match self.output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&products)?),
            OutputFormat::Table => {
                for p in &products {
                    println!(
                        "{}\t{}\t{}\t{}\t{}",
                        p.id,
                        p.name,
                        p.category.as_deref().unwrap_or("-"),
                        p.brand.as_deref().unwrap_or("-"),
                        p.image.as_deref().unwrap_or("-"),
                    );
                }
            }
        }
        Ok(())
    }
}
