use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::{Opts, OrbOptions, OutputFormat};
use crate::db::SqliteCatalog;
use crate::matcher::Matcher;
use crate::recognizer::Recognizer;

/// 重建索引，用于检查目录中有哪些图片能够参与识别
#[derive(Parser, Debug, Clone)]
pub struct ReindexCommand {
    #[command(flatten)]
    pub orb: OrbOptions,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
    /// 同时列出每张参考图片的描述符数量
    #[arg(short, long)]
    pub verbose: bool,
}

impl SubCommandExtend for ReindexCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let catalog = SqliteCatalog::open(opts.conf_dir.database()).await?;
        let recognizer =
            Recognizer::new(catalog, opts.conf_dir.clone(), self.orb.clone(), Matcher::default());
        let stats = recognizer.reindex().await?;

        match self.output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
            OutputFormat::Table => {
                println!("total\t{}", stats.total);
                println!("indexed\t{}", stats.indexed);
                println!("skipped\t{}", stats.skipped);
            }
        }

        if self.verbose {
            for entry in recognizer.index().snapshot().iter() {
                println!("{}\t{}\t{}", entry.id, entry.descriptors.len(), entry.image.display());
            }
        }
        Ok(())
    }
}
