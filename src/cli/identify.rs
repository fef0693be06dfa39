use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tokio::task::block_in_place;

use crate::cli::{SubCommandExtend, open_recognizer};
use crate::config::{MatchOptions, Opts, OrbOptions, OutputFormat};
use crate::recognizer::Identification;

#[derive(Parser, Debug, Clone)]
pub struct IdentifyCommand {
    #[command(flatten)]
    pub orb: OrbOptions,
    #[command(flatten)]
    pub matching: MatchOptions,
    /// 需要识别的图片路径
    #[arg(required = true)]
    pub images: Vec<PathBuf>,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for IdentifyCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let recognizer = open_recognizer(opts, &self.orb, &self.matching).await?;

        let mut results = vec![];
        for image in &self.images {
            let bytes = tokio::fs::read(image)
                .await
                .with_context(|| format!("读取图片失败: {}", image.display()))?;
            let result = block_in_place(|| recognizer.match_bytes(&bytes))?;
            let identification = recognizer.hydrate(result).await?;
            results.push((image, identification));
        }

        match self.output_format {
            OutputFormat::Json => {
                let value: Vec<_> = results
                    .iter()
                    .map(|(image, result)| json!({ "file": image, "result": result }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            OutputFormat::Table => {
                for (image, result) in &results {
                    println!("{}\t{}", image.display(), format_identification(result));
                }
            }
        }
        Ok(())
    }
}

fn format_identification(result: &Identification) -> String {
    match &result.product {
        Some(product) => format!("{}\t{}\t{}", result.score, product.id, product.name),
        None => {
            let reason = result.reason.map(|r| r.as_str()).unwrap_or_default();
            format!("{}\t-\t无匹配 ({})", result.score, reason)
        }
    }
}
