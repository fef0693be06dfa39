use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressIterator};
use log::info;
use rayon::prelude::*;
use regex::Regex;
use tokio::task::block_in_place;
use walkdir::WalkDir;

use crate::cli::SubCommandExtend;
use crate::config::{Opts, OrbOptions};
use crate::db::{Catalog, NewProduct, SqliteCatalog};
use crate::orb::OrbExtractor;
use crate::utils::{self, pb_style};

#[derive(Parser, Debug, Clone)]
pub struct ImportCommand {
    #[command(flatten)]
    pub orb: OrbOptions,
    /// 图片所在目录
    pub path: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,png,webp")]
    pub suffix: String,
    /// 使用正则表达式从图片路径生成商品名称，默认使用文件名
    /// 例：--replace '.*/(?<name>[^/]+)\.jpg' '$name'
    #[arg(short, long, value_names = ["REGEX", "REPLACE"], num_args = 2, verbatim_doc_comment)]
    pub replace: Vec<String>,
    /// 导入商品的分类
    #[arg(long)]
    pub category: Option<String>,
    /// 导入商品的品牌
    #[arg(long)]
    pub brand: Option<String>,
    /// 最少特征点，低于该值的图片会被跳过
    #[arg(short, long, default_value_t = 10)]
    pub min_keypoints: usize,
}

/// 已保存到 uploads 的图片
struct Prepared {
    path: String,
    stored: String,
}

impl SubCommandExtend for ImportCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let re_suf = Regex::new(&format!("(?i)^({})$", self.suffix.replace(',', "|")))?;
        let replace = match self.replace.as_slice() {
            [re, rep] => Some((Regex::new(re)?, rep.clone())),
            _ => None,
        };

        let catalog = SqliteCatalog::open(opts.conf_dir.database()).await?;
        let orb = OrbExtractor::create(self.orb.clone());

        let entries = scan_directory(&self.path, &re_suf);
        info!("扫描完成，共 {} 张图片", entries.len());

        let pb = ProgressBar::new(entries.len() as u64).with_style(pb_style());
        let prepared: Vec<Prepared> = block_in_place(|| {
            entries
                .par_iter()
                .progress_with(pb.clone())
                .filter_map(|entry| {
                    prepare(entry, &orb, opts.conf_dir.path(), self.min_keypoints, &pb)
                })
                .collect()
        });
        pb.finish_with_message("特征点检查完成");

        let (mut added, mut skipped) = (0, 0);
        for item in prepared {
            if catalog.contains_image(&item.stored).await? {
                skipped += 1;
                continue;
            }
            let name = match &replace {
                Some((re, rep)) => re.replace(&item.path, rep.as_str()).into_owned(),
                None => file_stem(&item.path),
            };
            catalog
                .insert(NewProduct {
                    name,
                    category: self.category.clone(),
                    brand: self.brand.clone(),
                    image: Some(item.stored),
                    ..Default::default()
                })
                .await?;
            added += 1;
        }

        info!("导入完成: 新增 {} 个商品，跳过 {} 张重复图片", added, skipped);
        println!("added: {}, skipped: {}", added, skipped);
        Ok(())
    }
}

fn scan_directory(path: &Path, re_suf: &Regex) -> Vec<PathBuf> {
    info!("开始扫描目录: {}", path.display());
    let pb = ProgressBar::no_length().with_style(pb_style());
    let mut entries: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .progress_with(pb)
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.is_file()
                && path.extension().is_some_and(|ext| re_suf.is_match(&ext.to_string_lossy()))
        })
        .collect();
    entries.sort();
    entries
}

/// 检查图片的特征点数量，通过后保存到 uploads
fn prepare(
    entry: &Path,
    orb: &OrbExtractor,
    conf_dir: &Path,
    min_keypoints: usize,
    pb: &ProgressBar,
) -> Option<Prepared> {
    let path = entry.to_string_lossy().to_string();
    let bytes = match std::fs::read(entry) {
        Ok(bytes) => bytes,
        Err(e) => {
            pb.println(format!("读取图片失败: {}: {}", path, e));
            return None;
        }
    };
    let descriptors = match orb.detect_bytes(&bytes) {
        Ok((_, descriptors)) => descriptors,
        Err(e) => {
            pb.println(format!("计算特征点失败: {}: {}", path, e));
            return None;
        }
    };
    if descriptors.len() < min_keypoints {
        pb.println(format!("特征点少于 {}: {}", min_keypoints, path));
        return None;
    }
    match utils::store_image(conf_dir, &bytes) {
        Ok(stored) => Some(Prepared { path, stored }),
        Err(e) => {
            pb.println(format!("保存图片失败: {}: {}", path, e));
            None
        }
    }
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}
