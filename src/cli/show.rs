use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::{Opts, OrbOptions};
use crate::orb::OrbExtractor;
use crate::utils;

#[derive(Parser, Debug, Clone)]
pub struct ShowCommand {
    #[command(flatten)]
    pub orb: OrbOptions,
    /// 图片路径
    pub image: PathBuf,
    /// 输出文件
    #[arg(default_value = "keypoints.png")]
    pub output: PathBuf,
}

impl SubCommandExtend for ShowCommand {
    async fn run(&self, _opts: &Opts) -> Result<()> {
        let image = utils::imread(&self.image, self.orb.max_size)?;

        let orb = OrbExtractor::create(self.orb.clone());
        let (kps, _) = orb.detect_and_compute(&image);
        info!("检测到 {} 个特征点", kps.len());

        let output = utils::draw_keypoints(&image, &kps);
        output.save(&self.output)?;
        Ok(())
    }
}
