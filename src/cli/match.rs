use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{MatchOptions, Opts, OrbOptions};
use crate::matcher::Matcher;
use crate::orb::OrbExtractor;

#[derive(Parser, Debug, Clone)]
pub struct MatchCommand {
    #[command(flatten)]
    pub orb: OrbOptions,
    #[command(flatten)]
    pub matching: MatchOptions,
    /// 参考图片
    pub image1: PathBuf,
    /// 查询图片
    pub image2: PathBuf,
}

impl SubCommandExtend for MatchCommand {
    async fn run(&self, _opts: &Opts) -> Result<()> {
        let orb = OrbExtractor::create(self.orb.clone());
        let matcher = Matcher::from(&self.matching);

        let (des1, des2, good) = block_in_place(|| -> Result<_> {
            let (_, des1) = orb.detect_file(&self.image1)?;
            let (_, des2) = orb.detect_file(&self.image2)?;
            let good = matcher.count_good_matches(&des1, &des2);
            Ok((des1, des2, good))
        })?;

        println!("descriptors\t{}\t{}", des1.len(), des2.len());
        println!("good matches\t{}", good);
        println!("confirmed\t{}", good >= matcher.min_good_matches);
        Ok(())
    }
}
