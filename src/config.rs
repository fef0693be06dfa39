use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;

use crate::cli::*;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let proj_dirs =
        ProjectDirs::from("", "prodmatch", "prodmatch").expect("failed to get project dir");
    ConfDir { path: proj_dirs.config_dir().to_path_buf() }
});

fn default_config_dir() -> &'static str {
    CONF_DIR.path().to_str().unwrap_or(".")
}

#[derive(Parser, Debug, Clone)]
pub struct OrbOptions {
    /// ORB 特征点最大保留数量
    #[arg(short = 'n', value_name = "N", long, default_value_t = 2000)]
    pub orb_nfeatures: u32,
    /// ORB 特征金字塔缩放因子
    #[arg(long, value_name = "SCALE", default_value_t = 1.2)]
    pub orb_scale_factor: f32,
    /// ORB 特征金字塔层数
    #[arg(long, value_name = "N", default_value_t = 8)]
    pub orb_nlevels: u32,
    /// FAST 角点检测阈值
    #[arg(long, value_name = "THRESHOLD", default_value_t = 20)]
    pub orb_fast_threshold: u8,
    /// 图片最大尺寸，如果宽高**均**超过这个尺寸，则等比缩放
    #[arg(short = 'S', long, value_name = "WIDTHxHEIGHT", value_parser = parse_size, verbatim_doc_comment, default_value = "1080x768")]
    pub max_size: (u32, u32),
}

impl Default for OrbOptions {
    fn default() -> Self {
        Self {
            orb_nfeatures: 2000,
            orb_scale_factor: 1.2,
            orb_nlevels: 8,
            orb_fast_threshold: 20,
            max_size: (1080, 768),
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct MatchOptions {
    /// 两个描述符被视为对应点的最大汉明距离（不含），范围从 0 到 256
    #[arg(long, value_name = "N", default_value_t = 60, value_parser = clap::value_parser!(u32).range(0..=256))]
    pub max_distance: u32,
    /// 不限制对应点的距离，只要互为最近邻即可
    #[arg(long)]
    pub no_distance_cutoff: bool,
    /// 确认匹配所需的最少对应点数量
    #[arg(long, value_name = "N", default_value_t = 20)]
    pub min_good_matches: usize,
    /// 查询图片最少需要的描述符数量，低于该值直接判定为无匹配
    #[arg(long, value_name = "N", default_value_t = 10)]
    pub min_query_descriptors: usize,
    /// 不进行交叉验证
    #[arg(long)]
    pub no_cross_check: bool,
    /// 单线程扫描参考图片
    #[arg(long)]
    pub no_parallel: bool,
    /// 单次识别的超时时间，单位为毫秒
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            max_distance: 60,
            no_distance_cutoff: false,
            min_good_matches: 20,
            min_query_descriptors: 10,
            no_cross_check: false,
            no_parallel: false,
            timeout_ms: None,
        }
    }
}

impl MatchOptions {
    pub fn max_distance(&self) -> Option<u32> {
        (!self.no_distance_cutoff).then_some(self.max_distance)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "prodmatch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// prodmatch 配置文件目录
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 添加一个商品到目录
    Add(AddCommand),
    /// 批量导入目录中的图片作为商品
    Import(ImportCommand),
    /// 修改目录中的商品
    Update(UpdateCommand),
    /// 从目录中删除商品
    Remove(RemoveCommand),
    /// 列出目录中的所有商品
    List(ListCommand),
    /// 识别一张图片中的商品
    Identify(IdentifyCommand),
    /// 重建参考索引并输出统计信息
    Reindex(ReindexCommand),
    /// 计算两张图片之间的对应点数量
    Match(MatchCommand),
    /// 绘制图片的特征点
    Show(ShowCommand),
    /// 启动 HTTP 识别服务
    Server(ServerCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回商品目录数据库的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("catalog.db")
    }

    /// 返回上传图片的保存目录
    pub fn uploads(&self) -> PathBuf {
        self.path.join("uploads")
    }

    /// 将商品记录中的图片路径解析为绝对路径，相对路径以配置目录为基准
    pub fn resolve(&self, image: &str) -> PathBuf {
        let image = Path::new(image);
        if image.is_absolute() { image.to_path_buf() } else { self.path.join(image) }
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

fn parse_size(s: &str) -> anyhow::Result<(u32, u32)> {
    let parts: Vec<&str> = s.split('x').collect();
    if parts.len() != 2 {
        return Err(anyhow::anyhow!("无效的尺寸: {}", s));
    }
    Ok((parts[0].parse()?, parts[1].parse()?))
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1080x768").unwrap(), (1080, 768));
        assert!(parse_size("1080").is_err());
        assert!(parse_size("axb").is_err());
    }

    #[test]
    fn test_max_distance_cutoff() {
        let mut opts = MatchOptions::default();
        assert_eq!(opts.max_distance(), Some(60));
        opts.no_distance_cutoff = true;
        assert_eq!(opts.max_distance(), None);
    }

    #[test]
    fn test_resolve_image_path() {
        let conf = ConfDir::new("/tmp/prodmatch");
        assert_eq!(conf.resolve("uploads/a.png"), PathBuf::from("/tmp/prodmatch/uploads/a.png"));
        assert_eq!(conf.resolve("/data/b.png"), PathBuf::from("/data/b.png"));
    }

    #[test]
    fn test_parse_cli_defaults() {
        let opts = Opts::parse_from(["prodmatch", "-c", "/tmp/x", "identify", "a.jpg"]);
        assert_eq!(opts.conf_dir.path(), Path::new("/tmp/x"));
        match opts.subcmd {
            SubCommand::Identify(cmd) => {
                assert_eq!(cmd.matching.max_distance, 60);
                assert_eq!(cmd.matching.min_good_matches, 20);
                assert_eq!(cmd.orb.orb_nfeatures, 2000);
            }
            _ => panic!("unexpected subcommand"),
        }
    }
}
