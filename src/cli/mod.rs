mod add;
mod identify;
mod import;
mod list;
mod r#match;
mod reindex;
mod remove;
pub mod server;
mod show;
mod update;

pub use add::*;
pub use identify::*;
pub use import::*;
pub use list::*;
pub use r#match::*;
pub use reindex::*;
pub use remove::*;
pub use server::*;
pub use show::*;
pub use update::*;

use crate::config::{MatchOptions, Opts, OrbOptions};
use crate::db::SqliteCatalog;
use crate::matcher::Matcher;
use crate::recognizer::Recognizer;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// 打开商品目录并加载参考索引
async fn open_recognizer(
    opts: &Opts,
    orb: &OrbOptions,
    matching: &MatchOptions,
) -> anyhow::Result<Recognizer<SqliteCatalog>> {
    let catalog = SqliteCatalog::open(opts.conf_dir.database()).await?;
    let recognizer =
        Recognizer::new(catalog, opts.conf_dir.clone(), orb.clone(), Matcher::from(matching));
    recognizer.reindex().await?;
    Ok(recognizer)
}
