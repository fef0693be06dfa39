use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::ConfDir;
use crate::db::CatalogImage;
use crate::orb::{DescriptorSet, OrbExtractor};

/// 参考图片，重建索引时创建，之后不再修改
#[derive(Debug, Clone)]
pub struct ReferenceEntry {
    /// 商品 ID
    pub id: i64,
    pub name: String,
    pub category: Option<String>,
    pub brand: Option<String>,
    /// 图片的实际路径
    pub image: PathBuf,
    pub descriptors: DescriptorSet,
}

/// 重建索引的统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RebuildStats {
    /// 目录中带图片的商品数量
    pub total: usize,
    /// 成功加入索引的数量
    pub indexed: usize,
    /// 因图片缺失、无法读取或没有特征点而跳过的数量
    pub skipped: usize,
}

/// 参考图片索引
///
/// 读取方拿到的是某一次重建结果的快照，重建时先在旁边构建新集合，
/// 完成后一次性替换，读取方不会看到构建到一半的索引
#[derive(Default)]
pub struct ReferenceIndex {
    entries: RwLock<Arc<[ReferenceEntry]>>,
    rebuild: Mutex<()>,
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取当前索引的快照
    pub fn snapshot(&self) -> Arc<[ReferenceEntry]> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 使用目录快照重建索引，完全替换旧的索引
    ///
    /// 图片缺失、无法读取或提取不到特征点的商品会被跳过，不视为错误
    pub fn rebuild(
        &self,
        records: Vec<CatalogImage>,
        conf_dir: &ConfDir,
        orb: &OrbExtractor,
    ) -> RebuildStats {
        let _guard = self.rebuild.lock().unwrap_or_else(PoisonError::into_inner);
        let start = Instant::now();
        let total = records.len();

        let entries: Vec<ReferenceEntry> = records
            .into_par_iter()
            .filter_map(|record| {
                let image = conf_dir.resolve(&record.image);
                let descriptors = match orb.detect_file(&image) {
                    Ok((_, descriptors)) => descriptors,
                    Err(e) => {
                        warn!("跳过无法读取的图片: {} ({}): {}", record.id, image.display(), e);
                        return None;
                    }
                };
                if descriptors.is_empty() {
                    debug!("跳过没有特征点的图片: {} ({})", record.id, image.display());
                    return None;
                }
                Some(ReferenceEntry {
                    id: record.id,
                    name: record.name,
                    category: record.category,
                    brand: record.brand,
                    image,
                    descriptors,
                })
            })
            .collect();

        let stats = RebuildStats { total, indexed: entries.len(), skipped: total - entries.len() };
        self.publish(entries);

        info!(
            "索引重建完成: {} 张参考图片，跳过 {} 张，耗时 {:.2}s",
            stats.indexed,
            stats.skipped,
            start.elapsed().as_secs_f32()
        );
        stats
    }

    /// 直接替换索引内容
    pub fn publish(&self, entries: Vec<ReferenceEntry>) {
        let entries: Arc<[ReferenceEntry]> = entries.into();
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = entries;
    }
}
