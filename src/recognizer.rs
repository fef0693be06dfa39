use std::sync::Arc;
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{debug, info};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::{ConfDir, OrbOptions};
use crate::db::{Catalog, CatalogImage, NewProduct, Product};
use crate::index::{RebuildStats, ReferenceIndex};
use crate::matcher::{MatchError, Matcher, NoMatchReason};
use crate::orb::{Descriptor, OrbExtractor};
use crate::{metrics, utils};

#[derive(Debug, Error)]
pub enum RecognizeError {
    #[error("无法解码图片: {0}")]
    Decode(#[from] image::ImageError),
    #[error("无法解码 base64 数据: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("商品 {0} 已不在目录中，请重建索引")]
    StaleReference(i64),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("商品目录错误: {0}")]
    Catalog(#[from] anyhow::Error),
}

/// 匹配结果，只包含商品 ID
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub id: Option<i64>,
    /// 最高分，没有匹配时同样给出
    pub score: usize,
    pub reason: Option<NoMatchReason>,
}

/// 识别结果，匹配成功时带有完整的商品信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identification {
    pub matched: bool,
    pub score: usize,
    #[serde(flatten)]
    pub product: Option<Product>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<NoMatchReason>,
}

/// 商品识别服务
///
/// 持有商品目录和参考索引，目录发生变化时同步重建索引
pub struct Recognizer<C> {
    catalog: C,
    index: Arc<ReferenceIndex>,
    /// 读取目录快照到发布索引之间持有，保证后读取的快照后发布
    reindexing: Mutex<()>,
    orb: OrbExtractor,
    matcher: Matcher,
    conf_dir: ConfDir,
}

impl<C: Catalog> Recognizer<C> {
    /// 创建识别服务，索引初始为空，需要调用 [`Recognizer::reindex`] 加载
    pub fn new(catalog: C, conf_dir: ConfDir, orb: OrbOptions, matcher: Matcher) -> Self {
        Self {
            catalog,
            index: Arc::new(ReferenceIndex::new()),
            reindexing: Mutex::new(()),
            orb: OrbExtractor::create(orb),
            matcher,
            conf_dir,
        }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn index(&self) -> &ReferenceIndex {
        &self.index
    }

    pub fn conf_dir(&self) -> &ConfDir {
        &self.conf_dir
    }

    pub fn extractor(&self) -> &OrbExtractor {
        &self.orb
    }

    /// 识别一张图片
    ///
    /// 解码和匹配都在当前线程进行，异步环境中调用方需要自行处理阻塞
    pub async fn identify(&self, bytes: &[u8]) -> Result<Identification, RecognizeError> {
        let result = self.match_bytes(bytes)?;
        self.hydrate(result).await
    }

    /// 识别 base64 编码的图片，支持 `data:image/png;base64,...` 格式
    pub async fn identify_base64(&self, data: &str) -> Result<Identification, RecognizeError> {
        let bytes = self.decode_image_data(data)?;
        self.identify(&bytes).await
    }

    /// 解码 base64 图片数据，失败时计入解码错误
    pub fn decode_image_data(&self, data: &str) -> Result<Vec<u8>, RecognizeError> {
        decode_base64(data).map_err(|e| {
            metrics::inc_decode_error();
            RecognizeError::from(e)
        })
    }

    /// 解码图片并在当前索引中查找最匹配的商品
    pub fn match_bytes(&self, bytes: &[u8]) -> Result<MatchResult, RecognizeError> {
        let start = Instant::now();
        let image = match utils::imdecode(bytes, self.orb.options().max_size) {
            Ok(image) => image,
            Err(e) => {
                metrics::inc_decode_error();
                return Err(e.into());
            }
        };
        let size = image.dimensions();
        let (_, descriptors) = self.orb.detect_and_compute(&image);
        debug!("查询图片 {}x{} 提取到 {} 个描述符", size.0, size.1, descriptors.len());

        let result = self.match_descriptors(&descriptors)?;

        let label = match result.id {
            Some(_) => "matched",
            None => "no_match",
        };
        metrics::observe_identify(size, label, result.score, start.elapsed().as_secs_f32());
        Ok(result)
    }

    /// 在当前索引快照中匹配描述符
    pub fn match_descriptors(&self, descriptors: &[Descriptor]) -> Result<MatchResult, MatchError> {
        let entries = self.index.snapshot();
        let outcome = self.matcher.best_match(descriptors, &entries)?;
        Ok(MatchResult {
            id: outcome.best.map(|i| entries[i].id),
            score: outcome.score,
            reason: outcome.reason,
        })
    }

    /// 从目录中读取匹配到的商品信息
    pub async fn hydrate(&self, result: MatchResult) -> Result<Identification, RecognizeError> {
        let Some(id) = result.id else {
            return Ok(Identification {
                matched: false,
                score: result.score,
                product: None,
                reason: result.reason,
            });
        };
        let product = self.catalog.get(id).await?.ok_or(RecognizeError::StaleReference(id))?;
        info!("识别为商品 {} ({})，分数 {}", product.id, product.name, result.score);
        Ok(Identification {
            matched: true,
            score: result.score,
            product: Some(product),
            reason: None,
        })
    }

    /// 从目录重建索引，目录未变化时结果不变
    ///
    /// 并发调用时依次执行，最后发布的索引一定来自最新的目录快照
    pub async fn reindex(&self) -> Result<RebuildStats, RecognizeError> {
        let _guard = self.reindexing.lock().await;
        let snapshot = self.catalog.snapshot().await?;
        let index = self.index.clone();
        let conf_dir = self.conf_dir.clone();
        let orb = self.orb.clone();
        let stats = tokio::task::spawn_blocking(move || {
            let stats = index.rebuild(snapshot, &conf_dir, &orb);
            metrics::set_index_entries(stats.indexed);
            stats
        })
        .await
        .map_err(|e| RecognizeError::Catalog(e.into()))?;
        Ok(stats)
    }

    /// 使用给定的目录快照同步重建索引
    pub fn rebuild(&self, snapshot: Vec<CatalogImage>) -> RebuildStats {
        let stats = self.index.rebuild(snapshot, &self.conf_dir, &self.orb);
        metrics::set_index_entries(stats.indexed);
        stats
    }

    /// 添加商品并重建索引，返回商品 ID
    pub async fn add_product(&self, product: NewProduct) -> Result<i64, RecognizeError> {
        let has_image = product.image.is_some();
        let id = self.catalog.insert(product).await?;
        info!("添加商品: {}", id);
        if has_image {
            self.reindex().await?;
        }
        Ok(id)
    }

    /// 修改商品信息并重建索引，商品不存在时返回 false
    ///
    /// `product.image` 为空时保留原有图片，否则替换为新图片
    pub async fn update_product(
        &self,
        id: i64,
        product: NewProduct,
    ) -> Result<bool, RecognizeError> {
        let image = product.image.clone();
        if !self.catalog.update(id, product).await? {
            return Ok(false);
        }
        if image.is_some() {
            self.catalog.set_image(id, image).await?;
        }
        info!("修改商品: {}", id);
        self.reindex().await?;
        Ok(true)
    }

    /// 设置或清除商品图片，商品不存在时返回 false
    pub async fn set_product_image(
        &self,
        id: i64,
        image: Option<String>,
    ) -> Result<bool, RecognizeError> {
        let updated = self.catalog.set_image(id, image).await?;
        if updated {
            self.reindex().await?;
        }
        Ok(updated)
    }

    /// 删除商品，商品不存在时返回 false
    pub async fn remove_product(&self, id: i64) -> Result<bool, RecognizeError> {
        let removed = self.catalog.remove(id).await?;
        if removed {
            info!("删除商品: {}", id);
            self.reindex().await?;
        }
        Ok(removed)
    }
}

/// 解码 base64 字符串，如果是 data URL 则只取最后一个逗号之后的部分
pub fn decode_base64(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let payload = match data.rsplit_once(',') {
        Some((_, payload)) => payload,
        None => data,
    };
    STANDARD.decode(payload.trim())
}
