mod common;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::GrayImage;
use prodmatch::config::{ConfDir, OrbOptions};
use prodmatch::db::{CatalogImage, NewProduct, Product};
use prodmatch::{
    Catalog, Matcher, MemoryCatalog, NoMatchReason, OrbExtractor, RecognizeError, Recognizer,
};
use rstest::*;
use tempfile::TempDir;

use common::*;

struct Shop {
    dir: TempDir,
    recognizer: Recognizer<MemoryCatalog>,
}

impl Shop {
    /// 保存参考图片并添加商品
    async fn add(&self, name: &str, image: &GrayImage) -> i64 {
        let file = format!("{name}.png");
        image.save(self.dir.path().join(&file)).unwrap();
        self.recognizer
            .add_product(NewProduct {
                name: name.to_string(),
                category: Some("Cuidado personal".to_string()),
                image: Some(file),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    fn indexed_ids(&self) -> BTreeSet<i64> {
        self.recognizer.index().snapshot().iter().map(|e| e.id).collect()
    }
}

#[fixture]
fn shop() -> Shop {
    let dir = tempfile::tempdir().unwrap();
    let recognizer = Recognizer::new(
        MemoryCatalog::new(),
        ConfDir::new(dir.path()),
        orb_options(),
        Matcher::default(),
    );
    Shop { dir, recognizer }
}

#[rstest]
#[case::identical(textured(1, 256, 256))]
#[case::brighter(brighten(&textured(1, 256, 256), 15))]
#[case::shifted(shifted(&textured(1, 256, 256), 4, 4))]
#[tokio::test]
async fn identify_bottle_not_box(shop: Shop, #[case] query: GrayImage) {
    let bottle = shop.add("bottle", &textured(1, 256, 256)).await;
    let cream_box = shop.add("box", &textured(2, 256, 256)).await;
    assert_ne!(bottle, cream_box);

    let result = shop.recognizer.identify(&png_bytes(&query)).await.unwrap();
    assert!(result.matched);
    assert!(result.score >= 20);
    let product = result.product.unwrap();
    assert_eq!(product.id, bottle);
    assert_eq!(product.name, "bottle");
    assert_eq!(product.category.as_deref(), Some("Cuidado personal"));

    // 另一件商品的分数严格更低
    let (_, descriptors) = shop.recognizer.extractor().detect_image(query);
    let entries = shop.recognizer.index().snapshot();
    let scores = Matcher::default().score_all(&descriptors, &entries).unwrap();
    assert_eq!(scores.len(), 2);
    assert!(scores[0] > scores[1]);
}

#[rstest]
#[tokio::test]
async fn identical_query_scores_near_descriptor_count(shop: Shop) {
    let image = textured(7, 256, 256);
    let id = shop.add("perfume", &image).await;

    let entries = shop.recognizer.index().snapshot();
    assert_eq!(entries.len(), 1);
    let count = entries[0].descriptors.len();

    let result = shop.recognizer.identify(&png_bytes(&image)).await.unwrap();
    assert_eq!(result.product.map(|p| p.id), Some(id));
    assert!(result.score <= count);
    assert!(result.score * 10 >= count * 9, "score {} of {}", result.score, count);
}

#[rstest]
#[tokio::test]
async fn blank_query_is_not_a_match(shop: Shop) {
    shop.add("bottle", &textured(1, 256, 256)).await;

    let result = shop.recognizer.identify(&png_bytes(&blank(256, 256))).await.unwrap();
    assert!(!result.matched);
    assert_eq!(result.score, 0);
    assert_eq!(result.product, None);
    assert_eq!(result.reason, Some(NoMatchReason::TooFewDescriptors));
}

#[rstest]
#[tokio::test]
async fn unknown_product_reports_score(shop: Shop) {
    shop.add("bottle", &textured(1, 256, 256)).await;

    let result = shop.recognizer.identify(&png_bytes(&textured(3, 256, 256))).await.unwrap();
    assert!(!result.matched);
    assert!(result.score < 20);
    assert_eq!(result.reason, Some(NoMatchReason::BelowThreshold));
}

#[rstest]
#[tokio::test]
async fn empty_index_is_not_a_match(shop: Shop) {
    let result = shop.recognizer.identify(&png_bytes(&textured(1, 256, 256))).await.unwrap();
    assert!(!result.matched);
    assert_eq!(result.score, 0);
    assert_eq!(result.reason, Some(NoMatchReason::EmptyIndex));
}

#[rstest]
#[tokio::test]
async fn removing_image_removes_candidate(shop: Shop) {
    let bottle = shop.add("bottle", &textured(1, 256, 256)).await;
    let cream_box = shop.add("box", &textured(2, 256, 256)).await;
    assert_eq!(shop.indexed_ids(), BTreeSet::from([bottle, cream_box]));

    assert!(shop.recognizer.set_product_image(bottle, None).await.unwrap());
    assert_eq!(shop.indexed_ids(), BTreeSet::from([cream_box]));

    let result = shop.recognizer.identify(&png_bytes(&textured(1, 256, 256))).await.unwrap();
    assert!(!result.matched);

    assert!(shop.recognizer.remove_product(cream_box).await.unwrap());
    assert!(shop.recognizer.index().is_empty());
    assert!(!shop.recognizer.remove_product(cream_box).await.unwrap());
}

#[rstest]
#[tokio::test]
async fn stale_reference_is_reported(shop: Shop) {
    let bottle = shop.add("bottle", &textured(1, 256, 256)).await;

    // 绕过识别服务直接删除，索引中仍保留旧的参考图片
    assert!(shop.recognizer.catalog().remove(bottle).await.unwrap());

    let err = shop.recognizer.identify(&png_bytes(&textured(1, 256, 256))).await.unwrap_err();
    assert!(matches!(err, RecognizeError::StaleReference(id) if id == bottle));

    shop.recognizer.reindex().await.unwrap();
    let result = shop.recognizer.identify(&png_bytes(&textured(1, 256, 256))).await.unwrap();
    assert_eq!(result.reason, Some(NoMatchReason::EmptyIndex));
}

#[rstest]
#[tokio::test]
async fn invalid_image_is_decode_error(shop: Shop) {
    let err = shop.recognizer.identify(b"definitely not an image").await.unwrap_err();
    assert!(matches!(err, RecognizeError::Decode(_)));

    let err = shop.recognizer.identify_base64("data:image/png;base64,???").await.unwrap_err();
    assert!(matches!(err, RecognizeError::Base64(_)));
}

#[rstest]
#[case::plain("")]
#[case::data_url("data:image/png;base64,")]
#[tokio::test]
async fn identify_base64(shop: Shop, #[case] prefix: &str) {
    let bottle = shop.add("bottle", &textured(1, 256, 256)).await;

    let data = format!("{}{}", prefix, STANDARD.encode(png_bytes(&textured(1, 256, 256))));
    let result = shop.recognizer.identify_base64(&data).await.unwrap();
    assert_eq!(result.product.map(|p| p.id), Some(bottle));
}

#[rstest]
#[tokio::test]
async fn rebuild_is_idempotent(shop: Shop) {
    shop.add("bottle", &textured(1, 256, 256)).await;
    shop.add("box", &textured(2, 256, 256)).await;
    // 没有图片的商品不进入索引
    shop.recognizer
        .add_product(NewProduct { name: "gift card".to_string(), ..Default::default() })
        .await
        .unwrap();

    let first = shop.recognizer.reindex().await.unwrap();
    let ids = shop.indexed_ids();
    let second = shop.recognizer.reindex().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.total, 2);
    assert_eq!(first.indexed, 2);
    assert_eq!(shop.indexed_ids(), ids);
}

#[rstest]
#[tokio::test]
async fn unreadable_reference_is_skipped(shop: Shop) {
    let bottle = shop.add("bottle", &textured(1, 256, 256)).await;
    std::fs::remove_file(shop.dir.path().join("bottle.png")).unwrap();
    shop.add("box", &textured(2, 256, 256)).await;

    let stats = shop.recognizer.reindex().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.skipped, 1);
    assert!(!shop.indexed_ids().contains(&bottle));
}

#[rstest]
#[tokio::test]
async fn concurrent_rebuild_and_match(shop: Shop) {
    shop.add("bottle", &textured(1, 256, 256)).await;
    shop.add("box", &textured(2, 256, 256)).await;

    let full = shop.recognizer.catalog().snapshot().await.unwrap();
    let partial = full[..1].to_vec();
    let query = png_bytes(&textured(2, 256, 256));
    let recognizer = &shop.recognizer;

    std::thread::scope(|s| {
        s.spawn(|| {
            for i in 0..6 {
                let snapshot = if i % 2 == 0 { partial.clone() } else { full.clone() };
                recognizer.rebuild(snapshot);
            }
        });
        s.spawn(|| {
            for _ in 0..6 {
                let entries = recognizer.index().snapshot();
                let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
                assert!(ids == vec![full[0].id] || ids == vec![full[0].id, full[1].id]);
                recognizer.match_bytes(&query).unwrap();
            }
        });
    });

    recognizer.rebuild(full.clone());
    assert_eq!(shop.indexed_ids().len(), 2);
}

#[rstest]
#[case::few_features(500)]
#[case::default_features(OrbOptions::default().orb_nfeatures)]
fn distinct_products_stay_below_threshold(#[case] nfeatures: u32) {
    let orb =
        OrbExtractor::create(OrbOptions { orb_nfeatures: nfeatures, ..OrbOptions::default() });
    let matcher = Matcher::default();

    let (_, bottle) = orb.detect_image(textured(1, 256, 256));
    let (_, cream_box) = orb.detect_image(textured(2, 256, 256));
    assert!(bottle.len() > 400, "only {} descriptors", bottle.len());

    let score = matcher.count_good_matches(&bottle, &cream_box);
    assert!(score < matcher.min_good_matches, "distinct products scored {score}");

    let (_, photo) = orb.detect_image(brighten(&textured(1, 256, 256), 15));
    assert!(matcher.count_good_matches(&bottle, &photo) >= matcher.min_good_matches);
}

#[rstest]
#[tokio::test]
async fn update_product_is_visible_to_identify(shop: Shop) {
    let bottle = shop.add("bottle", &textured(1, 256, 256)).await;
    shop.add("box", &textured(2, 256, 256)).await;

    let renamed = NewProduct {
        name: "bottle 250ml".to_string(),
        brand: Some("Natura".to_string()),
        ..Default::default()
    };
    assert!(shop.recognizer.update_product(bottle, renamed).await.unwrap());
    let result = shop.recognizer.identify(&png_bytes(&textured(1, 256, 256))).await.unwrap();
    let product = result.product.unwrap();
    assert_eq!(product.id, bottle);
    assert_eq!(product.name, "bottle 250ml");
    assert_eq!(product.brand.as_deref(), Some("Natura"));

    // 替换图片后旧图片不再匹配，新图片匹配到同一件商品
    textured(3, 256, 256).save(shop.dir.path().join("bottle-v2.png")).unwrap();
    let new_image = NewProduct {
        name: "bottle 250ml".to_string(),
        image: Some("bottle-v2.png".to_string()),
        ..Default::default()
    };
    assert!(shop.recognizer.update_product(bottle, new_image).await.unwrap());
    let result = shop.recognizer.identify(&png_bytes(&textured(1, 256, 256))).await.unwrap();
    assert!(!result.matched);
    let result = shop.recognizer.identify(&png_bytes(&textured(3, 256, 256))).await.unwrap();
    assert_eq!(result.product.map(|p| p.id), Some(bottle));

    let missing = NewProduct { name: "ghost".to_string(), ..Default::default() };
    assert!(!shop.recognizer.update_product(9999, missing).await.unwrap());
}

/// 读取快照较慢的目录，开启后只有下一次读取会变慢
struct SlowCatalog {
    inner: MemoryCatalog,
    slow: AtomicBool,
}

impl Catalog for SlowCatalog {
    async fn snapshot(&self) -> anyhow::Result<Vec<CatalogImage>> {
        let snapshot = self.inner.snapshot().await?;
        if self.slow.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        Ok(snapshot)
    }

    async fn get(&self, id: i64) -> anyhow::Result<Option<Product>> {
        self.inner.get(id).await
    }

    async fn list(&self) -> anyhow::Result<Vec<Product>> {
        self.inner.list().await
    }

    async fn insert(&self, product: NewProduct) -> anyhow::Result<i64> {
        self.inner.insert(product).await
    }

    async fn update(&self, id: i64, product: NewProduct) -> anyhow::Result<bool> {
        self.inner.update(id, product).await
    }

    async fn set_image(&self, id: i64, image: Option<String>) -> anyhow::Result<bool> {
        self.inner.set_image(id, image).await
    }

    async fn remove(&self, id: i64) -> anyhow::Result<bool> {
        self.inner.remove(id).await
    }
}

#[tokio::test]
async fn older_reindex_does_not_overwrite_newer_one() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = SlowCatalog { inner: MemoryCatalog::new(), slow: AtomicBool::new(false) };
    let recognizer =
        Recognizer::new(catalog, ConfDir::new(dir.path()), orb_options(), Matcher::default());

    textured(1, 256, 256).save(dir.path().join("bottle.png")).unwrap();
    let bottle = recognizer
        .add_product(NewProduct {
            name: "bottle".to_string(),
            image: Some("bottle.png".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(recognizer.index().len(), 1);

    // 第一次重建读到的快照仍包含商品，删除发生在它发布之前
    recognizer.catalog().slow.store(true, Ordering::SeqCst);
    let (first, removed) = tokio::join!(recognizer.reindex(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        recognizer.remove_product(bottle).await
    });
    assert_eq!(first.unwrap().indexed, 1);
    assert!(removed.unwrap());

    assert!(recognizer.index().is_empty());
    let result = recognizer.identify(&png_bytes(&textured(1, 256, 256))).await.unwrap();
    assert_eq!(result.reason, Some(NoMatchReason::EmptyIndex));
}
