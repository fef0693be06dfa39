use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;

use super::{Catalog, CatalogImage, NewProduct, Product};

/// 内存中的商品目录，进程退出后数据丢失
#[derive(Default)]
pub struct MemoryCatalog {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    products: BTreeMap<i64, Product>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Catalog for MemoryCatalog {
    async fn snapshot(&self) -> Result<Vec<CatalogImage>> {
        Ok(self
            .lock()
            .products
            .values()
            .filter_map(|p| {
                let image = p.image.clone().filter(|s| !s.is_empty())?;
                Some(CatalogImage {
                    id: p.id,
                    name: p.name.clone(),
                    category: p.category.clone(),
                    brand: p.brand.clone(),
                    image,
                })
            })
            .collect())
    }

    async fn get(&self, id: i64) -> Result<Option<Product>> {
        Ok(self.lock().products.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Product>> {
        Ok(self.lock().products.values().rev().cloned().collect())
    }

    async fn insert(&self, product: NewProduct) -> Result<i64> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.products.insert(
            id,
            Product {
                id,
                name: product.name,
                category: product.category,
                brand: product.brand,
                price: product.price,
                stock: product.stock,
                image: product.image,
                created_at: String::new(),
            },
        );
        Ok(id)
    }

    async fn update(&self, id: i64, product: NewProduct) -> Result<bool> {
        let mut inner = self.lock();
        let Some(record) = inner.products.get_mut(&id) else {
            return Ok(false);
        };
        record.name = product.name;
        record.category = product.category;
        record.brand = product.brand;
        record.price = product.price;
        record.stock = product.stock;
        Ok(true)
    }

    async fn set_image(&self, id: i64, image: Option<String>) -> Result<bool> {
        let mut inner = self.lock();
        let Some(record) = inner.products.get_mut(&id) else {
            return Ok(false);
        };
        record.image = image;
        Ok(true)
    }

    async fn remove(&self, id: i64) -> Result<bool> {
        Ok(self.lock().products.remove(&id).is_some())
    }
}
