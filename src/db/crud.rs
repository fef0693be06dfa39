use sqlx::{Executor, Result, Sqlite};

use super::{CatalogImage, NewProduct, Product};

const PRODUCT_COLUMNS: &str = "id, name, category, brand, price, stock, image, created_at";

/// 添加商品，返回商品 ID
pub async fn add_product<'c, E>(executor: E, product: &NewProduct) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO product (name, category, brand, price, stock, image)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&product.name)
    .bind(&product.category)
    .bind(&product.brand)
    .bind(product.price)
    .bind(product.stock)
    .bind(&product.image)
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

/// 修改商品的基本信息，不修改图片
pub async fn update_product<'c, E>(executor: E, id: i64, product: &NewProduct) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE product SET name = ?, category = ?, brand = ?, price = ?, stock = ?
        WHERE id = ?
        "#,
    )
    .bind(&product.name)
    .bind(&product.category)
    .bind(&product.brand)
    .bind(product.price)
    .bind(product.stock)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// 设置或清除商品图片
pub async fn set_product_image<'c, E>(executor: E, id: i64, image: Option<&str>) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE product SET image = ? WHERE id = ?")
        .bind(image)
        .bind(id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// 删除商品
pub async fn remove_product<'c, E>(executor: E, id: i64) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM product WHERE id = ?").bind(id).execute(executor).await?;

    Ok(result.rows_affected() > 0)
}

/// 根据 ID 获取商品
pub async fn get_product<'c, E>(executor: E, id: i64) -> Result<Option<Product>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, Product>(&format!("SELECT {PRODUCT_COLUMNS} FROM product WHERE id = ?"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// 按 ID 倒序列出所有商品
pub async fn list_products<'c, E>(executor: E) -> Result<Vec<Product>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, Product>(&format!("SELECT {PRODUCT_COLUMNS} FROM product ORDER BY id DESC"))
        .fetch_all(executor)
        .await
}

/// 获取所有带图片的商品，按 ID 升序
pub async fn list_product_images<'c, E>(executor: E) -> Result<Vec<CatalogImage>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, CatalogImage>(
        r#"
        SELECT id, name, category, brand, image FROM product
        WHERE image IS NOT NULL AND image != ''
        ORDER BY id ASC
        "#,
    )
    .fetch_all(executor)
    .await
}

/// 检查图片是否已被某个商品使用
pub async fn check_image<'c, E>(executor: E, image: &str) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product WHERE image = ?")
        .bind(image)
        .fetch_one(executor)
        .await?;

    Ok(count > 0)
}
