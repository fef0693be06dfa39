mod common;

use std::path::Path;
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::*;

use common::*;

macro_rules! cargo_run {
    ($cmd:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin($cmd)?;
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

/// 生成两件商品的参考图片和一张空白图片
fn write_images(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir.join("catalog"))?;
    textured(1, 256, 256).save(dir.join("catalog/bottle.png"))?;
    textured(2, 256, 256).save(dir.join("catalog/box.png"))?;
    brighten(&textured(1, 256, 256), 10).save(dir.join("query.png"))?;
    blank(256, 256).save(dir.join("blank.png"))?;
    Ok(())
}

#[test]
fn add_list_identify() -> Result<()> {
    let conf_dir = assert_fs::TempDir::new()?;
    let c = conf_dir.path();
    write_images(c)?;
    let bottle = c.join("catalog/bottle.png");
    let cream_box = c.join("catalog/box.png");

    cargo_run!("prodmatch", "-c", c, "add", "bottle", "--image", &bottle, "--price", "45")
        .success()
        .stdout("1\n");
    cargo_run!("prodmatch", "-c", c, "add", "box", "--image", &cream_box).success();

    cargo_run!("prodmatch", "-c", c, "list")
        .success()
        .stdout(predicate::str::contains("bottle").and(predicate::str::contains("uploads/")));

    cargo_run!("prodmatch", "-c", c, "identify", "-n", "500", c.join("query.png"))
        .success()
        .stdout(predicate::str::contains("\t1\tbottle"));

    cargo_run!("prodmatch", "-c", c, "identify", "-n", "500", c.join("blank.png"))
        .success()
        .stdout(predicate::str::contains("too_few_descriptors"));

    cargo_run!("prodmatch", "-c", c, "remove", "1").success();
    cargo_run!("prodmatch", "-c", c, "identify", "--output-format", "json", c.join("query.png"))
        .success()
        .stdout(predicate::str::contains("\"matched\": false"));

    Ok(())
}

#[test]
fn import_directory() -> Result<()> {
    let conf_dir = assert_fs::TempDir::new()?;
    write_images(conf_dir.path())?;
    let c = conf_dir.path();
    let catalog = c.join("catalog");

    cargo_run!("prodmatch", "-c", c, "import", "-n", "500", &catalog)
        .success()
        .stdout(predicate::str::contains("added: 2, skipped: 0"));
    // 重复导入时跳过已有图片
    cargo_run!("prodmatch", "-c", c, "import", "-n", "500", &catalog)
        .success()
        .stdout(predicate::str::contains("added: 0, skipped: 2"));

    cargo_run!("prodmatch", "-c", c, "reindex", "-n", "500", "--output-format", "json")
        .success()
        .stdout(predicate::str::contains("\"indexed\": 2"));

    cargo_run!("prodmatch", "-c", c, "identify", "-n", "500", c.join("query.png"))
        .success()
        .stdout(predicate::str::contains("bottle"));

    Ok(())
}

#[rstest]
#[case::same_product("catalog/bottle.png", "query.png", "confirmed\ttrue")]
#[case::different_product("catalog/bottle.png", "catalog/box.png", "confirmed\tfalse")]
fn match_two_images(
    #[case] image1: &str,
    #[case] image2: &str,
    #[case] expected: &str,
) -> Result<()> {
    let dir = assert_fs::TempDir::new()?;
    let d = dir.path();
    write_images(d)?;

    cargo_run!("prodmatch", "-c", d, "match", "-n", "500", d.join(image1), d.join(image2))
        .success()
        .stdout(predicate::str::contains(expected));

    Ok(())
}

#[test]
fn show_keypoints() -> Result<()> {
    let dir = assert_fs::TempDir::new()?;
    write_images(dir.path())?;
    let output = dir.path().join("keypoints.png");

    cargo_run!("prodmatch", "-c", dir.path(), "show", dir.path().join("query.png"), &output)
        .success();
    assert!(output.is_file());

    Ok(())
}

#[test]
fn invalid_image_fails() -> Result<()> {
    let dir = assert_fs::TempDir::new()?;
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"garbage")?;

    cargo_run!("prodmatch", "-c", dir.path(), "identify", &path).failure();

    Ok(())
}

#[test]
fn update_product() -> Result<()> {
    let conf_dir = assert_fs::TempDir::new()?;
    let c = conf_dir.path();
    write_images(c)?;

    cargo_run!("prodmatch", "-c", c, "add", "bottle", "--brand", "Natura").success();
    let image = c.join("catalog/bottle.png");
    cargo_run!("prodmatch", "-c", c, "update", "1", "--name", "bottle 250ml", "-i", &image)
        .success()
        .stdout("1\n");

    cargo_run!("prodmatch", "-c", c, "list", "--output-format", "json")
        .success()
        .stdout(
            predicate::str::contains("bottle 250ml")
                .and(predicate::str::contains("Natura"))
                .and(predicate::str::contains("uploads/")),
        );

    cargo_run!("prodmatch", "-c", c, "identify", "-n", "500", c.join("query.png"))
        .success()
        .stdout(predicate::str::contains("\t1\tbottle 250ml"));

    cargo_run!("prodmatch", "-c", c, "update", "42", "--name", "ghost").failure();

    Ok(())
}
