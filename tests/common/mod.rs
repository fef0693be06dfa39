#![allow(dead_code)]

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use prodmatch::config::OrbOptions;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 逐像素的随机噪声纹理，灰度值在 0..=200 之间，调亮后不会溢出
///
/// 不同种子生成的图片之间没有共同结构，用来代表外观不同的商品
pub fn textured(seed: u64, width: u32, height: u32) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    GrayImage::from_fn(width, height, |_, _| Luma([rng.random_range(0..=200)]))
}

/// 整体调亮，模拟不同光照下拍摄的同一件商品
pub fn brighten(image: &GrayImage, delta: u8) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([image.get_pixel(x, y)[0].saturating_add(delta)])
    })
}

/// 裁掉左上角，模拟拍摄位置的轻微偏移
pub fn shifted(image: &GrayImage, dx: u32, dy: u32) -> GrayImage {
    image::imageops::crop_imm(image, dx, dy, image.width() - dx, image.height() - dy).to_image()
}

pub fn blank(width: u32, height: u32) -> GrayImage {
    GrayImage::from_pixel(width, height, Luma([128]))
}

pub fn png_bytes(image: &GrayImage) -> Vec<u8> {
    let mut buf = Cursor::new(vec![]);
    DynamicImage::ImageLuma8(image.clone()).write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

pub fn orb_options() -> OrbOptions {
    OrbOptions { orb_nfeatures: 500, ..OrbOptions::default() }
}
