use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageResult, Rgb, RgbImage};
use indicatif::ProgressStyle;

use crate::orb::KeyPoint;

/// 读取图片并转换为灰度图
pub fn imread(path: impl AsRef<Path>, max_size: (u32, u32)) -> ImageResult<GrayImage> {
    let image = image::open(path)?.to_luma8();
    Ok(adjust_image_size(image, max_size))
}

/// 从内存中解码图片并转换为灰度图
pub fn imdecode(bytes: &[u8], max_size: (u32, u32)) -> ImageResult<GrayImage> {
    let image = image::load_from_memory(bytes)?.to_luma8();
    Ok(adjust_image_size(image, max_size))
}

/// 如果图片宽高均超过最大尺寸，则等比缩放到最大尺寸以内
pub fn adjust_image_size(image: GrayImage, (max_width, max_height): (u32, u32)) -> GrayImage {
    let (width, height) = image.dimensions();
    if width <= max_width || height <= max_height {
        return image;
    }
    let scale = (max_width as f32 / width as f32).min(max_height as f32 / height as f32);
    let new_width = ((width as f32 * scale).round() as u32).max(1);
    let new_height = ((height as f32 * scale).round() as u32).max(1);
    imageops::resize(&image, new_width, new_height, FilterType::Triangle)
}

/// 在图片上用十字标出特征点，不同金字塔层使用不同颜色
pub fn draw_keypoints(image: &GrayImage, keypoints: &[KeyPoint]) -> RgbImage {
    const COLORS: [[u8; 3]; 4] = [[0, 255, 0], [255, 0, 0], [0, 128, 255], [255, 200, 0]];

    let mut output = RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let v = image.get_pixel(x, y)[0];
        Rgb([v, v, v])
    });
    for kp in keypoints {
        let color = Rgb(COLORS[kp.octave as usize % COLORS.len()]);
        let (cx, cy) = (kp.x.round() as i64, kp.y.round() as i64);
        for d in -3i64..=3 {
            for (x, y) in [(cx + d, cy), (cx, cy + d)] {
                if x >= 0 && y >= 0 && (x as u32) < output.width() && (y as u32) < output.height() {
                    output.put_pixel(x as u32, y as u32, color);
                }
            }
        }
    }
    output
}

/// 以 blake3 哈希为文件名保存上传的图片，返回相对于配置目录的路径
///
/// 内容相同的图片只会保存一份
pub fn store_image(conf_dir: &Path, bytes: &[u8]) -> Result<String> {
    let format = image::guess_format(bytes).context("无法识别图片格式")?;
    let ext = format.extensions_str().first().copied().unwrap_or("img");
    let hash = blake3::hash(bytes);

    let uploads = conf_dir.join("uploads");
    fs::create_dir_all(&uploads)?;
    let name = format!("{}.{}", hash.to_hex(), ext);
    let path: PathBuf = uploads.join(&name);
    if !path.exists() {
        fs::write(&path, bytes).with_context(|| format!("写入图片失败: {}", path.display()))?;
    }
    Ok(format!("uploads/{}", name))
}

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .expect("invalid progress bar template")
        .progress_chars("#>-")
}

/// 截止时间，None 表示不限时
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn after(timeout: Option<Duration>) -> Self {
        Self(timeout.map(|t| Instant::now() + t))
    }

    pub fn expired(&self) -> bool {
        self.0.is_some_and(|d| Instant::now() >= d)
    }
}
