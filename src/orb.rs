use std::path::Path;

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageResult};
use rayon::prelude::*;

use crate::config::OrbOptions;
use crate::utils;

/// 256 位 ORB 描述符
pub type Descriptor = [u8; 32];
/// 一张图片提取出的全部描述符，顺序没有意义
pub type DescriptorSet = Vec<Descriptor>;

/// 特征点，坐标已经换算到原图
#[derive(Debug, Clone, Copy)]
pub struct KeyPoint {
    pub x: f32,
    pub y: f32,
    pub response: f32,
    pub angle: f32,
    pub octave: u32,
}

// 特征点距离图片边缘的最小距离，保证旋转后的采样点和方向计算区域都在图片内
const EDGE_THRESHOLD: u32 = 19;
// 方向计算使用的圆形区域半径
const HALF_PATCH: i32 = 15;
// FAST 要求的最少连续像素数
const FAST_ARC: usize = 9;

// 半径为 3 的 Bresenham 圆
const FAST_CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// BRIEF 采样点对，每一项为 (x1, y1, x2, y2)，范围在 31x31 的邻域内
///
/// 使用固定的学习得到的采样模式，各位之间相关性较低
#[rustfmt::skip]
const PATTERN: [(i8, i8, i8, i8); 256] = [
    (8, -3, 9, 5), (-11, 9, -8, 2), (3, -12, -13, 2), (-3, -7, -4, 5),
    (1, -11, 12, -2), (1, -1, 11, -1), (4, -2, -5, -8), (2, -13, -8, 9),
    (-11, 1, 6, 2), (11, 11, 12, -1), (6, -12, -9, -8), (12, 5, 3, -6),
    (1, 1, -4, -1), (7, -4, -6, 7), (-3, 2, 9, -8), (-4, -8, 3, 3),
    (-5, 3, 0, -4), (2, -11, -13, 0), (10, 5, 5, 2), (0, 9, 10, -3),
    (5, -8, -10, 1), (8, 3, -8, -5), (2, -6, -9, -4), (-12, 2, 0, -10),
    (5, -10, -7, -2), (-7, 9, -1, 0), (0, -1, -3, 3), (-12, 5, -2, -1),
    (-1, 1, -5, -11), (-1, 2, -3, 0), (-5, -6, 7, -1), (4, 7, 0, -8),
    (-9, 9, 3, -13), (7, -3, 13, -7), (10, -4, -5, 3), (6, 1, -13, -13),
    (-12, -11, 7, 0), (0, -1, -8, -6), (-10, -5, -6, 7), (10, 2, -6, -12),
    (-11, 8, 4, -2), (9, 0, -11, -4), (0, 11, 6, -11), (4, 1, -10, -3),
    (-6, 12, 1, 12), (-4, -8, 8, -7), (-3, 0, 8, 3), (3, 3, -3, -1),
    (-6, -11, -2, 12), (0, -3, -6, -3), (-6, 3, -12, -8), (6, 3, -2, -10),
    (-3, -10, -1, 0), (11, 2, 11, 3), (1, -8, -10, 8), (2, -2, -7, 8),
    (0, -13, 13, 0), (6, -9, -1, -1), (7, 5, 6, 3), (-13, 7, -7, -7),
    (-5, -13, 5, -11), (6, 7, -2, 12), (-6, -11, 8, 6), (-2, -2, -5, 9),
    (5, 4, 7, -6), (0, 11, -4, -5), (10, 1, 2, -8), (-3, -10, -10, -10),
    (1, 9, 6, -5), (-7, -11, 11, 3), (11, -2, -4, 3), (7, -1, 5, 12),
    (-5, 5, -2, -5), (8, -11, -1, -13), (-13, 2, -11, -8), (-2, 9, 5, 0),
    (2, -5, 2, 0), (3, -13, -12, 9), (6, -3, 5, 4), (10, 10, 1, -9),
    (-13, -8, -4, 10), (2, -2, -3, 8), (-13, -11, -8, -3), (2, -4, -7, -3),
    (12, 0, -2, 13), (-11, 7, -10, -1), (-5, -10, 0, -11), (6, 7, 12, -3),
    (-1, -1, 8, -6), (-6, 3, -1, -3), (-2, -11, -11, -3), (12, -2, 3, -10),
    (-11, -1, -2, -8), (3, -1, 7, 3), (2, -2, -12, 12), (6, -4, 12, -2),
    (-3, 11, 2, -12), (-1, 3, 2, 3), (1, 3, -11, -3), (2, -8, -7, -5),
    (0, -5, -11, -6), (-12, 8, -2, 9), (3, -7, 9, -8), (-10, -6, -1, -11),
    (11, -6, -3, -13), (3, 0, 0, -8), (-5, -2, -1, -13), (-8, -5, -10, -13),
    (7, -13, 0, -3), (1, -4, -1, -13), (6, -5, -7, 8), (8, 7, -5, -13),
    (2, 0, -8, -6), (-8, -3, -13, -6), (-6, 5, 0, 6), (-8, 8, -9, 1),
    (10, 1, -9, 4), (-4, -8, -5, 7), (7, 7, 10, -8), (-7, -3, -1, 1),
    (10, -1, 3, 1), (5, 6, -10, -8), (-6, -13, 5, -8), (4, -3, -4, -13),
    (-3, 4, -2, -13), (10, -11, 9, 11), (-9, 0, 12, 2), (-4, -2, 13, -6),
    (2, -10, -6, 1), (11, -13, 4, -13), (1, -1, 1, 9), (1, -5, -13, -5),
    (7, 4, 12, -7), (0, -2, -8, 3), (7, 2, 2, -8), (-2, 7, -12, -4),
    (1, 11, 6, -2), (-1, -1, -4, 10), (0, 8, 0, -13), (3, 12, 5, -13),
    (-9, -1, 9, -13), (12, 4, -6, -4), (-13, 13, 1, -4), (0, -2, -7, -9),
    (10, -8, -13, 3), (2, -13, 6, 8), (10, -6, -7, 0), (-11, 7, -1, -7),
    (12, 0, 5, -4), (-7, -8, 4, -12), (-13, 5, -5, -2), (0, 5, 4, 4),
    (-2, -11, -1, 8), (9, 3, -1, -12), (0, 6, -10, 12), (1, -8, -7, -10),
    (-6, 4, -6, 3), (5, 1, -3, -9), (-6, 6, -6, 3), (7, -8, 1, -7),
    (3, 8, -9, -5), (2, -4, 5, 7), (11, 4, 6, -3), (-8, -1, 11, -1),
    (-3, -6, -10, -8), (2, 7, 3, -12), (-4, -10, 12, -3), (1, -2, -4, 6),
    (3, 11, -11, 0), (-6, 2, 3, -8), (6, 12, 0, -13), (3, 2, -2, -5),
    (-4, 1, -6, 5), (-12, 0, -13, 9), (-6, 2, 7, -8), (-2, -4, -6, 5),
    (0, 0, 0, -13), (9, -13, -2, 0), (3, -13, 5, -12), (10, 11, -13, -13),
    (-2, 3, -12, 3), (11, 7, -7, 0), (12, 2, 1, -13), (12, -11, 12, -8),
    (-7, -2, -4, -7), (7, 5, -1, -13), (-5, -8, -9, 10), (6, 0, -3, -13),
    (12, 4, -13, 1), (-7, 8, 8, -3), (10, -4, 0, -13), (2, 1, -7, 0),
    (-5, 4, 2, -8), (12, 8, 4, -13), (8, 7, -10, 0), (-3, 6, -2, 4),
    (-5, -1, -8, -12), (4, -1, -2, -10), (6, -4, -13, 9), (-7, 8, -6, -12),
    (-10, 2, -13, 10), (-1, -7, 0, 2), (-5, 6, -5, -12), (6, -13, 7, -3),
    (-13, 2, -1, 8), (2, 8, -13, 0), (-6, -9, 1, -4), (-9, 13, 0, -13),
    (-2, -3, 8, 0), (4, 0, -11, 12), (0, 3, -10, 10), (-6, -9, -3, -2),
    (9, -4, -6, 2), (5, 0, -13, -10), (-3, -8, -13, 3), (-12, -1, -4, -2),
    (7, -9, -4, 3), (-8, -4, 1, 11), (11, 6, 2, -12), (6, 6, -8, 12),
    (-3, -8, 2, -10), (2, 5, -8, 8), (-9, 8, -6, -8), (-4, 0, -11, -7),
    (7, 6, -3, 8), (-5, 7, -12, 5), (2, -8, -5, 1), (0, 4, -5, -3),
    (9, -9, -6, -12), (0, -13, 0, -13), (-7, -11, -3, -13), (6, -12, -7, 10),
    (6, -8, -13, 7), (8, 7, -11, -1), (-11, -5, -6, 9), (6, 4, 2, -13),
    (-1, -6, 3, -9), (1, -4, 4, -3), (-6, 8, -12, 0), (-11, 3, -6, 2),
    (7, -10, 11, -6), (5, 0, 12, -13), (4, -8, 1, -1), (-13, 12, -6, 3),
    (1, 4, -9, -2), (-8, -12, -8, 7), (-9, 5, 0, -5), (9, 7, 5, 3),
    (-12, -2, 8, -8), (3, 7, 12, -8), (-13, 3, -1, -1), (-10, -4, -10, 12),
    (5, -2, 0, 13), (-7, 1, -12, 8), (2, 9, -5, -11), (11, -13, 0, 2),
];

#[derive(Debug, Clone)]
pub struct OrbExtractor {
    opts: OrbOptions,
}

impl OrbExtractor {
    pub fn create(options: OrbOptions) -> Self {
        Self { opts: options }
    }

    pub fn options(&self) -> &OrbOptions {
        &self.opts
    }

    pub fn detect_file(
        &self,
        path: impl AsRef<Path>,
    ) -> ImageResult<(Vec<KeyPoint>, DescriptorSet)> {
        let image = utils::imread(path, self.opts.max_size)?;
        Ok(self.detect_and_compute(&image))
    }

    pub fn detect_bytes(&self, bytes: &[u8]) -> ImageResult<(Vec<KeyPoint>, DescriptorSet)> {
        let image = utils::imdecode(bytes, self.opts.max_size)?;
        Ok(self.detect_and_compute(&image))
    }

    pub fn detect_image(&self, image: GrayImage) -> (Vec<KeyPoint>, DescriptorSet) {
        let image = utils::adjust_image_size(image, self.opts.max_size);
        self.detect_and_compute(&image)
    }

    /// 在灰度图上检测特征点并计算描述符
    ///
    /// 图片过小或没有角点时返回空集合
    pub fn detect_and_compute(&self, image: &GrayImage) -> (Vec<KeyPoint>, DescriptorSet) {
        let min_side = 2 * EDGE_THRESHOLD + 1;
        if image.width() < min_side || image.height() < min_side || self.opts.orb_nfeatures == 0 {
            return (vec![], vec![]);
        }

        let pyramid = self.build_pyramid(image);
        let budgets = self.level_budgets(pyramid.len());

        let levels: Vec<Vec<(KeyPoint, Descriptor)>> = pyramid
            .par_iter()
            .enumerate()
            .map(|(octave, (level, scale))| {
                compute_level(level, octave as u32, *scale, budgets[octave], self.threshold())
            })
            .collect();

        levels.into_iter().flatten().take(self.opts.orb_nfeatures as usize).unzip()
    }

    fn threshold(&self) -> i16 {
        self.opts.orb_fast_threshold as i16
    }

    fn nlevels(&self) -> usize {
        if self.opts.orb_scale_factor <= 1.0 { 1 } else { self.opts.orb_nlevels.max(1) as usize }
    }

    /// 构建图像金字塔，返回每一层的图片和相对原图的缩放比例
    fn build_pyramid(&self, image: &GrayImage) -> Vec<(GrayImage, f32)> {
        let min_side = 2 * EDGE_THRESHOLD + 1;
        let mut pyramid = Vec::with_capacity(self.nlevels());
        pyramid.push((image.clone(), 1.0));

        let mut scale = 1.0f32;
        for _ in 1..self.nlevels() {
            scale *= self.opts.orb_scale_factor;
            let width = (image.width() as f32 / scale).round() as u32;
            let height = (image.height() as f32 / scale).round() as u32;
            if width < min_side || height < min_side {
                break;
            }
            let level = imageops::resize(image, width, height, FilterType::Triangle);
            pyramid.push((level, scale));
        }

        pyramid
    }

    /// 按面积等比分配每一层的特征点数量，最后一层补齐余数
    fn level_budgets(&self, nlevels: usize) -> Vec<usize> {
        let total = self.opts.orb_nfeatures as usize;
        if nlevels <= 1 {
            return vec![total];
        }

        let factor = 1.0 / self.opts.orb_scale_factor;
        let mut per_level =
            total as f32 * (1.0 - factor) / (1.0 - factor.powi(nlevels as i32));
        let mut budgets = Vec::with_capacity(nlevels);
        let mut sum = 0;
        for _ in 0..nlevels - 1 {
            let budget = (per_level.round() as usize).min(total - sum);
            budgets.push(budget);
            sum += budget;
            per_level *= factor;
        }
        budgets.push(total - sum);
        budgets
    }
}

fn compute_level(
    level: &GrayImage,
    octave: u32,
    scale: f32,
    budget: usize,
    threshold: i16,
) -> Vec<(KeyPoint, Descriptor)> {
    if budget == 0 {
        return vec![];
    }

    let mut corners = detect_fast(level, threshold);
    // 稳定排序，响应相同时保持扫描顺序
    corners.sort_by(|a, b| b.2.total_cmp(&a.2));
    corners.truncate(budget);
    if corners.is_empty() {
        return vec![];
    }

    let blurred = imageops::blur(level, 2.0);
    corners
        .into_iter()
        .map(|(x, y, response)| {
            let angle = orientation(level, x, y);
            let descriptor = brief(&blurred, x, y, angle);
            let keypoint =
                KeyPoint { x: x as f32 * scale, y: y as f32 * scale, response, angle, octave };
            (keypoint, descriptor)
        })
        .collect()
}

/// FAST-9 角点检测 + 3x3 非极大值抑制，返回 (x, y, response)
fn detect_fast(image: &GrayImage, threshold: i16) -> Vec<(u32, u32, f32)> {
    let (width, height) = image.dimensions();
    let raw = image.as_raw();
    let stride = width as usize;
    let border = EDGE_THRESHOLD;

    let mut scores = vec![0f32; raw.len()];
    for y in border..height - border {
        for x in border..width - border {
            if let Some(score) = fast_score(raw, stride, x, y, threshold) {
                scores[y as usize * stride + x as usize] = score;
            }
        }
    }

    let mut corners = vec![];
    for y in border..height - border {
        for x in border..width - border {
            let idx = y as usize * stride + x as usize;
            let score = scores[idx];
            if score <= 0.0 {
                continue;
            }
            if is_local_maximum(&scores, stride, idx, score) {
                corners.push((x, y, score));
            }
        }
    }
    corners
}

// 分数相同时保留扫描顺序靠前的点，保证结果确定
fn is_local_maximum(scores: &[f32], stride: usize, idx: usize, score: f32) -> bool {
    for dy in -1isize..=1 {
        for dx in -1isize..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let n = (idx as isize + dy * stride as isize + dx) as usize;
            let earlier = (dy, dx) < (0, 0);
            if (earlier && scores[n] >= score) || (!earlier && scores[n] > score) {
                return false;
            }
        }
    }
    true
}

/// 返回 FAST 角点分数，不是角点时返回 None
///
/// 分数为连续弧上像素与中心差值超出阈值部分之和
fn fast_score(raw: &[u8], stride: usize, x: u32, y: u32, threshold: i16) -> Option<f32> {
    let pixel = |(dx, dy): (i32, i32)| -> i16 {
        raw[(y as i32 + dy) as usize * stride + (x as i32 + dx) as usize] as i16
    };
    let center = pixel((0, 0));
    let bright = center + threshold;
    let dark = center - threshold;

    // 连续 9 个像素一定覆盖 4 个方向点中的至少 2 个
    let cardinal = [FAST_CIRCLE[0], FAST_CIRCLE[4], FAST_CIRCLE[8], FAST_CIRCLE[12]].map(pixel);
    let nbright = cardinal.iter().filter(|&&p| p > bright).count();
    let ndark = cardinal.iter().filter(|&&p| p < dark).count();
    if nbright < 2 && ndark < 2 {
        return None;
    }

    let mut state = [0i8; 16];
    let mut bright_sum = 0i32;
    let mut dark_sum = 0i32;
    for (i, &offset) in FAST_CIRCLE.iter().enumerate() {
        let p = pixel(offset);
        if p > bright {
            state[i] = 1;
            bright_sum += (p - bright) as i32;
        } else if p < dark {
            state[i] = -1;
            dark_sum += (dark - p) as i32;
        }
    }

    let score = match (has_arc(&state, 1), has_arc(&state, -1)) {
        (true, true) => bright_sum.max(dark_sum),
        (true, false) => bright_sum,
        (false, true) => dark_sum,
        (false, false) => return None,
    };
    Some(score as f32)
}

fn has_arc(state: &[i8; 16], kind: i8) -> bool {
    let mut run = 0;
    // 遍历两圈以处理首尾相接的弧
    for i in 0..state.len() * 2 {
        if state[i % state.len()] == kind {
            run += 1;
            if run >= FAST_ARC {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

/// 灰度质心法计算特征点方向
fn orientation(image: &GrayImage, x: u32, y: u32) -> f32 {
    let mut m01 = 0f32;
    let mut m10 = 0f32;
    for dy in -HALF_PATCH..=HALF_PATCH {
        for dx in -HALF_PATCH..=HALF_PATCH {
            if dx * dx + dy * dy > HALF_PATCH * HALF_PATCH {
                continue;
            }
            let v = image.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0] as f32;
            m10 += dx as f32 * v;
            m01 += dy as f32 * v;
        }
    }
    m01.atan2(m10)
}

/// 按特征点方向旋转采样模式，计算 rBRIEF 描述符
fn brief(image: &GrayImage, x: u32, y: u32, angle: f32) -> Descriptor {
    let (sin, cos) = angle.sin_cos();
    let (width, height) = image.dimensions();
    let sample = |dx: i8, dy: i8| -> u8 {
        let rx = (dx as f32 * cos - dy as f32 * sin).round() as i32;
        let ry = (dx as f32 * sin + dy as f32 * cos).round() as i32;
        let px = (x as i32 + rx).clamp(0, width as i32 - 1) as u32;
        let py = (y as i32 + ry).clamp(0, height as i32 - 1) as u32;
        image.get_pixel(px, py)[0]
    };

    let mut descriptor = [0u8; 32];
    for (i, &(x1, y1, x2, y2)) in PATTERN.iter().enumerate() {
        if sample(x1, y1) < sample(x2, y2) {
            descriptor[i / 8] |= 1 << (i % 8);
        }
    }
    descriptor
}
