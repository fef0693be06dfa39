use std::sync::LazyLock;

use prometheus::*;

static METRIC_IDENTIFY_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "prodmatch_identify_count",
        "count of the identification requests",
        &["size", "result"]
    )
    .unwrap()
});

static METRIC_IDENTIFY_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "prodmatch_identify_duration",
        "duration of the per-image identification in seconds",
        &["size"]
    )
    .unwrap()
});

static METRIC_IDENTIFY_SCORE: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "prodmatch_identify_score",
        "best score of the per-image identification",
        &["size"],
        (5..=100).step_by(5).map(|x| x as f64).collect()
    )
    .unwrap()
});

static METRIC_INDEX_ENTRIES: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!("prodmatch_index_entries", "number of reference images in the index")
        .unwrap()
});

/// 记录一次识别请求
pub fn observe_identify(size: (u32, u32), result: &str, score: usize, duration: f32) {
    let size = to_fixed_size(size);

    METRIC_IDENTIFY_COUNT.with_label_values(&[size, result]).inc();
    METRIC_IDENTIFY_DURATION.with_label_values(&[size]).observe(duration as f64);
    METRIC_IDENTIFY_SCORE.with_label_values(&[size]).observe(score as f64);
}

/// 记录无法解码的请求
pub fn inc_decode_error() {
    METRIC_IDENTIFY_COUNT.with_label_values(&["invalid", "decode_error"]).inc();
}

#[cfg(test)]
pub fn decode_errors() -> u64 {
    METRIC_IDENTIFY_COUNT.with_label_values(&["invalid", "decode_error"]).get()
}

pub fn set_index_entries(n: usize) {
    METRIC_INDEX_ENTRIES.set(n as i64);
}

/// 以文本格式导出所有指标
pub fn gather_text() -> Result<String> {
    let mut buffer = String::new();
    TextEncoder::new().encode_utf8(&gather(), &mut buffer)?;
    Ok(buffer)
}

/// 将图像面积范围调整到几个固定值
fn to_fixed_size((width, height): (u32, u32)) -> &'static str {
    let area = width as u64 * height as u64;
    if area <= 128 * 128 {
        "128"
    } else if area <= 256 * 256 {
        "256"
    } else if area <= 512 * 512 {
        "512"
    } else if area <= 768 * 768 {
        "768"
    } else if area <= 1024 * 1024 {
        "1024"
    } else {
        "1024+"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_size() {
        assert_eq!(to_fixed_size((0, 0)), "128");
        assert_eq!(to_fixed_size((256, 256)), "256");
        assert_eq!(to_fixed_size((1080, 768)), "1024");
        assert_eq!(to_fixed_size((4000, 3000)), "1024+");
    }

    #[test]
    fn test_gather_text() {
        observe_identify((256, 256), "matched", 42, 0.01);
        set_index_entries(3);
        let text = gather_text().unwrap();
        assert!(text.contains("prodmatch_identify_count"));
        assert!(text.contains("prodmatch_index_entries"));
    }
}
