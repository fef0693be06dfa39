use std::sync::Arc;

use crate::db::SqliteCatalog;
use crate::recognizer::Recognizer;

/// 应用状态
pub struct AppState {
    /// 识别服务，持有商品目录和参考索引
    pub recognizer: Recognizer<SqliteCatalog>,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(recognizer: Recognizer<SqliteCatalog>) -> Arc<Self> {
        Arc::new(AppState { recognizer })
    }
}
