// ==========================================
// 海关商品归类系统 - API 层
// ==========================================

pub mod classification_api;
pub mod error;

pub use classification_api::ClassificationApi;
pub use error::{ApiError, ApiResult};
