// ==========================================
// 海关商品归类系统 - 配置层
// ==========================================
// 职责: 系统配置管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

pub mod classify_config_trait;
pub mod config_manager;

// 重导出核心配置管理器
pub use classify_config_trait::{ClassifyConfigReader, StaticClassifyConfig};
pub use config_manager::{config_keys, ConfigManager};
