// ==========================================
// 海关商品归类系统 (HS Classifier)
// ==========================================
// 按 WCO《协调制度》归类总规则 (GRI) 对商品描述做顺序归类,
// 每一步产出带法律依据与证据的不可变决定,并以哈希链审计追踪。
//
// 分层:
// - domain:     领域模型 (任务/决定/审计链/税则)
// - repository: SQLite 数据访问 (决定与审计只追加)
// - engine:     GRI 规则引擎 / 候选解析 / 澄清循环 / 决定记录
// - extract:    特征提取 (外部协作方接口 + 词表默认实现)
// - config:     配置 (config_kv 表 + 静态默认值)
// - api:        对外操作入口
// ==========================================

pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod extract;
pub mod logging;
pub mod repository;

// 重导出常用类型
pub use api::{ApiError, ApiResult, ClassificationApi};
pub use config::{ClassifyConfigReader, ConfigManager, StaticClassifyConfig};
pub use domain::{Classification, ClassificationStatus, Decision, GriStep};
pub use engine::{EngineError, EngineOutcome, GriRuleEngine};

/// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 系统名称
pub const APP_NAME: &str = "海关商品归类系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_not_empty() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "海关商品归类系统");
    }
}
