// ==========================================
// 海关商品归类系统 - 数据仓储层
// ==========================================
// 职责: 数据访问与映射
// 红线: Repository 不做业务逻辑;决定与审计链只追加
// ==========================================

pub mod audit_repo;
pub mod classification_repo;
pub mod decision_repo;
pub mod error;
pub mod tariff_repo;

// 重导出核心类型
pub use audit_repo::AuditRepository;
pub use classification_repo::ClassificationRepository;
pub use decision_repo::DecisionRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use tariff_repo::SqliteTariffRepository;
