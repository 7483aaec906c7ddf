// ==========================================
// 海关商品归类系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、业务规则接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod audit;
pub mod candidate;
pub mod classification;
pub mod decision;
pub mod tariff;
pub mod types;

// 重导出核心类型
pub use audit::{AuditAction, AuditEntry, GENESIS_HASH};
pub use candidate::{Candidate, ExtractedFeatures, MaterialComponent, PackingHint};
pub use classification::{Classification, ClassifyMetadata};
pub use decision::Decision;
pub use tariff::{compute_check_digit, CrossReference, ExclusionRule, LegalNote, TariffCode};
pub use types::{
    CandidateLevel, CharacterFactor, ClassificationStatus, CrossRefType, ExclusionType, GriStep,
};
