// ==========================================
// 海关商品归类系统 - 税则知识库接口
// ==========================================
// 职责: 定义引擎所需的知识库读取 trait,实现依赖倒置
// 说明: Engine 层定义 trait,Repository 层实现适配器
// 红线: 知识库对引擎只读;灌库属离线工具,不在本系统范围
// ==========================================

use crate::domain::candidate::Candidate;
use crate::domain::tariff::{CrossReference, ExclusionRule, LegalNote};
use serde::{Deserialize, Serialize};
use std::error::Error;

// ==========================================
// CheckDigitReport - 校验码复核结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckDigitReport {
    pub code: String,               // 被校验的8位税号
    pub computed: u8,               // 按算法计算的校验码
    pub registered: Option<u8>,     // 知识库登记的校验码 (未登记为 None)
}

impl CheckDigitReport {
    /// 登记值与计算值是否一致 (未登记视为一致)
    pub fn matches(&self) -> bool {
        self.registered.map_or(true, |r| r == self.computed)
    }
}

// ==========================================
// AnalogyMatch - 类比归类比对结果 (规则四)
// ==========================================
// 红线: 规则四决定必须写明比对对象与相似度
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalogyMatch {
    pub code: String,                   // 比对对象的税号
    pub comparator_description: String, // 比对对象的商品描述
    pub similarity: f64,                // 相似度 [0,1]
}

// ==========================================
// TariffKnowledgeBase Trait
// ==========================================
// 契约: 全部为只读查询;无匹配返回空集而非错误
pub trait TariffKnowledgeBase: Send + Sync {
    /// 按描述文本 + 附加关键词检索候选税号
    fn lookup_by_keyword(
        &self,
        text: &str,
        extra_keywords: &[String],
    ) -> Result<Vec<Candidate>, Box<dyn Error>>;

    /// 查询语境税号下的排他规则 (剪枝用)
    fn get_exclusions(&self, code: &str) -> Result<Vec<ExclusionRule>, Box<dyn Error>>;

    /// 查询互见条款 (仅提示,不剪枝)
    fn get_cross_references(&self, code: &str) -> Result<Vec<CrossReference>, Box<dyn Error>>;

    /// 查询法律注释 (决定的法律依据引用)
    fn get_legal_notes(&self, code: &str) -> Result<Vec<LegalNote>, Box<dyn Error>>;

    /// 复核8位税号校验码
    fn validate_check_digit(&self, code8: &str) -> Result<CheckDigitReport, Box<dyn Error>>;

    /// 在已完成归类中寻找最相类似货品 (规则四)
    fn find_similar_classified(
        &self,
        description: &str,
    ) -> Result<Option<AnalogyMatch>, Box<dyn Error>>;
}
