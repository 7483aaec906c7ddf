// ==========================================
// 海关商品归类系统 - 税则知识库领域模型
// ==========================================
// 职责: 税则条目、排他规则、互见条款、法律注释与校验码
// 说明: 知识库为只读参考数据,离线工具负责灌库
// ==========================================

use crate::domain::types::{CandidateLevel, CrossRefType, ExclusionType};
use serde::{Deserialize, Serialize};

// ==========================================
// TariffCode - 税则条目
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TariffCode {
    pub code: String,                // 税号 (4/6/8位)
    pub description: String,         // 条文描述
    pub level: CandidateLevel,       // 层级
    pub keywords: Vec<String>,       // 检索关键词 (灌库时生成)
    pub parent_code: Option<String>, // 上级税号
    pub check_digit: Option<u8>,     // 知识库登记的校验码 (仅8位税号)
}

// ==========================================
// ExclusionRule - 排他规则
// ==========================================
// 来源: 类注/章注的"不包括"条款, 灌库时展开为排他矩阵
// 用途: 候选剪枝 (from_code 语境下排除 to_code)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionRule {
    pub from_code: String,            // 语境税号 (章/品目)
    pub to_code: String,              // 被排除税号
    pub exclusion_type: ExclusionType,
    pub note_ref: String,             // 注释出处
}

impl ExclusionRule {
    /// 判断候选税号是否落入本排他规则
    pub fn excludes(&self, candidate_code: &str) -> bool {
        candidate_code.starts_with(&self.to_code)
    }
}

// ==========================================
// CrossReference - 互见条款
// ==========================================
// 红线: 仅作提示信息附入证据,绝不剪枝候选集
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossReference {
    pub from_code: String,
    pub to_code: String,
    pub ref_type: CrossRefType,
    pub note_ref: String,
}

// ==========================================
// LegalNote - 法律注释
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalNote {
    pub code: String,      // 关联税号 (章/品目)
    pub note_ref: String,  // 注释编号 (如 "第61章注一")
    pub note_text: String, // 注释正文
}

// ==========================================
// 校验码 (Check Digit)
// ==========================================
// 算法: 8位税号逐位乘权重 1,3,1,3,1,3,1,3 求和,
//       校验码 = (10 - 和 mod 10) mod 10
// 示例: "01012100" → 加权和 11 → 校验码 9

/// 计算8位税号的校验码
///
/// # 返回
/// - Some(digit): 校验码
/// - None: 输入不是8位纯数字
pub fn compute_check_digit(code8: &str) -> Option<u8> {
    if code8.len() != 8 || !code8.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let sum: u32 = code8
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let digit = c.to_digit(10).unwrap_or(0);
            let weight = if i % 2 == 0 { 1 } else { 3 };
            digit * weight
        })
        .sum();
    Some(((10 - sum % 10) % 10) as u8)
}
