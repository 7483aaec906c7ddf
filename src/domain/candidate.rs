// ==========================================
// 海关商品归类系统 - 候选税号与特征领域模型
// ==========================================
// 职责: 候选税号、材质成分、结构化特征的实体定义
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

use crate::domain::types::CandidateLevel;
use serde::{Deserialize, Serialize};

// ==========================================
// Candidate - 候选税号
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub code: String,           // 税号 (4/6/8位)
    pub description: String,    // 条文描述
    pub level: CandidateLevel,  // 层级
    pub specificity_score: f64, // 具体性评分 (规则三(一)用)
    pub match_score: f64,       // 匹配评分 (置信度计算用)
}

impl Candidate {
    /// 所属章 (前2位)
    pub fn chapter(&self) -> &str {
        &self.code[..self.code.len().min(2)]
    }

    /// 所属品目 (前4位)
    pub fn heading(&self) -> &str {
        &self.code[..self.code.len().min(4)]
    }
}

// ==========================================
// MaterialComponent - 材质成分
// ==========================================
// 用途: 混合物/组合物的基本特征判定 (规则二(二)/三(二))
// 说明: 四项判定因素均为可选,缺失的因素视为并列(不可决胜)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialComponent {
    pub name: String,               // 材质名称
    pub percentage: Option<f64>,    // 成分占比 (%)
    pub hs_code: Option<String>,    // 已知对应税号
    pub role_score: Option<f64>,    // 使用作用评分
    pub value_share: Option<f64>,   // 价值占比
    pub weight_share: Option<f64>,  // 重量/体积占比
    pub quantity: Option<f64>,      // 数量
}

impl MaterialComponent {
    /// 仅按名称构建 (其余因素未知)
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            percentage: None,
            hs_code: None,
            role_score: None,
            value_share: None,
            weight_share: None,
            quantity: None,
        }
    }
}

// ==========================================
// PackingHint - 包装信息 (规则五)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackingHint {
    pub description: String,          // 包装描述
    pub specially_fitted: bool,       // 是否专用定形容器 (规则五(一))
    pub reusable: bool,               // 是否明显可重复使用 (规则五(二))
    pub imparts_character: bool,      // 容器是否赋予整体基本特征
}

// ==========================================
// ExtractedFeatures - 结构化特征
// ==========================================
// 来源: 特征提取协作方 (extract 层) + 澄清回答增量合并
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedFeatures {
    #[serde(default)]
    pub materials: Vec<MaterialComponent>, // 材质成分
    #[serde(default)]
    pub purpose: Option<String>,           // 用途
    #[serde(default)]
    pub technical_specs: Vec<String>,      // 技术规格
    #[serde(default)]
    pub is_incomplete: bool,               // 未制成/未组装 (规则二(一))
    #[serde(default)]
    pub is_mixture: bool,                  // 混合物/组合物 (规则二(二))
    #[serde(default)]
    pub packing: Option<PackingHint>,      // 包装信息 (规则五)
}

impl ExtractedFeatures {
    /// 合并另一份特征 (澄清回答产生的增量优先)
    pub fn merge(&mut self, other: ExtractedFeatures) {
        if other.purpose.is_some() {
            self.purpose = other.purpose;
        }
        for m in other.materials {
            if let Some(existing) = self.materials.iter_mut().find(|e| e.name == m.name) {
                // 同名材质: 以新值补全缺失因素
                if m.percentage.is_some() {
                    existing.percentage = m.percentage;
                }
                if m.hs_code.is_some() {
                    existing.hs_code = m.hs_code;
                }
                if m.role_score.is_some() {
                    existing.role_score = m.role_score;
                }
                if m.value_share.is_some() {
                    existing.value_share = m.value_share;
                }
                if m.weight_share.is_some() {
                    existing.weight_share = m.weight_share;
                }
                if m.quantity.is_some() {
                    existing.quantity = m.quantity;
                }
            } else {
                self.materials.push(m);
            }
        }
        for spec in other.technical_specs {
            if !self.technical_specs.contains(&spec) {
                self.technical_specs.push(spec);
            }
        }
        self.is_incomplete |= other.is_incomplete;
        self.is_mixture |= other.is_mixture;
        if other.packing.is_some() {
            self.packing = other.packing;
        }
        // 多材质即视为混合物
        if self.materials.len() > 1 {
            self.is_mixture = true;
        }
    }

    /// 材质名称列表 (检索关键词用)
    pub fn material_names(&self) -> Vec<String> {
        self.materials.iter().map(|m| m.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_chapter_heading() {
        let c = Candidate {
            code: "61091000".to_string(),
            description: "棉制针织T恤衫".to_string(),
            level: CandidateLevel::Tariff,
            specificity_score: 0.0,
            match_score: 1.0,
        };
        assert_eq!(c.chapter(), "61");
        assert_eq!(c.heading(), "6109");
    }

    #[test]
    fn test_features_merge_fills_missing_factors() {
        let mut base = ExtractedFeatures {
            materials: vec![MaterialComponent::named("棉")],
            ..Default::default()
        };
        let mut update = ExtractedFeatures::default();
        let mut cotton = MaterialComponent::named("棉");
        cotton.percentage = Some(100.0);
        update.materials.push(cotton);
        update.purpose = Some("服装".to_string());

        base.merge(update);
        assert_eq!(base.materials.len(), 1);
        assert_eq!(base.materials[0].percentage, Some(100.0));
        assert_eq!(base.purpose.as_deref(), Some("服装"));
    }

    #[test]
    fn test_merge_marks_mixture_on_multiple_materials() {
        let mut base = ExtractedFeatures {
            materials: vec![MaterialComponent::named("棉")],
            ..Default::default()
        };
        let update = ExtractedFeatures {
            materials: vec![MaterialComponent::named("聚酯纤维")],
            ..Default::default()
        };
        base.merge(update);
        assert!(base.is_mixture);
    }
}
