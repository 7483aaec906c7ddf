// ==========================================
// 海关商品归类系统 - 步骤结果与证据类型
// ==========================================
// 职责: 定义澄清问题与步骤证据 (标签联合)
// 说明: 证据按步骤各设变体,非法的"步骤×数据"组合在类型上不可构造
// ==========================================

use crate::domain::candidate::{Candidate, ExtractedFeatures, MaterialComponent};
use crate::domain::tariff::{CrossReference, LegalNote};
use crate::domain::types::CharacterFactor;
use crate::engine::knowledge::{AnalogyMatch, CheckDigitReport};
use serde::{Deserialize, Serialize};

// ==========================================
// ClarifyQuestion - 澄清问题
// ==========================================
// 约束: 至多3个预设选项,始终允许自由文本回答
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarifyQuestion {
    pub category: ClarifyCategory,
    pub text: String,
    pub options: Vec<String>,
    pub allow_free_text: bool,
}

// ==========================================
// ClarifyCategory - 澄清类目
// ==========================================
// 优先顺序: 用途 > 材质 > 材质明细
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarifyCategory {
    Purpose,
    Material,
    MaterialDetail,
}

impl ClarifyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClarifyCategory::Purpose => "purpose",
            ClarifyCategory::Material => "material",
            ClarifyCategory::MaterialDetail => "material_detail",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "purpose" => Some(ClarifyCategory::Purpose),
            "material" => Some(ClarifyCategory::Material),
            "material_detail" => Some(ClarifyCategory::MaterialDetail),
            _ => None,
        }
    }

    /// 提问优先顺序
    pub fn priority_order() -> &'static [ClarifyCategory] {
        &[
            ClarifyCategory::Purpose,
            ClarifyCategory::Material,
            ClarifyCategory::MaterialDetail,
        ]
    }
}

// ==========================================
// PrunedCandidate - 被排他条款剪除的候选
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrunedCandidate {
    pub candidate: Candidate,
    pub note_ref: String, // 依据的注释出处
}

// ==========================================
// StepEvidence - 步骤证据 (标签联合, 每步骤一个变体)
// ==========================================
// 用途: 决定记录的 evidence_json;审计回放时可完整还原各步输入输出
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step_kind", rename_all = "snake_case")]
pub enum StepEvidence {
    PreClassification {
        features: ExtractedFeatures,
    },
    Gri1 {
        candidates: Vec<Candidate>,
        pruned: Vec<PrunedCandidate>,
        legal_notes: Vec<LegalNote>,
        cross_references: Vec<CrossReference>,
    },
    Gri2a {
        applies: bool,
        candidates: Vec<Candidate>,
    },
    Gri2b {
        applies: bool,
        expanded_from: Vec<MaterialComponent>,
        candidates: Vec<Candidate>,
    },
    Gri3a {
        ranking: Vec<Candidate>,
    },
    Gri3b {
        selected_material: Option<MaterialComponent>,
        deciding_factor: Option<CharacterFactor>,
    },
    Gri3c {
        remaining: Vec<Candidate>,
        selected_code: String,
    },
    Gri4 {
        analogy: Option<AnalogyMatch>,
    },
    Gri5a {
        applies: bool,
        ambiguity_flagged: bool,
    },
    Gri5b {
        applies: bool,
    },
    Gri6 {
        heading: String,
        refined: Vec<Candidate>,
        final_code: String,
    },
    Validation {
        check_digit: CheckDigitReport,
        unresolved_exclusions: Vec<String>,
    },
}

impl StepEvidence {
    /// 证据摘要 (日志用, 穷尽匹配)
    pub fn summary(&self) -> String {
        match self {
            StepEvidence::PreClassification { features } => {
                format!("提取材质{}项", features.materials.len())
            }
            StepEvidence::Gri1 {
                candidates, pruned, ..
            } => format!("候选{}项,剪除{}项", candidates.len(), pruned.len()),
            StepEvidence::Gri2a { applies, .. } => format!("适用={}", applies),
            StepEvidence::Gri2b {
                applies,
                candidates,
                ..
            } => format!("适用={},扩展后候选{}项", applies, candidates.len()),
            StepEvidence::Gri3a { ranking } => format!("参与排序{}项", ranking.len()),
            StepEvidence::Gri3b {
                selected_material,
                deciding_factor,
            } => format!(
                "选定材质={:?},决定因素={:?}",
                selected_material.as_ref().map(|m| m.name.as_str()),
                deciding_factor
            ),
            StepEvidence::Gri3c { selected_code, .. } => format!("从后归入{}", selected_code),
            StepEvidence::Gri4 { analogy } => match analogy {
                Some(a) => format!("类比{},相似度{:.2}", a.code, a.similarity),
                None => "无可类比货品".to_string(),
            },
            StepEvidence::Gri5a {
                applies,
                ambiguity_flagged,
            } => format!("适用={},歧义标记={}", applies, ambiguity_flagged),
            StepEvidence::Gri5b { applies } => format!("适用={}", applies),
            StepEvidence::Gri6 { final_code, .. } => format!("最终税号{}", final_code),
            StepEvidence::Validation {
                check_digit,
                unresolved_exclusions,
            } => format!(
                "校验码一致={},未解除排他{}项",
                check_digit.matches(),
                unresolved_exclusions.len()
            ),
        }
    }
}
