// ==========================================
// 海关商品归类系统 - 具体性与基本特征评估引擎
// ==========================================
// 职责: 规则三(一)具体列名比较、规则三(二)基本特征判定的纯逻辑
// 红线: 无状态、无副作用、无 I/O;所有判定必须输出 reason
// ==========================================
// 注意: "描述长度近似具体性"是文档化的启发式替代,
//       并非法律规则,待领域专家校准评分后替换
// ==========================================

use crate::domain::candidate::{Candidate, MaterialComponent};
use crate::domain::types::CharacterFactor;
use serde::{Deserialize, Serialize};

const FACTOR_EPS: f64 = 1e-9;

// ==========================================
// SpecificityEvaluator - 纯函数工具类
// ==========================================
pub struct SpecificityEvaluator;

// ==========================================
// EssentialCharacterResult - 基本特征判定结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EssentialCharacterResult {
    pub selected: MaterialComponent,
    pub deciding_factor: CharacterFactor,
    pub reasoning: String,
}

impl SpecificityEvaluator {
    /// 具体性比较 (规则三(一))
    ///
    /// # 规则
    /// - 编码更长(更窄)者更具体;返回正数表示 a 更具体
    /// - 编码等长时,以描述字符数为具体性代理 (启发式,非法律规则)
    ///
    /// # 返回
    /// - >0: a 更具体; <0: b 更具体; 0: 并列
    pub fn compare_specificity(a: &Candidate, b: &Candidate) -> i32 {
        let by_code = a.code.len() as i32 - b.code.len() as i32;
        if by_code != 0 {
            return by_code;
        }
        a.description.chars().count() as i32 - b.description.chars().count() as i32
    }

    /// 按具体性对候选集排序,返回唯一最具体者 (若存在)
    ///
    /// # 返回
    /// - (排序后的候选集, Some(唯一最具体者) 或并列时 None)
    pub fn rank_by_specificity(candidates: &[Candidate]) -> (Vec<Candidate>, Option<Candidate>) {
        let mut ranked = candidates.to_vec();
        ranked.sort_by(|a, b| {
            Self::compare_specificity(b, a)
                .cmp(&0)
                .then_with(|| a.code.cmp(&b.code))
        });

        let unique_top = match ranked.as_slice() {
            [] => None,
            [only] => Some(only.clone()),
            [top, second, ..] => {
                if Self::compare_specificity(top, second) > 0 {
                    Some(top.clone())
                } else {
                    None // 并列: 规则三(一)无法决胜
                }
            }
        };
        (ranked, unique_top)
    }

    /// 基本特征判定 (规则三(二))
    ///
    /// # 规则
    /// - 按 作用 > 价值 > 重量/体积 > 数量 的优先顺序逐因素比较
    /// - 首个"非并列"的因素决定选材;reasoning 必须写明决定因素
    /// - 所有因素均并列或缺失 ⇒ None (交由规则三(三)从后归类)
    pub fn essential_character(
        materials: &[MaterialComponent],
    ) -> Option<EssentialCharacterResult> {
        if materials.len() < 2 {
            // 单一材质即为基本特征
            return materials.first().map(|m| EssentialCharacterResult {
                selected: m.clone(),
                deciding_factor: CharacterFactor::RoleInUse,
                reasoning: format!("仅有单一成分\"{}\",即构成基本特征", m.name),
            });
        }

        for factor in CharacterFactor::priority_order() {
            let values: Vec<(usize, f64)> = materials
                .iter()
                .enumerate()
                .filter_map(|(i, m)| Self::factor_value(m, *factor).map(|v| (i, v)))
                .collect();
            if values.is_empty() {
                continue;
            }

            let (best_idx, best_val) = values
                .iter()
                .copied()
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;
            let tied = values
                .iter()
                .filter(|(i, v)| *i != best_idx && (best_val - v).abs() < FACTOR_EPS)
                .count();
            if tied > 0 {
                continue; // 本因素并列,降级到下一因素
            }

            let selected = materials[best_idx].clone();
            return Some(EssentialCharacterResult {
                reasoning: format!(
                    "成分\"{}\"在因素[{}]上取值{:.2},高于其余成分,构成货品基本特征",
                    selected.name, factor, best_val
                ),
                selected,
                deciding_factor: *factor,
            });
        }
        None
    }

    fn factor_value(m: &MaterialComponent, factor: CharacterFactor) -> Option<f64> {
        match factor {
            CharacterFactor::RoleInUse => m.role_score,
            CharacterFactor::Value => m.value_share,
            CharacterFactor::Weight => m.weight_share.or(m.percentage),
            CharacterFactor::Quantity => m.quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::CandidateLevel;

    fn candidate(code: &str, desc: &str) -> Candidate {
        Candidate {
            code: code.to_string(),
            description: desc.to_string(),
            level: CandidateLevel::Heading,
            specificity_score: 0.0,
            match_score: 0.5,
        }
    }

    fn material(name: &str) -> MaterialComponent {
        MaterialComponent::named(name)
    }

    #[test]
    fn test_longer_code_always_more_specific() {
        let a = candidate("610910", "子目");
        let b = candidate("6109", "品目,描述较长的一般条文");
        assert!(SpecificityEvaluator::compare_specificity(&a, &b) > 0);
    }

    #[test]
    fn test_equal_code_len_falls_back_to_description() {
        let a = candidate("6109", "T恤衫、汗衫及其他背心,针织或钩编");
        let b = candidate("6110", "套头衫");
        assert!(SpecificityEvaluator::compare_specificity(&a, &b) > 0);
        assert!(SpecificityEvaluator::compare_specificity(&b, &a) < 0);
    }

    #[test]
    fn test_rank_reports_tie() {
        let a = candidate("6109", "同长描述甲");
        let b = candidate("6110", "同长描述乙");
        let (_ranked, top) = SpecificityEvaluator::rank_by_specificity(&[a, b]);
        assert!(top.is_none());
    }

    #[test]
    fn test_rank_unique_winner() {
        let a = candidate("610910", "棉制");
        let b = candidate("6109", "T恤衫");
        let (ranked, top) = SpecificityEvaluator::rank_by_specificity(&[b, a]);
        assert_eq!(ranked[0].code, "610910");
        assert_eq!(top.unwrap().code, "610910");
    }

    #[test]
    fn test_essential_character_role_decides_first() {
        let mut cotton = material("棉");
        cotton.role_score = Some(0.9);
        cotton.value_share = Some(0.3);
        let mut polyester = material("聚酯纤维");
        polyester.role_score = Some(0.4);
        polyester.value_share = Some(0.7);

        let result = SpecificityEvaluator::essential_character(&[cotton, polyester]).unwrap();
        assert_eq!(result.selected.name, "棉");
        assert_eq!(result.deciding_factor, CharacterFactor::RoleInUse);
        assert!(result.reasoning.contains("ROLE_IN_USE"));
    }

    #[test]
    fn test_essential_character_tie_falls_to_value() {
        let mut a = material("钢");
        a.role_score = Some(0.5);
        a.value_share = Some(0.8);
        let mut b = material("塑料");
        b.role_score = Some(0.5);
        b.value_share = Some(0.2);

        let result = SpecificityEvaluator::essential_character(&[a, b]).unwrap();
        assert_eq!(result.selected.name, "钢");
        assert_eq!(result.deciding_factor, CharacterFactor::Value);
    }

    #[test]
    fn test_essential_character_all_tied_returns_none() {
        let mut a = material("甲");
        a.role_score = Some(0.5);
        let mut b = material("乙");
        b.role_score = Some(0.5);
        assert!(SpecificityEvaluator::essential_character(&[a, b]).is_none());
    }

    #[test]
    fn test_essential_character_percentage_as_weight_fallback() {
        let mut a = material("棉");
        a.percentage = Some(60.0);
        let mut b = material("聚酯纤维");
        b.percentage = Some(40.0);

        let result = SpecificityEvaluator::essential_character(&[a, b]).unwrap();
        assert_eq!(result.selected.name, "棉");
        assert_eq!(result.deciding_factor, CharacterFactor::Weight);
    }

    #[test]
    fn test_single_material_is_essential() {
        let result = SpecificityEvaluator::essential_character(&[material("棉")]).unwrap();
        assert_eq!(result.selected.name, "棉");
    }
}
