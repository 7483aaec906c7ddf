// ==========================================
// 海关商品归类系统 - 置信度与澄清循环引擎
// ==========================================
// 职责: 置信度计算、缺失特征定位、澄清问题生成与回答合并
// 红线: 已回答类目绝不重复提问;问题数受最大值约束,结构性保证终止
// 说明: 轮次之间无持久连接,全部状态在持久化的任务元数据中
// ==========================================

use crate::domain::candidate::{Candidate, ExtractedFeatures, MaterialComponent};
use crate::engine::steps::{ClarifyCategory, ClarifyQuestion};
use crate::extract::{FeatureExtraction, KeywordFeatureExtractor};

/// 置信度封顶值 (单候选比值1.0也不得声称确定)
pub const CONFIDENCE_CAP: f64 = 0.99;

// ==========================================
// ClarificationLoop - 澄清循环引擎
// ==========================================
pub struct ClarificationLoop;

impl ClarificationLoop {
    /// 置信度 = 首位候选评分 / 总评分, 封顶 0.99
    ///
    /// # 边界
    /// - 空候选集 ⇒ 0.0
    /// - 总评分为 0 ⇒ 0.0
    pub fn compute_confidence(candidates: &[Candidate]) -> f64 {
        let total: f64 = candidates.iter().map(|c| c.match_score).sum();
        if total <= 0.0 {
            return 0.0;
        }
        let top = candidates
            .first()
            .map(|c| c.match_score)
            .unwrap_or_default();
        (top / total).min(CONFIDENCE_CAP)
    }

    /// 定位价值最高的缺失特征并生成一个澄清问题
    ///
    /// # 优先顺序
    /// - 用途 > 材质 > 材质明细
    ///
    /// # 返回
    /// - None: 无缺失类目可问,或问题数已达上限 (循环终止)
    pub fn next_question(
        features: &ExtractedFeatures,
        answered_categories: &[String],
        questions_asked: u32,
        max_questions: u32,
    ) -> Option<ClarifyQuestion> {
        if questions_asked >= max_questions {
            return None;
        }

        for category in ClarifyCategory::priority_order() {
            if answered_categories.contains(&category.as_str().to_string()) {
                continue;
            }
            if !Self::category_missing(features, *category) {
                continue;
            }
            return Some(Self::build_question(*category));
        }
        None
    }

    fn category_missing(features: &ExtractedFeatures, category: ClarifyCategory) -> bool {
        match category {
            ClarifyCategory::Purpose => features.purpose.is_none(),
            ClarifyCategory::Material => features.materials.is_empty(),
            ClarifyCategory::MaterialDetail => {
                !features.materials.is_empty()
                    && features.materials.iter().any(|m| {
                        m.percentage.is_none()
                            && m.role_score.is_none()
                            && m.value_share.is_none()
                    })
            }
        }
    }

    /// 生成问题: 至多3个预设选项 + 自由文本兜底
    fn build_question(category: ClarifyCategory) -> ClarifyQuestion {
        let (text, options) = match category {
            ClarifyCategory::Purpose => (
                "该商品的主要用途是什么?",
                vec!["服装".to_string(), "家用".to_string(), "工业".to_string()],
            ),
            ClarifyCategory::Material => (
                "该商品的主要材质是什么?",
                vec![
                    "棉".to_string(),
                    "聚酯纤维".to_string(),
                    "钢".to_string(),
                ],
            ),
            ClarifyCategory::MaterialDetail => (
                "主要材质的成分占比是多少?",
                vec![
                    "100%".to_string(),
                    "50%以上".to_string(),
                    "50%以下".to_string(),
                ],
            ),
        };
        ClarifyQuestion {
            category,
            text: text.to_string(),
            options,
            allow_free_text: true,
        }
    }

    /// 将回答合并进特征 (触发下一轮解析/评估)
    pub fn merge_answer(features: &mut ExtractedFeatures, category: ClarifyCategory, answer: &str) {
        let answer = answer.trim();
        if answer.is_empty() {
            return;
        }
        match category {
            ClarifyCategory::Purpose => {
                features.purpose = Some(answer.to_string());
            }
            ClarifyCategory::Material => {
                // 先走词表提取,词表未命中时以原文作为材质名
                let extracted = KeywordFeatureExtractor
                    .extract_features(answer)
                    .unwrap_or_default();
                if extracted.materials.is_empty() {
                    let mut update = ExtractedFeatures::default();
                    update.materials.push(MaterialComponent::named(answer));
                    features.merge(update);
                } else {
                    features.merge(extracted);
                }
            }
            ClarifyCategory::MaterialDetail => {
                let percentage = parse_percentage(answer);
                if let Some(first) = features.materials.first_mut() {
                    if first.percentage.is_none() {
                        first.percentage = percentage.or(Some(100.0));
                    }
                }
                if percentage.is_none() && !features.technical_specs.contains(&answer.to_string())
                {
                    features.technical_specs.push(answer.to_string());
                }
            }
        }
    }
}

/// 从回答中粗提百分比 ("100%" / "60" / "50%以上")
fn parse_percentage(answer: &str) -> Option<f64> {
    let digits: String = answer
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits
        .parse::<f64>()
        .ok()
        .filter(|p| *p > 0.0 && *p <= 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::CandidateLevel;

    fn candidate(code: &str, score: f64) -> Candidate {
        Candidate {
            code: code.to_string(),
            description: code.to_string(),
            level: CandidateLevel::Heading,
            specificity_score: 0.0,
            match_score: score,
        }
    }

    #[test]
    fn test_confidence_singleton_capped() {
        let c = [candidate("6109", 0.8)];
        assert_eq!(ClarificationLoop::compute_confidence(&c), CONFIDENCE_CAP);
    }

    #[test]
    fn test_confidence_ratio() {
        let c = [candidate("6109", 0.6), candidate("6110", 0.2)];
        let conf = ClarificationLoop::compute_confidence(&c);
        assert!((conf - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_empty_zero() {
        assert_eq!(ClarificationLoop::compute_confidence(&[]), 0.0);
    }

    #[test]
    fn test_question_priority_purpose_first() {
        let features = ExtractedFeatures::default();
        let q = ClarificationLoop::next_question(&features, &[], 0, 3).unwrap();
        assert_eq!(q.category, ClarifyCategory::Purpose);
        assert!(q.options.len() <= 3);
        assert!(q.allow_free_text);
    }

    #[test]
    fn test_answered_category_never_reasked() {
        let features = ExtractedFeatures::default();
        let q = ClarificationLoop::next_question(&features, &["purpose".to_string()], 1, 3)
            .unwrap();
        assert_eq!(q.category, ClarifyCategory::Material);
    }

    #[test]
    fn test_max_questions_terminates() {
        let features = ExtractedFeatures::default();
        assert!(ClarificationLoop::next_question(&features, &[], 3, 3).is_none());
    }

    #[test]
    fn test_no_missing_category_terminates() {
        let mut features = ExtractedFeatures::default();
        features.purpose = Some("服装".to_string());
        let mut cotton = MaterialComponent::named("棉");
        cotton.percentage = Some(100.0);
        features.materials.push(cotton);

        assert!(ClarificationLoop::next_question(&features, &[], 0, 3).is_none());
    }

    #[test]
    fn test_merge_material_answer_via_lexicon() {
        let mut features = ExtractedFeatures::default();
        ClarificationLoop::merge_answer(&mut features, ClarifyCategory::Material, "100%棉");
        assert_eq!(features.materials.len(), 1);
        assert_eq!(features.materials[0].name, "棉");
    }

    #[test]
    fn test_merge_material_detail_sets_percentage() {
        let mut features = ExtractedFeatures::default();
        features.materials.push(MaterialComponent::named("棉"));
        ClarificationLoop::merge_answer(&mut features, ClarifyCategory::MaterialDetail, "100%");
        assert_eq!(features.materials[0].percentage, Some(100.0));
    }
}
