// ==========================================
// 海关商品归类系统 - 候选解析引擎
// ==========================================
// 职责: 知识库检索 → 排他剪枝 → 加权评分
// 红线: 对外部状态为纯函数;无匹配返回空集而非报错
// 红线: 互见条款不参与剪枝
// ==========================================

use crate::domain::candidate::{Candidate, ExtractedFeatures};
use crate::domain::types::CandidateLevel;
use crate::engine::knowledge::TariffKnowledgeBase;
use crate::engine::steps::PrunedCandidate;
use crate::extract::keyword_hit;
use std::collections::HashSet;
use std::error::Error;
use tracing::debug;

// ==========================================
// ResolverWeights - 评分权重
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct ResolverWeights {
    pub keyword: f64,     // 关键词重合度
    pub material: f64,    // 材质匹配
    pub level_boost: f64, // 初次归类的层级加成
}

// ==========================================
// ResolveOutcome - 解析结果
// ==========================================
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    pub candidates: Vec<Candidate>,     // 评分降序
    pub pruned: Vec<PrunedCandidate>,   // 被排他条款剪除的候选
}

// ==========================================
// CandidateResolver - 候选解析引擎
// ==========================================
pub struct CandidateResolver;

impl CandidateResolver {
    pub fn new() -> Self {
        Self
    }

    /// 解析候选集
    ///
    /// # 参数
    /// - kb: 税则知识库
    /// - description: 商品描述
    /// - features: 结构化特征
    /// - weights: 评分权重
    /// - initial: 是否初次归类 (初次时品目层级享受加成)
    pub fn resolve(
        &self,
        kb: &dyn TariffKnowledgeBase,
        description: &str,
        features: &ExtractedFeatures,
        weights: &ResolverWeights,
        initial: bool,
    ) -> Result<ResolveOutcome, Box<dyn Error>> {
        // 1. 知识库检索 (描述 + 材质/用途关键词)
        let mut extra_keywords = features.material_names();
        if let Some(purpose) = &features.purpose {
            extra_keywords.push(purpose.clone());
        }
        extra_keywords.extend(features.technical_specs.iter().cloned());

        let raw = kb.lookup_by_keyword(description, &extra_keywords)?;
        debug!(raw_count = raw.len(), "知识库检索完成");

        // 2. 排他剪枝: 汇集所有候选语境 (章/品目) 的排他规则
        let mut contexts: HashSet<String> = HashSet::new();
        for c in &raw {
            contexts.insert(c.chapter().to_string());
            contexts.insert(c.heading().to_string());
        }
        let mut exclusions = Vec::new();
        for ctx in &contexts {
            exclusions.extend(kb.get_exclusions(ctx)?);
        }

        let mut pruned = Vec::new();
        let mut survivors = Vec::new();
        for candidate in raw {
            // 自身语境不剪自身 (排他规则指向他章/他品目)
            let hit = exclusions
                .iter()
                .find(|r| r.excludes(&candidate.code) && !candidate.code.starts_with(&r.from_code));
            match hit {
                Some(rule) => pruned.push(PrunedCandidate {
                    candidate,
                    note_ref: rule.note_ref.clone(),
                }),
                None => survivors.push(candidate),
            }
        }

        // 3. 评分
        let mut scored: Vec<Candidate> = survivors
            .into_iter()
            .map(|mut c| {
                let keyword_component = c.match_score; // 知识库给出的关键词重合度
                let material_component = if features
                    .materials
                    .iter()
                    .any(|m| keyword_hit(&c.description, &m.name))
                {
                    1.0
                } else {
                    0.0
                };
                let boost = if initial {
                    match c.level {
                        CandidateLevel::Heading => 1.0,
                        CandidateLevel::Subheading => 0.5,
                        CandidateLevel::Tariff => 0.0,
                    }
                } else {
                    0.0
                };
                c.match_score = weights.keyword * keyword_component
                    + weights.material * material_component
                    + weights.level_boost * boost;
                c.specificity_score =
                    c.code.len() as f64 + c.description.chars().count() as f64 / 1000.0;
                c
            })
            .collect();

        // 4. 去重 + 降序
        scored.sort_by(|a, b| {
            b.match_score
                .partial_cmp(&a.match_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.code.cmp(&b.code))
        });
        let mut seen = HashSet::new();
        scored.retain(|c| seen.insert(c.code.clone()));

        debug!(
            candidate_count = scored.len(),
            pruned_count = pruned.len(),
            "候选解析完成"
        );
        Ok(ResolveOutcome {
            candidates: scored,
            pruned,
        })
    }

    /// 在指定品目下细化候选 (规则六: 子目层级)
    pub fn refine_under_heading(
        &self,
        kb: &dyn TariffKnowledgeBase,
        heading: &str,
        description: &str,
        features: &ExtractedFeatures,
        weights: &ResolverWeights,
    ) -> Result<Vec<Candidate>, Box<dyn Error>> {
        let outcome = self.resolve(kb, description, features, weights, false)?;
        let mut refined: Vec<Candidate> = outcome
            .candidates
            .into_iter()
            .filter(|c| c.code.starts_with(heading) && c.level > CandidateLevel::Heading)
            .collect();
        refined.sort_by(|a, b| {
            b.match_score
                .partial_cmp(&a.match_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    // 同分时取更具体 (更长编码)
                    b.code.len().cmp(&a.code.len())
                })
        });
        Ok(refined)
    }
}

impl Default for CandidateResolver {
    fn default() -> Self {
        Self::new()
    }
}
