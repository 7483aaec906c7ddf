// ==========================================
// 海关商品归类系统 - GRI 规则引擎
// ==========================================
// 职责: 按法定顺序推进归类任务,每步产出可追溯的决定
// 红线: 规则只能按编号递增应用;法律上不适用的规则显式记录"不适用"
// 红线: 每步的决定、审计与 current_step 推进同一事务落库,任何失败让
//       任务停在当前步骤,重试从持久化的步骤与工作集快照原样恢复
// 红线: 澄清轮次之间不保留进程内状态,全部经元数据持久化
// ==========================================

use crate::config::classify_config_trait::ClassifyConfigReader;
use crate::domain::candidate::Candidate;
use crate::domain::classification::{Classification, ClassifyMetadata, StepSnapshot};
use crate::domain::decision::Decision;
use crate::domain::types::{CandidateLevel, ClassificationStatus, GriStep};
use crate::engine::clarification::ClarificationLoop;
use crate::engine::knowledge::TariffKnowledgeBase;
use crate::engine::notify::LowConfidenceNotifier;
use crate::engine::recorder::{DecisionRecorder, RecorderError};
use crate::engine::resolver::{CandidateResolver, ResolverWeights};
use crate::engine::specificity::SpecificityEvaluator;
use crate::engine::steps::{ClarifyQuestion, StepEvidence};
use crate::extract::FeatureExtraction;
use crate::repository::classification_repo::ClassificationRepository;
use crate::repository::error::RepositoryError;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

// ==========================================
// EngineError - 引擎错误
// ==========================================
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("归类任务状态不允许推进: {0}")]
    InvalidState(String),

    #[error("归类任务已因审计链问题冻结: {0}")]
    Frozen(String),

    #[error("知识库查询失败: {0}")]
    Knowledge(String),

    #[error("配置读取失败: {0}")]
    Config(String),

    #[error("记录器错误: {0}")]
    Recorder(#[from] RecorderError),

    #[error("仓储错误: {0}")]
    Repository(#[from] RepositoryError),
}

pub type EngineResult<T> = Result<T, EngineError>;

// ==========================================
// EngineOutcome - 单次推进的结果
// ==========================================
#[derive(Debug, Clone)]
pub enum EngineOutcome {
    /// 需要调用方回答澄清问题后再推进 (附当前计算的置信度)
    Question {
        question: ClarifyQuestion,
        confidence: f64,
    },
    /// 归类完成,税号已通过校验
    Completed { final_code: String, confidence: f64 },
    /// 转专家复核 (无匹配/低置信度/排他未解除)
    NeedsReview { reason: String, confidence: f64 },
}

/// 配置快照 (单次推进内配置一致)
struct EngineSettings {
    target_confidence: f64,
    review_threshold: f64,
    notify_threshold: f64,
    max_clarify_questions: u32,
    analogy_similarity_threshold: f64,
    weights: ResolverWeights,
}

// ==========================================
// GriRuleEngine - GRI 规则引擎
// ==========================================
pub struct GriRuleEngine {
    classifications: Arc<ClassificationRepository>,
    recorder: Arc<DecisionRecorder>,
    kb: Arc<dyn TariffKnowledgeBase>,
    extractor: Arc<dyn FeatureExtraction>,
    notifier: Arc<dyn LowConfidenceNotifier>,
    config: Arc<dyn ClassifyConfigReader>,
    resolver: CandidateResolver,
}

impl GriRuleEngine {
    pub fn new(
        classifications: Arc<ClassificationRepository>,
        recorder: Arc<DecisionRecorder>,
        kb: Arc<dyn TariffKnowledgeBase>,
        extractor: Arc<dyn FeatureExtraction>,
        notifier: Arc<dyn LowConfidenceNotifier>,
        config: Arc<dyn ClassifyConfigReader>,
    ) -> Self {
        Self {
            classifications,
            recorder,
            kb,
            extractor,
            notifier,
            config,
            resolver: CandidateResolver::new(),
        }
    }

    async fn load_settings(&self) -> EngineResult<EngineSettings> {
        let cfg = |e: Box<dyn std::error::Error>| EngineError::Config(e.to_string());
        Ok(EngineSettings {
            target_confidence: self.config.get_target_confidence().await.map_err(cfg)?,
            review_threshold: self.config.get_review_threshold().await.map_err(cfg)?,
            notify_threshold: self.config.get_notify_threshold().await.map_err(cfg)?,
            max_clarify_questions: self
                .config
                .get_max_clarify_questions()
                .await
                .map_err(cfg)?,
            analogy_similarity_threshold: self
                .config
                .get_analogy_similarity_threshold()
                .await
                .map_err(cfg)?,
            weights: ResolverWeights {
                keyword: self.config.get_keyword_weight().await.map_err(cfg)?,
                material: self.config.get_material_weight().await.map_err(cfg)?,
                level_boost: self.config.get_level_boost_weight().await.map_err(cfg)?,
            },
        })
    }

    /// 推进归类任务,直到需要提问、完成或转复核
    ///
    /// 任务从持久化的 current_step 恢复,同一任务可跨进程多次推进。
    pub async fn advance(&self, classification_id: &str) -> EngineResult<EngineOutcome> {
        let mut c = self.classifications.get_by_id(classification_id)?;
        let mut meta = c.metadata();

        if meta.frozen {
            return Err(EngineError::Frozen(classification_id.to_string()));
        }
        if c.status != ClassificationStatus::InProgress {
            return Err(EngineError::InvalidState(format!(
                "任务 {} 处于 {} 状态",
                classification_id, c.status
            )));
        }

        let settings = self.load_settings().await?;

        // 中断恢复: 从持久化快照还原步骤间工作集
        // (GRI_1 及之前无快照, 候选集在 GRI_1 重算)
        let snapshot = meta.step_snapshot.take().unwrap_or_default();
        let mut candidates: Vec<Candidate> = snapshot.candidates;
        let mut resolved: Option<Candidate> = snapshot.resolved;
        let mut confidence: f64 = snapshot.confidence;
        let mut final_code: Option<String> = snapshot.final_code;

        let mut step = c.current_step;
        loop {
            c.current_step = step;
            let (mut decision, next) = match step {
                GriStep::PreClassification => {
                    let d = self.run_pre_classification(&c, &mut meta)?;
                    (d, GriStep::Gri1)
                }
                GriStep::Gri1 => {
                    match self
                        .run_gri1(&mut c, &mut meta, &settings, &mut candidates)
                        .await?
                    {
                        Gri1Result::Question(question, conf) => {
                            return Ok(EngineOutcome::Question {
                                question,
                                confidence: conf,
                            });
                        }
                        Gri1Result::Resolved(d, candidate) => {
                            confidence = ClarificationLoop::compute_confidence(&candidates);
                            resolved = Some(candidate);
                            (d, self.after_resolution(&meta))
                        }
                        Gri1Result::Ambiguous(d) => {
                            confidence = ClarificationLoop::compute_confidence(&candidates);
                            (d, GriStep::Gri2a)
                        }
                        Gri1Result::NoMatch(d) => (d, GriStep::Gri2a),
                    }
                }
                GriStep::Gri2a => (
                    self.run_gri2a(&c, &meta, &candidates, confidence)?,
                    GriStep::Gri2b,
                ),
                GriStep::Gri2b => (
                    self.run_gri2b(&c, &meta, &mut candidates, confidence)?,
                    GriStep::Gri3a,
                ),
                GriStep::Gri3a => {
                    let (d, top) = self.run_gri3a(&c, &mut candidates)?;
                    match top {
                        Some(top) => {
                            confidence = ratio_confidence(&top, &candidates);
                            resolved = Some(top);
                            (d, self.after_resolution(&meta))
                        }
                        None => (d, GriStep::Gri3b),
                    }
                }
                GriStep::Gri3b => {
                    let (d, selected) = self.run_gri3b(&c, &meta, &candidates)?;
                    match selected {
                        Some(selected) => {
                            confidence = ratio_confidence(&selected, &candidates);
                            resolved = Some(selected);
                            (d, self.after_resolution(&meta))
                        }
                        None => (d, GriStep::Gri3c),
                    }
                }
                GriStep::Gri3c => {
                    let (d, selected) = self.run_gri3c(&c, &candidates)?;
                    match selected {
                        Some(selected) => {
                            confidence = ratio_confidence(&selected, &candidates);
                            resolved = Some(selected);
                            (d, self.after_resolution(&meta))
                        }
                        None => (d, GriStep::Gri4),
                    }
                }
                GriStep::Gri4 => {
                    let (d, hit) = self.run_gri4(&c, &settings)?;
                    match hit {
                        Some((candidate, similarity)) => {
                            confidence =
                                similarity.min(crate::engine::clarification::CONFIDENCE_CAP);
                            resolved = Some(candidate);
                            (d, self.after_resolution(&meta))
                        }
                        None => {
                            // 规则一至四全部穷尽仍无解: 转专家复核
                            return self
                                .finish_needs_review(
                                    &mut c,
                                    &mut meta,
                                    &settings,
                                    "未找到匹配的税则条文,且无可类比的已归类货品",
                                    0.0,
                                    Some(d),
                                )
                                .await;
                        }
                    }
                }
                GriStep::Gri5a => (self.run_gri5a(&c, &meta, confidence)?, GriStep::Gri5b),
                GriStep::Gri5b => (self.run_gri5b(&c, &meta, confidence)?, GriStep::Gri6),
                GriStep::Gri6 => {
                    let heading_candidate = match &resolved {
                        Some(r) => r.clone(),
                        None => {
                            return self
                                .finish_needs_review(
                                    &mut c,
                                    &mut meta,
                                    &settings,
                                    "进入子目归类时缺少已定品目",
                                    confidence,
                                    None,
                                )
                                .await;
                        }
                    };
                    let (d, code) =
                        self.run_gri6(&c, &meta, &settings, &heading_candidate, confidence)?;
                    final_code = Some(code);
                    (d, GriStep::Validation)
                }
                GriStep::Validation => {
                    let code = match &final_code {
                        Some(code) => code.clone(),
                        None => {
                            return self
                                .finish_needs_review(
                                    &mut c,
                                    &mut meta,
                                    &settings,
                                    "校验阶段缺少待核税号",
                                    confidence,
                                    None,
                                )
                                .await;
                        }
                    };
                    let (d, unresolved) = self.run_validation(&c, &code, confidence)?;
                    if !unresolved.is_empty() {
                        return self
                            .finish_needs_review(
                                &mut c,
                                &mut meta,
                                &settings,
                                &format!("存在未解除的排他条款: {}", unresolved.join("; ")),
                                confidence,
                                Some(d),
                            )
                            .await;
                    }
                    if confidence < settings.review_threshold {
                        return self
                            .finish_needs_review(
                                &mut c,
                                &mut meta,
                                &settings,
                                "最终置信度低于专家复核阈值",
                                confidence,
                                Some(d),
                            )
                            .await;
                    }
                    return self
                        .finish_completed(&mut c, &mut meta, &settings, code, confidence, d)
                        .await;
                }
            };

            // 红线: 决定落库与步骤推进同一事务,中断后从持久化步骤原样恢复
            c.current_step = next;
            meta.step_snapshot = if next == GriStep::Gri1 {
                None
            } else {
                Some(StepSnapshot {
                    candidates: candidates.clone(),
                    resolved: resolved.clone(),
                    confidence,
                    final_code: final_code.clone(),
                })
            };
            c.set_metadata(&meta);
            self.recorder.append_and_advance(&mut decision, &c)?;
            step = next;
        }
    }

    /// 品目已定后的去向: 有包装信息则过规则五,否则直达规则六
    fn after_resolution(&self, meta: &ClassifyMetadata) -> GriStep {
        if meta.features.packing.is_some() {
            GriStep::Gri5a
        } else {
            GriStep::Gri6
        }
    }

    // ==========================================
    // 各步骤实现
    // ==========================================

    fn run_pre_classification(
        &self,
        c: &Classification,
        meta: &mut ClassifyMetadata,
    ) -> EngineResult<Decision> {
        // 提取失败降级为空特征,不阻断归类
        let extracted = self
            .extractor
            .extract_features(&c.description)
            .unwrap_or_default();
        meta.features.merge(extracted);

        let evidence = StepEvidence::PreClassification {
            features: meta.features.clone(),
        };
        Ok(Decision::new(
            Uuid::new_v4().to_string(),
            c.classification_id.clone(),
            GriStep::PreClassification,
            format!(
                "商品描述规范化完成: 材质{}项, 用途{}",
                meta.features.materials.len(),
                meta.features.purpose.as_deref().unwrap_or("未知")
            ),
            1.0,
        )
        .with_evidence(&evidence))
    }

    async fn run_gri1(
        &self,
        c: &mut Classification,
        meta: &mut ClassifyMetadata,
        settings: &EngineSettings,
        candidates: &mut Vec<Candidate>,
    ) -> EngineResult<Gri1Result> {
        let outcome = self
            .resolver
            .resolve(
                self.kb.as_ref(),
                &c.description,
                &meta.features,
                &settings.weights,
                true,
            )
            .map_err(|e| EngineError::Knowledge(e.to_string()))?;
        *candidates = outcome.candidates;

        // 候选语境的法律注释与互见条款 (附入证据, 互见绝不剪枝)
        let mut contexts: Vec<String> = Vec::new();
        for cand in candidates.iter() {
            for ctx in [cand.chapter().to_string(), cand.heading().to_string()] {
                if !contexts.contains(&ctx) {
                    contexts.push(ctx);
                }
            }
        }
        let mut legal_notes = Vec::new();
        let mut cross_references = Vec::new();
        for ctx in &contexts {
            legal_notes.extend(
                self.kb
                    .get_legal_notes(ctx)
                    .map_err(|e| EngineError::Knowledge(e.to_string()))?,
            );
            cross_references.extend(
                self.kb
                    .get_cross_references(ctx)
                    .map_err(|e| EngineError::Knowledge(e.to_string()))?,
            );
        }
        let note_refs: Vec<String> = legal_notes.iter().map(|n| n.note_ref.clone()).collect();

        // 最近一轮澄清问答附入本步决定 (决定即完整归类叙事)
        let last_question = meta.last_question.take();
        let last_answer = meta.last_answer.take();

        let evidence = StepEvidence::Gri1 {
            candidates: candidates.clone(),
            pruned: outcome.pruned,
            legal_notes,
            cross_references,
        };

        if candidates.is_empty() {
            let decision = Decision::new(
                Uuid::new_v4().to_string(),
                c.classification_id.clone(),
                GriStep::Gri1,
                "按品目条文检索未找到匹配条文,继续适用后续规则".to_string(),
                0.0,
            )
            .with_question_answer(last_question, last_answer)
            .with_evidence(&evidence);
            return Ok(Gri1Result::NoMatch(decision));
        }

        if candidates.len() == 1 {
            let only = candidates[0].clone();
            let decision = Decision::new(
                Uuid::new_v4().to_string(),
                c.classification_id.clone(),
                GriStep::Gri1,
                format!("品目条文唯一匹配: {} {}", only.code, only.description),
                ClarificationLoop::compute_confidence(candidates),
            )
            .with_question_answer(last_question, last_answer)
            .with_legal_basis(note_refs)
            .with_evidence(&evidence);
            return Ok(Gri1Result::Resolved(decision, only));
        }

        // 多候选且未达目标置信度: 先澄清再决
        let conf = ClarificationLoop::compute_confidence(candidates);
        if conf < settings.target_confidence {
            if let Some(question) = ClarificationLoop::next_question(
                &meta.features,
                &meta.answered_categories,
                meta.questions_asked,
                settings.max_clarify_questions,
            ) {
                meta.questions_asked += 1;
                meta.pending_question = serde_json::to_value(&question).ok();
                meta.step_snapshot = None;
                c.set_metadata(meta);
                c.current_step = GriStep::Gri1;
                // 提问时的运行中置信度对调用方可见
                c.confidence = Some(conf);

                // 提问审计与待决问题落库同一事务
                let question_json =
                    serde_json::to_value(&question).unwrap_or(serde_json::Value::Null);
                self.recorder.record_clarification_asked(c, &question_json)?;
                info!(
                    classification_id = %c.classification_id,
                    category = question.category.as_str(),
                    "发出澄清问题"
                );
                return Ok(Gri1Result::Question(question, conf));
            }
        }

        let decision = Decision::new(
            Uuid::new_v4().to_string(),
            c.classification_id.clone(),
            GriStep::Gri1,
            format!("品目条文匹配到{}个候选,歧义未消,转入规则二", candidates.len()),
            conf,
        )
        .with_question_answer(last_question, last_answer)
        .with_legal_basis(note_refs)
        .with_evidence(&evidence);
        Ok(Gri1Result::Ambiguous(decision))
    }

    fn run_gri2a(
        &self,
        c: &Classification,
        meta: &ClassifyMetadata,
        candidates: &[Candidate],
        confidence: f64,
    ) -> EngineResult<Decision> {
        let applies = meta.features.is_incomplete && !candidates.is_empty();
        let reasoning = if applies {
            "货品为不完整品/未制成品,已具完整品基本特征,按完整品的候选品目继续归类".to_string()
        } else {
            "不适用: 货品并非不完整品或未制成品".to_string()
        };
        let evidence = StepEvidence::Gri2a {
            applies,
            candidates: candidates.to_vec(),
        };
        Ok(Decision::new(
            Uuid::new_v4().to_string(),
            c.classification_id.clone(),
            GriStep::Gri2a,
            reasoning,
            confidence,
        )
        .with_evidence(&evidence))
    }

    fn run_gri2b(
        &self,
        c: &Classification,
        meta: &ClassifyMetadata,
        candidates: &mut Vec<Candidate>,
        confidence: f64,
    ) -> EngineResult<Decision> {
        let applies = meta.features.is_mixture && meta.features.materials.len() > 1;

        if applies {
            // 按各成分材质扩展候选集 (归类在规则三决出)
            for material in &meta.features.materials {
                let hits = self
                    .kb
                    .lookup_by_keyword(&material.name, &[])
                    .map_err(|e| EngineError::Knowledge(e.to_string()))?;
                if let Some(top) = hits.into_iter().next() {
                    if !candidates.iter().any(|existing| existing.code == top.code) {
                        candidates.push(top);
                    }
                }
            }
        }

        let reasoning = if applies {
            format!(
                "混合/组合货品,候选集扩展到{}个成分材质涉及的品目",
                meta.features.materials.len()
            )
        } else {
            "不适用: 货品并非混合物或组合物".to_string()
        };
        let evidence = StepEvidence::Gri2b {
            applies,
            expanded_from: meta.features.materials.clone(),
            candidates: candidates.clone(),
        };
        Ok(Decision::new(
            Uuid::new_v4().to_string(),
            c.classification_id.clone(),
            GriStep::Gri2b,
            reasoning,
            confidence,
        )
        .with_evidence(&evidence))
    }

    fn run_gri3a(
        &self,
        c: &Classification,
        candidates: &mut Vec<Candidate>,
    ) -> EngineResult<(Decision, Option<Candidate>)> {
        if candidates.len() < 2 {
            let decision = Decision::new(
                Uuid::new_v4().to_string(),
                c.classification_id.clone(),
                GriStep::Gri3a,
                "不适用: 候选不足两项,无列名比较余地".to_string(),
                0.0,
            )
            .with_evidence(&StepEvidence::Gri3a {
                ranking: candidates.clone(),
            });
            return Ok((decision, None));
        }

        let (ranking, unique_top) = SpecificityEvaluator::rank_by_specificity(candidates);
        *candidates = ranking.clone();
        let evidence = StepEvidence::Gri3a { ranking };

        match unique_top {
            Some(top) => {
                let decision = Decision::new(
                    Uuid::new_v4().to_string(),
                    c.classification_id.clone(),
                    GriStep::Gri3a,
                    format!("列名最具体的品目: {} {}", top.code, top.description),
                    ratio_confidence(&top, candidates),
                )
                .with_evidence(&evidence);
                Ok((decision, Some(top)))
            }
            None => {
                let decision = Decision::new(
                    Uuid::new_v4().to_string(),
                    c.classification_id.clone(),
                    GriStep::Gri3a,
                    "具体程度并列,规则三(一)无法决胜,转入规则三(二)".to_string(),
                    0.0,
                )
                .with_evidence(&evidence);
                Ok((decision, None))
            }
        }
    }

    fn run_gri3b(
        &self,
        c: &Classification,
        meta: &ClassifyMetadata,
        candidates: &[Candidate],
    ) -> EngineResult<(Decision, Option<Candidate>)> {
        let result = if candidates.is_empty() {
            None
        } else {
            SpecificityEvaluator::essential_character(&meta.features.materials)
        };

        match result {
            Some(res) => {
                // 选中材质 → 候选集中对应的品目 (已知税号前缀优先, 退而看条文描述)
                let matched = candidates
                    .iter()
                    .find(|cand| {
                        res.selected
                            .hs_code
                            .as_ref()
                            .is_some_and(|code| cand.code.starts_with(&code[..code.len().min(4)]))
                    })
                    .or_else(|| {
                        candidates
                            .iter()
                            .find(|cand| crate::extract::keyword_hit(&cand.description, &res.selected.name))
                    })
                    .cloned();

                let evidence = StepEvidence::Gri3b {
                    selected_material: Some(res.selected.clone()),
                    deciding_factor: Some(res.deciding_factor),
                };
                match matched {
                    Some(candidate) => {
                        let decision = Decision::new(
                            Uuid::new_v4().to_string(),
                            c.classification_id.clone(),
                            GriStep::Gri3b,
                            format!("{}; 归入品目 {}", res.reasoning, candidate.heading()),
                            ratio_confidence(&candidate, candidates),
                        )
                        .with_evidence(&evidence);
                        Ok((decision, Some(candidate)))
                    }
                    None => {
                        let decision = Decision::new(
                            Uuid::new_v4().to_string(),
                            c.classification_id.clone(),
                            GriStep::Gri3b,
                            format!("{}; 但候选集中无对应品目,转入规则三(三)", res.reasoning),
                            0.0,
                        )
                        .with_evidence(&evidence);
                        Ok((decision, None))
                    }
                }
            }
            None => {
                let reasoning = if candidates.is_empty() {
                    "不适用: 候选集为空".to_string()
                } else {
                    "各判定因素均并列或缺失,无法判定基本特征,转入规则三(三)".to_string()
                };
                let decision = Decision::new(
                    Uuid::new_v4().to_string(),
                    c.classification_id.clone(),
                    GriStep::Gri3b,
                    reasoning,
                    0.0,
                )
                .with_evidence(&StepEvidence::Gri3b {
                    selected_material: None,
                    deciding_factor: None,
                });
                Ok((decision, None))
            }
        }
    }

    fn run_gri3c(
        &self,
        c: &Classification,
        candidates: &[Candidate],
    ) -> EngineResult<(Decision, Option<Candidate>)> {
        if candidates.is_empty() {
            let decision = Decision::new(
                Uuid::new_v4().to_string(),
                c.classification_id.clone(),
                GriStep::Gri3c,
                "不适用: 候选集为空".to_string(),
                0.0,
            )
            .with_evidence(&StepEvidence::Gri3c {
                remaining: vec![],
                selected_code: String::new(),
            });
            return Ok((decision, None));
        }

        // 号列顺序最后的品目 (编码字典序即号列顺序)
        let selected = candidates
            .iter()
            .max_by(|a, b| a.code.cmp(&b.code))
            .cloned()
            .unwrap_or_else(|| candidates[0].clone());

        let evidence = StepEvidence::Gri3c {
            remaining: candidates.to_vec(),
            selected_code: selected.code.clone(),
        };
        let decision = Decision::new(
            Uuid::new_v4().to_string(),
            c.classification_id.clone(),
            GriStep::Gri3c,
            format!("按号列顺序归入最后的品目: {}", selected.code),
            ratio_confidence(&selected, candidates),
        )
        .with_evidence(&evidence);
        Ok((decision, Some(selected)))
    }

    fn run_gri4(
        &self,
        c: &Classification,
        settings: &EngineSettings,
    ) -> EngineResult<(Decision, Option<(Candidate, f64)>)> {
        let analogy = self
            .kb
            .find_similar_classified(&c.description)
            .map_err(|e| EngineError::Knowledge(e.to_string()))?;

        match analogy {
            Some(m) if m.similarity >= settings.analogy_similarity_threshold => {
                let level = match m.code.len() {
                    8 => CandidateLevel::Tariff,
                    6 => CandidateLevel::Subheading,
                    _ => CandidateLevel::Heading,
                };
                let candidate = Candidate {
                    code: m.code.clone(),
                    description: m.comparator_description.clone(),
                    level,
                    specificity_score: 0.0,
                    match_score: m.similarity,
                };
                let decision = Decision::new(
                    Uuid::new_v4().to_string(),
                    c.classification_id.clone(),
                    GriStep::Gri4,
                    format!(
                        "与已归类货品\"{}\"({})最相类似,相似度{:.2},比照归类",
                        m.comparator_description, m.code, m.similarity
                    ),
                    m.similarity,
                )
                .with_evidence(&StepEvidence::Gri4 {
                    analogy: Some(m.clone()),
                });
                Ok((decision, Some((candidate, m.similarity))))
            }
            other => {
                let reasoning = match &other {
                    Some(m) => format!(
                        "最相似货品\"{}\"相似度{:.2}未达类比阈值{:.2}",
                        m.comparator_description, m.similarity, settings.analogy_similarity_threshold
                    ),
                    None => "无已归类货品可供类比".to_string(),
                };
                let decision = Decision::new(
                    Uuid::new_v4().to_string(),
                    c.classification_id.clone(),
                    GriStep::Gri4,
                    reasoning,
                    0.0,
                )
                .with_evidence(&StepEvidence::Gri4 { analogy: other });
                Ok((decision, None))
            }
        }
    }

    fn run_gri5a(
        &self,
        c: &Classification,
        meta: &ClassifyMetadata,
        confidence: f64,
    ) -> EngineResult<Decision> {
        let packing = meta.features.packing.as_ref();
        let applies = packing.is_some_and(|p| p.specially_fitted);
        let ambiguity_flagged = packing.is_some_and(|p| p.specially_fitted && p.imparts_character);

        let reasoning = if ambiguity_flagged {
            "专用容器本身赋予整体基本特征,随主货品归类存疑,已标记歧义".to_string()
        } else if applies {
            "专用定形容器与所装货品一并归类".to_string()
        } else {
            "不适用: 无专用定形容器".to_string()
        };
        Ok(Decision::new(
            Uuid::new_v4().to_string(),
            c.classification_id.clone(),
            GriStep::Gri5a,
            reasoning,
            confidence,
        )
        .with_evidence(&StepEvidence::Gri5a {
            applies,
            ambiguity_flagged,
        }))
    }

    fn run_gri5b(
        &self,
        c: &Classification,
        meta: &ClassifyMetadata,
        confidence: f64,
    ) -> EngineResult<Decision> {
        let packing = meta.features.packing.as_ref();
        // 明显可重复使用的包装不随主货品
        let applies = packing.is_some_and(|p| !p.reusable);

        let reasoning = if applies {
            "一般包装材料及容器与所装货品一并归类".to_string()
        } else if packing.is_some() {
            "不适用: 包装明显可重复使用,不随主货品归类".to_string()
        } else {
            "不适用: 无包装信息".to_string()
        };
        Ok(Decision::new(
            Uuid::new_v4().to_string(),
            c.classification_id.clone(),
            GriStep::Gri5b,
            reasoning,
            confidence,
        )
        .with_evidence(&StepEvidence::Gri5b { applies }))
    }

    fn run_gri6(
        &self,
        c: &Classification,
        meta: &ClassifyMetadata,
        settings: &EngineSettings,
        heading_candidate: &Candidate,
        confidence: f64,
    ) -> EngineResult<(Decision, String)> {
        let heading = heading_candidate.heading().to_string();
        let refined = self
            .resolver
            .refine_under_heading(
                self.kb.as_ref(),
                &heading,
                &c.description,
                &meta.features,
                &settings.weights,
            )
            .map_err(|e| EngineError::Knowledge(e.to_string()))?;

        // 子目无匹配时以已定编码补零到8位
        let chosen = refined
            .first()
            .map(|r| r.code.clone())
            .unwrap_or_else(|| heading_candidate.code.clone());
        let final_code = format!("{:0<8}", chosen);

        let evidence = StepEvidence::Gri6 {
            heading: heading.clone(),
            refined: refined.clone(),
            final_code: final_code.clone(),
        };
        let reasoning = if refined.is_empty() {
            format!("品目 {} 下无更细子目条文,编码补零至税则细目 {}", heading, final_code)
        } else {
            format!("品目 {} 下子目条文比照规则一至五适用,确定税则细目 {}", heading, final_code)
        };
        let decision = Decision::new(
            Uuid::new_v4().to_string(),
            c.classification_id.clone(),
            GriStep::Gri6,
            reasoning,
            confidence,
        )
        .with_evidence(&evidence);
        Ok((decision, final_code))
    }

    /// 校验步骤: 校验码复核 + 排他条款终检
    ///
    /// # 返回
    /// - 未解除的排他条款出处列表 (非空 ⇒ 转专家复核)
    fn run_validation(
        &self,
        c: &Classification,
        final_code: &str,
        confidence: f64,
    ) -> EngineResult<(Decision, Vec<String>)> {
        let report = self
            .kb
            .validate_check_digit(final_code)
            .map_err(|e| EngineError::Knowledge(e.to_string()))?;
        if !report.matches() {
            // 校验码不一致属知识库数据问题,记录但不阻断
            warn!(
                code = final_code,
                computed = report.computed,
                registered = ?report.registered,
                "校验码与知识库登记值不一致"
            );
        }

        let mut unresolved = Vec::new();
        for ctx in [&final_code[..2], &final_code[..4]] {
            for rule in self
                .kb
                .get_exclusions(ctx)
                .map_err(|e| EngineError::Knowledge(e.to_string()))?
            {
                if rule.excludes(final_code) && !unresolved.contains(&rule.note_ref) {
                    unresolved.push(rule.note_ref);
                }
            }
        }

        let evidence = StepEvidence::Validation {
            check_digit: report,
            unresolved_exclusions: unresolved.clone(),
        };
        let reasoning = if unresolved.is_empty() {
            format!("税号 {} 通过校验码复核与排他条款终检", final_code)
        } else {
            format!("税号 {} 触发未解除的排他条款", final_code)
        };
        let decision = Decision::new(
            Uuid::new_v4().to_string(),
            c.classification_id.clone(),
            GriStep::Validation,
            reasoning,
            confidence,
        )
        .with_evidence(&evidence);
        Ok((decision, unresolved))
    }

    // ==========================================
    // 终态处理
    // ==========================================

    async fn finish_completed(
        &self,
        c: &mut Classification,
        meta: &mut ClassifyMetadata,
        settings: &EngineSettings,
        final_code: String,
        confidence: f64,
        mut decision: Decision,
    ) -> EngineResult<EngineOutcome> {
        self.maybe_notify(c, meta, settings, confidence).await;

        let from = c.status;
        c.status = ClassificationStatus::Completed;
        c.final_code = Some(final_code.clone());
        c.confidence = Some(confidence);
        c.current_step = GriStep::Validation;
        meta.step_snapshot = None;
        c.set_metadata(meta);
        // 校验决定 + 状态变更审计 + 任务行更新: 同一事务
        self.recorder
            .record_finish(Some(&mut decision), c, from, "归类完成,税号通过校验")?;

        info!(
            classification_id = %c.classification_id,
            final_code = %final_code,
            confidence = format!("{:.2}", confidence),
            "归类完成"
        );
        Ok(EngineOutcome::Completed {
            final_code,
            confidence,
        })
    }

    async fn finish_needs_review(
        &self,
        c: &mut Classification,
        meta: &mut ClassifyMetadata,
        settings: &EngineSettings,
        reason: &str,
        confidence: f64,
        mut decision: Option<Decision>,
    ) -> EngineResult<EngineOutcome> {
        self.maybe_notify(c, meta, settings, confidence).await;

        let from = c.status;
        c.status = ClassificationStatus::NeedsReview;
        c.final_code = None;
        c.confidence = Some(confidence);
        meta.step_snapshot = None;
        c.set_metadata(meta);
        // 末步决定 (若有) + 状态变更审计 + 任务行更新: 同一事务
        self.recorder
            .record_finish(decision.as_mut(), c, from, reason)?;

        warn!(
            classification_id = %c.classification_id,
            confidence = format!("{:.2}", confidence),
            "归类转专家复核: {}",
            reason
        );
        Ok(EngineOutcome::NeedsReview {
            reason: reason.to_string(),
            confidence,
        })
    }

    /// 低置信度通知 (每个任务至多一次; 通知失败只记日志)
    async fn maybe_notify(
        &self,
        c: &Classification,
        meta: &mut ClassifyMetadata,
        settings: &EngineSettings,
        confidence: f64,
    ) {
        if confidence >= settings.notify_threshold || meta.low_confidence_notified {
            return;
        }
        meta.low_confidence_notified = true;
        if let Err(e) = self
            .notifier
            .notify_low_confidence(&c.classification_id, &c.description, confidence)
            .await
        {
            warn!(
                classification_id = %c.classification_id,
                "低置信度通知发送失败: {}",
                e
            );
        }
    }
}

/// GRI_1 步骤的分支结果 (提问分支自行落库, 其余分支携带待记录的决定)
enum Gri1Result {
    Question(ClarifyQuestion, f64),
    Resolved(Decision, Candidate),
    Ambiguous(Decision),
    NoMatch(Decision),
}

/// 选中候选相对整个候选集的评分占比 (封顶0.99)
fn ratio_confidence(selected: &Candidate, candidates: &[Candidate]) -> f64 {
    let total: f64 = candidates.iter().map(|c| c.match_score).sum();
    if total <= 0.0 {
        return 0.0;
    }
    (selected.match_score / total).min(crate::engine::clarification::CONFIDENCE_CAP)
}
