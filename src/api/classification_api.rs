// ==========================================
// 海关商品归类系统 - 归类 API
// ==========================================
// 职责: 对外操作入口 (发起归类/回答澄清/查询/校验/归档/更正)
// 红线: 入口校验失败不产生任何落库痕迹
// 红线: 审计链校验失败 ⇒ 冻结任务,绝不修复链;冻结期间不再追加审计
// ==========================================

use crate::config::classify_config_trait::ClassifyConfigReader;
use crate::domain::audit::AuditEntry;
use crate::domain::classification::Classification;
use crate::domain::decision::Decision;
use crate::domain::types::{ClassificationStatus, GriStep};
use crate::engine::clarification::ClarificationLoop;
use crate::engine::recorder::{DecisionRecorder, RecorderError};
use crate::engine::rule_engine::{EngineOutcome, GriRuleEngine};
use crate::engine::steps::ClarifyQuestion;
use crate::api::error::{ApiError, ApiResult};
use crate::repository::classification_repo::ClassificationRepository;
use crate::repository::decision_repo::DecisionRepository;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

// ==========================================
// ClassificationApi - 归类操作入口
// ==========================================
pub struct ClassificationApi {
    classifications: Arc<ClassificationRepository>,
    decisions: Arc<DecisionRepository>,
    recorder: Arc<DecisionRecorder>,
    engine: Arc<GriRuleEngine>,
    config: Arc<dyn ClassifyConfigReader>,
}

impl ClassificationApi {
    /// 在单个 SQLite 连接上装配完整归类栈 (演示与测试共用)
    pub fn build(
        conn: Arc<std::sync::Mutex<rusqlite::Connection>>,
        config: Arc<dyn ClassifyConfigReader>,
        notifier: Arc<dyn crate::engine::notify::LowConfidenceNotifier>,
    ) -> Self {
        let classifications = Arc::new(ClassificationRepository::new(conn.clone()));
        let decisions = Arc::new(DecisionRepository::new(conn.clone()));
        let recorder = Arc::new(DecisionRecorder::new(conn.clone()));
        let tariffs = Arc::new(crate::repository::tariff_repo::SqliteTariffRepository::new(
            conn,
        ));
        let engine = Arc::new(GriRuleEngine::new(
            classifications.clone(),
            recorder.clone(),
            tariffs,
            Arc::new(crate::extract::KeywordFeatureExtractor),
            notifier,
            config.clone(),
        ));
        Self::new(classifications, decisions, recorder, engine, config)
    }

    pub fn new(
        classifications: Arc<ClassificationRepository>,
        decisions: Arc<DecisionRepository>,
        recorder: Arc<DecisionRecorder>,
        engine: Arc<GriRuleEngine>,
        config: Arc<dyn ClassifyConfigReader>,
    ) -> Self {
        Self {
            classifications,
            decisions,
            recorder,
            engine,
            config,
        }
    }

    // ==========================================
    // 发起归类
    // ==========================================

    /// 发起新的归类任务并推进到首个停点 (提问/完成/转复核)
    ///
    /// # 入口校验
    /// - 描述去空白后不短于配置的最小字符数;校验失败不落库
    pub async fn start_classification(
        &self,
        description: &str,
        actor: &str,
    ) -> ApiResult<(String, EngineOutcome)> {
        let description = description.trim();
        let min_len = self
            .config
            .get_min_description_len()
            .await
            .map_err(|e| ApiError::EngineError(e.to_string()))?;
        if description.chars().count() < min_len {
            return Err(ApiError::ValidationError(format!(
                "商品描述过短 (不足{}字符),请补充材质、用途等信息",
                min_len
            )));
        }

        let classification_id = Uuid::new_v4().to_string();
        let c = Classification::new(classification_id.clone(), description.to_string());
        self.classifications.insert(&c)?;
        self.recorder
            .record_creation(&classification_id, description, actor)?;
        info!(classification_id = %classification_id, "归类任务已创建");

        let outcome = self.engine.advance(&classification_id).await?;
        Ok((classification_id, outcome))
    }

    // ==========================================
    // 澄清回答
    // ==========================================

    /// 回答当前待决的澄清问题并继续推进
    ///
    /// # 顺序校验
    /// - step_id 必须等于任务的 current_step,防止对过期问题作答
    pub async fn submit_answer(
        &self,
        classification_id: &str,
        step_id: &str,
        answer: &str,
        actor: &str,
    ) -> ApiResult<EngineOutcome> {
        let mut c = self.classifications.get_by_id(classification_id)?;
        let mut meta = c.metadata();

        if meta.frozen {
            return Err(ApiError::Frozen(classification_id.to_string()));
        }
        if c.status != ClassificationStatus::InProgress {
            return Err(ApiError::ValidationError(format!(
                "任务处于 {} 状态,不接受澄清回答",
                c.status
            )));
        }
        let step = GriStep::from_str(step_id)
            .ok_or_else(|| ApiError::ValidationError(format!("未知步骤标识: {}", step_id)))?;
        if step != c.current_step {
            return Err(ApiError::RuleOrderViolation(format!(
                "回答针对步骤 {},但任务当前停在 {}",
                step, c.current_step
            )));
        }
        let pending: ClarifyQuestion = meta
            .pending_question
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .ok_or_else(|| {
                ApiError::ValidationError("任务当前没有待回答的澄清问题".to_string())
            })?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(ApiError::ValidationError("澄清回答不能为空".to_string()));
        }

        ClarificationLoop::merge_answer(&mut meta.features, pending.category, answer);
        let category = pending.category.as_str().to_string();
        if !meta.answered_categories.contains(&category) {
            meta.answered_categories.push(category);
        }
        meta.last_question = Some(pending.text.clone());
        meta.last_answer = Some(answer.to_string());
        meta.pending_question = None;
        c.set_metadata(&meta);
        // 回答审计与回答合并结果同一事务落库
        self.recorder.record_clarification_answered(
            &c,
            pending.category.as_str(),
            answer,
            actor,
        )?;

        Ok(self.engine.advance(classification_id).await?)
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn get_classification(&self, classification_id: &str) -> ApiResult<Classification> {
        Ok(self.classifications.get_by_id(classification_id)?)
    }

    /// 任务的全部归类决定 (按序号升序, 含被更正决定)
    pub fn list_decisions(&self, classification_id: &str) -> ApiResult<Vec<Decision>> {
        self.classifications.get_by_id(classification_id)?;
        Ok(self.decisions.find_by_classification(classification_id)?)
    }

    /// 任务的完整审计链 (按序号升序)
    pub fn get_audit_trail(&self, classification_id: &str) -> ApiResult<Vec<AuditEntry>> {
        self.classifications.get_by_id(classification_id)?;
        Ok(self.recorder.audit_trail(classification_id)?)
    }

    /// 按状态列出任务 (复核队列等)
    pub fn list_by_status(
        &self,
        status: ClassificationStatus,
    ) -> ApiResult<Vec<Classification>> {
        Ok(self.classifications.find_by_status(status)?)
    }

    // ==========================================
    // 审计链校验
    // ==========================================

    /// 逐环校验任务审计链;断链则冻结任务
    ///
    /// 冻结语义: frozen 标记落库,状态转 NEEDS_REVIEW (已完成任务的
    /// 税号一并撤下,因为其结论不再可信)。链本身绝不修复,且冻结
    /// 过程不追加审计条目 (链已不可信)。
    pub fn verify_audit_trail(&self, classification_id: &str) -> ApiResult<()> {
        match self.recorder.verify(classification_id) {
            Ok(()) => Ok(()),
            Err(RecorderError::AuditIntegrityViolation { seq_no, detail }) => {
                let mut c = self.classifications.get_by_id(classification_id)?;
                let mut meta = c.metadata();
                meta.frozen = true;
                if c.status != ClassificationStatus::Archived {
                    c.status = ClassificationStatus::NeedsReview;
                    c.final_code = None;
                }
                c.set_metadata(&meta);
                self.classifications.update(&c)?;
                error!(
                    classification_id = %classification_id,
                    seq_no = seq_no,
                    "审计链断裂,任务已冻结: {}",
                    detail
                );
                Err(ApiError::AuditIntegrityViolation(format!(
                    "seq_no={}: {}",
                    seq_no, detail
                )))
            }
            Err(other) => Err(other.into()),
        }
    }

    // ==========================================
    // 归档与更正
    // ==========================================

    /// 软终止 (仅 IN_PROGRESS / NEEDS_REVIEW 可归档, 历史全部保留)
    pub fn archive_classification(
        &self,
        classification_id: &str,
        actor: &str,
    ) -> ApiResult<()> {
        let mut c = self.classifications.get_by_id(classification_id)?;
        match c.status {
            ClassificationStatus::InProgress | ClassificationStatus::NeedsReview => {}
            other => {
                return Err(ApiError::ValidationError(format!(
                    "任务处于 {} 状态,不可归档",
                    other
                )));
            }
        }
        let from = c.status;
        c.status = ClassificationStatus::Archived;
        // 状态变更审计、归档审计与任务行更新同一事务
        self.recorder.record_archive(&c, from, actor)?;
        Ok(())
    }

    /// 专家更正: 追加引用原决定的新决定,原记录原样保留
    pub fn supersede_decision(
        &self,
        classification_id: &str,
        decision_id: &str,
        reasoning: &str,
        confidence: f64,
        legal_basis: Vec<String>,
    ) -> ApiResult<Decision> {
        let original = self
            .decisions
            .find_by_classification(classification_id)?
            .into_iter()
            .find(|d| d.decision_id == decision_id)
            .ok_or_else(|| ApiError::NotFound {
                entity: "Decision".to_string(),
                id: decision_id.to_string(),
            })?;

        let mut correction = Decision::new(
            Uuid::new_v4().to_string(),
            classification_id.to_string(),
            original.step,
            reasoning.to_string(),
            confidence,
        )
        .with_legal_basis(legal_basis);
        self.recorder
            .append_superseding(&mut correction, decision_id)?;
        Ok(correction)
    }

    /// 当前待回答的澄清问题 (若有)
    pub fn pending_question(
        &self,
        classification_id: &str,
    ) -> ApiResult<Option<ClarifyQuestion>> {
        let c = self.classifications.get_by_id(classification_id)?;
        Ok(c.metadata()
            .pending_question
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok()))
    }
}
