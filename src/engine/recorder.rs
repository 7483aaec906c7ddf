// ==========================================
// 海关商品归类系统 - 决定记录器
// ==========================================
// 职责: 决定落库与审计链封链的唯一入口
// 红线: 规则顺序严格递增,乱序一律拒绝 (RuleOrderViolation)
// 红线: 决定、审计条目与任务行推进同一事务落库,绝不出现
//       有决定无审计、或决定日志领先任务步骤的错位
// 红线: 审计链断链只上报,绝不修复;校验失败后链不可信
// ==========================================

use crate::domain::audit::{AuditAction, AuditEntry, GENESIS_HASH};
use crate::domain::classification::Classification;
use crate::domain::decision::Decision;
use crate::domain::types::{ClassificationStatus, GriStep};
use crate::repository::audit_repo::AuditRepository;
use crate::repository::classification_repo::ClassificationRepository;
use crate::repository::decision_repo::DecisionRepository;
use crate::repository::error::RepositoryError;
use rusqlite::Connection;
use serde_json::json;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

pub const SYSTEM_ACTOR: &str = "system";

// ==========================================
// RecorderError - 记录器错误
// ==========================================
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("规则顺序违规: 上一步骤为 {last:?}, 禁止记录 {attempted:?}")]
    RuleOrderViolation {
        last: Option<GriStep>,
        attempted: GriStep,
    },

    #[error("审计链完整性校验失败 (seq_no={seq_no}): {detail}")]
    AuditIntegrityViolation { seq_no: i64, detail: String },

    #[error("仓储错误: {0}")]
    Repository(#[from] RepositoryError),
}

pub type RecorderResult<T> = Result<T, RecorderError>;

// ==========================================
// DecisionRecorder - 决定记录器
// ==========================================
pub struct DecisionRecorder {
    conn: Arc<Mutex<Connection>>,
    audits: AuditRepository,
}

impl DecisionRecorder {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        let audits = AuditRepository::new(conn.clone());
        Self { conn, audits }
    }

    fn get_conn(&self) -> RecorderResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RecorderError::Repository(RepositoryError::LockError(e.to_string())))
    }

    /// 记录一条步骤决定并封入审计链 (单事务)
    ///
    /// # 顺序红线
    /// - 新决定的步骤序必须严格大于任务已记录的最后步骤序
    pub fn append(&self, decision: &mut Decision) -> RecorderResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction().map_err(RepositoryError::from)?;
        Self::append_decision_tx(&tx, decision)?;
        tx.commit().map_err(RepositoryError::from)?;
        Ok(())
    }

    /// 记录步骤决定并在同一事务内推进任务行 (current_step/元数据)
    ///
    /// 中断恢复依赖这里的原子性: 决定日志与任务步骤要么一起前进,
    /// 要么都停在原地。
    pub fn append_and_advance(
        &self,
        decision: &mut Decision,
        task: &Classification,
    ) -> RecorderResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction().map_err(RepositoryError::from)?;
        Self::append_decision_tx(&tx, decision)?;
        ClassificationRepository::update_on(&tx, task)?;
        tx.commit().map_err(RepositoryError::from)?;
        Ok(())
    }

    /// 终态落库: 步骤决定 (若有) + 状态变更审计 + 任务行更新, 单事务
    ///
    /// 目标状态取自 task.status (调用方先置好终态)。
    pub fn record_finish(
        &self,
        decision: Option<&mut Decision>,
        task: &Classification,
        from: ClassificationStatus,
        reason: &str,
    ) -> RecorderResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction().map_err(RepositoryError::from)?;
        if let Some(d) = decision {
            Self::append_decision_tx(&tx, d)?;
        }
        Self::append_audit_tx(
            &tx,
            &task.classification_id,
            AuditAction::StatusChanged,
            SYSTEM_ACTOR,
            Some(json!({
                "from": from.as_str(),
                "to": task.status.as_str(),
                "reason": reason,
            })),
        )?;
        ClassificationRepository::update_on(&tx, task)?;
        tx.commit().map_err(RepositoryError::from)?;
        Ok(())
    }

    /// 追加式更正: 新决定引用被更正决定,原记录不动 (单事务)
    pub fn append_superseding(
        &self,
        decision: &mut Decision,
        superseded_id: &str,
    ) -> RecorderResult<()> {
        decision.supersedes = Some(superseded_id.to_string());
        let mut conn = self.get_conn()?;
        let tx = conn.transaction().map_err(RepositoryError::from)?;
        DecisionRepository::insert_on(&tx, decision)?;
        Self::append_audit_tx(
            &tx,
            &decision.classification_id,
            AuditAction::DecisionSuperseded,
            SYSTEM_ACTOR,
            Some(json!({
                "decision_id": decision.decision_id,
                "supersedes": superseded_id,
                "step": decision.step.as_str(),
                "reasoning": decision.reasoning,
            })),
        )?;
        tx.commit().map_err(RepositoryError::from)?;
        Ok(())
    }

    /// 任务创建审计条目 (链根, prev_hash = GENESIS)
    pub fn record_creation(
        &self,
        classification_id: &str,
        description: &str,
        actor: &str,
    ) -> RecorderResult<()> {
        let conn = self.get_conn()?;
        Self::append_audit_tx(
            &conn,
            classification_id,
            AuditAction::ClassificationCreated,
            actor,
            Some(json!({ "description": description })),
        )
    }

    /// 澄清问题发出 + 待决问题落库 (单事务)
    pub fn record_clarification_asked(
        &self,
        task: &Classification,
        question: &serde_json::Value,
    ) -> RecorderResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction().map_err(RepositoryError::from)?;
        Self::append_audit_tx(
            &tx,
            &task.classification_id,
            AuditAction::ClarificationAsked,
            SYSTEM_ACTOR,
            Some(json!({ "question": question })),
        )?;
        ClassificationRepository::update_on(&tx, task)?;
        tx.commit().map_err(RepositoryError::from)?;
        Ok(())
    }

    /// 澄清回答收到 + 回答合并结果落库 (单事务)
    pub fn record_clarification_answered(
        &self,
        task: &Classification,
        category: &str,
        answer: &str,
        actor: &str,
    ) -> RecorderResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction().map_err(RepositoryError::from)?;
        Self::append_audit_tx(
            &tx,
            &task.classification_id,
            AuditAction::ClarificationAnswered,
            actor,
            Some(json!({ "category": category, "answer": answer })),
        )?;
        ClassificationRepository::update_on(&tx, task)?;
        tx.commit().map_err(RepositoryError::from)?;
        Ok(())
    }

    /// 软终止: 状态变更 + 归档审计 + 任务行更新 (单事务)
    pub fn record_archive(
        &self,
        task: &Classification,
        from: ClassificationStatus,
        actor: &str,
    ) -> RecorderResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction().map_err(RepositoryError::from)?;
        Self::append_audit_tx(
            &tx,
            &task.classification_id,
            AuditAction::StatusChanged,
            SYSTEM_ACTOR,
            Some(json!({
                "from": from.as_str(),
                "to": task.status.as_str(),
                "reason": "任务归档",
            })),
        )?;
        Self::append_audit_tx(&tx, &task.classification_id, AuditAction::Archived, actor, None)?;
        ClassificationRepository::update_on(&tx, task)?;
        tx.commit().map_err(RepositoryError::from)?;
        Ok(())
    }

    // ==========================================
    // 事务内组装
    // ==========================================

    /// 顺序校验 + 决定插入 + StepDecision 审计 (同一连接/事务)
    fn append_decision_tx(conn: &Connection, decision: &mut Decision) -> RecorderResult<()> {
        let last = DecisionRepository::last_recorded_step_on(conn, &decision.classification_id)?;
        if let Some(last_step) = last {
            if decision.step.order_index() <= last_step.order_index() {
                return Err(RecorderError::RuleOrderViolation {
                    last: Some(last_step),
                    attempted: decision.step,
                });
            }
        }

        DecisionRepository::insert_on(conn, decision)?;
        Self::append_audit_tx(
            conn,
            &decision.classification_id,
            AuditAction::StepDecision,
            SYSTEM_ACTOR,
            Some(json!({
                "decision_id": decision.decision_id,
                "step": decision.step.as_str(),
                "reasoning": decision.reasoning,
                "confidence": decision.confidence,
                "legal_basis": decision.legal_basis,
                "evidence": decision.evidence_json,
            })),
        )?;

        info!(
            classification_id = %decision.classification_id,
            step = decision.step.as_str(),
            seq_no = decision.seq_no,
            "归类决定已记录"
        );
        Ok(())
    }

    fn append_audit_tx(
        conn: &Connection,
        classification_id: &str,
        action: AuditAction,
        actor: &str,
        detail: Option<serde_json::Value>,
    ) -> RecorderResult<()> {
        let (seq_no, prev_hash) = AuditRepository::chain_tail_on(conn, classification_id)?;
        let entry = AuditEntry::new(
            Uuid::new_v4().to_string(),
            classification_id.to_string(),
            seq_no,
            action,
            actor.to_string(),
            detail,
            prev_hash,
        );
        AuditRepository::append_on(conn, &entry)?;
        Ok(())
    }

    /// 任务的完整审计链 (按序号升序)
    pub fn audit_trail(&self, classification_id: &str) -> RecorderResult<Vec<AuditEntry>> {
        Ok(self.audits.find_by_classification(classification_id)?)
    }

    /// 校验任务审计链完整性 (逐环重算)
    ///
    /// # 校验项
    /// - 序号从1起连续递增
    /// - 链首 prev_hash = GENESIS, 其余逐环衔接前条 hash
    /// - 每条目哈希重算一致
    ///
    /// # 返回
    /// - Err(AuditIntegrityViolation): 首个断环的位置与原因
    pub fn verify(&self, classification_id: &str) -> RecorderResult<()> {
        let entries = self.audits.find_by_classification(classification_id)?;

        let mut expected_prev = GENESIS_HASH.to_string();
        for (i, entry) in entries.iter().enumerate() {
            let expected_seq = (i + 1) as i64;
            if entry.seq_no != expected_seq {
                return Err(self.violation(
                    classification_id,
                    entry.seq_no,
                    format!("序号断档: 期望 {}, 实际 {}", expected_seq, entry.seq_no),
                ));
            }
            if entry.prev_hash != expected_prev {
                return Err(self.violation(
                    classification_id,
                    entry.seq_no,
                    "prev_hash 与前条 hash 不衔接".to_string(),
                ));
            }
            if !entry.hash_matches() {
                return Err(self.violation(
                    classification_id,
                    entry.seq_no,
                    "条目内容与哈希不一致 (疑似篡改)".to_string(),
                ));
            }
            expected_prev = entry.hash.clone();
        }
        Ok(())
    }

    fn violation(&self, classification_id: &str, seq_no: i64, detail: String) -> RecorderError {
        error!(
            classification_id = %classification_id,
            seq_no = seq_no,
            "审计链完整性校验失败: {}",
            detail
        );
        RecorderError::AuditIntegrityViolation { seq_no, detail }
    }
}
