// ==========================================
// 海关商品归类系统 - 归类决定领域模型
// ==========================================
// 红线: 决定一经落库,永不修改、永不删除
// 红线: 更正只能追加 supersedes 决定,原记录原样保留
// ==========================================

use crate::domain::types::GriStep;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// Decision - 归类决定 (不可变)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub decision_id: String,          // 决定ID (UUID)
    pub classification_id: String,    // 所属归类任务
    pub step: GriStep,                // 产生本决定的 GRI 步骤
    pub seq_no: i64,                  // 任务内序号 (严格递增)
    pub question: Option<String>,     // 澄清问题 (若有)
    pub answer: Option<String>,       // 澄清回答 (若有)
    pub reasoning: String,            // 推理说明 (必填, 可解释性红线)
    pub confidence: f64,              // 置信度 [0,1]
    pub legal_basis: Vec<String>,     // 法律依据引用 (条文/类注/章注)
    pub evidence_json: Option<JsonValue>, // 证据 (候选集/互见条款等)
    pub supersedes: Option<String>,   // 被更正决定的ID (追加式更正)
    pub decided_at: NaiveDateTime,
}

impl Decision {
    /// 创建新的归类决定
    pub fn new(
        decision_id: String,
        classification_id: String,
        step: GriStep,
        reasoning: String,
        confidence: f64,
    ) -> Self {
        Self {
            decision_id,
            classification_id,
            step,
            seq_no: 0,
            question: None,
            answer: None,
            reasoning,
            confidence: confidence.clamp(0.0, 1.0),
            legal_basis: vec![step.legal_text().to_string()],
            evidence_json: None,
            supersedes: None,
            decided_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// 设置澄清问答
    pub fn with_question_answer(mut self, question: Option<String>, answer: Option<String>) -> Self {
        self.question = question;
        self.answer = answer;
        self
    }

    /// 追加法律依据引用
    pub fn with_legal_basis(mut self, refs: Vec<String>) -> Self {
        for r in refs {
            if !self.legal_basis.contains(&r) {
                self.legal_basis.push(r);
            }
        }
        self
    }

    /// 设置证据 (转换为JSON)
    pub fn with_evidence<T: Serialize>(mut self, evidence: &T) -> Self {
        self.evidence_json = serde_json::to_value(evidence).ok();
        self
    }
}
