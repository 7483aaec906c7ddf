// ==========================================
// 海关商品归类系统 - 审计链领域模型
// ==========================================
// 红线: 审计链只追加,哈希逐环相扣,不可抵赖
// 红线: 任何断链只能上报 AuditIntegrityViolation,绝不静默修复
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::fmt;

/// 链首哨兵值 (任务创建条目的 prev_hash)
pub const GENESIS_HASH: &str = "GENESIS";

// ==========================================
// AuditAction - 审计动作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    ClassificationCreated, // 任务创建 (链根)
    StepDecision,          // GRI 步骤决定
    ClarificationAsked,    // 发出澄清问题
    ClarificationAnswered, // 收到澄清回答
    StatusChanged,         // 状态变更
    DecisionSuperseded,    // 决定被追加更正
    Archived,              // 软终止
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ClassificationCreated => "ClassificationCreated",
            AuditAction::StepDecision => "StepDecision",
            AuditAction::ClarificationAsked => "ClarificationAsked",
            AuditAction::ClarificationAnswered => "ClarificationAnswered",
            AuditAction::StatusChanged => "StatusChanged",
            AuditAction::DecisionSuperseded => "DecisionSuperseded",
            AuditAction::Archived => "Archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ClassificationCreated" => Some(AuditAction::ClassificationCreated),
            "StepDecision" => Some(AuditAction::StepDecision),
            "ClarificationAsked" => Some(AuditAction::ClarificationAsked),
            "ClarificationAnswered" => Some(AuditAction::ClarificationAnswered),
            "StatusChanged" => Some(AuditAction::StatusChanged),
            "DecisionSuperseded" => Some(AuditAction::DecisionSuperseded),
            "Archived" => Some(AuditAction::Archived),
        _ => None,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// AuditEntry - 审计条目
// ==========================================
// hash = sha256(规范序列化(条目) ‖ prev_hash), 十六进制小写
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub audit_id: String,          // 条目ID (UUID)
    pub classification_id: String, // 所属归类任务
    pub seq_no: i64,               // 任务内序号 (严格递增, 1起)
    pub action: AuditAction,       // 审计动作
    pub actor: String,             // 操作者 (system / 用户标识)
    pub detail_json: Option<JsonValue>, // 动作详情
    pub audit_ts: NaiveDateTime,   // 时间戳
    pub prev_hash: String,         // 前一条目哈希 (链首为 GENESIS)
    pub hash: String,              // 本条目哈希
}

/// 哈希输入的规范形式
///
/// 说明: 哈希只覆盖业务字段,hash 本身不参与;
///       serde_json 的 Map 按键排序,序列化结果确定。
#[derive(Serialize)]
struct HashPayload<'a> {
    audit_id: &'a str,
    classification_id: &'a str,
    seq_no: i64,
    action: &'a str,
    actor: &'a str,
    detail_json: &'a Option<JsonValue>,
    audit_ts: String,
}

impl AuditEntry {
    /// 创建并封链: 计算本条目哈希
    pub fn new(
        audit_id: String,
        classification_id: String,
        seq_no: i64,
        action: AuditAction,
        actor: String,
        detail_json: Option<JsonValue>,
        prev_hash: String,
    ) -> Self {
        let mut entry = Self {
            audit_id,
            classification_id,
            seq_no,
            action,
            actor,
            detail_json,
            audit_ts: chrono::Utc::now().naive_utc(),
            prev_hash,
            hash: String::new(),
        };
        entry.hash = entry.compute_hash();
        entry
    }

    /// 重算本条目哈希 (校验链时逐环重算比对)
    pub fn compute_hash(&self) -> String {
        let payload = HashPayload {
            audit_id: &self.audit_id,
            classification_id: &self.classification_id,
            seq_no: self.seq_no,
            action: self.action.as_str(),
            actor: &self.actor,
            detail_json: &self.detail_json,
            audit_ts: self.audit_ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        };
        // 规范序列化失败仅可能来自不可序列化类型,此处字段全部可序列化
        let serialized = serde_json::to_string(&payload).unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(serialized.as_bytes());
        hasher.update(self.prev_hash.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// 本条目哈希是否与内容一致
    pub fn hash_matches(&self) -> bool {
        self.hash == self.compute_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_entry(seq_no: i64, prev_hash: &str) -> AuditEntry {
        AuditEntry::new(
            format!("a{}", seq_no),
            "c1".to_string(),
            seq_no,
            AuditAction::StepDecision,
            "system".to_string(),
            Some(json!({"step": "GRI_1"})),
            prev_hash.to_string(),
        )
    }

    #[test]
    fn test_hash_deterministic() {
        let entry = make_entry(1, GENESIS_HASH);
        assert_eq!(entry.hash, entry.compute_hash());
        assert_eq!(entry.compute_hash(), entry.compute_hash());
    }

    #[test]
    fn test_hash_depends_on_prev_hash() {
        let mut a = make_entry(1, GENESIS_HASH);
        let original = a.hash.clone();
        a.prev_hash = "deadbeef".to_string();
        assert_ne!(a.compute_hash(), original);
    }

    #[test]
    fn test_tamper_detected() {
        let mut entry = make_entry(1, GENESIS_HASH);
        assert!(entry.hash_matches());
        entry.actor = "intruder".to_string();
        assert!(!entry.hash_matches());
    }

    #[test]
    fn test_chain_links() {
        let a = make_entry(1, GENESIS_HASH);
        let b = make_entry(2, &a.hash);
        assert_eq!(b.prev_hash, a.hash);
        assert!(b.hash_matches());
    }
}
