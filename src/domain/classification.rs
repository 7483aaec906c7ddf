// ==========================================
// 海关商品归类系统 - 归类任务领域模型
// ==========================================
// 红线: final_code 有值 当且仅当 status = COMPLETED
// 红线: current_step 永远是法定步骤枚举中的值
// ==========================================

use crate::domain::candidate::{Candidate, ExtractedFeatures};
use crate::domain::types::{ClassificationStatus, GriStep};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// Classification - 归类任务
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub classification_id: String,        // 任务ID (UUID)
    pub description: String,              // 商品描述 (原始输入)
    pub status: ClassificationStatus,     // 任务状态
    pub current_step: GriStep,            // 当前 GRI 步骤
    pub final_code: Option<String>,       // 最终税号 (8位, 仅 COMPLETED)
    pub confidence: Option<f64>,          // 最终置信度 [0,1]
    pub metadata_json: Option<JsonValue>, // 元数据 (特征/澄清进度/通知标记)
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

// ==========================================
// ClassifyMetadata - 元数据结构
// ==========================================
// 说明: 澄清轮次之间的全部交互状态都持久化在这里,
//       引擎进程内不保留任何会话级可变状态,中断后可恢复。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifyMetadata {
    /// 预归类阶段提取的结构化特征 (随澄清回答增量合并)
    #[serde(default)]
    pub features: ExtractedFeatures,

    /// 已提问并得到回答的澄清类目 (绝不重复提问)
    #[serde(default)]
    pub answered_categories: Vec<String>,

    /// 已发出的澄清问题数量 (受最大问题数约束)
    #[serde(default)]
    pub questions_asked: u32,

    /// 待回答的澄清问题 (序列化的 ClarifyQuestion, 回答后清空)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_question: Option<JsonValue>,

    /// 最近一轮澄清的问题原文 (附入其后的步骤决定, 随即清空)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_question: Option<String>,

    /// 最近一轮澄清的回答原文 (附入其后的步骤决定, 随即清空)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_answer: Option<String>,

    /// 步骤间工作集快照 (与 current_step 同事务写入, 中断后按此恢复;
    /// 任务终态或回到 GRI_1 重算时清空)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_snapshot: Option<StepSnapshot>,

    /// 低置信度通知是否已发送 (每个任务至多一次)
    #[serde(default)]
    pub low_confidence_notified: bool,

    /// 审计链校验失败后的冻结标记 (只能人工处理)
    #[serde(default)]
    pub frozen: bool,

    /// 调用方附加上下文 (原样保留)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_context: Option<JsonValue>,
}

// ==========================================
// StepSnapshot - 步骤间工作集快照
// ==========================================
// 红线: 每步推进 (决定 + current_step + 快照) 必须同一事务落库,
//       决定日志与任务步骤绝不允许错位
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepSnapshot {
    /// 存活候选集 (规则二可扩展, 规则三(一)重排)
    #[serde(default)]
    pub candidates: Vec<Candidate>,

    /// 已定品目候选 (规则一/三/四决出后填入)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<Candidate>,

    /// 当前置信度
    #[serde(default)]
    pub confidence: f64,

    /// 规则六确定的8位税号 (待校验)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_code: Option<String>,
}

impl Classification {
    /// 创建新的归类任务 (初始: IN_PROGRESS / PRE_CLASSIFICATION)
    pub fn new(classification_id: String, description: String) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            classification_id,
            description,
            status: ClassificationStatus::InProgress,
            current_step: GriStep::PreClassification,
            final_code: None,
            confidence: None,
            metadata_json: Some(
                serde_json::to_value(ClassifyMetadata::default()).unwrap_or(JsonValue::Null),
            ),
            created_at: now,
            updated_at: now,
        }
    }

    /// 读取元数据 (缺失或损坏时返回默认值)
    pub fn metadata(&self) -> ClassifyMetadata {
        self.metadata_json
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// 写回元数据
    pub fn set_metadata(&mut self, meta: &ClassifyMetadata) {
        self.metadata_json = serde_json::to_value(meta).ok();
    }

    /// 状态不变式检查: final_code 有值 ⟺ COMPLETED
    pub fn invariant_holds(&self) -> bool {
        match self.status {
            ClassificationStatus::Completed => self.final_code.is_some(),
            _ => self.final_code.is_none(),
        }
    }
}
