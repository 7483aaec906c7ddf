// ==========================================
// 海关商品归类系统 - API 错误定义
// ==========================================
// 职责: 对外统一错误类型,内部各层错误在此收敛
// ==========================================

use crate::engine::recorder::RecorderError;
use crate::engine::rule_engine::EngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("输入校验失败: {0}")]
    ValidationError(String),

    #[error("规则顺序违规: {0}")]
    RuleOrderViolation(String),

    #[error("审计链完整性校验失败: {0}")]
    AuditIntegrityViolation(String),

    #[error("记录不存在: {entity} (ID: {id})")]
    NotFound { entity: String, id: String },

    #[error("任务已冻结,仅允许人工处理: {0}")]
    Frozen(String),

    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("引擎错误: {0}")]
    EngineError(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<RepositoryError> for ApiError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound { entity, id } => ApiError::NotFound { entity, id },
            RepositoryError::ValidationError(msg) | RepositoryError::FieldValueError { message: msg, .. } => {
                ApiError::ValidationError(msg)
            }
            other => ApiError::DatabaseError(other.to_string()),
        }
    }
}

impl From<RecorderError> for ApiError {
    fn from(e: RecorderError) -> Self {
        match e {
            RecorderError::RuleOrderViolation { .. } => {
                ApiError::RuleOrderViolation(e.to_string())
            }
            RecorderError::AuditIntegrityViolation { .. } => {
                ApiError::AuditIntegrityViolation(e.to_string())
            }
            RecorderError::Repository(inner) => inner.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::InvalidState(msg) => ApiError::ValidationError(msg),
            EngineError::Frozen(id) => ApiError::Frozen(id),
            EngineError::Recorder(inner) => inner.into(),
            EngineError::Repository(inner) => inner.into(),
            other => ApiError::EngineError(other.to_string()),
        }
    }
}
