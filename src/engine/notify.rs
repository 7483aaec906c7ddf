// ==========================================
// 海关商品归类系统 - 低置信度通知
// ==========================================
// 职责: 归类结果置信度低于通知阈值时对外告警
// 红线: 每个任务至多通知一次 (由元数据标记保证, 本模块只负责发送)
// ==========================================

use async_trait::async_trait;
use std::error::Error;
use tracing::warn;

// ==========================================
// LowConfidenceNotifier - 通知接口
// ==========================================
#[async_trait]
pub trait LowConfidenceNotifier: Send + Sync {
    async fn notify_low_confidence(
        &self,
        classification_id: &str,
        description: &str,
        confidence: f64,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

// ==========================================
// NoOpNotifier - 空实现 (测试/默认)
// ==========================================
pub struct NoOpNotifier;

#[async_trait]
impl LowConfidenceNotifier for NoOpNotifier {
    async fn notify_low_confidence(
        &self,
        _classification_id: &str,
        _description: &str,
        _confidence: f64,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

// ==========================================
// LogNotifier - 日志实现
// ==========================================
pub struct LogNotifier;

#[async_trait]
impl LowConfidenceNotifier for LogNotifier {
    async fn notify_low_confidence(
        &self,
        classification_id: &str,
        description: &str,
        confidence: f64,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        warn!(
            classification_id = %classification_id,
            confidence = format!("{:.2}", confidence),
            "低置信度归类结果, 建议人工复核: {}",
            description
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_notifier_ok() {
        let n = NoOpNotifier;
        assert!(n.notify_low_confidence("c1", "棉制T恤衫", 0.4).await.is_ok());
    }

    #[tokio::test]
    async fn test_log_notifier_ok() {
        let n = LogNotifier;
        assert!(n.notify_low_confidence("c1", "棉制T恤衫", 0.4).await.is_ok());
    }
}
