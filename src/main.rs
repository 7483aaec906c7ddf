// ==========================================
// 海关商品归类系统 - 演示入口
// ==========================================
// 用法:
//   hs-classifier [数据库路径]
//
// 在演示库上跑一条完整归类: 发起任务 → 回答澄清问题 →
// 输出最终税号与审计链校验结果。
// 库先用 seed_demo_tariff_db 灌入演示税则数据。
// ==========================================

use hs_classifier::api::ClassificationApi;
use hs_classifier::config::ConfigManager;
use hs_classifier::domain::GriStep;
use hs_classifier::engine::notify::LogNotifier;
use hs_classifier::engine::rule_engine::EngineOutcome;
use hs_classifier::{db, logging, APP_NAME, VERSION};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    logging::init();
    info!("{} v{} 启动", APP_NAME, VERSION);

    let db_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "hs_classifier.db".to_string());

    if let Err(e) = run(&db_path).await {
        error!("演示归类失败: {}", e);
        std::process::exit(1);
    }
}

async fn run(db_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let conn = db::open_sqlite_connection(db_path)?;
    db::init_schema(&conn)?;
    let conn = Arc::new(Mutex::new(conn));

    let config = Arc::new(ConfigManager::from_connection(conn.clone())?);
    let api = ClassificationApi::build(conn, config, Arc::new(LogNotifier));

    let description = "Men's cotton t-shirt, 100% cotton, knitted";
    info!("发起归类: {}", description);
    let (classification_id, mut outcome) = api.start_classification(description, "demo").await?;

    // 澄清循环: 演示环境直接采用问题的首个预设选项作答
    while let EngineOutcome::Question { question, .. } = outcome {
        let answer = question
            .options
            .first()
            .cloned()
            .unwrap_or_else(|| "未知".to_string());
        info!("澄清问题: {} → 回答: {}", question.text, answer);
        outcome = api
            .submit_answer(&classification_id, GriStep::Gri1.as_str(), &answer, "demo")
            .await?;
    }

    match outcome {
        EngineOutcome::Completed {
            final_code,
            confidence,
        } => {
            info!(
                "归类完成: 税号 {} (置信度 {:.2})",
                final_code, confidence
            );
        }
        EngineOutcome::NeedsReview { reason, confidence } => {
            info!("转专家复核: {} (置信度 {:.2})", reason, confidence);
        }
        EngineOutcome::Question { .. } => unreachable!(),
    }

    // 决定与审计链回放
    for decision in api.list_decisions(&classification_id)? {
        info!(
            "[{}] {} (置信度 {:.2}) 依据: {}",
            decision.step,
            decision.reasoning,
            decision.confidence,
            decision.legal_basis.join(" / ")
        );
    }
    api.verify_audit_trail(&classification_id)?;
    info!("审计链校验通过: {} 条条目逐环相扣", api.get_audit_trail(&classification_id)?.len());
    Ok(())
}
