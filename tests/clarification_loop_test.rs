// ==========================================
// 澄清循环测试: 提问上限、类目不重复、低置信度通知
// ==========================================

use async_trait::async_trait;
use hs_classifier::api::{ApiError, ClassificationApi};
use hs_classifier::config::StaticClassifyConfig;
use hs_classifier::db;
use hs_classifier::domain::tariff::{compute_check_digit, ExclusionRule, TariffCode};
use hs_classifier::domain::types::{CandidateLevel, ClassificationStatus, ExclusionType, GriStep};
use hs_classifier::engine::notify::LowConfidenceNotifier;
use hs_classifier::engine::rule_engine::EngineOutcome;
use hs_classifier::engine::steps::ClarifyCategory;
use hs_classifier::repository::tariff_repo::SqliteTariffRepository;
use rusqlite::Connection;
use std::error::Error;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

// 计数通知器: 断言"每个任务至多通知一次"
struct CountingNotifier {
    count: AtomicU32,
}

#[async_trait]
impl LowConfidenceNotifier for CountingNotifier {
    async fn notify_low_confidence(
        &self,
        _classification_id: &str,
        _description: &str,
        _confidence: f64,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn seed_knitwear(conn: &Arc<Mutex<Connection>>) {
    hs_classifier::logging::init_test();
    let tariffs = SqliteTariffRepository::new(conn.clone());
    let mut insert = |code: &str, description: &str, level: CandidateLevel, keywords: &[&str]| {
        tariffs
            .insert_code(&TariffCode {
                code: code.to_string(),
                description: description.to_string(),
                level,
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                parent_code: None,
                check_digit: if code.len() == 8 {
                    compute_check_digit(code)
                } else {
                    None
                },
            })
            .unwrap();
    };
    insert(
        "6109",
        "T恤衫、汗衫及其他背心,针织或钩编",
        CandidateLevel::Heading,
        &["t恤", "t-shirt", "汗衫", "背心", "针织"],
    );
    insert(
        "61091000",
        "棉制针织或钩编的T恤衫、汗衫及其他背心",
        CandidateLevel::Tariff,
        &["棉", "cotton", "t恤", "t-shirt", "针织"],
    );
    insert(
        "6110",
        "针织或钩编的套头衫、开襟衫、背心及类似品",
        CandidateLevel::Heading,
        &["套头衫", "毛衣", "开襟衫", "pullover", "sweater", "针织"],
    );
    insert(
        "6205",
        "男式衬衫(梭织)",
        CandidateLevel::Heading,
        &["衬衫", "shirt", "梭织", "woven"],
    );
    insert(
        "62052000",
        "棉制男式梭织衬衫",
        CandidateLevel::Tariff,
        &["棉", "cotton", "衬衫", "shirt", "梭织"],
    );
    tariffs
        .insert_exclusion(&ExclusionRule {
            from_code: "61".to_string(),
            to_code: "6205".to_string(),
            exclusion_type: ExclusionType::Heading,
            note_ref: "第61章注一".to_string(),
        })
        .unwrap();
}

#[tokio::test]
async fn test_question_cap_then_needs_review_with_single_notification() {
    let conn = Arc::new(Mutex::new(db::open_in_memory().unwrap()));
    seed_knitwear(&conn);

    // 目标置信度调到不可达,迫使循环以提问上限终止
    let config = StaticClassifyConfig {
        target_confidence: 0.99,
        max_clarify_questions: 2,
        ..StaticClassifyConfig::default()
    };
    let notifier = Arc::new(CountingNotifier {
        count: AtomicU32::new(0),
    });
    let api = ClassificationApi::build(conn, Arc::new(config), notifier.clone());

    // 描述缺用途缺材质: 两问全部用掉
    let (id, outcome) = api
        .start_classification("针织背心与套头衫", "user-1")
        .await
        .unwrap();
    let q1 = match outcome {
        EngineOutcome::Question { question, .. } => question,
        other => panic!("预期第一问, 实际: {:?}", other),
    };
    assert_eq!(q1.category, ClarifyCategory::Purpose);

    let outcome = api
        .submit_answer(&id, GriStep::Gri1.as_str(), "服装", "user-1")
        .await
        .unwrap();
    let q2 = match outcome {
        EngineOutcome::Question {
            question,
            confidence,
        } => {
            // 答完一轮后的运行中置信度对调用方可见
            assert!(confidence > 0.0 && confidence < 0.99);
            assert_eq!(
                api.get_classification(&id).unwrap().confidence,
                Some(confidence)
            );
            question
        }
        other => panic!("预期第二问, 实际: {:?}", other),
    };
    // 同一类目绝不重复提问
    assert_eq!(q2.category, ClarifyCategory::Material);
    assert_ne!(q1.category, q2.category);

    // 第二问答完即达上限: 置信度仍低 → 转专家复核
    let outcome = api
        .submit_answer(&id, GriStep::Gri1.as_str(), "棉", "user-1")
        .await
        .unwrap();
    match outcome {
        EngineOutcome::NeedsReview { confidence, .. } => {
            assert!(confidence < 0.5);
        }
        other => panic!("预期转复核, 实际: {:?}", other),
    }

    let c = api.get_classification(&id).unwrap();
    assert_eq!(c.status, ClassificationStatus::NeedsReview);
    assert!(c.final_code.is_none());
    let meta = c.metadata();
    assert_eq!(meta.questions_asked, 2);
    assert!(meta.pending_question.is_none());
    assert_eq!(
        meta.answered_categories,
        vec!["purpose".to_string(), "material".to_string()]
    );

    // 低置信度通知: 恰好一次
    assert_eq!(notifier.count.load(Ordering::SeqCst), 1);

    // 终态任务没有待回答问题,再提交即拒绝
    assert!(matches!(
        api.submit_answer(&id, GriStep::Gri1.as_str(), "多余回答", "user-1")
            .await,
        Err(ApiError::ValidationError(_))
    ));
    api.verify_audit_trail(&id).unwrap();
}

#[tokio::test]
async fn test_answer_for_stale_step_rejected() {
    let conn = Arc::new(Mutex::new(db::open_in_memory().unwrap()));
    seed_knitwear(&conn);
    let api = ClassificationApi::build(
        conn,
        Arc::new(StaticClassifyConfig::default()),
        Arc::new(hs_classifier::engine::notify::NoOpNotifier),
    );

    let (id, outcome) = api
        .start_classification("Men's cotton t-shirt, 100% cotton, knitted", "user-1")
        .await
        .unwrap();
    assert!(matches!(outcome, EngineOutcome::Question { .. }));

    // 对非当前步骤作答: 顺序违规
    assert!(matches!(
        api.submit_answer(&id, GriStep::Gri6.as_str(), "服装", "user-1")
            .await,
        Err(ApiError::RuleOrderViolation(_))
    ));
    // 未知步骤标识: 入口校验拒绝
    assert!(matches!(
        api.submit_answer(&id, "GRI_9", "服装", "user-1").await,
        Err(ApiError::ValidationError(_))
    ));
    // 空回答: 拒绝且待决问题保留
    assert!(matches!(
        api.submit_answer(&id, GriStep::Gri1.as_str(), "   ", "user-1")
            .await,
        Err(ApiError::ValidationError(_))
    ));
    assert!(api.pending_question(&id).unwrap().is_some());
}
