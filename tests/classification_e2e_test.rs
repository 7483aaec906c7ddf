// ==========================================
// 归类端到端测试: 发起 → 澄清 → 完成
// ==========================================

use hs_classifier::api::{ApiError, ClassificationApi};
use hs_classifier::config::StaticClassifyConfig;
use hs_classifier::db;
use hs_classifier::domain::audit::{AuditAction, GENESIS_HASH};
use hs_classifier::domain::tariff::{compute_check_digit, ExclusionRule, TariffCode};
use hs_classifier::domain::types::{CandidateLevel, ClassificationStatus, ExclusionType, GriStep};
use hs_classifier::engine::notify::NoOpNotifier;
use hs_classifier::engine::rule_engine::EngineOutcome;
use hs_classifier::engine::steps::ClarifyCategory;
use hs_classifier::repository::tariff_repo::SqliteTariffRepository;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

fn tariff_code(
    code: &str,
    description: &str,
    level: CandidateLevel,
    keywords: &[&str],
) -> TariffCode {
    TariffCode {
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
    }
}

fn setup_api() -> (Arc<Mutex<Connection>>, ClassificationApi) {
    hs_classifier::logging::init_test();
    let conn = Arc::new(Mutex::new(db::open_in_memory().unwrap()));
    let tariffs = SqliteTariffRepository::new(conn.clone());

    tariffs
        .insert_code(&tariff_code(
            "6109",
            "T恤衫、汗衫及其他背心,针织或钩编",
            CandidateLevel::Heading,
            &["t恤", "t-shirt", "汗衫", "背心", "针织"],
        ))
        .unwrap();
    tariffs
        .insert_code(&tariff_code(
            "61091000",
            "棉制针织或钩编的T恤衫、汗衫及其他背心",
            CandidateLevel::Tariff,
            &["棉", "cotton", "t恤", "t-shirt", "针织"],
        ))
        .unwrap();
    tariffs
        .insert_code(&tariff_code(
            "6110",
            "针织或钩编的套头衫、开襟衫、背心及类似品",
            CandidateLevel::Heading,
            &["套头衫", "毛衣", "开襟衫", "pullover", "sweater", "针织"],
        ))
        .unwrap();
    tariffs
        .insert_code(&tariff_code(
            "6205",
            "男式衬衫(梭织)",
            CandidateLevel::Heading,
            &["衬衫", "shirt", "梭织", "woven"],
        ))
        .unwrap();
    tariffs
        .insert_code(&tariff_code(
            "62052000",
            "棉制男式梭织衬衫",
            CandidateLevel::Tariff,
            &["棉", "cotton", "衬衫", "shirt", "梭织"],
        ))
        .unwrap();
    tariffs
        .insert_exclusion(&ExclusionRule {
            from_code: "61".to_string(),
            to_code: "6205".to_string(),
            exclusion_type: ExclusionType::Heading,
            note_ref: "第61章注一".to_string(),
        })
        .unwrap();

    let api = ClassificationApi::build(
        conn.clone(),
        Arc::new(StaticClassifyConfig::default()),
        Arc::new(NoOpNotifier),
    );
    (conn, api)
}

#[tokio::test]
async fn test_cotton_tshirt_full_flow() {
    let (_conn, api) = setup_api();

    // 发起: 两个存活候选,置信度未达标 → 先问用途
    let (id, outcome) = api
        .start_classification("Men's cotton t-shirt, 100% cotton, knitted", "user-1")
        .await
        .unwrap();
    let (question, asked_confidence) = match outcome {
        EngineOutcome::Question {
            question,
            confidence,
        } => (question, confidence),
        other => panic!("预期澄清问题, 实际: {:?}", other),
    };
    assert_eq!(question.category, ClarifyCategory::Purpose);
    assert!(question.options.len() <= 3);
    assert!(question.allow_free_text);
    assert!(api.pending_question(&id).unwrap().is_some());

    // 运行中置信度随提问带出,且已持久化到任务行
    assert!(asked_confidence > 0.0 && asked_confidence < 0.85);
    let paused = api.get_classification(&id).unwrap();
    assert_eq!(paused.confidence, Some(asked_confidence));

    // 回答用途后: 规则三(一)以更具体的税则细目决出
    let outcome = api
        .submit_answer(&id, GriStep::Gri1.as_str(), "服装", "user-1")
        .await
        .unwrap();
    match outcome {
        EngineOutcome::Completed {
            final_code,
            confidence,
        } => {
            assert_eq!(final_code, "61091000");
            assert!(confidence > 0.5 && confidence <= 0.99);
        }
        other => panic!("预期完成, 实际: {:?}", other),
    }

    let c = api.get_classification(&id).unwrap();
    assert_eq!(c.status, ClassificationStatus::Completed);
    assert_eq!(c.final_code.as_deref(), Some("61091000"));
    assert!(c.invariant_holds());

    // 决定: 序号与规则顺序均严格递增,必经步骤全部在场
    let decisions = api.list_decisions(&id).unwrap();
    for pair in decisions.windows(2) {
        assert!(pair[0].seq_no < pair[1].seq_no);
        assert!(pair[0].step.order_index() < pair[1].step.order_index());
    }
    for step in [
        GriStep::PreClassification,
        GriStep::Gri1,
        GriStep::Gri6,
        GriStep::Validation,
    ] {
        assert!(
            decisions.iter().any(|d| d.step == step),
            "缺少必经步骤决定: {}",
            step
        );
    }
    for d in &decisions {
        assert!(!d.reasoning.is_empty());
        assert!(!d.legal_basis.is_empty());
    }

    // GRI_1 决定携带促成它的澄清问答
    let gri1 = decisions
        .iter()
        .find(|d| d.step == GriStep::Gri1)
        .unwrap();
    assert!(gri1.question.is_some());
    assert_eq!(gri1.answer.as_deref(), Some("服装"));

    // 被排他剪枝的梭织衬衫品目须出现在 GRI_1 证据里
    let evidence = gri1.evidence_json.as_ref().unwrap().to_string();
    assert!(evidence.contains("6205"));
    assert!(evidence.contains("第61章注一"));

    // 审计链: 链根为 GENESIS,逐环校验通过
    let trail = api.get_audit_trail(&id).unwrap();
    assert_eq!(trail[0].action, AuditAction::ClassificationCreated);
    assert_eq!(trail[0].prev_hash, GENESIS_HASH);
    assert!(trail
        .iter()
        .any(|e| e.action == AuditAction::ClarificationAsked));
    assert!(trail
        .iter()
        .any(|e| e.action == AuditAction::ClarificationAnswered));
    api.verify_audit_trail(&id).unwrap();
}

#[tokio::test]
async fn test_short_description_rejected_without_trace() {
    let (_conn, api) = setup_api();

    let err = api.start_classification("T恤", "user-1").await.unwrap_err();
    assert!(matches!(err, ApiError::ValidationError(_)));

    // 入口校验失败不留任何落库痕迹
    assert!(api
        .list_by_status(ClassificationStatus::InProgress)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_archive_only_from_non_completed() {
    let (_conn, api) = setup_api();

    let (id, outcome) = api
        .start_classification("Men's cotton t-shirt, 100% cotton, knitted", "user-1")
        .await
        .unwrap();
    assert!(matches!(outcome, EngineOutcome::Question { .. }));

    api.archive_classification(&id, "user-1").unwrap();
    let c = api.get_classification(&id).unwrap();
    assert_eq!(c.status, ClassificationStatus::Archived);

    // 已归档任务: 不可重复归档,不接受澄清回答
    assert!(matches!(
        api.archive_classification(&id, "user-1"),
        Err(ApiError::ValidationError(_))
    ));
    assert!(matches!(
        api.submit_answer(&id, GriStep::Gri1.as_str(), "服装", "user-1")
            .await,
        Err(ApiError::ValidationError(_))
    ));
}

#[tokio::test]
async fn test_supersede_decision_appends_correction() {
    let (_conn, api) = setup_api();

    let (id, _) = api
        .start_classification("Men's cotton t-shirt, 100% cotton, knitted", "user-1")
        .await
        .unwrap();
    api.submit_answer(&id, GriStep::Gri1.as_str(), "服装", "user-1")
        .await
        .unwrap();

    let decisions = api.list_decisions(&id).unwrap();
    let original = decisions.last().unwrap().clone();

    let correction = api
        .supersede_decision(
            &id,
            &original.decision_id,
            "专家更正: 校验结论补充依据",
            0.95,
            vec!["品目6109注释".to_string()],
        )
        .unwrap();
    assert_eq!(correction.supersedes.as_deref(), Some(original.decision_id.as_str()));

    // 原决定原样保留,更正以追加形式存在
    let after = api.list_decisions(&id).unwrap();
    assert_eq!(after.len(), decisions.len() + 1);
    assert!(after
        .iter()
        .any(|d| d.decision_id == original.decision_id && d.reasoning == original.reasoning));
    assert!(after
        .iter()
        .any(|d| d.supersedes.as_deref() == Some(original.decision_id.as_str())));
    api.verify_audit_trail(&id).unwrap();
}
