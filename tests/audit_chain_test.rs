// ==========================================
// 审计链完整性测试: 篡改检测与任务冻结
// ==========================================

use hs_classifier::api::{ApiError, ClassificationApi};
use hs_classifier::config::StaticClassifyConfig;
use hs_classifier::db;
use hs_classifier::domain::tariff::{compute_check_digit, TariffCode};
use hs_classifier::domain::types::{CandidateLevel, ClassificationStatus, GriStep};
use hs_classifier::engine::notify::NoOpNotifier;
use hs_classifier::engine::rule_engine::EngineOutcome;
use hs_classifier::repository::tariff_repo::SqliteTariffRepository;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

fn setup_api() -> (Arc<Mutex<Connection>>, ClassificationApi) {
    hs_classifier::logging::init_test();
    let conn = Arc::new(Mutex::new(db::open_in_memory().unwrap()));
    let tariffs = SqliteTariffRepository::new(conn.clone());

    // 单一税号即可: 重点是链的行为,不是归类结果
    tariffs
        .insert_code(&TariffCode {
            code: "61091000".to_string(),
            description: "棉制针织或钩编的T恤衫、汗衫及其他背心".to_string(),
            level: CandidateLevel::Tariff,
            keywords: vec![
                "棉".to_string(),
                "cotton".to_string(),
                "t恤".to_string(),
                "t-shirt".to_string(),
            ],
            parent_code: None,
            check_digit: compute_check_digit("61091000"),
        })
        .unwrap();

    let api = ClassificationApi::build(
        conn.clone(),
        Arc::new(StaticClassifyConfig::default()),
        Arc::new(NoOpNotifier),
    );
    (conn, api)
}

async fn completed_task(api: &ClassificationApi) -> String {
    let (id, outcome) = api
        .start_classification("Men's cotton t-shirt, 100% cotton", "user-1")
        .await
        .unwrap();
    match outcome {
        EngineOutcome::Completed { .. } => id,
        other => panic!("预期完成, 实际: {:?}", other),
    }
}

#[tokio::test]
async fn test_intact_chain_verifies() {
    let (_conn, api) = setup_api();
    let id = completed_task(&api).await;

    api.verify_audit_trail(&id).unwrap();

    // 校验通过不改变任务状态
    let c = api.get_classification(&id).unwrap();
    assert_eq!(c.status, ClassificationStatus::Completed);
    assert!(!c.metadata().frozen);
}

#[tokio::test]
async fn test_tampered_entry_freezes_task() {
    let (conn, api) = setup_api();
    let id = completed_task(&api).await;
    let trail_len = api.get_audit_trail(&id).unwrap().len();

    // 绕过仓储直接改库,模拟越权篡改
    conn.lock()
        .unwrap()
        .execute(
            "UPDATE audit_entry SET actor = 'intruder' WHERE classification_id = ?1 AND seq_no = 2",
            params![id],
        )
        .unwrap();

    let err = api.verify_audit_trail(&id).unwrap_err();
    assert!(matches!(err, ApiError::AuditIntegrityViolation(_)));

    // 冻结: 结论撤下,状态转复核,链原样保留
    let c = api.get_classification(&id).unwrap();
    assert!(c.metadata().frozen);
    assert_eq!(c.status, ClassificationStatus::NeedsReview);
    assert!(c.final_code.is_none());
    assert_eq!(api.get_audit_trail(&id).unwrap().len(), trail_len);

    // 冻结任务拒绝一切后续操作,链也不因冻结本身增长
    assert!(matches!(
        api.submit_answer(&id, GriStep::Gri1.as_str(), "服装", "user-1")
            .await,
        Err(ApiError::Frozen(_))
    ));
    assert_eq!(api.get_audit_trail(&id).unwrap().len(), trail_len);

    // 再次校验仍然失败: 链绝不修复
    assert!(matches!(
        api.verify_audit_trail(&id),
        Err(ApiError::AuditIntegrityViolation(_))
    ));
}

#[tokio::test]
async fn test_deleted_entry_breaks_sequence() {
    let (conn, api) = setup_api();
    let id = completed_task(&api).await;

    conn.lock()
        .unwrap()
        .execute(
            "DELETE FROM audit_entry WHERE classification_id = ?1 AND seq_no = 2",
            params![id],
        )
        .unwrap();

    // 序号断档在被删位置被发现
    match api.verify_audit_trail(&id).unwrap_err() {
        ApiError::AuditIntegrityViolation(detail) => {
            assert!(detail.contains("seq_no="), "缺少断环位置: {}", detail)
        }
        other => panic!("预期断链错误, 实际: {:?}", other),
    }
    assert!(api.get_classification(&id).unwrap().metadata().frozen);
}

#[tokio::test]
async fn test_relinked_suffix_still_detected() {
    let (conn, api) = setup_api();
    let id = completed_task(&api).await;

    // 篡改首条内容但保留其 hash 字段: 重算即露馅
    conn.lock()
        .unwrap()
        .execute(
            "UPDATE audit_entry SET detail_json = '{\"description\":\"改写过的描述\"}' \
             WHERE classification_id = ?1 AND seq_no = 1",
            params![id],
        )
        .unwrap();

    match api.verify_audit_trail(&id).unwrap_err() {
        ApiError::AuditIntegrityViolation(detail) => {
            assert!(detail.contains("seq_no=1"), "应在链首发现: {}", detail)
        }
        other => panic!("预期断链错误, 实际: {:?}", other),
    }
}
