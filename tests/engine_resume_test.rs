// ==========================================
// 中断恢复测试: 步骤推进与决定落库同一事务,失败后原步重试
// ==========================================

use hs_classifier::config::StaticClassifyConfig;
use hs_classifier::db;
use hs_classifier::domain::candidate::Candidate;
use hs_classifier::domain::classification::Classification;
use hs_classifier::domain::tariff::{
    compute_check_digit, CrossReference, ExclusionRule, LegalNote, TariffCode,
};
use hs_classifier::domain::types::{CandidateLevel, ClassificationStatus, GriStep};
use hs_classifier::engine::knowledge::{AnalogyMatch, CheckDigitReport, TariffKnowledgeBase};
use hs_classifier::engine::notify::NoOpNotifier;
use hs_classifier::engine::recorder::DecisionRecorder;
use hs_classifier::engine::rule_engine::{EngineError, EngineOutcome, GriRuleEngine};
use hs_classifier::extract::KeywordFeatureExtractor;
use hs_classifier::repository::classification_repo::ClassificationRepository;
use hs_classifier::repository::decision_repo::DecisionRepository;
use hs_classifier::repository::tariff_repo::SqliteTariffRepository;
use std::error::Error;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

// 故障注入知识库: 指定方法前 N 次调用返回错误,其余全部透传
struct FlakyKb {
    inner: SqliteTariffRepository,
    check_digit_failures: AtomicU32,
    analogy_failures: AtomicU32,
}

impl FlakyKb {
    fn new(inner: SqliteTariffRepository) -> Self {
        Self {
            inner,
            check_digit_failures: AtomicU32::new(0),
            analogy_failures: AtomicU32::new(0),
        }
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl TariffKnowledgeBase for FlakyKb {
    fn lookup_by_keyword(
        &self,
        text: &str,
        extra_keywords: &[String],
    ) -> Result<Vec<Candidate>, Box<dyn Error>> {
        self.inner.lookup_by_keyword(text, extra_keywords)
    }

    fn get_exclusions(&self, code: &str) -> Result<Vec<ExclusionRule>, Box<dyn Error>> {
        self.inner.get_exclusions(code)
    }

    fn get_cross_references(&self, code: &str) -> Result<Vec<CrossReference>, Box<dyn Error>> {
        self.inner.get_cross_references(code)
    }

    fn get_legal_notes(&self, code: &str) -> Result<Vec<LegalNote>, Box<dyn Error>> {
        self.inner.get_legal_notes(code)
    }

    fn validate_check_digit(&self, code8: &str) -> Result<CheckDigitReport, Box<dyn Error>> {
        if Self::take_failure(&self.check_digit_failures) {
            return Err("知识库连接超时".into());
        }
        self.inner.validate_check_digit(code8)
    }

    fn find_similar_classified(
        &self,
        description: &str,
    ) -> Result<Option<AnalogyMatch>, Box<dyn Error>> {
        if Self::take_failure(&self.analogy_failures) {
            return Err("知识库连接超时".into());
        }
        self.inner.find_similar_classified(description)
    }
}

struct Fixture {
    classifications: Arc<ClassificationRepository>,
    decisions: DecisionRepository,
    recorder: Arc<DecisionRecorder>,
    kb: Arc<FlakyKb>,
    engine: GriRuleEngine,
}

fn setup(seed: bool) -> Fixture {
    hs_classifier::logging::init_test();
    let conn = Arc::new(Mutex::new(db::open_in_memory().unwrap()));
    let tariffs = SqliteTariffRepository::new(conn.clone());
    if seed {
        // 单一税号: 规则一即唯一决出,无需澄清
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
    }

    let classifications = Arc::new(ClassificationRepository::new(conn.clone()));
    let recorder = Arc::new(DecisionRecorder::new(conn.clone()));
    let kb = Arc::new(FlakyKb::new(tariffs));
    let engine = GriRuleEngine::new(
        classifications.clone(),
        recorder.clone(),
        kb.clone(),
        Arc::new(KeywordFeatureExtractor),
        Arc::new(NoOpNotifier),
        Arc::new(StaticClassifyConfig::default()),
    );
    Fixture {
        classifications,
        decisions: DecisionRepository::new(conn),
        recorder,
        kb,
        engine,
    }
}

fn start_task(f: &Fixture, description: &str) -> String {
    let id = "resume-1".to_string();
    let c = Classification::new(id.clone(), description.to_string());
    f.classifications.insert(&c).unwrap();
    f.recorder.record_creation(&id, description, "user-1").unwrap();
    id
}

#[tokio::test]
async fn test_check_digit_failure_then_retry_completes() {
    let f = setup(true);
    let id = start_task(&f, "Men's cotton t-shirt, 100% cotton");

    // 第一次推进: 校验码复核瞬时失败,整个校验步骤不留任何落库痕迹
    f.kb.check_digit_failures.store(1, Ordering::SeqCst);
    let err = f.engine.advance(&id).await.unwrap_err();
    assert!(matches!(err, EngineError::Knowledge(_)));

    // 任务停在校验步骤,决定日志止于规则六,步骤与日志不错位
    let c = f.classifications.get_by_id(&id).unwrap();
    assert_eq!(c.status, ClassificationStatus::InProgress);
    assert_eq!(c.current_step, GriStep::Validation);
    let recorded = f.decisions.find_by_classification(&id).unwrap();
    assert_eq!(recorded.last().unwrap().step, GriStep::Gri6);
    assert!(recorded.iter().all(|d| d.step != GriStep::Validation));

    // 进入校验步骤时的工作集已随步骤推进一并持久化
    let snapshot = c.metadata().step_snapshot.unwrap();
    assert_eq!(snapshot.final_code.as_deref(), Some("61091000"));
    assert!(snapshot.confidence > 0.0);

    // 重试: 从持久化的步骤与快照恢复,直接完成,不从头重跑规则一
    let outcome = f.engine.advance(&id).await.unwrap();
    match outcome {
        EngineOutcome::Completed {
            final_code,
            confidence,
        } => {
            assert_eq!(final_code, "61091000");
            assert!(confidence > 0.5);
        }
        other => panic!("预期重试后完成, 实际: {:?}", other),
    }

    let c = f.classifications.get_by_id(&id).unwrap();
    assert_eq!(c.status, ClassificationStatus::Completed);
    assert_eq!(c.final_code.as_deref(), Some("61091000"));
    assert!(c.metadata().step_snapshot.is_none());

    // 每个必经步骤恰好一个决定,序号与规则顺序严格递增
    let decisions = f.decisions.find_by_classification(&id).unwrap();
    for step in [
        GriStep::PreClassification,
        GriStep::Gri1,
        GriStep::Gri6,
        GriStep::Validation,
    ] {
        assert_eq!(
            decisions.iter().filter(|d| d.step == step).count(),
            1,
            "步骤 {} 的决定应恰好一条",
            step
        );
    }
    for pair in decisions.windows(2) {
        assert!(pair[0].seq_no < pair[1].seq_no);
        assert!(pair[0].step.order_index() < pair[1].step.order_index());
    }
    f.recorder.verify(&id).unwrap();
}

#[tokio::test]
async fn test_analogy_failure_resumes_at_gri4() {
    // 空知识库: 规则一至三全部无解,停点落在规则四的类比检索
    let f = setup(false);
    let id = start_task(&f, "组合式多功能露营炊具套件");

    f.kb.analogy_failures.store(1, Ordering::SeqCst);
    let err = f.engine.advance(&id).await.unwrap_err();
    assert!(matches!(err, EngineError::Knowledge(_)));

    let c = f.classifications.get_by_id(&id).unwrap();
    assert_eq!(c.status, ClassificationStatus::InProgress);
    assert_eq!(c.current_step, GriStep::Gri4);
    let recorded = f.decisions.find_by_classification(&id).unwrap();
    assert_eq!(recorded.last().unwrap().step, GriStep::Gri3c);

    // 重试只重跑规则四: 无可类比货品 → 转复核,前序决定不重复
    let outcome = f.engine.advance(&id).await.unwrap();
    assert!(matches!(outcome, EngineOutcome::NeedsReview { .. }));

    let c = f.classifications.get_by_id(&id).unwrap();
    assert_eq!(c.status, ClassificationStatus::NeedsReview);
    let decisions = f.decisions.find_by_classification(&id).unwrap();
    for pair in decisions.windows(2) {
        assert!(pair[0].step.order_index() < pair[1].step.order_index());
    }
    assert_eq!(
        decisions
            .iter()
            .filter(|d| d.step == GriStep::Gri3c)
            .count(),
        1
    );
    f.recorder.verify(&id).unwrap();
}
