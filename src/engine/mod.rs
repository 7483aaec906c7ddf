// ==========================================
// 海关商品归类系统 - 引擎层
// ==========================================
// 组成: 规则引擎 / 候选解析 / 具体性评估 / 澄清循环 / 决定记录 / 知识库接口
// ==========================================

pub mod clarification;
pub mod knowledge;
pub mod notify;
pub mod recorder;
pub mod resolver;
pub mod rule_engine;
pub mod specificity;
pub mod steps;

pub use clarification::ClarificationLoop;
pub use knowledge::{AnalogyMatch, CheckDigitReport, TariffKnowledgeBase};
pub use notify::{LogNotifier, LowConfidenceNotifier, NoOpNotifier};
pub use recorder::{DecisionRecorder, RecorderError};
pub use resolver::{CandidateResolver, ResolveOutcome, ResolverWeights};
pub use rule_engine::{EngineError, EngineOutcome, GriRuleEngine};
pub use specificity::SpecificityEvaluator;
pub use steps::{ClarifyCategory, ClarifyQuestion, StepEvidence};
