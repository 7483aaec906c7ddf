// ==========================================
// 海关商品归类系统 - 归类决定仓储
// ==========================================
// 红线: 只有 INSERT 与 SELECT,不存在 UPDATE/DELETE 语句
// 红线: seq_no 任务内严格递增,由仓储统一分配
// ==========================================

use crate::domain::decision::Decision;
use crate::domain::types::GriStep;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const TS_FMT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub struct DecisionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DecisionRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入归类决定 (seq_no 由仓储分配)
    ///
    /// # 返回
    /// - Ok(seq_no): 分配的任务内序号
    pub fn insert(&self, decision: &mut Decision) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Self::insert_on(&conn, decision)
    }

    /// 在给定连接/事务上插入 (记录器组装单事务写入用)
    pub(crate) fn insert_on(conn: &Connection, decision: &mut Decision) -> RepositoryResult<i64> {
        let next_seq: i64 = conn.query_row(
            "SELECT COALESCE(MAX(seq_no), 0) + 1 FROM decision WHERE classification_id = ?",
            params![decision.classification_id],
            |row| row.get(0),
        )?;
        decision.seq_no = next_seq;

        conn.execute(
            r#"
            INSERT INTO decision (
                decision_id, classification_id, step, seq_no, question, answer,
                reasoning, confidence, legal_basis_json, evidence_json,
                supersedes, decided_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                decision.decision_id,
                decision.classification_id,
                decision.step.as_str(),
                decision.seq_no,
                decision.question,
                decision.answer,
                decision.reasoning,
                decision.confidence,
                serde_json::to_string(&decision.legal_basis)
                    .map_err(|e| RepositoryError::FieldValueError {
                        field: "legal_basis".to_string(),
                        message: e.to_string(),
                    })?,
                decision.evidence_json.as_ref().map(|v| v.to_string()),
                decision.supersedes,
                decision.decided_at.format(TS_FMT).to_string(),
            ],
        )?;

        Ok(next_seq)
    }

    /// 查询任务的全部决定 (按序号升序)
    pub fn find_by_classification(
        &self,
        classification_id: &str,
    ) -> RepositoryResult<Vec<Decision>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT decision_id, classification_id, step, seq_no, question, answer,
                   reasoning, confidence, legal_basis_json, evidence_json,
                   supersedes, decided_at
            FROM decision
            WHERE classification_id = ?
            ORDER BY seq_no
            "#,
        )?;

        let items = stmt
            .query_map(params![classification_id], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(items)
    }

    /// 任务最后记录的 GRI 步骤 (顺序校验用)
    pub fn last_recorded_step(
        &self,
        classification_id: &str,
    ) -> RepositoryResult<Option<GriStep>> {
        let conn = self.get_conn()?;
        Self::last_recorded_step_on(&conn, classification_id)
    }

    pub(crate) fn last_recorded_step_on(
        conn: &Connection,
        classification_id: &str,
    ) -> RepositoryResult<Option<GriStep>> {
        let step_str: Option<String> = conn
            .query_row(
                r#"
                SELECT step FROM decision
                WHERE classification_id = ?
                ORDER BY seq_no DESC LIMIT 1
                "#,
                params![classification_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        Ok(step_str.and_then(|s| GriStep::from_str(&s)))
    }

    fn map_row(row: &Row<'_>) -> SqliteResult<Decision> {
        let step_str: String = row.get(2)?;
        let legal_basis_str: String = row.get(8)?;
        let evidence_str: Option<String> = row.get(9)?;
        let decided_str: String = row.get(11)?;

        Ok(Decision {
            decision_id: row.get(0)?,
            classification_id: row.get(1)?,
            step: GriStep::from_str(&step_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    format!("未知GRI步骤: {}", step_str).into(),
                )
            })?,
            seq_no: row.get(3)?,
            question: row.get(4)?,
            answer: row.get(5)?,
            reasoning: row.get(6)?,
            confidence: row.get(7)?,
            legal_basis: serde_json::from_str(&legal_basis_str).unwrap_or_default(),
            evidence_json: evidence_str.and_then(|s| serde_json::from_str(&s).ok()),
            supersedes: row.get(10)?,
            decided_at: chrono::NaiveDateTime::parse_from_str(&decided_str, TS_FMT)
                .or_else(|_| {
                    chrono::NaiveDateTime::parse_from_str(&decided_str, "%Y-%m-%d %H:%M:%S")
                })
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        11,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::domain::classification::Classification;
    use crate::repository::classification_repo::ClassificationRepository;

    fn setup() -> (ClassificationRepository, DecisionRepository) {
        let conn = Arc::new(Mutex::new(db::open_in_memory().unwrap()));
        let crepo = ClassificationRepository::new(conn.clone());
        let drepo = DecisionRepository::new(conn);
        crepo
            .insert(&Classification::new("c1".to_string(), "棉制T恤衫".to_string()))
            .unwrap();
        (crepo, drepo)
    }

    #[test]
    fn test_seq_no_assigned_incrementally() {
        let (_c, repo) = setup();

        let mut d1 = Decision::new(
            "d1".to_string(),
            "c1".to_string(),
            GriStep::PreClassification,
            "特征提取完成".to_string(),
            1.0,
        );
        let mut d2 = Decision::new(
            "d2".to_string(),
            "c1".to_string(),
            GriStep::Gri1,
            "唯一品目匹配".to_string(),
            0.9,
        );

        assert_eq!(repo.insert(&mut d1).unwrap(), 1);
        assert_eq!(repo.insert(&mut d2).unwrap(), 2);

        let all = repo.find_by_classification("c1").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].seq_no, 1);
        assert_eq!(all[1].step, GriStep::Gri1);
    }

    #[test]
    fn test_last_recorded_step() {
        let (_c, repo) = setup();
        assert_eq!(repo.last_recorded_step("c1").unwrap(), None);

        let mut d = Decision::new(
            "d1".to_string(),
            "c1".to_string(),
            GriStep::Gri3a,
            "具体列名比较".to_string(),
            0.7,
        );
        repo.insert(&mut d).unwrap();
        assert_eq!(repo.last_recorded_step("c1").unwrap(), Some(GriStep::Gri3a));
    }

    #[test]
    fn test_legal_basis_roundtrip() {
        let (_c, repo) = setup();
        let mut d = Decision::new(
            "d1".to_string(),
            "c1".to_string(),
            GriStep::Gri1,
            "引用章注".to_string(),
            0.9,
        )
        .with_legal_basis(vec!["第61章注一".to_string()]);
        repo.insert(&mut d).unwrap();

        let read = repo.find_by_classification("c1").unwrap();
        assert!(read[0].legal_basis.contains(&"第61章注一".to_string()));
    }
}
