// ==========================================
// 海关商品归类系统 - 审计链仓储
// ==========================================
// 红线: 只追加,不存在 UPDATE/DELETE 语句
// 红线: seq_no 任务内严格递增,prev_hash 必须等于上一条 hash
// ==========================================

use crate::domain::audit::{AuditAction, AuditEntry, GENESIS_HASH};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const TS_FMT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub struct AuditRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AuditRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 任务链尾状态: (下一序号, 链尾哈希)
    ///
    /// 空链返回 (1, GENESIS)
    pub fn chain_tail(&self, classification_id: &str) -> RepositoryResult<(i64, String)> {
        let conn = self.get_conn()?;
        Self::chain_tail_on(&conn, classification_id)
    }

    pub(crate) fn chain_tail_on(
        conn: &Connection,
        classification_id: &str,
    ) -> RepositoryResult<(i64, String)> {
        let tail: Option<(i64, String)> = conn
            .query_row(
                r#"
                SELECT seq_no, hash FROM audit_entry
                WHERE classification_id = ?
                ORDER BY seq_no DESC LIMIT 1
                "#,
                params![classification_id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        Ok(match tail {
            Some((seq, hash)) => (seq + 1, hash),
            None => (1, GENESIS_HASH.to_string()),
        })
    }

    /// 追加审计条目 (条目必须已按链尾封链)
    pub fn append(&self, entry: &AuditEntry) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::append_on(&conn, entry)
    }

    /// 在给定连接/事务上追加 (记录器组装单事务写入用)
    pub(crate) fn append_on(conn: &Connection, entry: &AuditEntry) -> RepositoryResult<()> {
        // 封链校验: prev_hash/seq_no 必须衔接当前链尾
        let (expected_seq, expected_prev) = Self::chain_tail_on(&conn, &entry.classification_id)?;
        if entry.seq_no != expected_seq || entry.prev_hash != expected_prev {
            return Err(RepositoryError::InvariantViolation(format!(
                "审计链衔接错误: 期望 seq_no={} prev_hash={}..., 实际 seq_no={} prev_hash={}...",
                expected_seq,
                &expected_prev[..expected_prev.len().min(8)],
                entry.seq_no,
                &entry.prev_hash[..entry.prev_hash.len().min(8)],
            )));
        }

        conn.execute(
            r#"
            INSERT INTO audit_entry (
                audit_id, classification_id, seq_no, action, actor,
                detail_json, audit_ts, prev_hash, hash
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                entry.audit_id,
                entry.classification_id,
                entry.seq_no,
                entry.action.as_str(),
                entry.actor,
                entry.detail_json.as_ref().map(|v| v.to_string()),
                entry.audit_ts.format(TS_FMT).to_string(),
                entry.prev_hash,
                entry.hash,
            ],
        )?;
        Ok(())
    }

    /// 查询任务完整审计链 (按序号升序)
    pub fn find_by_classification(
        &self,
        classification_id: &str,
    ) -> RepositoryResult<Vec<AuditEntry>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT audit_id, classification_id, seq_no, action, actor,
                   detail_json, audit_ts, prev_hash, hash
            FROM audit_entry
            WHERE classification_id = ?
            ORDER BY seq_no
            "#,
        )?;

        let items = stmt
            .query_map(params![classification_id], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(items)
    }

    fn map_row(row: &Row<'_>) -> SqliteResult<AuditEntry> {
        let action_str: String = row.get(3)?;
        let detail_str: Option<String> = row.get(5)?;
        let ts_str: String = row.get(6)?;

        Ok(AuditEntry {
            audit_id: row.get(0)?,
            classification_id: row.get(1)?,
            seq_no: row.get(2)?,
            action: AuditAction::from_str(&action_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    format!("未知审计动作: {}", action_str).into(),
                )
            })?,
            actor: row.get(4)?,
            detail_json: detail_str.and_then(|s| serde_json::from_str(&s).ok()),
            audit_ts: chrono::NaiveDateTime::parse_from_str(&ts_str, TS_FMT)
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(&ts_str, "%Y-%m-%d %H:%M:%S"))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        6,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
            prev_hash: row.get(7)?,
            hash: row.get(8)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::domain::classification::Classification;
    use crate::repository::classification_repo::ClassificationRepository;
    use serde_json::json;

    fn setup() -> AuditRepository {
        let conn = Arc::new(Mutex::new(db::open_in_memory().unwrap()));
        ClassificationRepository::new(conn.clone())
            .insert(&Classification::new("c1".to_string(), "棉制T恤衫".to_string()))
            .unwrap();
        AuditRepository::new(conn)
    }

    fn append_next(repo: &AuditRepository, action: AuditAction) -> AuditEntry {
        let (seq, prev) = repo.chain_tail("c1").unwrap();
        let entry = AuditEntry::new(
            format!("a{}", seq),
            "c1".to_string(),
            seq,
            action,
            "system".to_string(),
            Some(json!({"seq": seq})),
            prev,
        );
        repo.append(&entry).unwrap();
        entry
    }

    #[test]
    fn test_chain_tail_starts_at_genesis() {
        let repo = setup();
        let (seq, prev) = repo.chain_tail("c1").unwrap();
        assert_eq!(seq, 1);
        assert_eq!(prev, GENESIS_HASH);
    }

    #[test]
    fn test_append_links_chain() {
        let repo = setup();
        let a = append_next(&repo, AuditAction::ClassificationCreated);
        let b = append_next(&repo, AuditAction::StepDecision);

        assert_eq!(b.prev_hash, a.hash);
        let entries = repo.find_by_classification("c1").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].seq_no, 2);
    }

    #[test]
    fn test_append_rejects_broken_link() {
        let repo = setup();
        append_next(&repo, AuditAction::ClassificationCreated);

        // prev_hash 不衔接链尾: 拒绝
        let bogus = AuditEntry::new(
            "ax".to_string(),
            "c1".to_string(),
            2,
            AuditAction::StepDecision,
            "system".to_string(),
            None,
            "wrong-prev".to_string(),
        );
        assert!(matches!(
            repo.append(&bogus),
            Err(RepositoryError::InvariantViolation(_))
        ));
    }
}
