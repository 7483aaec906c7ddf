// ==========================================
// 海关商品归类系统 - 归类任务仓储
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
// 红线: 写入路径强制 final_code ⟺ COMPLETED 不变式
// 红线: 归类任务永不物理删除 (软终止为 ARCHIVED)
// ==========================================

use crate::domain::classification::Classification;
use crate::domain::types::{ClassificationStatus, GriStep};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const TS_FMT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub struct ClassificationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ClassificationRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 不变式检查 (所有写入路径共用)
    fn check_invariant(c: &Classification) -> RepositoryResult<()> {
        if !c.invariant_holds() {
            return Err(RepositoryError::InvariantViolation(format!(
                "final_code 与状态不一致: status={}, final_code={:?}",
                c.status, c.final_code
            )));
        }
        Ok(())
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 插入归类任务
    pub fn insert(&self, c: &Classification) -> RepositoryResult<String> {
        Self::check_invariant(c)?;
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            INSERT INTO classification (
                classification_id, description, status, current_step,
                final_code, confidence, metadata_json, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                c.classification_id,
                c.description,
                c.status.as_str(),
                c.current_step.as_str(),
                c.final_code,
                c.confidence,
                c.metadata_json.as_ref().map(|v| v.to_string()),
                c.created_at.format(TS_FMT).to_string(),
                c.updated_at.format(TS_FMT).to_string(),
            ],
        )?;

        Ok(c.classification_id.clone())
    }

    /// 更新归类任务 (状态/步骤/结果/元数据)
    pub fn update(&self, c: &Classification) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::update_on(&conn, c)
    }

    /// 在给定连接/事务上更新 (记录器组装单事务写入用)
    pub(crate) fn update_on(conn: &Connection, c: &Classification) -> RepositoryResult<()> {
        Self::check_invariant(c)?;

        let rows = conn.execute(
            r#"
            UPDATE classification
            SET description = ?, status = ?, current_step = ?,
                final_code = ?, confidence = ?, metadata_json = ?, updated_at = ?
            WHERE classification_id = ?
            "#,
            params![
                c.description,
                c.status.as_str(),
                c.current_step.as_str(),
                c.final_code,
                c.confidence,
                c.metadata_json.as_ref().map(|v| v.to_string()),
                chrono::Utc::now().naive_utc().format(TS_FMT).to_string(),
                c.classification_id,
            ],
        )?;

        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Classification".to_string(),
                id: c.classification_id.clone(),
            });
        }
        Ok(())
    }

    // ==========================================
    // 查询操作
    // ==========================================

    /// 按ID查询
    pub fn find_by_id(&self, classification_id: &str) -> RepositoryResult<Option<Classification>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT classification_id, description, status, current_step,
                   final_code, confidence, metadata_json, created_at, updated_at
            FROM classification
            WHERE classification_id = ?
            "#,
        )?;

        match stmt.query_row(params![classification_id], Self::map_row) {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 按ID查询 (不存在则报错)
    pub fn get_by_id(&self, classification_id: &str) -> RepositoryResult<Classification> {
        self.find_by_id(classification_id)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "Classification".to_string(),
                id: classification_id.to_string(),
            })
    }

    /// 按状态查询 (复核队列等)
    pub fn find_by_status(
        &self,
        status: ClassificationStatus,
    ) -> RepositoryResult<Vec<Classification>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT classification_id, description, status, current_step,
                   final_code, confidence, metadata_json, created_at, updated_at
            FROM classification
            WHERE status = ?
            ORDER BY created_at
            "#,
        )?;

        let items = stmt
            .query_map(params![status.as_str()], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(items)
    }

    // ==========================================
    // 行映射
    // ==========================================

    fn map_row(row: &Row<'_>) -> SqliteResult<Classification> {
        let status_str: String = row.get(2)?;
        let step_str: String = row.get(3)?;
        let metadata_str: Option<String> = row.get(6)?;
        let created_str: String = row.get(7)?;
        let updated_str: String = row.get(8)?;

        Ok(Classification {
            classification_id: row.get(0)?,
            description: row.get(1)?,
            status: ClassificationStatus::from_str(&status_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    format!("未知归类状态: {}", status_str).into(),
                )
            })?,
            current_step: GriStep::from_str(&step_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    format!("未知GRI步骤: {}", step_str).into(),
                )
            })?,
            final_code: row.get(4)?,
            confidence: row.get(5)?,
            metadata_json: metadata_str.and_then(|s| serde_json::from_str(&s).ok()),
            created_at: parse_ts(&created_str, 7)?,
            updated_at: parse_ts(&updated_str, 8)?,
        })
    }
}

fn parse_ts(s: &str, col: usize) -> SqliteResult<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(s, TS_FMT)
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                col,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}
