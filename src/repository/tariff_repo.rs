// ==========================================
// 海关商品归类系统 - 税则知识库仓储
// ==========================================
// 职责: 实现引擎定义的 TariffKnowledgeBase 接口 (SQLite 适配器)
// 红线: Repository 不做业务逻辑,只做数据映射与检索
// ==========================================

use crate::domain::candidate::Candidate;
use crate::domain::tariff::{
    compute_check_digit, CrossReference, ExclusionRule, LegalNote, TariffCode,
};
use crate::domain::types::{CandidateLevel, CrossRefType, ExclusionType};
use crate::engine::knowledge::{AnalogyMatch, CheckDigitReport, TariffKnowledgeBase};
use crate::extract::{keyword_hit, similarity};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::error::Error;
use std::sync::{Arc, Mutex};

pub struct SqliteTariffRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTariffRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入税则条目 (灌库工具/测试夹具用)
    pub fn insert_code(&self, entry: &TariffCode) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO tariff_code (
                code, description, level, keywords, parent_code, check_digit
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                entry.code,
                entry.description,
                entry.level.as_str(),
                serde_json::to_string(&entry.keywords)
                    .map_err(|e| RepositoryError::FieldValueError {
                        field: "keywords".to_string(),
                        message: e.to_string(),
                    })?,
                entry.parent_code,
                entry.check_digit,
            ],
        )?;
        Ok(())
    }

    /// 插入排他规则 (灌库工具/测试夹具用)
    pub fn insert_exclusion(&self, rule: &ExclusionRule) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO exclusion_rule (from_code, to_code, exclusion_type, note_ref) VALUES (?, ?, ?, ?)",
            params![
                rule.from_code,
                rule.to_code,
                rule.exclusion_type.as_str(),
                rule.note_ref
            ],
        )?;
        Ok(())
    }

    /// 插入互见条款 (灌库工具/测试夹具用)
    pub fn insert_cross_reference(&self, cr: &CrossReference) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO cross_reference (from_code, to_code, ref_type, note_ref) VALUES (?, ?, ?, ?)",
            params![cr.from_code, cr.to_code, cr.ref_type.as_str(), cr.note_ref],
        )?;
        Ok(())
    }

    /// 插入法律注释 (灌库工具/测试夹具用)
    pub fn insert_legal_note(&self, note: &LegalNote) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO legal_note (code, note_ref, note_text) VALUES (?, ?, ?)",
            params![note.code, note.note_ref, note.note_text],
        )?;
        Ok(())
    }

    /// 全量读取税则条目 (演示规模下在内存中做关键词过滤)
    fn load_all_codes(&self) -> RepositoryResult<Vec<TariffCode>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT code, description, level, keywords, parent_code, check_digit FROM tariff_code ORDER BY code",
        )?;
        let items = stmt
            .query_map([], Self::map_code_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(items)
    }

    fn map_code_row(row: &Row<'_>) -> SqliteResult<TariffCode> {
        let level_str: String = row.get(2)?;
        let keywords_str: String = row.get(3)?;
        Ok(TariffCode {
            code: row.get(0)?,
            description: row.get(1)?,
            level: CandidateLevel::from_str(&level_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    format!("未知税号层级: {}", level_str).into(),
                )
            })?,
            keywords: serde_json::from_str(&keywords_str).unwrap_or_default(),
            parent_code: row.get(4)?,
            check_digit: row.get(5)?,
        })
    }
}

impl TariffKnowledgeBase for SqliteTariffRepository {
    fn lookup_by_keyword(
        &self,
        text: &str,
        extra_keywords: &[String],
    ) -> Result<Vec<Candidate>, Box<dyn Error>> {
        let codes = self.load_all_codes()?;

        let mut candidates = Vec::new();
        for entry in codes {
            if entry.keywords.is_empty() {
                continue;
            }
            // 命中数: 条目关键词出现在描述或附加关键词中
            let hits = entry
                .keywords
                .iter()
                .filter(|kw| {
                    keyword_hit(text, kw) || extra_keywords.iter().any(|e| keyword_hit(e, kw))
                })
                .count();
            if hits == 0 {
                continue;
            }
            let overlap = hits as f64 / entry.keywords.len() as f64;
            candidates.push(Candidate {
                code: entry.code,
                description: entry.description,
                level: entry.level,
                specificity_score: 0.0,
                match_score: overlap,
            });
        }
        Ok(candidates)
    }

    fn get_exclusions(&self, code: &str) -> Result<Vec<ExclusionRule>, Box<dyn Error>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT from_code, to_code, exclusion_type, note_ref FROM exclusion_rule WHERE from_code = ?",
        )?;
        let items = stmt
            .query_map(params![code], |row| {
                let type_str: String = row.get(2)?;
                Ok(ExclusionRule {
                    from_code: row.get(0)?,
                    to_code: row.get(1)?,
                    exclusion_type: ExclusionType::from_str(&type_str)
                        .unwrap_or(ExclusionType::Heading),
                    note_ref: row.get(3)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(items)
    }

    fn get_cross_references(&self, code: &str) -> Result<Vec<CrossReference>, Box<dyn Error>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT from_code, to_code, ref_type, note_ref FROM cross_reference WHERE from_code = ?",
        )?;
        let items = stmt
            .query_map(params![code], |row| {
                let type_str: String = row.get(2)?;
                Ok(CrossReference {
                    from_code: row.get(0)?,
                    to_code: row.get(1)?,
                    ref_type: CrossRefType::from_str(&type_str).unwrap_or(CrossRefType::See),
                    note_ref: row.get(3)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(items)
    }

    fn get_legal_notes(&self, code: &str) -> Result<Vec<LegalNote>, Box<dyn Error>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT code, note_ref, note_text FROM legal_note WHERE code = ?")?;
        let items = stmt
            .query_map(params![code], |row| {
                Ok(LegalNote {
                    code: row.get(0)?,
                    note_ref: row.get(1)?,
                    note_text: row.get(2)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(items)
    }

    fn validate_check_digit(&self, code8: &str) -> Result<CheckDigitReport, Box<dyn Error>> {
        let computed = compute_check_digit(code8)
            .ok_or_else(|| format!("税号格式错误,无法计算校验码: {}", code8))?;

        let conn = self.get_conn()?;
        let registered: Option<u8> = conn
            .query_row(
                "SELECT check_digit FROM tariff_code WHERE code = ?",
                params![code8],
                |row| row.get::<_, Option<u8>>(0),
            )
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        Ok(CheckDigitReport {
            code: code8.to_string(),
            computed,
            registered,
        })
    }

    fn find_similar_classified(
        &self,
        description: &str,
    ) -> Result<Option<AnalogyMatch>, Box<dyn Error>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT description, final_code
            FROM classification
            WHERE status = 'COMPLETED' AND final_code IS NOT NULL
            "#,
        )?;
        let pairs = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        drop(stmt);
        drop(conn);

        let best = pairs
            .into_iter()
            .map(|(desc, code)| {
                let sim = similarity(description, &desc);
                AnalogyMatch {
                    code,
                    comparator_description: desc,
                    similarity: sim,
                }
            })
            .filter(|m| m.similarity > 0.0)
            .max_by(|a, b| {
                a.similarity
                    .partial_cmp(&b.similarity)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        Ok(best)
    }
}
