// ==========================================
// 海关商品归类系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为,避免"部分模块外键开启/部分不开启"
// - 统一 busy_timeout,减少并发写入时的偶发 busy 错误
// - 提供建表入口,测试与演示库共用同一份 schema
// ==========================================

use rusqlite::Connection;
use std::time::Duration;

/// 默认 busy_timeout(毫秒)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明:
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 建表 (幂等)
///
/// 分两组:
/// - 归类业务表: classification / decision / audit_entry
/// - 税则知识库表 (只读参考数据): tariff_code / exclusion_rule /
///   cross_reference / legal_note
/// - 配置表: config_kv
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS classification (
            classification_id TEXT PRIMARY KEY,
            description       TEXT NOT NULL,
            status            TEXT NOT NULL,
            current_step      TEXT NOT NULL,
            final_code        TEXT,
            confidence        REAL,
            metadata_json     TEXT,
            created_at        TEXT NOT NULL,
            updated_at        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS decision (
            decision_id       TEXT PRIMARY KEY,
            classification_id TEXT NOT NULL REFERENCES classification(classification_id),
            step              TEXT NOT NULL,
            seq_no            INTEGER NOT NULL,
            question          TEXT,
            answer            TEXT,
            reasoning         TEXT NOT NULL,
            confidence        REAL NOT NULL,
            legal_basis_json  TEXT NOT NULL,
            evidence_json     TEXT,
            supersedes        TEXT,
            decided_at        TEXT NOT NULL,
            UNIQUE (classification_id, seq_no)
        );

        CREATE TABLE IF NOT EXISTS audit_entry (
            audit_id          TEXT PRIMARY KEY,
            classification_id TEXT NOT NULL REFERENCES classification(classification_id),
            seq_no            INTEGER NOT NULL,
            action            TEXT NOT NULL,
            actor             TEXT NOT NULL,
            detail_json       TEXT,
            audit_ts          TEXT NOT NULL,
            prev_hash         TEXT NOT NULL,
            hash              TEXT NOT NULL,
            UNIQUE (classification_id, seq_no)
        );

        CREATE TABLE IF NOT EXISTS tariff_code (
            code          TEXT PRIMARY KEY,
            description   TEXT NOT NULL,
            level         TEXT NOT NULL,
            keywords      TEXT NOT NULL,
            parent_code   TEXT,
            check_digit   INTEGER
        );

        CREATE TABLE IF NOT EXISTS exclusion_rule (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            from_code      TEXT NOT NULL,
            to_code        TEXT NOT NULL,
            exclusion_type TEXT NOT NULL,
            note_ref       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS cross_reference (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            from_code TEXT NOT NULL,
            to_code   TEXT NOT NULL,
            ref_type  TEXT NOT NULL,
            note_ref  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS legal_note (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            code      TEXT NOT NULL,
            note_ref  TEXT NOT NULL,
            note_text TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key      TEXT NOT NULL,
            value    TEXT NOT NULL,
            PRIMARY KEY (scope_id, key)
        );

        CREATE INDEX IF NOT EXISTS idx_decision_cid ON decision(classification_id, seq_no);
        CREATE INDEX IF NOT EXISTS idx_audit_cid ON audit_entry(classification_id, seq_no);
        CREATE INDEX IF NOT EXISTS idx_exclusion_from ON exclusion_rule(from_code);
        "#,
    )
}

/// 打开内存库并建表 (测试/演示用)
pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_sqlite_connection(&conn)?;
    init_schema(&conn)?;
    Ok(conn)
}
