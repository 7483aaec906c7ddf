// ==========================================
// 海关商品归类系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询 (config_kv 表, scope='global')
// 说明: 缺失配置回落默认值;默认值与 StaticClassifyConfig 一致
// ==========================================

use crate::config::classify_config_trait::{ClassifyConfigReader, StaticClassifyConfig};
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// 配置键
// ==========================================
pub mod config_keys {
    pub const TARGET_CONFIDENCE: &str = "classify.target_confidence";
    pub const REVIEW_THRESHOLD: &str = "classify.review_threshold";
    pub const NOTIFY_THRESHOLD: &str = "classify.notify_threshold";
    pub const MAX_CLARIFY_QUESTIONS: &str = "classify.max_clarify_questions";
    pub const MIN_DESCRIPTION_LEN: &str = "classify.min_description_len";
    pub const ANALOGY_SIMILARITY_THRESHOLD: &str = "classify.analogy_similarity_threshold";
    pub const KEYWORD_WEIGHT: &str = "resolver.keyword_weight";
    pub const MATERIAL_WEIGHT: &str = "resolver.material_weight";
    pub const LEVEL_BOOST_WEIGHT: &str = "resolver.level_boost_weight";
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
    defaults: StaticClassifyConfig,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            defaults: StaticClassifyConfig::default(),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明: 为保证连接行为一致,会对传入连接再次应用统一 PRAGMA(幂等)
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }
        Ok(Self {
            conn,
            defaults: StaticClassifyConfig::default(),
        })
    }

    /// 从 config_kv 表读取配置值 (scope_id='global')
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入 global scope 配置 (管理工具/测试夹具用)
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT OR REPLACE INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn get_f64(&self, key: &str, default: f64) -> Result<f64, Box<dyn Error>> {
        Ok(self
            .get_config_value(key)?
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(default))
    }

    fn get_u32(&self, key: &str, default: u32) -> Result<u32, Box<dyn Error>> {
        Ok(self
            .get_config_value(key)?
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(default))
    }
}

#[async_trait]
impl ClassifyConfigReader for ConfigManager {
    async fn get_target_confidence(&self) -> Result<f64, Box<dyn Error>> {
        self.get_f64(
            config_keys::TARGET_CONFIDENCE,
            self.defaults.target_confidence,
        )
    }

    async fn get_review_threshold(&self) -> Result<f64, Box<dyn Error>> {
        self.get_f64(
            config_keys::REVIEW_THRESHOLD,
            self.defaults.review_threshold,
        )
    }

    async fn get_notify_threshold(&self) -> Result<f64, Box<dyn Error>> {
        self.get_f64(
            config_keys::NOTIFY_THRESHOLD,
            self.defaults.notify_threshold,
        )
    }

    async fn get_max_clarify_questions(&self) -> Result<u32, Box<dyn Error>> {
        self.get_u32(
            config_keys::MAX_CLARIFY_QUESTIONS,
            self.defaults.max_clarify_questions,
        )
    }

    async fn get_min_description_len(&self) -> Result<usize, Box<dyn Error>> {
        Ok(self.get_u32(
            config_keys::MIN_DESCRIPTION_LEN,
            self.defaults.min_description_len as u32,
        )? as usize)
    }

    async fn get_analogy_similarity_threshold(&self) -> Result<f64, Box<dyn Error>> {
        self.get_f64(
            config_keys::ANALOGY_SIMILARITY_THRESHOLD,
            self.defaults.analogy_similarity_threshold,
        )
    }

    async fn get_keyword_weight(&self) -> Result<f64, Box<dyn Error>> {
        self.get_f64(config_keys::KEYWORD_WEIGHT, self.defaults.keyword_weight)
    }

    async fn get_material_weight(&self) -> Result<f64, Box<dyn Error>> {
        self.get_f64(config_keys::MATERIAL_WEIGHT, self.defaults.material_weight)
    }

    async fn get_level_boost_weight(&self) -> Result<f64, Box<dyn Error>> {
        self.get_f64(
            config_keys::LEVEL_BOOST_WEIGHT,
            self.defaults.level_boost_weight,
        )
    }
}
