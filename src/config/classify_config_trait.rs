// ==========================================
// 海关商品归类系统 - 归类配置读取 Trait
// ==========================================
// 职责: 定义引擎所需的配置读取接口(不包含实现)
// 说明: 引擎不持有任何进程级可变配置,全部经注入的读取器获取;
//       测试注入 StaticClassifyConfig,生产注入 ConfigManager
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use std::error::Error;

// ==========================================
// ClassifyConfigReader Trait
// ==========================================
#[async_trait]
pub trait ClassifyConfigReader: Send + Sync {
    // ===== 置信度阈值 =====

    /// 澄清循环的目标置信度
    ///
    /// # 默认值
    /// - 0.85
    async fn get_target_confidence(&self) -> Result<f64, Box<dyn Error>>;

    /// 专家复核阈值 (最终置信度低于此值 ⇒ NEEDS_REVIEW)
    ///
    /// # 默认值
    /// - 0.50
    async fn get_review_threshold(&self) -> Result<f64, Box<dyn Error>>;

    /// 低置信度通知阈值 (跌破时通知一次)
    ///
    /// # 默认值
    /// - 0.70
    async fn get_notify_threshold(&self) -> Result<f64, Box<dyn Error>>;

    // ===== 澄清循环 =====

    /// 单个任务允许的最大澄清问题数 (结构性终止保证)
    ///
    /// # 默认值
    /// - 3
    async fn get_max_clarify_questions(&self) -> Result<u32, Box<dyn Error>>;

    // ===== 输入校验 =====

    /// 商品描述最小长度 (字符数,不足则入口拒绝)
    ///
    /// # 默认值
    /// - 8
    async fn get_min_description_len(&self) -> Result<usize, Box<dyn Error>>;

    // ===== 规则四 =====

    /// 类比归类的最低相似度
    ///
    /// # 默认值
    /// - 0.60
    async fn get_analogy_similarity_threshold(&self) -> Result<f64, Box<dyn Error>>;

    // ===== 候选评分权重 =====

    /// 关键词重合度权重
    ///
    /// # 默认值
    /// - 0.6
    async fn get_keyword_weight(&self) -> Result<f64, Box<dyn Error>>;

    /// 材质匹配权重
    ///
    /// # 默认值
    /// - 0.3
    async fn get_material_weight(&self) -> Result<f64, Box<dyn Error>>;

    /// 初次归类时品目层级的加成 (品目 > 子目 > 税则细目)
    ///
    /// # 默认值
    /// - 0.1
    async fn get_level_boost_weight(&self) -> Result<f64, Box<dyn Error>>;
}

// ==========================================
// StaticClassifyConfig - 内存静态配置
// ==========================================
// 用途: 测试与演示;字段即配置,无任何外部读取
#[derive(Debug, Clone)]
pub struct StaticClassifyConfig {
    pub target_confidence: f64,
    pub review_threshold: f64,
    pub notify_threshold: f64,
    pub max_clarify_questions: u32,
    pub min_description_len: usize,
    pub analogy_similarity_threshold: f64,
    pub keyword_weight: f64,
    pub material_weight: f64,
    pub level_boost_weight: f64,
}

impl Default for StaticClassifyConfig {
    fn default() -> Self {
        Self {
            target_confidence: 0.85,
            review_threshold: 0.50,
            notify_threshold: 0.70,
            max_clarify_questions: 3,
            min_description_len: 8,
            analogy_similarity_threshold: 0.60,
            keyword_weight: 0.6,
            material_weight: 0.3,
            level_boost_weight: 0.1,
        }
    }
}

#[async_trait]
impl ClassifyConfigReader for StaticClassifyConfig {
    async fn get_target_confidence(&self) -> Result<f64, Box<dyn Error>> {
        Ok(self.target_confidence)
    }

    async fn get_review_threshold(&self) -> Result<f64, Box<dyn Error>> {
        Ok(self.review_threshold)
    }

    async fn get_notify_threshold(&self) -> Result<f64, Box<dyn Error>> {
        Ok(self.notify_threshold)
    }

    async fn get_max_clarify_questions(&self) -> Result<u32, Box<dyn Error>> {
        Ok(self.max_clarify_questions)
    }

    async fn get_min_description_len(&self) -> Result<usize, Box<dyn Error>> {
        Ok(self.min_description_len)
    }

    async fn get_analogy_similarity_threshold(&self) -> Result<f64, Box<dyn Error>> {
        Ok(self.analogy_similarity_threshold)
    }

    async fn get_keyword_weight(&self) -> Result<f64, Box<dyn Error>> {
        Ok(self.keyword_weight)
    }

    async fn get_material_weight(&self) -> Result<f64, Box<dyn Error>> {
        Ok(self.material_weight)
    }

    async fn get_level_boost_weight(&self) -> Result<f64, Box<dyn Error>> {
        Ok(self.level_boost_weight)
    }
}
