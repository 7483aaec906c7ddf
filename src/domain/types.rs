// ==========================================
// 海关商品归类系统 - 领域类型定义
// ==========================================
// 依据: WCO《商品名称及编码协调制度》归类总规则 (GRI)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 归类状态 (Classification Status)
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// 红线: final_code 有值 当且仅当 状态为 COMPLETED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassificationStatus {
    InProgress,  // 归类进行中
    Completed,   // 归类完成(唯一税号通过校验)
    NeedsReview, // 置信度不足或无匹配条文,转专家复核
    Archived,    // 软终止(历史永不物理删除)
}

impl ClassificationStatus {
    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationStatus::InProgress => "IN_PROGRESS",
            ClassificationStatus::Completed => "COMPLETED",
            ClassificationStatus::NeedsReview => "NEEDS_REVIEW",
            ClassificationStatus::Archived => "ARCHIVED",
        }
    }

    /// 从字符串解析
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "IN_PROGRESS" => Some(ClassificationStatus::InProgress),
            "COMPLETED" => Some(ClassificationStatus::Completed),
            "NEEDS_REVIEW" => Some(ClassificationStatus::NeedsReview),
            "ARCHIVED" => Some(ClassificationStatus::Archived),
            _ => None,
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClassificationStatus::InProgress)
    }
}

impl fmt::Display for ClassificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// GRI 步骤 (GRI Step)
// ==========================================
// 红线: 顺序制,规则只能按法定编号递增应用,不可配置重排
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GriStep {
    PreClassification, // 预归类: 输入校验 + 特征提取
    Gri1,              // 规则一: 按品目条文及类注章注归类
    Gri2a,             // 规则二(一): 未制成品/未组装品按完整品归类
    Gri2b,             // 规则二(二): 混合物/组合物扩展到成分品目
    Gri3a,             // 规则三(一): 具体列名优先
    Gri3b,             // 规则三(二): 基本特征归类
    Gri3c,             // 规则三(三): 从后归类(最末品目)
    Gri4,              // 规则四: 最相类似货品归类
    Gri5a,             // 规则五(一): 专用包装容器随主货品
    Gri5b,             // 规则五(二): 一般包装材料随主货品
    Gri6,              // 规则六: 子目层级递归适用规则一至五
    Validation,        // 校验: 校验码复核 + 排他条款终检
}

impl GriStep {
    /// 规则法定顺序 (严格递增)
    pub fn order_index(&self) -> u8 {
        match self {
            GriStep::PreClassification => 0,
            GriStep::Gri1 => 1,
            GriStep::Gri2a => 2,
            GriStep::Gri2b => 3,
            GriStep::Gri3a => 4,
            GriStep::Gri3b => 5,
            GriStep::Gri3c => 6,
            GriStep::Gri4 => 7,
            GriStep::Gri5a => 8,
            GriStep::Gri5b => 9,
            GriStep::Gri6 => 10,
            GriStep::Validation => 11,
        }
    }

    /// 是否为必经步骤
    ///
    /// 非必经步骤在法律上不适用时仍记录"不适用"决定;
    /// 仅当更早规则已给出唯一解时才允许跳过。
    pub fn is_mandatory(&self) -> bool {
        matches!(
            self,
            GriStep::PreClassification | GriStep::Gri1 | GriStep::Gri6 | GriStep::Validation
        )
    }

    /// 规则条文摘要 (决定记录中引用的法律依据文本)
    pub fn legal_text(&self) -> &'static str {
        match self {
            GriStep::PreClassification => "预归类: 商品描述规范化与结构化特征提取",
            GriStep::Gri1 => "归类总规则一: 归类应按品目条文以及有关类注或章注确定",
            GriStep::Gri2a => {
                "归类总规则二(一): 不完整品或未制成品具有完整品基本特征的,按完整品归类"
            }
            GriStep::Gri2b => "归类总规则二(二): 混合或组合材料构成的货品,按规则三的原则归类",
            GriStep::Gri3a => "归类总规则三(一): 列名比较具体的品目,优先于列名一般的品目",
            GriStep::Gri3b => "归类总规则三(二): 按构成货品基本特征的材料或部件归类",
            GriStep::Gri3c => "归类总规则三(三): 按号列顺序归入最后的品目",
            GriStep::Gri4 => "归类总规则四: 按与其最相类似的货品归类",
            GriStep::Gri5a => "归类总规则五(一): 专用盒匣及类似容器与所装货品一并归类",
            GriStep::Gri5b => {
                "归类总规则五(二): 包装材料及容器与所装货品一并归类,明显可重复使用者除外"
            }
            GriStep::Gri6 => "归类总规则六: 子目归类按子目条文及相关注释,比照上述规则确定",
            GriStep::Validation => "税号校验: 校验码复核与排他条款终检",
        }
    }

    /// 本步骤所需输入
    pub fn required_inputs(&self) -> &'static [&'static str] {
        match self {
            GriStep::PreClassification => &["description"],
            GriStep::Gri1 => &["description", "features"],
            GriStep::Gri2a => &["features.is_incomplete"],
            GriStep::Gri2b => &["features.materials"],
            GriStep::Gri3a => &["candidates"],
            GriStep::Gri3b => &["candidates", "features.materials"],
            GriStep::Gri3c => &["candidates"],
            GriStep::Gri4 => &["description", "classified_history"],
            GriStep::Gri5a => &["features.packing"],
            GriStep::Gri5b => &["features.packing"],
            GriStep::Gri6 => &["resolved_heading"],
            GriStep::Validation => &["final_code"],
        }
    }

    /// 法定顺序中的下一步骤
    pub fn next(&self) -> Option<GriStep> {
        match self {
            GriStep::PreClassification => Some(GriStep::Gri1),
            GriStep::Gri1 => Some(GriStep::Gri2a),
            GriStep::Gri2a => Some(GriStep::Gri2b),
            GriStep::Gri2b => Some(GriStep::Gri3a),
            GriStep::Gri3a => Some(GriStep::Gri3b),
            GriStep::Gri3b => Some(GriStep::Gri3c),
            GriStep::Gri3c => Some(GriStep::Gri4),
            GriStep::Gri4 => Some(GriStep::Gri5a),
            GriStep::Gri5a => Some(GriStep::Gri5b),
            GriStep::Gri5b => Some(GriStep::Gri6),
            GriStep::Gri6 => Some(GriStep::Validation),
            GriStep::Validation => None,
        }
    }

    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            GriStep::PreClassification => "PRE_CLASSIFICATION",
            GriStep::Gri1 => "GRI_1",
            GriStep::Gri2a => "GRI_2A",
            GriStep::Gri2b => "GRI_2B",
            GriStep::Gri3a => "GRI_3A",
            GriStep::Gri3b => "GRI_3B",
            GriStep::Gri3c => "GRI_3C",
            GriStep::Gri4 => "GRI_4",
            GriStep::Gri5a => "GRI_5A",
            GriStep::Gri5b => "GRI_5B",
            GriStep::Gri6 => "GRI_6",
            GriStep::Validation => "VALIDATION",
        }
    }

    /// 从字符串解析
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PRE_CLASSIFICATION" => Some(GriStep::PreClassification),
            "GRI_1" => Some(GriStep::Gri1),
            "GRI_2A" => Some(GriStep::Gri2a),
            "GRI_2B" => Some(GriStep::Gri2b),
            "GRI_3A" => Some(GriStep::Gri3a),
            "GRI_3B" => Some(GriStep::Gri3b),
            "GRI_3C" => Some(GriStep::Gri3c),
            "GRI_4" => Some(GriStep::Gri4),
            "GRI_5A" => Some(GriStep::Gri5a),
            "GRI_5B" => Some(GriStep::Gri5b),
            "GRI_6" => Some(GriStep::Gri6),
            "VALIDATION" => Some(GriStep::Validation),
            _ => None,
        }
    }

    /// 全部步骤 (法定顺序)
    pub fn all() -> &'static [GriStep] {
        &[
            GriStep::PreClassification,
            GriStep::Gri1,
            GriStep::Gri2a,
            GriStep::Gri2b,
            GriStep::Gri3a,
            GriStep::Gri3b,
            GriStep::Gri3c,
            GriStep::Gri4,
            GriStep::Gri5a,
            GriStep::Gri5b,
            GriStep::Gri6,
            GriStep::Validation,
        ]
    }
}

impl fmt::Display for GriStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 税号层级 (Candidate Level)
// ==========================================
// 章(2位) → 品目(4位) → 子目(6位) → 税则细目(8位)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandidateLevel {
    Heading,    // 品目 (4位)
    Subheading, // 子目 (6位)
    Tariff,     // 税则细目 (8位)
}

impl CandidateLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateLevel::Heading => "HEADING",
            CandidateLevel::Subheading => "SUBHEADING",
            CandidateLevel::Tariff => "TARIFF",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "HEADING" => Some(CandidateLevel::Heading),
            "SUBHEADING" => Some(CandidateLevel::Subheading),
            "TARIFF" => Some(CandidateLevel::Tariff),
            _ => None,
        }
    }

    /// 该层级对应的编码位数
    pub fn code_len(&self) -> usize {
        match self {
            CandidateLevel::Heading => 4,
            CandidateLevel::Subheading => 6,
            CandidateLevel::Tariff => 8,
        }
    }
}

impl fmt::Display for CandidateLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 排他规则类型 (Exclusion Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExclusionType {
    Chapter, // 章级排他 (章注)
    Heading, // 品目级排他 (品目注释)
}

impl ExclusionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExclusionType::Chapter => "CHAPTER",
            ExclusionType::Heading => "HEADING",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "CHAPTER" => Some(ExclusionType::Chapter),
            "HEADING" => Some(ExclusionType::Heading),
            _ => None,
        }
    }
}

impl fmt::Display for ExclusionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 互见条款类型 (Cross Reference Type)
// ==========================================
// 红线: 互见条款仅作提示,绝不剪枝候选集
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrossRefType {
    See,     // 参见
    SeeAlso, // 另见
    Compare, // 比照
}

impl CrossRefType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrossRefType::See => "SEE",
            CrossRefType::SeeAlso => "SEE_ALSO",
            CrossRefType::Compare => "COMPARE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "SEE" => Some(CrossRefType::See),
            "SEE_ALSO" => Some(CrossRefType::SeeAlso),
            "COMPARE" => Some(CrossRefType::Compare),
            _ => None,
        }
    }
}

impl fmt::Display for CrossRefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 基本特征判定因素 (Essential Character Factor)
// ==========================================
// 依据: GRI 3(b) 注释 — 作用 > 价值 > 重量/体积 > 数量, 逐级决胜
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CharacterFactor {
    RoleInUse, // 使用中的作用
    Value,     // 价值占比
    Weight,    // 重量/体积占比
    Quantity,  // 数量
}

impl CharacterFactor {
    pub fn as_str(&self) -> &'static str {
        match self {
            CharacterFactor::RoleInUse => "ROLE_IN_USE",
            CharacterFactor::Value => "VALUE",
            CharacterFactor::Weight => "WEIGHT",
            CharacterFactor::Quantity => "QUANTITY",
        }
    }

    /// 判定优先顺序
    pub fn priority_order() -> &'static [CharacterFactor] {
        &[
            CharacterFactor::RoleInUse,
            CharacterFactor::Value,
            CharacterFactor::Weight,
            CharacterFactor::Quantity,
        ]
    }
}

impl fmt::Display for CharacterFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
