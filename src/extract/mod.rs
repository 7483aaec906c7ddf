// ==========================================
// 海关商品归类系统 - 特征提取层 (外部协作方)
// ==========================================
// 职责: 定义特征提取接口与文本工具,提供基于词表的默认实现
// 说明: 自由文本理解不是本系统的优化目标,词表实现只求可用、
//       可测、可替换;生产环境可注入更强的提取服务
// ==========================================

use crate::domain::candidate::{ExtractedFeatures, MaterialComponent, PackingHint};
use std::error::Error;

// ==========================================
// FeatureExtraction Trait - 特征提取接口
// ==========================================
// 契约: 输入商品描述自由文本,输出结构化特征;失败不阻断归类,
//       调用方以空特征降级处理
pub trait FeatureExtraction: Send + Sync {
    /// 从商品描述提取结构化特征
    fn extract_features(&self, text: &str) -> Result<ExtractedFeatures, Box<dyn Error>>;
}

// ==========================================
// 文本工具 (检索/相似度共用)
// ==========================================

/// 分词: ASCII 按非字母数字切分并转小写, CJK 逐字 + 相邻二字组合
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut ascii_buf = String::new();
    let mut prev_cjk: Option<char> = None;

    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            ascii_buf.push(ch.to_ascii_lowercase());
            prev_cjk = None;
        } else {
            if !ascii_buf.is_empty() {
                tokens.push(std::mem::take(&mut ascii_buf));
            }
            if is_cjk(ch) {
                tokens.push(ch.to_string());
                if let Some(prev) = prev_cjk {
                    tokens.push(format!("{}{}", prev, ch));
                }
                prev_cjk = Some(ch);
            } else {
                prev_cjk = None;
            }
        }
    }
    if !ascii_buf.is_empty() {
        tokens.push(ascii_buf);
    }
    tokens
}

/// 文本相似度: 词元集合的 Jaccard 系数
pub fn similarity(a: &str, b: &str) -> f64 {
    use std::collections::HashSet;
    let ta: HashSet<String> = tokenize(a).into_iter().collect();
    let tb: HashSet<String> = tokenize(b).into_iter().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let inter = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    inter / union
}

/// 关键词是否命中文本 (大小写不敏感, 支持 CJK 子串)
pub fn keyword_hit(text: &str, keyword: &str) -> bool {
    if keyword.is_empty() {
        return false;
    }
    text.to_lowercase().contains(&keyword.to_lowercase())
}

fn is_cjk(ch: char) -> bool {
    matches!(ch, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}')
}

// ==========================================
// KeywordFeatureExtractor - 词表特征提取
// ==========================================
pub struct KeywordFeatureExtractor;

/// 材质词表 (中英文常见申报材质)
const MATERIAL_LEXICON: &[&str] = &[
    "棉", "cotton", "羊毛", "wool", "聚酯纤维", "polyester", "尼龙", "nylon", "丝", "silk",
    "皮革", "leather", "钢", "steel", "铝", "aluminium", "铜", "copper", "塑料", "plastic",
    "玻璃", "glass", "木", "wood", "纸", "paper", "橡胶", "rubber", "陶瓷", "ceramic",
];

/// 用途词表
const PURPOSE_LEXICON: &[&str] = &[
    "服装", "apparel", "clothing", "家用", "household", "工业", "industrial", "医用",
    "medical", "食用", "food", "运动", "sports", "包装", "packaging", "装饰", "decorative",
];

/// 未制成/未组装提示词
const INCOMPLETE_LEXICON: &[&str] = &[
    "未组装", "散件", "半成品", "unassembled", "incomplete", "knocked down", "ckd", "skd",
];

/// 包装提示词
const PACKING_LEXICON: &[&str] = &["包装", "盒装", "礼盒", "case", "packed in", "container"];

/// 可重复使用包装提示词
const REUSABLE_LEXICON: &[&str] = &["可重复使用", "reusable", "专用盒", "fitted case"];

impl FeatureExtraction for KeywordFeatureExtractor {
    fn extract_features(&self, text: &str) -> Result<ExtractedFeatures, Box<dyn Error>> {
        let mut features = ExtractedFeatures::default();

        // 材质: 词表命中即记为成分,占比从 "100%" 一类写法粗提
        for material in MATERIAL_LEXICON {
            if keyword_hit(text, material) {
                let canonical = canonical_material(material);
                if features.materials.iter().any(|m| m.name == canonical) {
                    continue;
                }
                let mut component = MaterialComponent::named(&canonical);
                component.percentage = extract_percentage(text, material);
                features.materials.push(component);
            }
        }

        // 用途
        features.purpose = PURPOSE_LEXICON
            .iter()
            .find(|p| keyword_hit(text, p))
            .map(|p| canonical_purpose(p));

        // 技术规格: 针织/梭织等工艺词直接作为规格
        for spec in ["针织", "knitted", "梭织", "woven", "镀锌", "galvanized"] {
            if keyword_hit(text, spec) && !features.technical_specs.contains(&spec.to_string()) {
                features.technical_specs.push(spec.to_string());
            }
        }

        features.is_incomplete = INCOMPLETE_LEXICON.iter().any(|k| keyword_hit(text, k));
        features.is_mixture = features.materials.len() > 1;

        if PACKING_LEXICON.iter().any(|k| keyword_hit(text, k)) {
            let reusable = REUSABLE_LEXICON.iter().any(|k| keyword_hit(text, k));
            features.packing = Some(PackingHint {
                description: "描述中含包装信息".to_string(),
                specially_fitted: reusable,
                reusable,
                imparts_character: false,
            });
        }

        Ok(features)
    }
}

/// 中英文材质归一 (英文命中映射到中文词条)
fn canonical_material(hit: &str) -> String {
    match hit {
        "cotton" => "棉".to_string(),
        "wool" => "羊毛".to_string(),
        "polyester" => "聚酯纤维".to_string(),
        "nylon" => "尼龙".to_string(),
        "silk" => "丝".to_string(),
        "leather" => "皮革".to_string(),
        "steel" => "钢".to_string(),
        "aluminium" => "铝".to_string(),
        "copper" => "铜".to_string(),
        "plastic" => "塑料".to_string(),
        "glass" => "玻璃".to_string(),
        "wood" => "木".to_string(),
        "paper" => "纸".to_string(),
        "rubber" => "橡胶".to_string(),
        "ceramic" => "陶瓷".to_string(),
        other => other.to_string(),
    }
}

fn canonical_purpose(hit: &str) -> String {
    match hit {
        "apparel" | "clothing" => "服装".to_string(),
        "household" => "家用".to_string(),
        "industrial" => "工业".to_string(),
        "medical" => "医用".to_string(),
        "food" => "食用".to_string(),
        "sports" => "运动".to_string(),
        "packaging" => "包装".to_string(),
        "decorative" => "装饰".to_string(),
        other => other.to_string(),
    }
}

/// 粗提 "100% cotton" / "棉100%" 形式的占比
///
/// 在材质词每次出现位置的前后窗口内找 "NN%",取首个命中
fn extract_percentage(text: &str, material: &str) -> Option<f64> {
    let lower = text.to_lowercase();
    let material_lower = material.to_lowercase();

    for (pos, _) in lower.match_indices(&material_lower) {
        let start = pos.saturating_sub(12);
        let end = (pos + material_lower.len() + 12).min(lower.len());

        let mut digits = String::new();
        for &b in &lower.as_bytes()[start..end] {
            let ch = b as char;
            if ch.is_ascii_digit() {
                digits.push(ch);
            } else if ch == '%' && !digits.is_empty() {
                if let Ok(p) = digits.parse::<f64>() {
                    if p > 0.0 && p <= 100.0 {
                        return Some(p);
                    }
                }
                digits.clear();
            } else {
                digits.clear();
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_mixed_text() {
        let tokens = tokenize("Men's cotton T-shirt 棉制");
        assert!(tokens.contains(&"cotton".to_string()));
        assert!(tokens.contains(&"shirt".to_string()));
        assert!(tokens.contains(&"棉制".to_string()));
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("", "cotton"), 0.0);
        assert!(similarity("cotton t-shirt", "cotton t-shirt") > 0.99);
        let s = similarity("cotton t-shirt knitted", "cotton pullover knitted");
        assert!(s > 0.0 && s < 1.0);
    }

    #[test]
    fn test_extract_cotton_tshirt() {
        let extractor = KeywordFeatureExtractor;
        let features = extractor
            .extract_features("Men's cotton t-shirt, 100% cotton, knitted")
            .unwrap();

        assert_eq!(features.materials.len(), 1);
        assert_eq!(features.materials[0].name, "棉");
        assert_eq!(features.materials[0].percentage, Some(100.0));
        assert!(features.technical_specs.contains(&"knitted".to_string()));
        assert!(!features.is_mixture);
    }

    #[test]
    fn test_extract_incomplete_flag() {
        let extractor = KeywordFeatureExtractor;
        let features = extractor
            .extract_features("自行车散件,未组装,钢制车架")
            .unwrap();
        assert!(features.is_incomplete);
        assert!(features.materials.iter().any(|m| m.name == "钢"));
    }

    #[test]
    fn test_extract_mixture_flag() {
        let extractor = KeywordFeatureExtractor;
        let features = extractor
            .extract_features("衬衫,60%棉,40%聚酯纤维")
            .unwrap();
        assert!(features.is_mixture);
        assert_eq!(features.materials.len(), 2);
    }
}
