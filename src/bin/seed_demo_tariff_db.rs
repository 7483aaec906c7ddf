// ==========================================
// 海关商品归类系统 - 演示税则库灌库工具
// ==========================================
// 用法:
//   seed_demo_tariff_db [数据库路径]
//
// 灌入一小批税则条目、排他规则、互见条款与法律注释,
// 覆盖针织服装(第61章)、梭织服装(第62章)与贱金属制品(第73章)
// 的演示场景。重复执行幂等 (税则条目 INSERT OR REPLACE)。
// ==========================================

use hs_classifier::domain::tariff::{
    compute_check_digit, CrossReference, ExclusionRule, LegalNote, TariffCode,
};
use hs_classifier::domain::types::{CandidateLevel, CrossRefType, ExclusionType};
use hs_classifier::repository::tariff_repo::SqliteTariffRepository;
use hs_classifier::{db, logging};
use std::sync::{Arc, Mutex};
use tracing::{error, info};

fn main() {
    logging::init();

    let db_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "hs_classifier.db".to_string());

    if let Err(e) = seed(&db_path) {
        error!("灌库失败: {}", e);
        std::process::exit(1);
    }
}

fn seed(db_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let conn = db::open_sqlite_connection(db_path)?;
    db::init_schema(&conn)?;
    let repo = SqliteTariffRepository::new(Arc::new(Mutex::new(conn)));

    let codes = demo_codes();
    for code in &codes {
        repo.insert_code(code)?;
    }

    // 章注排他: 第61章为针织品,梭织衬衫归第62章
    repo.insert_exclusion(&ExclusionRule {
        from_code: "61".to_string(),
        to_code: "6205".to_string(),
        exclusion_type: ExclusionType::Heading,
        note_ref: "第61章注一".to_string(),
    })?;
    repo.insert_cross_reference(&CrossReference {
        from_code: "6109".to_string(),
        to_code: "6110".to_string(),
        ref_type: CrossRefType::SeeAlso,
        note_ref: "品目6109注释".to_string(),
    })?;

    repo.insert_legal_note(&LegalNote {
        code: "61".to_string(),
        note_ref: "第61章注一".to_string(),
        note_text: "本章仅适用于针织或钩编的制成衣着用品".to_string(),
    })?;
    repo.insert_legal_note(&LegalNote {
        code: "6109".to_string(),
        note_ref: "品目6109注释".to_string(),
        note_text: "T恤衫、汗衫及其他背心,针织或钩编".to_string(),
    })?;

    info!(
        "演示税则库灌库完成: 条目{}项, 排他1项, 互见1项, 注释2项 → {}",
        codes.len(),
        db_path
    );
    Ok(())
}

fn demo_codes() -> Vec<TariffCode> {
    fn code(
        code: &str,
        description: &str,
        level: CandidateLevel,
        keywords: &[&str],
        parent: Option<&str>,
    ) -> TariffCode {
        TariffCode {
            code: code.to_string(),
            description: description.to_string(),
            level,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            parent_code: parent.map(|p| p.to_string()),
            check_digit: if code.len() == 8 {
                compute_check_digit(code)
            } else {
                None
            },
        }
    }

    vec![
        // 第61章: 针织服装
        code(
            "6109",
            "T恤衫、汗衫及其他背心,针织或钩编",
            CandidateLevel::Heading,
            &["t恤", "t-shirt", "汗衫", "背心", "针织"],
            None,
        ),
        code(
            "61091000",
            "棉制针织或钩编的T恤衫、汗衫及其他背心",
            CandidateLevel::Tariff,
            &["棉", "cotton", "t恤", "t-shirt", "针织"],
            Some("6109"),
        ),
        code(
            "6110",
            "针织或钩编的套头衫、开襟衫、背心及类似品",
            CandidateLevel::Heading,
            &["套头衫", "毛衣", "开襟衫", "pullover", "sweater", "针织"],
            None,
        ),
        // 第62章: 梭织服装
        code(
            "6205",
            "男式衬衫(梭织)",
            CandidateLevel::Heading,
            &["衬衫", "shirt", "梭织", "woven"],
            None,
        ),
        code(
            "62052000",
            "棉制男式梭织衬衫",
            CandidateLevel::Tariff,
            &["棉", "cotton", "衬衫", "shirt", "梭织"],
            Some("6205"),
        ),
        // 第73章: 钢铁制品
        code(
            "7323",
            "钢铁制餐桌、厨房或其他家用器具及零件",
            CandidateLevel::Heading,
            &["钢", "steel", "厨房", "家用", "器具"],
            None,
        ),
        code(
            "73239300",
            "不锈钢制餐桌及厨房用器具",
            CandidateLevel::Tariff,
            &["不锈钢", "钢", "stainless", "厨房", "器具"],
            Some("7323"),
        ),
    ]
}
