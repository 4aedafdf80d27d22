//! 调研结果的结构化记录
//!
//! 每个分区都是可选的子结构，未知字段保留在 `extra` 中。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// "与业务无关"分类的哨兵值
pub const NOT_RELEVANT: &str = "NOT_RELEVANT";

/// 单个公司的调研记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchRecord {
    pub company_name: String,
    pub research_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    pub company_classification: Classification,
    pub qualification: Qualification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_data: Option<ProfileData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_gaps: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResearchRecord {
    pub fn is_qualified(&self) -> bool {
        self.qualification.overall_qualified
    }
}

/// 公司分类
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Classification {
    pub fn is_not_relevant(&self) -> bool {
        self.kind == NOT_RELEVANT
    }
}

/// 资质判断
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Qualification {
    pub overall_qualified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_standing: Option<StatusSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_portfolio: Option<GamePortfolio>,
}

/// 带状态和说明的通用分区
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSection {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamePortfolio {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub game_types_found: Vec<String>,
}

/// 合格公司的详细画像
///
/// 数量类字段经常以区间或文字给出，保留原始 JSON 值。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio_size: Option<PortfolioSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_frequency: Option<ReleaseFrequency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_size: Option<CompanySize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue: Option<Revenue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_partnerships: Option<ExternalPartnerships>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding: Option<Funding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_house_creative: Option<InHouseCreative>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSize {
    #[serde(default)]
    pub total_games: Option<Value>,
    #[serde(default)]
    pub total_games_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseFrequency {
    #[serde(default)]
    pub games_last_2_years: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub recent_titles: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanySize {
    #[serde(default)]
    pub employee_count: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revenue {
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalPartnerships {
    #[serde(default)]
    pub works_with_external_studios: Option<bool>,
    #[serde(default)]
    pub eu_based_studios: Option<Value>,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Funding {
    #[serde(default)]
    pub has_external_funding: Option<bool>,
    #[serde(default)]
    pub funding_rounds: Option<Value>,
    #[serde(default)]
    pub public_company: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InHouseCreative {
    #[serde(default)]
    pub has_art_team: Option<bool>,
    #[serde(default)]
    pub has_video_production: Option<bool>,
    #[serde(default)]
    pub team_size_estimate: Option<Value>,
    #[serde(default)]
    pub evidence: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_record_deserializes() {
        let record: ResearchRecord = serde_json::from_value(json!({
            "company_name": "X",
            "research_date": "2024-01-01",
            "company_classification": {"type": "NOT_RELEVANT"},
            "qualification": {"overall_qualified": false},
            "confidence": "low"
        }))
        .unwrap();

        assert!(record.company_classification.is_not_relevant());
        assert!(!record.is_qualified());
        assert!(record.profile_data.is_none());
        assert_eq!(record.extra.get("confidence"), Some(&json!("low")));
    }

    #[test]
    fn test_profile_sections_are_typed() {
        let record: ResearchRecord = serde_json::from_value(json!({
            "company_name": "Studio",
            "research_date": "2024-05-02",
            "company_classification": {"type": "GAME_DEVELOPER", "details": "slots"},
            "qualification": {
                "overall_qualified": true,
                "game_portfolio": {"status": "PASS", "game_types_found": ["slots", "crash"]}
            },
            "profile_data": {
                "portfolio_size": {"total_games": "50-100"},
                "funding": {"has_external_funding": true, "public_company": false}
            }
        }))
        .unwrap();

        let profile = record.profile_data.unwrap();
        assert_eq!(
            profile.portfolio_size.unwrap().total_games,
            Some(json!("50-100"))
        );
        assert_eq!(profile.funding.unwrap().has_external_funding, Some(true));
        assert_eq!(
            record.qualification.game_portfolio.unwrap().game_types_found,
            vec!["slots", "crash"]
        );
    }
}
