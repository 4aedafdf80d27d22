//! 记录校验服务 - 业务能力层
//!
//! 只检查结构是否合规，返回违反的规则列表；从不返回错误，
//! 是否修复由流程层决定。

use serde_json::{Map, Value};

use crate::models::record::{ResearchRecord, NOT_RELEVANT};

/// 顶层必需字段
pub const REQUIRED_TOP_LEVEL: [&str; 4] = [
    "company_name",
    "research_date",
    "company_classification",
    "qualification",
];

/// 记录校验器
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordValidator;

impl RecordValidator {
    pub fn new() -> Self {
        Self
    }

    /// 校验结构，返回违反的规则（为空表示合规）
    pub fn validate(&self, value: &Map<String, Value>) -> Vec<String> {
        let mut violations: Vec<String> = REQUIRED_TOP_LEVEL
            .iter()
            .filter(|field| !value.contains_key(**field))
            .map(|field| format!("Missing required field: {}", field))
            .collect();

        let classification = value.get("company_classification");
        if let Some(classification) = classification {
            if classification.get("type").is_none() {
                violations.push("Missing company_classification.type".to_string());
            }
        }

        let qualification = value.get("qualification");
        if let Some(qualification) = qualification {
            if qualification.get("overall_qualified").is_none() {
                violations.push("Missing qualification.overall_qualified".to_string());
            }
        }

        let qualified = qualification
            .and_then(|q| q.get("overall_qualified"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let not_relevant = classification
            .and_then(|c| c.get("type"))
            .and_then(Value::as_str)
            == Some(NOT_RELEVANT);
        if qualified && !not_relevant && !value.contains_key("profile_data") {
            violations.push("Qualified company missing profile_data".to_string());
        }

        violations
    }

    /// 校验并转换为结构化记录
    ///
    /// 字段齐全但类型不符时，同样作为违反规则返回。
    pub fn into_record(&self, value: Map<String, Value>) -> Result<ResearchRecord, Vec<String>> {
        let violations = self.validate(&value);
        if !violations.is_empty() {
            return Err(violations);
        }
        serde_json::from_value(Value::Object(value))
            .map_err(|e| vec![format!("Invalid record structure: {}", e)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn conforming() -> Map<String, Value> {
        object(json!({
            "company_name": "X",
            "research_date": "2024-01-01",
            "company_classification": {"type": "NOT_RELEVANT"},
            "qualification": {"overall_qualified": false}
        }))
    }

    #[test]
    fn test_conforming_payload_has_no_violations() {
        let validator = RecordValidator::new();
        assert!(validator.validate(&conforming()).is_empty());
        assert!(validator.into_record(conforming()).is_ok());
    }

    #[test]
    fn test_missing_qualification_reported_once() {
        let mut value = conforming();
        value.remove("qualification");
        assert_eq!(
            RecordValidator::new().validate(&value),
            vec!["Missing required field: qualification"]
        );
    }

    #[test]
    fn test_every_missing_top_level_field_is_named() {
        let violations = RecordValidator::new().validate(&Map::new());
        for field in REQUIRED_TOP_LEVEL {
            assert!(violations.contains(&format!("Missing required field: {}", field)));
        }
    }

    #[test]
    fn test_nested_required_fields() {
        let value = object(json!({
            "company_name": "X",
            "research_date": "2024-01-01",
            "company_classification": {"details": "?"},
            "qualification": {}
        }));
        assert_eq!(
            RecordValidator::new().validate(&value),
            vec![
                "Missing company_classification.type",
                "Missing qualification.overall_qualified"
            ]
        );
    }

    #[test]
    fn test_qualified_company_needs_profile() {
        let mut value = conforming();
        value.insert(
            "company_classification".to_string(),
            json!({"type": "GAME_DEVELOPER"}),
        );
        value.insert("qualification".to_string(), json!({"overall_qualified": true}));
        assert_eq!(
            RecordValidator::new().validate(&value),
            vec!["Qualified company missing profile_data"]
        );

        value.insert("profile_data".to_string(), json!({}));
        assert!(RecordValidator::new().validate(&value).is_empty());
    }

    #[test]
    fn test_not_relevant_qualified_skips_profile() {
        let mut value = conforming();
        value.insert("qualification".to_string(), json!({"overall_qualified": true}));
        assert!(RecordValidator::new().validate(&value).is_empty());
    }

    #[test]
    fn test_type_mismatch_becomes_violation() {
        let mut value = conforming();
        value.insert(
            "qualification".to_string(),
            json!({"overall_qualified": "maybe"}),
        );
        let violations = RecordValidator::new().into_record(value).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].starts_with("Invalid record structure"));
    }
}
