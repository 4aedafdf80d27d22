//! 响应提取服务 - 业务能力层
//!
//! 只负责"从一段文本中取出 JSON 对象"，不关心字段是否合规。
//!
//! 按顺序尝试：
//! 1. Markdown 代码块（可带语言标记）中的内容
//! 2. 第一个 `{` 到最后一个 `}` 之间的内容
//!
//! 每个候选依次：直接解析 → 清理后解析（去掉尾逗号和注释）→
//! 从第一个 `{` 按括号深度截取配平的对象再清理解析。

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::PipelineError;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:[A-Za-z0-9_+-]+)?[ \t]*\r?\n([\s\S]*?)\r?\n[ \t]*```")
        .expect("fenced block pattern is valid")
});

/// 候选文本来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    FencedBlock,
    BraceSpan,
}

/// 成功解析时使用的步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMethod {
    Direct,
    Cleaned,
    Balanced,
}

/// 提取结果
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub value: Map<String, Value>,
    pub source: CandidateSource,
    pub method: ParseMethod,
}

/// 响应提取器
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseExtractor;

impl ResponseExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 从响应文本中提取 JSON 对象
    pub fn extract(&self, text: &str) -> Result<Extraction, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::ExtractionFailed);
        }

        if let Some(fenced) = fenced_block(text) {
            if let Some((value, method)) = parse_candidate(fenced) {
                return Ok(self.found(value, CandidateSource::FencedBlock, method));
            }
            debug!("代码块内容无法解析，改用括号范围");
        }

        if let Some(span) = brace_span(text) {
            if let Some((value, method)) = parse_candidate(span) {
                return Ok(self.found(value, CandidateSource::BraceSpan, method));
            }
        }

        Err(PipelineError::ExtractionFailed)
    }

    fn found(
        &self,
        value: Map<String, Value>,
        source: CandidateSource,
        method: ParseMethod,
    ) -> Extraction {
        debug!("JSON 提取成功: {:?} / {:?}", source, method);
        Extraction {
            value,
            source,
            method,
        }
    }
}

fn fenced_block(text: &str) -> Option<&str> {
    FENCED_BLOCK
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

fn brace_span(text: &str) -> Option<&str> {
    let first = text.find('{')?;
    let last = text.rfind('}')?;
    (last > first).then(|| &text[first..=last])
}

fn parse_candidate(candidate: &str) -> Option<(Map<String, Value>, ParseMethod)> {
    if let Some(value) = parse_object(candidate) {
        return Some((value, ParseMethod::Direct));
    }
    if let Some(value) = parse_object(&clean_json(candidate)) {
        return Some((value, ParseMethod::Cleaned));
    }
    balanced_object(candidate)
        .and_then(|balanced| parse_object(&clean_json(balanced)))
        .map(|value| (value, ParseMethod::Balanced))
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// 清理常见的非标准 JSON：注释和尾逗号
///
/// 字符串字面量内部的内容保持不变。
pub fn clean_json(text: &str) -> String {
    strip_trailing_commas(&strip_comments(text))
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        let next = chars.peek().copied();
        match (c, next) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                // 保留换行
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(&escaped) = chars.get(i + 1) {
                    out.push(escaped);
                    i += 1;
                }
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
            out.push(c);
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
            if !matches!(next, Some('}') | Some(']')) {
                out.push(c);
            }
        } else {
            out.push(c);
        }
        i += 1;
    }
    out
}

/// 从第一个 `{` 开始截取括号配平的对象
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn extract(text: &str) -> Result<Extraction, PipelineError> {
        ResponseExtractor::new().extract(text)
    }

    #[test]
    fn test_fenced_block_with_language_tag() {
        let text = "Here is the result:\n```json\n{\"a\": 1}\n```\nThanks.";
        let extraction = extract(text).unwrap();
        assert_eq!(extraction.source, CandidateSource::FencedBlock);
        assert_eq!(extraction.method, ParseMethod::Direct);
        assert_eq!(extraction.value.get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_fenced_block_without_language_tag() {
        let text = "```\n{\"a\": [1, 2]}\n```";
        assert_eq!(extract(text).unwrap().value.get("a"), Some(&json!([1, 2])));
    }

    #[test]
    fn test_brace_span_inside_prose() {
        let text = "prefix {\"company_name\":\"X\",\"nested\":{\"k\":true}} suffix";
        let extraction = extract(text).unwrap();
        assert_eq!(extraction.source, CandidateSource::BraceSpan);
        assert_eq!(extraction.value.get("company_name"), Some(&json!("X")));
    }

    #[test]
    fn test_cleanup_trailing_commas_and_comments() {
        let text = r#"{
            // research summary
            "website": "https://example.com/a//b",
            "tags": ["x", "y",],
            /* block
               comment */
            "count": 3, // inline
        }"#;
        let extraction = extract(text).unwrap();
        assert_eq!(extraction.method, ParseMethod::Cleaned);
        assert_eq!(
            extraction.value.get("website"),
            Some(&json!("https://example.com/a//b"))
        );
        assert_eq!(extraction.value.get("tags"), Some(&json!(["x", "y"])));
        assert_eq!(extraction.value.get("count"), Some(&json!(3)));
    }

    #[test]
    fn test_balanced_scan_drops_trailing_object() {
        // 第一个到最后一个大括号之间有两个对象，只有配平截取能解析
        let text = r#"Result: {"a": {"b": 1},} and also {"c": 2}"#;
        let extraction = extract(text).unwrap();
        assert_eq!(extraction.method, ParseMethod::Balanced);
        assert_eq!(extraction.value.get("a"), Some(&json!({"b": 1})));
        assert!(extraction.value.get("c").is_none());
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_scan() {
        let text = r#"{"note": "use } carefully", "n": 1} trailing {"#;
        assert_eq!(
            balanced_object(text),
            Some(r#"{"note": "use } carefully", "n": 1}"#)
        );
    }

    #[test]
    fn test_unparseable_fence_falls_back_to_braces() {
        let text = "```\nnot json at all\n```\n{\"ok\": true}";
        let extraction = extract(text).unwrap();
        assert_eq!(extraction.source, CandidateSource::BraceSpan);
    }

    #[test]
    fn test_failures() {
        assert!(matches!(extract(""), Err(PipelineError::ExtractionFailed)));
        assert!(matches!(
            extract("I could not find anything."),
            Err(PipelineError::ExtractionFailed)
        ));
        assert!(matches!(
            extract("{ this is not json }"),
            Err(PipelineError::ExtractionFailed)
        ));
        // 数组不是结构化记录
        assert!(extract("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_clean_json_preserves_escaped_quotes() {
        let cleaned = clean_json(r#"{"q": "say \"hi\", // not a comment",}"#);
        assert_eq!(cleaned, r#"{"q": "say \"hi\", // not a comment"}"#);
    }

    fn payload_strategy() -> impl Strategy<Value = Map<String, Value>> {
        let leaf = prop_oneof![
            any::<i32>().prop_map(|n| json!(n)),
            any::<bool>().prop_map(|b| json!(b)),
            "[a-zA-Z0-9 /:.,{}\\[\\]-]{0,20}".prop_map(|s| json!(s)),
        ];
        prop::collection::btree_map("[a-z_]{1,12}", leaf, 1..8)
            .prop_map(|entries| entries.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_recovers_wrapped_payload(
            payload in payload_strategy(),
            prefix in "[a-zA-Z .:]{0,30}",
            suffix in "[a-zA-Z .:]{0,30}",
            wrapping in 0u8..3,
            trailing_comma in any::<bool>(),
        ) {
            let mut body = serde_json::to_string_pretty(&Value::Object(payload.clone())).unwrap();
            if trailing_comma {
                let close = body.rfind('}').unwrap();
                body.insert_str(close, ",  // end\n");
            }
            let text = match wrapping {
                0 => format!("{prefix}\n```json\n{body}\n```\n{suffix}"),
                1 => body.clone(),
                _ => format!("{prefix} {body} {suffix}"),
            };

            let extraction = ResponseExtractor::new().extract(&text).unwrap();
            prop_assert_eq!(extraction.value, payload);
        }
    }
}
