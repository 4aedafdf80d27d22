//! 提示词构建

use crate::models::PipelineItem;

/// 构建单个条目的用户消息
pub fn format_item_input(item: &PipelineItem) -> String {
    let name = item.field("company_name").unwrap_or(item.key.as_str());
    let mut parts = vec![format!(
        "## Company to Analyze\n\n**Company Name:** {}",
        name
    )];

    if let Some(website) = item.field("website").and_then(normalize_website) {
        parts.push(format!("**Website:** {}", website));
    }

    if let Some(linkedin) = item.field("linkedin_url") {
        parts.push(format!("**LinkedIn:** {}", linkedin));
    }

    let additional: Vec<String> = [
        ("typeOfBusiness", "Business Type"),
        ("sector", "Sector"),
        ("regionsOfOperation", "Operating Regions"),
    ]
    .iter()
    .filter_map(|(field, label)| item.field(field).map(|v| format!("{}: {}", label, v)))
    .collect();
    if !additional.is_empty() {
        parts.push(format!("**Additional Context:** {}", additional.join("; ")));
    }

    parts.push(
        "\nConduct the analysis and return ONLY the raw JSON object. No text before or after."
            .to_string(),
    );
    parts.join("\n")
}

/// 补全协议前缀；邮件地址不是网站，直接丢弃
fn normalize_website(website: &str) -> Option<String> {
    if website.starts_with("mailto:") {
        None
    } else if website.starts_with("http://") || website.starts_with("https://") {
        Some(website.to_string())
    } else {
        Some(format!("https://{}", website))
    }
}

/// 构建修复调用的指令
pub fn build_repair_prompt(item_name: &str, violations: &[String]) -> String {
    let issues = violations
        .iter()
        .map(|v| format!("- {}", v))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Your previous response could not be parsed as valid JSON.\n\n\
         Issues found:\n{issues}\n\n\
         IMPORTANT: Return ONLY the raw JSON object for {item_name}.\n\
         - Start directly with {{ (opening brace)\n\
         - End with }} (closing brace)\n\
         - NO markdown code blocks (no ```)\n\
         - NO text before or after the JSON\n\
         - Ensure all strings are properly quoted\n\
         - No trailing commas before }} or ]\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_full_item() {
        let item = PipelineItem::new("Acme Games")
            .with_field("website", "acme.example")
            .with_field("linkedin_url", "https://linkedin.com/company/acme")
            .with_field("sector", "iGaming")
            .with_field("regionsOfOperation", "EU");

        let text = format_item_input(&item);
        assert!(text.starts_with("## Company to Analyze\n\n**Company Name:** Acme Games"));
        assert!(text.contains("**Website:** https://acme.example"));
        assert!(text.contains("**LinkedIn:** https://linkedin.com/company/acme"));
        assert!(text.contains("**Additional Context:** Sector: iGaming; Operating Regions: EU"));
        assert!(text.ends_with("No text before or after."));
    }

    #[test]
    fn test_website_normalization() {
        assert_eq!(
            normalize_website("http://a.com").as_deref(),
            Some("http://a.com")
        );
        assert_eq!(normalize_website("a.com").as_deref(), Some("https://a.com"));
        assert_eq!(normalize_website("mailto:x@a.com"), None);

        let item = PipelineItem::new("X").with_field("website", "mailto:x@a.com");
        assert!(!format_item_input(&item).contains("Website"));
    }

    #[test]
    fn test_minimal_item_has_no_context_line() {
        let text = format_item_input(&PipelineItem::new("Solo"));
        assert!(!text.contains("Additional Context"));
        assert!(!text.contains("LinkedIn"));
    }

    #[test]
    fn test_repair_prompt_lists_violations() {
        let prompt = build_repair_prompt(
            "Acme",
            &[
                "Missing required field: qualification".to_string(),
                "Missing company_classification.type".to_string(),
            ],
        );
        assert!(prompt.contains("- Missing required field: qualification\n- Missing company_classification.type"));
        assert!(prompt.contains("raw JSON object for Acme"));
        assert!(prompt.contains("Start directly with { (opening brace)"));
        assert!(prompt.contains("End with } (closing brace)"));
    }
}
