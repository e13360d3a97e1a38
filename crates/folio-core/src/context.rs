//! System prompt assembly

use serde_json::Value;
use tracing::debug;

/// Token in the `SYSTEM_PROMPT` template that receives the profile JSON
pub const PROFILE_PLACEHOLDER: &str = "{{PERSONAL_DATA}}";

/// Merge profile data into the prompt template.
///
/// Only the first placeholder is replaced. A template without the placeholder
/// is used as-is.
pub fn build_system_prompt(template: &str, profile: &Value) -> String {
    if !template.contains(PROFILE_PLACEHOLDER) {
        debug!("System prompt template has no {} placeholder", PROFILE_PLACEHOLDER);
        return template.to_string();
    }
    let profile_json =
        serde_json::to_string_pretty(profile).unwrap_or_else(|_| profile.to_string());
    let prompt = template.replacen(PROFILE_PLACEHOLDER, &profile_json, 1);
    debug!("Built system prompt ({} chars)", prompt.len());
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_system_prompt_substitutes_profile() {
        let profile = json!({"basic": {"name": "Ada"}});
        let prompt = build_system_prompt("Answer using:\n{{PERSONAL_DATA}}\nBe brief.", &profile);
        assert!(prompt.starts_with("Answer using:\n{"));
        assert!(prompt.contains("\"name\": \"Ada\""));
        assert!(prompt.ends_with("}\nBe brief."));
        assert!(!prompt.contains(PROFILE_PLACEHOLDER));
    }

    #[test]
    fn test_build_system_prompt_two_space_indent() {
        let prompt = build_system_prompt("{{PERSONAL_DATA}}", &json!({"a": 1}));
        assert_eq!(prompt, "{\n  \"a\": 1\n}");
    }

    #[test]
    fn test_build_system_prompt_first_occurrence_only() {
        let prompt = build_system_prompt("{{PERSONAL_DATA}} and {{PERSONAL_DATA}}", &json!({}));
        assert_eq!(prompt, "{} and {{PERSONAL_DATA}}");
    }

    #[test]
    fn test_build_system_prompt_without_placeholder() {
        let prompt = build_system_prompt("You are a portfolio assistant.", &json!({"a": 1}));
        assert_eq!(prompt, "You are a portfolio assistant.");
    }
}
