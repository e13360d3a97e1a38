//! Provider-agnostic types shared by the registry, resolver and router

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Supported chat-completion backends, in default registry order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Groq,
    Gemini,
    #[serde(rename = "openrouter")]
    OpenRouter,
}

impl ProviderKind {
    /// Every provider, in default registry order
    pub const ALL: [ProviderKind; 3] = [Self::Groq, Self::Gemini, Self::OpenRouter];

    /// Stable identifier used in configuration, `AI_PROVIDER` and JSON output
    pub fn id(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::Gemini => "gemini",
            Self::OpenRouter => "openrouter",
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Groq => "Groq",
            Self::Gemini => "Gemini",
            Self::OpenRouter => "OpenRouter",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A provider id that is not in the registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "gemini" => Ok(Self::Gemini),
            "openrouter" => Ok(Self::OpenRouter),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}

pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const DEFAULT_TOP_P: f64 = 0.95;
pub const DEFAULT_TOP_K: u32 = 40;

/// Sampling options for one provider call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderOptions {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub top_k: Option<u32>,
    /// Provider-specific model id; `None` means the provider default
    pub model: Option<String>,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            top_p: DEFAULT_TOP_P,
            top_k: Some(DEFAULT_TOP_K),
            model: None,
        }
    }
}

/// Where a provider expects its API key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPlacement {
    /// `Authorization: Bearer <key>` header
    Bearer,
    /// URL query parameter with the given name
    Query(&'static str),
}

/// Text and raw payload extracted from a provider reply
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    /// Trimmed text of the first candidate; empty when absent
    pub text: String,
    /// The full provider payload
    pub metadata: Value,
}

/// Static description of one backend: addressing, auth, request and reply shapes.
///
/// Implementations are pure data shaping; no network calls happen here.
pub trait ProviderDescriptor: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Model used when none is configured
    fn default_model(&self) -> &'static str;

    /// Chat endpoint URL for the given model
    fn endpoint(&self, model: &str) -> String;

    fn key_placement(&self) -> KeyPlacement;

    /// Extra headers required by the provider, including bearer auth when used
    fn headers(&self, api_key: &str) -> Vec<(&'static str, String)>;

    /// Provider-native JSON request body
    fn format_request(&self, system_prompt: &str, message: &str, options: &ProviderOptions)
        -> Value;

    /// Extract the answer text from a raw response body. Never fails; missing
    /// fields give empty text.
    fn parse_response(&self, raw: Value) -> ParsedReply;

    /// Effective model for these options
    fn model_for(&self, options: &ProviderOptions) -> String {
        options
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.default_model().to_string())
    }
}

// ── Reply shapes ──

/// Provider response body, tagged by wire schema
#[derive(Debug, Clone)]
pub enum ProviderReply {
    /// OpenAI-style `choices[].message.content`
    ChatCompletion(ChatCompletionReply),
    /// Gemini-style `candidates[].content.parts[].text`
    GenerateContent(GenerateContentReply),
}

impl ProviderReply {
    /// Text of the first candidate, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::ChatCompletion(reply) => reply
                .choices
                .first()
                .and_then(|c| c.message.as_ref())
                .and_then(|m| m.content.as_deref()),
            Self::GenerateContent(reply) => reply
                .candidates
                .first()
                .and_then(|c| c.content.as_ref())
                .and_then(|content| content.parts.first())
                .and_then(|p| p.text.as_deref()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionReply {
    #[serde(default)]
    pub choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionChoice {
    #[serde(default)]
    pub message: Option<ChatCompletionMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateContentReply {
    #[serde(default)]
    pub candidates: Vec<GenerateContentCandidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateContentCandidate {
    #[serde(default)]
    pub content: Option<GenerateContentBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateContentBody {
    #[serde(default)]
    pub parts: Vec<GenerateContentPart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateContentPart {
    #[serde(default)]
    pub text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_ids() {
        assert_eq!(ProviderKind::Groq.to_string(), "groq");
        assert_eq!(ProviderKind::Gemini.id(), "gemini");
        assert_eq!(ProviderKind::OpenRouter.id(), "openrouter");
        assert_eq!(ProviderKind::OpenRouter.display_name(), "OpenRouter");
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("groq".parse::<ProviderKind>(), Ok(ProviderKind::Groq));
        assert_eq!(" Gemini ".parse::<ProviderKind>(), Ok(ProviderKind::Gemini));
        assert_eq!("OPENROUTER".parse::<ProviderKind>(), Ok(ProviderKind::OpenRouter));
        let err = "anthropic".parse::<ProviderKind>().unwrap_err();
        assert_eq!(err.to_string(), "Unsupported provider: anthropic");
    }

    #[test]
    fn test_provider_kind_serde() {
        let json = serde_json::to_string(&ProviderKind::ALL).unwrap();
        assert_eq!(json, r#"["groq","gemini","openrouter"]"#);
        let kind: ProviderKind = serde_json::from_str(r#""openrouter""#).unwrap();
        assert_eq!(kind, ProviderKind::OpenRouter);
    }

    #[test]
    fn test_options_default() {
        let opts = ProviderOptions::default();
        assert_eq!(opts.temperature, 0.7);
        assert_eq!(opts.max_tokens, 500);
        assert_eq!(opts.top_p, 0.95);
        assert_eq!(opts.top_k, Some(40));
        assert!(opts.model.is_none());
    }

    #[test]
    fn test_reply_text_chat_completion() {
        let reply: ChatCompletionReply = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "Hi."}}]
        }))
        .unwrap();
        assert_eq!(ProviderReply::ChatCompletion(reply).text(), Some("Hi."));
    }

    #[test]
    fn test_reply_text_generate_content() {
        let reply: GenerateContentReply = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Hey."}]}}]
        }))
        .unwrap();
        assert_eq!(ProviderReply::GenerateContent(reply).text(), Some("Hey."));
    }

    #[test]
    fn test_reply_text_missing_fields() {
        let empty = ProviderReply::ChatCompletion(ChatCompletionReply::default());
        assert_eq!(empty.text(), None);

        let no_parts: GenerateContentReply = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"parts": []}}]
        }))
        .unwrap();
        assert_eq!(ProviderReply::GenerateContent(no_parts).text(), None);
    }
}
