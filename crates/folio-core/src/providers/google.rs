//! Google Gemini `generateContent` descriptor

use serde::Serialize;
use serde_json::Value;

use super::types::{
    GenerateContentReply, KeyPlacement, ParsedReply, ProviderDescriptor, ProviderKind,
    ProviderOptions, ProviderReply,
};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Google Gemini descriptor. The API key travels as the `key` query parameter.
#[derive(Debug)]
pub struct GoogleProvider;

pub static GEMINI: GoogleProvider = GoogleProvider;

impl ProviderDescriptor for GoogleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn default_model(&self) -> &'static str {
        "gemini-1.5-flash"
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/{}:generateContent", GEMINI_BASE_URL, model)
    }

    fn key_placement(&self) -> KeyPlacement {
        KeyPlacement::Query("key")
    }

    fn headers(&self, _api_key: &str) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    fn format_request(&self, system_prompt: &str, message: &str, options: &ProviderOptions) -> Value {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![
                    GeminiPart {
                        text: system_prompt,
                    },
                    GeminiPart { text: message },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_tokens,
                top_p: options.top_p,
                top_k: options.top_k,
            },
        };
        serde_json::to_value(&request).unwrap_or(Value::Null)
    }

    fn parse_response(&self, raw: Value) -> ParsedReply {
        let reply: GenerateContentReply =
            serde_json::from_value(raw.clone()).unwrap_or_default();
        let text = ProviderReply::GenerateContent(reply)
            .text()
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        ParsedReply { text, metadata: raw }
    }
}

// ── Gemini wire types ──

#[derive(Debug, Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
    top_p: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}
