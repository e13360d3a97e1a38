//! OpenAI-compatible chat-completions descriptor, shared by Groq and OpenRouter
//!
//! Both speak the same wire format and differ only in endpoint, default model
//! and attribution headers.

use serde::Serialize;
use serde_json::Value;

use super::types::{
    ChatCompletionReply, KeyPlacement, ParsedReply, ProviderDescriptor, ProviderKind,
    ProviderOptions, ProviderReply,
};

/// Descriptor for an OpenAI-compatible endpoint
#[derive(Debug)]
pub struct OpenAiCompatProvider {
    kind: ProviderKind,
    endpoint: &'static str,
    default_model: &'static str,
    extra_headers: &'static [(&'static str, &'static str)],
}

impl OpenAiCompatProvider {
    pub const fn new(
        kind: ProviderKind,
        endpoint: &'static str,
        default_model: &'static str,
        extra_headers: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self {
            kind,
            endpoint,
            default_model,
            extra_headers,
        }
    }
}

pub static GROQ: OpenAiCompatProvider = OpenAiCompatProvider::new(
    ProviderKind::Groq,
    "https://api.groq.com/openai/v1/chat/completions",
    "llama-3.3-70b-versatile",
    &[],
);

pub static OPENROUTER: OpenAiCompatProvider = OpenAiCompatProvider::new(
    ProviderKind::OpenRouter,
    "https://openrouter.ai/api/v1/chat/completions",
    "meta-llama/llama-3.3-70b-instruct:free",
    &[
        ("HTTP-Referer", "https://portfolio.com"),
        ("X-Title", "Portfolio AI"),
    ],
);

impl ProviderDescriptor for OpenAiCompatProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn default_model(&self) -> &'static str {
        self.default_model
    }

    fn endpoint(&self, _model: &str) -> String {
        self.endpoint.to_string()
    }

    fn key_placement(&self) -> KeyPlacement {
        KeyPlacement::Bearer
    }

    fn headers(&self, api_key: &str) -> Vec<(&'static str, String)> {
        let mut headers = vec![("Authorization", format!("Bearer {}", api_key))];
        headers.extend(
            self.extra_headers
                .iter()
                .map(|(name, value)| (*name, value.to_string())),
        );
        headers
    }

    fn format_request(&self, system_prompt: &str, message: &str, options: &ProviderOptions) -> Value {
        let request = ChatCompletionRequest {
            model: self.model_for(options),
            messages: vec![
                OpenAiMessage {
                    role: "system",
                    content: system_prompt,
                },
                OpenAiMessage {
                    role: "user",
                    content: message,
                },
            ],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            top_p: options.top_p,
        };
        serde_json::to_value(&request).unwrap_or(Value::Null)
    }

    fn parse_response(&self, raw: Value) -> ParsedReply {
        let reply: ChatCompletionReply =
            serde_json::from_value(raw.clone()).unwrap_or_default();
        let text = ProviderReply::ChatCompletion(reply)
            .text()
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        ParsedReply { text, metadata: raw }
    }
}

// ── OpenAI wire types ──

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: String,
    messages: Vec<OpenAiMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    top_p: f64,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}
