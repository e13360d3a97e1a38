//! JSON shapes of the chat endpoint

use std::collections::BTreeMap;

use folio_core::{ChatAnswer, DispatchError, ProviderKind, contains_redirect_marker};
use serde::Serialize;
use serde_json::{Map, Value};

// ── Error messages ──

pub const ERR_NO_MESSAGES: &str = "No messages provided.";
pub const ERR_EMPTY_LAST_MESSAGE: &str = "Last message content is empty.";
pub const ERR_ALL_PROVIDERS_FAILED: &str = "All AI providers failed to process the request.";
pub const ERR_UNEXPECTED: &str = "An unexpected error occurred.";

/// One conversation turn as sent by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Free-form; only the content of the last message is used
    pub role: String,
    pub content: String,
}

/// Client → gateway chat request
///
/// Parsed leniently: a non-array `messages` counts as absent and entries
/// without a string `role` or `content` get empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatRequest {
    pub messages: Vec<IncomingMessage>,
    /// Appended as a final user turn when non-empty
    pub message: Option<String>,
}

impl ChatRequest {
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(body)?;
        Ok(Self::from_value(&value))
    }

    pub fn from_value(value: &Value) -> Self {
        let field_str = |v: &Value, name: &str| {
            v.get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let messages = value
            .get("messages")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| IncomingMessage {
                        role: field_str(item, "role"),
                        content: field_str(item, "content"),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let message = value
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        Self { messages, message }
    }

    /// All turns, with `message` appended as the final user turn
    pub fn into_messages(self) -> Vec<IncomingMessage> {
        let mut messages = self.messages;
        if let Some(content) = self.message {
            messages.push(IncomingMessage {
                role: "user".to_string(),
                content,
            });
        }
        messages
    }
}

/// Gateway → client success body
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub message: ReplyMessage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyMessage {
    /// Milliseconds since the epoch
    pub id: i64,
    pub role: &'static str,
    pub content: String,
    pub should_redirect_to_contact: bool,
    pub provider: ProviderKind,
    pub metadata: Value,
}

impl ChatReply {
    pub fn from_answer(answer: ChatAnswer, id: i64) -> Self {
        let ChatAnswer {
            response,
            used_fallback,
            original_provider,
            attempted,
        } = answer;

        let mut metadata = match response.metadata {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("raw".to_string(), other);
                map
            }
        };
        metadata.insert("usedFallback".to_string(), Value::Bool(used_fallback));
        metadata.insert(
            "originalProvider".to_string(),
            Value::String(original_provider.id().to_string()),
        );
        metadata.insert(
            "attemptedProviders".to_string(),
            Value::Array(
                attempted
                    .iter()
                    .map(|k| Value::String(k.id().to_string()))
                    .collect(),
            ),
        );

        Self {
            message: ReplyMessage {
                id,
                role: "ai",
                should_redirect_to_contact: contains_redirect_marker(&response.content),
                content: response.content,
                provider: response.provider,
                metadata: Value::Object(metadata),
            },
        }
    }
}

/// Gateway → client error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub providers_attempted: Option<Vec<ProviderKind>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_errors: Option<BTreeMap<String, String>>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            providers_attempted: None,
            config_errors: None,
        }
    }

    pub fn unexpected(details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            ..Self::new(ERR_UNEXPECTED)
        }
    }

    pub fn with_config_errors(mut self, errors: BTreeMap<String, String>) -> Self {
        self.config_errors = Some(errors);
        self
    }

    pub fn all_failed(err: &DispatchError) -> Self {
        let DispatchError::AllFailed {
            attempted,
            config_errors,
            ..
        } = err;
        Self {
            error: ERR_ALL_PROVIDERS_FAILED.to_string(),
            details: Some(err.details()),
            providers_attempted: Some(attempted.clone()),
            config_errors: Some(config_errors.clone()),
        }
    }
}
