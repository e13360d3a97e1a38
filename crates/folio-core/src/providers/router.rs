//! Failover router: tries configured providers one at a time until one answers

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigResolution, ProviderConfig};
use crate::normalize::{contains_redirect_marker, ensure_complete_response, is_default_error};

use super::OrderError;
use super::transport::{ProviderRequest, ProviderTransport, TransportError};
use super::types::{KeyPlacement, ProviderKind};

/// An accepted answer from one provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    /// Normalized answer text
    pub content: String,
    /// Raw provider payload
    pub metadata: Value,
    pub provider: ProviderKind,
}

/// Accepted answer plus failover bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct ChatAnswer {
    pub response: ProviderResponse,
    /// Whether a provider other than the preferred one answered
    pub used_fallback: bool,
    pub original_provider: ProviderKind,
    /// Providers called, in call order
    pub attempted: Vec<ProviderKind>,
}

/// Why a single provider attempt failed
#[derive(Debug, thiserror::Error)]
pub enum ProviderErrorKind {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("returned an empty or default error response")]
    EmptyResponse,
    #[error("returned an unusable response")]
    Unusable,
}

/// A failed attempt against one provider
#[derive(Debug, thiserror::Error)]
#[error("{provider} failed: {kind}")]
pub struct ProviderError {
    pub provider: ProviderKind,
    #[source]
    pub kind: ProviderErrorKind,
}

impl ProviderError {
    fn new(provider: ProviderKind, kind: impl Into<ProviderErrorKind>) -> Self {
        Self {
            provider,
            kind: kind.into(),
        }
    }
}

/// Every configured provider failed
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("All AI providers failed to process the request.")]
    AllFailed {
        last_error: Option<ProviderError>,
        attempted: Vec<ProviderKind>,
        config_errors: BTreeMap<String, String>,
    },
}

impl DispatchError {
    /// Message of the last provider failure
    pub fn details(&self) -> String {
        match self {
            Self::AllFailed { last_error, .. } => last_error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "no provider was attempted".to_string()),
        }
    }
}

/// Routes a chat message across providers with sequential failover.
///
/// Each provider gets exactly one attempt per request. There is no backoff
/// and no concurrent fan-out.
pub struct FailoverRouter {
    transport: Arc<dyn ProviderTransport>,
    /// Registry order; the preferred provider is moved to the front per request
    order: Vec<ProviderKind>,
    /// Accept replies carrying the no-knowledge marker instead of failing over
    redirect_passthrough: bool,
    endpoints: HashMap<ProviderKind, String>,
}

impl fmt::Debug for FailoverRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailoverRouter")
            .field("order", &self.order)
            .field("redirect_passthrough", &self.redirect_passthrough)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

impl FailoverRouter {
    /// Create a router over `order`, which must be non-empty and free of duplicates
    pub fn new(
        transport: Arc<dyn ProviderTransport>,
        order: Vec<ProviderKind>,
    ) -> Result<Self, OrderError> {
        if order.is_empty() {
            return Err(OrderError::Empty);
        }
        for (idx, kind) in order.iter().enumerate() {
            if order[..idx].contains(kind) {
                return Err(OrderError::Duplicate(*kind));
            }
        }
        Ok(Self {
            transport,
            order,
            redirect_passthrough: false,
            endpoints: HashMap::new(),
        })
    }

    /// Accept "not available in our knowledge" replies as answers
    pub fn with_redirect_passthrough(mut self, enabled: bool) -> Self {
        self.redirect_passthrough = enabled;
        self
    }

    /// Send a provider's requests to `url` instead of its public endpoint
    pub fn with_endpoint(mut self, kind: ProviderKind, url: impl Into<String>) -> Self {
        self.endpoints.insert(kind, url.into());
        self
    }

    /// Registry order
    pub fn order(&self) -> &[ProviderKind] {
        &self.order
    }

    pub fn redirect_passthrough(&self) -> bool {
        self.redirect_passthrough
    }

    /// Providers to try for this resolution: preferred first, then the rest in
    /// registry order, configured ones only, each at most once.
    pub fn attempt_order(&self, resolution: &ConfigResolution) -> Vec<ProviderKind> {
        let mut attempt = Vec::with_capacity(self.order.len());
        let candidates =
            std::iter::once(resolution.preferred).chain(self.order.iter().copied());
        for kind in candidates {
            if resolution.get(kind).is_some() && !attempt.contains(&kind) {
                attempt.push(kind);
            }
        }
        attempt
    }

    /// Build the outbound request for one provider
    pub fn build_request(&self, config: &ProviderConfig, message: &str) -> ProviderRequest {
        let descriptor = config.descriptor;
        let kind = descriptor.kind();
        let url = self
            .endpoints
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| descriptor.endpoint(&config.model()));
        let query = match descriptor.key_placement() {
            KeyPlacement::Query(name) => vec![(name, config.api_key.clone())],
            KeyPlacement::Bearer => Vec::new(),
        };

        ProviderRequest {
            provider: kind,
            url,
            query,
            headers: descriptor.headers(&config.api_key),
            body: descriptor.format_request(&config.system_prompt, message, &config.options),
        }
    }

    /// Try providers in attempt order until one yields an accepted answer
    pub async fn dispatch(
        &self,
        resolution: &ConfigResolution,
        message: &str,
    ) -> Result<ChatAnswer, DispatchError> {
        let order = self.attempt_order(resolution);
        let preferred = resolution.preferred;
        info!(
            "Fallback order: [{}]",
            order.iter().map(|k| k.id()).collect::<Vec<_>>().join(", ")
        );

        let mut attempted = Vec::with_capacity(order.len());
        let mut last_error = None;

        for (idx, &kind) in order.iter().enumerate() {
            let Some(config) = resolution.get(kind) else {
                debug!("Skipping {}: no valid config", kind);
                continue;
            };

            info!("Trying provider: {} ({})", kind, config.model());
            attempted.push(kind);

            match self.attempt(config, message).await {
                Ok(response) => {
                    let used_fallback = kind != preferred;
                    if used_fallback {
                        info!(
                            "Request succeeded on fallback provider {} (preferred: {})",
                            kind, preferred
                        );
                    } else {
                        info!("Successfully got response from {}", kind);
                    }
                    return Ok(ChatAnswer {
                        response,
                        used_fallback,
                        original_provider: preferred,
                        attempted,
                    });
                }
                Err(e) => {
                    warn!("Provider {} failed: {}", kind, e);
                    last_error = Some(e);
                    if let Some(next) = order.get(idx + 1) {
                        info!("Failing over from {} to {}", kind, next);
                    }
                }
            }
        }

        error!(
            "All providers failed (attempted: {})",
            attempted.iter().map(|k| k.id()).collect::<Vec<_>>().join(", ")
        );
        Err(DispatchError::AllFailed {
            last_error,
            attempted,
            config_errors: resolution.errors.clone(),
        })
    }

    async fn attempt(
        &self,
        config: &ProviderConfig,
        message: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        let kind = config.kind();
        let request = self.build_request(config, message);
        debug!("Attempting to call {} API at: {}", kind, request.url);

        let raw = self
            .transport
            .send(&request)
            .await
            .map_err(|e| ProviderError::new(kind, e))?;

        let parsed = config.descriptor.parse_response(raw);
        let content = ensure_complete_response(&parsed.text);

        if content.is_empty() || is_default_error(&content) {
            return Err(ProviderError::new(kind, ProviderErrorKind::EmptyResponse));
        }
        if !self.redirect_passthrough && contains_redirect_marker(&content) {
            debug!("{} returned the no-knowledge marker", kind);
            return Err(ProviderError::new(kind, ProviderErrorKind::Unusable));
        }

        Ok(ProviderResponse {
            content,
            metadata: parsed.metadata,
            provider: kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    use crate::config::{EnvSnapshot, resolve};
    use crate::normalize::{DEFAULT_ERROR_MESSAGE, NO_KNOWLEDGE_MARKER};
    use crate::profile::Profile;

    /// Scripted outcome for one provider
    #[derive(Clone)]
    enum Outcome {
        Text(&'static str),
        Raw(Value),
        Status(u16, &'static str),
        Network,
    }

    /// Mock transport answering per provider and logging every call
    struct ScriptedTransport {
        outcomes: HashMap<ProviderKind, Outcome>,
        calls: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedTransport {
        fn new(outcomes: &[(ProviderKind, Outcome)]) -> Arc<Self> {
            Arc::new(Self {
                outcomes: outcomes.iter().cloned().collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn called(&self) -> Vec<ProviderKind> {
            self.calls.lock().unwrap().iter().map(|r| r.provider).collect()
        }
    }

    fn reply_body(kind: ProviderKind, text: &str) -> Value {
        match kind {
            ProviderKind::Gemini => json!({"candidates": [{"content": {"parts": [{"text": text}]}}]}),
            _ => json!({"choices": [{"message": {"role": "assistant", "content": text}}]}),
        }
    }

    #[async_trait]
    impl ProviderTransport for ScriptedTransport {
        async fn send(&self, request: &ProviderRequest) -> Result<Value, TransportError> {
            self.calls.lock().unwrap().push(request.clone());
            match self.outcomes.get(&request.provider).cloned() {
                Some(Outcome::Text(text)) => Ok(reply_body(request.provider, text)),
                Some(Outcome::Raw(value)) => Ok(value),
                Some(Outcome::Status(status, message)) => Err(TransportError::Status {
                    status,
                    message: message.to_string(),
                }),
                Some(Outcome::Network) | None => {
                    Err(TransportError::Network("connection refused".to_string()))
                }
            }
        }
    }

    fn all_keys(extra: &[(&'static str, &'static str)]) -> EnvSnapshot {
        let mut pairs = vec![
            ("SYSTEM_PROMPT", "You answer questions about {{PERSONAL_DATA}}"),
            ("GROQ_API_KEY", "gsk_test"),
            ("GEMINI_API_KEY", "AIza-test"),
            ("OPENROUTER_API_KEY", "sk-or-test"),
        ];
        pairs.extend_from_slice(extra);
        EnvSnapshot::from_pairs(pairs)
    }

    fn resolution(env: &EnvSnapshot) -> ConfigResolution {
        let profile = Profile::from_value(json!({"basic": {"name": "Ada"}})).unwrap();
        resolve(env, Some(&profile), &ProviderKind::ALL).unwrap()
    }

    fn router(transport: Arc<ScriptedTransport>) -> FailoverRouter {
        FailoverRouter::new(transport, ProviderKind::ALL.to_vec()).unwrap()
    }

    #[test]
    fn test_empty_order_rejected() {
        let transport = ScriptedTransport::new(&[]);
        assert!(matches!(FailoverRouter::new(transport, vec![]), Err(OrderError::Empty)));
    }

    #[test]
    fn test_duplicate_order_rejected() {
        let transport = ScriptedTransport::new(&[]);
        let result =
            FailoverRouter::new(transport, vec![ProviderKind::Groq, ProviderKind::Groq]);
        assert!(matches!(result, Err(OrderError::Duplicate(ProviderKind::Groq))));
    }

    #[test]
    fn test_attempt_order_preferred_first() {
        let router = router(ScriptedTransport::new(&[]));
        let res = resolution(&all_keys(&[("AI_PROVIDER", "openrouter")]));
        assert_eq!(
            router.attempt_order(&res),
            vec![ProviderKind::OpenRouter, ProviderKind::Groq, ProviderKind::Gemini]
        );
    }

    #[test]
    fn test_attempt_order_skips_unconfigured() {
        let router = router(ScriptedTransport::new(&[]));
        let env = EnvSnapshot::from_pairs([
            ("SYSTEM_PROMPT", "p"),
            ("OPENROUTER_API_KEY", "sk-or-test"),
            ("GEMINI_API_KEY", "AIza-test"),
            ("AI_PROVIDER", "groq"),
        ]);
        assert_eq!(
            router.attempt_order(&resolution(&env)),
            vec![ProviderKind::Gemini, ProviderKind::OpenRouter]
        );
    }

    #[test]
    fn test_build_request_bearer_provider() {
        let router = router(ScriptedTransport::new(&[]));
        let res = resolution(&all_keys(&[]));
        let request = router.build_request(res.get(ProviderKind::Groq).unwrap(), "Hello");
        assert_eq!(request.url, "https://api.groq.com/openai/v1/chat/completions");
        assert!(request.query.is_empty());
        assert!(request.headers.contains(&("Authorization", "Bearer gsk_test".to_string())));
        assert_eq!(request.body["messages"][1]["content"], "Hello");
        assert!(
            request.body["messages"][0]["content"]
                .as_str()
                .unwrap()
                .contains("\"name\": \"Ada\"")
        );
    }

    #[test]
    fn test_build_request_gemini_key_in_query() {
        let router = router(ScriptedTransport::new(&[]));
        let res = resolution(&all_keys(&[("GEMINI_MODEL", "gemini-2.0-flash")]));
        let request = router.build_request(res.get(ProviderKind::Gemini).unwrap(), "Hi");
        assert_eq!(
            request.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert_eq!(request.query, vec![("key", "AIza-test".to_string())]);
        assert!(request.headers.iter().all(|(k, _)| *k != "Authorization"));
        assert_eq!(request.body["contents"][0]["parts"][1]["text"], "Hi");
    }

    #[test]
    fn test_build_request_endpoint_override() {
        let router = router(ScriptedTransport::new(&[]))
            .with_endpoint(ProviderKind::OpenRouter, "http://127.0.0.1:9999/v1/chat");
        let res = resolution(&all_keys(&[]));
        let request = router.build_request(res.get(ProviderKind::OpenRouter).unwrap(), "Hi");
        assert_eq!(request.url, "http://127.0.0.1:9999/v1/chat");
    }

    #[tokio::test]
    async fn test_preferred_provider_success() {
        let transport = ScriptedTransport::new(&[(ProviderKind::Groq, Outcome::Text("Ada writes Rust. And she"))]);
        let router = router(transport.clone());
        let answer = router.dispatch(&resolution(&all_keys(&[])), "Who is Ada?").await.unwrap();

        assert_eq!(answer.response.content, "Ada writes Rust.");
        assert_eq!(answer.response.provider, ProviderKind::Groq);
        assert!(!answer.used_fallback);
        assert_eq!(answer.original_provider, ProviderKind::Groq);
        assert_eq!(answer.attempted, vec![ProviderKind::Groq]);
        assert_eq!(transport.called(), vec![ProviderKind::Groq]);
        assert!(answer.response.metadata.get("choices").is_some());
    }

    #[tokio::test]
    async fn test_third_provider_answers_after_two_failures() {
        let transport = ScriptedTransport::new(&[
            (ProviderKind::Groq, Outcome::Network),
            (ProviderKind::Gemini, Outcome::Text("")),
            (ProviderKind::OpenRouter, Outcome::Text("She is a developer")),
        ]);
        let router = router(transport.clone());
        let answer = router.dispatch(&resolution(&all_keys(&[])), "Who?").await.unwrap();

        assert_eq!(answer.response.content, "She is a developer.");
        assert_eq!(answer.response.provider, ProviderKind::OpenRouter);
        assert!(answer.used_fallback);
        assert_eq!(answer.original_provider, ProviderKind::Groq);
        assert_eq!(
            answer.attempted,
            vec![ProviderKind::Groq, ProviderKind::Gemini, ProviderKind::OpenRouter]
        );
        // Each provider called exactly once
        assert_eq!(transport.called(), answer.attempted);
    }

    #[tokio::test]
    async fn test_stops_at_first_success() {
        let transport = ScriptedTransport::new(&[
            (ProviderKind::Groq, Outcome::Status(429, "Rate limit reached")),
            (ProviderKind::Gemini, Outcome::Text("Answer from Gemini.")),
            (ProviderKind::OpenRouter, Outcome::Text("Never used.")),
        ]);
        let router = router(transport.clone());
        let answer = router.dispatch(&resolution(&all_keys(&[])), "Hi").await.unwrap();
        assert_eq!(answer.response.provider, ProviderKind::Gemini);
        assert_eq!(transport.called(), vec![ProviderKind::Groq, ProviderKind::Gemini]);
    }

    #[tokio::test]
    async fn test_sentinel_reply_triggers_failover() {
        let transport = ScriptedTransport::new(&[
            (ProviderKind::Groq, Outcome::Text(DEFAULT_ERROR_MESSAGE)),
            (ProviderKind::Gemini, Outcome::Raw(json!({"promptFeedback": {"blockReason": "SAFETY"}}))),
            (ProviderKind::OpenRouter, Outcome::Text("Fine.")),
        ]);
        let router = router(transport.clone());
        let answer = router.dispatch(&resolution(&all_keys(&[])), "Hi").await.unwrap();
        assert_eq!(answer.response.provider, ProviderKind::OpenRouter);
        assert_eq!(answer.attempted.len(), 3);
    }

    #[tokio::test]
    async fn test_redirect_marker_rejected_by_default() {
        let marker: &'static str = "Sorry this is not available in our knowledge base.";
        assert!(marker.contains(NO_KNOWLEDGE_MARKER));
        let transport = ScriptedTransport::new(&[
            (ProviderKind::Groq, Outcome::Text(marker)),
            (ProviderKind::Gemini, Outcome::Text("A real answer.")),
        ]);
        let router = router(transport.clone());
        let answer = router.dispatch(&resolution(&all_keys(&[])), "Salary?").await.unwrap();
        assert_eq!(answer.response.provider, ProviderKind::Gemini);
        assert_eq!(answer.response.content, "A real answer.");
    }

    #[tokio::test]
    async fn test_redirect_marker_accepted_with_passthrough() {
        let marker: &'static str = "Sorry this is not available in our knowledge base.";
        let transport = ScriptedTransport::new(&[(ProviderKind::Groq, Outcome::Text(marker))]);
        let router = router(transport.clone()).with_redirect_passthrough(true);
        let answer = router.dispatch(&resolution(&all_keys(&[])), "Salary?").await.unwrap();
        assert_eq!(answer.response.provider, ProviderKind::Groq);
        assert!(contains_redirect_marker(&answer.response.content));
        assert_eq!(transport.called(), vec![ProviderKind::Groq]);
    }

    #[tokio::test]
    async fn test_all_providers_fail() {
        let transport = ScriptedTransport::new(&[
            (ProviderKind::Groq, Outcome::Network),
            (ProviderKind::Gemini, Outcome::Status(500, "Internal error")),
            (ProviderKind::OpenRouter, Outcome::Status(401, "No auth credentials found")),
        ]);
        let env = EnvSnapshot::from_pairs([
            ("SYSTEM_PROMPT", "p"),
            ("GROQ_API_KEY", "gsk_test"),
            ("GEMINI_API_KEY", "AIza-test"),
            ("OPENROUTER_API_KEY", "sk-or-test"),
            ("AI_PROVIDER", "mistral"),
        ]);
        let router = router(transport.clone());
        let err = router.dispatch(&resolution(&env), "Hi").await.unwrap_err();

        assert_eq!(err.to_string(), "All AI providers failed to process the request.");
        assert_eq!(
            err.details(),
            "openrouter failed: API request failed with status 401: No auth credentials found"
        );
        let DispatchError::AllFailed { attempted, config_errors, last_error } = err;
        assert_eq!(attempted, ProviderKind::ALL.to_vec());
        assert_eq!(config_errors["mistral"], "Unsupported provider: mistral");
        assert!(matches!(
            last_error.map(|e| e.kind),
            Some(ProviderErrorKind::Transport(TransportError::Status { status: 401, .. }))
        ));
    }

    #[tokio::test]
    async fn test_single_configured_provider_failure() {
        let transport = ScriptedTransport::new(&[(ProviderKind::Gemini, Outcome::Text("   "))]);
        let env = EnvSnapshot::from_pairs([("SYSTEM_PROMPT", "p"), ("GEMINI_API_KEY", "AIza-test")]);
        let router = router(transport.clone());
        let err = router.dispatch(&resolution(&env), "Hi").await.unwrap_err();
        assert_eq!(err.details(), "gemini failed: returned an empty or default error response");
        let DispatchError::AllFailed { attempted, config_errors, .. } = err;
        assert_eq!(attempted, vec![ProviderKind::Gemini]);
        assert_eq!(config_errors.len(), 2);
    }
}
