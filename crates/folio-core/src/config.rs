//! Per-request provider configuration
//!
//! Configuration is rebuilt from an [`EnvSnapshot`] on every request: secrets,
//! model ids and sampling options all come from environment variables. Nothing
//! here touches the network.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::build_system_prompt;
use crate::profile::Profile;
use crate::providers::{self, ProviderDescriptor, ProviderKind, ProviderOptions};
use crate::providers::types::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, DEFAULT_TOP_K, DEFAULT_TOP_P};

pub const SYSTEM_PROMPT_VAR: &str = "SYSTEM_PROMPT";
pub const AI_PROVIDER_VAR: &str = "AI_PROVIDER";
pub const AI_TEMPERATURE_VAR: &str = "AI_TEMPERATURE";
pub const AI_MAX_TOKENS_VAR: &str = "AI_MAX_TOKENS";
pub const AI_TOP_P_VAR: &str = "AI_TOP_P";
pub const AI_TOP_K_VAR: &str = "AI_TOP_K";

/// Point-in-time copy of environment variables
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of a variable; blank values count as unset
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Parse a variable, falling back to `default` when unset or unparsable
    fn parse_or<T: FromStr>(&self, name: &str, default: T) -> T {
        match self.get(name) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("Ignoring unparsable {}={:?}", name, raw);
                default
            }),
            None => default,
        }
    }
}

/// Source of environment snapshots
pub trait EnvSource: Send + Sync {
    fn snapshot(&self) -> EnvSnapshot;
}

/// Reads the live process environment on every snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn snapshot(&self) -> EnvSnapshot {
        EnvSnapshot::from_process()
    }
}

impl EnvSource for EnvSnapshot {
    fn snapshot(&self) -> EnvSnapshot {
        self.clone()
    }
}

/// Environment variable names for one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderEnvKeys {
    /// Checked in order; the first non-blank value wins
    pub api_key: &'static [&'static str],
    pub model: &'static str,
}

/// Environment variables holding a provider's key and model
pub fn env_keys(kind: ProviderKind) -> ProviderEnvKeys {
    match kind {
        ProviderKind::Groq => ProviderEnvKeys {
            api_key: &["GROQ_API_KEY"],
            model: "GROQ_MODEL",
        },
        ProviderKind::Gemini => ProviderEnvKeys {
            api_key: &["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"],
            model: "GEMINI_MODEL",
        },
        ProviderKind::OpenRouter => ProviderEnvKeys {
            api_key: &["OPENROUTER_API_KEY"],
            model: "OPENROUTER_MODEL",
        },
    }
}

fn api_key_for(env: &EnvSnapshot, kind: ProviderKind) -> Option<String> {
    env_keys(kind)
        .api_key
        .iter()
        .find_map(|name| env.get(name))
        .map(|k| k.trim().to_string())
}

/// Shared sampling options from `AI_TEMPERATURE`, `AI_MAX_TOKENS`, `AI_TOP_P`, `AI_TOP_K`
pub fn sampling_options(env: &EnvSnapshot) -> ProviderOptions {
    ProviderOptions {
        temperature: env.parse_or(AI_TEMPERATURE_VAR, DEFAULT_TEMPERATURE),
        max_tokens: env.parse_or(AI_MAX_TOKENS_VAR, DEFAULT_MAX_TOKENS),
        top_p: env.parse_or(AI_TOP_P_VAR, DEFAULT_TOP_P),
        top_k: Some(env.parse_or(AI_TOP_K_VAR, DEFAULT_TOP_K)),
        model: None,
    }
}

/// A provider that can be called for this request
#[derive(Clone)]
pub struct ProviderConfig {
    pub descriptor: &'static dyn ProviderDescriptor,
    pub api_key: String,
    pub system_prompt: Arc<str>,
    pub options: ProviderOptions,
}

impl ProviderConfig {
    pub fn kind(&self) -> ProviderKind {
        self.descriptor.kind()
    }

    /// Model that will be requested
    pub fn model(&self) -> String {
        self.descriptor.model_for(&self.options)
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.kind())
            .field("api_key", &mask_secret(&self.api_key))
            .field("system_prompt_len", &self.system_prompt.len())
            .field("options", &self.options)
            .finish()
    }
}

/// Outcome of resolving every registered provider for one request
#[derive(Debug, Clone)]
pub struct ConfigResolution {
    /// Usable providers, in registry order
    pub configs: Vec<ProviderConfig>,
    /// Provider id → reason it could not be configured
    pub errors: BTreeMap<String, String>,
    /// Provider to try first
    pub preferred: ProviderKind,
}

impl ConfigResolution {
    pub fn get(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.configs.iter().find(|c| c.kind() == kind)
    }

    /// Ids of configured providers, in registry order
    pub fn configured(&self) -> Vec<ProviderKind> {
        self.configs.iter().map(ProviderConfig::kind).collect()
    }
}

/// Request-fatal configuration failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing SYSTEM_PROMPT environment variable")]
    MissingSystemPrompt,
    #[error("Profile data is missing")]
    MissingProfile,
    #[error("No valid provider configurations available. Errors: {}", format_errors(.errors))]
    NoProviders { errors: BTreeMap<String, String> },
}

fn format_errors(errors: &BTreeMap<String, String>) -> String {
    serde_json::to_string(errors).unwrap_or_default()
}

/// Resolve provider configs for one request.
///
/// `order` is the registry order; providers outside it are never configured.
/// Fails before any network activity when the prompt template or profile is
/// missing, or when no provider has credentials.
pub fn resolve(
    env: &EnvSnapshot,
    profile: Option<&Profile>,
    order: &[ProviderKind],
) -> Result<ConfigResolution, ConfigError> {
    let template = env
        .get(SYSTEM_PROMPT_VAR)
        .ok_or(ConfigError::MissingSystemPrompt)?;
    let profile = profile.ok_or(ConfigError::MissingProfile)?;

    let system_prompt: Arc<str> = build_system_prompt(template, profile.as_value()).into();
    let common = sampling_options(env);

    let mut configs = Vec::new();
    let mut errors = BTreeMap::new();

    for &kind in order {
        let Some(api_key) = api_key_for(env, kind) else {
            errors.insert(
                kind.id().to_string(),
                format!("Missing API key for provider: {}", kind),
            );
            continue;
        };

        let descriptor = providers::descriptor(kind);
        let model = env
            .get(env_keys(kind).model)
            .map(|m| m.trim().to_string())
            .unwrap_or_else(|| descriptor.default_model().to_string());

        configs.push(ProviderConfig {
            descriptor,
            api_key,
            system_prompt: Arc::clone(&system_prompt),
            options: ProviderOptions {
                model: Some(model),
                ..common.clone()
            },
        });
    }

    let default_preferred = order.first().copied();
    let preferred = match env.get(AI_PROVIDER_VAR) {
        Some(raw) => match raw.parse::<ProviderKind>() {
            Ok(kind) => Some(kind),
            Err(e) => {
                warn!("{}; preferring registry default", e);
                errors.insert(raw.trim().to_string(), e.to_string());
                default_preferred
            }
        },
        None => default_preferred,
    };

    let preferred = match preferred {
        Some(kind) if !configs.is_empty() => kind,
        _ => return Err(ConfigError::NoProviders { errors }),
    };

    debug!(
        "Resolved {} provider(s), {} configuration error(s), preferred={}",
        configs.len(),
        errors.len(),
        preferred
    );

    Ok(ConfigResolution {
        configs,
        errors,
        preferred,
    })
}

/// Availability of one provider, for status reporting
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ProviderStatus {
    pub provider: ProviderKind,
    pub available: bool,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Credential and model status for each provider in `order`.
///
/// Unlike [`resolve`] this does not need a system prompt or profile.
pub fn provider_status(env: &EnvSnapshot, order: &[ProviderKind]) -> Vec<ProviderStatus> {
    order
        .iter()
        .map(|&kind| {
            let model = env
                .get(env_keys(kind).model)
                .map(|m| m.trim().to_string())
                .unwrap_or_else(|| providers::descriptor(kind).default_model().to_string());
            match api_key_for(env, kind) {
                Some(key) => ProviderStatus {
                    provider: kind,
                    available: true,
                    model,
                    masked_key: Some(mask_secret(&key)),
                    reason: None,
                },
                None => ProviderStatus {
                    provider: kind,
                    available: false,
                    model,
                    masked_key: None,
                    reason: Some(format!("Missing API key for provider: {}", kind)),
                },
            }
        })
        .collect()
}

/// Mask a secret string for safe display in Debug output / logs.
/// Shows first 3 and last 4 chars for keys longer than 7 chars, otherwise "***".
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}
