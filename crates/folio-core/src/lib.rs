//! folio-core - chat backend for the portfolio site
//!
//! This crate provides:
//! - Static descriptors for the supported LLM providers (Groq, Gemini, OpenRouter)
//! - Per-request configuration resolved from environment variables
//! - A failover router that tries providers one at a time
//! - Normalization of provider replies into complete sentences

pub mod config;
pub mod context;
pub mod normalize;
pub mod profile;
pub mod providers;

// Re-export main types for convenience
pub use config::{
    ConfigError, ConfigResolution, EnvSnapshot, EnvSource, ProcessEnv, ProviderConfig,
    ProviderStatus, mask_secret, provider_status, resolve,
};
pub use normalize::{
    DEFAULT_ERROR_MESSAGE, NO_KNOWLEDGE_MARKER, contains_redirect_marker, ensure_complete_response,
};
pub use profile::{Profile, ProfileError};
pub use providers::{
    ChatAnswer, DispatchError, FailoverRouter, HttpTransport, ProviderError, ProviderKind,
    ProviderOptions, ProviderResponse, ProviderTransport, TransportError,
};
