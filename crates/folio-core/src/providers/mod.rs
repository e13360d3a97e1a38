//! Provider registry
//!
//! Supports Groq and OpenRouter (OpenAI-compatible) and Google Gemini.
//! Each backend is described by a static [`ProviderDescriptor`]; the
//! [`FailoverRouter`] walks configured providers in order until one answers.

pub mod google;
pub mod openai_compat;
pub mod router;
pub mod transport;
pub mod types;

pub use router::{ChatAnswer, DispatchError, FailoverRouter, ProviderError, ProviderErrorKind, ProviderResponse};
pub use transport::{HttpTransport, ProviderRequest, ProviderTransport, TransportError};
pub use types::{KeyPlacement, ParsedReply, ProviderDescriptor, ProviderKind, ProviderOptions, UnknownProvider};

/// Descriptor for a provider
pub fn descriptor(kind: ProviderKind) -> &'static dyn ProviderDescriptor {
    match kind {
        ProviderKind::Groq => &openai_compat::GROQ,
        ProviderKind::Gemini => &google::GEMINI,
        ProviderKind::OpenRouter => &openai_compat::OPENROUTER,
    }
}

/// Parse and validate a failover order. Rejects unknown ids, duplicates and empty lists.
pub fn parse_order<S: AsRef<str>>(ids: &[S]) -> Result<Vec<ProviderKind>, OrderError> {
    if ids.is_empty() {
        return Err(OrderError::Empty);
    }
    let mut order = Vec::with_capacity(ids.len());
    for id in ids {
        let kind: ProviderKind = id.as_ref().parse()?;
        if order.contains(&kind) {
            return Err(OrderError::Duplicate(kind));
        }
        order.push(kind);
    }
    Ok(order)
}

/// Invalid failover order
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("failover order must name at least one provider")]
    Empty,
    #[error("provider '{0}' appears more than once in the failover order")]
    Duplicate(ProviderKind),
    #[error(transparent)]
    Unknown(#[from] UnknownProvider),
}
