//! Adaptor registry.
//!
//! A constructed-once, read-only mapping from provider discriminant to
//! adaptor instance. No global state: the registry is built explicitly and
//! passed into the orchestrator. After construction it is safe for
//! unsynchronized concurrent reads; the embedded `reqwest::Client` is the
//! shared connection pool for every adaptor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::adaptor::Adaptor;
use super::provider::ProviderKind;
use crate::providers::anthropic::AnthropicAdaptor;
use crate::providers::azure::AzureAdaptor;
use crate::providers::compat::OpenAiCompatibleAdaptor;
use crate::providers::gemini::GeminiAdaptor;
use crate::providers::openai::OpenAiAdaptor;

pub struct AdaptorRegistry {
    adaptors: HashMap<ProviderKind, Arc<dyn Adaptor>>,
}

impl AdaptorRegistry {
    /// Empty registry. Production code wants [`Self::with_defaults`]; an
    /// empty registry is how callers model "this provider is not enabled".
    pub fn new() -> Self {
        Self {
            adaptors: HashMap::new(),
        }
    }

    /// Registry covering every known discriminant. Adding a provider means
    /// adding one registration here, never modifying existing ones.
    pub fn with_defaults(http: reqwest::Client) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(OpenAiAdaptor::new(http.clone())));
        registry.register(Arc::new(AzureAdaptor::new(http.clone())));
        registry.register(Arc::new(AnthropicAdaptor::new(http.clone())));
        registry.register(Arc::new(GeminiAdaptor::new(http.clone())));
        for kind in ProviderKind::ALL {
            if !registry.adaptors.contains_key(&kind) {
                registry.register(Arc::new(OpenAiCompatibleAdaptor::new(kind, http.clone())));
            }
        }
        registry
    }

    /// Shared HTTP client suitable for the default registry.
    pub fn default_http_client() -> reqwest::Client {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("relaymux/", env!("CARGO_PKG_VERSION")))
            .build()
            // Builder failure means a broken TLS backend; the stock client
            // is the only sane fallback.
            .unwrap_or_default()
    }

    /// Register one adaptor under its own discriminant.
    pub fn register(&mut self, adaptor: Arc<dyn Adaptor>) {
        self.adaptors.insert(adaptor.kind(), adaptor);
    }

    /// Pure lookup. `None` is the well-defined "no match" signal; there is
    /// no default provider.
    pub fn resolve(&self, kind: ProviderKind) -> Option<Arc<dyn Adaptor>> {
        self.adaptors.get(&kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.adaptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adaptors.is_empty()
    }
}

impl Default for AdaptorRegistry {
    fn default() -> Self {
        Self::with_defaults(Self::default_http_client())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_is_exhaustive_and_injective() {
        let registry = AdaptorRegistry::with_defaults(reqwest::Client::new());
        assert_eq!(registry.len(), ProviderKind::ALL.len());
        for kind in ProviderKind::ALL {
            let adaptor = registry.resolve(kind).expect("registered adaptor");
            assert_eq!(adaptor.kind(), kind);
        }
    }

    #[test]
    fn empty_registry_resolves_nothing() {
        let registry = AdaptorRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.resolve(ProviderKind::OpenAi).is_none());
    }
}
