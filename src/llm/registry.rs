//! Provider-type tag to constructor table

use crate::llm::LlmProvider;
use crate::llm::config::{ProviderDescriptor, ProviderSettings, ProviderType};
use crate::llm::error::{LlmError, LlmResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Builds a client from a descriptor and its resolved settings
pub type ProviderConstructor = Arc<
    dyn Fn(&ProviderDescriptor, ProviderSettings) -> LlmResult<Arc<dyn LlmProvider>> + Send + Sync,
>;

/// Explicit registration table consulted when a provider is first used.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    constructors: BTreeMap<ProviderType, ProviderConstructor>,
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every vendor family compiled into this build
    pub fn builtin() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::empty();

        #[cfg(feature = "openai")]
        for kind in [
            ProviderType::OpenAi,
            ProviderType::Groq,
            ProviderType::DeepSeek,
            ProviderType::Mistral,
            ProviderType::Nvidia,
            ProviderType::Alibaba,
            ProviderType::Meta,
        ] {
            registry.register(kind, crate::llm::openai::OpenAiProvider::create);
        }
        #[cfg(feature = "azure")]
        registry.register(ProviderType::Azure, crate::llm::azure::AzureProvider::create);
        #[cfg(feature = "anthropic")]
        registry.register(
            ProviderType::Anthropic,
            crate::llm::anthropic::AnthropicProvider::create,
        );
        #[cfg(feature = "gemini")]
        registry.register(ProviderType::Gemini, crate::llm::gemini::GeminiProvider::create);
        #[cfg(feature = "ollama")]
        registry.register(ProviderType::Ollama, crate::llm::ollama::OllamaProvider::create);

        registry
    }

    pub fn register<F>(&mut self, kind: ProviderType, constructor: F) -> &mut Self
    where
        F: Fn(&ProviderDescriptor, ProviderSettings) -> LlmResult<Arc<dyn LlmProvider>>
            + Send
            + Sync
            + 'static,
    {
        self.constructors.insert(kind, Arc::new(constructor));
        self
    }

    pub fn is_registered(&self, kind: ProviderType) -> bool {
        self.constructors.contains_key(&kind)
    }

    /// Build a client for `descriptor`.
    ///
    /// Unrecognised tags fail with `UnknownProviderType`; recognised tags
    /// whose client was not compiled in fail with `MissingDependency`.
    pub fn create(&self, descriptor: &ProviderDescriptor) -> LlmResult<Arc<dyn LlmProvider>> {
        let kind = descriptor.resolve_type()?;
        let Some(constructor) = self.constructors.get(&kind) else {
            if !kind.is_enabled() {
                return Err(LlmError::MissingDependency {
                    provider_type: kind.to_string(),
                    feature: kind.feature().to_string(),
                });
            }
            return Err(LlmError::UnknownProviderType {
                provider_type: kind.to_string(),
                known: self
                    .constructors
                    .keys()
                    .map(|k| k.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        };

        let settings = ProviderSettings::resolve(kind, descriptor)?;
        debug!(
            "[ProviderRegistry::create] Building '{}' as {} ({:?})",
            descriptor.name, kind, settings
        );
        constructor(descriptor, settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::CannedProvider;
    use rstest::rstest;

    fn canned(_: &ProviderDescriptor, _: ProviderSettings) -> LlmResult<Arc<dyn LlmProvider>> {
        Ok(Arc::new(CannedProvider::new("SELECT 1")))
    }

    #[rstest]
    fn test_registered_constructor_is_used() {
        let mut registry = ProviderRegistry::empty();
        registry.register(ProviderType::Groq, canned);
        let provider = registry
            .create(&ProviderDescriptor::new("fast", "groq", "llama-3.1-8b"))
            .unwrap();
        assert_eq!(provider.provider_name(), "canned");
    }

    #[rstest]
    fn test_unrecognised_tag() {
        let registry = ProviderRegistry::builtin();
        let result = registry.create(&ProviderDescriptor::new("x", "bard", "m"));
        assert!(matches!(result, Err(LlmError::UnknownProviderType { .. })));
    }

    #[rstest]
    fn test_enabled_but_unregistered_tag() {
        let registry = ProviderRegistry::empty();
        let result = registry.create(&ProviderDescriptor::new("x", "openai", "gpt-4o"));
        if ProviderType::OpenAi.is_enabled() {
            assert!(matches!(result, Err(LlmError::UnknownProviderType { .. })));
        } else {
            assert!(matches!(result, Err(LlmError::MissingDependency { .. })));
        }
    }

    #[rstest]
    fn test_builtin_covers_enabled_families() {
        let registry = ProviderRegistry::builtin();
        for kind in [ProviderType::OpenAi, ProviderType::Meta, ProviderType::Azure, ProviderType::Ollama] {
            assert_eq!(registry.is_registered(kind), kind.is_enabled());
        }
    }

    #[rstest]
    fn test_settings_errors_surface_before_construction() {
        let mut registry = ProviderRegistry::empty();
        registry.register(ProviderType::Meta, canned);
        let result = registry.create(&ProviderDescriptor::new("llama", "meta", "llama-3"));
        assert!(matches!(result, Err(LlmError::ConfigurationError(_))));
    }
}
