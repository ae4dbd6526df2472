//! Provider descriptors and per-family typed settings

use crate::llm::error::{LlmError, LlmResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 15;
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Closed set of vendor tags accepted in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderType {
    OpenAi,
    Azure,
    Anthropic,
    Gemini,
    Ollama,
    Groq,
    DeepSeek,
    Mistral,
    Nvidia,
    Alibaba,
    Meta,
}

impl ProviderType {
    /// Cargo feature that carries this vendor's client
    pub fn feature(&self) -> &'static str {
        match self {
            ProviderType::Azure => "azure",
            ProviderType::Anthropic => "anthropic",
            ProviderType::Gemini => "gemini",
            ProviderType::Ollama => "ollama",
            _ => "openai",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self.feature() {
            "azure" => cfg!(feature = "azure"),
            "anthropic" => cfg!(feature = "anthropic"),
            "gemini" => cfg!(feature = "gemini"),
            "ollama" => cfg!(feature = "ollama"),
            _ => cfg!(feature = "openai"),
        }
    }

    /// Speaks the OpenAI chat-completions dialect
    pub fn is_openai_compatible(&self) -> bool {
        !matches!(
            self,
            ProviderType::Azure | ProviderType::Anthropic | ProviderType::Gemini | ProviderType::Ollama
        )
    }

    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            ProviderType::OpenAi => Some("https://api.openai.com/v1"),
            ProviderType::Groq => Some("https://api.groq.com/openai/v1"),
            ProviderType::DeepSeek => Some("https://api.deepseek.com"),
            ProviderType::Mistral => Some("https://api.mistral.ai/v1"),
            ProviderType::Nvidia => Some("https://integrate.api.nvidia.com/v1"),
            ProviderType::Alibaba => Some("https://dashscope-intl.aliyuncs.com/compatible-mode/v1"),
            ProviderType::Anthropic => Some(DEFAULT_ANTHROPIC_BASE_URL),
            ProviderType::Gemini => Some(DEFAULT_GEMINI_BASE_URL),
            ProviderType::Ollama => Some(DEFAULT_OLLAMA_HOST),
            ProviderType::Meta | ProviderType::Azure => None,
        }
    }

    pub fn default_model(&self) -> Option<&'static str> {
        match self {
            ProviderType::OpenAi => Some("gpt-4o"),
            ProviderType::Anthropic => Some("claude-3-5-sonnet-20241022"),
            ProviderType::Gemini => Some("gemini-2.5-pro"),
            ProviderType::Ollama => Some("codellama:13b"),
            _ => None,
        }
    }

    /// Environment variable consulted when no API key is configured
    pub fn api_key_env_var(&self) -> String {
        format!("{}_API_KEY", self.to_string().to_uppercase())
    }

    pub fn known_tags() -> String {
        ProviderType::iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

/// One `[llm.providers.<name>]` entry.
///
/// `provider_type` stays a raw tag here and is validated when the provider
/// is first built. Keys outside the standard set land in `extra`.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub provider_type: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(skip, default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, toml::Value>,
}

impl fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("name", &self.name)
            .field("provider_type", &self.provider_type)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("endpoint", &self.endpoint)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderDescriptor {
    pub fn new(name: &str, provider_type: &str, model: &str) -> Self {
        Self {
            name: name.to_string(),
            provider_type: provider_type.to_string(),
            model: model.to_string(),
            api_key: None,
            endpoint: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            extra: BTreeMap::new(),
        }
    }

    /// The `type` tag, falling back to the entry name
    pub fn type_tag(&self) -> &str {
        if self.provider_type.is_empty() {
            &self.name
        } else {
            &self.provider_type
        }
    }

    pub fn resolve_type(&self) -> LlmResult<ProviderType> {
        self.type_tag()
            .parse()
            .map_err(|_| LlmError::UnknownProviderType {
                provider_type: self.type_tag().to_string(),
                known: ProviderType::known_tags(),
            })
    }

    /// Configured model or the family default
    pub fn model_for(&self, kind: ProviderType) -> LlmResult<String> {
        if !self.model.is_empty() {
            return Ok(self.model.clone());
        }
        kind.default_model()
            .map(str::to_string)
            .ok_or_else(|| {
                LlmError::ConfigurationError(format!(
                    "Provider '{}' ({}) needs a model",
                    self.name, kind
                ))
            })
    }

    /// Configured API key or `<TYPE>_API_KEY` from the environment
    pub fn api_key_for(&self, kind: ProviderType) -> LlmResult<String> {
        self.api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| env::var(kind.api_key_env_var()).ok())
            .ok_or_else(|| {
                LlmError::ConfigurationError(format!(
                    "Provider '{}' ({}) needs an api_key or {}",
                    self.name,
                    kind,
                    kind.api_key_env_var()
                ))
            })
    }

    fn extras<T: DeserializeOwned>(&self) -> LlmResult<T> {
        let table: toml::Table = self
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        toml::Value::Table(table).try_into().map_err(|e| {
            LlmError::ConfigurationError(format!(
                "Invalid settings for provider '{}': {}",
                self.name, e
            ))
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiExtras {
    base_url: Option<String>,
    organization: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AzureExtras {
    deployment: Option<String>,
    api_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BaseUrlExtras {
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OllamaExtras {
    host: Option<String>,
}

/// Vendor-specific settings, one shape per client family.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderSettings {
    OpenAiCompatible {
        base_url: String,
        organization: Option<String>,
    },
    Azure {
        endpoint: String,
        deployment: String,
        api_version: String,
    },
    Anthropic {
        base_url: String,
    },
    Gemini {
        base_url: String,
    },
    Ollama {
        host: String,
    },
}

impl ProviderSettings {
    pub fn resolve(kind: ProviderType, descriptor: &ProviderDescriptor) -> LlmResult<Self> {
        let missing = |what: &str| {
            LlmError::ConfigurationError(format!(
                "Provider '{}' ({}) needs {}",
                descriptor.name, kind, what
            ))
        };

        let settings = match kind {
            ProviderType::Azure => {
                let extras: AzureExtras = descriptor.extras()?;
                let endpoint = descriptor.endpoint.clone().ok_or_else(|| missing("an endpoint"))?;
                let deployment = match extras.deployment {
                    Some(deployment) => deployment,
                    None if !descriptor.model.is_empty() => descriptor.model.clone(),
                    None => return Err(missing("a deployment")),
                };
                ProviderSettings::Azure {
                    endpoint: endpoint.trim_end_matches('/').to_string(),
                    deployment,
                    api_version: extras
                        .api_version
                        .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
                }
            }
            ProviderType::Anthropic | ProviderType::Gemini => {
                let extras: BaseUrlExtras = descriptor.extras()?;
                let base_url = descriptor
                    .endpoint
                    .clone()
                    .or(extras.base_url)
                    .or_else(|| kind.default_base_url().map(str::to_string))
                    .ok_or_else(|| missing("an endpoint"))?;
                let base_url = base_url.trim_end_matches('/').to_string();
                if kind == ProviderType::Anthropic {
                    ProviderSettings::Anthropic { base_url }
                } else {
                    ProviderSettings::Gemini { base_url }
                }
            }
            ProviderType::Ollama => {
                let extras: OllamaExtras = descriptor.extras()?;
                let host = descriptor
                    .endpoint
                    .clone()
                    .or(extras.host)
                    .unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string());
                ProviderSettings::Ollama {
                    host: host.trim_end_matches('/').to_string(),
                }
            }
            _ => {
                let extras: OpenAiExtras = descriptor.extras()?;
                let base_url = descriptor
                    .endpoint
                    .clone()
                    .or(extras.base_url)
                    .or_else(|| kind.default_base_url().map(str::to_string))
                    .ok_or_else(|| missing("an endpoint"))?;
                ProviderSettings::OpenAiCompatible {
                    base_url: base_url.trim_end_matches('/').to_string(),
                    organization: extras.organization,
                }
            }
        };
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn with_extra(mut descriptor: ProviderDescriptor, key: &str, value: &str) -> ProviderDescriptor {
        descriptor
            .extra
            .insert(key.to_string(), toml::Value::String(value.to_string()));
        descriptor
    }

    #[rstest]
    #[case("openai", ProviderType::OpenAi)]
    #[case("deepseek", ProviderType::DeepSeek)]
    #[case("Groq", ProviderType::Groq)]
    #[case("azure", ProviderType::Azure)]
    fn test_type_tags_parse(#[case] tag: &str, #[case] expected: ProviderType) {
        let descriptor = ProviderDescriptor::new("p", tag, "m");
        assert_eq!(descriptor.resolve_type().unwrap(), expected);
    }

    #[rstest]
    fn test_type_defaults_to_entry_name() {
        let descriptor = ProviderDescriptor::new("mistral", "", "mistral-large");
        assert_eq!(descriptor.resolve_type().unwrap(), ProviderType::Mistral);
    }

    #[rstest]
    fn test_unknown_type_tag() {
        let descriptor = ProviderDescriptor::new("p", "watsonx", "m");
        match descriptor.resolve_type() {
            Err(LlmError::UnknownProviderType { provider_type, known }) => {
                assert_eq!(provider_type, "watsonx");
                assert!(known.contains("openai"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[rstest]
    #[case(ProviderType::Groq, "https://api.groq.com/openai/v1")]
    #[case(ProviderType::DeepSeek, "https://api.deepseek.com")]
    #[case(ProviderType::Nvidia, "https://integrate.api.nvidia.com/v1")]
    fn test_compatible_family_default_base_url(#[case] kind: ProviderType, #[case] expected: &str) {
        let descriptor = ProviderDescriptor::new("p", &kind.to_string(), "m");
        let settings = ProviderSettings::resolve(kind, &descriptor).unwrap();
        assert_eq!(
            settings,
            ProviderSettings::OpenAiCompatible {
                base_url: expected.to_string(),
                organization: None
            }
        );
    }

    #[rstest]
    fn test_endpoint_overrides_base_url() {
        let mut descriptor = ProviderDescriptor::new("p", "openai", "m");
        descriptor.endpoint = Some("http://proxy.local/v1/".to_string());
        let descriptor = with_extra(descriptor, "organization", "org-1");
        let settings = ProviderSettings::resolve(ProviderType::OpenAi, &descriptor).unwrap();
        assert_eq!(
            settings,
            ProviderSettings::OpenAiCompatible {
                base_url: "http://proxy.local/v1".to_string(),
                organization: Some("org-1".to_string())
            }
        );
    }

    #[rstest]
    fn test_meta_requires_endpoint() {
        let descriptor = ProviderDescriptor::new("llama", "meta", "llama-3");
        let err = ProviderSettings::resolve(ProviderType::Meta, &descriptor).unwrap_err();
        assert!(matches!(err, LlmError::ConfigurationError(_)));
    }

    #[rstest]
    fn test_azure_settings() {
        let mut descriptor = ProviderDescriptor::new("az", "azure", "gpt-4o");
        descriptor.endpoint = Some("https://acme.openai.azure.com/".to_string());
        let settings = ProviderSettings::resolve(ProviderType::Azure, &descriptor).unwrap();
        assert_eq!(
            settings,
            ProviderSettings::Azure {
                endpoint: "https://acme.openai.azure.com".to_string(),
                deployment: "gpt-4o".to_string(),
                api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            }
        );

        let descriptor = with_extra(descriptor, "deployment", "prod-gpt");
        let descriptor = with_extra(descriptor, "api_version", "2024-06-01");
        match ProviderSettings::resolve(ProviderType::Azure, &descriptor).unwrap() {
            ProviderSettings::Azure { deployment, api_version, .. } => {
                assert_eq!(deployment, "prod-gpt");
                assert_eq!(api_version, "2024-06-01");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[rstest]
    fn test_ollama_host_from_extra() {
        let descriptor = with_extra(
            ProviderDescriptor::new("local", "ollama", ""),
            "host",
            "http://gpu-box:11434",
        );
        assert_eq!(
            ProviderSettings::resolve(ProviderType::Ollama, &descriptor).unwrap(),
            ProviderSettings::Ollama {
                host: "http://gpu-box:11434".to_string()
            }
        );
    }

    #[rstest]
    fn test_model_defaults_per_family() {
        let descriptor = ProviderDescriptor::new("g", "gemini", "");
        assert_eq!(descriptor.model_for(ProviderType::Gemini).unwrap(), "gemini-2.5-pro");
        assert!(descriptor.model_for(ProviderType::Groq).is_err());
    }

    #[rstest]
    fn test_configured_api_key_wins() {
        let mut descriptor = ProviderDescriptor::new("p", "deepseek", "deepseek-chat");
        descriptor.api_key = Some("sk-configured".to_string());
        assert_eq!(
            descriptor.api_key_for(ProviderType::DeepSeek).unwrap(),
            "sk-configured"
        );
        assert_eq!(ProviderType::DeepSeek.api_key_env_var(), "DEEPSEEK_API_KEY");
    }

    #[rstest]
    fn test_debug_redacts_api_key() {
        let mut descriptor = ProviderDescriptor::new("p", "openai", "gpt-4o");
        descriptor.api_key = Some("sk-secret".to_string());
        assert!(!format!("{descriptor:?}").contains("sk-secret"));
    }
}
