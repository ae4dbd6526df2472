//! One live client per configured provider name

use crate::llm::LlmProvider;
use crate::llm::config::ProviderDescriptor;
use crate::llm::error::{LlmError, LlmResult};
use crate::llm::registry::ProviderRegistry;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::info;

pub struct ProviderPool {
    descriptors: BTreeMap<String, ProviderDescriptor>,
    registry: ProviderRegistry,
    clients: Mutex<HashMap<String, Arc<dyn LlmProvider>>>,
}

impl ProviderPool {
    pub fn new(descriptors: BTreeMap<String, ProviderDescriptor>, registry: ProviderRegistry) -> Self {
        Self {
            descriptors,
            registry,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.descriptors.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Client for `name`, built on first request and reused afterwards.
    /// Construction failures are not cached.
    pub fn get_or_create(&self, name: &str) -> LlmResult<Arc<dyn LlmProvider>> {
        let descriptor = self
            .descriptors
            .get(name)
            .ok_or_else(|| LlmError::NotConfigured {
                name: name.to_string(),
                available: self.names(),
            })?;

        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(client) = clients.get(name) {
            return Ok(Arc::clone(client));
        }

        let client = self.registry.create(descriptor)?;
        info!(
            "Initialized LLM provider '{}' ({} / {})",
            name,
            client.provider_name(),
            client.model_name()
        );
        clients.insert(name.to_string(), Arc::clone(&client));
        Ok(client)
    }

    pub fn live_count(&self) -> usize {
        self.clients
            .lock()
            .map(|clients| clients.len())
            .unwrap_or_default()
    }
}
