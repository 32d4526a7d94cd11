use std::collections::HashMap;
use std::sync::Arc;

use super::{card, momo, sms, ProviderAdapter};
use crate::config::{ProviderConfig, ProvidersConfig};
use crate::context::GatewayContext;

pub type AdapterFactory =
    fn(&str, ProviderConfig, Arc<GatewayContext>) -> anyhow::Result<Arc<dyn ProviderAdapter>>;

const FACTORIES: &[(&str, AdapterFactory)] = &[
    (momo::CODE, momo::build as AdapterFactory),
    (card::CODE, card::build as AdapterFactory),
    (sms::CODE, sms::build as AdapterFactory),
];

pub fn factory_for(code: &str) -> Option<AdapterFactory> {
    FACTORIES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, factory)| *factory)
}

pub fn known_codes() -> Vec<&'static str> {
    FACTORIES.iter().map(|(code, _)| *code).collect()
}

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(
        providers: &ProvidersConfig,
        ctx: Arc<GatewayContext>,
    ) -> anyhow::Result<Self> {
        let mut registry = Self::new();
        for (code, config) in &providers.providers {
            let factory = factory_for(code).ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown provider code {:?} in configuration (known: {})",
                    code,
                    known_codes().join(", ")
                )
            })?;
            let adapter = factory(code, config.clone(), ctx.clone())?;
            tracing::info!(
                provider = %code,
                capabilities = ?adapter.capabilities().iter().map(|c| c.as_str()).collect::<Vec<_>>(),
                "Provider registered"
            );
            registry.register(adapter);
        }
        Ok(registry)
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.code().to_string(), adapter);
    }

    pub fn get(&self, code: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(code).cloned()
    }

    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.adapters.keys().cloned().collect();
        codes.sort();
        codes
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
