//! Adapter registry: exchange-id string to constructor.
//!
//! Chosen once at startup; everything downstream depends only on the
//! [`ExchangeApi`] trait object the registry hands back.

use crate::api::ExchangeApi;
use crate::error::{ExchangeError, ExchangeResult};
use crate::paper::PaperExchange;
use std::collections::HashMap;
use std::sync::Arc;

/// Credentials passed to an adapter constructor.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

type Constructor = Arc<dyn Fn(&Credentials) -> Arc<dyn ExchangeApi> + Send + Sync>;

/// Maps exchange ids to adapter constructors.
pub struct AdapterRegistry {
    constructors: HashMap<String, Constructor>,
}

impl AdapterRegistry {
    /// Empty registry with the built-in paper adapter registered.
    pub fn new() -> Self {
        let mut registry = Self {
            constructors: HashMap::new(),
        };
        registry.register("paper", |_creds| {
            Arc::new(PaperExchange::new()) as Arc<dyn ExchangeApi>
        });
        registry
    }

    pub fn register<F>(&mut self, id: &str, constructor: F)
    where
        F: Fn(&Credentials) -> Arc<dyn ExchangeApi> + Send + Sync + 'static,
    {
        self.constructors
            .insert(id.to_lowercase(), Arc::new(constructor));
    }

    /// Construct the adapter for `id`, or fail fatally when the exchange
    /// is not supported.
    pub fn create(&self, id: &str, creds: &Credentials) -> ExchangeResult<Arc<dyn ExchangeApi>> {
        self.constructors
            .get(&id.to_lowercase())
            .map(|ctor| ctor(creds))
            .ok_or_else(|| ExchangeError::Fatal(format!("unsupported exchange: {id}")))
    }

    pub fn supported(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.constructors.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paper_registered_by_default() {
        let registry = AdapterRegistry::new();
        assert!(registry.supported().contains(&"paper".to_string()));
        let api = registry.create("PAPER", &Credentials::default()).unwrap();
        assert_eq!(api.exchange_id(), "paper");
    }

    #[test]
    fn test_unknown_exchange_is_fatal() {
        let registry = AdapterRegistry::new();
        let result = registry.create("nosuch", &Credentials::default());
        let err = match result {
            Ok(_) => panic!("expected unsupported exchange to fail"),
            Err(err) => err,
        };
        assert!(matches!(err, ExchangeError::Fatal(_)));
    }
}
