//! Target service base URL registry

use std::collections::HashMap;

use crate::config::ServicesConfig;
use crate::domain::chain::{ChainConfiguration, ChainError, TargetService};

/// Maps each target service to its configured base URL
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    base_urls: HashMap<TargetService, String>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ServicesConfig) -> Self {
        TargetService::ALL
            .into_iter()
            .filter_map(|service| config.base_url(service).map(|url| (service, url)))
            .fold(Self::new(), |registry, (service, url)| {
                registry.with_service(service, url)
            })
    }

    pub fn with_service(mut self, service: TargetService, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        self.base_urls.insert(service, base_url);
        self
    }

    pub fn base_url(&self, service: TargetService) -> Option<&str> {
        self.base_urls.get(&service).map(String::as_str)
    }

    pub fn is_configured(&self, service: TargetService) -> bool {
        self.base_urls.contains_key(&service)
    }

    /// Check every step of a chain targets a configured service
    pub fn ensure_configured(&self, chain: &ChainConfiguration) -> Result<(), ChainError> {
        match chain.steps().iter().find(|s| !self.is_configured(s.service)) {
            Some(step) => Err(ChainError::validation(format!(
                "Step '{}' targets service '{}' which has no configured base URL",
                step.id, step.service
            ))),
            None => Ok(()),
        }
    }
}
