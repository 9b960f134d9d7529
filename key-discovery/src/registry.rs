//! Backend registry
//!
//! Holds the enabled backends, keyed by kind. Built once at startup and
//! read-only afterwards.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::dns::DnsBackend;
use crate::error::{DiscoveryError, DiscoveryResult};
use crate::hkp::HkpBackend;
use crate::keybase::KeybaseBackend;
use crate::traits::{BackendKind, IdentifierType, KeyBackend};
use keyfinder_config::KeyDiscoveryConfig;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Registered backends, iterated in `BackendKind` order
#[derive(Default)]
pub struct BackendRegistry {
    backends: BTreeMap<BackendKind, Arc<dyn KeyBackend>>,
}

impl BackendRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every enabled backend from configuration.
    ///
    /// Fails if an enabled backend is missing required parameters.
    pub fn from_config(config: &KeyDiscoveryConfig) -> DiscoveryResult<Self> {
        let mut registry = Self::new();

        for kind in BackendKind::ALL {
            let backend: Option<Arc<dyn KeyBackend>> = match kind {
                BackendKind::Dns => match &config.dns {
                    Some(params) if params.enable => Some(Arc::new(DnsBackend::new(params)?)),
                    _ => None,
                },
                BackendKind::Keybase => match &config.keybase {
                    Some(params) if params.enable => Some(Arc::new(KeybaseBackend::new(params)?)),
                    _ => None,
                },
                BackendKind::Hkp => match &config.hkp {
                    Some(params) if params.enable => Some(Arc::new(HkpBackend::new(params)?)),
                    _ => None,
                },
            };

            match backend {
                Some(backend) => registry.register(backend)?,
                None => info!(backend = kind.name(), "Key discovery backend disabled"),
            }
        }

        Ok(registry)
    }

    /// Add a backend; each kind may be registered once
    pub fn register(&mut self, backend: Arc<dyn KeyBackend>) -> DiscoveryResult<()> {
        let kind = backend.kind();
        if self.backends.contains_key(&kind) {
            return Err(DiscoveryError::ConfigurationError(format!(
                "backend '{}' registered twice",
                kind
            )));
        }

        info!(
            backend = kind.name(),
            capabilities = ?backend.capabilities(),
            timeout = ?backend.timeout(),
            "Registered key discovery backend"
        );
        self.backends.insert(kind, backend);
        Ok(())
    }

    /// Builder-style registration
    pub fn with_backend(mut self, backend: Arc<dyn KeyBackend>) -> DiscoveryResult<Self> {
        self.register(backend)?;
        Ok(self)
    }

    /// Backends able to resolve `kind`, in registry order
    pub fn backends_supporting(&self, kind: IdentifierType) -> Vec<Arc<dyn KeyBackend>> {
        self.backends
            .values()
            .filter(|backend| backend.supports(kind))
            .cloned()
            .collect()
    }

    /// Get a backend by kind
    pub fn get(&self, kind: BackendKind) -> Option<Arc<dyn KeyBackend>> {
        self.backends.get(&kind).cloned()
    }

    /// Registered kinds, in registry order
    pub fn kinds(&self) -> Vec<BackendKind> {
        self.backends.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyfinder_config::{DnsConfig, HkpConfig, KeybaseConfig};

    #[tokio::test]
    async fn test_empty_config_builds_empty_registry() {
        let registry = BackendRegistry::from_config(&KeyDiscoveryConfig::default()).unwrap();
        assert!(registry.is_empty());
        assert!(registry.backends_supporting(IdentifierType::Email).is_empty());
    }

    #[tokio::test]
    async fn test_enabled_backends_are_registered_in_order() {
        let config = KeyDiscoveryConfig {
            hkp: Some(HkpConfig {
                enable: true,
                url: Some("https://keys.example.org".to_string()),
                ..Default::default()
            }),
            dns: Some(DnsConfig {
                enable: true,
                ..Default::default()
            }),
            keybase: Some(KeybaseConfig {
                enable: false,
                ..Default::default()
            }),
            ..Default::default()
        };

        let registry = BackendRegistry::from_config(&config).unwrap();
        assert_eq!(registry.kinds(), vec![BackendKind::Dns, BackendKind::Hkp]);

        let email: Vec<_> = registry
            .backends_supporting(IdentifierType::Email)
            .iter()
            .map(|b| b.kind())
            .collect();
        assert_eq!(email, vec![BackendKind::Dns, BackendKind::Hkp]);

        let fingerprint: Vec<_> = registry
            .backends_supporting(IdentifierType::Fingerprint)
            .iter()
            .map(|b| b.kind())
            .collect();
        assert_eq!(fingerprint, vec![BackendKind::Hkp]);

        assert!(registry.backends_supporting(IdentifierType::Xmpp).is_empty());
        assert!(registry.get(BackendKind::Keybase).is_none());
    }

    #[tokio::test]
    async fn test_enabled_backend_without_endpoint_fails() {
        let config = KeyDiscoveryConfig {
            keybase: Some(KeybaseConfig {
                enable: true,
                url: None,
                ..Default::default()
            }),
            ..Default::default()
        };

        let result = BackendRegistry::from_config(&config);
        assert!(matches!(result, Err(DiscoveryError::ConfigurationError(msg)) if msg.contains("keybase")));
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let config = HkpConfig {
            enable: true,
            url: Some("https://keys.example.org".to_string()),
            ..Default::default()
        };
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(HkpBackend::new(&config).unwrap())).unwrap();
        let result = registry.register(Arc::new(HkpBackend::new(&config).unwrap()));
        assert!(matches!(result, Err(DiscoveryError::ConfigurationError(_))));
        assert_eq!(registry.len(), 1);
    }
}
