//! Backend registry: name -> delivery backend + its configuration.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::ports::{BackendConfig, DeliveryBackend};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate backend for target={0}")]
    DuplicateBackend(String),

    #[error("unknown backend: {0}")]
    UnknownBackend(String),
}

/// One registry entry: the backend implementation plus its live config.
///
/// Config sits behind a lock so the operator can connect/disconnect a
/// target while the schedulers are running; the backend set itself is fixed
/// after wiring.
pub struct RegisteredBackend {
    backend: Arc<dyn DeliveryBackend>,
    config: RwLock<BackendConfig>,
}

impl RegisteredBackend {
    pub fn backend(&self) -> &Arc<dyn DeliveryBackend> {
        &self.backend
    }

    /// Snapshot of the current config.
    pub fn config(&self) -> BackendConfig {
        self.config.read().expect("config lock poisoned").clone()
    }

    /// Credential check against the current config; no network.
    pub fn is_connected(&self) -> bool {
        let config = self.config.read().expect("config lock poisoned");
        self.backend.is_connected(&config)
    }
}

/// Registry of delivery backends (target name -> backend).
///
/// Design:
/// - Built during initialization (mutable).
/// - Used during runtime (immutable, apart from per-entry config).
/// This keeps lookup lock-free and wiring mistakes loud.
#[derive(Default)]
pub struct BackendRegistry {
    entries: HashMap<String, RegisteredBackend>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a backend under a target name.
    ///
    /// Duplicate names are an error; wiring mistakes surface at startup.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        backend: Arc<dyn DeliveryBackend>,
        config: BackendConfig,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(RegistryError::DuplicateBackend(name));
        }
        self.entries.insert(
            name,
            RegisteredBackend {
                backend,
                config: RwLock::new(config),
            },
        );
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<&RegisteredBackend> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Is the named target present and credentialed?
    pub fn is_connected(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .map(|e| e.is_connected())
            .unwrap_or(false)
    }

    /// Replace a target's config (connect / disconnect flow).
    pub fn update_config(&self, name: &str, config: BackendConfig) -> Result<(), RegistryError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| RegistryError::UnknownBackend(name.to_string()))?;
        *entry.config.write().expect("config lock poisoned") = config;
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::backends::RecordingBackend;

    #[test]
    fn register_rejects_duplicates() {
        let mut registry = BackendRegistry::new();
        registry
            .register(
                "statusfeed",
                Arc::new(RecordingBackend::connected()),
                BackendConfig::default(),
            )
            .unwrap();

        let err = registry
            .register(
                "statusfeed",
                Arc::new(RecordingBackend::connected()),
                BackendConfig::default(),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateBackend(name) if name == "statusfeed"));
    }

    #[test]
    fn unresolved_target_is_not_connected() {
        let registry = BackendRegistry::new();
        assert!(registry.resolve("megaphone").is_none());
        assert!(!registry.is_connected("megaphone"));
    }

    #[test]
    fn update_config_flips_connectivity() {
        let mut registry = BackendRegistry::new();
        registry
            .register(
                "journal",
                Arc::new(RecordingBackend::requiring_api_key()),
                BackendConfig::default(),
            )
            .unwrap();
        assert!(!registry.is_connected("journal"));

        registry
            .update_config("journal", BackendConfig::default().with_api_key("k-123"))
            .unwrap();
        assert!(registry.is_connected("journal"));

        // disconnect = clear the credentials
        registry
            .update_config("journal", BackendConfig::default())
            .unwrap();
        assert!(!registry.is_connected("journal"));
    }

    #[test]
    fn update_config_for_unknown_backend_errors() {
        let registry = BackendRegistry::new();
        let err = registry
            .update_config("megaphone", BackendConfig::default())
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownBackend(_)));
    }
}
