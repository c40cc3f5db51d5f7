use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::error::SessionError;

use super::backend::{DetectorBackend, EngineOptions, ModelLoader, ModelRef};
use super::backends::StubLoader;
#[cfg(feature = "backend-tract")]
use super::backends::TractLoader;

/// Registry of model loaders.
///
/// Loaders are shared (`Arc`) so the registry can be handed to worker threads.
pub struct BackendRegistry {
    loaders: HashMap<String, Arc<dyn ModelLoader>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            loaders: HashMap::new(),
            default_name: None,
        }
    }

    /// Registry with every loader compiled into this build.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        #[cfg(feature = "backend-tract")]
        registry.register(TractLoader);
        registry.register(StubLoader);
        registry
    }

    /// Register a loader. The first registered loader becomes the default.
    pub fn register<L: ModelLoader + 'static>(&mut self, loader: L) {
        let name = loader.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.loaders.insert(name, Arc::new(loader));
    }

    /// Set default loader by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.loaders.contains_key(name) {
            return Err(anyhow!("loader '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Get loader by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ModelLoader>> {
        self.loaders.get(name).cloned()
    }

    /// List registered loaders, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loaders.keys().cloned().collect();
        names.sort();
        names
    }

    /// Select a loader that accepts the model.
    ///
    /// Prefers the default loader when it accepts the model.
    pub fn loader_for(&self, model: &ModelRef) -> Result<Arc<dyn ModelLoader>> {
        if let Some(default_loader) = self.default_name.as_ref().and_then(|n| self.get(n)) {
            if default_loader.accepts(model) {
                return Ok(default_loader);
            }
        }
        let mut names: Vec<&String> = self.loaders.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| self.loaders.get(name))
            .find(|loader| loader.accepts(model))
            .cloned()
            .ok_or_else(|| anyhow!("no registered engine accepts model {}", model))
    }

    /// Load a model with the first loader that accepts it.
    pub fn load(
        &self,
        model: &ModelRef,
        options: &EngineOptions,
    ) -> Result<Box<dyn DetectorBackend>, SessionError> {
        let loader = self
            .loader_for(model)
            .map_err(|err| SessionError::model_load(model, err))?;
        log::info!("BackendRegistry: loading {} with '{}'", model, loader.name());
        loader
            .load(model, options)
            .map_err(|err| SessionError::model_load(model, format!("{:#}", err)))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn builtin_registry_loads_synthetic_models() {
        let registry = BackendRegistry::with_builtin();
        assert!(registry.list().contains(&"stub".to_string()));
        let model = ModelRef::Synthetic("stub://detector?fire=1".into());
        let backend = registry
            .load(&model, &EngineOptions::default())
            .expect("stub model loads");
        assert_eq!(backend.name(), "stub");
    }

    #[test]
    fn unknown_artifacts_fail_to_load() {
        let registry = BackendRegistry::with_builtin();
        let model = ModelRef::File(PathBuf::from("/models/best.pt"));
        let err = registry
            .load(&model, &EngineOptions::default())
            .err()
            .expect("no loader accepts .pt");
        assert_eq!(err.kind(), "model_load");
    }

    #[test]
    fn set_default_rejects_unknown_loader() {
        let mut registry = BackendRegistry::new();
        registry.register(StubLoader);
        assert!(registry.set_default("stub").is_ok());
        assert!(registry.set_default("onnxruntime").is_err());
    }
}
