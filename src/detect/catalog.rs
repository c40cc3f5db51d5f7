//! Model artifact discovery and identifier resolution.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::backend::ModelRef;
use crate::error::SessionError;

/// Prefix of synthetic model identifiers.
pub const SYNTHETIC_MODEL_PREFIX: &str = "stub://";

/// Extension of artifacts listed by the catalog.
pub const MODEL_EXTENSION: &str = "onnx";

/// Resolve a user-supplied model identifier.
///
/// Relative paths are resolved against the working directory. Paths that do
/// not exist are `ModelNotFound`.
pub fn resolve_model(identifier: &str) -> Result<ModelRef, SessionError> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Err(SessionError::ModelNotFound("<empty>".to_string()));
    }
    if identifier.starts_with(SYNTHETIC_MODEL_PREFIX) {
        return Ok(ModelRef::Synthetic(identifier.to_string()));
    }
    let path = Path::new(identifier);
    if !path.is_file() {
        return Err(SessionError::ModelNotFound(identifier.to_string()));
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .map_err(|_| SessionError::ModelNotFound(identifier.to_string()))?
    };
    Ok(ModelRef::File(absolute))
}

/// Directory of trained weights offered for selection.
#[derive(Clone, Debug)]
pub struct ModelCatalog {
    root: PathBuf,
}

impl ModelCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List model artifacts, sorted by file name. Creates the directory if missing.
    pub fn scan(&self) -> Result<Vec<PathBuf>> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root)
                .with_context(|| format!("create weights directory {}", self.root.display()))?;
            log::info!("ModelCatalog: created {}", self.root.display());
            return Ok(Vec::new());
        }
        let mut models = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("read weights directory {}", self.root.display()))?
        {
            let path = entry?.path();
            let is_model = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(MODEL_EXTENSION));
            if path.is_file() && is_model {
                models.push(path);
            }
        }
        models.sort();
        log::debug!(
            "ModelCatalog: {} model(s) in {}",
            models.len(),
            self.root.display()
        );
        Ok(models)
    }

    /// First artifact in the catalog, if any.
    pub fn default_model(&self) -> Result<Option<PathBuf>> {
        Ok(self.scan()?.into_iter().next())
    }

    /// Replacement for `configured` when it does not resolve.
    pub fn fallback_for(&self, configured: &str) -> Result<Option<PathBuf>> {
        if resolve_model(configured).is_ok() {
            return Ok(None);
        }
        self.default_model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_weights_are_not_found() {
        let err = resolve_model("weights/missing.pt").unwrap_err();
        assert!(matches!(err, SessionError::ModelNotFound(ref id) if id == "weights/missing.pt"));
        assert!(resolve_model("  ").is_err());
    }

    #[test]
    fn existing_paths_resolve_to_absolute() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let model = dir.path().join("fire.onnx");
        fs::write(&model, b"onnx")?;
        let resolved = resolve_model(model.to_str().unwrap_or_default())?;
        assert_eq!(resolved, ModelRef::File(model));
        assert_eq!(
            resolve_model("stub://detector")?,
            ModelRef::Synthetic("stub://detector".into())
        );
        Ok(())
    }

    #[test]
    fn scan_creates_directory_and_lists_onnx_only() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let catalog = ModelCatalog::new(dir.path().join("weights"));
        assert!(catalog.scan()?.is_empty());
        assert!(catalog.root().is_dir());

        fs::write(catalog.root().join("b.onnx"), b"")?;
        fs::write(catalog.root().join("a.ONNX"), b"")?;
        fs::write(catalog.root().join("notes.txt"), b"")?;
        let names: Vec<String> = catalog
            .scan()?
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(names, vec!["a.ONNX", "b.onnx"]);
        assert_eq!(
            catalog.default_model()?,
            Some(catalog.root().join("a.ONNX"))
        );
        Ok(())
    }

    #[test]
    fn fallback_only_replaces_unresolvable_models() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let catalog = ModelCatalog::new(dir.path());
        let missing = dir.path().join("gone.onnx");
        let missing = missing.to_str().unwrap_or_default();
        assert_eq!(catalog.fallback_for(missing)?, None);

        let trained = dir.path().join("trained.onnx");
        fs::write(&trained, b"")?;
        assert_eq!(catalog.fallback_for(missing)?, Some(trained.clone()));
        assert_eq!(catalog.fallback_for("stub://detector")?, None);
        assert_eq!(
            catalog.fallback_for(trained.to_str().unwrap_or_default())?,
            None
        );
        Ok(())
    }
}
