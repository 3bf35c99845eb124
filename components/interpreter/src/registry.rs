//! Parsed module records, shared by an interpreter and its clones.

use bytecode_system::{ModuleError, ModuleRecord};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// File name suffix of module records on the search path.
pub const MODULE_SUFFIX: &str = ".mod.json";

/// Cache of module records by module name.
///
/// Cloning the registry shares the cache.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    records: Arc<RwLock<FxHashMap<String, Arc<ModuleRecord>>>>,
}

impl ModuleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        ModuleRegistry::default()
    }

    /// Caches `record` under every module name it defines.
    pub fn insert(&self, record: ModuleRecord) -> Arc<ModuleRecord> {
        let record = Arc::new(record);
        let mut records = self.records.write();
        for name in record.module_names() {
            records.insert(name.to_string(), record.clone());
        }
        record
    }

    /// The cached record defining `name`.
    pub fn get(&self, name: &str) -> Option<Arc<ModuleRecord>> {
        self.records.read().get(name).cloned()
    }

    /// Number of cached module names.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// The record defining `name`, read from the first directory of
    /// `search_path` holding `<name>.mod.json` unless already cached.
    pub fn find(&self, name: &str, search_path: &[PathBuf]) -> Result<Arc<ModuleRecord>, ModuleError> {
        if let Some(record) = self.get(name) {
            return Ok(record);
        }
        let path = locate(name, search_path).ok_or_else(|| ModuleError::NotFound(name.to_string()))?;
        let record = ModuleRecord::read(&path)?;
        record.validate()?;
        if !record.module_names().any(|defined| defined == name) {
            return Err(ModuleError::Invalid(format!(
                "{} does not define module '{}'",
                path.display(),
                name
            )));
        }
        debug!(target: "ejs::loader", module = name, path = %path.display(), "module record read");
        Ok(self.insert(record))
    }
}

fn locate(name: &str, search_path: &[PathBuf]) -> Option<PathBuf> {
    let file = format!("{}{}", name, MODULE_SUFFIX);
    search_path
        .iter()
        .map(|dir| dir.join(&file))
        .find(|path| Path::is_file(path))
}
