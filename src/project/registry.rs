//! Process-wide registry of project types.
//!
//! Populated once at startup, read-only afterwards. Embedded uses construct
//! their own `TypeRegistry` and call `install`; the CLI installs the
//! built-in set.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::sdk::{BuildError, ProjectTypeConfig};

pub struct TypeRegistry {
    types: HashMap<String, Arc<ProjectTypeConfig>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Registry with the built-in project types.
    pub fn builtin() -> Result<Self, BuildError> {
        let mut registry = Self::new();
        registry.register(crate::types::standard::standard_type()?);
        Ok(registry)
    }

    pub fn register(&mut self, config: ProjectTypeConfig) {
        self.types.insert(config.name.clone(), Arc::new(config));
    }

    pub fn get(&self, name: &str) -> Option<Arc<ProjectTypeConfig>> {
        self.types.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: OnceLock<TypeRegistry> = OnceLock::new();

/// Install the process-wide registry. The first call wins; later calls
/// return the already-installed registry.
pub fn install(registry: TypeRegistry) -> &'static TypeRegistry {
    GLOBAL.get_or_init(|| registry)
}

pub fn global() -> Option<&'static TypeRegistry> {
    GLOBAL.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_has_standard_type() {
        let registry = TypeRegistry::builtin().unwrap();
        let config = registry.get("standard").unwrap();
        assert_eq!(config.initial_state, "PlanningActive");
        assert_eq!(registry.names(), vec!["standard"]);
    }

    #[test]
    fn unknown_type_lookup_fails() {
        let registry = TypeRegistry::builtin().unwrap();
        assert!(registry.get("nonexistent").is_none());
    }
}
