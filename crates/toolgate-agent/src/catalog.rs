//! In-memory node catalog.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use toolgate_core::{CatalogEntry, NodeCatalog, NodeCategory, NodeDefinition};

use crate::nodes;

/// Node types keyed by name. Constructed explicitly and shared by reference.
#[derive(Default)]
pub struct InMemoryNodeCatalog {
    entries: RwLock<HashMap<String, CatalogEntry>>,
}

impl InMemoryNodeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding every built-in node.
    pub fn with_builtins() -> Self {
        let catalog = Self::new();
        for entry in nodes::builtin_entries() {
            catalog.register(entry);
        }
        catalog
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CatalogEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CatalogEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a node type.
    pub fn register(&self, entry: CatalogEntry) {
        let name = entry.definition.name.clone();
        if self.write().insert(name.clone(), entry).is_some() {
            tracing::debug!(node_type = %name, "Replaced node type");
        }
    }

    /// Remove a node type. Returns whether it existed.
    pub fn unregister(&self, node_type: &str) -> bool {
        self.write().remove(node_type).is_some()
    }

    pub fn list_by_category(&self, category: NodeCategory) -> Vec<NodeDefinition> {
        let mut definitions: Vec<NodeDefinition> = self
            .read()
            .values()
            .filter(|entry| entry.definition.category == category)
            .map(|entry| entry.definition.clone())
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl NodeCatalog for InMemoryNodeCatalog {
    fn get(&self, node_type: &str) -> Option<CatalogEntry> {
        self.read().get(node_type).cloned()
    }

    fn list(&self) -> Vec<NodeDefinition> {
        let mut definitions: Vec<NodeDefinition> =
            self.read().values().map(|entry| entry.definition.clone()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }
}
