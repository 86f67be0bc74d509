use super::types::ModelDescriptor;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use tracing::warn;

pub const DEFAULT_MODEL: &str = "v1.0";

/// Static name -> descriptor mapping. No I/O.
#[derive(Clone, Debug)]
pub struct ModelCatalog {
    models: BTreeMap<String, ModelDescriptor>,
}

impl ModelCatalog {
    pub fn builtin() -> Self {
        let mut models = BTreeMap::new();

        models.insert(
            "v1.0".to_string(),
            ModelDescriptor::new(
                "v1.0",
                "https://zenodo.org/records/14618982/files/classranker_v1.0.ckpt.gz",
                "68a9855c16d7bab64b7e73e1e1442c7bf898f227ffd9a19c48ddfd2cf0646d73",
            ),
        );

        Self { models }
    }

    pub fn empty() -> Self {
        Self {
            models: BTreeMap::new(),
        }
    }

    /// Adds descriptors, replacing any existing entry with the same name.
    pub fn with_models(mut self, extra: impl IntoIterator<Item = ModelDescriptor>) -> Self {
        for descriptor in extra {
            if self.models.contains_key(&descriptor.name) {
                warn!(model = %descriptor.name, "Configured model replaces catalog entry");
            }
            self.models.insert(descriptor.name.clone(), descriptor);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&ModelDescriptor> {
        self.models.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&ModelDescriptor> {
        self.get(name).ok_or_else(|| Error::NotFound {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
