use std::collections::BTreeMap;
use std::sync::Arc;

use super::catalog::{self, CatalogSettings};
use super::DatasetSpec;
use crate::error::{EtlError, Result};

/// Read-only lookup of dataset contracts by key.
///
/// Built once; there is no way to register or mutate a spec afterwards, so a
/// registry can be shared across every dataset pass of a run.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    specs: BTreeMap<String, Arc<DatasetSpec>>,
    order: Vec<String>,
}

impl SchemaRegistry {
    pub fn new(specs: Vec<DatasetSpec>) -> Result<Self> {
        let mut map = BTreeMap::new();
        let mut order = Vec::with_capacity(specs.len());
        for spec in specs {
            let key = spec.key().to_string();
            if map.contains_key(&key) {
                return Err(EtlError::config(format!("dataset '{key}' registered twice")));
            }
            order.push(key.clone());
            map.insert(key, Arc::new(spec));
        }
        Ok(Self { specs: map, order })
    }

    /// Registry holding every dataset the pipeline knows how to clean
    pub fn builtin(settings: &CatalogSettings) -> Result<Self> {
        Self::new(catalog::builtin_specs(settings)?)
    }

    pub fn get(&self, key: &str) -> Result<Arc<DatasetSpec>> {
        self.specs
            .get(key)
            .cloned()
            .ok_or_else(|| EtlError::config(format!("no dataset spec registered for '{key}'")))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.specs.contains_key(key)
    }

    /// Keys in registration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DatasetSpec>> {
        self.order.iter().filter_map(|k| self.specs.get(k))
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::schema::ColumnSpec;

    fn spec(key: &str) -> DatasetSpec {
        DatasetSpec::builder(key, key)
            .column(ColumnSpec::categorical("name"))
            .build()
            .unwrap()
    }

    #[test]
    fn unknown_key_is_a_configuration_error() {
        let registry = SchemaRegistry::new(vec![spec("a")]).unwrap();
        let err = registry.get("b").unwrap_err();
        assert!(matches!(err, EtlError::Configuration(_)));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        assert!(SchemaRegistry::new(vec![spec("a"), spec("a")]).is_err());
    }

    #[test]
    fn keys_keep_registration_order() {
        let registry = SchemaRegistry::new(vec![spec("z"), spec("a")]).unwrap();
        assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["z", "a"]);
    }

    #[test]
    fn lookups_share_the_same_spec() {
        let registry = SchemaRegistry::new(vec![spec("a")]).unwrap();
        let first = registry.get("a").unwrap();
        let second = registry.get("a").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn builtin_registry_covers_every_catalog_key() {
        let registry = SchemaRegistry::builtin(&CatalogSettings::default()).unwrap();
        for key in crate::constants::builtin_dataset_keys() {
            assert!(registry.contains(key), "missing {key}");
        }
    }
}
