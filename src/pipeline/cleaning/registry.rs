use std::collections::HashMap;

use super::strategies;
use super::CleaningStrategy;
use crate::domain::{CleanFrame, RawFrame};
use crate::error::{EtlError, Result};
use crate::pipeline::schema::{DatasetSpec, SchemaRegistry};

/// Registry for dataset-specific cleaning strategies, keyed by rule reference
pub struct CleaningRegistry {
    strategies: HashMap<String, Box<dyn CleaningStrategy>>,
}

impl CleaningRegistry {
    /// Create a registry holding every built-in strategy
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for strategy in strategies::builtin() {
            registry.register(strategy);
        }
        registry
    }

    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Register a strategy under its own rule name, replacing any previous one
    pub fn register(&mut self, strategy: Box<dyn CleaningStrategy>) {
        self.strategies.insert(strategy.name().to_string(), strategy);
    }

    pub fn get(&self, rule: &str) -> Result<&dyn CleaningStrategy> {
        self.strategies
            .get(rule)
            .map(|s| s.as_ref())
            .ok_or_else(|| EtlError::config(format!("no cleaning strategy registered for rule '{rule}'")))
    }

    /// Clean a raw frame with the strategy its spec names
    pub fn clean(&self, raw: RawFrame, spec: &DatasetSpec) -> Result<CleanFrame> {
        self.get(spec.rule())?.clean(raw, spec)
    }

    /// Check that every spec names a registered rule and that its strategy
    /// computes each declared derived column.
    pub fn ensure_covers(&self, schemas: &SchemaRegistry) -> Result<()> {
        for spec in schemas.iter() {
            let strategy = self.get(spec.rule())?;
            for column in spec.derived_columns() {
                if !strategy.derives().iter().any(|d| *d == column.name()) {
                    return Err(EtlError::config(format!(
                        "dataset '{}' declares derived column '{}' but rule '{}' does not compute it",
                        spec.key(),
                        column.name(),
                        spec.rule()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Registered rule names, sorted
    pub fn list_rules(&self) -> Vec<&str> {
        let mut rules: Vec<&str> = self.strategies.keys().map(|k| k.as_str()).collect();
        rules.sort_unstable();
        rules
    }
}

impl Default for CleaningRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;
    use crate::pipeline::schema::{CatalogSettings, ColumnSpec};

    #[test]
    fn registry_has_built_in_strategies() {
        let registry = CleaningRegistry::new();
        let rules = registry.list_rules();
        for rule in [RULE_STANDARD, RULE_MAT_QUARTERLY, RULE_CORE_SET, RULE_SUD_FACILITIES, RULE_FOSTER_CARE, RULE_ACS_ESTIMATES] {
            assert!(rules.contains(&rule), "missing {rule}");
        }
    }

    #[test]
    fn unknown_rule_is_a_configuration_error() {
        let registry = CleaningRegistry::new();
        assert!(registry.get("pivot_everything").err().unwrap().is_fatal());
    }

    #[test]
    fn builtin_catalog_is_fully_covered() {
        let schemas = SchemaRegistry::builtin(&CatalogSettings::default()).unwrap();
        CleaningRegistry::new().ensure_covers(&schemas).unwrap();
    }

    #[test]
    fn derived_column_without_strategy_is_rejected() {
        let spec = DatasetSpec::builder("d", "d")
            .column(ColumnSpec::categorical("a"))
            .column(ColumnSpec::numeric("Mean Rate").derived())
            .build()
            .unwrap();
        let schemas = SchemaRegistry::new(vec![spec]).unwrap();
        assert!(CleaningRegistry::new().ensure_covers(&schemas).is_err());
    }

    #[test]
    fn spec_naming_unregistered_rule_is_rejected() {
        let spec = DatasetSpec::builder("d", "d")
            .rule("custom")
            .column(ColumnSpec::categorical("a"))
            .build()
            .unwrap();
        let schemas = SchemaRegistry::new(vec![spec]).unwrap();
        assert!(CleaningRegistry::empty().ensure_covers(&schemas).is_err());
    }
}
