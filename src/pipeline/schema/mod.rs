//! Declarative per-dataset contracts.
//!
//! A [`DatasetSpec`] is built once at startup through [`DatasetSpecBuilder`] and never
//! mutated afterwards: every field is private and only readable through accessors.
//! The [`SchemaRegistry`] hands out shared, read-only specs to each pipeline pass.

pub mod catalog;
pub mod registry;

use serde::Serialize;

use crate::domain::SemanticType;
use crate::error::{EtlError, Result};

pub use catalog::CatalogSettings;
pub use registry::SchemaRegistry;

/// Legal-value contract for a column
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    AllowedValues(Vec<String>),
    Range { min: Option<f64>, max: Option<f64> },
}

/// Extra normalization applied while coercing a raw value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoercionHint {
    Plain,
    /// `SAN ANDREAS` -> `San Andreas`
    TitleCase,
    /// Numeric-looking identifiers are rendered as integers and left-padded with zeros
    ZeroPad(usize),
    /// `45.2%` -> 45.2
    StripPercent,
    /// `5.2%` -> 0.052
    PercentAsFraction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSpec {
    name: String,
    kind: SemanticType,
    nullable: bool,
    required: bool,
    derived: bool,
    aliases: Vec<String>,
    constraint: Option<Constraint>,
    coercion: CoercionHint,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: SemanticType) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
            required: true,
            derived: false,
            aliases: Vec::new(),
            constraint: None,
            coercion: CoercionHint::Plain,
        }
    }

    pub fn categorical(name: impl Into<String>) -> Self {
        Self::new(name, SemanticType::Categorical)
    }

    pub fn numeric(name: impl Into<String>) -> Self {
        Self::new(name, SemanticType::Numeric)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, SemanticType::Integer)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, SemanticType::Date)
    }

    pub fn identifier(name: impl Into<String>) -> Self {
        Self::new(name, SemanticType::Identifier)
    }

    pub fn flag(name: impl Into<String>) -> Self {
        Self::new(name, SemanticType::Flag)
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// The raw column may be absent; it is then filled with missing markers
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Computed by the cleaning strategy rather than read from the raw frame
    pub fn derived(mut self) -> Self {
        self.derived = true;
        self.required = false;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn allowed(mut self, values: &[&str]) -> Self {
        self.constraint = Some(Constraint::AllowedValues(
            values.iter().map(|v| v.to_string()).collect(),
        ));
        self
    }

    pub fn range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.constraint = Some(Constraint::Range { min, max });
        self
    }

    pub fn non_negative(self) -> Self {
        self.range(Some(0.0), None)
    }

    pub fn coerce(mut self, hint: CoercionHint) -> Self {
        self.coercion = hint;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SemanticType {
        self.kind
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn is_derived(&self) -> bool {
        self.derived
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn constraint(&self) -> Option<&Constraint> {
        self.constraint.as_ref()
    }

    pub fn coercion(&self) -> CoercionHint {
        self.coercion
    }
}

/// County scoping: which column carries geography, the county to keep, and
/// the labels that mark statewide comparison rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeographyScope {
    pub column: String,
    pub target_county: String,
    pub statewide_markers: Vec<String>,
}

/// Rows whose `column` equals one of `values` are rollup totals, not observations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupSentinel {
    pub column: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    Mean,
}

/// Labels starting with `prefix` (case-insensitive) collapse onto `canonical`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalLabel {
    pub prefix: String,
    pub canonical: String,
}

impl CanonicalLabel {
    pub fn new(prefix: impl Into<String>, canonical: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            canonical: canonical.into(),
        }
    }
}

/// Merge rows that differ only by trivial category naming.
/// Rows are grouped by every non-measure column, with the category canonicalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DedupRule {
    pub category_column: String,
    pub canonical_labels: Vec<CanonicalLabel>,
    pub measures: Vec<(String, Aggregation)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSpec {
    key: String,
    label: String,
    rule: String,
    notes: String,
    columns: Vec<ColumnSpec>,
    geography: Option<GeographyScope>,
    rollups: Vec<RollupSentinel>,
    dedup: Option<DedupRule>,
    sort_key: Vec<String>,
}

impl DatasetSpec {
    pub fn builder(key: impl Into<String>, label: impl Into<String>) -> DatasetSpecBuilder {
        DatasetSpecBuilder::new(key, label)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Reference into the cleaning registry
    pub fn rule(&self) -> &str {
        &self.rule
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Columns read from the raw frame, in declaration order
    pub fn source_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| !c.derived)
    }

    pub fn derived_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| c.derived)
    }

    pub fn geography(&self) -> Option<&GeographyScope> {
        self.geography.as_ref()
    }

    pub fn rollups(&self) -> &[RollupSentinel] {
        &self.rollups
    }

    pub fn dedup(&self) -> Option<&DedupRule> {
        self.dedup.as_ref()
    }

    pub fn sort_key(&self) -> &[String] {
        &self.sort_key
    }
}

pub struct DatasetSpecBuilder {
    spec: DatasetSpec,
}

impl DatasetSpecBuilder {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            spec: DatasetSpec {
                key: key.into(),
                label: label.into(),
                rule: crate::constants::RULE_STANDARD.to_string(),
                notes: String::new(),
                columns: Vec::new(),
                geography: None,
                rollups: Vec::new(),
                dedup: None,
                sort_key: Vec::new(),
            },
        }
    }

    pub fn rule(mut self, rule: impl Into<String>) -> Self {
        self.spec.rule = rule.into();
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.spec.notes = notes.into();
        self
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.spec.columns.push(column);
        self
    }

    pub fn columns(mut self, columns: impl IntoIterator<Item = ColumnSpec>) -> Self {
        self.spec.columns.extend(columns);
        self
    }

    pub fn geography(mut self, column: &str, target_county: &str, statewide_markers: &[&str]) -> Self {
        self.spec.geography = Some(GeographyScope {
            column: column.to_string(),
            target_county: target_county.to_string(),
            statewide_markers: statewide_markers.iter().map(|m| m.to_string()).collect(),
        });
        self
    }

    /// Append statewide markers to an already declared geography scope
    pub fn extra_statewide_markers(mut self, markers: &[String]) -> Self {
        if let Some(geo) = self.spec.geography.as_mut() {
            for marker in markers {
                if !geo.statewide_markers.iter().any(|m| m.eq_ignore_ascii_case(marker)) {
                    geo.statewide_markers.push(marker.clone());
                }
            }
        }
        self
    }

    pub fn rollup(mut self, column: &str, values: &[&str]) -> Self {
        self.spec.rollups.push(RollupSentinel {
            column: column.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        });
        self
    }

    /// Replace every rollup sentinel with the given configuration
    pub fn rollups(mut self, rollups: Vec<RollupSentinel>) -> Self {
        self.spec.rollups = rollups;
        self
    }

    pub fn dedup(mut self, rule: DedupRule) -> Self {
        self.spec.dedup = Some(rule);
        self
    }

    pub fn sort_by(mut self, columns: &[&str]) -> Self {
        self.spec.sort_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn key(&self) -> &str {
        &self.spec.key
    }

    pub fn build(self) -> Result<DatasetSpec> {
        let spec = self.spec;
        let key = spec.key.clone();
        let fail = |msg: String| EtlError::config(format!("dataset '{key}': {msg}"));

        if spec.key.trim().is_empty() {
            return Err(EtlError::config("dataset key must not be empty"));
        }
        if spec.columns.is_empty() {
            return Err(fail("no columns declared".into()));
        }
        for (i, column) in spec.columns.iter().enumerate() {
            if spec.columns[..i].iter().any(|c| c.name == column.name) {
                return Err(fail(format!("column '{}' declared twice", column.name)));
            }
        }

        let categorical = |name: &str| -> Result<()> {
            match spec.column(name) {
                None => Err(fail(format!("references undeclared column '{name}'"))),
                Some(c) if c.kind != SemanticType::Categorical => {
                    Err(fail(format!("column '{name}' must be categorical")))
                }
                Some(_) => Ok(()),
            }
        };

        if let Some(geo) = &spec.geography {
            categorical(&geo.column)?;
            let target = geo.target_county.trim();
            if target.is_empty() {
                return Err(fail("geography scope has an empty target county".into()));
            }
            let county_form = format!("{target} County");
            for marker in &geo.statewide_markers {
                if marker.eq_ignore_ascii_case(target) || marker.eq_ignore_ascii_case(&county_form) {
                    return Err(fail(format!(
                        "statewide marker '{marker}' collides with target county '{target}'"
                    )));
                }
            }
        }

        for rollup in &spec.rollups {
            categorical(&rollup.column)?;
        }

        if let Some(dedup) = &spec.dedup {
            categorical(&dedup.category_column)?;
            if dedup.measures.is_empty() {
                return Err(fail("dedup rule declares no measures".into()));
            }
            for (measure, _) in &dedup.measures {
                match spec.column(measure) {
                    Some(c) if c.kind.is_numeric() => {}
                    Some(_) => return Err(fail(format!("dedup measure '{measure}' must be numeric"))),
                    None => return Err(fail(format!("references undeclared column '{measure}'"))),
                }
            }
        }

        for name in &spec.sort_key {
            if spec.column(name).is_none() {
                return Err(fail(format!("sort key references undeclared column '{name}'")));
            }
        }

        Ok(spec)
    }
}
