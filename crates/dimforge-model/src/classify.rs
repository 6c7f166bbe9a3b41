//! Column role classification.
//!
//! Each column gets a [`ColumnRole`] from an ordered list of name/type rules
//! (first match wins). An optional [`ExternalClassifier`] may propose a
//! different role; it only wins when it is strictly more confident, and any
//! failure on its side leaves the rule result in place.

use crate::error::ClassifierError;
use dimforge_ingest_sql::{Column, ForeignKey, Table, TableRegistry};
use serde::{Deserialize, Serialize};

// ============================================================================
// Core Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Measure,
    NaturalKey,
    DimensionKey,
    DimensionAttribute,
    TemporalAttribute,
    Ignored,
}

impl ColumnRole {
    /// Roles that end up as descriptive attributes of a dimension.
    pub fn is_descriptive(self) -> bool {
        matches!(self, Self::DimensionAttribute | Self::TemporalAttribute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Rule,
    External,
}

/// Confidence score (0.0 to 1.0)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Confidence(f32);

impl Confidence {
    pub fn new(c: f32) -> Self {
        if c.is_nan() {
            return Self(0.0);
        }
        Self(c.clamp(0.0, 1.0))
    }

    /// `None` for NaN or anything outside `[0, 1]`.
    pub fn checked(c: f32) -> Option<Self> {
        (c.is_finite() && (0.0..=1.0).contains(&c)).then_some(Self(c))
    }

    pub fn value(&self) -> f32 {
        self.0
    }
}

/// A column together with its inferred role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedColumn {
    pub column: Column,
    pub role: ColumnRole,
    pub confidence: Confidence,
    pub source: ClassificationSource,
    /// Temporal column whose name marks row versioning (`valid_from`, ...).
    #[serde(default)]
    pub change_tracking: bool,
    /// Numeric column classified as a measure only because it is numeric.
    #[serde(default)]
    pub low_confidence: bool,
    /// Why the external classifier's answer was not used, when it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

impl ClassifiedColumn {
    pub fn name(&self) -> &str {
        &self.column.name
    }
}

/// What an external classifier proposes for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalVerdict {
    pub role: ColumnRole,
    pub confidence: f32,
}

/// A pluggable column classifier (e.g. a language-model service).
///
/// Implementations must be synchronous from the caller's point of view and
/// should enforce their own deadline, reporting [`ClassifierError::Timeout`].
pub trait ExternalClassifier: Send + Sync {
    fn classify(
        &self,
        column: &Column,
        table: &Table,
        registry: &TableRegistry,
    ) -> Result<ExternalVerdict, ClassifierError>;
}

// ============================================================================
// Vocabulary
// ============================================================================

const MEASURE_TOKENS: &[&str] = &[
    "amount", "amt", "total", "price", "cost", "qty", "quantity", "count", "revenue", "budget",
    "sum", "avg", "average", "mean", "sales", "profit", "margin", "discount", "tax", "fee",
    "balance", "value", "weight", "score", "rate", "units", "volume", "gross", "net", "spend",
    "income", "salary", "duration", "distance", "min", "max", "earnings", "subtotal",
];

const MEASURE_PHRASES: &[&str] = &["box_office", "line_total", "unit_price"];

const TEMPORAL_TOKENS: &[&str] = &[
    "date", "time", "timestamp", "datetime", "created", "updated", "modified", "deleted", "at",
    "on", "day", "valid", "effective", "expiry", "expires", "expiration", "start", "end", "from",
    "to", "since", "until", "period", "birth", "dob", "hired", "shipped", "ordered", "born",
];

const CHANGE_TRACKING_NAMES: &[&str] = &[
    "effective_date",
    "effective_from",
    "effective_to",
    "valid_from",
    "valid_to",
    "expiry_date",
    "expiration_date",
];

/// Tokens that make a numeric column an identifier or code rather than a quantity.
const IDENTIFIER_TOKENS: &[&str] = &[
    "id", "code", "number", "num", "no", "key", "zip", "postal", "phone", "ssn", "year", "month",
    "quarter", "week",
];

/// Split an identifier into lowercase word tokens (`snake_case` and `camelCase`).
pub fn name_tokens(name: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in name.chars() {
        if c == '_' || c == '-' || c == ' ' || c == '.' {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// `snake_case` rendering of an identifier.
pub fn snake_name(name: &str) -> String {
    name_tokens(name).join("_")
}

fn has_token(tokens: &[String], vocab: &[&str]) -> bool {
    tokens.iter().any(|t| vocab.contains(&t.as_str()))
}

fn is_id_name(tokens: &[String]) -> bool {
    tokens.last().is_some_and(|t| t == "id")
}

pub fn is_measure_name(name: &str) -> bool {
    let snake = snake_name(name);
    MEASURE_PHRASES.iter().any(|p| snake.contains(p)) || has_token(&name_tokens(name), MEASURE_TOKENS)
}

pub fn is_temporal_name(name: &str) -> bool {
    has_token(&name_tokens(name), TEMPORAL_TOKENS)
}

pub fn is_change_tracking_name(name: &str) -> bool {
    CHANGE_TRACKING_NAMES.contains(&snake_name(name).as_str())
}

// ============================================================================
// Rules
// ============================================================================

fn rule(role: ColumnRole, confidence: f32, column: &Column) -> ClassifiedColumn {
    ClassifiedColumn {
        column: column.clone(),
        role,
        confidence: Confidence::new(confidence),
        source: ClassificationSource::Rule,
        change_tracking: false,
        low_confidence: false,
        fallback: None,
    }
}

/// Deterministic rule-based classification. Pure function of its inputs.
pub fn classify_by_rules(column: &Column, table: &Table, registry: &TableRegistry) -> ClassifiedColumn {
    let tokens = name_tokens(&column.name);
    let ty = &column.semantic_type;
    let followed_fk = table
        .followable_foreign_keys()
        .any(|fk: &ForeignKey| fk.column.eq_ignore_ascii_case(&column.name));

    // 1. integer surrogate-style primary key
    let id_named = column.name.eq_ignore_ascii_case("id") || is_id_name(&tokens);
    if column.is_primary_key && id_named && ty.is_integer() && !followed_fk {
        return rule(ColumnRole::NaturalKey, 0.9, column);
    }

    // 2. foreign key, or referenced by one
    if followed_fk || registry.is_referenced(&table.name, &column.name) {
        return rule(ColumnRole::DimensionKey, 0.85, column);
    }

    // 3. any other primary key column
    if column.is_primary_key {
        return rule(ColumnRole::NaturalKey, 0.7, column);
    }

    // 4. named measure
    if ty.is_numeric() && is_measure_name(&column.name) {
        return rule(ColumnRole::Measure, 0.8, column);
    }

    // 5. named temporal
    if ty.is_temporal() && is_temporal_name(&column.name) {
        let mut c = rule(ColumnRole::TemporalAttribute, 0.75, column);
        c.change_tracking = is_change_tracking_name(&column.name);
        return c;
    }

    if ty.is_binary() {
        return rule(ColumnRole::Ignored, 0.6, column);
    }

    // numeric codes, years, ids without a foreign key
    if ty.is_numeric() && has_token(&tokens, IDENTIFIER_TOKENS) {
        return rule(ColumnRole::DimensionAttribute, 0.6, column);
    }

    if ty.is_numeric() {
        let mut c = rule(ColumnRole::Measure, 0.4, column);
        c.low_confidence = true;
        return c;
    }

    rule(ColumnRole::DimensionAttribute, 0.5, column)
}

/// Rule classification, optionally overridden by a more confident external verdict.
#[derive(Clone, Copy, Default)]
pub struct ColumnClassifier<'a> {
    external: Option<&'a dyn ExternalClassifier>,
}

impl<'a> ColumnClassifier<'a> {
    pub fn new(external: Option<&'a dyn ExternalClassifier>) -> Self {
        Self { external }
    }

    pub fn rules_only() -> Self {
        Self { external: None }
    }

    pub fn with_external(external: &'a dyn ExternalClassifier) -> Self {
        Self {
            external: Some(external),
        }
    }

    pub fn classify(&self, column: &Column, table: &Table, registry: &TableRegistry) -> ClassifiedColumn {
        let mut ruled = classify_by_rules(column, table, registry);
        let Some(external) = self.external else {
            tracing::debug!(table = %table.name, column = %column.name, role = ?ruled.role, "classified by rules");
            return ruled;
        };

        let verdict = external
            .classify(column, table, registry)
            .and_then(|v| match Confidence::checked(v.confidence) {
                Some(confidence) => Ok((v.role, confidence)),
                None => Err(ClassifierError::Malformed(format!(
                    "confidence {} outside [0, 1]",
                    v.confidence
                ))),
            });

        match verdict {
            Ok((role, confidence)) if confidence > ruled.confidence => {
                tracing::debug!(table = %table.name, column = %column.name, ?role, confidence = confidence.value(), "external classification accepted");
                ClassifiedColumn {
                    column: column.clone(),
                    role,
                    confidence,
                    source: ClassificationSource::External,
                    change_tracking: role == ColumnRole::TemporalAttribute
                        && is_change_tracking_name(&column.name),
                    low_confidence: false,
                    fallback: None,
                }
            }
            Ok((role, confidence)) => {
                tracing::info!(table = %table.name, column = %column.name, ?role, confidence = confidence.value(), "external classification below rule confidence; keeping rule result");
                ruled
            }
            Err(err) => {
                tracing::info!(table = %table.name, column = %column.name, error = %err, "external classifier failed; keeping rule result");
                ruled.fallback = Some(err.to_string());
                ruled
            }
        }
    }

    pub fn classify_table(&self, table: &Table, registry: &TableRegistry) -> ClassifiedTable {
        ClassifiedTable {
            table: table.clone(),
            columns: table
                .columns
                .iter()
                .map(|c| self.classify(c, table, registry))
                .collect(),
        }
    }

    /// Classify every table, in declaration order.
    pub fn classify_registry(&self, registry: &TableRegistry) -> Vec<ClassifiedTable> {
        registry
            .iter()
            .map(|t| self.classify_table(t, registry))
            .collect()
    }
}

/// A table with one [`ClassifiedColumn`] per column, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedTable {
    pub table: Table,
    pub columns: Vec<ClassifiedColumn>,
}

impl ClassifiedTable {
    pub fn name(&self) -> &str {
        &self.table.name
    }

    pub fn column(&self, name: &str) -> Option<&ClassifiedColumn> {
        self.columns.iter().find(|c| c.column.is_named(name))
    }

    pub fn with_role(&self, role: ColumnRole) -> impl Iterator<Item = &ClassifiedColumn> {
        self.columns.iter().filter(move |c| c.role == role)
    }

    pub fn measure_count(&self) -> usize {
        self.with_role(ColumnRole::Measure).count()
    }
}
