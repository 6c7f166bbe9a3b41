//! Star-schema object graph.
//!
//! Two stages share these types:
//! - [`DraftModel`]: what the builder decides (fact, dimensions, groupings), no keys yet
//! - [`StarSchema`]: the final model after key assignment; never mutated afterwards

use crate::naming::UniqueNames;
use chrono::{DateTime, Utc};
use dimforge_ingest_sql::{ColumnRef, SemanticType};
use serde::{Deserialize, Serialize};

// ============================================================================
// Shared pieces
// ============================================================================

/// A column of a generated table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelColumn {
    pub name: String,
    pub semantic_type: SemanticType,
    pub nullable: bool,
    /// Source column this one is loaded from; `None` for generated columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ColumnRef>,
}

impl ModelColumn {
    pub fn generated(name: impl Into<String>, semantic_type: SemanticType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            nullable,
            source: None,
        }
    }

    pub fn from_source(
        name: impl Into<String>,
        semantic_type: SemanticType,
        nullable: bool,
        source: ColumnRef,
    ) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            nullable,
            source: Some(source),
        }
    }

    /// Staging-side column name: the source column when there is one.
    pub fn source_column(&self) -> &str {
        self.source
            .as_ref()
            .map(|s| s.column.as_str())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ScdType {
    /// Overwrite in place.
    #[default]
    Type1,
    /// Versioned rows with effective/end dates and a current flag.
    Type2,
}

impl From<ScdType> for u8 {
    fn from(value: ScdType) -> Self {
        match value {
            ScdType::Type1 => 1,
            ScdType::Type2 => 2,
        }
    }
}

impl TryFrom<u8> for ScdType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Type1),
            2 => Ok(Self::Type2),
            other => Err(format!("unsupported SCD type {other} (expected 1 or 2)")),
        }
    }
}

/// Where a dimension's rows come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DimensionSource {
    /// A normalized source table referenced by the fact.
    Table { table: String },
    /// A group of columns carved out of the fact's own (flat) source table.
    Synthetic { parent: String, group: String },
}

impl DimensionSource {
    /// Source (or parent) table the dimension is loaded from.
    pub fn table(&self) -> &str {
        match self {
            Self::Table { table } => table,
            Self::Synthetic { parent, .. } => parent,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, Self::Synthetic { .. })
    }
}

/// Business identifier of a dimension row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NaturalKey {
    /// Key columns taken from the source table (composite when more than one).
    Source { columns: Vec<ModelColumn> },
    /// A newly introduced row number for synthetic groups.
    Positional { column: ModelColumn },
}

impl NaturalKey {
    pub fn columns(&self) -> Vec<&ModelColumn> {
        match self {
            Self::Source { columns } => columns.iter().collect(),
            Self::Positional { column } => vec![column],
        }
    }

    pub fn columns_mut(&mut self) -> Vec<&mut ModelColumn> {
        match self {
            Self::Source { columns } => columns.iter_mut().collect(),
            Self::Positional { column } => vec![column],
        }
    }

    pub fn is_positional(&self) -> bool {
        matches!(self, Self::Positional { .. })
    }
}

/// Equality used to resolve a fact row's dimension key while loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyJoin {
    /// Column of the fact's source (staging) table.
    pub fact_column: String,
    /// Column of the dimension table.
    pub dimension_column: String,
}

/// Calendar attribute derived from a date; the default column name is the snake_case part name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarPart {
    FullDate,
    /// ISO numbering: Monday = 1 ... Sunday = 7.
    DayOfWeek,
    DayName,
    MonthNumber,
    MonthName,
    Quarter,
    Year,
    IsWeekend,
}

impl CalendarPart {
    pub const ALL: [CalendarPart; 8] = [
        CalendarPart::FullDate,
        CalendarPart::DayOfWeek,
        CalendarPart::DayName,
        CalendarPart::MonthNumber,
        CalendarPart::MonthName,
        CalendarPart::Quarter,
        CalendarPart::Year,
        CalendarPart::IsWeekend,
    ];

    pub fn column_name(self) -> &'static str {
        match self {
            Self::FullDate => "full_date",
            Self::DayOfWeek => "day_of_week",
            Self::DayName => "day_name",
            Self::MonthNumber => "month_number",
            Self::MonthName => "month_name",
            Self::Quarter => "quarter",
            Self::Year => "year",
            Self::IsWeekend => "is_weekend",
        }
    }

    pub fn semantic_type(self) -> SemanticType {
        match self {
            Self::FullDate => SemanticType::Date,
            Self::DayName | Self::MonthName => SemanticType::Text {
                max_length: Some(10),
            },
            Self::IsWeekend => SemanticType::Boolean,
            Self::DayOfWeek | Self::MonthNumber | Self::Quarter | Self::Year => SemanticType::Integer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarColumn {
    pub part: CalendarPart,
    pub column: ModelColumn,
}

/// Calendar attributes of a date dimension, all computed from one of its date attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calendar {
    /// Dimension attribute the parts are derived from.
    pub date_column: String,
    pub columns: Vec<CalendarColumn>,
}

impl Calendar {
    /// Every part, named through `names` so none clashes with an existing column.
    pub fn derived_from(date_column: impl Into<String>, names: &mut UniqueNames) -> Self {
        let columns = CalendarPart::ALL
            .into_iter()
            .map(|part| CalendarColumn {
                part,
                column: ModelColumn::generated(
                    names.allocate(part.column_name()),
                    part.semantic_type(),
                    true,
                ),
            })
            .collect();
        Self {
            date_column: date_column.into(),
            columns,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelingApproach {
    /// Dimensions follow the source's foreign keys.
    Normalized,
    /// Dimensions were synthesized from a flat table.
    Denormalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RelationshipType {
    #[default]
    #[serde(rename = "many-to-one")]
    ManyToOne,
}

// ============================================================================
// Draft (pre-keys)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DraftDimension {
    pub name: String,
    pub source: DimensionSource,
    pub natural_key: NaturalKey,
    pub attributes: Vec<ModelColumn>,
    pub calendar: Option<Calendar>,
    pub scd_type: ScdType,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DraftDimensionKey {
    /// Base for the fact column name (`<stem>_key`).
    pub stem: String,
    /// Name of the referenced [`DraftDimension`].
    pub dimension: String,
    pub joins: Vec<KeyJoin>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DraftFact {
    pub name: String,
    pub source_table: String,
    pub measures: Vec<ModelColumn>,
    pub dimension_keys: Vec<DraftDimensionKey>,
    pub degenerate_attributes: Vec<ModelColumn>,
    pub partition_column: Option<String>,
    pub grain: String,
    pub description: String,
}

/// Output of the builder: every modeling decision made, no keys assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftModel {
    pub name: String,
    pub fact: DraftFact,
    pub dimensions: Vec<DraftDimension>,
    pub approach: ModelingApproach,
    pub source_table_count: usize,
    pub warnings: Vec<String>,
}

// ============================================================================
// Final model
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionTableSpec {
    pub name: String,
    pub source: DimensionSource,
    pub surrogate_key: ModelColumn,
    pub natural_key: NaturalKey,
    pub attributes: Vec<ModelColumn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar: Option<Calendar>,
    /// `effective_date`, `end_date`, `is_current` for Type 2; empty for Type 1.
    #[serde(default)]
    pub history_columns: Vec<ModelColumn>,
    pub scd_type: ScdType,
    pub description: String,
}

impl DimensionTableSpec {
    /// Every column in table order.
    pub fn columns(&self) -> Vec<&ModelColumn> {
        let mut out = vec![&self.surrogate_key];
        out.extend(self.natural_key.columns());
        out.extend(self.attributes.iter());
        out.extend(self.calendar_columns());
        out.extend(self.history_columns.iter());
        out
    }

    pub fn calendar_columns(&self) -> impl Iterator<Item = &ModelColumn> {
        self.calendar.iter().flat_map(|c| c.columns.iter().map(|cc| &cc.column))
    }

    pub fn column(&self, name: &str) -> Option<&ModelColumn> {
        self.columns()
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Columns loaded from the source (natural key and attributes); calendar
    /// and history columns are computed while loading.
    pub fn business_columns(&self) -> Vec<&ModelColumn> {
        let mut out = self.natural_key.columns();
        out.extend(self.attributes.iter());
        out
    }

    pub fn history_column(&self, name: &str) -> Option<&ModelColumn> {
        self.history_columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionKey {
    pub column: ModelColumn,
    pub dimension: String,
    pub joins: Vec<KeyJoin>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactTableSpec {
    pub name: String,
    pub source_table: String,
    pub measures: Vec<ModelColumn>,
    pub dimension_keys: Vec<DimensionKey>,
    #[serde(default)]
    pub degenerate_attributes: Vec<ModelColumn>,
    #[serde(default)]
    pub partition_column: Option<String>,
    pub grain: String,
    pub description: String,
}

impl FactTableSpec {
    /// Every column in table order: keys, degenerate attributes, measures.
    pub fn columns(&self) -> Vec<&ModelColumn> {
        let mut out: Vec<&ModelColumn> = self.dimension_keys.iter().map(|k| &k.column).collect();
        out.extend(self.degenerate_attributes.iter());
        out.extend(self.measures.iter());
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    #[serde(default)]
    pub relationship_type: RelationshipType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub created_at: DateTime<Utc>,
    pub modeling_approach: ModelingApproach,
    pub source_table_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarSchema {
    pub name: String,
    pub fact_table: FactTableSpec,
    pub dimension_tables: Vec<DimensionTableSpec>,
    pub relationships: Vec<Relationship>,
    pub metadata: ModelMetadata,
}

impl StarSchema {
    pub fn dimension(&self, name: &str) -> Option<&DimensionTableSpec> {
        self.dimension_tables
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    pub fn scd2_count(&self) -> usize {
        self.dimension_tables
            .iter()
            .filter(|d| d.scd_type == ScdType::Type2)
            .count()
    }
}
