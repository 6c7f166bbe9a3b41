//! SQL schema discovery for dimforge
//!
//! Turns DDL text into a table graph the modeling crate can reason about:
//! - `CREATE TABLE` -> [`Table`] with ordered [`Column`]s
//! - inline / table-level `PRIMARY KEY` and `FOREIGN KEY` -> key flags and [`ForeignKey`] edges
//! - `ALTER TABLE ... ADD COLUMN | ADD CONSTRAINT` -> mutations (deferred when out of order)
//! - `INSERT INTO ... VALUES` -> [`SampleRows`]
//!
//! Malformed statements never abort the analysis; they are recorded as
//! [`StatementDiagnostic`]s. Only a script yielding zero tables is fatal.

mod analyzer;
mod samples;
mod statements;
mod types;

pub use analyzer::{parse_sql_ddl, parse_sql_ddl_with, AnalyzerOptions, SchemaAnalyzer};
pub use samples::{SampleRow, SampleRows, SampleValue};
pub use statements::{split_statements, RawStatement};
pub use types::{SemanticType, TypeFamily};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// Errors
// ============================================================================

/// A per-statement problem. Recovered locally: the statement (or the offending
/// part of it) is skipped and analysis continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseError {
    #[error("statement {ordinal}: {message}")]
    Syntax { ordinal: usize, message: String },

    #[error("statement {ordinal}: ALTER TABLE on unknown table `{table}`")]
    UnknownTable { ordinal: usize, table: String },

    #[error("statement {ordinal}: unknown column `{column}` on table `{table}`")]
    UnknownColumn {
        ordinal: usize,
        table: String,
        column: String,
    },

    #[error("statement {ordinal}: CREATE TABLE `{table}` declares no columns")]
    NoColumns { ordinal: usize, table: String },

    #[error("statement {ordinal} is empty")]
    EmptyStatement { ordinal: usize },
}

impl ParseError {
    pub fn ordinal(&self) -> usize {
        match self {
            Self::Syntax { ordinal, .. }
            | Self::UnknownTable { ordinal, .. }
            | Self::UnknownColumn { ordinal, .. }
            | Self::NoColumns { ordinal, .. }
            | Self::EmptyStatement { ordinal } => *ordinal,
        }
    }
}

/// Fatal analysis failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalyzeError {
    #[error("no tables could be parsed from {statements} statement(s) ({skipped} skipped)")]
    NoTables { statements: usize, skipped: usize },
}

// ============================================================================
// Table graph
// ============================================================================

/// A `table.column` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Unquoted name with its original casing.
    pub name: String,
    /// Declared type as written (normalized spacing).
    pub data_type: String,
    pub semantic_type: SemanticType,
    pub nullable: bool,
    pub default: Option<String>,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub references: Option<ColumnRef>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            semantic_type: SemanticType::from_declared(&data_type),
            data_type,
            nullable: true,
            default: None,
            is_primary_key: false,
            is_foreign_key: false,
            references: None,
        }
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// A foreign-key edge `column -> references`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub references: ColumnRef,
    /// Set on the edge that closes a reference cycle (self-references included).
    /// Such edges are kept for display but are not followed when modeling.
    #[serde(default)]
    pub closes_cycle: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    /// Declaration order.
    pub columns: Vec<Column>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.is_named(name))
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.is_named(name))
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.is_named(column))
    }

    /// Append a column, replacing an existing one of the same name in place.
    /// Returns true when a column was replaced.
    pub fn upsert_column(&mut self, column: Column) -> bool {
        match self.position(&column.name) {
            Some(idx) => {
                self.columns[idx] = column;
                true
            }
            None => {
                self.columns.push(column);
                false
            }
        }
    }

    /// Mark `columns` as the primary key. Unknown columns are returned as `Err`.
    pub fn set_primary_key(&mut self, columns: &[String]) -> Result<(), String> {
        if let Some(missing) = columns.iter().find(|c| self.column(c).is_none()) {
            return Err(missing.clone());
        }
        for col in &mut self.columns {
            col.is_primary_key = false;
        }
        let mut pk = Vec::with_capacity(columns.len());
        for name in columns {
            if let Some(col) = self.column_mut(name) {
                col.is_primary_key = true;
                col.nullable = false;
                pk.push(col.name.clone());
            }
        }
        self.primary_key = pk;
        Ok(())
    }

    /// Register `column -> references`. An empty `references.column` is resolved
    /// to the target's primary key once the whole script has been read.
    pub fn add_foreign_key(&mut self, column: &str, references: ColumnRef) -> Result<(), String> {
        let Some(col) = self.column_mut(column) else {
            return Err(column.to_string());
        };
        col.is_foreign_key = true;
        col.references = Some(references.clone());
        let name = col.name.clone();
        self.foreign_keys.retain(|fk| !fk.column.eq_ignore_ascii_case(&name));
        self.foreign_keys.push(ForeignKey {
            column: name,
            references,
            closes_cycle: false,
        });
        Ok(())
    }

    /// Foreign keys the modeling layer may follow (cycle-closing edges excluded).
    pub fn followable_foreign_keys(&self) -> impl Iterator<Item = &ForeignKey> {
        self.foreign_keys.iter().filter(|fk| !fk.closes_cycle)
    }

    /// Distinct referenced tables (lowercased), in first-reference order.
    pub fn referenced_tables(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for fk in self.followable_foreign_keys() {
            let key = fk.references.table.to_ascii_lowercase();
            if !out.contains(&key) {
                out.push(key);
            }
        }
        out
    }
}

/// Tables by canonical (case-insensitive) name, in declaration order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableRegistry {
    tables: Vec<Table>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.position(name).map(|i| &self.tables[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.position(name).map(|i| &mut self.tables[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_ascii_lowercase())
    }

    /// Declaration position of `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(&name.to_ascii_lowercase()).copied()
    }

    /// Insert a table. A redeclared table replaces the earlier one in place
    /// (keeping its declaration position); returns true in that case.
    pub fn insert(&mut self, table: Table) -> bool {
        let key = table.name.to_ascii_lowercase();
        match self.index.get(&key) {
            Some(&idx) => {
                self.tables[idx] = table;
                true
            }
            None => {
                self.index.insert(key, self.tables.len());
                self.tables.push(table);
                false
            }
        }
    }

    pub fn has_foreign_keys(&self) -> bool {
        self.tables
            .iter()
            .any(|t| t.followable_foreign_keys().next().is_some())
    }

    /// Whether any other table's foreign key points at `table.column`.
    pub fn is_referenced(&self, table: &str, column: &str) -> bool {
        self.tables.iter().any(|t| {
            !t.name.eq_ignore_ascii_case(table)
                && t.followable_foreign_keys().any(|fk| {
                    fk.references.table.eq_ignore_ascii_case(table)
                        && fk.references.column.eq_ignore_ascii_case(column)
                })
        })
    }

    pub(crate) fn tables_mut(&mut self) -> &mut [Table] {
        &mut self.tables
    }
}

// ============================================================================
// Analysis result
// ============================================================================

/// A statement that was skipped (or partially applied) and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementDiagnostic {
    pub ordinal: usize,
    pub preview: String,
    pub error: ParseError,
}

impl fmt::Display for StatementDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.error, self.preview)
    }
}

/// Everything learned from one DDL script.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaAnalysis {
    pub registry: TableRegistry,
    pub samples: SampleRows,
    pub diagnostics: Vec<StatementDiagnostic>,
    pub warnings: Vec<String>,
    pub statement_count: usize,
}
