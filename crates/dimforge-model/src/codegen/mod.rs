//! Dialect-specific code generation for a finished [`StarSchema`].
//!
//! Output pieces:
//! - `ddl`: ordered DROP / CREATE / INDEX / VIEW statements (dimensions always before the fact)
//! - `dml`: sample `INSERT` blocks per table, from sample rows or deterministic placeholders
//! - `etl`: `load_<table>` templates reading from `stg_<source>` staging tables
//!
//! Date dimensions also get calendar columns, computed by `calendar` both as
//! dialect SQL (ETL) and as literal values (DML).

mod calendar;
mod ddl;
mod dml;
mod etl;

use crate::dialect::Dialect;
use crate::error::GenerationError;
use crate::star::{ModelColumn, StarSchema};
use dimforge_ingest_sql::{SampleRows, SemanticType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use dml::render_literal;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodegenOptions {
    pub dialect: Dialect,
    pub include_indexes: bool,
    pub include_partitioning: bool,
    pub include_views: bool,
    pub include_etl_templates: bool,
    /// Rows synthesized per table when no sample rows are available.
    pub placeholder_rows: usize,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            include_indexes: true,
            include_partitioning: false,
            include_views: true,
            include_etl_templates: true,
            placeholder_rows: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCode {
    pub ddl_statements: Vec<String>,
    /// Table name -> INSERT block.
    pub dml_statements: BTreeMap<String, String>,
    /// Tables in the order their DML must run: dimensions first, then the fact.
    pub load_order: Vec<String>,
    /// `load_<table>` -> staging-to-warehouse SQL.
    pub etl_templates: BTreeMap<String, String>,
    pub warnings: Vec<String>,
}

pub struct DialectCodeGenerator {
    options: CodegenOptions,
}

impl DialectCodeGenerator {
    pub fn new(options: CodegenOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    pub fn generate(
        &self,
        schema: &StarSchema,
        samples: &SampleRows,
    ) -> Result<GeneratedCode, GenerationError> {
        let mut warnings = Vec::new();
        let ddl_statements = ddl::statements(schema, &self.options, &mut warnings)?;
        let dml_statements = dml::blocks(schema, samples, &self.options)?;
        let load_order = schema
            .dimension_tables
            .iter()
            .map(|d| d.name.clone())
            .chain(std::iter::once(schema.fact_table.name.clone()))
            .collect();
        let etl_templates = if self.options.include_etl_templates {
            etl::templates(schema, self.options.dialect)?
        } else {
            BTreeMap::new()
        };
        let out = GeneratedCode {
            ddl_statements,
            dml_statements,
            load_order,
            etl_templates,
            warnings,
        };
        tracing::debug!(
            dialect = %self.options.dialect,
            ddl = out.ddl_statements.len(),
            dml = out.dml_statements.len(),
            etl = out.etl_templates.len(),
            "generated code"
        );
        Ok(out)
    }
}

// ============================================================================
// Type mapping
// ============================================================================

/// Column type for `ty` in `dialect`. `None` when the type has no mapping and
/// the dialect's generic text type should stand in.
pub fn sql_type(dialect: Dialect, ty: &SemanticType) -> Option<String> {
    let mapped = match ty {
        SemanticType::Integer => match dialect {
            Dialect::Mysql | Dialect::Sqlserver => "INT".to_string(),
            _ => "INTEGER".to_string(),
        },
        SemanticType::Decimal { precision, scale } => {
            let p = precision.unwrap_or(18);
            let s = match (precision, scale) {
                (None, _) => 2,
                (Some(_), None) => 0,
                (Some(_), Some(s)) => *s,
            };
            match dialect {
                Dialect::Postgresql | Dialect::Sqlite => format!("NUMERIC({p},{s})"),
                _ => format!("DECIMAL({p},{s})"),
            }
        }
        SemanticType::Text { max_length } => text_type(dialect, *max_length),
        SemanticType::Date => "DATE".to_string(),
        SemanticType::Timestamp => match dialect {
            Dialect::Mysql => "DATETIME".to_string(),
            Dialect::Sqlserver => "DATETIME2".to_string(),
            _ => "TIMESTAMP".to_string(),
        },
        SemanticType::Boolean => match dialect {
            Dialect::Sqlserver => "BIT".to_string(),
            _ => "BOOLEAN".to_string(),
        },
        SemanticType::Other { .. } => return None,
    };
    Some(mapped)
}

fn text_type(dialect: Dialect, max_length: Option<u32>) -> String {
    match (dialect, max_length) {
        (Dialect::Sqlite, _) => "TEXT".to_string(),
        (Dialect::Postgresql, Some(n)) => format!("VARCHAR({n})"),
        (Dialect::Postgresql, None) => "TEXT".to_string(),
        (Dialect::Sqlserver, n) => format!("NVARCHAR({})", n.unwrap_or(255)),
        (_, n) => format!("VARCHAR({})", n.unwrap_or(255)),
    }
}

/// Mapped type, falling back to the generic text type with a warning.
fn column_type(
    dialect: Dialect,
    table: &str,
    column: &ModelColumn,
    warnings: &mut Vec<String>,
) -> String {
    match sql_type(dialect, &column.semantic_type) {
        Some(t) => t,
        None => {
            let fallback = text_type(dialect, None);
            let message = format!(
                "{table}.{}: no {dialect} mapping for type `{}`; using {fallback}",
                column.name, column.semantic_type
            );
            tracing::warn!("{message}");
            warnings.push(message);
            fallback
        }
    }
}

/// Column definition for a dimension's surrogate key.
fn surrogate_key_definition(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Postgresql => "SERIAL PRIMARY KEY",
        Dialect::Mysql => "INT NOT NULL AUTO_INCREMENT PRIMARY KEY",
        Dialect::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        Dialect::Sqlserver => "INT IDENTITY(1,1) PRIMARY KEY",
        Dialect::Ansi => "INTEGER GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY",
    }
}

pub(crate) fn staging_table(source: &str) -> String {
    format!("stg_{source}")
}

fn quoted_list<'a>(dialect: Dialect, names: impl IntoIterator<Item = &'a str>) -> String {
    names
        .into_iter()
        .map(|n| dialect.quote(n))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_map_per_dialect() {
        let money = SemanticType::Decimal {
            precision: Some(10),
            scale: Some(2),
        };
        assert_eq!(sql_type(Dialect::Postgresql, &money).unwrap(), "NUMERIC(10,2)");
        assert_eq!(sql_type(Dialect::Mysql, &money).unwrap(), "DECIMAL(10,2)");
        assert_eq!(
            sql_type(Dialect::Mysql, &SemanticType::Decimal { precision: None, scale: None }).unwrap(),
            "DECIMAL(18,2)"
        );

        let name = SemanticType::Text { max_length: Some(80) };
        assert_eq!(sql_type(Dialect::Postgresql, &name).unwrap(), "VARCHAR(80)");
        assert_eq!(sql_type(Dialect::Sqlite, &name).unwrap(), "TEXT");
        assert_eq!(sql_type(Dialect::Sqlserver, &name).unwrap(), "NVARCHAR(80)");

        assert_eq!(sql_type(Dialect::Sqlserver, &SemanticType::Boolean).unwrap(), "BIT");
        assert_eq!(sql_type(Dialect::Mysql, &SemanticType::Timestamp).unwrap(), "DATETIME");
        assert_eq!(sql_type(Dialect::Sqlserver, &SemanticType::Integer).unwrap(), "INT");
    }

    #[test]
    fn test_unmapped_type_falls_back_to_text_with_warning() {
        let column = ModelColumn::generated(
            "payload",
            SemanticType::Other {
                declared: "GEOMETRY".into(),
            },
            true,
        );
        let mut warnings = Vec::new();
        assert_eq!(
            column_type(Dialect::Mysql, "dim_x", &column, &mut warnings),
            "VARCHAR(255)"
        );
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("GEOMETRY"));
    }
}
