//! Engine configuration.

use crate::dialect::Dialect;
use dimforge_ingest_sql::AnalyzerOptions;
use serde::{Deserialize, Serialize};

/// Defaults applied when a request leaves a field unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_model_name: String,
    pub default_dialect: Dialect,
    pub include_indexes: bool,
    pub include_partitioning: bool,
    /// Placeholder rows synthesized per table when no sample rows exist.
    pub placeholder_rows: usize,
    /// Rows kept per table from `INSERT` statements in the input.
    pub max_sample_rows: usize,
    /// Retry passes over out-of-order `ALTER TABLE` statements.
    pub max_alter_passes: usize,
    pub include_views: bool,
    pub include_etl_templates: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_model_name: "DataWarehouse".to_string(),
            default_dialect: Dialect::Postgresql,
            include_indexes: true,
            include_partitioning: false,
            placeholder_rows: 5,
            max_sample_rows: 20,
            max_alter_passes: 8,
            include_views: true,
            include_etl_templates: true,
        }
    }
}

impl EngineConfig {
    pub fn analyzer_options(&self) -> AnalyzerOptions {
        AnalyzerOptions {
            max_alter_passes: self.max_alter_passes,
            max_sample_rows: self.max_sample_rows,
        }
    }
}
