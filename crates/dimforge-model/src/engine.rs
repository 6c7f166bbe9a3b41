//! Request/response facade over the whole pipeline.
//!
//! `ModelRequest` -> analyze -> classify -> build -> assign keys -> generate -> `ModelResponse`.
//! Every call builds its own registry and model; the engine itself only holds
//! configuration and the optional external classifier.

use crate::builder::{build_draft, select_fact};
use crate::classify::{ClassifiedTable, ColumnClassifier, ExternalClassifier};
use crate::codegen::{CodegenOptions, DialectCodeGenerator};
use crate::config::EngineConfig;
use crate::dialect::Dialect;
use crate::error::GenerationError;
use crate::keys::assign_keys;
use crate::recommend::{recommend, RecommendationReport, RecommendationRequest};
use crate::star::StarSchema;
use dimforge_ingest_sql::{parse_sql_ddl_with, AnalyzeError, SampleRows, SchemaAnalysis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelRequest {
    pub sql: String,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub dialect: Option<String>,
    #[serde(default)]
    pub include_indexes: Option<bool>,
    #[serde(default)]
    pub include_partitioning: Option<bool>,
    /// Table -> rows; replaces rows captured from `INSERT` statements per table.
    #[serde(default)]
    pub sample_rows: Option<SampleRows>,
}

impl ModelRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub star_schema: StarSchema,
    pub ddl_statements: Vec<String>,
    pub dml_statements: BTreeMap<String, String>,
    #[serde(default)]
    pub load_order: Vec<String>,
    #[serde(default)]
    pub etl_templates: BTreeMap<String, String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Parsed tables with their column roles, for inspection.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaReport {
    pub tables: Vec<ClassifiedTable>,
    pub fact_table: String,
    pub samples: SampleRows,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub version: String,
    pub dialects: Vec<Dialect>,
    pub partitioning_dialects: Vec<Dialect>,
    pub modeling_features: Vec<String>,
    pub generator_features: Vec<String>,
}

const MODELING_FEATURES: &[&str] = &[
    "star_schema",
    "scd_type_1",
    "scd_type_2",
    "synthetic_dimensions",
    "role_playing_dimensions",
    "degenerate_dimensions",
    "date_dimension",
];

const GENERATOR_FEATURES: &[&str] = &[
    "ddl",
    "indexes",
    "partitioning",
    "summary_views",
    "etl_templates",
    "sample_dml",
];

#[derive(Default)]
pub struct ModelingEngine {
    config: EngineConfig,
    classifier: Option<Box<dyn ExternalClassifier>>,
}

impl ModelingEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            classifier: None,
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn ExternalClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn classifier(&self) -> ColumnClassifier<'_> {
        ColumnClassifier::new(self.classifier.as_deref())
    }

    fn analyze_sql(&self, sql: &str) -> Result<(SchemaAnalysis, Vec<String>), GenerationError> {
        if sql.trim().is_empty() {
            return Err(GenerationError::EmptyInput);
        }
        let analysis = parse_sql_ddl_with(sql, &self.config.analyzer_options())?;
        let mut warnings: Vec<String> = analysis
            .diagnostics
            .iter()
            .map(|d| format!("statement {} skipped: {d}", d.ordinal))
            .collect();
        warnings.extend(analysis.warnings.iter().cloned());
        Ok((analysis, warnings))
    }

    fn classify(&self, analysis: &SchemaAnalysis, warnings: &mut Vec<String>) -> Vec<ClassifiedTable> {
        let tables = self.classifier().classify_registry(&analysis.registry);
        for table in &tables {
            for column in &table.columns {
                if let Some(reason) = &column.fallback {
                    warnings.push(format!(
                        "{}.{}: external classifier unavailable ({reason}); rule result kept",
                        table.name(),
                        column.name()
                    ));
                }
            }
        }
        tables
    }

    /// Run the full pipeline for one request.
    pub fn generate(&self, request: ModelRequest) -> Result<ModelResponse, GenerationError> {
        if request.sql.trim().is_empty() {
            return Err(GenerationError::EmptyInput);
        }
        let dialect = match request.dialect.as_deref() {
            Some(name) => name.parse::<Dialect>()?,
            None => self.config.default_dialect,
        };
        let model_name = request
            .model_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.config.default_model_name.clone());

        let (analysis, mut warnings) = self.analyze_sql(&request.sql)?;
        let tables = self.classify(&analysis, &mut warnings);
        let draft = build_draft(&model_name, &tables).ok_or(AnalyzeError::NoTables {
            statements: analysis.statement_count,
            skipped: analysis.diagnostics.len(),
        })?;
        warnings.extend(draft.warnings.iter().cloned());
        let star_schema = assign_keys(draft)?;

        let samples = analysis
            .samples
            .normalized()
            .merged_with(request.sample_rows.unwrap_or_default());
        let generator = DialectCodeGenerator::new(CodegenOptions {
            dialect,
            include_indexes: request.include_indexes.unwrap_or(self.config.include_indexes),
            include_partitioning: request
                .include_partitioning
                .unwrap_or(self.config.include_partitioning),
            include_views: self.config.include_views,
            include_etl_templates: self.config.include_etl_templates,
            placeholder_rows: self.config.placeholder_rows,
        });
        let code = generator.generate(&star_schema, &samples)?;
        warnings.extend(code.warnings);

        tracing::info!(
            model = %star_schema.name,
            fact = %star_schema.fact_table.name,
            dimensions = star_schema.dimension_tables.len(),
            %dialect,
            "model generated"
        );
        Ok(ModelResponse {
            star_schema,
            ddl_statements: code.ddl_statements,
            dml_statements: code.dml_statements,
            load_order: code.load_order,
            etl_templates: code.etl_templates,
            warnings,
        })
    }

    pub fn recommend(&self, request: &RecommendationRequest) -> RecommendationReport {
        recommend(&request.star_schema, request.include_partitioning)
    }

    /// Parse and classify without building a model.
    pub fn analyze(&self, sql: &str) -> Result<SchemaReport, GenerationError> {
        let (analysis, mut warnings) = self.analyze_sql(sql)?;
        let tables = self.classify(&analysis, &mut warnings);
        let fact_table = tables[select_fact(&tables)].name().to_string();
        Ok(SchemaReport {
            tables,
            fact_table,
            samples: analysis.samples,
            warnings,
        })
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            version: env!("CARGO_PKG_VERSION").to_string(),
            dialects: Dialect::ALL.to_vec(),
            partitioning_dialects: Dialect::ALL
                .into_iter()
                .filter(|d| d.supports_partitioning())
                .collect(),
            modeling_features: MODELING_FEATURES.iter().map(|s| s.to_string()).collect(),
            generator_features: GENERATOR_FEATURES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ColumnRole, ExternalVerdict};
    use crate::error::ClassifierError;
    use dimforge_ingest_sql::{Column, Table, TableRegistry};

    struct Offline;

    impl ExternalClassifier for Offline {
        fn classify(&self, _: &Column, _: &Table, _: &TableRegistry) -> Result<ExternalVerdict, ClassifierError> {
            Err(ClassifierError::Timeout)
        }
    }

    struct Confident;

    impl ExternalClassifier for Confident {
        fn classify(&self, column: &Column, _: &Table, _: &TableRegistry) -> Result<ExternalVerdict, ClassifierError> {
            let role = if column.name == "rating" {
                ColumnRole::DimensionAttribute
            } else {
                ColumnRole::Measure
            };
            Ok(ExternalVerdict { role, confidence: if column.name == "rating" { 0.95 } else { 0.1 } })
        }
    }

    const SQL: &str = r#"
        CREATE TABLE films (id INT PRIMARY KEY, title TEXT);
        CREATE TABLE screenings (film_id INT REFERENCES films(id), rating INT, watch_minutes INT);
    "#;

    #[test]
    fn test_empty_and_unknown_dialect_are_fatal() {
        let engine = ModelingEngine::default();
        assert_eq!(
            engine.generate(ModelRequest::new("  \n")).unwrap_err(),
            GenerationError::EmptyInput
        );
        let mut request = ModelRequest::new(SQL);
        request.dialect = Some("oracle".into());
        assert!(matches!(
            engine.generate(request),
            Err(GenerationError::UnknownDialect(_))
        ));
        assert!(matches!(
            engine.generate(ModelRequest::new("SELECT 1;")),
            Err(GenerationError::NoTables(_))
        ));
    }

    #[test]
    fn test_defaults_come_from_config() {
        let engine = ModelingEngine::new(EngineConfig {
            default_model_name: "Cinema".into(),
            default_dialect: Dialect::Mysql,
            include_indexes: false,
            ..EngineConfig::default()
        });
        let response = engine.generate(ModelRequest::new(SQL)).unwrap();
        assert_eq!(response.star_schema.name, "Cinema");
        assert!(response.ddl_statements.iter().any(|s| s.contains("`dim_films`")));
        assert!(response.ddl_statements.iter().all(|s| !s.contains("INDEX")));
        assert_eq!(response.load_order, ["dim_films", "fact_screenings"]);
    }

    #[test]
    fn test_external_failure_keeps_rules_and_warns() {
        let engine = ModelingEngine::default().with_classifier(Box::new(Offline));
        let response = engine.generate(ModelRequest::new(SQL)).unwrap();
        let measures: Vec<&str> = response
            .star_schema
            .fact_table
            .measures
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(measures, ["rating", "watch_minutes"]);
        assert!(response.warnings.iter().any(|w| w.contains("rule result kept")));
    }

    #[test]
    fn test_confident_external_verdict_overrides() {
        let engine = ModelingEngine::default().with_classifier(Box::new(Confident));
        let response = engine.generate(ModelRequest::new(SQL)).unwrap();
        let fact = &response.star_schema.fact_table;
        let measures: Vec<&str> = fact.measures.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(measures, ["watch_minutes"]);
        assert!(fact.degenerate_attributes.iter().any(|c| c.name == "rating"));
    }

    #[test]
    fn test_capabilities() {
        let caps = ModelingEngine::default().capabilities();
        assert_eq!(caps.dialects.len(), 5);
        assert_eq!(caps.partitioning_dialects, [Dialect::Postgresql]);
        assert!(caps.modeling_features.iter().any(|f| f == "scd_type_2"));
    }
}
