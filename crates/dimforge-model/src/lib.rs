//! Dimensional modeling for dimforge
//!
//! Takes the table graph produced by `dimforge-ingest-sql` and turns it into a
//! star schema plus the SQL to build and load it:
//! - [`classify`]: per-column roles with confidence, rule-based with an optional external classifier
//! - [`builder`]: fact selection, FK-sourced and synthetic dimensions, SCD typing
//! - [`keys`]: surrogate keys, SCD2 history columns, relationships, key invariants
//! - [`codegen`]: DDL / DML / ETL templates for mysql, postgresql, sqlite, sqlserver, ansi
//! - [`recommend`]: complexity score and optimization suggestions
//! - [`engine`]: the JSON-friendly request/response facade tying it all together
//!
//! ```no_run
//! use dimforge_model::{ModelRequest, ModelingEngine};
//!
//! let engine = ModelingEngine::default();
//! let response = engine
//!     .generate(ModelRequest::new("CREATE TABLE sales (id INT PRIMARY KEY, amount DECIMAL(10,2));"))
//!     .unwrap();
//! println!("{}", response.ddl_statements.join("\n\n"));
//! ```

pub mod builder;
pub mod classify;
pub mod codegen;
pub mod config;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod keys;
pub mod naming;
pub mod recommend;
pub mod star;

pub use classify::{
    ClassificationSource, ClassifiedColumn, ClassifiedTable, ColumnClassifier, ColumnRole,
    Confidence, ExternalClassifier, ExternalVerdict,
};
pub use codegen::{CodegenOptions, DialectCodeGenerator, GeneratedCode};
pub use config::EngineConfig;
pub use dialect::Dialect;
pub use engine::{Capabilities, ModelRequest, ModelResponse, ModelingEngine, SchemaReport};
pub use error::{ClassifierError, GenerationError, KeyError};
pub use recommend::{
    recommend, ComplexityLevel, RecommendationCategory, RecommendationReport,
    RecommendationRequest,
};
pub use star::{
    DimensionKey, DimensionSource, DimensionTableSpec, FactTableSpec, KeyJoin, ModelColumn,
    ModelingApproach, NaturalKey, Relationship, RelationshipType, ScdType, StarSchema,
};
