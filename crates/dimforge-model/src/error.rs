//! Error types for the modeling pipeline.

use dimforge_ingest_sql::AnalyzeError;

/// Failure reported by an external column classifier. Never fatal: the
/// rule-based classification is kept whenever one of these occurs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifierError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),

    #[error("classifier timed out")]
    Timeout,

    #[error("malformed classifier response: {0}")]
    Malformed(String),
}

/// A key-assignment invariant was violated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("table `{table}` has more than one column named `{column}`")]
    DuplicateColumn { table: String, column: String },

    #[error("relationship {from} -> {to} joins {from_type} to {to_type}")]
    RelationshipTypeMismatch {
        from: String,
        to: String,
        from_type: String,
        to_type: String,
    },

    #[error("type 2 dimension `{table}` lacks history column `{column}`")]
    MissingHistoryColumn { table: String, column: String },

    #[error("fact key `{column}` refers to missing dimension `{dimension}`")]
    DanglingDimension { column: String, dimension: String },

    #[error("fact key `{key}` resolves on `{dimension}.{column}`, which is not a natural key or attribute")]
    JoinOnGeneratedColumn {
        key: String,
        dimension: String,
        column: String,
    },
}

/// Fatal failure of a model request. No partial result accompanies it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("no SQL provided")]
    EmptyInput,

    #[error(transparent)]
    NoTables(#[from] AnalyzeError),

    #[error("unknown dialect `{0}` (expected one of: mysql, postgresql, sqlite, sqlserver, ansi)")]
    UnknownDialect(String),

    #[error("key assignment failed: {0}")]
    Keys(#[from] KeyError),

    #[error("code generation failed: {0}")]
    Render(String),
}

impl From<std::fmt::Error> for GenerationError {
    fn from(err: std::fmt::Error) -> Self {
        Self::Render(err.to_string())
    }
}
