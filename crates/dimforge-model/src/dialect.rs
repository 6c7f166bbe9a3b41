//! Target SQL dialects.

use crate::error::GenerationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Mysql,
    #[default]
    Postgresql,
    Sqlite,
    Sqlserver,
    Ansi,
}

impl Dialect {
    pub const ALL: [Dialect; 5] = [
        Dialect::Mysql,
        Dialect::Postgresql,
        Dialect::Sqlite,
        Dialect::Sqlserver,
        Dialect::Ansi,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mysql => "mysql",
            Self::Postgresql => "postgresql",
            Self::Sqlite => "sqlite",
            Self::Sqlserver => "sqlserver",
            Self::Ansi => "ansi",
        }
    }

    /// Quote an identifier for this dialect.
    pub fn quote(self, ident: &str) -> String {
        match self {
            Self::Mysql => format!("`{}`", ident.replace('`', "``")),
            Self::Sqlserver => format!("[{}]", ident.replace(']', "]]")),
            _ => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Whether generated DDL can carry a native partition clause.
    pub fn supports_partitioning(self) -> bool {
        matches!(self, Self::Postgresql)
    }

    /// `DROP TABLE IF EXISTS`; PostgreSQL additionally needs `CASCADE` to drop
    /// past dependent views.
    ///
    /// `IF EXISTS` is not standard SQL; `ansi` output assumes an engine that accepts it.
    pub fn drop_table(self, quoted: &str) -> String {
        match self {
            Self::Postgresql => format!("DROP TABLE IF EXISTS {quoted} CASCADE;"),
            _ => format!("DROP TABLE IF EXISTS {quoted};"),
        }
    }

    /// `DROP VIEW IF EXISTS`, under the same `ansi` caveat as [`Dialect::drop_table`].
    pub fn drop_view(self, quoted: &str) -> String {
        format!("DROP VIEW IF EXISTS {quoted};")
    }

    pub fn bool_literal(self, value: bool) -> &'static str {
        match (self, value) {
            (Self::Sqlserver | Self::Sqlite | Self::Mysql, true) => "1",
            (Self::Sqlserver | Self::Sqlite | Self::Mysql, false) => "0",
            (_, true) => "TRUE",
            (_, false) => "FALSE",
        }
    }

    /// Current-date expression used by SCD2 maintenance templates.
    pub fn current_date(self) -> &'static str {
        match self {
            Self::Sqlserver => "CAST(GETDATE() AS DATE)",
            Self::Sqlite => "DATE('now')",
            _ => "CURRENT_DATE",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(Self::Mysql),
            "postgresql" | "postgres" => Ok(Self::Postgresql),
            "sqlite" => Ok(Self::Sqlite),
            "sqlserver" | "mssql" => Ok(Self::Sqlserver),
            "ansi" => Ok(Self::Ansi),
            _ => Err(GenerationError::UnknownDialect(s.to_string())),
        }
    }
}
