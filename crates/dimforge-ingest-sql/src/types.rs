//! Declared SQL types → semantic types.
//!
//! Every dialect spells its types differently (`INT4`, `BIGSERIAL`, `NUMBER(10,2)`,
//! `CHARACTER VARYING(80)`, `DATETIME2`, ...). Downstream code only cares about a
//! handful of families, so we collapse declarations here and keep the declared
//! spelling on the column for display.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Semantic type of a column, independent of the dialect it was declared in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SemanticType {
    Integer,
    Decimal {
        precision: Option<u8>,
        scale: Option<u8>,
    },
    Text {
        max_length: Option<u32>,
    },
    Date,
    Timestamp,
    Boolean,
    /// A declared type we have no mapping for; kept verbatim.
    Other { declared: String },
}

/// Coarse grouping of [`SemanticType`], ignoring length/precision arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeFamily {
    Integer,
    Decimal,
    Text,
    Date,
    Timestamp,
    Boolean,
    Other,
}

const INTEGER_NAMES: &[&str] = &[
    "INT",
    "INTEGER",
    "BIGINT",
    "SMALLINT",
    "TINYINT",
    "MEDIUMINT",
    "INT2",
    "INT4",
    "INT8",
    "SERIAL",
    "SERIAL4",
    "SERIAL8",
    "BIGSERIAL",
    "SMALLSERIAL",
    "UNSIGNED",
];

const DECIMAL_NAMES: &[&str] = &["DECIMAL", "NUMERIC", "DEC", "NUMBER"];

const FLOAT_NAMES: &[&str] = &[
    "FLOAT",
    "FLOAT4",
    "FLOAT8",
    "DOUBLE",
    "REAL",
    "MONEY",
    "SMALLMONEY",
];

const TEXT_NAMES: &[&str] = &[
    "VARCHAR",
    "CHAR",
    "CHARACTER",
    "NVARCHAR",
    "NCHAR",
    "VARCHAR2",
    "NVARCHAR2",
    "STRING",
    "TEXT",
    "TINYTEXT",
    "MEDIUMTEXT",
    "LONGTEXT",
    "NTEXT",
    "CLOB",
    "CITEXT",
    "UUID",
    "UNIQUEIDENTIFIER",
    "ENUM",
];

const TIMESTAMP_NAMES: &[&str] = &[
    "TIMESTAMP",
    "TIMESTAMPTZ",
    "DATETIME",
    "DATETIME2",
    "SMALLDATETIME",
    "DATETIMEOFFSET",
    "TIME",
];

const BOOLEAN_NAMES: &[&str] = &["BOOL", "BOOLEAN", "BIT"];

fn type_args_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\)").expect("static type-argument pattern")
    })
}

impl SemanticType {
    /// Normalize a declared type (as written in DDL) into a semantic type.
    pub fn from_declared(declared: &str) -> Self {
        let trimmed = declared.trim();
        let upper = trimmed.to_ascii_uppercase();
        let base = upper
            .split(|c: char| c == '(' || c.is_whitespace())
            .find(|s| !s.is_empty())
            .unwrap_or("");

        let (first_arg, second_arg) = match type_args_re().captures(&upper) {
            Some(caps) => (
                caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()),
                caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok()),
            ),
            None => (None, None),
        };

        if INTEGER_NAMES.contains(&base) {
            return Self::Integer;
        }
        if DECIMAL_NAMES.contains(&base) {
            return Self::Decimal {
                precision: first_arg.and_then(|p| u8::try_from(p).ok()),
                scale: second_arg.and_then(|s| u8::try_from(s).ok()),
            };
        }
        if FLOAT_NAMES.contains(&base) {
            return Self::Decimal {
                precision: None,
                scale: None,
            };
        }
        if TEXT_NAMES.contains(&base) {
            return Self::Text {
                max_length: first_arg,
            };
        }
        if base == "DATE" {
            return Self::Date;
        }
        if TIMESTAMP_NAMES.contains(&base) {
            return Self::Timestamp;
        }
        if BOOLEAN_NAMES.contains(&base) {
            return Self::Boolean;
        }
        Self::Other {
            declared: trimmed.to_string(),
        }
    }

    pub fn family(&self) -> TypeFamily {
        match self {
            Self::Integer => TypeFamily::Integer,
            Self::Decimal { .. } => TypeFamily::Decimal,
            Self::Text { .. } => TypeFamily::Text,
            Self::Date => TypeFamily::Date,
            Self::Timestamp => TypeFamily::Timestamp,
            Self::Boolean => TypeFamily::Boolean,
            Self::Other { .. } => TypeFamily::Other,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Decimal { .. })
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Integer)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::Timestamp)
    }

    /// Binary payloads (`BLOB`, `BYTEA`, ...) that carry no analytic meaning.
    pub fn is_binary(&self) -> bool {
        match self {
            Self::Other { declared } => {
                let upper = declared.to_ascii_uppercase();
                ["BLOB", "BYTEA", "BINARY", "VARBINARY", "IMAGE", "LONGBLOB"]
                    .iter()
                    .any(|b| upper.starts_with(b))
            }
            _ => false,
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Decimal {
                precision: Some(p),
                scale: Some(s),
            } => write!(f, "decimal({p},{s})"),
            Self::Decimal {
                precision: Some(p),
                scale: None,
            } => write!(f, "decimal({p})"),
            Self::Decimal { .. } => write!(f, "decimal"),
            Self::Text {
                max_length: Some(n),
            } => write!(f, "text({n})"),
            Self::Text { max_length: None } => write!(f, "text"),
            Self::Date => write!(f, "date"),
            Self::Timestamp => write!(f, "timestamp"),
            Self::Boolean => write!(f, "boolean"),
            Self::Other { declared } => write!(f, "{declared}"),
        }
    }
}
