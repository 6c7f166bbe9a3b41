//! Complexity scoring and optimization suggestions for a finished star schema.
//!
//! Suggestions come from a fixed table of shape-keyed rules; each rule sees a
//! [`Shape`] summary of the model and contributes to one category.

use crate::keys::IS_CURRENT;
use crate::star::{DimensionTableSpec, ScdType, StarSchema};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const DIMENSION_WEIGHT: usize = 10;
pub const SCD2_WEIGHT: usize = 15;
pub const MEASURE_WEIGHT: usize = 5;
pub const RELATIONSHIP_WEIGHT: usize = 2;

/// Scores strictly above these thresholds are medium / high.
pub const MEDIUM_THRESHOLD: usize = 50;
pub const HIGH_THRESHOLD: usize = 100;

const MANY_DIMENSIONS: usize = 5;
const WIDE_DIMENSION: usize = 20;
const COMPOSITE_INDEX_KEYS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

impl ComplexityLevel {
    pub fn from_score(score: usize) -> Self {
        if score > HIGH_THRESHOLD {
            Self::High
        } else if score > MEDIUM_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationCategory {
    Indexing,
    Partitioning,
    Scd,
    Normalization,
}

impl RecommendationCategory {
    pub const ALL: [RecommendationCategory; 4] = [
        Self::Indexing,
        Self::Partitioning,
        Self::Scd,
        Self::Normalization,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub star_schema: StarSchema,
    #[serde(default)]
    pub include_partitioning: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationReport {
    pub complexity_score: usize,
    pub complexity_level: ComplexityLevel,
    /// Every category is present, possibly with an empty list.
    pub recommendations: BTreeMap<RecommendationCategory, Vec<String>>,
}

/// What the rules look at.
#[derive(Debug, Clone)]
pub struct Shape {
    pub fact: String,
    pub dimensions: usize,
    pub scd2: Vec<String>,
    pub measures: usize,
    pub relationships: usize,
    pub fact_keys: Vec<String>,
    pub partition_column: Option<String>,
    pub partitioning_requested: bool,
    pub synthetic: Vec<String>,
    /// Dimensions referenced by more than one fact key.
    pub role_playing: Vec<String>,
    pub wide: Vec<String>,
    pub degenerate: Vec<String>,
}

impl Shape {
    pub fn of(schema: &StarSchema, partitioning_requested: bool) -> Self {
        let mut references: HashMap<&str, usize> = HashMap::new();
        for key in &schema.fact_table.dimension_keys {
            *references.entry(key.dimension.as_str()).or_default() += 1;
        }
        let dims = &schema.dimension_tables;

        Self {
            fact: schema.fact_table.name.clone(),
            dimensions: dims.len(),
            scd2: dimension_names(dims, |d| d.scd_type == ScdType::Type2),
            measures: schema.fact_table.measures.len(),
            relationships: schema.relationships.len(),
            fact_keys: schema
                .fact_table
                .dimension_keys
                .iter()
                .map(|k| k.column.name.clone())
                .collect(),
            partition_column: schema.fact_table.partition_column.clone(),
            partitioning_requested,
            synthetic: dimension_names(dims, |d| d.source.is_synthetic()),
            role_playing: dimension_names(dims, |d| {
                references.get(d.name.as_str()).copied().unwrap_or(0) > 1
            }),
            wide: dimension_names(dims, |d| d.attributes.len() > WIDE_DIMENSION),
            degenerate: schema
                .fact_table
                .degenerate_attributes
                .iter()
                .map(|c| c.name.clone())
                .collect(),
        }
    }

    pub fn complexity_score(&self) -> usize {
        self.dimensions * DIMENSION_WEIGHT
            + self.scd2.len() * SCD2_WEIGHT
            + self.measures * MEASURE_WEIGHT
            + self.relationships * RELATIONSHIP_WEIGHT
    }
}

fn dimension_names(
    dimensions: &[DimensionTableSpec],
    pred: impl Fn(&DimensionTableSpec) -> bool,
) -> Vec<String> {
    dimensions
        .iter()
        .filter(|d| pred(d))
        .map(|d| d.name.clone())
        .collect()
}

struct Rule {
    category: RecommendationCategory,
    applies: fn(&Shape) -> bool,
    message: fn(&Shape) -> String,
}

const RULES: &[Rule] = &[
    // indexing
    Rule {
        category: RecommendationCategory::Indexing,
        applies: |s| !s.fact_keys.is_empty(),
        message: |s| {
            format!(
                "Index every dimension key of `{}` ({}) to speed up star joins",
                s.fact,
                s.fact_keys.join(", ")
            )
        },
    },
    Rule {
        category: RecommendationCategory::Indexing,
        applies: |s| s.fact_keys.len() >= COMPOSITE_INDEX_KEYS,
        message: |s| {
            format!(
                "Consider a composite index on the most frequently filtered keys of `{}`",
                s.fact
            )
        },
    },
    Rule {
        category: RecommendationCategory::Indexing,
        applies: |s| !s.scd2.is_empty(),
        message: |s| {
            format!(
                "Index (natural key, {IS_CURRENT}) on {} so current-row lookups stay cheap",
                s.scd2.join(", ")
            )
        },
    },
    Rule {
        category: RecommendationCategory::Indexing,
        applies: |s| !s.degenerate.is_empty(),
        message: |s| {
            format!(
                "Index degenerate attributes of `{}` used for drill-through ({})",
                s.fact,
                s.degenerate.join(", ")
            )
        },
    },
    // partitioning
    Rule {
        category: RecommendationCategory::Partitioning,
        applies: |s| s.dimensions >= MANY_DIMENSIONS && !s.partitioning_requested,
        message: |s| {
            format!(
                "With {} dimensions `{}` is likely to grow large; consider partitioning it",
                s.dimensions, s.fact
            )
        },
    },
    Rule {
        category: RecommendationCategory::Partitioning,
        applies: |s| s.partition_column.is_some() && !s.partitioning_requested,
        message: |s| {
            format!(
                "Range-partition `{}` on `{}` to prune scans by date",
                s.fact,
                s.partition_column.as_deref().unwrap_or_default()
            )
        },
    },
    Rule {
        category: RecommendationCategory::Partitioning,
        applies: |s| s.partitioning_requested && s.partition_column.is_none(),
        message: |s| {
            format!(
                "Partitioning was requested but `{}` has no date column to partition on",
                s.fact
            )
        },
    },
    // scd
    Rule {
        category: RecommendationCategory::Scd,
        applies: |s| !s.scd2.is_empty(),
        message: |s| {
            format!(
                "Schedule SCD Type 2 maintenance for {}: expire changed rows and archive closed versions",
                s.scd2.join(", ")
            )
        },
    },
    Rule {
        category: RecommendationCategory::Scd,
        applies: |s| s.scd2.is_empty() && s.dimensions > 0,
        message: |_| {
            "All dimensions are SCD Type 1; add effective/end dates to a source table if history matters"
                .to_string()
        },
    },
    // normalization
    Rule {
        category: RecommendationCategory::Normalization,
        applies: |s| !s.synthetic.is_empty(),
        message: |s| {
            format!(
                "Dimensions {} were derived from a flat table; review the column groupings",
                s.synthetic.join(", ")
            )
        },
    },
    Rule {
        category: RecommendationCategory::Normalization,
        applies: |s| !s.role_playing.is_empty(),
        message: |s| {
            format!(
                "{} play several roles; expose one view per role for readability",
                s.role_playing.join(", ")
            )
        },
    },
    Rule {
        category: RecommendationCategory::Normalization,
        applies: |s| !s.wide.is_empty(),
        message: |s| {
            format!(
                "{} have more than {WIDE_DIMENSION} attributes; consider splitting out a mini-dimension",
                s.wide.join(", ")
            )
        },
    },
    Rule {
        category: RecommendationCategory::Normalization,
        applies: |s| s.measures == 0,
        message: |s| {
            format!(
                "`{}` has no measures (factless fact); COUNT(*) is its only metric",
                s.fact
            )
        },
    },
];

/// Score the model and run every rule.
pub fn recommend(schema: &StarSchema, partitioning_requested: bool) -> RecommendationReport {
    let shape = Shape::of(schema, partitioning_requested);
    let complexity_score = shape.complexity_score();
    let mut recommendations: BTreeMap<RecommendationCategory, Vec<String>> = RecommendationCategory::ALL
        .into_iter()
        .map(|c| (c, Vec::new()))
        .collect();
    for rule in RULES {
        if (rule.applies)(&shape) {
            recommendations
                .entry(rule.category)
                .or_default()
                .push((rule.message)(&shape));
        }
    }
    RecommendationReport {
        complexity_score,
        complexity_level: ComplexityLevel::from_score(complexity_score),
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_draft;
    use crate::classify::ColumnClassifier;
    use crate::keys::assign_keys;
    use dimforge_ingest_sql::parse_sql_ddl;

    fn schema(sql: &str) -> StarSchema {
        let analysis = parse_sql_ddl(sql).unwrap();
        let tables = ColumnClassifier::rules_only().classify_registry(&analysis.registry);
        assign_keys(build_draft("Test", &tables).unwrap()).unwrap()
    }

    #[test]
    fn test_levels() {
        assert_eq!(ComplexityLevel::from_score(50), ComplexityLevel::Low);
        assert_eq!(ComplexityLevel::from_score(51), ComplexityLevel::Medium);
        assert_eq!(ComplexityLevel::from_score(100), ComplexityLevel::Medium);
        assert_eq!(ComplexityLevel::from_score(101), ComplexityLevel::High);
    }

    #[test]
    fn test_score_and_categories() {
        let s = schema(
            r#"
            CREATE TABLE customers (id INT PRIMARY KEY, name TEXT, valid_from DATE);
            CREATE TABLE products (id INT PRIMARY KEY, title TEXT);
            CREATE TABLE sales (
                customer_id INT REFERENCES customers(id),
                product_id INT REFERENCES products(id),
                quantity INT,
                total_amount DECIMAL(10,2)
            );
            "#,
        );
        let report = recommend(&s, false);
        // 2 dims * 10 + 1 scd2 * 15 + 2 measures * 5 + 2 relationships * 2
        assert_eq!(report.complexity_score, 49);
        assert_eq!(report.complexity_level, ComplexityLevel::Low);
        assert_eq!(report.recommendations.len(), 4);
        assert!(report.recommendations[&RecommendationCategory::Scd][0].contains("dim_customers"));
        assert!(report.recommendations[&RecommendationCategory::Partitioning].is_empty());
    }

    #[test]
    fn test_many_dimensions_suggest_partitioning_unless_requested() {
        let s = schema(
            r#"
            CREATE TABLE a (id INT PRIMARY KEY, label TEXT);
            CREATE TABLE b (id INT PRIMARY KEY, label TEXT);
            CREATE TABLE c (id INT PRIMARY KEY, label TEXT);
            CREATE TABLE d (id INT PRIMARY KEY, label TEXT);
            CREATE TABLE e (id INT PRIMARY KEY, label TEXT);
            CREATE TABLE f (
                a_id INT REFERENCES a(id), b_id INT REFERENCES b(id), c_id INT REFERENCES c(id),
                d_id INT REFERENCES d(id), e_id INT REFERENCES e(id), amount INT
            );
            "#,
        );
        let open = recommend(&s, false);
        assert_eq!(open.recommendations[&RecommendationCategory::Partitioning].len(), 1);
        let requested = recommend(&s, true);
        // requested but no date column
        let partitioning = &requested.recommendations[&RecommendationCategory::Partitioning];
        assert_eq!(partitioning.len(), 1);
        assert!(partitioning[0].contains("no date column"));
    }

    #[test]
    fn test_report_serializes_lowercase_keys() {
        let s = schema("CREATE TABLE t (x_amount INT);");
        let json = serde_json::to_value(recommend(&s, false)).unwrap();
        assert_eq!(json["complexity_level"], "low");
        for key in ["indexing", "partitioning", "scd", "normalization"] {
            assert!(json["recommendations"].get(key).is_some(), "{key}");
        }
    }
}
