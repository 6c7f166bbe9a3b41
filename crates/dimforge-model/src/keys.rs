//! Surrogate keys, SCD bookkeeping columns, and fact-to-dimension relationships.

use crate::error::KeyError;
use crate::naming::{dimension_base, UniqueNames};
use crate::star::{
    DimensionKey, DimensionTableSpec, DraftDimension, DraftModel, FactTableSpec, ModelColumn,
    ModelMetadata, Relationship, RelationshipType, ScdType, StarSchema,
};
use chrono::Utc;
use dimforge_ingest_sql::SemanticType;
use std::collections::{HashMap, HashSet};

pub const EFFECTIVE_DATE: &str = "effective_date";
pub const END_DATE: &str = "end_date";
pub const IS_CURRENT: &str = "is_current";

/// Turn a draft into the final [`StarSchema`]: add surrogate keys and SCD2
/// columns, point every fact key at its dimension's surrogate key, and check
/// the result before handing it out.
pub fn assign_keys(draft: DraftModel) -> Result<StarSchema, KeyError> {
    let mut dimensions = Vec::with_capacity(draft.dimensions.len());
    let mut renamed: HashMap<String, Renames> = HashMap::new();
    for draft_dimension in draft.dimensions {
        let (dimension, renames) = finish_dimension(draft_dimension);
        if !renames.is_empty() {
            renamed.insert(dimension.name.clone(), renames);
        }
        dimensions.push(dimension);
    }

    let fact = draft.fact;
    let mut used = UniqueNames::new();
    used.reserve(
        fact.degenerate_attributes
            .iter()
            .chain(fact.measures.iter())
            .map(|c| c.name.as_str()),
    );

    let mut dimension_keys = Vec::with_capacity(fact.dimension_keys.len());
    let mut relationships = Vec::with_capacity(fact.dimension_keys.len());
    for key in fact.dimension_keys {
        let Some(dimension) = dimensions.iter().find(|d| d.name == key.dimension) else {
            return Err(KeyError::DanglingDimension {
                column: format!("{}_key", key.stem),
                dimension: key.dimension,
            });
        };
        let column = ModelColumn::generated(
            used.allocate(&format!("{}_key", key.stem)),
            dimension.surrogate_key.semantic_type.clone(),
            true,
        );
        relationships.push(Relationship {
            from_table: fact.name.clone(),
            from_column: column.name.clone(),
            to_table: dimension.name.clone(),
            to_column: dimension.surrogate_key.name.clone(),
            relationship_type: RelationshipType::ManyToOne,
        });
        let mut joins = key.joins;
        if let Some(renames) = renamed.get(&key.dimension) {
            for join in &mut joins {
                if let Some(name) = renames.get(&join.dimension_column.to_ascii_lowercase()) {
                    join.dimension_column = name.clone();
                }
            }
        }
        dimension_keys.push(DimensionKey {
            column,
            dimension: key.dimension,
            joins,
        });
    }

    let schema = StarSchema {
        name: draft.name,
        fact_table: FactTableSpec {
            name: fact.name,
            source_table: fact.source_table,
            measures: fact.measures,
            dimension_keys,
            degenerate_attributes: fact.degenerate_attributes,
            partition_column: fact.partition_column,
            grain: fact.grain,
            description: fact.description,
        },
        dimension_tables: dimensions,
        relationships,
        metadata: ModelMetadata {
            created_at: Utc::now(),
            modeling_approach: draft.approach,
            source_table_count: draft.source_table_count,
        },
    };
    verify_keys(&schema)?;
    Ok(schema)
}

/// Lowercased old column name -> new column name.
type Renames = HashMap<String, String>;

fn finish_dimension(draft: DraftDimension) -> (DimensionTableSpec, Renames) {
    let DraftDimension {
        name,
        source,
        mut natural_key,
        mut attributes,
        mut calendar,
        scd_type,
        description,
    } = draft;

    let mut used = UniqueNames::new();
    used.reserve(natural_key.columns().into_iter().map(|c| c.name.as_str()));
    if let Some(calendar) = &calendar {
        used.reserve(calendar.columns.iter().map(|c| c.column.name.as_str()));
    }

    let mut renames = Renames::new();
    let mut history_columns = Vec::new();
    if scd_type == ScdType::Type2 {
        // History columns keep their canonical names; colliding business columns move aside.
        used.reserve([EFFECTIVE_DATE, END_DATE, IS_CURRENT]);
        for column in natural_key.columns_mut().into_iter().chain(attributes.iter_mut()) {
            if is_history_name(&column.name) {
                let moved = used.allocate(&format!("source_{}", column.name));
                renames.insert(column.name.to_ascii_lowercase(), moved.clone());
                column.name = moved;
            }
        }
        if let Some(calendar) = calendar.as_mut() {
            if let Some(moved) = renames.get(&calendar.date_column.to_ascii_lowercase()) {
                calendar.date_column = moved.clone();
            }
        }
        history_columns = vec![
            ModelColumn::generated(EFFECTIVE_DATE, SemanticType::Date, false),
            ModelColumn::generated(END_DATE, SemanticType::Date, true),
            ModelColumn::generated(IS_CURRENT, SemanticType::Boolean, false),
        ];
    }
    used.reserve(attributes.iter().map(|a| a.name.as_str()));

    let surrogate_key = ModelColumn::generated(
        used.allocate(&format!("{}_key", dimension_base(&name))),
        SemanticType::Integer,
        false,
    );

    let dimension = DimensionTableSpec {
        name,
        source,
        surrogate_key,
        natural_key,
        attributes,
        calendar,
        history_columns,
        scd_type,
        description,
    };
    (dimension, renames)
}

fn is_history_name(name: &str) -> bool {
    [EFFECTIVE_DATE, END_DATE, IS_CURRENT]
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Check the key invariants of a finished schema.
pub fn verify_keys(schema: &StarSchema) -> Result<(), KeyError> {
    for dimension in &schema.dimension_tables {
        ensure_unique(&dimension.name, dimension.columns())?;
        if dimension.scd_type == ScdType::Type2 {
            for required in [EFFECTIVE_DATE, END_DATE, IS_CURRENT] {
                if dimension.history_column(required).is_none() {
                    return Err(KeyError::MissingHistoryColumn {
                        table: dimension.name.clone(),
                        column: required.to_string(),
                    });
                }
            }
        }
    }
    ensure_unique(&schema.fact_table.name, schema.fact_table.columns())?;

    for key in &schema.fact_table.dimension_keys {
        let Some(dimension) = schema.dimension(&key.dimension) else {
            return Err(KeyError::DanglingDimension {
                column: key.column.name.clone(),
                dimension: key.dimension.clone(),
            });
        };
        // Keys resolve on business values only, never on generated columns.
        let business = dimension.business_columns();
        for join in &key.joins {
            if !business
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&join.dimension_column))
            {
                return Err(KeyError::JoinOnGeneratedColumn {
                    key: key.column.name.clone(),
                    dimension: dimension.name.clone(),
                    column: join.dimension_column.clone(),
                });
            }
        }
        let from_type = key.column.semantic_type.family();
        let to_type = dimension.surrogate_key.semantic_type.family();
        if from_type != to_type {
            return Err(KeyError::RelationshipTypeMismatch {
                from: format!("{}.{}", schema.fact_table.name, key.column.name),
                to: format!("{}.{}", dimension.name, dimension.surrogate_key.name),
                from_type: format!("{from_type:?}"),
                to_type: format!("{to_type:?}"),
            });
        }
    }
    Ok(())
}

fn ensure_unique<'a>(
    table: &str,
    columns: impl IntoIterator<Item = &'a ModelColumn>,
) -> Result<(), KeyError> {
    let mut seen = HashSet::new();
    for column in columns {
        if !seen.insert(column.name.to_ascii_lowercase()) {
            return Err(KeyError::DuplicateColumn {
                table: table.to_string(),
                column: column.name.clone(),
            });
        }
    }
    Ok(())
}
