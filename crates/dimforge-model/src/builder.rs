//! Fact selection and dimension assembly.
//!
//! Two paths produce a [`DraftModel`]:
//! - **normalized**: every table the fact references through a foreign key becomes a dimension
//! - **synthetic**: the fact has no usable foreign keys (flat / CSV-derived table), so its
//!   non-measure columns are clustered into dimension groups by name and type heuristics
//!
//! Both paths turn the fact's temporal columns into a `date` dimension. Table
//! declaration order breaks every tie, so the result is deterministic.

use crate::classify::{name_tokens, snake_name, ClassifiedColumn, ClassifiedTable, ColumnRole};
use crate::naming::{dimension_name, fact_name, key_stem, UniqueNames};
use crate::star::{
    Calendar, DimensionSource, DraftDimension, DraftDimensionKey, DraftFact, DraftModel, KeyJoin,
    ModelColumn, ModelingApproach, NaturalKey, ScdType,
};
use dimforge_ingest_sql::{ColumnRef, ForeignKey, SemanticType};
use std::collections::{BTreeMap, HashSet};

const DATE_GROUP: &str = "date";
const PROFILE_GROUP: &str = "profile";

const ENTITY_GROUPS: &[(&str, &[&str])] = &[
    (
        "customer",
        &["customer", "client", "person", "name", "email", "phone", "user"],
    ),
    ("product", &["product", "item", "sku", "service", "material"]),
    (
        "location",
        &[
            "city", "state", "country", "region", "address", "location", "zip", "postal", "store",
        ],
    ),
    ("vehicle", &["vehicle", "plate", "car"]),
];

const PROFILE_TOKENS: &[&str] = &[
    "type", "status", "category", "kind", "class", "level", "tier", "segment", "flag", "gender",
];

/// Leading tokens too generic to name a group after.
const GENERIC_PREFIXES: &[&str] = &["is", "has", "num", "no", "total", "max", "min", "avg"];

/// Assemble a draft star schema from classified tables (declaration order).
///
/// Returns `None` only for an empty table list.
pub fn build_draft(model_name: &str, tables: &[ClassifiedTable]) -> Option<DraftModel> {
    if tables.is_empty() {
        return None;
    }
    let mut warnings = Vec::new();
    let fact_idx = select_fact(tables);
    let fact = &tables[fact_idx];
    tracing::info!(table = %fact.name(), "selected fact table");

    let fact_table_name = fact_name(fact.name());
    let mut names = UniqueNames::new();
    names.reserve([fact_table_name.as_str()]);

    let mut dimensions = Vec::new();
    let mut keys = Vec::new();
    let mut consumed: HashSet<String> = HashSet::new();

    // Normalized path: one dimension per referenced table, one key per FK instance.
    for target in fact.table.referenced_tables() {
        let edges: Vec<&ForeignKey> = fact
            .table
            .followable_foreign_keys()
            .filter(|fk| fk.references.table.eq_ignore_ascii_case(&target))
            .collect();
        let Some(target_table) = find_table(tables, &target) else {
            let message = format!(
                "fact `{}` references unknown table `{}`; column(s) {} kept as degenerate attributes",
                fact.name(),
                edges.first().map(|e| e.references.table.as_str()).unwrap_or(&target),
                edges.iter().map(|e| e.column.as_str()).collect::<Vec<_>>().join(", ")
            );
            tracing::warn!("{message}");
            warnings.push(message);
            continue;
        };

        let instances = key_instances(&edges, target_table.table.primary_key.len());
        let dimension = fk_dimension(target_table, &instances, &mut names);
        for instance in &instances {
            let stem = match instance.as_slice() {
                [single] => key_stem(&single.column),
                _ => snake_name(target_table.name()),
            };
            let joins = instance
                .iter()
                .map(|fk| KeyJoin {
                    fact_column: fk.column.clone(),
                    dimension_column: dimension_column_for(&dimension, &fk.references.column),
                })
                .collect();
            for fk in instance {
                consumed.insert(fk.column.to_ascii_lowercase());
            }
            keys.push(DraftDimensionKey {
                stem,
                dimension: dimension.name.clone(),
                joins,
            });
        }
        dimensions.push(dimension);
    }

    let approach = if dimensions.is_empty() {
        ModelingApproach::Denormalized
    } else {
        ModelingApproach::Normalized
    };

    // Sort the remaining fact columns.
    let mut measures = Vec::new();
    let mut temporal: Vec<&ClassifiedColumn> = Vec::new();
    let mut row_identity: Vec<&ClassifiedColumn> = Vec::new();
    let mut descriptive: Vec<&ClassifiedColumn> = Vec::new();
    for column in &fact.columns {
        if consumed.contains(&column.name().to_ascii_lowercase()) {
            continue;
        }
        match column.role {
            ColumnRole::Measure if column.column.semantic_type.is_numeric() => {
                measures.push(source_column(fact.name(), column));
            }
            ColumnRole::Measure => {
                let message = format!(
                    "column {}.{} was classified as a measure but is not numeric ({}); kept as an attribute",
                    fact.name(),
                    column.name(),
                    column.column.semantic_type
                );
                tracing::warn!("{message}");
                warnings.push(message);
                descriptive.push(column);
            }
            ColumnRole::TemporalAttribute => temporal.push(column),
            ColumnRole::NaturalKey => row_identity.push(column),
            ColumnRole::Ignored => {
                tracing::debug!(table = %fact.name(), column = %column.name(), "ignored column left out of the model");
            }
            ColumnRole::DimensionKey | ColumnRole::DimensionAttribute => descriptive.push(column),
        }
    }

    let mut degenerate: Vec<ModelColumn> = row_identity
        .iter()
        .map(|c| source_column(fact.name(), c))
        .collect();
    let partition_column = temporal.first().map(|c| c.name().to_string());
    if let Some(first) = temporal.first() {
        degenerate.push(source_column(fact.name(), first));
    }

    match approach {
        ModelingApproach::Normalized => {
            if !temporal.is_empty() {
                let (dim, key) = synthetic_dimension(fact.name(), DATE_GROUP, &temporal, &mut names);
                dimensions.push(dim);
                keys.push(key);
            }
            degenerate.extend(descriptive.iter().map(|c| source_column(fact.name(), c)));
        }
        ModelingApproach::Denormalized => {
            let message = format!(
                "no foreign keys lead out of `{}`; deriving synthetic dimensions from its columns",
                fact.name()
            );
            tracing::info!("{message}");
            warnings.push(message);

            let mut groupable: Vec<&ClassifiedColumn> = temporal.clone();
            groupable.extend(descriptive.iter().copied());
            groupable.sort_by_key(|c| fact.table.position(c.name()));

            let groups = synthetic_groups(fact.name(), &groupable);
            if groups.is_empty() {
                let (dim, key) =
                    synthetic_dimension(fact.name(), &snake_name(fact.name()), &[], &mut names);
                dimensions.push(dim);
                keys.push(key);
            }
            for (group, members) in groups {
                let (dim, key) = synthetic_dimension(fact.name(), &group, &members, &mut names);
                dimensions.push(dim);
                keys.push(key);
            }
        }
    }

    let stems: Vec<&str> = keys.iter().map(|k| k.stem.as_str()).collect();
    let grain = match approach {
        ModelingApproach::Normalized => format!(
            "One row per `{}` record at the grain of {}",
            fact.name(),
            stems.join(", ")
        ),
        ModelingApproach::Denormalized => format!(
            "One row per `{}` record; dimensions derived from column groups ({})",
            fact.name(),
            stems.join(", ")
        ),
    };
    let description = format!(
        "Fact table built from `{}` with {} measure(s) and {} dimension key(s)",
        fact.name(),
        measures.len(),
        keys.len()
    );

    Some(DraftModel {
        name: model_name.to_string(),
        fact: DraftFact {
            name: fact_table_name,
            source_table: fact.name().to_string(),
            measures,
            dimension_keys: keys,
            degenerate_attributes: degenerate,
            partition_column,
            grain,
            description,
        },
        dimensions,
        approach,
        source_table_count: tables.len(),
        warnings,
    })
}

// ============================================================================
// Fact selection
// ============================================================================

/// Pick the fact table. Candidates have at least one measure or reference at
/// least two distinct tables; the highest `2 * targets + measures` wins, with
/// earlier declaration breaking ties.
pub fn select_fact(tables: &[ClassifiedTable]) -> usize {
    let target_counts: Vec<usize> = tables.iter().map(|t| known_targets(tables, t)).collect();

    let mut best: Option<(usize, usize)> = None;
    for (i, table) in tables.iter().enumerate() {
        let measures = table.measure_count();
        let targets = target_counts[i];
        if measures == 0 && targets < 2 {
            continue;
        }
        let score = 2 * targets + measures;
        tracing::debug!(table = %table.name(), measures, targets, score, "fact candidate");
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((i, score));
        }
    }
    if let Some((i, _)) = best {
        return i;
    }

    // No candidate: the table with the most references, else the first table.
    let mut fallback = 0;
    for (i, &targets) in target_counts.iter().enumerate() {
        if targets > target_counts[fallback] {
            fallback = i;
        }
    }
    fallback
}

fn known_targets(tables: &[ClassifiedTable], table: &ClassifiedTable) -> usize {
    table
        .table
        .referenced_tables()
        .iter()
        .filter(|t| !t.eq_ignore_ascii_case(table.name()) && find_table(tables, t).is_some())
        .count()
}

fn find_table<'a>(tables: &'a [ClassifiedTable], name: &str) -> Option<&'a ClassifiedTable> {
    tables.iter().find(|t| t.name().eq_ignore_ascii_case(name))
}

// ============================================================================
// Normalized dimensions
// ============================================================================

/// Split the foreign keys to one target into key instances. Against a single-column
/// key every edge is its own instance (role-playing); against a composite key,
/// consecutive edges naming distinct referenced columns form one instance.
fn key_instances<'a>(edges: &[&'a ForeignKey], target_key_width: usize) -> Vec<Vec<&'a ForeignKey>> {
    if target_key_width <= 1 {
        return edges.iter().map(|fk| vec![*fk]).collect();
    }
    let mut out: Vec<Vec<&'a ForeignKey>> = Vec::new();
    for &fk in edges {
        match out.last_mut() {
            Some(current)
                if current.len() < target_key_width
                    && !current.iter().any(|e| {
                        e.references
                            .column
                            .eq_ignore_ascii_case(&fk.references.column)
                    }) =>
            {
                current.push(fk)
            }
            _ => out.push(vec![fk]),
        }
    }
    out
}

fn fk_dimension(
    target: &ClassifiedTable,
    instances: &[Vec<&ForeignKey>],
    names: &mut UniqueNames,
) -> DraftDimension {
    let table = &target.table;
    let key_columns: Vec<String> = if table.primary_key.is_empty() {
        let mut referenced: Vec<String> = Vec::new();
        for fk in instances.iter().flatten() {
            if !referenced
                .iter()
                .any(|r| r.eq_ignore_ascii_case(&fk.references.column))
            {
                referenced.push(fk.references.column.clone());
            }
        }
        referenced
    } else {
        table.primary_key.clone()
    };

    let natural_columns: Vec<ModelColumn> = key_columns
        .iter()
        .map(|name| match target.column(name) {
            Some(c) => {
                let mut col = source_column(target.name(), c);
                col.nullable = false;
                col
            }
            None => ModelColumn::from_source(
                name.clone(),
                SemanticType::Integer,
                false,
                ColumnRef::new(target.name(), name.clone()),
            ),
        })
        .collect();

    let is_key = |name: &str| key_columns.iter().any(|k| k.eq_ignore_ascii_case(name));
    // Alternate-key columns referenced by the fact must exist on the dimension.
    let referenced_extra: HashSet<String> = instances
        .iter()
        .flatten()
        .map(|fk| fk.references.column.to_ascii_lowercase())
        .filter(|c| !is_key(c.as_str()))
        .collect();

    let members: Vec<&ClassifiedColumn> = target
        .columns
        .iter()
        .filter(|c| !is_key(c.name()))
        .filter(|c| c.role.is_descriptive() || referenced_extra.contains(&c.name().to_ascii_lowercase()))
        .collect();
    let mut attributes: Vec<ModelColumn> =
        members.iter().map(|c| source_column(target.name(), c)).collect();
    // A referenced column the target never declared still has to exist for the key join.
    for fk in instances.iter().flatten() {
        let column = &fk.references.column;
        if !is_key(column)
            && target.column(column).is_none()
            && !attributes.iter().any(|a| a.name.eq_ignore_ascii_case(column))
        {
            attributes.push(ModelColumn::from_source(
                column.clone(),
                SemanticType::Integer,
                true,
                ColumnRef::new(target.name(), column.clone()),
            ));
        }
    }
    let scd_type = scd_type_for(&members);

    DraftDimension {
        name: names.allocate(&dimension_name(target.name())),
        source: DimensionSource::Table {
            table: target.name().to_string(),
        },
        natural_key: NaturalKey::Source {
            columns: natural_columns,
        },
        attributes,
        calendar: None,
        scd_type,
        description: format!(
            "Dimension sourced from `{}` (SCD type {})",
            target.name(),
            u8::from(scd_type)
        ),
    }
}

fn dimension_column_for(dimension: &DraftDimension, referenced: &str) -> String {
    dimension
        .natural_key
        .columns()
        .into_iter()
        .chain(dimension.attributes.iter())
        .find(|c| c.name.eq_ignore_ascii_case(referenced))
        .map(|c| c.name.clone())
        .unwrap_or_else(|| referenced.to_string())
}

// ============================================================================
// Synthetic dimensions
// ============================================================================

/// Cluster flat-table columns into named groups, ordered by each group's first
/// member. Rules apply in order, each to the columns earlier rules left over:
/// temporal columns, shared name prefixes, entity vocabulary, low-cardinality
/// categoricals, then the table itself.
pub fn synthetic_groups<'a>(
    table: &str,
    columns: &[&'a ClassifiedColumn],
) -> Vec<(String, Vec<&'a ClassifiedColumn>)> {
    let tokens: Vec<Vec<String>> = columns.iter().map(|c| name_tokens(c.name())).collect();
    let mut assigned: Vec<Option<String>> = vec![None; columns.len()];

    for (slot, column) in assigned.iter_mut().zip(columns) {
        if column.role == ColumnRole::TemporalAttribute {
            *slot = Some(DATE_GROUP.to_string());
        }
    }

    let mut prefix_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for (i, toks) in tokens.iter().enumerate() {
        if assigned[i].is_none() && toks.len() >= 2 && !GENERIC_PREFIXES.contains(&toks[0].as_str()) {
            *prefix_counts.entry(toks[0].as_str()).or_default() += 1;
        }
    }
    for (i, toks) in tokens.iter().enumerate() {
        if assigned[i].is_some() || toks.len() < 2 {
            continue;
        }
        if prefix_counts.get(toks[0].as_str()).copied().unwrap_or(0) >= 2 {
            assigned[i] = Some(toks[0].clone());
        }
    }

    for (i, toks) in tokens.iter().enumerate() {
        if assigned[i].is_some() {
            continue;
        }
        if let Some((entity, _)) = ENTITY_GROUPS
            .iter()
            .find(|(_, vocab)| toks.iter().any(|t| vocab.contains(&t.as_str())))
        {
            assigned[i] = Some(entity.to_string());
        }
    }

    for (i, toks) in tokens.iter().enumerate() {
        if assigned[i].is_some() {
            continue;
        }
        let boolean = columns[i].column.semantic_type == SemanticType::Boolean;
        if boolean || toks.iter().any(|t| PROFILE_TOKENS.contains(&t.as_str())) {
            assigned[i] = Some(PROFILE_GROUP.to_string());
        }
    }

    let fallback = snake_name(table);
    let mut groups: Vec<(String, Vec<&ClassifiedColumn>)> = Vec::new();
    for (slot, column) in assigned.into_iter().zip(columns.iter().copied()) {
        let group = slot.unwrap_or_else(|| fallback.clone());
        match groups.iter_mut().find(|(name, _)| *name == group) {
            Some((_, members)) => members.push(column),
            None => groups.push((group, vec![column])),
        }
    }
    groups
}

fn synthetic_dimension(
    parent: &str,
    group: &str,
    members: &[&ClassifiedColumn],
    names: &mut UniqueNames,
) -> (DraftDimension, DraftDimensionKey) {
    let name = names.allocate(&dimension_name(group));
    let attributes: Vec<ModelColumn> = members.iter().map(|c| source_column(parent, c)).collect();

    let mut local = UniqueNames::new();
    local.reserve(attributes.iter().map(|a| a.name.as_str()));
    let positional = ModelColumn::generated(
        local.allocate(&format!("{}_id", snake_name(group))),
        SemanticType::Integer,
        false,
    );

    // Calendar parts hang off the first true date/timestamp of the date group.
    let calendar = if group == DATE_GROUP {
        members
            .iter()
            .zip(&attributes)
            .find(|(c, _)| {
                c.role == ColumnRole::TemporalAttribute
                    && matches!(
                        c.column.semantic_type,
                        SemanticType::Date | SemanticType::Timestamp
                    )
            })
            .map(|(_, a)| Calendar::derived_from(a.name.clone(), &mut local))
    } else {
        None
    };

    let scd_type = scd_type_for(members);
    let joins = attributes
        .iter()
        .map(|a| KeyJoin {
            fact_column: a.source_column().to_string(),
            dimension_column: a.name.clone(),
        })
        .collect();
    let listed = if attributes.is_empty() {
        "none".to_string()
    } else {
        attributes
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let dimension = DraftDimension {
        name: name.clone(),
        source: DimensionSource::Synthetic {
            parent: parent.to_string(),
            group: group.to_string(),
        },
        natural_key: NaturalKey::Positional { column: positional },
        attributes,
        calendar,
        scd_type,
        description: format!(
            "Synthetic `{group}` dimension derived from `{parent}` (attributes: {listed})"
        ),
    };
    let key = DraftDimensionKey {
        stem: snake_name(group),
        dimension: name,
        joins,
    };
    (dimension, key)
}

// ============================================================================
// Helpers
// ============================================================================

fn source_column(table: &str, column: &ClassifiedColumn) -> ModelColumn {
    ModelColumn::from_source(
        column.column.name.clone(),
        column.column.semantic_type.clone(),
        column.column.nullable,
        ColumnRef::new(table, column.column.name.clone()),
    )
}

fn scd_type_for(members: &[&ClassifiedColumn]) -> ScdType {
    if members.iter().any(|c| c.change_tracking) {
        ScdType::Type2
    } else {
        ScdType::Type1
    }
}
