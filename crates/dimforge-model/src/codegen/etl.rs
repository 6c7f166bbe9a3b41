use super::{calendar, staging_table};
use crate::dialect::Dialect;
use crate::error::GenerationError;
use crate::keys::{EFFECTIVE_DATE, END_DATE, IS_CURRENT};
use crate::star::{DimensionSource, DimensionTableSpec, ModelColumn, ScdType, StarSchema};
use std::collections::BTreeMap;
use std::fmt::Write;

pub(super) fn templates(
    schema: &StarSchema,
    dialect: Dialect,
) -> Result<BTreeMap<String, String>, GenerationError> {
    let mut out = BTreeMap::new();
    for dimension in &schema.dimension_tables {
        let sql = match (&dimension.source, dimension.scd_type) {
            (DimensionSource::Synthetic { parent, .. }, _) => synthetic_load(dimension, parent, dialect)?,
            (DimensionSource::Table { table }, ScdType::Type1) => upsert(dimension, table, dialect)?,
            (DimensionSource::Table { table }, ScdType::Type2) => {
                expire_then_insert(dimension, table, dialect)?
            }
        };
        out.insert(format!("load_{}", dimension.name), sql);
    }
    out.insert(
        format!("load_{}", schema.fact_table.name),
        fact_load(schema, dialect)?,
    );
    Ok(out)
}

struct Names {
    targets: Vec<String>,
    sources: Vec<String>,
}

/// Dimension-side and staging-side column lists for `columns`.
fn names(dialect: Dialect, alias: &str, columns: &[&ModelColumn]) -> Names {
    Names {
        targets: columns.iter().map(|c| dialect.quote(&c.name)).collect(),
        sources: columns
            .iter()
            .map(|c| format!("{alias}.{}", dialect.quote(c.source_column())))
            .collect(),
    }
}

/// Type 1: insert new natural keys, overwrite attributes of existing ones.
fn upsert(
    dimension: &DimensionTableSpec,
    source: &str,
    dialect: Dialect,
) -> Result<String, GenerationError> {
    let target = dialect.quote(&dimension.name);
    let staging = dialect.quote(&staging_table(source));
    let key = dimension.natural_key.columns();
    let business = dimension.business_columns();
    let all = names(dialect, "s", &business);
    let key_names = names(dialect, "s", &key);
    let attributes: Vec<&ModelColumn> = dimension.attributes.iter().collect();
    let attr_names = names(dialect, "s", &attributes);

    let mut sql = String::new();
    match dialect {
        Dialect::Postgresql | Dialect::Sqlite => {
            writeln!(sql, "INSERT INTO {target} ({})", all.targets.join(", "))?;
            writeln!(sql, "SELECT {}", all.sources.join(", "))?;
            writeln!(sql, "FROM {staging} s")?;
            if dialect == Dialect::Sqlite {
                // SQLite needs a WHERE before ON CONFLICT when inserting from a SELECT.
                writeln!(sql, "WHERE 1 = 1")?;
            }
            write!(sql, "ON CONFLICT ({}) ", key_names.targets.join(", "))?;
            if attributes.is_empty() {
                write!(sql, "DO NOTHING;")?;
            } else {
                let sets: Vec<String> = attr_names
                    .targets
                    .iter()
                    .map(|t| format!("{t} = EXCLUDED.{t}"))
                    .collect();
                write!(sql, "DO UPDATE SET\n    {};", sets.join(",\n    "))?;
            }
        }
        Dialect::Mysql => {
            writeln!(sql, "INSERT INTO {target} ({})", all.targets.join(", "))?;
            writeln!(sql, "SELECT {}", all.sources.join(", "))?;
            writeln!(sql, "FROM {staging} s")?;
            let sets: Vec<String> = if attributes.is_empty() {
                key_names.targets.iter().map(|t| format!("{t} = {t}")).collect()
            } else {
                attr_names
                    .targets
                    .iter()
                    .map(|t| format!("{t} = VALUES({t})"))
                    .collect()
            };
            write!(sql, "ON DUPLICATE KEY UPDATE\n    {};", sets.join(",\n    "))?;
        }
        Dialect::Sqlserver | Dialect::Ansi => {
            let on: Vec<String> = key_names
                .targets
                .iter()
                .zip(&key_names.sources)
                .map(|(t, s)| format!("t.{t} = {s}"))
                .collect();
            writeln!(sql, "MERGE INTO {target} t")?;
            writeln!(sql, "USING {staging} s")?;
            writeln!(sql, "    ON {}", on.join(" AND "))?;
            if !attributes.is_empty() {
                let sets: Vec<String> = attr_names
                    .targets
                    .iter()
                    .zip(&attr_names.sources)
                    .map(|(t, s)| format!("{t} = {s}"))
                    .collect();
                writeln!(sql, "WHEN MATCHED THEN UPDATE SET")?;
                writeln!(sql, "    {}", sets.join(",\n    "))?;
            }
            writeln!(sql, "WHEN NOT MATCHED THEN INSERT ({})", all.targets.join(", "))?;
            write!(sql, "    VALUES ({});", all.sources.join(", "))?;
        }
    }
    Ok(sql)
}

/// Type 2: close the current version of changed rows, then insert a new
/// current version for every natural key without one.
fn expire_then_insert(
    dimension: &DimensionTableSpec,
    source: &str,
    dialect: Dialect,
) -> Result<String, GenerationError> {
    let target = dialect.quote(&dimension.name);
    let staging = dialect.quote(&staging_table(source));
    let key = dimension.natural_key.columns();
    let business = dimension.business_columns();
    let all = names(dialect, "s", &business);
    let key_names = names(dialect, "s", &key);
    let attributes: Vec<&ModelColumn> = dimension.attributes.iter().collect();
    let attr_names = names(dialect, "s", &attributes);
    let today = dialect.current_date();
    let yes = dialect.bool_literal(true);
    let no = dialect.bool_literal(false);
    let is_current = dialect.quote(IS_CURRENT);

    let key_match = |qualifier: &str| -> String {
        key_names
            .targets
            .iter()
            .zip(&key_names.sources)
            .map(|(t, s)| format!("{s} = {qualifier}.{t}"))
            .collect::<Vec<_>>()
            .join(" AND ")
    };

    let mut sql = String::new();
    writeln!(
        sql,
        "UPDATE {target} SET {} = {today}, {is_current} = {no}",
        dialect.quote(END_DATE)
    )?;
    writeln!(sql, "WHERE {target}.{is_current} = {yes}")?;
    write!(
        sql,
        "  AND EXISTS (SELECT 1 FROM {staging} s WHERE {}",
        key_match(target.as_str())
    )?;
    if !attributes.is_empty() {
        let changed: Vec<String> = attr_names
            .targets
            .iter()
            .zip(&attr_names.sources)
            .map(|(t, s)| format!("{s} <> {target}.{t}"))
            .collect();
        write!(sql, " AND ({})", changed.join(" OR "))?;
    }
    writeln!(sql, ");")?;
    writeln!(sql)?;

    let mut columns = all.targets.clone();
    columns.extend([EFFECTIVE_DATE, END_DATE, IS_CURRENT].map(|c| dialect.quote(c)));
    let mut values = all.sources.clone();
    values.extend([today.to_string(), "NULL".to_string(), yes.to_string()]);
    writeln!(sql, "INSERT INTO {target} ({})", columns.join(", "))?;
    writeln!(sql, "SELECT {}", values.join(", "))?;
    writeln!(sql, "FROM {staging} s")?;
    write!(
        sql,
        "WHERE NOT EXISTS (SELECT 1 FROM {target} d WHERE {} AND d.{is_current} = {yes});",
        key_match("d")
    )?;
    Ok(sql)
}

/// Synthetic dimensions: one row per distinct attribute combination of the parent.
fn synthetic_load(
    dimension: &DimensionTableSpec,
    parent: &str,
    dialect: Dialect,
) -> Result<String, GenerationError> {
    let target = dialect.quote(&dimension.name);
    let positional = dimension
        .natural_key
        .columns()
        .first()
        .map(|c| dialect.quote(&c.name))
        .unwrap_or_default();
    let attributes: Vec<&ModelColumn> = dimension.attributes.iter().collect();
    let mut history_targets = Vec::new();
    let mut history_values = Vec::new();
    if dimension.scd_type == ScdType::Type2 {
        history_targets = [EFFECTIVE_DATE, END_DATE, IS_CURRENT]
            .map(|c| dialect.quote(c))
            .to_vec();
        history_values = vec![
            dialect.current_date().to_string(),
            "NULL".to_string(),
            dialect.bool_literal(true).to_string(),
        ];
    }

    let mut sql = String::new();
    if attributes.is_empty() {
        let mut columns = vec![positional];
        columns.extend(history_targets);
        let mut values = vec!["1".to_string()];
        values.extend(history_values);
        write!(
            sql,
            "INSERT INTO {target} ({}) VALUES ({});",
            columns.join(", "),
            values.join(", ")
        )?;
        return Ok(sql);
    }

    let grouped = names(dialect, "g", &attributes);
    let distinct = names(dialect, "s", &attributes);
    let mut columns = vec![positional];
    columns.extend(grouped.targets.iter().cloned());
    let projected: Vec<String> = attributes
        .iter()
        .map(|a| format!("g.{}", dialect.quote(&a.name)))
        .collect();
    let picked: Vec<String> = attributes
        .iter()
        .zip(&distinct.sources)
        .map(|(a, s)| format!("{s} AS {}", dialect.quote(&a.name)))
        .collect();
    let mut values = vec![format!(
        "ROW_NUMBER() OVER (ORDER BY {})",
        projected.join(", ")
    )];
    values.extend(projected.iter().cloned());
    if let Some(parts) = &dimension.calendar {
        let date = format!("g.{}", dialect.quote(&parts.date_column));
        for column in &parts.columns {
            columns.push(dialect.quote(&column.column.name));
            values.push(calendar::expression(dialect, column.part, &date));
        }
    }
    columns.extend(history_targets);
    values.extend(history_values);

    writeln!(sql, "INSERT INTO {target} ({})", columns.join(", "))?;
    writeln!(sql, "SELECT {}", values.join(", "))?;
    write!(
        sql,
        "FROM (SELECT DISTINCT {} FROM {} s) g;",
        picked.join(", "),
        dialect.quote(&staging_table(parent))
    )?;
    Ok(sql)
}

/// Fact: resolve every dimension key by joining staging rows to the dimension.
fn fact_load(schema: &StarSchema, dialect: Dialect) -> Result<String, GenerationError> {
    let fact = &schema.fact_table;
    let staging = dialect.quote(&staging_table(&fact.source_table));
    let mut columns = Vec::new();
    let mut values = Vec::new();
    let mut joins = Vec::new();

    for (i, key) in fact.dimension_keys.iter().enumerate() {
        let Some(dimension) = schema.dimension(&key.dimension) else {
            continue;
        };
        let alias = format!("d{}", i + 1);
        columns.push(dialect.quote(&key.column.name));
        values.push(format!("{alias}.{}", dialect.quote(&dimension.surrogate_key.name)));

        let mut on: Vec<String> = key
            .joins
            .iter()
            .map(|j| {
                format!(
                    "{alias}.{} = s.{}",
                    dialect.quote(&j.dimension_column),
                    dialect.quote(&j.fact_column)
                )
            })
            .collect();
        if on.is_empty() {
            on.push("1 = 1".to_string());
        }
        if dimension.scd_type == ScdType::Type2 {
            on.push(format!(
                "{alias}.{} = {}",
                dialect.quote(IS_CURRENT),
                dialect.bool_literal(true)
            ));
        }
        joins.push(format!(
            "LEFT JOIN {} {alias} ON {}",
            dialect.quote(&dimension.name),
            on.join(" AND ")
        ));
    }
    for column in fact.degenerate_attributes.iter().chain(fact.measures.iter()) {
        columns.push(dialect.quote(&column.name));
        values.push(format!("s.{}", dialect.quote(column.source_column())));
    }

    let mut sql = String::new();
    writeln!(
        sql,
        "INSERT INTO {} ({})",
        dialect.quote(&fact.name),
        columns.join(", ")
    )?;
    writeln!(sql, "SELECT {}", values.join(", "))?;
    write!(sql, "FROM {staging} s")?;
    for join in &joins {
        write!(sql, "\n{join}")?;
    }
    sql.push(';');
    Ok(sql)
}
