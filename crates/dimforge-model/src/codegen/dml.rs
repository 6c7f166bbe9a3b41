use super::{calendar, quoted_list, CodegenOptions};
use crate::dialect::Dialect;
use crate::error::GenerationError;
use crate::keys::{EFFECTIVE_DATE, END_DATE};
use crate::star::{DimensionKey, DimensionSource, DimensionTableSpec, ModelColumn, StarSchema};
use dimforge_ingest_sql::{SampleRow, SampleRows, SampleValue, SemanticType};
use std::collections::BTreeMap;
use std::fmt::Write;

const HISTORY_START: &str = "1900-01-01";

/// Business rows loaded into one dimension, kept to resolve fact keys.
struct DimensionRows<'a> {
    dimension: &'a DimensionTableSpec,
    /// Values keyed by lowercased dimension column name; surrogate = index + 1.
    rows: Vec<SampleRow>,
    placeholder: bool,
}

pub(super) fn blocks(
    schema: &StarSchema,
    samples: &SampleRows,
    options: &CodegenOptions,
) -> Result<BTreeMap<String, String>, GenerationError> {
    let dialect = options.dialect;
    let mut out = BTreeMap::new();
    let mut loaded = Vec::with_capacity(schema.dimension_tables.len());

    for dimension in &schema.dimension_tables {
        let rows = dimension_rows(dimension, samples, options.placeholder_rows);
        out.insert(dimension.name.clone(), dimension_block(&rows, dialect)?);
        loaded.push(rows);
    }
    out.insert(
        schema.fact_table.name.clone(),
        fact_block(schema, samples, &loaded, options)?,
    );
    Ok(out)
}

fn dimension_rows<'a>(
    dimension: &'a DimensionTableSpec,
    samples: &SampleRows,
    placeholder_rows: usize,
) -> DimensionRows<'a> {
    let source_rows = samples.rows(dimension.source.table());
    let business = dimension.business_columns();

    let rows: Vec<SampleRow> = match &dimension.source {
        DimensionSource::Table { .. } => source_rows
            .iter()
            .map(|row| project(row, business.iter().copied()))
            .collect(),
        DimensionSource::Synthetic { .. } => {
            let mut distinct: Vec<SampleRow> = Vec::new();
            for row in source_rows {
                let projected = project(row, dimension.attributes.iter());
                if !distinct.contains(&projected) {
                    distinct.push(projected);
                }
            }
            distinct
        }
    };
    if !rows.is_empty() {
        return DimensionRows {
            dimension,
            rows,
            placeholder: false,
        };
    }

    let rows = (1..=placeholder_rows)
        .map(|i| {
            business
                .iter()
                .map(|c| (c.name.to_ascii_lowercase(), placeholder(c, i)))
                .collect()
        })
        .collect();
    DimensionRows {
        dimension,
        rows,
        placeholder: true,
    }
}

/// Pick `columns` out of a source row, keyed by the model column's own name.
fn project<'a>(row: &SampleRow, columns: impl IntoIterator<Item = &'a ModelColumn>) -> SampleRow {
    columns
        .into_iter()
        .map(|c| {
            let value = row
                .get(&c.source_column().to_ascii_lowercase())
                .cloned()
                .unwrap_or(SampleValue::Null);
            (c.name.to_ascii_lowercase(), value)
        })
        .collect()
}

fn dimension_block(rows: &DimensionRows<'_>, dialect: Dialect) -> Result<String, GenerationError> {
    let dimension = rows.dimension;
    let columns = dimension.columns();
    let positional = dimension.natural_key.is_positional();

    let values: Vec<Vec<String>> = rows
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let ordinal = (i + 1).to_string();
            let mut cells = vec![ordinal.clone()];
            if positional {
                cells.push(ordinal);
            }
            for column in &dimension.business_columns()[usize::from(positional)..] {
                let value = row
                    .get(&column.name.to_ascii_lowercase())
                    .cloned()
                    .unwrap_or(SampleValue::Null);
                cells.push(cell(dialect, column, value, i + 1));
            }
            if let Some(parts) = &dimension.calendar {
                let date = row
                    .get(&parts.date_column.to_ascii_lowercase())
                    .and_then(calendar::sample_date);
                for column in &parts.columns {
                    let value = date.map_or(SampleValue::Null, |d| calendar::value(column.part, d));
                    cells.push(render_literal(dialect, &value, &column.column.semantic_type));
                }
            }
            for column in &dimension.history_columns {
                cells.push(history_value(dialect, column));
            }
            cells
        })
        .collect();

    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    let insert = insert_block(dialect, &dimension.name, &names, &values)?;
    if dialect == Dialect::Sqlserver && !values.is_empty() {
        let table = dialect.quote(&dimension.name);
        return Ok(format!(
            "SET IDENTITY_INSERT {table} ON;\n{insert}\nSET IDENTITY_INSERT {table} OFF;"
        ));
    }
    Ok(insert)
}

fn history_value(dialect: Dialect, column: &ModelColumn) -> String {
    match column.name.as_str() {
        EFFECTIVE_DATE => format!("'{HISTORY_START}'"),
        END_DATE => "NULL".to_string(),
        _ => dialect.bool_literal(true).to_string(),
    }
}

fn fact_block(
    schema: &StarSchema,
    samples: &SampleRows,
    loaded: &[DimensionRows<'_>],
    options: &CodegenOptions,
) -> Result<String, GenerationError> {
    let dialect = options.dialect;
    let fact = &schema.fact_table;
    let source_rows = samples.rows(&fact.source_table);
    let payload: Vec<&ModelColumn> = fact
        .degenerate_attributes
        .iter()
        .chain(fact.measures.iter())
        .collect();

    let mut values = Vec::new();
    if source_rows.is_empty() {
        for i in 1..=options.placeholder_rows {
            let mut cells: Vec<String> = fact
                .dimension_keys
                .iter()
                .map(|key| match find_rows(loaded, key) {
                    Some(rows) if !rows.rows.is_empty() => ((i - 1) % rows.rows.len() + 1).to_string(),
                    _ => "NULL".to_string(),
                })
                .collect();
            cells.extend(
                payload
                    .iter()
                    .map(|c| render_literal(dialect, &placeholder(c, i), &c.semantic_type)),
            );
            values.push(cells);
        }
    } else {
        for (i, row) in source_rows.iter().enumerate() {
            let mut cells: Vec<String> = fact
                .dimension_keys
                .iter()
                .map(|key| match resolve_key(loaded, key, row, i) {
                    Some(surrogate) => surrogate.to_string(),
                    None => "NULL".to_string(),
                })
                .collect();
            for column in &payload {
                let value = row
                    .get(&column.source_column().to_ascii_lowercase())
                    .cloned()
                    .unwrap_or(SampleValue::Null);
                cells.push(cell(dialect, column, value, i + 1));
            }
            values.push(cells);
        }
    }

    let columns = fact.columns();
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    insert_block(dialect, &fact.name, &names, &values)
}

fn find_rows<'a, 'b>(loaded: &'b [DimensionRows<'a>], key: &DimensionKey) -> Option<&'b DimensionRows<'a>> {
    loaded.iter().find(|d| d.dimension.name == key.dimension)
}

/// Surrogate key for one fact row: matched on the key's joins against
/// sample-backed dimensions, cycled through placeholder dimensions.
fn resolve_key(
    loaded: &[DimensionRows<'_>],
    key: &DimensionKey,
    row: &SampleRow,
    row_index: usize,
) -> Option<usize> {
    let rows = find_rows(loaded, key)?;
    if rows.rows.is_empty() {
        return None;
    }
    if rows.placeholder {
        return Some(row_index % rows.rows.len() + 1);
    }
    if key.joins.is_empty() {
        return Some(1);
    }
    rows.rows
        .iter()
        .position(|candidate| {
            key.joins.iter().all(|join| {
                let fact_value = row.get(&join.fact_column.to_ascii_lowercase());
                let dim_value = candidate.get(&join.dimension_column.to_ascii_lowercase());
                match (fact_value, dim_value) {
                    (Some(a), Some(b)) if !a.is_null() && !b.is_null() => a.to_string() == b.to_string(),
                    _ => false,
                }
            })
        })
        .map(|p| p + 1)
}

/// Render a value for a column, substituting a placeholder when a NOT NULL column has no value.
fn cell(dialect: Dialect, column: &ModelColumn, value: SampleValue, ordinal: usize) -> String {
    let value = if value.is_null() && !column.nullable {
        placeholder(column, ordinal)
    } else {
        value
    };
    render_literal(dialect, &value, &column.semantic_type)
}

/// Deterministic stand-in value for the `ordinal`-th row.
fn placeholder(column: &ModelColumn, ordinal: usize) -> SampleValue {
    let day = ordinal.saturating_sub(1) % 28 + 1;
    match &column.semantic_type {
        SemanticType::Integer => SampleValue::number_from_literal(&ordinal.to_string()),
        SemanticType::Decimal { scale: Some(0), .. } => {
            SampleValue::number_from_literal(&(ordinal * 10).to_string())
        }
        SemanticType::Decimal { .. } => {
            SampleValue::number_from_literal(&format!("{}.{:02}", ordinal * 10, (ordinal * 25) % 100))
        }
        SemanticType::Date => SampleValue::Text(format!("2024-01-{day:02}")),
        SemanticType::Timestamp => SampleValue::Text(format!("2024-01-{day:02} 00:00:00")),
        SemanticType::Boolean => SampleValue::Bool(ordinal % 2 == 1),
        SemanticType::Text { max_length } => {
            let mut text = format!("{}_{ordinal}", column.name);
            if let Some(max) = max_length.and_then(|m| usize::try_from(m).ok()).filter(|m| *m > 0) {
                text = text.chars().take(max).collect();
            }
            SampleValue::Text(text)
        }
        SemanticType::Other { .. } => SampleValue::Text(format!("{}_{ordinal}", column.name)),
    }
}

/// SQL literal for `value` stored into a column of type `ty`.
pub fn render_literal(dialect: Dialect, value: &SampleValue, ty: &SemanticType) -> String {
    match (value, ty) {
        (SampleValue::Null, _) => "NULL".to_string(),
        (SampleValue::Bool(b), SemanticType::Boolean) => dialect.bool_literal(*b).to_string(),
        (SampleValue::Bool(b), t) if t.is_numeric() => u8::from(*b).to_string(),
        (SampleValue::Number(n), SemanticType::Boolean) => {
            let truthy = n.as_f64().is_some_and(|f| f != 0.0);
            dialect.bool_literal(truthy).to_string()
        }
        (SampleValue::Number(n), t) if t.is_numeric() => n.to_string(),
        (SampleValue::Text(s), t) if t.is_numeric() => {
            let trimmed = s.trim();
            match trimmed.parse::<f64>() {
                Ok(f) if f.is_finite() => trimmed.to_string(),
                _ => "NULL".to_string(),
            }
        }
        (SampleValue::Text(s), SemanticType::Boolean) => {
            match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" => dialect.bool_literal(true).to_string(),
                "false" | "f" | "no" | "n" | "0" => dialect.bool_literal(false).to_string(),
                _ => "NULL".to_string(),
            }
        }
        (other, _) => quote_string(dialect, &other.to_string()),
    }
}

fn quote_string(dialect: Dialect, s: &str) -> String {
    let escaped = s.replace('\'', "''");
    match dialect {
        Dialect::Mysql => format!("'{}'", escaped.replace('\\', "\\\\")),
        _ => format!("'{escaped}'"),
    }
}

fn insert_block(
    dialect: Dialect,
    table: &str,
    columns: &[&str],
    rows: &[Vec<String>],
) -> Result<String, GenerationError> {
    let mut sql = String::new();
    if rows.is_empty() {
        write!(sql, "-- no rows for {table}")?;
        return Ok(sql);
    }
    writeln!(
        sql,
        "INSERT INTO {} ({}) VALUES",
        dialect.quote(table),
        quoted_list(dialect, columns.iter().copied())
    )?;
    let tuples: Vec<String> = rows
        .iter()
        .map(|cells| format!("    ({})", cells.join(", ")))
        .collect();
    write!(sql, "{};", tuples.join(",\n"))?;
    Ok(sql)
}
