use super::{column_type, quoted_list, surrogate_key_definition, CodegenOptions};
use crate::dialect::Dialect;
use crate::error::GenerationError;
use crate::keys::IS_CURRENT;
use crate::naming::{dimension_base, UniqueNames};
use crate::star::{DimensionTableSpec, FactTableSpec, NaturalKey, ScdType, StarSchema};
use std::fmt::Write;

/// Attributes per dimension exposed by the summary view.
const VIEW_ATTRIBUTES: usize = 3;

pub(super) fn statements(
    schema: &StarSchema,
    options: &CodegenOptions,
    warnings: &mut Vec<String>,
) -> Result<Vec<String>, GenerationError> {
    let dialect = options.dialect;
    let fact = &schema.fact_table;
    let view = view_name(fact);
    let mut out = Vec::new();

    // Drops run dependents first so re-runs start clean.
    if options.include_views {
        out.push(dialect.drop_view(&dialect.quote(&view)));
    }
    out.push(dialect.drop_table(&dialect.quote(&fact.name)));
    for dimension in schema.dimension_tables.iter().rev() {
        out.push(dialect.drop_table(&dialect.quote(&dimension.name)));
    }

    for dimension in &schema.dimension_tables {
        out.push(create_dimension(dimension, dialect, warnings)?);
        if options.include_indexes {
            out.extend(dimension_indexes(dimension, dialect));
        }
    }

    let partition = partition_column(fact, options);
    out.push(create_fact(schema, dialect, partition, warnings)?);
    if let Some(column) = partition {
        out.push(format!(
            "CREATE TABLE {} PARTITION OF {} DEFAULT;",
            dialect.quote(&format!("{}_default", fact.name)),
            dialect.quote(&fact.name)
        ));
        tracing::debug!(table = %fact.name, column, "partitioned fact table");
    }
    if options.include_indexes {
        for key in &fact.dimension_keys {
            out.push(index(dialect, false, &fact.name, &[key.column.name.as_str()]));
        }
    }

    if options.include_views {
        out.push(summary_view(schema, dialect, &view)?);
    }
    Ok(out)
}

pub(crate) fn view_name(fact: &FactTableSpec) -> String {
    format!("vw_{}_summary", fact.name)
}

fn partition_column<'a>(fact: &'a FactTableSpec, options: &CodegenOptions) -> Option<&'a str> {
    if !options.include_partitioning {
        return None;
    }
    let Some(column) = fact.partition_column.as_deref() else {
        tracing::info!(table = %fact.name, "partitioning requested but the fact has no date column");
        return None;
    };
    if !options.dialect.supports_partitioning() {
        tracing::info!(
            dialect = %options.dialect,
            table = %fact.name,
            "dialect has no native partitioning; partition clause omitted"
        );
        return None;
    }
    Some(column)
}

fn create_dimension(
    dimension: &DimensionTableSpec,
    dialect: Dialect,
    warnings: &mut Vec<String>,
) -> Result<String, GenerationError> {
    let mut lines = vec![format!(
        "{} {}",
        dialect.quote(&dimension.surrogate_key.name),
        surrogate_key_definition(dialect)
    )];
    for column in dimension.columns().into_iter().skip(1) {
        let ty = column_type(dialect, &dimension.name, column, warnings);
        lines.push(column_line(dialect, &column.name, &ty, column.nullable));
    }
    // Type 1 upserts conflict on the natural key, so its uniqueness is part of the table.
    if let (NaturalKey::Source { columns }, ScdType::Type1) =
        (&dimension.natural_key, dimension.scd_type)
    {
        let key: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        lines.push(format!(
            "CONSTRAINT {} UNIQUE ({})",
            dialect.quote(&format!("uq_{}_{}", dimension.name, key.join("_"))),
            quoted_list(dialect, key.iter().copied())
        ));
    }
    create_table(dialect, &dimension.name, &lines, None)
}

fn create_fact(
    schema: &StarSchema,
    dialect: Dialect,
    partition: Option<&str>,
    warnings: &mut Vec<String>,
) -> Result<String, GenerationError> {
    let fact = &schema.fact_table;
    let mut lines: Vec<String> = fact
        .columns()
        .into_iter()
        .map(|column| {
            let ty = column_type(dialect, &fact.name, column, warnings);
            column_line(dialect, &column.name, &ty, column.nullable)
        })
        .collect();
    for relationship in &schema.relationships {
        lines.push(format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            dialect.quote(&format!("fk_{}_{}", fact.name, relationship.from_column)),
            dialect.quote(&relationship.from_column),
            dialect.quote(&relationship.to_table),
            dialect.quote(&relationship.to_column)
        ));
    }
    let suffix = partition.map(|c| format!("PARTITION BY RANGE ({})", dialect.quote(c)));
    create_table(dialect, &fact.name, &lines, suffix.as_deref())
}

fn column_line(dialect: Dialect, name: &str, ty: &str, nullable: bool) -> String {
    if nullable {
        format!("{} {ty}", dialect.quote(name))
    } else {
        format!("{} {ty} NOT NULL", dialect.quote(name))
    }
}

fn create_table(
    dialect: Dialect,
    name: &str,
    lines: &[String],
    suffix: Option<&str>,
) -> Result<String, GenerationError> {
    let mut sql = String::new();
    writeln!(sql, "CREATE TABLE {} (", dialect.quote(name))?;
    writeln!(sql, "    {}", lines.join(",\n    "))?;
    match suffix {
        Some(suffix) => write!(sql, ") {suffix};")?,
        None => write!(sql, ");")?,
    }
    Ok(sql)
}

fn dimension_indexes(dimension: &DimensionTableSpec, dialect: Dialect) -> Vec<String> {
    let table = &dimension.name;
    let mut out = vec![index(dialect, true, table, &[dimension.surrogate_key.name.as_str()])];
    // Type 1 natural keys are already unique through the table constraint.
    if let (NaturalKey::Source { columns }, ScdType::Type2) =
        (&dimension.natural_key, dimension.scd_type)
    {
        let key: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        out.push(index(dialect, false, table, &key));
        let mut current = key.clone();
        current.push(IS_CURRENT);
        out.push(index(dialect, false, table, &current));
    }
    out
}

fn index(dialect: Dialect, unique: bool, table: &str, columns: &[&str]) -> String {
    let prefix = if unique { "ux" } else { "ix" };
    let name = format!("{prefix}_{table}_{}", columns.join("_"));
    format!(
        "CREATE {}INDEX {} ON {} ({});",
        if unique { "UNIQUE " } else { "" },
        dialect.quote(&name),
        dialect.quote(table),
        quoted_list(dialect, columns.iter().copied())
    )
}

/// Analytical view: fact joined to every dimension key, measures summed per
/// combination of a few descriptive attributes.
fn summary_view(
    schema: &StarSchema,
    dialect: Dialect,
    view: &str,
) -> Result<String, GenerationError> {
    let fact = &schema.fact_table;
    let mut aliases = UniqueNames::new();
    let mut select = Vec::new();
    let mut group_by = Vec::new();
    let mut joins = Vec::new();

    for (i, key) in fact.dimension_keys.iter().enumerate() {
        let Some(dimension) = schema.dimension(&key.dimension) else {
            continue;
        };
        let alias = format!("d{}", i + 1);
        joins.push(format!(
            "LEFT JOIN {} {alias} ON f.{} = {alias}.{}",
            dialect.quote(&dimension.name),
            dialect.quote(&key.column.name),
            dialect.quote(&dimension.surrogate_key.name)
        ));

        let shown: Vec<&str> = if dimension.attributes.is_empty() {
            dimension
                .natural_key
                .columns()
                .into_iter()
                .map(|c| c.name.as_str())
                .collect()
        } else {
            dimension
                .attributes
                .iter()
                .take(VIEW_ATTRIBUTES)
                .map(|c| c.name.as_str())
                .collect()
        };
        let prefix = key
            .column
            .name
            .strip_suffix("_key")
            .unwrap_or(dimension_base(&dimension.name));
        for column in shown {
            let expr = format!("{alias}.{}", dialect.quote(column));
            let label = aliases.allocate(&format!("{prefix}_{column}"));
            select.push(format!("{expr} AS {}", dialect.quote(&label)));
            group_by.push(expr);
        }
    }
    for measure in &fact.measures {
        let label = aliases.allocate(&format!("total_{}", measure.name));
        select.push(format!(
            "SUM(f.{}) AS {}",
            dialect.quote(&measure.name),
            dialect.quote(&label)
        ));
    }
    select.push(format!(
        "COUNT(*) AS {}",
        dialect.quote(&aliases.allocate("record_count"))
    ));

    let mut sql = String::new();
    writeln!(sql, "CREATE VIEW {} AS", dialect.quote(view))?;
    writeln!(sql, "SELECT")?;
    writeln!(sql, "    {}", select.join(",\n    "))?;
    write!(sql, "FROM {} f", dialect.quote(&fact.name))?;
    for join in &joins {
        write!(sql, "\n{join}")?;
    }
    if !group_by.is_empty() {
        write!(sql, "\nGROUP BY {}", group_by.join(", "))?;
    }
    sql.push(';');
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_draft;
    use crate::classify::ColumnClassifier;
    use crate::keys::assign_keys;
    use dimforge_ingest_sql::parse_sql_ddl;

    const SHOP: &str = r#"
        CREATE TABLE customers (id INT PRIMARY KEY, name VARCHAR(80), valid_from DATE);
        CREATE TABLE products (id INT PRIMARY KEY, title VARCHAR(80));
        CREATE TABLE orders (
            id INT PRIMARY KEY,
            customer_id INT REFERENCES customers(id),
            product_id INT REFERENCES products(id),
            order_date DATE,
            amount DECIMAL(10,2)
        );
    "#;

    fn schema(sql: &str) -> StarSchema {
        let analysis = parse_sql_ddl(sql).unwrap();
        let tables = ColumnClassifier::rules_only().classify_registry(&analysis.registry);
        assign_keys(build_draft("Test", &tables).unwrap()).unwrap()
    }

    fn ddl(options: CodegenOptions) -> Vec<String> {
        statements(&schema(SHOP), &options, &mut Vec::new()).unwrap()
    }

    fn position(ddl: &[String], needle: &str) -> usize {
        ddl.iter()
            .position(|s| s.starts_with(needle))
            .unwrap_or_else(|| panic!("missing `{needle}`"))
    }

    #[test]
    fn test_drops_precede_creates_and_dimensions_precede_fact() {
        let ddl = ddl(CodegenOptions::default());
        assert!(ddl[0].starts_with("DROP VIEW IF EXISTS \"vw_fact_orders_summary\""));
        assert_eq!(ddl[1], "DROP TABLE IF EXISTS \"fact_orders\" CASCADE;");
        let fact = position(&ddl, "CREATE TABLE \"fact_orders\"");
        for dim in ["dim_customers", "dim_products", "dim_date"] {
            let drop = position(&ddl, &format!("DROP TABLE IF EXISTS \"{dim}\""));
            let create = position(&ddl, &format!("CREATE TABLE \"{dim}\""));
            assert!(drop < create && create < fact, "{dim}");
        }
        assert!(position(&ddl, "CREATE VIEW") > fact);
    }

    #[test]
    fn test_fact_references_surrogate_keys() {
        let ddl = ddl(CodegenOptions::default());
        let fact = &ddl[position(&ddl, "CREATE TABLE \"fact_orders\"")];
        assert!(fact.contains(
            "FOREIGN KEY (\"customer_key\") REFERENCES \"dim_customers\" (\"customers_key\")"
        ));
        assert!(!fact.contains("REFERENCES \"dim_customers\" (\"id\")"));
        let dim = &ddl[position(&ddl, "CREATE TABLE \"dim_customers\"")];
        assert!(dim.contains("\"customers_key\" SERIAL PRIMARY KEY"));
        assert!(dim.contains("\"end_date\" DATE,"));
        assert!(dim.contains("\"is_current\" BOOLEAN NOT NULL"));
    }

    #[test]
    fn test_indexes_follow_scd_type() {
        let ddl = ddl(CodegenOptions::default());
        assert!(ddl.contains(
            &"CREATE UNIQUE INDEX \"ux_dim_products_products_key\" ON \"dim_products\" (\"products_key\");"
                .to_string()
        ));
        assert!(ddl.iter().all(|s| !s.contains("INDEX \"ux_dim_products_id\"")));
        assert!(ddl.contains(
            &"CREATE INDEX \"ix_dim_customers_id_is_current\" ON \"dim_customers\" (\"id\", \"is_current\");"
                .to_string()
        ));
        assert!(ddl.contains(
            &"CREATE INDEX \"ix_fact_orders_customer_key\" ON \"fact_orders\" (\"customer_key\");"
                .to_string()
        ));

        let bare = self::ddl(CodegenOptions {
            include_indexes: false,
            include_views: false,
            ..CodegenOptions::default()
        });
        assert!(bare.iter().all(|s| !s.contains("INDEX") && !s.contains("VIEW")));
    }

    #[test]
    fn test_type1_natural_key_unique_without_indexes() {
        for dialect in Dialect::ALL {
            let ddl = ddl(CodegenOptions {
                dialect,
                include_indexes: false,
                ..CodegenOptions::default()
            });
            let products = ddl
                .iter()
                .find(|s| s.starts_with(&format!("CREATE TABLE {}", dialect.quote("dim_products"))))
                .unwrap();
            let constraint = format!(
                "CONSTRAINT {} UNIQUE ({})",
                dialect.quote("uq_dim_products_id"),
                dialect.quote("id")
            );
            assert!(products.contains(&constraint), "{dialect}: {products}");

            // Type 2 keeps one row per version, so its natural key stays non-unique.
            let customers = ddl
                .iter()
                .find(|s| s.starts_with(&format!("CREATE TABLE {}", dialect.quote("dim_customers"))))
                .unwrap();
            assert!(!customers.contains("UNIQUE"), "{dialect}");
        }
    }

    #[test]
    fn test_partitioning_only_where_supported() {
        let pg = ddl(CodegenOptions {
            include_partitioning: true,
            ..CodegenOptions::default()
        });
        let fact = &pg[position(&pg, "CREATE TABLE \"fact_orders\" (")];
        assert!(fact.ends_with(") PARTITION BY RANGE (\"order_date\");"));
        position(&pg, "CREATE TABLE \"fact_orders_default\" PARTITION OF \"fact_orders\" DEFAULT;");

        let mysql = ddl(CodegenOptions {
            dialect: Dialect::Mysql,
            include_partitioning: true,
            ..CodegenOptions::default()
        });
        assert!(mysql.iter().all(|s| !s.contains("PARTITION")));
        assert!(mysql
            .iter()
            .any(|s| s.contains("`customers_key` INT NOT NULL AUTO_INCREMENT PRIMARY KEY")));
    }

    #[test]
    fn test_summary_view_shape() {
        let ddl = ddl(CodegenOptions {
            dialect: Dialect::Sqlite,
            ..CodegenOptions::default()
        });
        let view = ddl.last().unwrap();
        assert!(view.starts_with("CREATE VIEW \"vw_fact_orders_summary\" AS"));
        assert!(view.contains("d1.\"name\" AS \"customer_name\""));
        assert!(view.contains("SUM(f.\"amount\") AS \"total_amount\""));
        assert!(view.contains("COUNT(*) AS \"record_count\""));
        assert!(view.contains(
            "LEFT JOIN \"dim_products\" d2 ON f.\"product_key\" = d2.\"products_key\""
        ));
        assert!(view.contains("GROUP BY d1.\"name\""));
    }
}
