//! Property tests over randomly shaped source schemas.

use dimforge_ingest_sql::{parse_sql_ddl, TypeFamily};
use dimforge_model::{ModelRequest, ModelingApproach, ModelingEngine, StarSchema};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

const COLUMN_TYPES: &[&str] = &[
    "INT",
    "DECIMAL(10,2)",
    "VARCHAR(40)",
    "TEXT",
    "DATE",
    "TIMESTAMP",
    "BOOLEAN",
];

/// Names that exercise the grouping vocabulary of flat tables.
const FLAT_VOCABULARY: &[(&str, &str)] = &[
    ("customer_name", "VARCHAR(100)"),
    ("customer_email", "VARCHAR(100)"),
    ("city", "VARCHAR(50)"),
    ("postal_code", "VARCHAR(10)"),
    ("status", "VARCHAR(20)"),
    ("is_active", "BOOLEAN"),
    ("order_date", "DATE"),
    ("valid_from", "DATE"),
    ("amount", "DECIMAL(10,2)"),
    ("qty", "INT"),
    ("vehicle_plate", "VARCHAR(12)"),
    ("product_sku", "VARCHAR(30)"),
    ("notes", "TEXT"),
];

#[derive(Debug, Clone)]
struct SourceTable {
    name: String,
    columns: Vec<(String, String)>,
}

fn ident(prefix: &'static str) -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-z][a-z0-9]{0,6}")
        .unwrap()
        .prop_map(move |s| format!("{prefix}{s}"))
}

fn columns(prefix: &'static str, max: usize) -> impl Strategy<Value = Vec<(String, String)>> {
    proptest::collection::btree_map(
        ident(prefix),
        proptest::sample::select(COLUMN_TYPES).prop_map(str::to_string),
        0..max,
    )
    .prop_map(|m| m.into_iter().collect())
}

/// Dimension-like tables with an `id` key plus a fact referencing each of them.
fn star_source() -> impl Strategy<Value = (Vec<SourceTable>, SourceTable)> {
    proptest::collection::btree_map(ident("t_"), columns("c_", 5), 1..4).prop_flat_map(|dims| {
        let dims: Vec<SourceTable> = dims
            .into_iter()
            .map(|(name, mut cols)| {
                cols.insert(0, ("id".to_string(), "INT PRIMARY KEY".to_string()));
                SourceTable { name, columns: cols }
            })
            .collect();
        (Just(dims), columns("m_", 4))
    })
    .prop_map(|(dims, extra)| {
        let mut fact_columns: Vec<(String, String)> = dims
            .iter()
            .map(|d| {
                (
                    format!("{}_id", d.name),
                    format!("INT REFERENCES {}(id)", d.name),
                )
            })
            .collect();
        fact_columns.push(("amount".to_string(), "DECIMAL(12,2)".to_string()));
        fact_columns.extend(extra);
        let fact = SourceTable {
            name: "f_events".to_string(),
            columns: fact_columns,
        };
        (dims, fact)
    })
}

fn flat_source() -> impl Strategy<Value = SourceTable> {
    (
        proptest::sample::subsequence(FLAT_VOCABULARY.to_vec(), 0..FLAT_VOCABULARY.len()),
        columns("x_", 6),
    )
        .prop_map(|(known, extra)| {
            let mut cols: Vec<(String, String)> = known
                .into_iter()
                .map(|(n, t)| (n.to_string(), t.to_string()))
                .collect();
            cols.extend(extra);
            if cols.is_empty() {
                cols.push(("x_only".to_string(), "TEXT".to_string()));
            }
            SourceTable {
                name: "flat_import".to_string(),
                columns: cols,
            }
        })
}

fn render(table: &SourceTable) -> String {
    let cols: Vec<String> = table
        .columns
        .iter()
        .map(|(n, t)| format!("{n} {t}"))
        .collect();
    format!("CREATE TABLE {} ({});", table.name, cols.join(", "))
}

fn script(dims: &[SourceTable], fact: &SourceTable) -> String {
    dims.iter()
        .chain(std::iter::once(fact))
        .map(render)
        .collect::<Vec<_>>()
        .join("\n")
}

type ColumnShape = Vec<(String, TypeFamily)>;

/// Table -> columns with their type family, as declared by the model.
fn model_shape(schema: &StarSchema) -> BTreeMap<String, ColumnShape> {
    let mut out = BTreeMap::new();
    for dimension in &schema.dimension_tables {
        out.insert(
            dimension.name.clone(),
            dimension
                .columns()
                .into_iter()
                .map(|c| (c.name.clone(), c.semantic_type.family()))
                .collect(),
        );
    }
    out.insert(
        schema.fact_table.name.clone(),
        schema
            .fact_table
            .columns()
            .into_iter()
            .map(|c| (c.name.clone(), c.semantic_type.family()))
            .collect(),
    );
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn generation_is_deterministic((dims, fact) in star_source()) {
        let engine = ModelingEngine::default();
        let sql = script(&dims, &fact);
        let first = engine.generate(ModelRequest::new(sql.clone())).unwrap();
        let mut second = engine.generate(ModelRequest::new(sql)).unwrap();
        second.star_schema.metadata.created_at = first.star_schema.metadata.created_at;
        prop_assert_eq!(first, second);
    }

    #[test]
    fn flat_tables_always_model(table in flat_source()) {
        let response = ModelingEngine::default()
            .generate(ModelRequest::new(render(&table)))
            .unwrap();
        let schema = &response.star_schema;
        prop_assert_eq!(schema.metadata.modeling_approach, ModelingApproach::Denormalized);
        prop_assert!(!schema.dimension_tables.is_empty());
        prop_assert_eq!(schema.relationships.len(), schema.fact_table.dimension_keys.len());
        prop_assert_eq!(response.load_order.len(), schema.dimension_tables.len() + 1);
    }

    #[test]
    fn every_fact_key_points_at_a_surrogate_key((dims, fact) in star_source()) {
        let response = ModelingEngine::default()
            .generate(ModelRequest::new(script(&dims, &fact)))
            .unwrap();
        let schema = &response.star_schema;
        for relationship in &schema.relationships {
            let dimension = schema.dimension(&relationship.to_table).unwrap();
            prop_assert_eq!(&relationship.to_column, &dimension.surrogate_key.name);
            prop_assert!(schema
                .fact_table
                .dimension_keys
                .iter()
                .any(|k| k.column.name == relationship.from_column));
        }
        let mut names = BTreeSet::new();
        for dimension in &schema.dimension_tables {
            prop_assert!(names.insert(dimension.name.to_ascii_lowercase()));
        }
    }

    #[test]
    fn generated_ddl_parses_back_to_the_model(
        (dims, fact) in star_source(),
        dialect in proptest::sample::select(vec!["postgresql", "mysql", "sqlite"]),
    ) {
        let mut request = ModelRequest::new(script(&dims, &fact));
        request.dialect = Some(dialect.to_string());
        request.include_partitioning = Some(false);
        let response = ModelingEngine::default().generate(request).unwrap();
        let schema = &response.star_schema;

        let reparsed = parse_sql_ddl(&response.ddl_statements.join("\n")).unwrap();
        let expected = model_shape(schema);
        let tables: BTreeSet<&str> = reparsed.registry.iter().map(|t| t.name.as_str()).collect();
        prop_assert_eq!(tables, expected.keys().map(String::as_str).collect::<BTreeSet<_>>());

        for (name, columns) in &expected {
            let table = reparsed.registry.get(name).unwrap();
            let parsed: ColumnShape = table
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.semantic_type.family()))
                .collect();
            prop_assert_eq!(&parsed, columns, "table {}", name);
        }

        let fact_table = reparsed.registry.get(&schema.fact_table.name).unwrap();
        let parsed_fks: BTreeSet<(String, String, String)> = fact_table
            .foreign_keys
            .iter()
            .map(|fk| (fk.column.clone(), fk.references.table.clone(), fk.references.column.clone()))
            .collect();
        let model_fks: BTreeSet<(String, String, String)> = schema
            .relationships
            .iter()
            .map(|r| (r.from_column.clone(), r.to_table.clone(), r.to_column.clone()))
            .collect();
        prop_assert_eq!(parsed_fks, model_fks);
    }
}
