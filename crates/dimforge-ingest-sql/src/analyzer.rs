//! Statement-by-statement schema analysis.

use crate::samples::{SampleRow, SampleRows, SampleValue};
use crate::statements::{split_statements, RawStatement};
use crate::{
    AnalyzeError, Column, ColumnRef, ParseError, SchemaAnalysis, StatementDiagnostic, Table,
    TableRegistry,
};
use sqlparser::ast::{
    AlterTableOperation, ColumnDef, ColumnOption, Expr, Ident, ObjectName, Query, SetExpr,
    Statement, TableConstraint, UnaryOperator, Value,
};
use sqlparser::dialect::{
    Dialect, GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect,
};
use sqlparser::parser::Parser;
use std::collections::HashMap;

/// Tunables for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    /// Upper bound on retry passes over deferred `ALTER TABLE` statements.
    pub max_alter_passes: usize,
    /// Rows kept per table from `INSERT` statements.
    pub max_sample_rows: usize,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            max_alter_passes: 8,
            max_sample_rows: 20,
        }
    }
}

/// Parse DDL text with default options.
pub fn parse_sql_ddl(sql: &str) -> Result<SchemaAnalysis, AnalyzeError> {
    parse_sql_ddl_with(sql, &AnalyzerOptions::default())
}

pub fn parse_sql_ddl_with(
    sql: &str,
    options: &AnalyzerOptions,
) -> Result<SchemaAnalysis, AnalyzeError> {
    let mut analyzer = SchemaAnalyzer::new(options.clone());
    for stmt in split_statements(sql) {
        analyzer.process(&stmt);
    }
    analyzer.finish()
}

/// An `ALTER TABLE` (or the still-unapplied part of one) waiting for its table or columns.
#[derive(Debug, Clone)]
struct PendingAlter {
    ordinal: usize,
    preview: String,
    table: String,
    operations: Vec<AlterTableOperation>,
    /// Last reason the remaining operations could not be applied.
    blocker: Option<ParseError>,
}

#[derive(Debug, Clone)]
struct PendingInsert {
    ordinal: usize,
    preview: String,
    table: String,
    rows: Vec<Vec<Expr>>,
}

/// Per-invocation analysis state. Feed statements in source order with
/// [`SchemaAnalyzer::process`], then call [`SchemaAnalyzer::finish`].
#[derive(Debug)]
pub struct SchemaAnalyzer {
    options: AnalyzerOptions,
    registry: TableRegistry,
    samples: SampleRows,
    diagnostics: Vec<StatementDiagnostic>,
    warnings: Vec<String>,
    pending_alters: Vec<PendingAlter>,
    pending_inserts: Vec<PendingInsert>,
    statement_count: usize,
}

impl SchemaAnalyzer {
    pub fn new(options: AnalyzerOptions) -> Self {
        Self {
            options,
            registry: TableRegistry::new(),
            samples: SampleRows::new(),
            diagnostics: Vec::new(),
            warnings: Vec::new(),
            pending_alters: Vec::new(),
            pending_inserts: Vec::new(),
            statement_count: 0,
        }
    }

    pub fn process(&mut self, raw: &RawStatement) {
        self.statement_count += 1;
        let statements = match parse_statement(&raw.text) {
            Ok(statements) => statements,
            Err(message) => {
                self.diagnose(
                    raw.preview(),
                    ParseError::Syntax {
                        ordinal: raw.ordinal,
                        message,
                    },
                );
                return;
            }
        };
        if statements.is_empty() {
            self.diagnose(
                raw.preview(),
                ParseError::EmptyStatement {
                    ordinal: raw.ordinal,
                },
            );
            return;
        }
        for statement in statements {
            self.apply(raw, statement);
        }
    }

    fn apply(&mut self, raw: &RawStatement, statement: Statement) {
        match statement {
            Statement::CreateTable {
                name,
                columns,
                constraints,
                ..
            } => self.create_table(raw, &name, &columns, &constraints),
            Statement::AlterTable {
                name, operations, ..
            } => {
                let pending = PendingAlter {
                    ordinal: raw.ordinal,
                    preview: raw.preview(),
                    table: object_name(&name),
                    operations,
                    blocker: None,
                };
                if let Some(rest) = self.try_alter(pending) {
                    self.pending_alters.push(rest);
                }
            }
            Statement::Insert {
                table_name,
                columns,
                source: Some(source),
                ..
            } => self.insert(raw, &table_name, &columns, *source),
            _ => {
                tracing::debug!(ordinal = raw.ordinal, statement = %raw.preview(), "ignoring non-DDL statement");
            }
        }
    }

    fn create_table(
        &mut self,
        raw: &RawStatement,
        name: &ObjectName,
        columns: &[ColumnDef],
        constraints: &[TableConstraint],
    ) {
        let table_name = object_name(name);
        if columns.is_empty() {
            self.diagnose(
                raw.preview(),
                ParseError::NoColumns {
                    ordinal: raw.ordinal,
                    table: table_name,
                },
            );
            return;
        }

        let mut table = Table::new(table_name.clone());
        let mut errors = Vec::new();
        for def in columns {
            errors.extend(add_column(&mut table, def, raw.ordinal));
        }
        for constraint in constraints {
            errors.extend(apply_constraint(&mut table, constraint, raw.ordinal));
        }
        for error in errors {
            self.diagnose(raw.preview(), error);
        }

        if self.registry.insert(table) {
            self.warn(format!(
                "table `{table_name}` declared more than once; statement {} replaces the earlier definition",
                raw.ordinal
            ));
        }
    }

    /// Apply what can be applied now; return the remainder (if any) for a later pass.
    fn try_alter(&mut self, mut pending: PendingAlter) -> Option<PendingAlter> {
        let Some(table) = self.registry.get_mut(&pending.table) else {
            pending.blocker = Some(ParseError::UnknownTable {
                ordinal: pending.ordinal,
                table: pending.table.clone(),
            });
            return Some(pending);
        };

        let mut remaining = Vec::new();
        let mut blocker = None;
        for op in pending.operations {
            let errors = match &op {
                AlterTableOperation::AddColumn { column_def, .. } => {
                    add_column(table, column_def, pending.ordinal)
                }
                AlterTableOperation::AddConstraint(constraint) => {
                    apply_constraint(table, constraint, pending.ordinal)
                }
                other => {
                    tracing::debug!(ordinal = pending.ordinal, operation = %other, "ignoring ALTER TABLE operation");
                    Vec::new()
                }
            };
            // Constraints are all-or-nothing per column; only unknown columns are retryable.
            if let Some(first) = errors.into_iter().next() {
                blocker = Some(first);
                remaining.push(op);
            }
        }

        if remaining.is_empty() {
            None
        } else {
            pending.operations = remaining;
            pending.blocker = blocker;
            Some(pending)
        }
    }

    fn insert(&mut self, raw: &RawStatement, table: &ObjectName, columns: &[Ident], source: Query) {
        let SetExpr::Values(values) = *source.body else {
            tracing::debug!(ordinal = raw.ordinal, "ignoring INSERT without literal VALUES");
            return;
        };
        let table = object_name(table);
        if columns.is_empty() {
            if !self.registry.contains(&table) {
                self.pending_inserts.push(PendingInsert {
                    ordinal: raw.ordinal,
                    preview: raw.preview(),
                    table,
                    rows: values.rows,
                });
                return;
            }
            self.capture_positional(raw.ordinal, &table, values.rows);
        } else {
            let names: Vec<String> = columns.iter().map(|c| c.value.clone()).collect();
            self.capture_rows(raw.ordinal, &table, &names, values.rows);
        }
    }

    fn capture_positional(&mut self, ordinal: usize, table: &str, rows: Vec<Vec<Expr>>) {
        let names: Vec<String> = self
            .registry
            .get(table)
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default();
        self.capture_rows(ordinal, table, &names, rows);
    }

    fn capture_rows(&mut self, ordinal: usize, table: &str, names: &[String], rows: Vec<Vec<Expr>>) {
        let limit = self.options.max_sample_rows;
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != names.len() {
                self.warn(format!(
                    "statement {ordinal}: row {} of INSERT INTO `{table}` has {} value(s) for {} column(s); row skipped",
                    i + 1,
                    row.len(),
                    names.len()
                ));
                continue;
            }
            let sample: SampleRow = names
                .iter()
                .zip(row.iter())
                .map(|(name, expr)| (name.to_ascii_lowercase(), sample_value(expr)))
                .collect();
            if !self.samples.push(table, sample, limit) {
                tracing::debug!(ordinal, table, limit, "sample row limit reached");
                break;
            }
        }
    }

    /// Resolve deferred work, validate the graph, and produce the analysis.
    pub fn finish(mut self) -> Result<SchemaAnalysis, AnalyzeError> {
        self.resolve_deferred_alters();

        for insert in std::mem::take(&mut self.pending_inserts) {
            if self.registry.contains(&insert.table) {
                self.capture_positional(insert.ordinal, &insert.table, insert.rows);
            } else {
                self.diagnose(
                    insert.preview,
                    ParseError::UnknownTable {
                        ordinal: insert.ordinal,
                        table: insert.table,
                    },
                );
            }
        }

        if self.registry.is_empty() {
            return Err(AnalyzeError::NoTables {
                statements: self.statement_count,
                skipped: self.diagnostics.len(),
            });
        }

        self.resolve_referenced_columns();
        self.break_cycles();

        Ok(SchemaAnalysis {
            registry: self.registry,
            samples: self.samples,
            diagnostics: self.diagnostics,
            warnings: self.warnings,
            statement_count: self.statement_count,
        })
    }

    fn resolve_deferred_alters(&mut self) {
        for pass in 1..=self.options.max_alter_passes {
            if self.pending_alters.is_empty() {
                return;
            }
            let before: usize = self.pending_alters.iter().map(|p| p.operations.len()).sum();
            for pending in std::mem::take(&mut self.pending_alters) {
                if let Some(rest) = self.try_alter(pending) {
                    self.pending_alters.push(rest);
                }
            }
            let after: usize = self.pending_alters.iter().map(|p| p.operations.len()).sum();
            tracing::debug!(pass, before, after, "deferred ALTER TABLE pass");
            if after == before {
                break;
            }
        }

        for pending in std::mem::take(&mut self.pending_alters) {
            let error = pending.blocker.unwrap_or(ParseError::UnknownTable {
                ordinal: pending.ordinal,
                table: pending.table,
            });
            self.diagnose(pending.preview, error);
        }
    }

    /// Fill in referenced columns left implicit (`REFERENCES t` with no column list).
    fn resolve_referenced_columns(&mut self) {
        let mut fixes: Vec<(usize, usize, String)> = Vec::new();
        let mut dangling = Vec::new();
        for (ti, table) in self.registry.iter().enumerate() {
            // Composite implicit references pair up positionally with the target key.
            let mut implicit_seen: HashMap<String, usize> = HashMap::new();
            for (fi, fk) in table.foreign_keys.iter().enumerate() {
                let target = self.registry.get(&fk.references.table);
                if target.is_none() {
                    dangling.push(format!(
                        "foreign key {}.{} references unknown table `{}`",
                        table.name, fk.column, fk.references.table
                    ));
                }
                if !fk.references.column.is_empty() {
                    continue;
                }
                let slot = implicit_seen
                    .entry(fk.references.table.to_ascii_lowercase())
                    .or_insert(0);
                let resolved = target
                    .and_then(|t| {
                        t.primary_key
                            .get(*slot)
                            .or_else(|| t.primary_key.first())
                            .cloned()
                    })
                    .unwrap_or_else(|| "id".to_string());
                *slot += 1;
                fixes.push((ti, fi, resolved));
            }
        }

        let tables = self.registry.tables_mut();
        for (ti, fi, column) in fixes {
            let table = &mut tables[ti];
            let fk = &mut table.foreign_keys[fi];
            fk.references.column = column.clone();
            let from = fk.column.clone();
            if let Some(col) = table.column_mut(&from) {
                if let Some(r) = col.references.as_mut() {
                    r.column = column;
                }
            }
        }
        for message in dangling {
            self.warn(message);
        }
    }

    /// Depth-first search in declaration order; each back edge (self-references
    /// included) is flagged `closes_cycle`.
    fn break_cycles(&mut self) {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Unvisited,
            Active,
            Done,
        }

        fn visit(
            node: usize,
            edges: &[Vec<(usize, usize)>],
            marks: &mut [Mark],
            back_edges: &mut Vec<(usize, usize)>,
        ) {
            marks[node] = Mark::Active;
            for &(fk_idx, target) in &edges[node] {
                match marks[target] {
                    Mark::Active => back_edges.push((node, fk_idx)),
                    Mark::Unvisited => visit(target, edges, marks, back_edges),
                    Mark::Done => {}
                }
            }
            marks[node] = Mark::Done;
        }

        let edges: Vec<Vec<(usize, usize)>> = self
            .registry
            .iter()
            .map(|t| {
                t.foreign_keys
                    .iter()
                    .enumerate()
                    .filter_map(|(i, fk)| {
                        self.registry
                            .position(&fk.references.table)
                            .map(|target| (i, target))
                    })
                    .collect()
            })
            .collect();

        let mut marks = vec![Mark::Unvisited; edges.len()];
        let mut back_edges = Vec::new();
        for node in 0..edges.len() {
            if marks[node] == Mark::Unvisited {
                visit(node, &edges, &mut marks, &mut back_edges);
            }
        }

        let mut messages = Vec::new();
        let tables = self.registry.tables_mut();
        for (ti, fi) in back_edges {
            let table = &mut tables[ti];
            let name = table.name.clone();
            let fk = &mut table.foreign_keys[fi];
            fk.closes_cycle = true;
            messages.push(format!(
                "foreign key {}.{} -> {} closes a reference cycle; it is not followed when modeling",
                name, fk.column, fk.references
            ));
        }
        for message in messages {
            self.warn(message);
        }
    }

    fn diagnose(&mut self, preview: String, error: ParseError) {
        tracing::warn!(ordinal = error.ordinal(), error = %error, "skipping malformed statement");
        self.diagnostics.push(StatementDiagnostic {
            ordinal: error.ordinal(),
            preview,
            error,
        });
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("{message}");
        self.warnings.push(message);
    }
}

// ============================================================================
// AST helpers
// ============================================================================

fn parse_statement(text: &str) -> Result<Vec<Statement>, String> {
    let dialects: [&dyn Dialect; 5] = [
        &GenericDialect {},
        &PostgreSqlDialect {},
        &MySqlDialect {},
        &SQLiteDialect {},
        &MsSqlDialect {},
    ];
    let mut first_error = None;
    for dialect in dialects {
        match Parser::parse_sql(dialect, text) {
            Ok(statements) => return Ok(statements),
            Err(err) => {
                first_error.get_or_insert_with(|| err.to_string());
            }
        }
    }
    Err(first_error.unwrap_or_else(|| "unparseable statement".to_string()))
}

/// Canonical table name: the last (unqualified) part, unquoted, casing kept.
fn object_name(name: &ObjectName) -> String {
    name.0
        .last()
        .map(|ident| ident.value.clone())
        .unwrap_or_else(|| name.to_string())
}

/// Add a column definition (with its inline key options) to `table`.
fn add_column(table: &mut Table, def: &ColumnDef, ordinal: usize) -> Vec<ParseError> {
    let mut column = Column::new(def.name.value.clone(), def.data_type.to_string());
    let mut inline_pk = false;
    let mut inline_fk = None;

    for option in &def.options {
        match &option.option {
            ColumnOption::NotNull => column.nullable = false,
            ColumnOption::Null => column.nullable = true,
            ColumnOption::Default(expr) => column.default = Some(expr.to_string()),
            ColumnOption::Unique {
                is_primary: true, ..
            } => inline_pk = true,
            ColumnOption::ForeignKey {
                foreign_table,
                referred_columns,
                ..
            } => {
                let referred = referred_columns
                    .first()
                    .map(|c| c.value.clone())
                    .unwrap_or_default();
                inline_fk = Some(ColumnRef::new(object_name(foreign_table), referred));
            }
            _ => {}
        }
    }

    let name = column.name.clone();
    if table.upsert_column(column) {
        tracing::debug!(table = %table.name, column = %name, "column redeclared; keeping the later definition");
    }

    let mut errors = Vec::new();
    if inline_pk {
        let mut pk = table.primary_key.clone();
        if !pk.iter().any(|c| c.eq_ignore_ascii_case(&name)) {
            pk.push(name.clone());
        }
        if let Err(column) = table.set_primary_key(&pk) {
            errors.push(unknown_column(ordinal, table, column));
        }
    }
    if let Some(reference) = inline_fk {
        if let Err(column) = table.add_foreign_key(&name, reference) {
            errors.push(unknown_column(ordinal, table, column));
        }
    }
    errors
}

fn apply_constraint(
    table: &mut Table,
    constraint: &TableConstraint,
    ordinal: usize,
) -> Vec<ParseError> {
    let mut errors = Vec::new();
    match constraint {
        TableConstraint::Unique {
            columns,
            is_primary: true,
            ..
        } => {
            let names: Vec<String> = columns.iter().map(|c| c.value.clone()).collect();
            if let Err(column) = table.set_primary_key(&names) {
                errors.push(unknown_column(ordinal, table, column));
            }
        }
        TableConstraint::ForeignKey {
            columns,
            foreign_table,
            referred_columns,
            ..
        } => {
            if let Some(missing) = columns.iter().find(|c| table.column(&c.value).is_none()) {
                errors.push(unknown_column(ordinal, table, missing.value.clone()));
                return errors;
            }
            let target = object_name(foreign_table);
            for (i, column) in columns.iter().enumerate() {
                let referred = referred_columns
                    .get(i)
                    .map(|c| c.value.clone())
                    .unwrap_or_default();
                if let Err(column) =
                    table.add_foreign_key(&column.value, ColumnRef::new(target.clone(), referred))
                {
                    errors.push(unknown_column(ordinal, table, column));
                }
            }
        }
        _ => {}
    }
    errors
}

fn unknown_column(ordinal: usize, table: &Table, column: String) -> ParseError {
    ParseError::UnknownColumn {
        ordinal,
        table: table.name.clone(),
        column,
    }
}

fn sample_value(expr: &Expr) -> SampleValue {
    match expr {
        Expr::Value(value) => literal_value(value).unwrap_or_else(|| SampleValue::Text(expr.to_string())),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr: inner,
        } => match inner.as_ref() {
            Expr::Value(Value::Number(n, _)) => SampleValue::number_from_literal(&format!("-{n}")),
            _ => SampleValue::Text(expr.to_string()),
        },
        Expr::Nested(inner) => sample_value(inner),
        other => SampleValue::Text(other.to_string()),
    }
}

fn literal_value(value: &Value) -> Option<SampleValue> {
    Some(match value {
        Value::Null => SampleValue::Null,
        Value::Boolean(b) => SampleValue::Bool(*b),
        Value::Number(n, _) => SampleValue::number_from_literal(n),
        Value::SingleQuotedString(s)
        | Value::DoubleQuotedString(s)
        | Value::NationalStringLiteral(s)
        | Value::EscapedStringLiteral(s) => SampleValue::Text(s.clone()),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SemanticType, TypeFamily};

    const RETAIL: &str = r#"
        -- retail OLTP schema
        CREATE TABLE customers (
            id INT PRIMARY KEY,
            name VARCHAR(100) NOT NULL,
            email VARCHAR(255),
            city VARCHAR(80)
        );
        CREATE TABLE products (
            id INT PRIMARY KEY,
            name VARCHAR(100),
            category VARCHAR(50),
            price DECIMAL(10,2)
        );
        CREATE TABLE sales (
            id INT PRIMARY KEY,
            customer_id INT REFERENCES customers(id),
            product_id INT,
            quantity INT,
            total_amount DECIMAL(12,2),
            FOREIGN KEY (product_id) REFERENCES products(id)
        );
    "#;

    #[test]
    fn test_parse_tables_in_declaration_order() {
        let analysis = parse_sql_ddl(RETAIL).unwrap();
        let names: Vec<&str> = analysis.registry.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["customers", "products", "sales"]);
        assert!(analysis.diagnostics.is_empty());

        let customers = analysis.registry.get("CUSTOMERS").unwrap();
        assert_eq!(customers.primary_key, ["id"]);
        let name = customers.column("name").unwrap();
        assert!(!name.nullable);
        assert_eq!(name.semantic_type, SemanticType::Text { max_length: Some(100) });
    }

    #[test]
    fn test_inline_and_table_level_foreign_keys() {
        let analysis = parse_sql_ddl(RETAIL).unwrap();
        let sales = analysis.registry.get("sales").unwrap();
        assert_eq!(sales.foreign_keys.len(), 2);
        let customer_id = sales.column("customer_id").unwrap();
        assert!(customer_id.is_foreign_key);
        assert_eq!(
            customer_id.references,
            Some(ColumnRef::new("customers", "id"))
        );
        assert_eq!(sales.referenced_tables(), ["customers", "products"]);
        assert!(analysis.registry.is_referenced("products", "id"));
        assert!(!analysis.registry.is_referenced("sales", "id"));
    }

    #[test]
    fn test_malformed_statement_is_skipped() {
        let sql = "CREATE TABLE a (id INT PRIMARY KEY);\nCREATE TABLE broken (id INT,,);\nCREATE TABLE b (id INT);";
        let analysis = parse_sql_ddl(sql).unwrap();
        assert_eq!(analysis.registry.len(), 2);
        assert_eq!(analysis.diagnostics.len(), 1);
        assert!(matches!(
            analysis.diagnostics[0].error,
            ParseError::Syntax { ordinal: 2, .. }
        ));
    }

    #[test]
    fn test_no_tables_is_fatal() {
        let err = parse_sql_ddl("SELECT 1; garbage here;").unwrap_err();
        assert_eq!(
            err,
            AnalyzeError::NoTables {
                statements: 2,
                skipped: 1
            }
        );
    }

    #[test]
    fn test_alter_table_add_column_and_foreign_key() {
        let sql = r#"
            CREATE TABLE orders (id INT PRIMARY KEY, amount DECIMAL(8,2));
            CREATE TABLE customers (id INT PRIMARY KEY, name TEXT);
            ALTER TABLE orders ADD COLUMN customer_id INT;
            ALTER TABLE orders ADD CONSTRAINT fk_customer FOREIGN KEY (customer_id) REFERENCES customers (id);
        "#;
        let analysis = parse_sql_ddl(sql).unwrap();
        let orders = analysis.registry.get("orders").unwrap();
        assert_eq!(orders.columns.last().unwrap().name, "customer_id");
        assert!(orders.column("customer_id").unwrap().is_foreign_key);
        assert!(analysis.diagnostics.is_empty());
    }

    #[test]
    fn test_alter_before_create_is_deferred() {
        let sql = r#"
            ALTER TABLE orders ADD FOREIGN KEY (customer_id) REFERENCES customers (id);
            ALTER TABLE orders ADD COLUMN customer_id INT;
            CREATE TABLE customers (id INT PRIMARY KEY);
            CREATE TABLE orders (id INT PRIMARY KEY);
        "#;
        let analysis = parse_sql_ddl(sql).unwrap();
        let orders = analysis.registry.get("orders").unwrap();
        assert!(orders.column("customer_id").unwrap().is_foreign_key);
        assert!(analysis.diagnostics.is_empty(), "{:?}", analysis.diagnostics);
    }

    #[test]
    fn test_unresolvable_alter_becomes_diagnostic() {
        let sql = "CREATE TABLE a (id INT); ALTER TABLE ghost ADD COLUMN x INT;";
        let analysis = parse_sql_ddl(sql).unwrap();
        assert_eq!(analysis.diagnostics.len(), 1);
        assert!(matches!(
            &analysis.diagnostics[0].error,
            ParseError::UnknownTable { table, .. } if table == "ghost"
        ));
    }

    #[test]
    fn test_quoted_identifiers_are_normalized() {
        let sql = r#"
            CREATE TABLE "Order Items" ("Item Id" INT PRIMARY KEY, "Qty" INT);
            CREATE TABLE `Returns` (`return_id` INT, `Reason` TEXT);
        "#;
        let analysis = parse_sql_ddl(sql).unwrap();
        let table = analysis.registry.get("order items").unwrap();
        assert_eq!(table.name, "Order Items");
        assert_eq!(table.columns[0].name, "Item Id");
        assert_eq!(table.columns[1].name, "Qty");
        let returns = analysis.registry.get("returns").unwrap();
        assert_eq!(returns.name, "Returns");
        assert!(returns.column("reason").is_some());
    }

    #[test]
    fn test_self_reference_closes_cycle() {
        let sql = "CREATE TABLE employees (id INT PRIMARY KEY, manager_id INT REFERENCES employees(id));";
        let analysis = parse_sql_ddl(sql).unwrap();
        let employees = analysis.registry.get("employees").unwrap();
        assert!(employees.foreign_keys[0].closes_cycle);
        assert!(!analysis.registry.has_foreign_keys());
        assert_eq!(analysis.warnings.len(), 1);
    }

    #[test]
    fn test_two_table_cycle_breaks_later_edge() {
        let sql = r#"
            CREATE TABLE a (id INT PRIMARY KEY, b_id INT REFERENCES b(id));
            CREATE TABLE b (id INT PRIMARY KEY, a_id INT REFERENCES a(id));
        "#;
        let analysis = parse_sql_ddl(sql).unwrap();
        assert!(!analysis.registry.get("a").unwrap().foreign_keys[0].closes_cycle);
        assert!(analysis.registry.get("b").unwrap().foreign_keys[0].closes_cycle);
    }

    #[test]
    fn test_implicit_referenced_column_resolves_to_primary_key() {
        let sql = r#"
            CREATE TABLE stores (store_code VARCHAR(10) PRIMARY KEY);
            CREATE TABLE visits (id INT, store_code VARCHAR(10) REFERENCES stores);
        "#;
        let analysis = parse_sql_ddl(sql).unwrap();
        let visits = analysis.registry.get("visits").unwrap();
        assert_eq!(
            visits.foreign_keys[0].references,
            ColumnRef::new("stores", "store_code")
        );
    }

    #[test]
    fn test_composite_primary_key() {
        let sql = "CREATE TABLE movie_actors (movie_id INT, actor_id INT, role TEXT, PRIMARY KEY (movie_id, actor_id));";
        let analysis = parse_sql_ddl(sql).unwrap();
        let t = analysis.registry.get("movie_actors").unwrap();
        assert_eq!(t.primary_key, ["movie_id", "actor_id"]);
        assert!(t.columns.iter().take(2).all(|c| c.is_primary_key && !c.nullable));
    }

    #[test]
    fn test_insert_rows_are_captured() {
        let sql = r#"
            CREATE TABLE products (id INT PRIMARY KEY, name VARCHAR(50), price DECIMAL(8,2), active BOOLEAN);
            INSERT INTO products (id, name, price, active) VALUES (1, 'Widget', 9.99, TRUE), (2, 'O''Brien', -1.5, NULL);
            INSERT INTO products VALUES (3, 'Gadget', 4.00, FALSE);
        "#;
        let analysis = parse_sql_ddl(sql).unwrap();
        let rows = analysis.samples.rows("products");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["name"], SampleValue::Text("Widget".into()));
        assert_eq!(rows[1]["name"], SampleValue::Text("O'Brien".into()));
        assert_eq!(rows[1]["price"].to_string(), "-1.5");
        assert!(rows[1]["active"].is_null());
        assert_eq!(rows[2]["active"], SampleValue::Bool(false));
    }

    #[test]
    fn test_sample_row_limit() {
        let values: Vec<String> = (1..=30).map(|i| format!("({i})")).collect();
        let sql = format!(
            "CREATE TABLE t (id INT); INSERT INTO t (id) VALUES {};",
            values.join(", ")
        );
        let options = AnalyzerOptions {
            max_sample_rows: 5,
            ..AnalyzerOptions::default()
        };
        let analysis = parse_sql_ddl_with(&sql, &options).unwrap();
        assert_eq!(analysis.samples.row_count("t"), 5);
    }

    #[test]
    fn test_create_index_and_drop_are_ignored() {
        let sql = r#"
            DROP TABLE IF EXISTS t;
            CREATE TABLE t (id BIGSERIAL PRIMARY KEY, created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP);
            CREATE INDEX idx_t_created ON t (created_at);
        "#;
        let analysis = parse_sql_ddl(sql).unwrap();
        assert_eq!(analysis.statement_count, 3);
        assert!(analysis.diagnostics.is_empty());
        let t = analysis.registry.get("t").unwrap();
        assert_eq!(t.columns[0].semantic_type.family(), TypeFamily::Integer);
        assert!(t.columns[1].default.is_some());
    }

    #[test]
    fn test_redeclared_table_replaces_in_place() {
        let sql = "CREATE TABLE a (x INT); CREATE TABLE b (y INT); CREATE TABLE a (z INT);";
        let analysis = parse_sql_ddl(sql).unwrap();
        assert_eq!(analysis.registry.position("a"), Some(0));
        assert_eq!(analysis.registry.get("a").unwrap().columns[0].name, "z");
        assert_eq!(analysis.warnings.len(), 1);
    }
}
