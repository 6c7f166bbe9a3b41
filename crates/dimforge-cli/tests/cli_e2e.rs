use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const SHOP: &str = r#"
CREATE TABLE customers (id INT PRIMARY KEY, name VARCHAR(100), city VARCHAR(50));
CREATE TABLE orders (
    id INT PRIMARY KEY,
    customer_id INT REFERENCES customers(id),
    order_date DATE,
    amount DECIMAL(10,2)
);
"#;

fn dimforge_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_dimforge"))
}

fn run(args: &[&str]) -> Output {
    Command::new(dimforge_bin())
        .args(args)
        .env_remove("DIMFORGE_LOG")
        .output()
        .expect("spawn dimforge")
}

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write fixture");
    path
}

fn stdout_json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "dimforge failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

#[test]
fn model_writes_response_and_ddl() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "shop.sql", SHOP);
    let out = dir.path().join("response.json");
    let ddl = dir.path().join("schema.sql");

    let output = run(&[
        "model",
        input.to_str().unwrap(),
        "--name",
        "Shop",
        "--dialect",
        "mysql",
        "--out",
        out.to_str().unwrap(),
        "--ddl-out",
        ddl.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let response: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(response["star_schema"]["name"], "Shop");
    assert_eq!(response["star_schema"]["fact_table"]["name"], "fact_orders");

    let script = fs::read_to_string(&ddl).unwrap();
    assert!(script.contains("CREATE TABLE `dim_customers`"));
    assert!(script.contains("CREATE TABLE `fact_orders`"));
}

#[test]
fn model_prints_to_stdout_and_respects_flags() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "shop.sql", SHOP);

    let response = stdout_json(&run(&[
        "model",
        input.to_str().unwrap(),
        "--no-indexes",
        "--partitioning",
    ]));
    let ddl: Vec<&str> = response["ddl_statements"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s.as_str())
        .collect();
    assert!(ddl.iter().all(|s| !s.contains("INDEX")));
    assert!(ddl.iter().any(|s| s.contains("PARTITION BY RANGE")));
}

#[test]
fn request_runs_a_json_request() {
    let dir = tempfile::tempdir().unwrap();
    let request = serde_json::json!({
        "sql": SHOP,
        "dialect": "sqlite",
        "sample_rows": {
            "customers": [{"id": 7, "name": "Grace", "city": "Arlington"}]
        }
    });
    let path = write(dir.path(), "request.json", &request.to_string());

    let response = stdout_json(&run(&["request", path.to_str().unwrap()]));
    let dml = response["dml_statements"]["dim_customers"].as_str().unwrap();
    assert!(dml.contains("'Grace'"));
}

#[test]
fn recommend_accepts_a_model_response() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "shop.sql", SHOP);
    let out = dir.path().join("response.json");
    let status = run(&["model", input.to_str().unwrap(), "--out", out.to_str().unwrap()]);
    assert!(status.status.success());

    let report = stdout_json(&run(&["recommend", out.to_str().unwrap()]));
    assert!(report["complexity_score"].as_u64().is_some());
    assert_eq!(report["complexity_level"], "low");
    assert!(report["recommendations"]["indexing"].is_array());

    let response: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    let bare = write(dir.path(), "schema.json", &response["star_schema"].to_string());
    let again = stdout_json(&run(&["recommend", bare.to_str().unwrap()]));
    assert_eq!(again["complexity_score"], report["complexity_score"]);
}

#[test]
fn analyze_shows_roles() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "shop.sql", SHOP);

    let report = stdout_json(&run(&["analyze", input.to_str().unwrap(), "--json"]));
    assert_eq!(report["fact_table"], "orders");

    let output = run(&["analyze", input.to_str().unwrap()]);
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("orders"));
    assert!(text.contains("measure"));
}

#[test]
fn capabilities_lists_dialects() {
    let caps = stdout_json(&run(&["capabilities"]));
    let dialects: Vec<&str> = caps["dialects"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|d| d.as_str())
        .collect();
    assert_eq!(dialects.len(), 5);
    assert!(dialects.contains(&"postgresql"));
}

#[test]
fn config_file_sets_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "shop.sql", SHOP);
    let config = write(
        dir.path(),
        "config.json",
        r#"{"default_model_name": "Configured", "default_dialect": "sqlserver"}"#,
    );

    let response = stdout_json(&run(&[
        "--config",
        config.to_str().unwrap(),
        "model",
        input.to_str().unwrap(),
    ]));
    assert_eq!(response["star_schema"]["name"], "Configured");
    let first_create = response["ddl_statements"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s.as_str())
        .find(|s| s.starts_with("CREATE TABLE"))
        .unwrap()
        .to_string();
    assert!(first_create.starts_with("CREATE TABLE ["));
}

#[test]
fn errors_exit_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "shop.sql", SHOP);

    let output = run(&["model", input.to_str().unwrap(), "--dialect", "oracle"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("oracle"));

    let empty = write(dir.path(), "empty.sql", "   ");
    assert!(!run(&["model", empty.to_str().unwrap()]).status.success());
}
