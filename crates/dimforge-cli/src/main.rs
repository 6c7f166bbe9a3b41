//! dimforge CLI
//!
//! Command-line front end for the modeling engine:
//! - `model`: SQL DDL file -> star schema, DDL, sample DML, ETL templates (JSON)
//! - `request`: run a JSON model request as-is
//! - `analyze`: show parsed tables and the role of every column
//! - `recommend`: complexity score and suggestions for a generated star schema
//! - `capabilities`: supported dialects and features

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use dimforge_ingest_sql::SampleRows;
use dimforge_model::{
    EngineConfig, ModelRequest, ModelingEngine, RecommendationRequest, SchemaReport, StarSchema,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "dimforge")]
#[command(author, version, about = "dimforge: star schemas from SQL DDL")]
struct Cli {
    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Engine configuration (JSON); absent fields keep their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a star schema and its SQL from a DDL file.
    Model {
        /// Input SQL file
        input: PathBuf,
        /// Model name (default from config: DataWarehouse)
        #[arg(long)]
        name: Option<String>,
        /// Target dialect: mysql, postgresql, sqlite, sqlserver, ansi
        #[arg(short, long)]
        dialect: Option<String>,
        /// Skip index statements
        #[arg(long)]
        no_indexes: bool,
        /// Partition the fact table where the dialect supports it
        #[arg(long)]
        partitioning: bool,
        /// Sample rows (JSON: table -> list of rows)
        #[arg(long)]
        samples: Option<PathBuf>,
        /// Output response JSON (stdout when absent)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Also write the DDL script here
        #[arg(long)]
        ddl_out: Option<PathBuf>,
    },

    /// Run a JSON model request and print the JSON response.
    Request {
        /// Request JSON (`sql`, `model_name`, `dialect`, ...)
        input: PathBuf,
    },

    /// Show parsed tables with per-column classifications.
    Analyze {
        /// Input SQL file
        input: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Score a star schema and list optimization suggestions.
    Recommend {
        /// Star schema JSON, or a full model response containing `star_schema`
        input: PathBuf,
        /// Treat partitioning as requested
        #[arg(long)]
        partitioning: bool,
    },

    /// Print supported dialects and features as JSON.
    Capabilities,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };
    let engine = ModelingEngine::new(config);

    match cli.command {
        Commands::Model {
            input,
            name,
            dialect,
            no_indexes,
            partitioning,
            samples,
            out,
            ddl_out,
        } => {
            let mut request = ModelRequest::new(read_text(&input)?);
            request.model_name = name;
            request.dialect = dialect;
            if no_indexes {
                request.include_indexes = Some(false);
            }
            if partitioning {
                request.include_partitioning = Some(true);
            }
            if let Some(path) = samples {
                let rows: SampleRows = read_json(&path)?;
                request.sample_rows = Some(rows);
            }
            cmd_model(&engine, request, out.as_deref(), ddl_out.as_deref())?;
        }
        Commands::Request { input } => {
            let request: ModelRequest = read_json(&input)?;
            cmd_model(&engine, request, None, None)?;
        }
        Commands::Analyze { input, json } => {
            let report = engine.analyze(&read_text(&input)?)?;
            if json {
                print_json(&report)?;
            } else {
                print_report(&report)?;
            }
        }
        Commands::Recommend {
            input,
            partitioning,
        } => {
            let star_schema = read_star_schema(&input)?;
            let report = engine.recommend(&RecommendationRequest {
                star_schema,
                include_partitioning: partitioning,
            });
            print_json(&report)?;
        }
        Commands::Capabilities => print_json(&engine.capabilities())?,
    }
    Ok(())
}

/// `-v` flags win over `DIMFORGE_LOG`; the default is `warn`.
fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => match std::env::var("DIMFORGE_LOG") {
            Ok(value) if !value.trim().is_empty() => value
                .trim()
                .parse::<tracing::Level>()
                .map_err(|_| anyhow!("DIMFORGE_LOG: unknown level `{value}`"))?,
            _ => tracing::Level::WARN,
        },
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

fn load_config(path: &Path) -> Result<EngineConfig> {
    let config: EngineConfig = read_json(path)?;
    tracing::debug!(path = %path.display(), ?config, "loaded engine config");
    Ok(config)
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = read_text(path)?;
    serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_model(
    engine: &ModelingEngine,
    request: ModelRequest,
    out: Option<&Path>,
    ddl_out: Option<&Path>,
) -> Result<()> {
    let response = engine.generate(request)?;
    for warning in &response.warnings {
        eprintln!("{} {warning}", "warning:".yellow().bold());
    }

    let schema = &response.star_schema;
    eprintln!(
        "{} {} ({} dimension(s), {})",
        "modeled".green().bold(),
        schema.fact_table.name.bold(),
        schema.dimension_tables.len(),
        schema
            .dimension_tables
            .iter()
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    if let Some(path) = ddl_out {
        let mut script = response.ddl_statements.join("\n\n");
        script.push('\n');
        fs::write(path, script).with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
    }

    match out {
        Some(path) => {
            fs::write(path, serde_json::to_string_pretty(&response)?)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
        }
        None => print_json(&response)?,
    }
    Ok(())
}

/// Accepts a bare star schema or anything carrying one under `star_schema`.
fn read_star_schema(path: &Path) -> Result<StarSchema> {
    let mut value: serde_json::Value = read_json(path)?;
    let schema = match value.get_mut("star_schema").map(serde_json::Value::take) {
        Some(inner) => inner,
        None => value,
    };
    serde_json::from_value(schema)
        .with_context(|| format!("{} does not contain a star schema", path.display()))
}

fn print_report(report: &SchemaReport) -> Result<()> {
    for table in &report.tables {
        let marker = if table.name().eq_ignore_ascii_case(&report.fact_table) {
            " (fact)".cyan().to_string()
        } else {
            String::new()
        };
        println!("{}{marker}", table.name().bold());
        for column in &table.columns {
            let role = serde_json::to_value(column.role)?;
            println!(
                "  {:<24} {:<20} {} {:.2}",
                column.name(),
                column.column.semantic_type.to_string(),
                role.as_str().unwrap_or_default().green(),
                column.confidence.value()
            );
        }
        let rows = report.samples.row_count(table.name());
        if rows > 0 {
            println!("  {} {rows} sample row(s)", "→".cyan());
        }
    }
    for warning in &report.warnings {
        eprintln!("{} {warning}", "warning:".yellow().bold());
    }
    Ok(())
}
