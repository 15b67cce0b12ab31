//! odsql: compile OData query options into SQL over JSON document tables
//!
//! `compile` and `count` print SQL, `query` runs the compiled statement
//! against a SQLite database and prints the documents, `parse` prints the
//! syntax tree of each option.
//!
//! Queries that do not parse or do not fit the registry exit with status 2;
//! every other failure exits with status 1.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use odsql_ast::{parse_expand, parse_filter, parse_orderby, parse_select, ParseError};
use odsql_compiler::{build_count_query, build_query, CompileError, DialectKind, QueryOptions};
use odsql_schema::SchemaRegistry;
use serde_json::{json, Value};
use tracing::{info, warn};

mod config;
mod exec;
mod logging;

use config::Config;
use exec::SqliteExecutor;

#[derive(Debug, Parser)]
#[command(name = "odsql", version, about = "OData query options to SQL")]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "odsql.yaml")]
    config: PathBuf,

    /// Schema registry file (YAML or JSON)
    #[arg(long)]
    registry: Option<String>,

    /// sqlite, postgres or duckdb
    #[arg(long)]
    dialect: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the statement reading entities of a schema
    Compile {
        schema: String,
        #[command(flatten)]
        options: OptionArgs,
        /// Read one entity instead of a collection
        #[arg(long)]
        single: bool,
    },
    /// Print the statement counting entities of a schema
    Count {
        schema: String,
        #[arg(long)]
        filter: Option<String>,
        /// Run the count against the database and print the number
        #[arg(long)]
        execute: bool,
        #[arg(long)]
        database: Option<String>,
    },
    /// Run a read against a SQLite database and print the documents as JSON
    Query {
        schema: String,
        #[command(flatten)]
        options: OptionArgs,
        #[arg(long)]
        single: bool,
        #[arg(long)]
        database: Option<String>,
    },
    /// Print the parsed options as JSON
    Parse {
        #[command(flatten)]
        options: OptionArgs,
    },
}

#[derive(Debug, Args)]
struct OptionArgs {
    #[arg(long)]
    filter: Option<String>,
    #[arg(long)]
    select: Option<String>,
    #[arg(long)]
    expand: Option<String>,
    #[arg(long)]
    orderby: Option<String>,
    #[arg(long)]
    top: Option<u64>,
    #[arg(long)]
    skip: Option<u64>,
}

impl OptionArgs {
    fn query_options(&self) -> QueryOptions<'_> {
        QueryOptions {
            filter: self.filter.as_deref(),
            select: self.select.as_deref(),
            expand: self.expand.as_deref(),
            orderby: self.orderby.as_deref(),
            top: self.top,
            skip: self.skip,
        }
    }
}

const EXIT_INVALID_QUERY: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    /// The query options are at fault.
    InvalidQuery,
    /// Configuration, registry, database or I/O.
    Internal,
}

impl Failure {
    fn of(err: &anyhow::Error) -> Failure {
        let invalid_query = err.chain().any(|cause| {
            cause.is::<ParseError>()
                || cause
                    .downcast_ref::<CompileError>()
                    .is_some_and(CompileError::is_client_error)
        });
        if invalid_query {
            Failure::InvalidQuery
        } else {
            Failure::Internal
        }
    }
}

fn main() -> ExitCode {
    match start() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match Failure::of(&err) {
            Failure::InvalidQuery => {
                eprintln!("invalid query: {:#}", err);
                ExitCode::from(EXIT_INVALID_QUERY)
            }
            Failure::Internal => {
                eprintln!("error: {:#}", err);
                ExitCode::FAILURE
            }
        },
    }
}

fn start() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(registry) = &cli.registry {
        config.registry = registry.clone();
    }
    if let Some(dialect) = &cli.dialect {
        config.dialect = dialect.clone();
    }
    logging::init(&config.logging);

    run(&config, cli.command)
}

fn run(config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Parse { options } => {
            println!("{}", serde_json::to_string_pretty(&parse_tree(&options)?)?);
            Ok(())
        }
        Command::Compile {
            schema,
            options,
            single,
        } => {
            let registry = load_registry(config)?;
            let dialect = config.dialect_kind()?.dialect();
            let sql = build_query(dialect, &registry, &schema, &options.query_options(), !single)?;
            println!("{}", sql);
            Ok(())
        }
        Command::Count {
            schema,
            filter,
            execute,
            database,
        } => {
            let registry = load_registry(config)?;
            if !execute {
                let dialect = config.dialect_kind()?.dialect();
                println!("{}", build_count_query(dialect, &registry, &schema, filter.as_deref())?);
                return Ok(());
            }
            let executor = open_database(config, database)?;
            let dialect = execution_dialect(config)?.dialect();
            let sql = build_count_query(dialect, &registry, &schema, filter.as_deref())?;
            println!("{}", executor.count(&sql)?);
            Ok(())
        }
        Command::Query {
            schema,
            options,
            single,
            database,
        } => {
            let registry = load_registry(config)?;
            let executor = open_database(config, database)?;
            let dialect = execution_dialect(config)?.dialect();
            let sql = build_query(dialect, &registry, &schema, &options.query_options(), !single)?;
            let output = if single {
                executor.single(&sql)?
            } else {
                Value::Array(executor.rows(&sql)?)
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}

fn load_registry(config: &Config) -> Result<SchemaRegistry> {
    let registry = SchemaRegistry::load(&config.registry)
        .with_context(|| format!("loading schema registry {}", config.registry))?;
    info!(path = %config.registry, schemas = registry.len(), "schema registry loaded");
    Ok(registry)
}

fn open_database(config: &Config, flag: Option<String>) -> Result<SqliteExecutor> {
    let Some(path) = flag.or_else(|| config.database.clone()) else {
        bail!("no database configured; pass --database or set ODSQL_DATABASE");
    };
    SqliteExecutor::open(&path).with_context(|| format!("opening database {}", path))
}

/// Execution goes through SQLite whatever dialect is configured.
fn execution_dialect(config: &Config) -> Result<DialectKind> {
    let configured = config.dialect_kind()?;
    if configured != DialectKind::Sqlite {
        warn!(dialect = %configured, "executing with the sqlite dialect");
    }
    Ok(DialectKind::Sqlite)
}

fn parse_tree(options: &OptionArgs) -> Result<Value> {
    let mut tree = serde_json::Map::new();
    if let Some(filter) = non_blank(&options.filter) {
        let expr = parse_filter(filter).context("$filter")?;
        tree.insert("$filter".to_string(), serde_json::to_value(expr)?);
    }
    if let Some(select) = non_blank(&options.select) {
        let items = parse_select(select).context("$select")?;
        tree.insert("$select".to_string(), serde_json::to_value(items)?);
    }
    if let Some(expand) = non_blank(&options.expand) {
        let items = parse_expand(expand).context("$expand")?;
        tree.insert("$expand".to_string(), serde_json::to_value(items)?);
    }
    if let Some(orderby) = non_blank(&options.orderby) {
        let items = parse_orderby(orderby).context("$orderby")?;
        tree.insert("$orderby".to_string(), serde_json::to_value(items)?);
    }
    if let Some(top) = options.top {
        tree.insert("$top".to_string(), json!(top));
    }
    if let Some(skip) = options.skip {
        tree.insert("$skip".to_string(), json!(skip));
    }
    Ok(Value::Object(tree))
}

fn non_blank(option: &Option<String>) -> Option<&str> {
    option.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_query_options() {
        let cli = Cli::try_parse_from([
            "odsql",
            "--dialect",
            "postgres",
            "compile",
            "Car",
            "--filter",
            "Seats gt 2",
            "--top",
            "5",
            "--single",
        ])
        .unwrap();
        assert_eq!(cli.dialect.as_deref(), Some("postgres"));
        match cli.command {
            Command::Compile {
                schema,
                options,
                single,
            } => {
                assert_eq!(schema, "Car");
                assert!(single);
                let query = options.query_options();
                assert_eq!(query.filter, Some("Seats gt 2"));
                assert_eq!(query.top, Some(5));
                assert_eq!(query.select, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_tree_skips_blank_options() {
        let options = OptionArgs {
            filter: Some("Seats gt 2".to_string()),
            select: Some("  ".to_string()),
            expand: None,
            orderby: Some("Name desc".to_string()),
            top: Some(3),
            skip: None,
        };
        let tree = parse_tree(&options).unwrap();
        let keys: Vec<&String> = tree.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 3);
        assert!(tree.get("$filter").is_some());
        assert!(tree.get("$select").is_none());
        assert_eq!(tree["$top"], json!(3));
    }

    #[test]
    fn test_parse_tree_reports_option() {
        let options = OptionArgs {
            filter: None,
            select: None,
            expand: Some("Maker(".to_string()),
            orderby: None,
            top: None,
            skip: None,
        };
        let err = parse_tree(&options).unwrap_err();
        assert_eq!(err.to_string(), "$expand");
        assert_eq!(Failure::of(&err), Failure::InvalidQuery);
    }

    #[test]
    fn test_failure_separates_bad_queries_from_registry_bugs() {
        let registry = SchemaRegistry::new().with_schema(
            "Boat",
            odsql_schema::SchemaMeta::table("boat_rows")
                .field("Name", odsql_schema::FieldMeta::string()),
        );
        let compile = |filter: &str| -> Result<String> {
            let options = QueryOptions::new().filter(filter);
            Ok(build_query(DialectKind::Sqlite.dialect(), &registry, "Boat", &options, true)?)
        };

        let err = compile("Name eq").unwrap_err();
        assert_eq!(Failure::of(&err), Failure::InvalidQuery);
        let err = compile("Length gt 3").unwrap_err();
        assert_eq!(Failure::of(&err), Failure::InvalidQuery);

        let err = anyhow::Error::from(CompileError::Registry(
            odsql_schema::RegistryError::SchemaNotFound("Hull".to_string()),
        ))
        .context("compiling Boat");
        assert_eq!(Failure::of(&err), Failure::Internal);

        let err = open_database(&Config::default(), None).err().unwrap();
        assert_eq!(Failure::of(&err), Failure::Internal);
    }
}
