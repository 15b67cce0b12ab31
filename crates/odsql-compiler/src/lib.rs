//! OData query compiler
//!
//! Compiles `$filter`, `$select`, `$expand`, `$orderby`, `$top` and `$skip`
//! against a [`SchemaRegistry`] into one SQL statement over tables that store
//! each entity as a single JSON document in a [`DATA_COLUMN`] column.
//!
//! Compilation is a pure function of its inputs: parse, resolve, generate.
//! The dialect is an explicit argument, so one process can serve several
//! storage backends at once.

use odsql_ast::{parse_expand, parse_filter, parse_orderby, parse_select, ParseError};
use odsql_schema::SchemaRegistry;
use sha2::{Digest, Sha256};
use tracing::debug;

mod dialect;
mod error;
mod generate;
mod path;
mod resolve;

pub use dialect::{Dialect, DialectKind, DuckDb, Postgres, Sqlite};
pub use error::{CompileError, ResolveError};
pub use path::JsonPath;

use generate::Generator;
use resolve::Resolver;

/// Column holding the JSON document of each row, and the name of the
/// single column every compiled query returns.
pub const DATA_COLUMN: &str = "Data";

/// Raw query option strings. Absent, empty and blank options mean "no constraint".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions<'q> {
    pub filter: Option<&'q str>,
    pub select: Option<&'q str>,
    pub expand: Option<&'q str>,
    pub orderby: Option<&'q str>,
    pub top: Option<u64>,
    pub skip: Option<u64>,
}

impl<'q> QueryOptions<'q> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: &'q str) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn select(mut self, select: &'q str) -> Self {
        self.select = Some(select);
        self
    }

    pub fn expand(mut self, expand: &'q str) -> Self {
        self.expand = Some(expand);
        self
    }

    pub fn orderby(mut self, orderby: &'q str) -> Self {
        self.orderby = Some(orderby);
        self
    }

    pub fn top(mut self, top: u64) -> Self {
        self.top = Some(top);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }
}

/// Compile a read of `schema` into a statement returning one [`DATA_COLUMN`]
/// per matching entity.
///
/// With `is_collection` false the statement reads a single entity: it is
/// limited to one row and `skip` is ignored.
pub fn build_query(
    dialect: &dyn Dialect,
    registry: &SchemaRegistry,
    schema: &str,
    options: &QueryOptions<'_>,
    is_collection: bool,
) -> Result<String, CompileError> {
    let table = root_table(registry, schema)?;

    let filter = parse_option(options.filter, "$filter", parse_filter)?;
    let select = parse_option(options.select, "$select", parse_select)?;
    let expand = parse_option(options.expand, "$expand", parse_expand)?;
    let orderby = parse_option(options.orderby, "$orderby", parse_orderby)?;

    let mut resolver = Resolver::new(registry, schema);
    let projection = resolver.resolve_projection(schema, select.as_deref(), expand.as_deref())?;
    let filter = match &filter {
        Some(expr) => Some(resolver.resolve_predicate(expr)?),
        None => None,
    };
    let order = match &orderby {
        Some(items) => resolver.resolve_orderby(items)?,
        None => Vec::new(),
    };

    let (top, skip) = if is_collection {
        (options.top, options.skip)
    } else {
        (Some(1), None)
    };

    let sql = Generator::new(dialect, table).select_statement(
        table,
        &projection,
        filter.as_ref(),
        &order,
        top,
        skip,
    );
    debug!(
        schema,
        dialect = dialect.name(),
        is_collection,
        fingerprint = %fingerprint(&sql),
        "compiled query"
    );
    Ok(sql)
}

/// Compile a count of the entities of `schema` matching `filter`.
pub fn build_count_query(
    dialect: &dyn Dialect,
    registry: &SchemaRegistry,
    schema: &str,
    filter: Option<&str>,
) -> Result<String, CompileError> {
    let table = root_table(registry, schema)?;
    let filter = parse_option(filter, "$filter", parse_filter)?;

    let mut resolver = Resolver::new(registry, schema);
    let filter = match &filter {
        Some(expr) => Some(resolver.resolve_predicate(expr)?),
        None => None,
    };

    let sql = Generator::new(dialect, table).count_statement(table, filter.as_ref());
    debug!(
        schema,
        dialect = dialect.name(),
        fingerprint = %fingerprint(&sql),
        "compiled count query"
    );
    Ok(sql)
}

/// SHA-256 of the statement text, hex encoded. Identical inputs compile to
/// identical text, so this identifies a query across calls.
pub fn fingerprint(sql: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sql.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn root_table<'r>(registry: &'r SchemaRegistry, schema: &str) -> Result<&'r str, CompileError> {
    let meta = registry
        .get(schema)
        .ok_or_else(|| CompileError::UnknownSchema(schema.to_string()))?;
    meta.table
        .as_deref()
        .ok_or_else(|| CompileError::NotQueryable(schema.to_string()))
}

fn parse_option<T>(
    source: Option<&str>,
    option: &'static str,
    parse: fn(&str) -> Result<T, ParseError>,
) -> Result<Option<T>, CompileError> {
    match source.map(str::trim) {
        Some(source) if !source.is_empty() => parse(source)
            .map(Some)
            .map_err(|source| CompileError::Parse { option, source }),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odsql_schema::{FieldMeta, SchemaMeta};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new()
            .with_schema(
                "Car",
                SchemaMeta::table("car_rows")
                    .field("Name", FieldMeta::string())
                    .field("Seats", FieldMeta::number())
                    .field("Engine", FieldMeta::complex("Engine")),
            )
            .with_schema("Engine", SchemaMeta::nested().field("Power", FieldMeta::number()))
    }

    #[test]
    fn test_blank_options_are_absent() {
        let registry = registry();
        let blank = QueryOptions::new().filter("  ").select("").orderby(" ");
        let sql = build_query(&Sqlite, &registry, "Car", &blank, true).unwrap();
        assert_eq!(sql, "SELECT car_rows.Data AS Data FROM car_rows");
    }

    #[test]
    fn test_single_object_forces_limit() {
        let registry = registry();
        let options = QueryOptions::new().top(5).skip(2);
        let sql = build_query(&Sqlite, &registry, "Car", &options, false).unwrap();
        assert!(sql.ends_with(" LIMIT 1"), "{}", sql);
    }

    #[test]
    fn test_unknown_and_nested_schemas() {
        let registry = registry();
        let options = QueryOptions::new();
        assert!(matches!(
            build_query(&Sqlite, &registry, "Boat", &options, true),
            Err(CompileError::UnknownSchema(name)) if name == "Boat"
        ));
        assert!(matches!(
            build_count_query(&Sqlite, &registry, "Engine", None),
            Err(CompileError::NotQueryable(name)) if name == "Engine"
        ));
    }

    #[test]
    fn test_parse_errors_name_the_option() {
        let registry = registry();
        let err = build_query(&Sqlite, &registry, "Car", &QueryOptions::new().orderby("Seats up"), true)
            .unwrap_err();
        assert!(matches!(err, CompileError::Parse { option: "$orderby", .. }));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_count() {
        let registry = registry();
        let sql = build_count_query(&Sqlite, &registry, "Car", Some("Seats gt 2")).unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM car_rows WHERE CAST(car_rows.Data ->> '$.Seats' AS NUMERIC) > 2"
        );
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let registry = registry();
        let options = QueryOptions::new().filter("Engine/Power ge 100").orderby("Name desc");
        let first = build_query(&Postgres, &registry, "Car", &options, true).unwrap();
        let second = build_query(&Postgres, &registry, "Car", &options, true).unwrap();
        assert_eq!(fingerprint(&first), fingerprint(&second));
        assert_eq!(fingerprint(&first).len(), 64);
    }
}
