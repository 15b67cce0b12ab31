//! SQL dialects
//!
//! The generator builds every statement from the primitives below; a dialect
//! only decides how each primitive is spelled. Dialects are stateless and are
//! passed explicitly to every compile.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::path::JsonPath;

mod duckdb;
mod postgres;
mod sqlite;

pub use duckdb::DuckDb;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

pub trait Dialect: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// JSON value at `path` inside the JSON expression `doc`.
    fn extract_json(&self, doc: &str, path: &JsonPath) -> String;

    /// SQL scalar at `path` inside `doc`. JSON `null` and missing keys are SQL `NULL`.
    fn extract_text(&self, doc: &str, path: &JsonPath) -> String;

    /// Object constructor from `(key, JSON value)` pairs.
    fn json_object(&self, members: &[(String, String)]) -> String;

    /// Aggregate collecting JSON values into an array in `order`; no rows give `[]`.
    fn json_array_agg(&self, value: &str, order: &str) -> String;

    /// FROM item producing one row per element of the JSON array `array`,
    /// and no rows when `array` is not an array.
    fn json_each(&self, array: &str, alias: &str) -> String;

    /// The current element of a [`Dialect::json_each`] row as a JSON value.
    fn element_doc(&self, alias: &str) -> String;

    /// Position of the current [`Dialect::json_each`] element in its array.
    fn element_index(&self, alias: &str) -> String;

    fn json_array_length(&self, array: &str) -> String;

    /// Coerce a JSON-typed expression (including one returned by a subquery)
    /// so object constructors embed it as JSON rather than as a string.
    fn json_value(&self, expr: &str) -> String;

    fn cast_number(&self, expr: &str) -> String;

    /// Cast text to a value that compares and sorts as an instant in time.
    fn cast_datetime(&self, expr: &str) -> String;

    /// Boolean literal comparable with the output of [`Dialect::extract_text`].
    fn bool_literal(&self, value: bool) -> String;

    fn quote_str(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// `LIMIT`/`OFFSET` clause, or `None` when neither is set.
    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String>;
}

/// Names the built-in dialects in configuration and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialectKind {
    #[default]
    Sqlite,
    Postgres,
    DuckDb,
}

impl DialectKind {
    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            DialectKind::Sqlite => &Sqlite,
            DialectKind::Postgres => &Postgres,
            DialectKind::DuckDb => &DuckDb,
        }
    }
}

impl FromStr for DialectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(DialectKind::Sqlite),
            "postgres" | "postgresql" => Ok(DialectKind::Postgres),
            "duckdb" => Ok(DialectKind::DuckDb),
            other => Err(format!("unknown dialect: {}", other)),
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dialect().name())
    }
}

/// Parenthesize `expr` unless it is already a single operand: a (qualified)
/// name, a number, a string literal, or a call whose parentheses close at the end.
pub(crate) fn operand(expr: &str) -> Cow<'_, str> {
    if is_atom(expr) {
        Cow::Borrowed(expr)
    } else {
        Cow::Owned(format!("({})", expr))
    }
}

fn is_atom(expr: &str) -> bool {
    if expr.is_empty() {
        return false;
    }
    if expr
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return true;
    }
    if expr.len() >= 2 && expr.starts_with('\'') && expr.ends_with('\'') {
        return !expr[1..expr.len() - 1].replace("''", "").contains('\'');
    }
    if let Some(open) = expr.find('(') {
        let name = &expr[..open];
        return name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            && closing_paren(expr, open) == Some(expr.len() - 1);
    }
    false
}

/// Index of the parenthesis closing the one at `open`, skipping string literals.
fn closing_paren(expr: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    for (i, c) in expr.char_indices().skip_while(|(i, _)| *i < open) {
        match c {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
