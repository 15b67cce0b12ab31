use super::{operand, Dialect};
use crate::path::JsonPath;

/// PostgreSQL over a `jsonb` data column.
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Postgres {
    fn path(&self, path: &JsonPath) -> String {
        self.quote_str(&format!("{{{}}}", path.segments().join(",")))
    }

    fn only_arrays(&self, array: &str) -> String {
        format!(
            "CASE WHEN JSONB_TYPEOF({array}) = 'array' THEN {array} END",
            array = array
        )
    }
}

impl Dialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn extract_json(&self, doc: &str, path: &JsonPath) -> String {
        format!("{} #> {}", operand(doc), self.path(path))
    }

    fn extract_text(&self, doc: &str, path: &JsonPath) -> String {
        format!("{} #>> {}", operand(doc), self.path(path))
    }

    fn json_object(&self, members: &[(String, String)]) -> String {
        let args: Vec<String> = members
            .iter()
            .map(|(key, value)| format!("{}, {}", self.quote_str(key), value))
            .collect();
        format!("JSONB_BUILD_OBJECT({})", args.join(", "))
    }

    fn json_array_agg(&self, value: &str, order: &str) -> String {
        format!("COALESCE(JSONB_AGG({} ORDER BY {}), '[]'::jsonb)", value, order)
    }

    fn json_each(&self, array: &str, alias: &str) -> String {
        format!(
            "JSONB_ARRAY_ELEMENTS({}) WITH ORDINALITY AS {}(value, ordinal)",
            self.only_arrays(array),
            alias
        )
    }

    fn element_doc(&self, alias: &str) -> String {
        format!("{}.value", alias)
    }

    fn element_index(&self, alias: &str) -> String {
        format!("{}.ordinal", alias)
    }

    fn json_array_length(&self, array: &str) -> String {
        format!("JSONB_ARRAY_LENGTH({})", self.only_arrays(array))
    }

    fn json_value(&self, expr: &str) -> String {
        format!("{}::jsonb", operand(expr))
    }

    fn cast_number(&self, expr: &str) -> String {
        format!("{}::numeric", operand(expr))
    }

    fn cast_datetime(&self, expr: &str) -> String {
        format!("{}::timestamptz", operand(expr))
    }

    fn bool_literal(&self, value: bool) -> String {
        let literal = if value { "'true'" } else { "'false'" };
        literal.to_string()
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (None, None) => None,
            (Some(limit), None) => Some(format!("LIMIT {}", limit)),
            (Some(limit), Some(offset)) => Some(format!("LIMIT {} OFFSET {}", limit, offset)),
            (None, Some(offset)) => Some(format!("OFFSET {}", offset)),
        }
    }
}
