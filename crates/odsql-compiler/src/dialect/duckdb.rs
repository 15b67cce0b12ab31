use super::{operand, Dialect};
use crate::path::JsonPath;

/// DuckDB with the bundled `json` extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuckDb;

impl Dialect for DuckDb {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn extract_json(&self, doc: &str, path: &JsonPath) -> String {
        format!("{} -> {}", operand(doc), self.quote_str(&path.to_string()))
    }

    fn extract_text(&self, doc: &str, path: &JsonPath) -> String {
        format!("{} ->> {}", operand(doc), self.quote_str(&path.to_string()))
    }

    fn json_object(&self, members: &[(String, String)]) -> String {
        let args: Vec<String> = members
            .iter()
            .map(|(key, value)| format!("{}, {}", self.quote_str(key), value))
            .collect();
        format!("json_object({})", args.join(", "))
    }

    fn json_array_agg(&self, value: &str, order: &str) -> String {
        format!(
            "COALESCE(json_group_array({} ORDER BY {}), CAST('[]' AS JSON))",
            value, order
        )
    }

    fn json_each(&self, array: &str, alias: &str) -> String {
        let list = format!(
            "CAST(CASE WHEN json_type({array}) = 'ARRAY' THEN {array} END AS JSON[])",
            array = array
        );
        format!(
            "(SELECT UNNEST({list}) AS value, generate_subscripts({list}, 1) AS ordinal) AS {alias}",
            list = list,
            alias = alias
        )
    }

    fn element_doc(&self, alias: &str) -> String {
        format!("{}.value", alias)
    }

    fn element_index(&self, alias: &str) -> String {
        format!("{}.ordinal", alias)
    }

    fn json_array_length(&self, array: &str) -> String {
        format!("json_array_length({})", array)
    }

    fn json_value(&self, expr: &str) -> String {
        format!("CAST({} AS JSON)", expr)
    }

    fn cast_number(&self, expr: &str) -> String {
        format!("CAST({} AS DOUBLE)", expr)
    }

    fn cast_datetime(&self, expr: &str) -> String {
        format!("CAST({} AS TIMESTAMPTZ)", expr)
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
