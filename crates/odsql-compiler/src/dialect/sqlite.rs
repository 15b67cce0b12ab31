use super::{operand, Dialect};
use crate::path::JsonPath;

/// SQLite with the JSON1 functions and the `->` / `->>` operators (3.38+).
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
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
        format!("JSON_OBJECT({})", args.join(", "))
    }

    fn json_array_agg(&self, value: &str, order: &str) -> String {
        format!("JSON_GROUP_ARRAY({} ORDER BY {})", value, order)
    }

    fn json_each(&self, array: &str, alias: &str) -> String {
        format!(
            "JSON_EACH(CASE WHEN JSON_TYPE({array}) = 'array' THEN {array} END) AS {alias}",
            array = array,
            alias = alias
        )
    }

    // `value` is a bare SQL scalar for primitive elements, so rebuild the JSON
    // text from the element type.
    fn element_doc(&self, alias: &str) -> String {
        format!(
            "CASE {a}.type WHEN 'object' THEN {a}.value WHEN 'array' THEN {a}.value \
             WHEN 'true' THEN 'true' WHEN 'false' THEN 'false' WHEN 'null' THEN 'null' \
             ELSE JSON_QUOTE({a}.value) END",
            a = alias
        )
    }

    fn element_index(&self, alias: &str) -> String {
        format!("{}.key", alias)
    }

    fn json_array_length(&self, array: &str) -> String {
        format!("JSON_ARRAY_LENGTH({})", array)
    }

    fn json_value(&self, expr: &str) -> String {
        format!("JSON({})", expr)
    }

    fn cast_number(&self, expr: &str) -> String {
        format!("CAST({} AS NUMERIC)", expr)
    }

    fn cast_datetime(&self, expr: &str) -> String {
        format!("STRFTIME('%Y-%m-%dT%H:%M:%fZ', {})", expr)
    }

    // `->>` returns JSON booleans as integers.
    fn bool_literal(&self, value: bool) -> String {
        let literal = if value { "1" } else { "0" };
        literal.to_string()
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (None, None) => None,
            (Some(limit), None) => Some(format!("LIMIT {}", limit)),
            (Some(limit), Some(offset)) => Some(format!("LIMIT {} OFFSET {}", limit, offset)),
            (None, Some(offset)) => Some(format!("LIMIT -1 OFFSET {}", offset)),
        }
    }
}
