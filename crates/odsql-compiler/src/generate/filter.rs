use chrono::{SecondsFormat, SubsecRound, Utc};
use odsql_ast::{CmpOp, Function, LambdaKind, Literal};

use crate::dialect::operand;
use crate::resolve::{Domain, FieldRef, Operand, Predicate, SortKey};

use super::{from_clause, Generator};

impl<'d> Generator<'d> {
    pub(super) fn predicate(&mut self, predicate: &Predicate) -> String {
        match predicate {
            Predicate::And(left, right) => {
                format!("({} AND {})", self.predicate(left), self.predicate(right))
            }
            Predicate::Or(left, right) => {
                format!("({} OR {})", self.predicate(left), self.predicate(right))
            }
            Predicate::Not(inner) => format!("NOT ({})", self.predicate(inner)),
            Predicate::Constant(true) => "1 = 1".to_string(),
            Predicate::Constant(false) => "1 = 0".to_string(),
            Predicate::Compare {
                op,
                domain,
                left,
                right,
            } => {
                let left = self.operand(left, *domain);
                let right = self.operand(right, *domain);
                format!("{} {} {}", operand(&left), sql_operator(*op), operand(&right))
            }
            Predicate::IsNull { field, negated } => {
                let value = self.field_text(field);
                let test = if *negated { "IS NOT NULL" } else { "IS NULL" };
                format!("{} {}", operand(&value), test)
            }
            Predicate::Like {
                field,
                function,
                needle,
            } => {
                let value = self.field_text(field);
                let pattern = like_pattern(*function, needle);
                format!(
                    "{} LIKE {} ESCAPE '\\'",
                    operand(&value),
                    self.dialect.quote_str(&pattern)
                )
            }
            Predicate::Lambda {
                kind,
                collection,
                item_is_relationship,
                body,
            } => {
                let array = self.field_json(collection);
                let alias = self.push_element_scope(*item_is_relationship);
                let condition = body.as_ref().map(|body| self.predicate(body));
                let scope = self.pop_scope();
                let from = from_clause(&self.dialect.json_each(&array, &alias), &scope);

                match (kind, condition) {
                    (_, None) => format!("EXISTS (SELECT 1 FROM {})", from),
                    (LambdaKind::Any, Some(condition)) => {
                        format!("EXISTS (SELECT 1 FROM {} WHERE {})", from, condition)
                    }
                    // Elements the body can not decide (NULL) do not satisfy it.
                    (LambdaKind::All, Some(condition)) => format!(
                        "NOT EXISTS (SELECT 1 FROM {} WHERE NOT COALESCE({}, FALSE))",
                        from, condition
                    ),
                }
            }
        }
    }

    /// Sort keys with nulls placed explicitly: first ascending, last descending.
    pub(super) fn order_by(&mut self, keys: &[SortKey]) -> Vec<String> {
        keys.iter()
            .map(|key| {
                let value = self.typed_field(&key.field, key.domain);
                let direction = if key.descending {
                    "DESC NULLS LAST"
                } else {
                    "ASC NULLS FIRST"
                };
                format!("{} {}", operand(&value), direction)
            })
            .collect()
    }

    fn operand(&mut self, operand: &Operand, domain: Domain) -> String {
        match operand {
            Operand::Field(field) => self.typed_field(field, domain),
            Operand::Literal(literal) => self.literal(literal),
            Operand::Length(field) => {
                let array = self.field_json(field);
                self.dialect.json_array_length(&array)
            }
        }
    }

    /// Field value lowered into the comparison domain.
    fn typed_field(&mut self, field: &FieldRef, domain: Domain) -> String {
        let text = self.field_text(field);
        match domain {
            Domain::Text | Domain::Boolean => text,
            Domain::Number => self.dialect.cast_number(&text),
            Domain::DateTime => self.dialect.cast_datetime(&text),
        }
    }

    fn literal(&self, literal: &Literal) -> String {
        match literal {
            Literal::Null => "NULL".to_string(),
            Literal::Bool(value) => self.dialect.bool_literal(*value),
            Literal::Number(number) => number.clone(),
            Literal::String(value) => self.dialect.quote_str(value),
            // Millisecond precision, the finest every dialect keeps.
            Literal::DateTime(value) => {
                let utc = value
                    .with_timezone(&Utc)
                    .trunc_subsecs(3)
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true);
                self.dialect.cast_datetime(&self.dialect.quote_str(&utc))
            }
        }
    }
}

fn sql_operator(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "=",
        CmpOp::Ne => "!=",
        CmpOp::Gt => ">",
        CmpOp::Ge => ">=",
        CmpOp::Lt => "<",
        CmpOp::Le => "<=",
    }
}

/// LIKE pattern for a string function, with `\` as the escape character.
fn like_pattern(function: Function, needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    match function {
        Function::StartsWith => format!("{}%", escaped),
        Function::EndsWith => format!("%{}", escaped),
        _ => format!("%{}%", escaped),
    }
}
