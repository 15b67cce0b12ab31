//! SQL generation
//!
//! Lowers resolved queries into one statement through the [`Dialect`]
//! primitives. Generation cannot fail: everything that can go wrong is caught
//! by the resolver.
//!
//! Scopes mirror the resolver's frames one to one: the statement itself, then
//! one per lambda body and per collection projection being generated. Each
//! scope owns the relationship joins of its FROM clause.

use indexmap::IndexMap;

use crate::dialect::{operand, Dialect};
use crate::path::JsonPath;
use crate::resolve::{FieldRef, Predicate, Projection, SortKey};
use crate::DATA_COLUMN;

mod filter;
mod select;

#[derive(Debug)]
struct Join {
    alias: String,
    table: String,
    on: String,
    inner: bool,
}

#[derive(Debug, Default)]
struct Scope {
    /// JSON document of the current row or element.
    doc: String,
    join_prefix: String,
    /// Keyed by parent document and location of the stored reference.
    joins: IndexMap<String, Join>,
    /// Elements are relationships; joining them drops dangling references.
    inner_root: bool,
}

/// A JSON document expression together with the key joins are shared under.
#[derive(Debug, Clone)]
struct DocRef {
    key: String,
    expr: String,
    nullable: bool,
}

pub(crate) struct Generator<'d> {
    dialect: &'d dyn Dialect,
    scopes: Vec<Scope>,
    next_alias: usize,
}

impl<'d> Generator<'d> {
    pub fn new(dialect: &'d dyn Dialect, table: &str) -> Self {
        Self {
            dialect,
            scopes: vec![Scope {
                doc: format!("{}.{}", table, DATA_COLUMN),
                join_prefix: "j".to_string(),
                joins: IndexMap::new(),
                inner_root: false,
            }],
            next_alias: 0,
        }
    }

    pub fn select_statement(
        mut self,
        table: &str,
        projection: &Projection,
        filter: Option<&Predicate>,
        order: &[SortKey],
        top: Option<u64>,
        skip: Option<u64>,
    ) -> String {
        let root = self.scope_doc(0);
        let data = self.project(&root, &JsonPath::root(), projection);
        let condition = filter.map(|predicate| self.predicate(predicate));
        let order = self.order_by(order);
        let scope = self.pop_scope();

        let mut sql = format!(
            "SELECT {} AS {} FROM {}",
            data,
            DATA_COLUMN,
            from_clause(table, &scope)
        );
        self.append_tail(&mut sql, condition, &order, top, skip);
        sql
    }

    pub fn count_statement(mut self, table: &str, filter: Option<&Predicate>) -> String {
        let condition = filter.map(|predicate| self.predicate(predicate));
        let scope = self.pop_scope();

        let mut sql = format!("SELECT COUNT(*) FROM {}", from_clause(table, &scope));
        self.append_tail(&mut sql, condition, &[], None, None);
        sql
    }

    fn append_tail(
        &self,
        sql: &mut String,
        condition: Option<String>,
        order: &[String],
        top: Option<u64>,
        skip: Option<u64>,
    ) {
        if let Some(condition) = condition {
            sql.push_str(" WHERE ");
            sql.push_str(&condition);
        }
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        if let Some(clause) = self.dialect.limit_offset(top, skip) {
            sql.push(' ');
            sql.push_str(&clause);
        }
    }

    /// Open a scope iterating elements; returns the alias of the element rows.
    fn push_element_scope(&mut self, inner_root: bool) -> String {
        let alias = format!("e{}", self.next_alias);
        self.next_alias += 1;
        self.scopes.push(Scope {
            doc: self.dialect.element_doc(&alias),
            join_prefix: format!("{}_j", alias),
            joins: IndexMap::new(),
            inner_root,
        });
        alias
    }

    fn pop_scope(&mut self) -> Scope {
        self.scopes.pop().unwrap_or_default()
    }

    fn current_scope(&self) -> usize {
        self.scopes.len() - 1
    }

    fn scope_doc(&self, scope: usize) -> DocRef {
        DocRef {
            key: String::new(),
            expr: self.scopes[scope].doc.clone(),
            nullable: scope > 0,
        }
    }

    /// The document referenced from `at` inside `parent`, joined once per scope.
    fn join(
        &mut self,
        scope: usize,
        parent: &DocRef,
        at: &JsonPath,
        table: &str,
        property: &str,
    ) -> DocRef {
        let dialect = self.dialect;
        let key = format!("{}/{}", parent.key, at);
        let scope = &mut self.scopes[scope];

        let alias = match scope.joins.get(&key) {
            Some(join) => join.alias.clone(),
            None => {
                let alias = format!("{}{}", scope.join_prefix, scope.joins.len());
                let target = dialect.extract_text(
                    &format!("{}.{}", alias, DATA_COLUMN),
                    &JsonPath::root().child(property),
                );
                let reference = dialect.extract_text(&parent.expr, &at.child(property));
                let join = Join {
                    alias: alias.clone(),
                    table: table.to_string(),
                    on: format!("{} = {}", operand(&target), operand(&reference)),
                    inner: scope.inner_root && parent.key.is_empty() && at.is_root(),
                };
                scope.joins.insert(key.clone(), join);
                alias
            }
        };

        DocRef {
            key,
            expr: format!("{}.{}", alias, DATA_COLUMN),
            nullable: true,
        }
    }

    /// Documents along a field reference: the scope document, then one per hop.
    fn field_docs(&mut self, field: &FieldRef) -> Vec<DocRef> {
        let mut docs = vec![self.scope_doc(field.scope)];
        for hop in &field.hops {
            let parent = docs[docs.len() - 1].clone();
            docs.push(self.join(field.scope, &parent, &hop.path, &hop.table, &hop.property));
        }
        docs
    }

    fn field_text(&mut self, field: &FieldRef) -> String {
        let docs = self.field_docs(field);
        let value = self.dialect.extract_text(&docs[docs.len() - 1].expr, &field.path);
        self.guarded(field, &docs, value)
    }

    fn field_json(&mut self, field: &FieldRef) -> String {
        let docs = self.field_docs(field);
        let value = self.json_at(&docs[docs.len() - 1], &field.path);
        self.guarded(field, &docs, value)
    }

    fn json_at(&self, doc: &DocRef, path: &JsonPath) -> String {
        if path.is_root() {
            doc.expr.clone()
        } else {
            self.dialect.extract_json(&doc.expr, path)
        }
    }

    /// Null out `value` for documents whose union arm does not declare the field.
    fn guarded(&self, field: &FieldRef, docs: &[DocRef], value: String) -> String {
        if field.guards.is_empty() {
            return value;
        }
        let conditions: Vec<String> = field
            .guards
            .iter()
            .map(|guard| {
                let tag = self.dialect.extract_text(&docs[guard.level].expr, &guard.path);
                let values: Vec<String> =
                    guard.values.iter().map(|value| self.dialect.quote_str(value)).collect();
                format!("{} IN ({})", operand(&tag), values.join(", "))
            })
            .collect();
        format!("CASE WHEN {} THEN {} END", conditions.join(" AND "), value)
    }
}

fn from_clause(source: &str, scope: &Scope) -> String {
    let mut from = source.to_string();
    for join in scope.joins.values() {
        let kind = if join.inner { "JOIN" } else { "LEFT JOIN" };
        from.push_str(&format!(
            " {} {} AS {} ON {}",
            kind, join.table, join.alias, join.on
        ));
    }
    from
}
