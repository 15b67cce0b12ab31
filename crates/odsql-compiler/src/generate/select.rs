use crate::dialect::operand;
use crate::path::JsonPath;
use crate::resolve::{CollectionProjection, ObjectArm, Projection};

use super::{from_clause, DocRef, Generator};

const SEQUENCE_COLUMN: &str = "seq";

impl<'d> Generator<'d> {
    /// JSON value of the data at `path` inside `doc`, shaped by `projection`.
    pub(super) fn project(&mut self, doc: &DocRef, path: &JsonPath, projection: &Projection) -> String {
        match projection {
            Projection::Raw => self.json_at(doc, path),
            Projection::Object {
                discriminator: Some(property),
                arms,
            } => {
                let tag = self.dialect.extract_text(&doc.expr, &path.child(property));
                let mut sql = format!("CASE {}", operand(&tag));
                for arm in arms {
                    let tag = arm.tag.as_deref().unwrap_or_default();
                    let object = self.object(doc, path, Some((property.as_str(), tag)), arm);
                    sql.push_str(&format!(" WHEN {} THEN {}", self.dialect.quote_str(tag), object));
                }
                sql.push_str(" END");
                sql
            }
            Projection::Object {
                discriminator: None,
                arms,
            } => {
                let object = match arms.first() {
                    Some(arm) => self.object(doc, path, None, arm),
                    None => self.dialect.json_object(&[]),
                };
                if doc.nullable || !path.is_root() {
                    let stored = self.dialect.extract_text(&doc.expr, path);
                    format!("CASE WHEN {} IS NOT NULL THEN {} END", operand(&stored), object)
                } else {
                    object
                }
            }
            Projection::Collection(collection) => self.collection(doc, path, collection),
            Projection::Expand {
                table,
                property,
                inner,
            } => {
                let scope = self.current_scope();
                let target = self.join(scope, doc, path, table, property);
                self.project(&target, &JsonPath::root(), inner)
            }
        }
    }

    fn object(
        &mut self,
        doc: &DocRef,
        path: &JsonPath,
        tag: Option<(&str, &str)>,
        arm: &ObjectArm,
    ) -> String {
        let mut members = Vec::with_capacity(arm.members.len() + 1);
        if let Some((property, value)) = tag {
            members.push((property.to_string(), self.dialect.quote_str(value)));
        }
        for (name, member) in &arm.members {
            let value = self.project(doc, &path.child(name), member);
            members.push((name.clone(), self.dialect.json_value(&value)));
        }
        self.dialect.json_object(&members)
    }

    fn collection(&mut self, doc: &DocRef, path: &JsonPath, collection: &CollectionProjection) -> String {
        let dialect = self.dialect;
        let array = self.json_at(doc, path);

        let alias = self.push_element_scope(collection.item_is_relationship);
        let element = self.scope_doc(self.current_scope());
        let item = self.project(&element, &JsonPath::root(), &collection.item);
        let condition = collection
            .filter
            .as_ref()
            .map(|predicate| self.predicate(predicate));
        let mut order = self.order_by(&collection.order);
        order.push(dialect.element_index(&alias));
        let scope = self.pop_scope();

        // Elements are numbered in output order; paging and aggregation go by that number.
        let mut rows = format!(
            "SELECT {} AS value, ROW_NUMBER() OVER (ORDER BY {}) AS {} FROM {}",
            item,
            order.join(", "),
            SEQUENCE_COLUMN,
            from_clause(&dialect.json_each(&array, &alias), &scope)
        );
        let paging = collection.top.is_some() || collection.skip.is_some();
        let row_order = if paging {
            vec![SEQUENCE_COLUMN.to_string()]
        } else {
            Vec::new()
        };
        self.append_tail(&mut rows, condition, &row_order, collection.top, collection.skip);

        let rows_alias = format!("{}_l", alias);
        format!(
            "(SELECT {} FROM ({}) AS {})",
            dialect.json_array_agg(
                &dialect.json_value(&format!("{}.value", rows_alias)),
                &format!("{}.{}", rows_alias, SEQUENCE_COLUMN)
            ),
            rows,
            rows_alias
        )
    }
}
