//! `$select` / `$expand` resolution
//!
//! Both options are merged into one tree keyed by field name, then the tree is
//! walked against the schema to decide the shape of the output document.

use indexmap::IndexMap;
use odsql_ast::{Expr, ItemOptions, OrderByItem, Path, SelectItem};
use odsql_schema::{Discriminator, FieldMeta, RegistryError};

use super::{Predicate, Resolver, SortKey};
use crate::error::{CompileError, ResolveError};

/// Output shape of a value, relative to the document it is read from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Projection {
    /// The stored JSON, unchanged.
    Raw,
    /// A rebuilt object. With a discriminator, one arm per union member,
    /// chosen per document by its tag.
    Object {
        discriminator: Option<String>,
        arms: Vec<ObjectArm>,
    },
    Collection(Box<CollectionProjection>),
    /// The target document of a relationship stored at this location.
    Expand {
        table: String,
        property: String,
        inner: Box<Projection>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ObjectArm {
    pub tag: Option<String>,
    pub members: Vec<(String, Projection)>,
}

/// Iterate, filter, order, page and re-aggregate the elements of an array.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CollectionProjection {
    pub item: Projection,
    pub item_is_relationship: bool,
    pub filter: Option<Predicate>,
    pub order: Vec<SortKey>,
    pub top: Option<u64>,
    pub skip: Option<u64>,
}

#[derive(Debug, Default)]
struct SelectNode {
    children: IndexMap<String, SelectNode>,
    /// Named by a `$select` path.
    in_select: bool,
    /// Named by an `$expand` path.
    in_expand: bool,
    wildcard: bool,
    expand: bool,
    /// `$expand=*` at this level.
    expand_all: bool,
    filter: Option<Expr>,
    orderby: Option<Vec<OrderByItem>>,
    top: Option<u64>,
    skip: Option<u64>,
}

impl SelectNode {
    fn insert(&mut self, items: &[SelectItem], from_expand: bool) -> Result<(), ResolveError> {
        for item in items {
            match item {
                SelectItem::Wildcard if from_expand => self.expand_all = true,
                SelectItem::Wildcard => self.wildcard = true,
                SelectItem::Path { path, options } => {
                    let mut node = &mut *self;
                    for segment in &path.segments {
                        node = node.children.entry(segment.clone()).or_default();
                        if from_expand {
                            node.in_expand = true;
                            node.expand = true;
                        } else {
                            node.in_select = true;
                        }
                    }
                    node.apply(options, path)?;
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, options: &ItemOptions, path: &Path) -> Result<(), ResolveError> {
        if let Some(select) = &options.select {
            self.insert(select, false)?;
        }
        if let Some(expand) = &options.expand {
            self.insert(expand, true)?;
        }
        set_once(&mut self.filter, &options.filter, "$filter", path)?;
        set_once(&mut self.orderby, &options.orderby, "$orderby", path)?;
        set_once(&mut self.top, &options.top, "$top", path)?;
        set_once(&mut self.skip, &options.skip, "$skip", path)
    }

    fn has_shape(&self) -> bool {
        !self.children.is_empty() || self.wildcard || self.expand_all
    }

    /// Name of the first collection-only option set on this node.
    fn collection_option(&self) -> Option<&'static str> {
        if self.filter.is_some() {
            Some("$filter")
        } else if self.orderby.is_some() {
            Some("$orderby")
        } else if self.top.is_some() {
            Some("$top")
        } else if self.skip.is_some() {
            Some("$skip")
        } else {
            None
        }
    }

    /// Whether `name` appears in the rebuilt object.
    fn includes(&self, name: &str) -> bool {
        let restricted = !self.wildcard && self.children.values().any(|child| child.in_select);
        !restricted
            || self
                .children
                .get(name)
                .is_some_and(|child| child.in_select || child.in_expand)
    }
}

fn set_once<T: Clone>(
    slot: &mut Option<T>,
    value: &Option<T>,
    option: &'static str,
    path: &Path,
) -> Result<(), ResolveError> {
    if let Some(value) = value {
        if slot.is_some() {
            return Err(ResolveError::ConflictingOption {
                option,
                path: path.to_string(),
            });
        }
        *slot = Some(value.clone());
    }
    Ok(())
}

fn is_expandable(field: &FieldMeta) -> bool {
    match field {
        FieldMeta::Relationship { .. } => true,
        FieldMeta::Collection { item } => item.is_relationship(),
        _ => false,
    }
}

fn child_display(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

impl<'a> Resolver<'a> {
    /// Output shape of the root document for the given `$select` and `$expand`.
    pub fn resolve_projection(
        &mut self,
        schema: &str,
        select: Option<&[SelectItem]>,
        expand: Option<&[SelectItem]>,
    ) -> Result<Projection, CompileError> {
        let mut root = SelectNode::default();
        if let Some(items) = select {
            root.insert(items, false)?;
        }
        if let Some(items) = expand {
            root.insert(items, true)?;
        }
        self.project(&FieldMeta::complex(schema), &root, "", true, false)
    }

    /// `with_options` is false when `node` was already consumed by an
    /// enclosing collection, whose item is being projected.
    fn project(
        &mut self,
        meta: &FieldMeta,
        node: &SelectNode,
        display: &str,
        with_options: bool,
        expanded: bool,
    ) -> Result<Projection, CompileError> {
        if with_options && !matches!(meta, FieldMeta::Collection { .. }) {
            if let Some(option) = node.collection_option() {
                return Err(ResolveError::OptionNotSupported {
                    option,
                    path: display.to_string(),
                    kind: meta.kind_name(),
                }
                .into());
            }
        }

        match meta {
            FieldMeta::Primitive { .. } if node.has_shape() => Err(ResolveError::NotTraversable {
                path: display.to_string(),
                kind: "primitive",
            }
            .into()),
            FieldMeta::Primitive { .. } => Ok(Projection::Raw),
            FieldMeta::Complex { .. } if !node.has_shape() => Ok(Projection::Raw),
            FieldMeta::Complex {
                schemas,
                discriminator,
            } => self.project_object(schemas, discriminator.as_ref(), node, display),
            FieldMeta::Collection { item } => {
                let options = with_options && node.collection_option().is_some();
                let expands_items = item.is_relationship() && (node.expand || expanded);
                if !node.has_shape() && !options && !expands_items {
                    return Ok(Projection::Raw);
                }

                self.push_frame(None, (**item).clone());
                let collection = self.project_collection(item, node, display, with_options, expanded);
                self.pop_frame();
                Ok(Projection::Collection(Box::new(collection?)))
            }
            FieldMeta::Relationship { schema, .. } if !(node.expand || expanded) => {
                self.project_reference(schema, node, display)
            }
            FieldMeta::Relationship { schema, property } => {
                let registry = self.registry;
                let table = registry.lookup(schema)?.table.clone().ok_or_else(|| {
                    RegistryError::TargetNotQueryable {
                        location: display.to_string(),
                        target: schema.clone(),
                    }
                })?;
                let inner = self.project(&FieldMeta::complex(schema), node, display, false, false)?;
                Ok(Projection::Expand {
                    table,
                    property: property.clone(),
                    inner: Box::new(inner),
                })
            }
        }
    }

    fn project_collection(
        &mut self,
        item: &FieldMeta,
        node: &SelectNode,
        display: &str,
        with_options: bool,
        expanded: bool,
    ) -> Result<CollectionProjection, CompileError> {
        let (filter, order, top, skip) = if with_options {
            let filter = match &node.filter {
                Some(filter) => Some(self.resolve_predicate(filter)?),
                None => None,
            };
            let order = match &node.orderby {
                Some(items) => self.resolve_orderby(items)?,
                None => Vec::new(),
            };
            (filter, order, node.top, node.skip)
        } else {
            (None, Vec::new(), None, None)
        };

        let item_projection = self.project(item, node, display, false, expanded)?;
        Ok(CollectionProjection {
            item: item_projection,
            item_is_relationship: item.is_relationship(),
            filter,
            order,
            top,
            skip,
        })
    }

    fn project_object(
        &mut self,
        schemas: &[String],
        discriminator: Option<&Discriminator>,
        node: &SelectNode,
        display: &str,
    ) -> Result<Projection, CompileError> {
        let registry = self.registry;

        for name in node.children.keys() {
            let mut declared = false;
            for schema in schemas {
                declared |= registry.lookup(schema)?.get(name).is_some();
            }
            if !declared {
                return Err(ResolveError::UnknownField {
                    schema: schemas.join("|"),
                    field: name.clone(),
                }
                .into());
            }
        }

        let empty = SelectNode::default();
        let mut arms = Vec::with_capacity(schemas.len());
        for schema in schemas {
            let mut members = Vec::new();
            for (name, field) in &registry.lookup(schema)?.fields {
                let is_tag = discriminator.is_some_and(|d| &d.property == name);
                let expanded_by_wildcard = node.expand_all && is_expandable(field);
                if is_tag || !(node.includes(name) || expanded_by_wildcard) {
                    continue;
                }
                let child = node.children.get(name).unwrap_or(&empty);
                let projection = self.project(
                    field,
                    child,
                    &child_display(display, name),
                    true,
                    node.expand_all,
                )?;
                members.push((name.clone(), projection));
            }
            arms.push(ObjectArm {
                tag: discriminator.map(|d| d.value_for(schema).to_string()),
                members,
            });
        }

        Ok(Projection::Object {
            discriminator: discriminator.map(|d| d.property.clone()),
            arms,
        })
    }

    /// A relationship that is not expanded only has its stored reference
    /// object. Sub-selections pick keys out of that object.
    fn project_reference(
        &mut self,
        schema: &str,
        node: &SelectNode,
        display: &str,
    ) -> Result<Projection, CompileError> {
        if node.children.is_empty() {
            return Ok(Projection::Raw);
        }
        let target = self.registry.lookup(schema)?;
        let mut members = Vec::with_capacity(node.children.len());
        for (name, child) in &node.children {
            let Some(field) = target.get(name) else {
                return Err(ResolveError::UnknownField {
                    schema: schema.to_string(),
                    field: name.clone(),
                }
                .into());
            };
            if child.has_shape() && matches!(field, FieldMeta::Primitive { .. }) {
                return Err(ResolveError::NotTraversable {
                    path: child_display(display, name),
                    kind: "primitive",
                }
                .into());
            }
            members.push((name.clone(), Projection::Raw));
        }
        Ok(Projection::Object {
            discriminator: None,
            arms: vec![ObjectArm {
                tag: None,
                members,
            }],
        })
    }
}
