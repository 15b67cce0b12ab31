//! Semantic resolution
//!
//! Binds parsed paths to schema metadata and checks that every construct is
//! meaningful for the kind of field it touches. The output is fully resolved:
//! the generator never consults the registry.

use odsql_ast::{CmpOp, Function, LambdaKind, Literal, Path};
use odsql_schema::{Discriminator, FieldMeta, PrimitiveType, RegistryError, SchemaRegistry};
use tracing::trace;

use crate::error::{CompileError, ResolveError};
use crate::path::JsonPath;

mod filter;
mod select;

pub(crate) use select::{CollectionProjection, ObjectArm, Projection};

/// A relationship boundary crossed by a path.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Hop {
    /// Location of the stored reference inside the document before the hop.
    pub path: JsonPath,
    pub table: String,
    pub property: String,
}

/// Restricts a value to documents whose discriminator holds one of `values`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Guard {
    /// Number of hops taken before reaching the discriminated field.
    pub level: usize,
    pub path: JsonPath,
    pub values: Vec<String>,
}

/// A path bound to the scope it starts from and the field it ends at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FieldRef {
    pub scope: usize,
    pub hops: Vec<Hop>,
    /// Remaining path inside the document reached after the last hop.
    pub path: JsonPath,
    pub guards: Vec<Guard>,
    pub meta: FieldMeta,
    pub display: String,
}

/// How the two sides of a comparison, or a sort key, are lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Domain {
    Text,
    Number,
    Boolean,
    DateTime,
}

impl Domain {
    fn of_primitive(ty: PrimitiveType) -> Option<Domain> {
        match ty {
            PrimitiveType::String => Some(Domain::Text),
            PrimitiveType::Number => Some(Domain::Number),
            PrimitiveType::Boolean => Some(Domain::Boolean),
            PrimitiveType::DateTime => Some(Domain::DateTime),
            PrimitiveType::Any => None,
        }
    }

    fn of_literal(literal: &Literal) -> Domain {
        match literal {
            Literal::Null | Literal::String(_) => Domain::Text,
            Literal::Bool(_) => Domain::Boolean,
            Literal::Number(_) => Domain::Number,
            Literal::DateTime(_) => Domain::DateTime,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Field(FieldRef),
    Literal(Literal),
    Length(FieldRef),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Predicate {
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    Constant(bool),
    Compare {
        op: CmpOp,
        domain: Domain,
        left: Operand,
        right: Operand,
    },
    IsNull {
        field: FieldRef,
        negated: bool,
    },
    Like {
        field: FieldRef,
        function: Function,
        needle: String,
    },
    Lambda {
        kind: LambdaKind,
        collection: FieldRef,
        item_is_relationship: bool,
        body: Option<Box<Predicate>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SortKey {
    pub field: FieldRef,
    pub domain: Domain,
    pub descending: bool,
}

/// A name resolution scope: the statement root, a lambda body, or the
/// elements of a collection being filtered, ordered and projected.
#[derive(Debug)]
struct Frame {
    variable: Option<String>,
    root: FieldMeta,
}

pub(crate) struct Resolver<'a> {
    registry: &'a SchemaRegistry,
    frames: Vec<Frame>,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a SchemaRegistry, schema: &str) -> Self {
        Self {
            registry,
            frames: vec![Frame {
                variable: None,
                root: FieldMeta::complex(schema),
            }],
        }
    }

    fn push_frame(&mut self, variable: Option<String>, root: FieldMeta) {
        self.frames.push(Frame { variable, root });
    }

    fn pop_frame(&mut self) {
        self.frames.pop();
    }

    /// Pick the frame a path starts from. A leading lambda variable selects
    /// its frame; anything else starts from the innermost frame without one.
    fn locate<'p>(&self, path: &'p Path) -> (usize, &'p [String]) {
        if let Some(first) = path.first() {
            if let Some(index) = self
                .frames
                .iter()
                .rposition(|frame| frame.variable.as_deref() == Some(first))
            {
                return (index, &path.segments[1..]);
            }
        }
        let index = self
            .frames
            .iter()
            .rposition(|frame| frame.variable.is_none())
            .unwrap_or(0);
        (index, &path.segments[..])
    }

    pub fn resolve_path(&self, path: &Path) -> Result<FieldRef, CompileError> {
        let registry = self.registry;
        let (scope, segments) = self.locate(path);

        let mut meta = self.frames[scope].root.clone();
        let mut hops = Vec::new();
        let mut json = JsonPath::root();
        let mut guards = Vec::new();
        let mut walked: Vec<&str> = Vec::new();

        for segment in segments {
            meta = match meta {
                FieldMeta::Primitive { .. } => {
                    return Err(ResolveError::NotTraversable {
                        path: walked.join("/"),
                        kind: "primitive",
                    }
                    .into());
                }
                FieldMeta::Collection { .. } => {
                    return Err(ResolveError::CollectionTraversal {
                        path: walked.join("/"),
                    }
                    .into());
                }
                FieldMeta::Relationship { schema, property } => {
                    let target = registry.lookup(&schema)?;
                    let table = target.table.clone().ok_or_else(|| {
                        RegistryError::TargetNotQueryable {
                            location: walked.join("/"),
                            target: schema.clone(),
                        }
                    })?;
                    let field = target.get(segment).ok_or_else(|| ResolveError::UnknownField {
                        schema: schema.clone(),
                        field: segment.clone(),
                    })?;
                    hops.push(Hop {
                        path: std::mem::take(&mut json),
                        table,
                        property,
                    });
                    json.push(segment);
                    field.clone()
                }
                FieldMeta::Complex {
                    schemas,
                    discriminator,
                } => {
                    let mut candidates = Vec::new();
                    for name in &schemas {
                        if let Some(field) = registry.lookup(name)?.get(segment) {
                            candidates.push((name.as_str(), field));
                        }
                    }
                    if candidates.is_empty() {
                        return Err(ResolveError::UnknownField {
                            schema: schemas.join("|"),
                            field: segment.clone(),
                        }
                        .into());
                    }
                    if let Some(discriminator) = &discriminator {
                        if candidates.len() < schemas.len() {
                            guards.push(guard(discriminator, hops.len(), &json, &candidates));
                        }
                    }
                    json.push(segment);
                    merge_candidates(&candidates).ok_or_else(|| ResolveError::AmbiguousField {
                        path: walked.iter().copied().chain([segment.as_str()]).collect::<Vec<_>>().join("/"),
                    })?
                }
            };
            walked.push(segment);
        }

        trace!(path = %path, scope, hops = hops.len(), "resolved path");
        Ok(FieldRef {
            scope,
            hops,
            path: json,
            guards,
            meta,
            display: path.to_string(),
        })
    }
}

fn guard(
    discriminator: &Discriminator,
    level: usize,
    at: &JsonPath,
    candidates: &[(&str, &FieldMeta)],
) -> Guard {
    Guard {
        level,
        path: at.child(&discriminator.property),
        values: candidates
            .iter()
            .map(|(schema, _)| discriminator.value_for(schema).to_string())
            .collect(),
    }
}

/// The field a path segment names across the arms that declare it.
fn merge_candidates(candidates: &[(&str, &FieldMeta)]) -> Option<FieldMeta> {
    let first = candidates[0].1;
    if candidates.iter().all(|(_, field)| *field == first) {
        return Some(first.clone());
    }
    candidates
        .iter()
        .all(|(_, field)| matches!(field, FieldMeta::Primitive { .. }))
        .then(FieldMeta::any)
}
