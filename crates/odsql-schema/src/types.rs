//! Field and schema metadata
//!
//! A schema describes the JSON document stored in one row (or nested inside
//! another document). Schemas reference each other by name through the
//! registry, which keeps recursive and mutually recursive shapes simple.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Scalar type of a primitive field. Selects how values are compared and sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    String,
    Number,
    Boolean,
    DateTime,
    /// Untyped; takes its comparison domain from the other operand.
    #[default]
    Any,
}

/// Tags the arms of a polymorphic complex field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discriminator {
    /// Property inside the document holding the tag.
    pub property: String,

    /// Schema name to stored tag value. Unmapped arms use their schema name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub mapping: IndexMap<String, String>,
}

impl Discriminator {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            mapping: IndexMap::new(),
        }
    }

    /// Tag value stored in documents of the given arm.
    pub fn value_for<'a>(&'a self, schema: &'a str) -> &'a str {
        self.mapping.get(schema).map(String::as_str).unwrap_or(schema)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldMeta {
    Primitive {
        #[serde(default, rename = "type")]
        ty: PrimitiveType,
    },
    /// Nested object. More than one schema makes it a discriminated union.
    Complex {
        schemas: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        discriminator: Option<Discriminator>,
    },
    Collection {
        item: Box<FieldMeta>,
    },
    /// Reference to a document in another table. The stored value is an
    /// object holding `property`, matched against the same property of the
    /// target document.
    Relationship {
        schema: String,
        property: String,
    },
}

impl FieldMeta {
    pub fn primitive(ty: PrimitiveType) -> Self {
        FieldMeta::Primitive { ty }
    }

    pub fn string() -> Self {
        Self::primitive(PrimitiveType::String)
    }

    pub fn number() -> Self {
        Self::primitive(PrimitiveType::Number)
    }

    pub fn boolean() -> Self {
        Self::primitive(PrimitiveType::Boolean)
    }

    pub fn datetime() -> Self {
        Self::primitive(PrimitiveType::DateTime)
    }

    pub fn any() -> Self {
        Self::primitive(PrimitiveType::Any)
    }

    pub fn complex(schema: impl Into<String>) -> Self {
        FieldMeta::Complex {
            schemas: vec![schema.into()],
            discriminator: None,
        }
    }

    /// Discriminated union over `schemas`, tagged by `property`.
    pub fn union<I, S>(schemas: I, property: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldMeta::Complex {
            schemas: schemas.into_iter().map(Into::into).collect(),
            discriminator: Some(Discriminator::new(property)),
        }
    }

    /// Store `value` as the tag of arm `schema`. No effect on other kinds.
    pub fn with_mapping(mut self, schema: impl Into<String>, value: impl Into<String>) -> Self {
        if let FieldMeta::Complex {
            discriminator: Some(discriminator),
            ..
        } = &mut self
        {
            discriminator.mapping.insert(schema.into(), value.into());
        }
        self
    }

    pub fn collection(item: FieldMeta) -> Self {
        FieldMeta::Collection {
            item: Box::new(item),
        }
    }

    pub fn relationship(schema: impl Into<String>, property: impl Into<String>) -> Self {
        FieldMeta::Relationship {
            schema: schema.into(),
            property: property.into(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldMeta::Primitive { .. } => "primitive",
            FieldMeta::Complex { .. } => "complex",
            FieldMeta::Collection { .. } => "collection",
            FieldMeta::Relationship { .. } => "relationship",
        }
    }

    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        match self {
            FieldMeta::Primitive { ty } => Some(*ty),
            _ => None,
        }
    }

    pub fn is_relationship(&self) -> bool {
        matches!(self, FieldMeta::Relationship { .. })
    }
}

/// Metadata for one named schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMeta {
    /// Backing table. `None` for schemas that only appear nested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Fields in declaration order.
    #[serde(default)]
    pub fields: IndexMap<String, FieldMeta>,
}

impl SchemaMeta {
    /// A top-level schema stored in `table`.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            fields: IndexMap::new(),
        }
    }

    /// A schema that only appears nested inside other documents.
    pub fn nested() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, meta: FieldMeta) -> Self {
        self.fields.insert(name.into(), meta);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.get(name)
    }
}
