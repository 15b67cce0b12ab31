//! Schema registry for JSON documents stored one per row
//!
//! Schemas are registered by name and reference each other by name. The
//! registry is immutable once built and is shared read-only by every compile.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

mod types;
pub use types::*;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read schema file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    #[error("{location}: references unknown schema {target}")]
    DanglingReference { location: String, target: String },

    #[error("{location}: complex field lists no schemas")]
    EmptyComplex { location: String },

    #[error("{location}: complex field with several schemas needs a discriminator")]
    MissingDiscriminator { location: String },

    #[error("{location}: discriminator mapping names {arm}, which is not one of the field's schemas")]
    UnknownMappingArm { location: String, arm: String },

    #[error("{location}: relationship target {target} has no table")]
    TargetNotQueryable { location: String, target: String },

    #[error("{location}: relationship property {property} is not a field of {target}")]
    MissingRelationshipProperty {
        location: String,
        target: String,
        property: String,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaRegistry {
    schemas: HashMap<String, SchemaMeta>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`SchemaRegistry::register`].
    pub fn with_schema(mut self, name: impl Into<String>, meta: SchemaMeta) -> Self {
        self.register(name, meta);
        self
    }

    pub fn register(&mut self, name: impl Into<String>, meta: SchemaMeta) {
        self.schemas.insert(name.into(), meta);
    }

    pub fn get(&self, name: &str) -> Option<&SchemaMeta> {
        self.schemas.get(name)
    }

    pub fn lookup(&self, name: &str) -> Result<&SchemaMeta, RegistryError> {
        self.schemas
            .get(name)
            .ok_or_else(|| RegistryError::SchemaNotFound(name.to_string()))
    }

    /// Registered schema names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Parse a YAML document mapping schema names to schemas, then validate it.
    pub fn from_yaml_str(source: &str) -> Result<Self, RegistryError> {
        let registry: SchemaRegistry = serde_yaml::from_str(source)?;
        registry.validate()?;
        Ok(registry)
    }

    /// Parse a JSON document mapping schema names to schemas, then validate it.
    pub fn from_json_str(source: &str) -> Result<Self, RegistryError> {
        let registry: SchemaRegistry = serde_json::from_str(source)?;
        registry.validate()?;
        Ok(registry)
    }

    /// Load from a file; `.json` files are read as JSON, anything else as YAML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            _ => Self::from_yaml_str(&contents),
        }
    }

    /// Check that every reference resolves. Failures here are programmer
    /// errors in the registry, not problems with a query.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for name in self.names() {
            check_name(name)?;
            let schema = &self.schemas[name];
            for (field, meta) in &schema.fields {
                check_name(field)?;
                self.validate_field(&format!("{}.{}", name, field), meta)?;
            }
        }
        Ok(())
    }

    fn validate_field(&self, location: &str, meta: &FieldMeta) -> Result<(), RegistryError> {
        match meta {
            FieldMeta::Primitive { .. } => Ok(()),
            FieldMeta::Complex {
                schemas,
                discriminator,
            } => {
                if schemas.is_empty() {
                    return Err(RegistryError::EmptyComplex {
                        location: location.to_string(),
                    });
                }
                for target in schemas {
                    self.require(location, target)?;
                }
                match discriminator {
                    None if schemas.len() > 1 => Err(RegistryError::MissingDiscriminator {
                        location: location.to_string(),
                    }),
                    Some(discriminator) => {
                        if let Some(arm) =
                            discriminator.mapping.keys().find(|arm| !schemas.contains(*arm))
                        {
                            return Err(RegistryError::UnknownMappingArm {
                                location: location.to_string(),
                                arm: arm.clone(),
                            });
                        }
                        Ok(())
                    }
                    None => Ok(()),
                }
            }
            FieldMeta::Collection { item } => self.validate_field(&format!("{}[]", location), item),
            FieldMeta::Relationship { schema, property } => {
                let target = self.require(location, schema)?;
                if target.table.is_none() {
                    return Err(RegistryError::TargetNotQueryable {
                        location: location.to_string(),
                        target: schema.clone(),
                    });
                }
                if target.get(property).is_none() {
                    return Err(RegistryError::MissingRelationshipProperty {
                        location: location.to_string(),
                        target: schema.clone(),
                        property: property.clone(),
                    });
                }
                Ok(())
            }
        }
    }

    fn require(&self, location: &str, target: &str) -> Result<&SchemaMeta, RegistryError> {
        self.schemas
            .get(target)
            .ok_or_else(|| RegistryError::DanglingReference {
                location: location.to_string(),
                target: target.to_string(),
            })
    }
}

fn check_name(name: &str) -> Result<(), RegistryError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidName(name.to_string()))
    }
}
