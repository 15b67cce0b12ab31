use odsql_ast::ParseError;
use odsql_schema::RegistryError;
use thiserror::Error;

/// A query that parses but does not make sense against the schema.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Unknown field {field} in {schema}")]
    UnknownField { schema: String, field: String },

    #[error("Can not traverse into {kind} field {path}")]
    NotTraversable { path: String, kind: &'static str },

    #[error("{path} is a collection; use any(), all() or length() to reach into it")]
    CollectionTraversal { path: String },

    #[error("{path} is not a collection")]
    NotACollection { path: String },

    #[error("{path} is a {kind} field and can only be compared with null")]
    NotComparable { path: String, kind: &'static str },

    #[error("Can not compare {left} with {right}")]
    TypeMismatch { left: String, right: String },

    #[error("Operator {0} can not be used with null")]
    NullOrdering(&'static str),

    #[error("{0} is not a boolean expression")]
    NotAPredicate(String),

    #[error("{0} can not be used as a comparison operand")]
    InvalidOperand(String),

    #[error("{function}(): {reason}")]
    InvalidArgument {
        function: &'static str,
        reason: String,
    },

    #[error("Can not order by {kind} field {path}")]
    NotOrderable { path: String, kind: &'static str },

    #[error("{option} is only supported on collection fields, {path} is a {kind} field")]
    OptionNotSupported {
        option: &'static str,
        path: String,
        kind: &'static str,
    },

    #[error("{option} is given twice for {path}")]
    ConflictingOption { option: &'static str, path: String },

    #[error("Arms of {path} disagree on the kind of the field")]
    AmbiguousField { path: String },
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Invalid {option}: {source}")]
    Parse {
        option: &'static str,
        #[source]
        source: ParseError,
    },

    #[error("Unknown schema: {0}")]
    UnknownSchema(String),

    #[error("Trying to query complex type schema {0} with no source table")]
    NotQueryable(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Schema registry is inconsistent: {0}")]
    Registry(#[from] RegistryError),
}

impl CompileError {
    /// True when the request itself is at fault. Registry inconsistencies are
    /// programmer errors and should not be reported to the client as such.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, CompileError::Registry(_))
    }
}
