//! AST types for OData query options
//!
//! Minimal AST representation closely following the Pest grammar. Nothing here
//! knows about schemas; names are resolved later by the compiler.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A `/`-separated property path such as `Engine/Options/Supercharger`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path {
    pub segments: Vec<String>,
}

impl Path {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    /// Kept as written; the grammar guarantees it is a valid decimal number.
    Number(String),
    String(String),
    DateTime(DateTime<FixedOffset>),
}

impl Literal {
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Null => "null",
            Literal::Bool(_) => "boolean",
            Literal::Number(_) => "number",
            Literal::String(_) => "string",
            Literal::DateTime(_) => "datetime",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CmpOp {
    pub fn keyword(self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Gt => "gt",
            CmpOp::Ge => "ge",
            CmpOp::Lt => "lt",
            CmpOp::Le => "le",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "eq" => Some(CmpOp::Eq),
            "ne" => Some(CmpOp::Ne),
            "gt" => Some(CmpOp::Gt),
            "ge" => Some(CmpOp::Ge),
            "lt" => Some(CmpOp::Lt),
            "le" => Some(CmpOp::Le),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Function {
    Contains,
    StartsWith,
    EndsWith,
    Length,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "contains" => Some(Function::Contains),
            "startswith" => Some(Function::StartsWith),
            "endswith" => Some(Function::EndsWith),
            "length" => Some(Function::Length),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Contains => "contains",
            Function::StartsWith => "startswith",
            Function::EndsWith => "endswith",
            Function::Length => "length",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Function::Length => 1,
            _ => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LambdaKind {
    Any,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    Path(Path),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        func: Function,
        args: Vec<Expr>,
    },
    /// `collection/any(var: body)` or `collection/all(var: body)`.
    /// `any()` with no body tests for a non-empty collection.
    Lambda {
        collection: Path,
        kind: LambdaKind,
        variable: Option<String>,
        body: Option<Box<Expr>>,
    },
}

impl Expr {
    pub fn and(left: Expr, right: Expr) -> Expr {
        Expr::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Expr, right: Expr) -> Expr {
        Expr::Or(Box::new(left), Box::new(right))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByItem {
    pub path: Path,
    pub direction: Direction,
}

/// One comma-separated entry of `$select` or `$expand`. Both options share
/// this shape: a path plus optional parenthesised item options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectItem {
    Wildcard,
    Path { path: Path, options: ItemOptions },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<SelectItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expand: Option<Vec<SelectItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orderby: Option<Vec<OrderByItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
}

impl ItemOptions {
    pub fn is_empty(&self) -> bool {
        self.select.is_none()
            && self.expand.is_none()
            && self.filter.is_none()
            && self.orderby.is_none()
            && self.top.is_none()
            && self.skip.is_none()
    }
}
