//! OData query option AST - grammar, parser and AST types

pub mod ast;
mod parser;

pub use ast::*;
pub use parser::{parse_expand, parse_filter, parse_orderby, parse_select, ParseError, Rule};
