//! Pest-based parser for OData query options

use chrono::DateTime;
use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

use crate::ast::*;

#[derive(Parser)]
#[grammar = "odata.pest"]
pub struct ODataParser;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Function {name} expects {expected} argument(s), got {actual}")]
    Arity {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid {kind} literal: {value}")]
    InvalidLiteral { kind: &'static str, value: String },

    #[error("Option {0} given more than once")]
    DuplicateOption(&'static str),

    #[error("Pest error: {0}")]
    Pest(#[from] Box<pest::error::Error<Rule>>),
}

/// Parse a `$filter` expression.
pub fn parse_filter(source: &str) -> Result<Expr, ParseError> {
    let pair = parse_rule(Rule::filter, source)?;
    build_expr(first_inner(pair, "filter expression")?)
}

/// Parse an `$orderby` list.
pub fn parse_orderby(source: &str) -> Result<Vec<OrderByItem>, ParseError> {
    let pair = parse_rule(Rule::orderby, source)?;
    build_orderby_list(first_inner(pair, "orderby list")?)
}

/// Parse a `$select` list, including nested item options.
pub fn parse_select(source: &str) -> Result<Vec<SelectItem>, ParseError> {
    let pair = parse_rule(Rule::select, source)?;
    build_select_list(first_inner(pair, "select list")?)
}

/// Parse an `$expand` list. Shares the item grammar with `$select`.
pub fn parse_expand(source: &str) -> Result<Vec<SelectItem>, ParseError> {
    let pair = parse_rule(Rule::expand, source)?;
    build_select_list(first_inner(pair, "expand list")?)
}

fn parse_rule(rule: Rule, source: &str) -> Result<Pair<'_, Rule>, ParseError> {
    let mut pairs = ODataParser::parse(rule, source).map_err(Box::new)?;
    pairs
        .next()
        .ok_or_else(|| ParseError::Syntax("Empty input".to_string()))
}

fn next_pair<'i>(pairs: &mut Pairs<'i, Rule>, what: &str) -> Result<Pair<'i, Rule>, ParseError> {
    pairs
        .next()
        .ok_or_else(|| ParseError::Syntax(format!("Missing {}", what)))
}

fn first_inner<'i>(pair: Pair<'i, Rule>, what: &str) -> Result<Pair<'i, Rule>, ParseError> {
    next_pair(&mut pair.into_inner(), what)
}

fn build_expr(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    match pair.as_rule() {
        Rule::expr | Rule::primary | Rule::paren_expr => {
            build_expr(first_inner(pair, "expression")?)
        }
        Rule::or_expr => fold_logical(pair, Expr::or),
        Rule::and_expr => fold_logical(pair, Expr::and),
        Rule::cmp_expr => {
            let mut inner = pair.into_inner();
            let left = build_expr(next_pair(&mut inner, "comparison operand")?)?;
            let Some(op) = inner.next() else {
                return Ok(left);
            };
            let op = CmpOp::from_keyword(op.as_str()).ok_or_else(|| {
                ParseError::Syntax(format!("Unknown comparison operator: {}", op.as_str()))
            })?;
            let right = build_expr(next_pair(&mut inner, "right operand")?)?;
            Ok(Expr::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            })
        }
        Rule::unary => {
            let mut negations = 0;
            let mut operand = None;
            for part in pair.into_inner() {
                match part.as_rule() {
                    Rule::not_op => negations += 1,
                    _ => operand = Some(build_expr(part)?),
                }
            }
            let mut expr =
                operand.ok_or_else(|| ParseError::Syntax("Missing operand".to_string()))?;
            for _ in 0..negations {
                expr = Expr::Not(Box::new(expr));
            }
            Ok(expr)
        }
        Rule::literal => Ok(Expr::Literal(build_literal(first_inner(pair, "literal")?)?)),
        Rule::path => Ok(Expr::Path(build_path(pair))),
        Rule::func_call => build_call(pair),
        Rule::lambda => build_lambda(pair),
        rule => Err(ParseError::Syntax(format!(
            "Unexpected rule in expression: {:?}",
            rule
        ))),
    }
}

fn fold_logical(pair: Pair<Rule>, combine: fn(Expr, Expr) -> Expr) -> Result<Expr, ParseError> {
    let mut operands = pair
        .into_inner()
        .filter(|p| !matches!(p.as_rule(), Rule::or_op | Rule::and_op));
    let first = operands
        .next()
        .ok_or_else(|| ParseError::Syntax("Missing operand".to_string()))?;
    let mut acc = build_expr(first)?;
    for operand in operands {
        acc = combine(acc, build_expr(operand)?);
    }
    Ok(acc)
}

fn build_literal(pair: Pair<Rule>) -> Result<Literal, ParseError> {
    let text = pair.as_str();
    match pair.as_rule() {
        Rule::null_lit => Ok(Literal::Null),
        Rule::bool_lit => Ok(Literal::Bool(text == "true")),
        Rule::string_lit => {
            let inner = first_inner(pair, "string body")?;
            Ok(Literal::String(inner.as_str().replace("''", "'")))
        }
        Rule::datetime_lit => DateTime::parse_from_rfc3339(text)
            .map(Literal::DateTime)
            .map_err(|_| ParseError::InvalidLiteral {
                kind: "datetime",
                value: text.to_string(),
            }),
        Rule::number_lit => match text.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(Literal::Number(text.to_string())),
            _ => Err(ParseError::InvalidLiteral {
                kind: "number",
                value: text.to_string(),
            }),
        },
        rule => Err(ParseError::Syntax(format!("Unexpected literal: {:?}", rule))),
    }
}

fn build_path(pair: Pair<Rule>) -> Path {
    Path::new(pair.into_inner().map(|ident| ident.as_str()))
}

fn build_call(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    let mut inner = pair.into_inner();
    let name = next_pair(&mut inner, "function name")?.as_str();
    let func =
        Function::from_name(name).ok_or_else(|| ParseError::UnknownFunction(name.to_string()))?;

    let args = inner.map(build_expr).collect::<Result<Vec<_>, _>>()?;
    if args.len() != func.arity() {
        return Err(ParseError::Arity {
            name: func.name(),
            expected: func.arity(),
            actual: args.len(),
        });
    }

    Ok(Expr::Call { func, args })
}

fn build_lambda(pair: Pair<Rule>) -> Result<Expr, ParseError> {
    let mut inner = pair.into_inner();
    let collection = build_path(next_pair(&mut inner, "lambda collection")?);
    let kind = match next_pair(&mut inner, "lambda operator")?.as_str() {
        "all" => LambdaKind::All,
        _ => LambdaKind::Any,
    };

    let (variable, body) = match inner.next() {
        Some(body) => {
            let mut parts = body.into_inner();
            let variable = next_pair(&mut parts, "lambda variable")?.as_str().to_string();
            let predicate = build_expr(next_pair(&mut parts, "lambda predicate")?)?;
            (Some(variable), Some(Box::new(predicate)))
        }
        None if kind == LambdaKind::All => {
            return Err(ParseError::Syntax(format!(
                "{}/all() requires a predicate",
                collection
            )));
        }
        None => (None, None),
    };

    Ok(Expr::Lambda {
        collection,
        kind,
        variable,
        body,
    })
}

fn build_orderby_list(pair: Pair<Rule>) -> Result<Vec<OrderByItem>, ParseError> {
    pair.into_inner().map(build_orderby_item).collect()
}

fn build_orderby_item(pair: Pair<Rule>) -> Result<OrderByItem, ParseError> {
    let mut inner = pair.into_inner();
    let path = build_path(next_pair(&mut inner, "orderby path")?);
    let direction = match inner.next().map(|d| d.as_str()) {
        Some("desc") => Direction::Desc,
        _ => Direction::Asc,
    };
    Ok(OrderByItem { path, direction })
}

fn build_select_list(pair: Pair<Rule>) -> Result<Vec<SelectItem>, ParseError> {
    pair.into_inner().map(build_select_item).collect()
}

fn build_select_item(pair: Pair<Rule>) -> Result<SelectItem, ParseError> {
    let mut inner = pair.into_inner();
    let first = next_pair(&mut inner, "select item")?;

    match first.as_rule() {
        Rule::wildcard => Ok(SelectItem::Wildcard),
        Rule::path => {
            let path = build_path(first);
            let options = match inner.next() {
                Some(options) => build_item_options(options)?,
                None => ItemOptions::default(),
            };
            Ok(SelectItem::Path { path, options })
        }
        rule => Err(ParseError::Syntax(format!("Unexpected select item: {:?}", rule))),
    }
}

fn build_item_options(pair: Pair<Rule>) -> Result<ItemOptions, ParseError> {
    let mut options = ItemOptions::default();

    for option in pair.into_inner() {
        let option = first_inner(option, "item option")?;
        match option.as_rule() {
            Rule::select_opt => {
                let items = build_select_list(first_inner(option, "$select value")?)?;
                set_once(&mut options.select, "$select", items)?;
            }
            Rule::expand_opt => {
                let items = build_select_list(first_inner(option, "$expand value")?)?;
                set_once(&mut options.expand, "$expand", items)?;
            }
            Rule::filter_opt => {
                let expr = build_expr(first_inner(option, "$filter value")?)?;
                set_once(&mut options.filter, "$filter", expr)?;
            }
            Rule::orderby_opt => {
                let items = build_orderby_list(first_inner(option, "$orderby value")?)?;
                set_once(&mut options.orderby, "$orderby", items)?;
            }
            Rule::top_opt => {
                let top = build_count(first_inner(option, "$top value")?)?;
                set_once(&mut options.top, "$top", top)?;
            }
            Rule::skip_opt => {
                let skip = build_count(first_inner(option, "$skip value")?)?;
                set_once(&mut options.skip, "$skip", skip)?;
            }
            rule => {
                return Err(ParseError::Syntax(format!("Unexpected item option: {:?}", rule)))
            }
        }
    }

    Ok(options)
}

fn build_count(pair: Pair<Rule>) -> Result<u64, ParseError> {
    pair.as_str()
        .parse()
        .map_err(|_| ParseError::InvalidLiteral {
            kind: "count",
            value: pair.as_str().to_string(),
        })
}

fn set_once<T>(slot: &mut Option<T>, name: &'static str, value: T) -> Result<(), ParseError> {
    if slot.is_some() {
        return Err(ParseError::DuplicateOption(name));
    }
    *slot = Some(value);
    Ok(())
}
