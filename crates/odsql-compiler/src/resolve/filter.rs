use odsql_ast::{CmpOp, Direction, Expr, Function, LambdaKind, Literal, OrderByItem, Path};
use odsql_schema::{FieldMeta, PrimitiveType};

use super::{Domain, FieldRef, Operand, Predicate, Resolver, SortKey};
use crate::error::{CompileError, ResolveError};

impl<'a> Resolver<'a> {
    pub fn resolve_predicate(&mut self, expr: &Expr) -> Result<Predicate, CompileError> {
        match expr {
            Expr::And(left, right) => Ok(Predicate::And(
                Box::new(self.resolve_predicate(left)?),
                Box::new(self.resolve_predicate(right)?),
            )),
            Expr::Or(left, right) => Ok(Predicate::Or(
                Box::new(self.resolve_predicate(left)?),
                Box::new(self.resolve_predicate(right)?),
            )),
            Expr::Not(inner) => Ok(Predicate::Not(Box::new(self.resolve_predicate(inner)?))),
            Expr::Literal(Literal::Bool(value)) => Ok(Predicate::Constant(*value)),
            Expr::Compare { op, left, right } => self.resolve_comparison(*op, left, right),
            Expr::Call { func, args } if *func != Function::Length => self.resolve_like(*func, args),
            Expr::Lambda {
                collection,
                kind,
                variable,
                body,
            } => self.resolve_lambda(collection, *kind, variable.as_deref(), body.as_deref()),
            // A bare boolean field reads as `field eq true`.
            Expr::Path(path) => {
                let field = self.resolve_path(path)?;
                if field.meta.primitive_type() != Some(PrimitiveType::Boolean) {
                    return Err(ResolveError::NotAPredicate(field.display).into());
                }
                Ok(Predicate::Compare {
                    op: CmpOp::Eq,
                    domain: Domain::Boolean,
                    left: Operand::Field(field),
                    right: Operand::Literal(Literal::Bool(true)),
                })
            }
            other => Err(ResolveError::NotAPredicate(describe(other)).into()),
        }
    }

    fn resolve_comparison(
        &mut self,
        op: CmpOp,
        left: &Expr,
        right: &Expr,
    ) -> Result<Predicate, CompileError> {
        let left = self.resolve_operand(left)?;
        let right = self.resolve_operand(right)?;

        match (left, right) {
            (Operand::Literal(Literal::Null), other) | (other, Operand::Literal(Literal::Null)) => {
                null_test(op, other)
            }
            (left, right) => {
                let domain = comparison_domain(&left, &right)?;
                Ok(Predicate::Compare {
                    op,
                    domain,
                    left,
                    right,
                })
            }
        }
    }

    fn resolve_operand(&mut self, expr: &Expr) -> Result<Operand, CompileError> {
        match expr {
            Expr::Literal(literal) => Ok(Operand::Literal(literal.clone())),
            Expr::Path(path) => Ok(Operand::Field(self.resolve_path(path)?)),
            Expr::Call {
                func: Function::Length,
                args,
            } => {
                let [Expr::Path(path)] = args.as_slice() else {
                    return Err(ResolveError::InvalidArgument {
                        function: Function::Length.name(),
                        reason: "expected a collection path".to_string(),
                    }
                    .into());
                };
                let field = self.resolve_path(path)?;
                if !matches!(field.meta, FieldMeta::Collection { .. }) {
                    return Err(ResolveError::NotACollection {
                        path: field.display,
                    }
                    .into());
                }
                Ok(Operand::Length(field))
            }
            other => Err(ResolveError::InvalidOperand(describe(other)).into()),
        }
    }

    fn resolve_like(&mut self, function: Function, args: &[Expr]) -> Result<Predicate, CompileError> {
        let invalid = |reason: &str| ResolveError::InvalidArgument {
            function: function.name(),
            reason: reason.to_string(),
        };

        let [Expr::Path(path), needle] = args else {
            return Err(invalid("first argument must be a field path").into());
        };
        let field = self.resolve_path(path)?;
        if !matches!(
            field.meta.primitive_type(),
            Some(PrimitiveType::String | PrimitiveType::Any)
        ) {
            return Err(invalid(&format!("{} is not a string field", field.display)).into());
        }
        let Expr::Literal(Literal::String(needle)) = needle else {
            return Err(invalid("second argument must be a string literal").into());
        };

        Ok(Predicate::Like {
            field,
            function,
            needle: needle.clone(),
        })
    }

    fn resolve_lambda(
        &mut self,
        collection: &Path,
        kind: LambdaKind,
        variable: Option<&str>,
        body: Option<&Expr>,
    ) -> Result<Predicate, CompileError> {
        let collection = self.resolve_path(collection)?;
        let FieldMeta::Collection { item } = &collection.meta else {
            return Err(ResolveError::NotACollection {
                path: collection.display,
            }
            .into());
        };
        let item = (**item).clone();
        let item_is_relationship = item.is_relationship();

        let body = match body {
            Some(body) => {
                self.push_frame(variable.map(str::to_string), item);
                let resolved = self.resolve_predicate(body);
                self.pop_frame();
                Some(Box::new(resolved?))
            }
            None => None,
        };

        Ok(Predicate::Lambda {
            kind,
            collection,
            item_is_relationship,
            body,
        })
    }

    pub fn resolve_orderby(&mut self, items: &[OrderByItem]) -> Result<Vec<SortKey>, CompileError> {
        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            let field = self.resolve_path(&item.path)?;
            let domain = match &field.meta {
                FieldMeta::Primitive {
                    ty: PrimitiveType::Number,
                } => Domain::Number,
                FieldMeta::Primitive {
                    ty: PrimitiveType::DateTime,
                } => Domain::DateTime,
                FieldMeta::Primitive { .. } => Domain::Text,
                other => {
                    return Err(ResolveError::NotOrderable {
                        path: field.display.clone(),
                        kind: other.kind_name(),
                    }
                    .into())
                }
            };
            keys.push(SortKey {
                field,
                domain,
                descending: item.direction == Direction::Desc,
            });
        }
        Ok(keys)
    }
}

/// `eq null` and `ne null`, with the other side already resolved.
fn null_test(op: CmpOp, other: Operand) -> Result<Predicate, CompileError> {
    let negated = match op {
        CmpOp::Eq => false,
        CmpOp::Ne => true,
        _ => return Err(ResolveError::NullOrdering(op.keyword()).into()),
    };
    match other {
        Operand::Field(field) => Ok(Predicate::IsNull { field, negated }),
        Operand::Literal(Literal::Null) => Ok(Predicate::Constant(!negated)),
        Operand::Literal(_) => Ok(Predicate::Constant(negated)),
        Operand::Length(field) => Err(ResolveError::InvalidOperand(format!(
            "length({}) compared with null",
            field.display
        ))
        .into()),
    }
}

fn comparison_domain(left: &Operand, right: &Operand) -> Result<Domain, CompileError> {
    let mismatch = || ResolveError::TypeMismatch {
        left: label(left),
        right: label(right),
    };

    let (left_domain, right_domain) = (operand_domain(left)?, operand_domain(right)?);
    let literal = [left, right].into_iter().find_map(|operand| match operand {
        Operand::Literal(literal) => Some(Domain::of_literal(literal)),
        _ => None,
    });

    let domain = literal
        .or(left_domain)
        .or(right_domain)
        .unwrap_or(Domain::Text);
    for side in [left_domain, right_domain].into_iter().flatten() {
        if side != domain {
            return Err(mismatch().into());
        }
    }
    Ok(domain)
}

/// The domain an operand insists on, `None` for untyped fields.
fn operand_domain(operand: &Operand) -> Result<Option<Domain>, CompileError> {
    match operand {
        Operand::Literal(literal) => Ok(Some(Domain::of_literal(literal))),
        Operand::Length(_) => Ok(Some(Domain::Number)),
        Operand::Field(field) => match &field.meta {
            FieldMeta::Primitive { ty } => Ok(Domain::of_primitive(*ty)),
            other => Err(ResolveError::NotComparable {
                path: field.display.clone(),
                kind: other.kind_name(),
            }
            .into()),
        },
    }
}

fn label(operand: &Operand) -> String {
    match operand {
        Operand::Field(FieldRef { display, meta, .. }) => match meta.primitive_type() {
            Some(PrimitiveType::String) => format!("{} (string)", display),
            Some(PrimitiveType::Number) => format!("{} (number)", display),
            Some(PrimitiveType::Boolean) => format!("{} (boolean)", display),
            Some(PrimitiveType::DateTime) => format!("{} (datetime)", display),
            Some(PrimitiveType::Any) | None => display.clone(),
        },
        Operand::Literal(literal) => format!("{} literal", literal.type_name()),
        Operand::Length(field) => format!("length({})", field.display),
    }
}

/// Short source-like rendering of an expression for error messages.
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Literal(Literal::Null) => "null".to_string(),
        Expr::Literal(Literal::Bool(value)) => value.to_string(),
        Expr::Literal(Literal::Number(number)) => number.clone(),
        Expr::Literal(Literal::String(value)) => format!("'{}'", value),
        Expr::Literal(Literal::DateTime(value)) => value.to_rfc3339(),
        Expr::Path(path) => path.to_string(),
        Expr::Not(inner) => format!("not {}", describe(inner)),
        Expr::And(left, right) => format!("{} and {}", describe(left), describe(right)),
        Expr::Or(left, right) => format!("{} or {}", describe(left), describe(right)),
        Expr::Compare { op, left, right } => {
            format!("{} {} {}", describe(left), op.keyword(), describe(right))
        }
        Expr::Call { func, args } => {
            let args: Vec<String> = args.iter().map(describe).collect();
            format!("{}({})", func.name(), args.join(", "))
        }
        Expr::Lambda {
            collection, kind, ..
        } => {
            let kind = match kind {
                LambdaKind::Any => "any",
                LambdaKind::All => "all",
            };
            format!("{}/{}(...)", collection, kind)
        }
    }
}
