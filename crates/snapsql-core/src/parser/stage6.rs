//! Parserstep6: semantic validation (spec.md §4.7).
//!
//! Type-checks every directive expression against the parameter schema
//! plus constants, threading a nested `Namespace` through `for` bindings.
//! This pass does not touch the AST; it only validates and, as a side
//! effect the emitter later reuses, parses each distinct expression text
//! once.

use snapsql_token::{DirectiveKind, Token};

use crate::errors::{CompileDiagnostic, CompileError, ErrorKind};
use crate::expr::{self, Expr, Namespace};
use crate::schema::{Constants, FunctionDefinition, ParamType};

pub fn run(
    tokens: &[Token],
    schema: &FunctionDefinition,
    constants: &Constants,
) -> Result<(), CompileError> {
    let mut base = snapsql_helpers::IndexMap::default();
    for (name, ty) in &schema.parameters {
        base.insert(name.clone(), ty.clone());
    }
    for name in constants.keys() {
        base.entry(name.clone()).or_insert(ParamType::Str);
    }
    let root = Namespace::new(base);

    let mut sink = Vec::new();
    let mut stack: Vec<Namespace> = vec![root];
    // Parallel to `stack`, but records which directive kind opened each
    // frame beyond the root, so `End` knows whether to pop a namespace
    // (`For`) or just close an `If` that never pushed one.
    let mut nest_stack: Vec<DirectiveKind> = Vec::new();

    for tok in tokens {
        let Some(payload) = tok.directive.as_ref() else {
            continue;
        };
        match payload.kind {
            DirectiveKind::If => {
                if let Some(cond) = &payload.condition {
                    check_expr(cond, stack.last().unwrap(), tok, &mut sink);
                }
                nest_stack.push(DirectiveKind::If);
            }
            DirectiveKind::ElseIf => {
                if let Some(cond) = &payload.condition {
                    check_expr(cond, stack.last().unwrap(), tok, &mut sink);
                }
            }
            DirectiveKind::Variable | DirectiveKind::Const => {
                if let Some(cond) = &payload.condition {
                    check_expr(cond, stack.last().unwrap(), tok, &mut sink);
                }
            }
            DirectiveKind::For => {
                nest_stack.push(DirectiveKind::For);
                let namespace = stack.last().unwrap();
                let (Some(cond), Some(var)) = (&payload.condition, &payload.loop_var) else {
                    stack.push(namespace.clone());
                    continue;
                };
                match expr::parse(cond) {
                    Ok(parsed) => {
                        let mut idents = Vec::new();
                        expr::free_idents(&parsed, &mut idents);
                        for ident in &idents {
                            if namespace.lookup(ident).is_none() {
                                sink.push(CompileDiagnostic::new(
                                    ErrorKind::UndefinedParameter,
                                    format!("undefined reference {ident:?} in for-loop list expression"),
                                    tok.span.start,
                                ));
                            }
                        }
                        let element_ty = resolve_type(&parsed, namespace).and_then(|ty| match ty {
                            ParamType::List(elem) => Some(*elem),
                            _ => None,
                        });
                        match element_ty {
                            Some(elem) => {
                                stack.push(namespace.child(var.to_string(), elem));
                            }
                            None => {
                                sink.push(CompileDiagnostic::new(
                                    ErrorKind::ForLoopListTypeError,
                                    format!("expression {cond:?} does not resolve to a list type"),
                                    tok.span.start,
                                ));
                                stack.push(namespace.child(var.to_string(), ParamType::Str));
                            }
                        }
                    }
                    Err(e) => sink.push(CompileDiagnostic::new(
                        ErrorKind::ExpressionTypeError,
                        format!("{e}"),
                        tok.span.start,
                    )),
                }
            }
            DirectiveKind::End => {
                if let Some(DirectiveKind::For) = nest_stack.pop() {
                    stack.pop();
                }
            }
            DirectiveKind::SystemValue => {}
        }
    }

    if sink.is_empty() {
        Ok(())
    } else {
        Err(CompileError::new(sink))
    }
}

fn check_expr(text: &str, namespace: &Namespace, tok: &Token, sink: &mut Vec<CompileDiagnostic>) {
    match expr::parse(text) {
        Ok(parsed) => {
            let mut idents = Vec::new();
            expr::free_idents(&parsed, &mut idents);
            for ident in &idents {
                if namespace.lookup(ident).is_none() {
                    sink.push(CompileDiagnostic::new(
                        ErrorKind::UndefinedParameter,
                        format!("undefined reference {ident:?}"),
                        tok.span.start,
                    ));
                }
            }
        }
        Err(e) => sink.push(CompileDiagnostic::new(
            ErrorKind::ExpressionTypeError,
            format!("{e}"),
            tok.span.start,
        )),
    }
}

/// A best-effort static type resolver: only identifier/field chains have
/// a statically known type in this namespace model, which is exactly the
/// shape a `for var in list_expr` binding needs.
fn resolve_type(expr: &Expr, namespace: &Namespace) -> Option<ParamType> {
    match expr {
        Expr::Ident(name) => namespace.lookup(name).cloned(),
        Expr::Field(base, name) => {
            let base_ty = resolve_type(base, namespace)?;
            base_ty.field(name).cloned()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    #[test]
    fn undefined_parameter_reported() {
        let tokens = tokenize("SELECT id FROM t /*# if missing != null */WHERE x = 1/*# end */").unwrap();
        let schema = FunctionDefinition::new();
        let constants = Constants::default();
        let err = run(&tokens, &schema, &constants).unwrap_err();
        assert!(err.diagnostics.iter().any(|d| d.kind == ErrorKind::UndefinedParameter));
    }

    #[test]
    fn defined_parameter_passes() {
        let tokens = tokenize("SELECT id FROM t /*# if active != null */WHERE x = 1/*# end */").unwrap();
        let schema = FunctionDefinition::new().with_parameter("active", ParamType::Bool);
        let constants = Constants::default();
        assert!(run(&tokens, &schema, &constants).is_ok());
    }

    #[test]
    fn for_loop_binds_element_type() {
        let tokens = tokenize("SELECT /*# for f in fields */ /*$ f */x,/*# end */ 1 FROM t").unwrap();
        let schema = FunctionDefinition::new()
            .with_parameter("fields", ParamType::List(Box::new(ParamType::Str)));
        let constants = Constants::default();
        assert!(run(&tokens, &schema, &constants).is_ok());
    }
}
