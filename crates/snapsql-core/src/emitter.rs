//! The intermediate emitter (spec.md §4.8): walks the validated template
//! in source order and lowers it into an `IntermediateFormat`.
//!
//! Source-written conditional directives (`if`/`elseif`/`else`/`end`,
//! `for ... in ...`) are still present as ordinary tokens at this point —
//! Parserstep2 only *annotated* which clause they guard, it never removed
//! them from the token stream — so a single linear pass that dispatches
//! on `Token::directive_kind()` reproduces both free-standing directives
//! and clause guards uniformly. The one case with no real token to walk
//! is an *implicit* LIMIT/OFFSET guard (Parserstep5): for those this pass
//! synthesizes the `IF`/`END_IF` pair at the clause's boundary positions.

use std::collections::HashSet;

use snapsql_token::{DirectiveKind, Token, TokenKind};

use crate::ast::{ClauseContent, ClauseKind, Statement};
use crate::expr::{self, Expr};
use crate::ir::{Dialect, FieldOrigin, IntermediateFormat, IrBuilder, OpCode, ResponseField, TableReference, TableRole};
use crate::parser::DummyRanges;

enum OpenBlock {
    SourceIf,
    SourceFor,
    ImplicitGuard,
}

pub fn emit(
    statement: &Statement,
    tokens: &[Token],
    dummies: &DummyRanges,
    dialect: Dialect,
) -> IntermediateFormat {
    let mut builder = IrBuilder::default();
    let mut skip_until: Option<usize> = None;
    let mut open_blocks: Vec<OpenBlock> = Vec::new();

    // Implicit guards are keyed by the clause's body-end index so we know
    // exactly when to close them as we walk past it.
    let implicit_ends: std::collections::HashMap<usize, ()> = statement
        .clauses
        .iter()
        .filter(|c| c.implicit_guard)
        .map(|c| (c.body.end, ()))
        .collect();

    let mut i = 0;
    while i < tokens.len() {
        if let Some(until) = skip_until {
            if i < until {
                i += 1;
                continue;
            }
            skip_until = None;
        }

        if let Some(clause) = statement
            .clauses
            .iter()
            .find(|c| c.implicit_guard && c.heading.start == i)
        {
            let cond = clause.if_condition.clone().unwrap_or_default();
            let expr_idx = intern_or_null(&mut builder, &cond);
            builder.push(OpCode::If { expr_index: expr_idx });
            open_blocks.push(OpenBlock::ImplicitGuard);
        }

        let tok = &tokens[i];

        if let Some(payload) = tok.directive.as_ref() {
            match payload.kind {
                DirectiveKind::If => {
                    let cond = payload.condition.as_deref().unwrap_or("true");
                    let idx = intern_or_null(&mut builder, cond);
                    builder.push(OpCode::If { expr_index: idx });
                    open_blocks.push(OpenBlock::SourceIf);
                }
                DirectiveKind::ElseIf => {
                    let cond = payload.condition.as_deref().unwrap_or("true");
                    let idx = intern_or_null(&mut builder, cond);
                    builder.push(OpCode::ElseIf { expr_index: idx });
                }
                DirectiveKind::Else => builder.push(OpCode::Else),
                DirectiveKind::End => match open_blocks.pop() {
                    Some(OpenBlock::SourceFor) => builder.push(OpCode::LoopEnd),
                    _ => builder.push(OpCode::EndIf),
                },
                DirectiveKind::For => {
                    let cond = payload.condition.as_deref().unwrap_or("[]");
                    let idx = intern_or_null(&mut builder, cond);
                    let var = payload.loop_var.as_deref().unwrap_or("_").to_string();
                    builder.push(OpCode::LoopStart {
                        var,
                        list_expr_index: idx,
                    });
                    open_blocks.push(OpenBlock::SourceFor);
                }
                DirectiveKind::Variable => {
                    let cond = payload.condition.as_deref().unwrap_or("null");
                    let idx = intern_or_null(&mut builder, cond);
                    builder.push(OpCode::AddParam { expr_index: idx });
                    if let Some(range) = dummies.by_directive_token.get(&i) {
                        skip_until = Some(range.end);
                    }
                    builder.push(OpCode::Boundary);
                }
                DirectiveKind::Const => {
                    let cond = payload.condition.as_deref().unwrap_or("null");
                    let idx = intern_or_null(&mut builder, cond);
                    builder.push(OpCode::EmitEval { expr_index: idx });
                    if let Some(range) = dummies.by_directive_token.get(&i) {
                        skip_until = Some(range.end);
                    }
                }
                DirectiveKind::SystemValue => {
                    let field = payload.system_field.as_deref().unwrap_or("").to_string();
                    builder.push(OpCode::EmitSystemValue { field });
                }
            }
        } else if !matches!(tok.kind, TokenKind::EndOfFile) {
            if tok.is_whitespace() && next_significant_is_variable(tokens, i) {
                builder.push(OpCode::EmitUnlessBoundary {
                    value: tok.raw().to_string(),
                });
            } else {
                builder.push(OpCode::EmitStatic {
                    value: tok.raw().to_string(),
                });
            }
        }

        if implicit_ends.contains_key(&(i + 1)) {
            if let Some(OpenBlock::ImplicitGuard) = open_blocks.last() {
                open_blocks.pop();
                builder.push(OpCode::EndIf);
            }
        }

        i += 1;
    }

    populate_response_fields(statement, &mut builder);
    populate_table_references(statement, &mut builder);
    populate_parameter_refs(&mut builder);

    builder.finish(dialect)
}

fn intern_or_null(builder: &mut IrBuilder, text: &str) -> usize {
    match expr::parse(text) {
        Ok(parsed) => builder.intern_expr(text, parsed),
        Err(_) => builder.intern_expr(text, Expr::Null),
    }
}

fn next_significant_is_variable(tokens: &[Token], from: usize) -> bool {
    tokens[from..]
        .iter()
        .find(|t| !t.is_trivia())
        .and_then(|t| t.directive.as_ref())
        .is_some_and(|d| d.kind == DirectiveKind::Variable)
}

fn populate_response_fields(statement: &Statement, builder: &mut IrBuilder) {
    if let Some(clause) = statement.clause(ClauseKind::Select) {
        if let Some(ClauseContent::Select(select)) = &clause.content {
            for field in &select.fields {
                builder.response_fields.push(ResponseField {
                    name: field.alias.clone().unwrap_or_default(),
                    type_name: field.result_type.as_ref().map(|t| t.to_string()),
                    origin: FieldOrigin::Select,
                });
            }
        }
    }
    if let Some(clause) = statement.clause(ClauseKind::Returning) {
        if let Some(ClauseContent::Returning(returning)) = &clause.content {
            for field in &returning.fields {
                builder.response_fields.push(ResponseField {
                    name: field.alias.clone().unwrap_or_default(),
                    type_name: field.result_type.as_ref().map(|t| t.to_string()),
                    origin: FieldOrigin::Returning,
                });
            }
        }
    }
}

fn populate_table_references(statement: &Statement, builder: &mut IrBuilder) {
    if let Some(clause) = statement.clause(ClauseKind::From) {
        if let Some(ClauseContent::From(from)) = &clause.content {
            builder.table_references.push(TableReference {
                name: from.first.name.clone(),
                alias: from.first.alias.clone(),
                role: TableRole::From,
            });
            for join in &from.joins {
                builder.table_references.push(TableReference {
                    name: join.table.name.clone(),
                    alias: join.table.alias.clone(),
                    role: TableRole::Join,
                });
            }
        }
    }
    if let Some(clause) = statement.clause(ClauseKind::Update) {
        if let Some(ClauseContent::Update(update)) = &clause.content {
            builder.table_references.push(TableReference {
                name: update.table.name.clone(),
                alias: update.table.alias.clone(),
                role: TableRole::Update,
            });
        }
    }
    if let Some(clause) = statement.clause(ClauseKind::InsertInto) {
        if let Some(ClauseContent::InsertInto(insert)) = &clause.content {
            builder.table_references.push(TableReference {
                name: insert.table.name.clone(),
                alias: insert.table.alias.clone(),
                role: TableRole::InsertInto,
            });
        }
    }
    if let Some(clause) = statement.clause(ClauseKind::DeleteFrom) {
        if let Some(ClauseContent::DeleteFrom(delete)) = &clause.content {
            builder.table_references.push(TableReference {
                name: delete.table.name.clone(),
                alias: delete.table.alias.clone(),
                role: TableRole::DeleteFrom,
            });
        }
    }
}

fn populate_parameter_refs(builder: &mut IrBuilder) {
    let mut seen = HashSet::new();
    for cel in &builder.cel_expressions {
        if let Some(ast) = &cel.ast {
            let mut idents = Vec::new();
            expr::free_idents(ast, &mut idents);
            for ident in idents {
                seen.insert(ident);
            }
        }
    }
    builder.parameter_refs = seen.into_iter().collect();
    builder.parameter_refs.sort();
}
