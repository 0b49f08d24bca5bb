//! Parserstep3: clause legality (spec.md §4.4).
//!
//! Duplicate clause detection, required-clause presence, clause
//! ordering, and subquery placement legality. This stage never rewrites
//! the clause list — it only validates it; clause slots are already
//! correctly typed by Parserstep2.

use snapsql_token::{Punctuation, TokenKind};

use crate::ast::{Clause, ClauseKind, Statement, StatementKind};
use crate::errors::{CompileDiagnostic, CompileError, ErrorKind};
use snapsql_token::Token;

fn required_clauses(kind: StatementKind) -> &'static [ClauseKind] {
    match kind {
        StatementKind::Select => &[ClauseKind::Select, ClauseKind::From],
        // INSERT-VALUES vs INSERT-SELECT both require InsertInto; the
        // VALUES/SELECT-FROM alternative is checked separately below.
        StatementKind::InsertInto => &[ClauseKind::InsertInto],
        StatementKind::Update => &[ClauseKind::Update, ClauseKind::Set],
        StatementKind::DeleteFrom => &[ClauseKind::DeleteFrom],
    }
}

fn clause_order(kind: StatementKind) -> &'static [ClauseKind] {
    match kind {
        StatementKind::Select => &[
            ClauseKind::Select,
            ClauseKind::From,
            ClauseKind::Where,
            ClauseKind::GroupBy,
            ClauseKind::Having,
            ClauseKind::OrderBy,
            ClauseKind::Limit,
            ClauseKind::Offset,
            ClauseKind::ForLock,
            ClauseKind::Returning,
        ],
        StatementKind::InsertInto => &[
            ClauseKind::InsertInto,
            ClauseKind::Select,
            ClauseKind::From,
            ClauseKind::Where,
            ClauseKind::Values,
            ClauseKind::OnConflict,
            ClauseKind::Returning,
        ],
        StatementKind::Update => &[
            ClauseKind::Update,
            ClauseKind::Set,
            ClauseKind::Where,
            ClauseKind::Returning,
        ],
        StatementKind::DeleteFrom => &[ClauseKind::DeleteFrom, ClauseKind::Where, ClauseKind::Returning],
    }
}

const SUBQUERY_ALLOWED: &[ClauseKind] = &[
    ClauseKind::With,
    ClauseKind::Select,
    ClauseKind::From,
    ClauseKind::Where,
    ClauseKind::Having,
    ClauseKind::Set,
];

pub fn run(statement: &Statement, tokens: &[Token]) -> Result<(), CompileError> {
    let mut sink = Vec::new();
    check_duplicates(statement, tokens, &mut sink);
    check_required(statement, tokens, &mut sink);
    check_order(statement, tokens, &mut sink);
    check_subquery_locations(statement, tokens, &mut sink);
    if sink.is_empty() {
        Ok(())
    } else {
        Err(CompileError::new(sink))
    }
}

fn check_duplicates(statement: &Statement, tokens: &[Token], sink: &mut Vec<CompileDiagnostic>) {
    let mut seen = std::collections::HashSet::new();
    for clause in &statement.clauses {
        if !seen.insert(clause.kind) {
            sink.push(CompileDiagnostic::new(
                ErrorKind::DuplicateClause,
                format!("duplicate {} clause", clause.kind.keyword_text()),
                clause_pos(clause, tokens),
            ));
        }
    }
}

fn check_required(statement: &Statement, tokens: &[Token], sink: &mut Vec<CompileDiagnostic>) {
    let fallback = statement
        .clauses
        .first()
        .map(|c| clause_pos(c, tokens))
        .unwrap_or_default();
    for &required in required_clauses(statement.kind) {
        if statement.clause(required).is_none() {
            sink.push(CompileDiagnostic::new(
                ErrorKind::RequiredClauseMissing,
                format!("missing required {} clause", required.keyword_text()),
                fallback,
            ));
        }
    }
    if statement.kind == StatementKind::InsertInto {
        let has_values = statement.clause(ClauseKind::Values).is_some();
        let has_select = statement.clause(ClauseKind::Select).is_some()
            && statement.clause(ClauseKind::From).is_some();
        if !has_values && !has_select {
            sink.push(CompileDiagnostic::new(
                ErrorKind::RequiredClauseMissing,
                "INSERT INTO requires either VALUES or SELECT ... FROM",
                fallback,
            ));
        }
    }
}

fn check_order(statement: &Statement, tokens: &[Token], sink: &mut Vec<CompileDiagnostic>) {
    let order = clause_order(statement.kind);
    let mut last_rank: Option<usize> = None;
    for clause in &statement.clauses {
        let Some(rank) = order.iter().position(|k| *k == clause.kind) else {
            continue;
        };
        if let Some(last) = last_rank {
            if rank < last {
                let earliest_later = order
                    .get(last + 1)
                    .copied()
                    .unwrap_or(clause.kind);
                sink.push(CompileDiagnostic::new(
                    ErrorKind::ClauseOrderViolation,
                    format!(
                        "Please move {} before {}",
                        clause.kind.keyword_text(),
                        earliest_later.keyword_text()
                    ),
                    clause_pos(clause, tokens),
                ));
                continue;
            }
        }
        last_rank = Some(rank);
    }
}

fn check_subquery_locations(statement: &Statement, tokens: &[Token], sink: &mut Vec<CompileDiagnostic>) {
    for clause in &statement.clauses {
        if SUBQUERY_ALLOWED.contains(&clause.kind) {
            continue;
        }
        if clause_body_has_select(clause, tokens) {
            sink.push(CompileDiagnostic::new(
                ErrorKind::SubqueryNotAllowed,
                format!("subquery is not permitted in {}", clause.kind.keyword_text()),
                clause_pos(clause, tokens),
            ));
        }
    }
}

fn clause_body_has_select(clause: &Clause, tokens: &[Token]) -> bool {
    let mut depth = 0i32;
    for tok in &tokens[clause.body.clone()] {
        match &tok.kind {
            TokenKind::Punctuation(Punctuation::LParen) => depth += 1,
            TokenKind::Punctuation(Punctuation::RParen) => depth -= 1,
            TokenKind::Keyword(snapsql_token::Keyword::Select) if depth > 0 => return true,
            _ => {}
        }
    }
    false
}

fn clause_pos(clause: &Clause, tokens: &[Token]) -> snapsql_token::Position {
    tokens
        .get(clause.heading.start)
        .map(|t| t.span.start)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::stage2;
    use crate::tokenizer::tokenize;

    #[test]
    fn missing_from_fails() {
        let tokens = tokenize("SELECT id").unwrap();
        let statement = stage2::run(&tokens).unwrap();
        let err = run(&statement, &tokens).unwrap_err();
        assert!(err
            .diagnostics
            .iter()
            .any(|d| d.kind == ErrorKind::RequiredClauseMissing));
    }

    #[test]
    fn well_formed_select_passes() {
        let tokens = tokenize("SELECT id FROM users WHERE id = 1").unwrap();
        let statement = stage2::run(&tokens).unwrap();
        assert!(run(&statement, &tokens).is_ok());
    }

    #[test]
    fn out_of_order_clause_fails() {
        let tokens = tokenize("SELECT id FROM users LIMIT 1 WHERE id = 1").unwrap();
        let statement = stage2::run(&tokens).unwrap();
        let err = run(&statement, &tokens).unwrap_err();
        assert!(err
            .diagnostics
            .iter()
            .any(|d| d.kind == ErrorKind::ClauseOrderViolation));
    }
}
