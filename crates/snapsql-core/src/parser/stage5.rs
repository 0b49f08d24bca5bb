//! Parserstep5: dummy-range detection and implicit conditionals
//! (spec.md §4.6).
//!
//! Two independent passes over the already-finalized statement:
//!   1. every `/*= expr */` variable directive immediately followed by a
//!      dummy literal gets that literal's token range recorded so the
//!      renderer knows what to replace with a placeholder;
//!   2. a bare `LIMIT`/`OFFSET` clause whose value is an unconditioned
//!      `/*= expr */` gets an implicit `expr != null` guard synthesized
//!      around it.

use snapsql_token::{DirectiveKind, Token, TokenKind};

use crate::ast::{ClauseKind, Statement};

/// A dummy literal's token range, keyed by the directive token's index.
#[derive(Debug, Clone, Default)]
pub struct DummyRanges {
    pub by_directive_token: std::collections::HashMap<usize, std::ops::Range<usize>>,
}

pub fn run(statement: &mut Statement, tokens: &[Token]) -> DummyRanges {
    let mut dummies = DummyRanges::default();
    detect_dummy_ranges(tokens, &mut dummies);
    synthesize_implicit_guards(statement, tokens);
    dummies
}

fn detect_dummy_ranges(tokens: &[Token], dummies: &mut DummyRanges) {
    let mut i = 0;
    while i < tokens.len() {
        let is_value_directive = tokens[i].directive.as_ref().is_some_and(|d| {
            matches!(d.kind, DirectiveKind::Variable | DirectiveKind::Const)
        });
        if is_value_directive {
            if let Some(next) = (i + 1..tokens.len()).find(|&j| !tokens[j].is_trivia()) {
                if is_dummy_literal_token(&tokens[next].kind) {
                    dummies.by_directive_token.insert(i, next..next + 1);
                }
            }
        }
        i += 1;
    }
}

/// A dummy placeholder can be any literal the author wrote to keep the
/// raw template valid SQL, including a bare identifier standing in for a
/// column name (spec.md §8 scenario 2's `/*$ f */col`).
fn is_dummy_literal_token(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Number | TokenKind::String | TokenKind::Boolean | TokenKind::Null | TokenKind::Identifier
    )
}

/// Clauses whose body is a single bare `/*= expr */dummy` with no
/// author-written guard get `expr != null` synthesized around them.
fn synthesize_implicit_guards(statement: &mut Statement, tokens: &[Token]) {
    for clause in statement.clauses.iter_mut() {
        if !matches!(clause.kind, ClauseKind::Limit | ClauseKind::Offset) {
            continue;
        }
        if clause.if_condition.is_some() {
            continue;
        }
        let directive = clause
            .body
            .clone()
            .find(|&i| {
                tokens[i]
                    .directive
                    .as_ref()
                    .is_some_and(|d| d.kind == DirectiveKind::Variable)
            });
        let Some(idx) = directive else { continue };
        let Some(expr_text) = tokens[idx].directive.as_ref().and_then(|d| d.condition.clone()) else {
            continue;
        };
        clause.if_condition = Some(format!("{expr_text} != null"));
        clause.implicit_guard = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{stage2, stage3, stage4};
    use crate::tokenizer::tokenize;

    #[test]
    fn implicit_limit_guard_synthesized() {
        let tokens = tokenize("SELECT id FROM t LIMIT /*= limit */10").unwrap();
        let statement = stage2::run(&tokens).unwrap();
        stage3::run(&statement, &tokens).unwrap();
        let mut statement = stage4::run(statement, &tokens).unwrap();
        run(&mut statement, &tokens);
        let clause = statement.clause(ClauseKind::Limit).unwrap();
        assert!(clause.implicit_guard);
        assert_eq!(clause.if_condition.as_deref(), Some("limit != null"));
    }

    #[test]
    fn dummy_literal_detected() {
        let tokens = tokenize("SELECT id FROM t WHERE active = /*= active */true").unwrap();
        let mut dummies = DummyRanges::default();
        detect_dummy_ranges(&tokens, &mut dummies);
        assert_eq!(dummies.by_directive_token.len(), 1);
    }
}
