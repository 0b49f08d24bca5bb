//! Parserstep2: statement framing (spec.md §4.3).
//!
//! Identifies the optional `WITH [RECURSIVE] cte AS (...)` prefix, the
//! top-level statement kind, and partitions the remaining tokens into
//! contiguous clause segments. Conditional-clause extraction (stripping a
//! trailing `/*# if */` / `/*# end */` pair around WHERE/ORDER BY/LIMIT/
//! OFFSET) happens last, once segment boundaries are known.

use snapsql_token::{DirectiveKind, Keyword, Punctuation, Token, TokenKind};

use crate::ast::{Clause, ClauseKind, CteDefinition, Statement, StatementKind};
use crate::errors::{CompileDiagnostic, CompileError, ErrorKind};

/// Indices (into `tokens`) of tokens that are neither whitespace nor
/// comments — the only tokens clause-head keyword matching looks at.
fn significant(tokens: &[Token]) -> Vec<usize> {
    tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.is_trivia())
        .map(|(i, _)| i)
        .collect()
}

fn keyword_at(tokens: &[Token], idx: usize, kw: Keyword) -> bool {
    matches!(tokens.get(idx), Some(t) if t.kind == TokenKind::Keyword(kw))
}

/// Attempts to match `pattern` (a run of keywords) starting at position
/// `pos` within `sig` (indices into `tokens`). Returns the raw token
/// index one past the end of the match.
fn match_keywords(tokens: &[Token], sig: &[usize], pos: usize, pattern: &[Keyword]) -> Option<usize> {
    if pos + pattern.len() > sig.len() {
        return None;
    }
    for (offset, kw) in pattern.iter().enumerate() {
        if !keyword_at(tokens, sig[pos + offset], *kw) {
            return None;
        }
    }
    Some(sig[pos + pattern.len() - 1] + 1)
}

const SELECT_CLAUSES: &[(ClauseKind, &[Keyword])] = &[
    (ClauseKind::From, &[Keyword::From]),
    (ClauseKind::Where, &[Keyword::Where]),
    (ClauseKind::GroupBy, &[Keyword::Group, Keyword::By]),
    (ClauseKind::Having, &[Keyword::Having]),
    (ClauseKind::OrderBy, &[Keyword::Order, Keyword::By]),
    (ClauseKind::Limit, &[Keyword::Limit]),
    (ClauseKind::Offset, &[Keyword::Offset]),
    (ClauseKind::ForLock, &[Keyword::For]),
    (ClauseKind::Returning, &[Keyword::Returning]),
];

const INSERT_CLAUSES: &[(ClauseKind, &[Keyword])] = &[
    (ClauseKind::Select, &[Keyword::Select]),
    (ClauseKind::From, &[Keyword::From]),
    (ClauseKind::Where, &[Keyword::Where]),
    (ClauseKind::Values, &[Keyword::Values]),
    (ClauseKind::OnConflict, &[Keyword::On, Keyword::Conflict]),
    (ClauseKind::Returning, &[Keyword::Returning]),
];

const UPDATE_CLAUSES: &[(ClauseKind, &[Keyword])] = &[
    (ClauseKind::Set, &[Keyword::Set]),
    (ClauseKind::Where, &[Keyword::Where]),
    (ClauseKind::Returning, &[Keyword::Returning]),
];

const DELETE_CLAUSES: &[(ClauseKind, &[Keyword])] = &[
    (ClauseKind::Where, &[Keyword::Where]),
    (ClauseKind::Returning, &[Keyword::Returning]),
];

pub fn run(tokens: &[Token]) -> Result<Statement, CompileError> {
    let sig = significant(tokens);
    if sig.is_empty() {
        return Err(CompileError::single(CompileDiagnostic::new(
            ErrorKind::RequiredClauseMissing,
            "template contains no SQL statement",
            snapsql_token::Position {
                line: 1,
                column: 1,
                offset: 0,
            },
        )));
    }

    let mut pos = 0;
    let (ctes, after_with) = parse_with_prefix(tokens, &sig, pos)?;
    pos = after_with;

    let (kind, heading_len) = detect_statement_kind(tokens, &sig, pos)?;
    let body_start = sig[pos + heading_len - 1] + 1;
    pos += heading_len;

    let clause_table: &[(ClauseKind, &[Keyword])] = match kind {
        StatementKind::Select => SELECT_CLAUSES,
        StatementKind::InsertInto => INSERT_CLAUSES,
        StatementKind::Update => UPDATE_CLAUSES,
        StatementKind::DeleteFrom => DELETE_CLAUSES,
    };

    // The leading clause (SELECT list / INSERT INTO target / UPDATE target
    // / DELETE FROM target) owns everything up to the first recognized
    // clause head.
    let leading_kind = match kind {
        StatementKind::Select => ClauseKind::Select,
        StatementKind::InsertInto => ClauseKind::InsertInto,
        StatementKind::Update => ClauseKind::Update,
        StatementKind::DeleteFrom => ClauseKind::DeleteFrom,
    };

    let mut boundaries: Vec<(usize, ClauseKind, usize)> = Vec::new(); // (heading_start, kind, heading_end)
    boundaries.push((
        sig[pos.saturating_sub(heading_len)],
        leading_kind,
        body_start,
    ));

    let mut cursor = pos;
    let mut depth = 0i32;
    while cursor < sig.len() {
        let idx = sig[cursor];
        match &tokens[idx].kind {
            TokenKind::Punctuation(Punctuation::LParen) => depth += 1,
            TokenKind::Punctuation(Punctuation::RParen) => depth -= 1,
            _ => {}
        }
        if depth == 0 {
            if let Some(&(kind2, pattern)) = clause_table
                .iter()
                .find(|(_, pattern)| match_keywords(tokens, &sig, cursor, pattern).is_some())
            {
                let heading_start = idx;
                let heading_end = match_keywords(tokens, &sig, cursor, pattern).unwrap();
                boundaries.push((heading_start, kind2, heading_end));
                cursor += pattern.len();
                continue;
            }
        }
        cursor += 1;
    }

    let end_of_tokens = tokens
        .iter()
        .rposition(|t| !matches!(t.kind, TokenKind::EndOfFile))
        .map(|i| i + 1)
        .unwrap_or(tokens.len());

    let mut clauses = Vec::with_capacity(boundaries.len());
    for (i, (heading_start, kind2, heading_end)) in boundaries.iter().enumerate() {
        let body_end = boundaries
            .get(i + 1)
            .map(|(next_start, _, _)| *next_start)
            .unwrap_or(end_of_tokens);
        clauses.push(Clause::new(*kind2, *heading_start..*heading_end, *heading_end..body_end));
    }

    extract_conditional_clauses(tokens, &mut clauses);

    Ok(Statement { kind, ctes, clauses })
}

fn parse_with_prefix(
    tokens: &[Token],
    sig: &[usize],
    mut pos: usize,
) -> Result<(Vec<CteDefinition>, usize), CompileError> {
    if !keyword_at(tokens, sig[pos], Keyword::With) {
        return Ok((Vec::new(), pos));
    }
    pos += 1;
    if pos < sig.len() && keyword_at(tokens, sig[pos], Keyword::Recursive) {
        pos += 1;
    }
    let mut ctes = Vec::new();
    loop {
        let name_idx = sig.get(pos).copied().ok_or_else(|| unterminated_with(tokens))?;
        let name = tokens[name_idx].raw().to_string();
        pos += 1;
        let mut recursive = false;
        if pos < sig.len() && keyword_at(tokens, sig[pos], Keyword::Recursive) {
            recursive = true;
            pos += 1;
        }
        let mut columns = Vec::new();
        if pos < sig.len()
            && matches!(
                tokens[sig[pos]].kind,
                TokenKind::Punctuation(Punctuation::LParen)
            )
        {
            // Bare column-list form `cte(a, b) AS (...)`. Distinguished
            // from the subquery paren by checking the token after the
            // closing paren is AS.
            let save = pos;
            pos += 1;
            let mut names = Vec::new();
            while pos < sig.len()
                && !matches!(
                    tokens[sig[pos]].kind,
                    TokenKind::Punctuation(Punctuation::RParen)
                )
            {
                if !matches!(
                    tokens[sig[pos]].kind,
                    TokenKind::Punctuation(Punctuation::Comma)
                ) {
                    names.push(tokens[sig[pos]].raw().to_string());
                }
                pos += 1;
            }
            if pos < sig.len() && pos + 1 < sig.len() && keyword_at(tokens, sig[pos + 1], Keyword::As) {
                pos += 1; // consume RParen
                columns = names;
            } else {
                pos = save;
            }
        }
        if pos >= sig.len() || !keyword_at(tokens, sig[pos], Keyword::As) {
            return Err(unterminated_with(tokens));
        }
        pos += 1;
        if pos >= sig.len()
            || !matches!(
                tokens[sig[pos]].kind,
                TokenKind::Punctuation(Punctuation::LParen)
            )
        {
            return Err(unterminated_with(tokens));
        }
        let open = sig[pos];
        let body_start = open + 1;
        pos += 1;
        let mut depth = 1i32;
        while pos < sig.len() && depth > 0 {
            match &tokens[sig[pos]].kind {
                TokenKind::Punctuation(Punctuation::LParen) => depth += 1,
                TokenKind::Punctuation(Punctuation::RParen) => depth -= 1,
                _ => {}
            }
            pos += 1;
        }
        if depth != 0 {
            return Err(CompileError::single(CompileDiagnostic::new(
                ErrorKind::UnmatchedParen,
                "unterminated CTE subquery",
                tokens[open].span.start,
            )));
        }
        let body_end = sig[pos - 1];
        ctes.push(CteDefinition {
            name,
            recursive,
            columns,
            body: body_start..body_end,
        });
        if pos < sig.len()
            && matches!(
                tokens[sig[pos]].kind,
                TokenKind::Punctuation(Punctuation::Comma)
            )
        {
            pos += 1;
            continue;
        }
        break;
    }
    Ok((ctes, pos))
}

fn unterminated_with(tokens: &[Token]) -> CompileError {
    CompileError::single(CompileDiagnostic::new(
        ErrorKind::UnmatchedParen,
        "malformed WITH prefix",
        tokens.first().map(|t| t.span.start).unwrap_or_default(),
    ))
}

fn detect_statement_kind(
    tokens: &[Token],
    sig: &[usize],
    pos: usize,
) -> Result<(StatementKind, usize), CompileError> {
    if pos < sig.len() && keyword_at(tokens, sig[pos], Keyword::Select) {
        return Ok((StatementKind::Select, 1));
    }
    if match_keywords(tokens, sig, pos, &[Keyword::Insert, Keyword::Into]).is_some() {
        return Ok((StatementKind::InsertInto, 2));
    }
    if pos < sig.len() && keyword_at(tokens, sig[pos], Keyword::Update) {
        return Ok((StatementKind::Update, 1));
    }
    if match_keywords(tokens, sig, pos, &[Keyword::Delete, Keyword::From]).is_some() {
        return Ok((StatementKind::DeleteFrom, 2));
    }
    Err(CompileError::single(CompileDiagnostic::new(
        ErrorKind::RequiredClauseMissing,
        "expected SELECT, INSERT INTO, UPDATE, or DELETE FROM",
        tokens[sig[pos.min(sig.len() - 1)]].span.start,
    )))
}

/// Strips a trailing `/*# if expr */ ... /*# end */` pair surrounding a
/// WHERE/ORDER BY/LIMIT/OFFSET clause and records the condition text
/// (spec.md §4.3 "Conditional-clause extraction").
fn extract_conditional_clauses(tokens: &[Token], clauses: &mut [Clause]) {
    for clause in clauses.iter_mut() {
        if !clause.kind.is_conditionally_guardable() {
            continue;
        }
        let heading_start = clause.heading.start;
        if let Some(if_idx) = (0..heading_start).rev().find(|&i| !tokens[i].is_trivia()) {
            if let Some(payload) = tokens[if_idx].directive.as_ref() {
                if payload.kind == DirectiveKind::If {
                    if let Some(cond) = &payload.condition {
                        clause.if_condition = Some(cond.to_string());
                        clause.heading.start = if_idx;
                    }
                }
            }
        }
        if clause.if_condition.is_none() {
            continue;
        }
        if let Some(end_idx) = (clause.body.start..clause.body.end)
            .rev()
            .find(|&i| !tokens[i].is_trivia())
        {
            if let Some(payload) = tokens[end_idx].directive.as_ref() {
                if payload.kind == DirectiveKind::End {
                    clause.body.end = end_idx;
                }
            }
        }
    }
}
