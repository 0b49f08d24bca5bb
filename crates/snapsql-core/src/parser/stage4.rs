//! Parserstep4: clause finalization (spec.md §4.5).
//!
//! Parses each clause body into typed structured content and rejects
//! SnapSQL-forbidden constructs. Operates purely on token slices; no
//! whitespace/comment token is ever discarded from a clause's range, only
//! skipped over while looking for significant content.

use snapsql_token::{Keyword, Operator, Punctuation, Token, TokenKind};

use crate::ast::*;
use crate::errors::{CompileDiagnostic, CompileError, ErrorKind};

pub fn run(mut statement: Statement, tokens: &[Token]) -> Result<Statement, CompileError> {
    let mut sink = Vec::new();
    for clause in statement.clauses.iter_mut() {
        let result = match clause.kind {
            ClauseKind::Select => finalize_select(clause, tokens),
            ClauseKind::From => finalize_from(clause, tokens),
            ClauseKind::Where => finalize_nonempty(clause, tokens, |r| ClauseContent::Where(WhereClauseContent { expr: r })),
            ClauseKind::Having => finalize_nonempty(clause, tokens, |r| ClauseContent::Having(HavingClauseContent { expr: r })),
            ClauseKind::Returning => finalize_returning(clause, tokens),
            ClauseKind::ForLock => finalize_for_lock(clause, tokens),
            ClauseKind::GroupBy => finalize_group_by(clause, tokens),
            ClauseKind::OrderBy => finalize_order_by(clause, tokens),
            ClauseKind::Limit => finalize_limit(clause, tokens),
            ClauseKind::Offset => finalize_offset(clause, tokens),
            ClauseKind::InsertInto => finalize_insert_into(clause, tokens),
            ClauseKind::Values => finalize_values(clause, tokens),
            ClauseKind::OnConflict => finalize_on_conflict(clause, tokens),
            ClauseKind::Update => finalize_update(clause, tokens),
            ClauseKind::Set => finalize_set(clause, tokens),
            ClauseKind::DeleteFrom => finalize_delete_from(clause, tokens),
            ClauseKind::With => Ok(()),
        };
        if let Err(mut diags) = result {
            sink.append(&mut diags.diagnostics);
        }
    }
    if statement.clause(ClauseKind::Having).is_some() && statement.clause(ClauseKind::GroupBy).is_none() {
        let pos = statement
            .clause(ClauseKind::Having)
            .map(|c| pos_of(tokens, c.heading.start))
            .unwrap_or_default();
        sink.push(CompileDiagnostic::new(
            ErrorKind::HavingWithoutGroupBy,
            "HAVING requires a GROUP BY clause",
            pos,
        ));
    }
    if statement.clause(ClauseKind::Offset).is_some() && statement.clause(ClauseKind::Limit).is_none() {
        let pos = statement
            .clause(ClauseKind::Offset)
            .map(|c| pos_of(tokens, c.heading.start))
            .unwrap_or_default();
        sink.push(CompileDiagnostic::new(
            ErrorKind::OffsetWithoutLimit,
            "OFFSET requires a LIMIT clause",
            pos,
        ));
    }

    if sink.is_empty() {
        Ok(statement)
    } else {
        Err(CompileError::new(sink))
    }
}

fn significant_in(tokens: &[Token], range: TokenRange) -> Vec<usize> {
    range.filter(|&i| !tokens[i].is_trivia()).collect()
}

fn pos_of(tokens: &[Token], idx: usize) -> snapsql_token::Position {
    tokens.get(idx).map(|t| t.span.start).unwrap_or_default()
}

/// Splits `sig` (indices into `tokens`) at top-level (paren-depth 0)
/// commas, returning the sub-slices between separators.
fn split_top_level_commas(tokens: &[Token], sig: &[usize]) -> Vec<Vec<usize>> {
    let mut groups = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0i32;
    for &idx in sig {
        match &tokens[idx].kind {
            TokenKind::Punctuation(Punctuation::LParen) => {
                depth += 1;
                current.push(idx);
            }
            TokenKind::Punctuation(Punctuation::RParen) => {
                depth -= 1;
                current.push(idx);
            }
            TokenKind::Punctuation(Punctuation::Comma) if depth == 0 => {
                groups.push(std::mem::take(&mut current));
            }
            _ => current.push(idx),
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

fn is_keyword(tokens: &[Token], idx: usize, kw: Keyword) -> bool {
    matches!(tokens[idx].kind, TokenKind::Keyword(k) if k == kw)
}

fn finalize_nonempty(
    clause: &mut Clause,
    tokens: &[Token],
    wrap: impl FnOnce(TokenRange) -> ClauseContent,
) -> Result<(), CompileError> {
    let sig = significant_in(tokens, clause.body.clone());
    if sig.is_empty() {
        return Err(CompileError::single(CompileDiagnostic::new(
            ErrorKind::RequiredClauseMissing,
            format!("{} clause has no content", clause.kind.keyword_text()),
            pos_of(tokens, clause.heading.start),
        )));
    }
    clause.content = Some(wrap(sig[0]..*sig.last().unwrap() + 1));
    Ok(())
}

fn is_standalone_literal(tokens: &[Token], sig: &[usize]) -> bool {
    let words: Vec<&TokenKind> = sig.iter().map(|&i| &tokens[i].kind).collect();
    match words.as_slice() {
        [TokenKind::Number | TokenKind::String | TokenKind::Boolean] => true,
        [TokenKind::Keyword(Keyword::Not), TokenKind::Keyword(Keyword::Null)] => true,
        [TokenKind::Operator(Operator::Plus | Operator::Minus), TokenKind::Number] => true,
        [TokenKind::Keyword(k)] if matches!(k, Keyword::Not) => false,
        _ => false,
    }
}

fn finalize_select(clause: &mut Clause, tokens: &[Token]) -> Result<(), CompileError> {
    let mut sig = significant_in(tokens, clause.body.clone());
    let mut distinct = false;
    let mut distinct_on_tokens = Vec::new();
    let mut cursor = 0;
    if cursor < sig.len() && is_keyword(tokens, sig[cursor], Keyword::Distinct) {
        distinct = true;
        cursor += 1;
        if cursor < sig.len() && is_keyword(tokens, sig[cursor], Keyword::On) {
            cursor += 1;
            if cursor < sig.len()
                && matches!(tokens[sig[cursor]].kind, TokenKind::Punctuation(Punctuation::LParen))
            {
                cursor += 1;
                while cursor < sig.len()
                    && !matches!(tokens[sig[cursor]].kind, TokenKind::Punctuation(Punctuation::RParen))
                {
                    if !matches!(tokens[sig[cursor]].kind, TokenKind::Punctuation(Punctuation::Comma)) {
                        distinct_on_tokens.push(sig[cursor]);
                    }
                    cursor += 1;
                }
                cursor += 1;
            }
        }
    } else if cursor < sig.len() && is_keyword(tokens, sig[cursor], Keyword::All) {
        cursor += 1;
    }
    sig.drain(0..cursor);

    let mut sink = Vec::new();
    let mut fields = Vec::new();
    for group in split_top_level_commas(tokens, &sig) {
        if group.is_empty() {
            continue;
        }
        if is_keyword(tokens, group[0], Keyword::Not)
            || matches!(
                tokens[group[0]].kind,
                TokenKind::Number | TokenKind::String | TokenKind::Boolean
            )
        {
            if is_standalone_literal(tokens, &group) {
                sink.push(CompileDiagnostic::new(
                    ErrorKind::LiteralInSelect,
                    "select item may not be a bare literal",
                    pos_of(tokens, group[0]),
                ));
                continue;
            }
        }
        if group.len() == 1 {
            if let TokenKind::Operator(Operator::Star) = tokens[group[0]].kind {
                sink.push(CompileDiagnostic::new(
                    ErrorKind::AsteriskInSelect,
                    "bare * is not permitted in a select list",
                    pos_of(tokens, group[0]),
                ));
                continue;
            }
        }
        if group.len() == 3 {
            if let (TokenKind::Operator(Operator::Dot), TokenKind::Operator(Operator::Star)) =
                (&tokens[group[1]].kind, &tokens[group[2]].kind)
            {
                sink.push(CompileDiagnostic::new(
                    ErrorKind::AsteriskInSelect,
                    "table-qualified * is not permitted in a select list",
                    pos_of(tokens, group[0]),
                ));
                continue;
            }
        }

        let mut alias = None;
        let mut end = group.len();
        if end >= 2 && is_keyword(tokens, group[end - 2], Keyword::As) {
            alias = Some(tokens[group[end - 1]].raw().to_string());
            end -= 2;
        } else if end >= 1 && matches!(tokens[group[end - 1]].kind, TokenKind::Identifier) && end >= 2 {
            alias = Some(tokens[group[end - 1]].raw().to_string());
            end -= 1;
        }
        let field_tokens = &group[..end.max(1)];
        let kind = classify_field(tokens, field_tokens);
        fields.push(SelectField {
            kind,
            tokens: field_tokens[0]..*field_tokens.last().unwrap() + 1,
            result_type: None,
            alias,
        });
    }
    for &idx in &distinct_on_tokens {
        let entry = tokens[idx].raw();
        if fields.iter().any(|f| f.alias.as_deref() == Some(entry)) {
            sink.push(CompileDiagnostic::new(
                ErrorKind::DistinctAliasDisallowed,
                "DISTINCT ON entry must be a column name, not an alias",
                pos_of(tokens, idx),
            ));
        }
    }
    if !sink.is_empty() {
        return Err(CompileError::new(sink));
    }
    let distinct_on = distinct_on_tokens.iter().map(|&idx| tokens[idx].raw().to_string()).collect();
    clause.content = Some(ClauseContent::Select(SelectClauseContent {
        distinct,
        distinct_on,
        fields,
    }));
    Ok(())
}

fn classify_field(tokens: &[Token], group: &[usize]) -> FieldKind {
    if group.len() == 1 {
        return FieldKind::Single;
    }
    if group.len() == 3 && matches!(tokens[group[1]].kind, TokenKind::Operator(Operator::Dot)) {
        return FieldKind::TableQualified;
    }
    if matches!(tokens[group[1]].kind, TokenKind::Punctuation(Punctuation::LParen)) {
        return FieldKind::Function;
    }
    FieldKind::ComplexExpression
}

fn parse_table_ref(tokens: &[Token], sig: &[usize], mut pos: usize) -> (TableRef, usize) {
    if pos < sig.len() && matches!(tokens[sig[pos]].kind, TokenKind::Punctuation(Punctuation::LParen)) {
        let open = sig[pos];
        let mut depth = 1i32;
        let mut p = pos + 1;
        while p < sig.len() && depth > 0 {
            match &tokens[sig[p]].kind {
                TokenKind::Punctuation(Punctuation::LParen) => depth += 1,
                TokenKind::Punctuation(Punctuation::RParen) => depth -= 1,
                _ => {}
            }
            p += 1;
        }
        let close = sig[p - 1];
        let mut alias = None;
        if p < sig.len() && is_keyword(tokens, sig[p], Keyword::As) {
            p += 1;
            if p < sig.len() {
                alias = Some(tokens[sig[p]].raw().to_string());
                p += 1;
            }
        } else if p < sig.len() && matches!(tokens[sig[p]].kind, TokenKind::Identifier) {
            alias = Some(tokens[sig[p]].raw().to_string());
            p += 1;
        }
        return (
            TableRef {
                schema: None,
                name: String::new(),
                alias,
                is_subquery: true,
                subquery_tokens: Some(open + 1..close),
            },
            p,
        );
    }
    let mut schema = None;
    let mut name = tokens[sig[pos]].raw().to_string();
    pos += 1;
    if pos < sig.len() && matches!(tokens[sig[pos]].kind, TokenKind::Operator(Operator::Dot)) {
        pos += 1;
        if pos < sig.len() {
            schema = Some(name);
            name = tokens[sig[pos]].raw().to_string();
            pos += 1;
        }
    }
    let mut alias = None;
    if pos < sig.len() && is_keyword(tokens, sig[pos], Keyword::As) {
        pos += 1;
        if pos < sig.len() {
            alias = Some(tokens[sig[pos]].raw().to_string());
            pos += 1;
        }
    } else if pos < sig.len() && matches!(tokens[sig[pos]].kind, TokenKind::Identifier) {
        alias = Some(tokens[sig[pos]].raw().to_string());
        pos += 1;
    }
    (
        TableRef {
            schema,
            name,
            alias,
            is_subquery: false,
            subquery_tokens: None,
        },
        pos,
    )
}

fn finalize_from(clause: &mut Clause, tokens: &[Token]) -> Result<(), CompileError> {
    let sig = significant_in(tokens, clause.body.clone());
    if sig.is_empty() {
        return Err(CompileError::single(CompileDiagnostic::new(
            ErrorKind::RequiredClauseMissing,
            "FROM clause has no content",
            pos_of(tokens, clause.heading.start),
        )));
    }
    let mut sink = Vec::new();
    let (first, mut pos) = parse_table_ref(tokens, &sig, 0);
    if first.is_subquery && first.alias.is_none() {
        sink.push(CompileDiagnostic::new(
            ErrorKind::SubqueryAliasMissing,
            "subquery in FROM requires an alias",
            pos_of(tokens, sig[0]),
        ));
    }
    let mut joins = Vec::new();
    while pos < sig.len() {
        if matches!(tokens[sig[pos]].kind, TokenKind::Punctuation(Punctuation::Comma)) {
            sink.push(CompileDiagnostic::new(
                ErrorKind::NaturalJoinForbidden,
                "implicit comma join is not permitted",
                pos_of(tokens, sig[pos]),
            ));
            pos += 1;
            continue;
        }
        if is_keyword(tokens, sig[pos], Keyword::Natural) {
            sink.push(CompileDiagnostic::new(
                ErrorKind::NaturalJoinForbidden,
                "NATURAL JOIN is not permitted",
                pos_of(tokens, sig[pos]),
            ));
            pos += 1;
            continue;
        }
        let mut join_type = None;
        if is_keyword(tokens, sig[pos], Keyword::Inner) {
            join_type = Some(JoinType::Inner);
            pos += 1;
        } else if is_keyword(tokens, sig[pos], Keyword::Left) {
            join_type = Some(JoinType::Left);
            pos += 1;
            if pos < sig.len() && is_keyword(tokens, sig[pos], Keyword::Outer) {
                pos += 1;
            }
        } else if is_keyword(tokens, sig[pos], Keyword::Right) {
            join_type = Some(JoinType::Right);
            pos += 1;
            if pos < sig.len() && is_keyword(tokens, sig[pos], Keyword::Outer) {
                pos += 1;
            }
        } else if is_keyword(tokens, sig[pos], Keyword::Full) {
            join_type = Some(JoinType::Full);
            pos += 1;
            if pos < sig.len() && is_keyword(tokens, sig[pos], Keyword::Outer) {
                pos += 1;
            }
        } else if is_keyword(tokens, sig[pos], Keyword::Cross) {
            join_type = Some(JoinType::Cross);
            pos += 1;
        }
        if pos < sig.len() && is_keyword(tokens, sig[pos], Keyword::Join) {
            pos += 1;
            let (table, next) = parse_table_ref(tokens, &sig, pos);
            pos = next;
            if table.is_subquery && table.alias.is_none() {
                sink.push(CompileDiagnostic::new(
                    ErrorKind::SubqueryAliasMissing,
                    "subquery in JOIN requires an alias",
                    pos_of(tokens, sig[pos.min(sig.len() - 1)]),
                ));
            }
            let mut on_condition = None;
            let mut using_columns = Vec::new();
            if pos < sig.len() && is_keyword(tokens, sig[pos], Keyword::On) {
                pos += 1;
                let start = pos;
                while pos < sig.len()
                    && !is_keyword(tokens, sig[pos], Keyword::Inner)
                    && !is_keyword(tokens, sig[pos], Keyword::Left)
                    && !is_keyword(tokens, sig[pos], Keyword::Right)
                    && !is_keyword(tokens, sig[pos], Keyword::Full)
                    && !is_keyword(tokens, sig[pos], Keyword::Cross)
                    && !is_keyword(tokens, sig[pos], Keyword::Join)
                {
                    pos += 1;
                }
                if pos > start {
                    on_condition = Some(sig[start]..sig[pos - 1] + 1);
                }
            } else if pos < sig.len() && is_keyword(tokens, sig[pos], Keyword::Using) {
                pos += 1;
                if pos < sig.len()
                    && matches!(tokens[sig[pos]].kind, TokenKind::Punctuation(Punctuation::LParen))
                {
                    pos += 1;
                    while pos < sig.len()
                        && !matches!(tokens[sig[pos]].kind, TokenKind::Punctuation(Punctuation::RParen))
                    {
                        if !matches!(tokens[sig[pos]].kind, TokenKind::Punctuation(Punctuation::Comma)) {
                            using_columns.push(tokens[sig[pos]].raw().to_string());
                        }
                        pos += 1;
                    }
                    pos += 1;
                }
            }
            joins.push(JoinItem {
                join_type: join_type.unwrap_or(JoinType::None),
                table,
                on_condition,
                using_columns,
            });
        } else {
            pos += 1;
        }
    }
    if !sink.is_empty() {
        return Err(CompileError::new(sink));
    }
    clause.content = Some(ClauseContent::From(FromClauseContent { first, joins }));
    Ok(())
}

fn finalize_returning(clause: &mut Clause, tokens: &[Token]) -> Result<(), CompileError> {
    let sig = significant_in(tokens, clause.body.clone());
    if sig.is_empty() {
        return Err(CompileError::single(CompileDiagnostic::new(
            ErrorKind::RequiredClauseMissing,
            "RETURNING clause has no content",
            pos_of(tokens, clause.heading.start),
        )));
    }
    let mut fields = Vec::new();
    for group in split_top_level_commas(tokens, &sig) {
        if group.is_empty() {
            continue;
        }
        fields.push(SelectField {
            kind: classify_field(tokens, &group),
            tokens: group[0]..*group.last().unwrap() + 1,
            result_type: None,
            alias: None,
        });
    }
    clause.content = Some(ClauseContent::Returning(ReturningContent { fields }));
    Ok(())
}

fn finalize_for_lock(clause: &mut Clause, tokens: &[Token]) -> Result<(), CompileError> {
    let sig = significant_in(tokens, clause.body.clone());
    let mut pos = 0;
    let strength = if pos < sig.len() && is_keyword(tokens, sig[pos], Keyword::Update) {
        pos += 1;
        LockStrength::Update
    } else if pos < sig.len() && is_keyword(tokens, sig[pos], Keyword::Share) {
        pos += 1;
        LockStrength::Share
    } else {
        return Err(CompileError::single(CompileDiagnostic::new(
            ErrorKind::RequiredClauseMissing,
            "FOR clause must specify UPDATE or SHARE",
            pos_of(tokens, clause.heading.start),
        )));
    };
    let mut nowait = false;
    let mut skip_locked = false;
    if pos < sig.len() && is_keyword(tokens, sig[pos], Keyword::Nowait) {
        nowait = true;
    } else if pos < sig.len() && is_keyword(tokens, sig[pos], Keyword::Skip) {
        skip_locked = true;
    }
    clause.content = Some(ClauseContent::ForLock(ForLockContent {
        strength,
        nowait,
        skip_locked,
    }));
    Ok(())
}

fn finalize_group_by(clause: &mut Clause, tokens: &[Token]) -> Result<(), CompileError> {
    let sig = significant_in(tokens, clause.body.clone());
    let keys = split_top_level_commas(tokens, &sig)
        .into_iter()
        .filter(|g| !g.is_empty())
        .map(|g| g[0]..*g.last().unwrap() + 1)
        .collect();
    clause.content = Some(ClauseContent::GroupBy(keys));
    Ok(())
}

fn finalize_order_by(clause: &mut Clause, tokens: &[Token]) -> Result<(), CompileError> {
    let sig = significant_in(tokens, clause.body.clone());
    let mut keys = Vec::new();
    for group in split_top_level_commas(tokens, &sig) {
        if group.is_empty() {
            continue;
        }
        let mut end = group.len();
        let mut nulls = None;
        if end >= 2 && is_keyword(tokens, group[end - 1], Keyword::First) && is_keyword(tokens, group[end - 2], Keyword::Nulls) {
            nulls = Some(NullsOrder::First);
            end -= 2;
        } else if end >= 2 && is_keyword(tokens, group[end - 1], Keyword::Last) && is_keyword(tokens, group[end - 2], Keyword::Nulls) {
            nulls = Some(NullsOrder::Last);
            end -= 2;
        }
        let mut direction = None;
        if end >= 1 && is_keyword(tokens, group[end - 1], Keyword::Asc) {
            direction = Some(SortDirection::Asc);
            end -= 1;
        } else if end >= 1 && is_keyword(tokens, group[end - 1], Keyword::Desc) {
            direction = Some(SortDirection::Desc);
            end -= 1;
        }
        let expr_tokens = &group[..end.max(1)];
        keys.push(OrderByKey {
            expr: expr_tokens[0]..*expr_tokens.last().unwrap() + 1,
            direction,
            nulls,
        });
    }
    clause.content = Some(ClauseContent::OrderBy(keys));
    Ok(())
}

/// A directive-bearing comment (e.g. `/*= limit */`) is significant
/// (it carries a directive payload the emitter must see), but it is not
/// part of the literal value itself — only its dummy literal is. Strip
/// those markers before counting tokens, the way
/// `stage5::detect_dummy_ranges` skips past them to find the dummy.
fn strip_directive_markers(tokens: &[Token], sig: &[usize]) -> Vec<usize> {
    sig.iter().copied().filter(|&i| tokens[i].directive.is_none()).collect()
}

fn parse_single_integer(tokens: &[Token], sig: &[usize], negative_error: ErrorKind, comma_error: ErrorKind) -> Result<i64, CompileDiagnostic> {
    let fallback_pos = pos_of(tokens, sig[0]);
    let sig = strip_directive_markers(tokens, sig);
    let sig = sig.as_slice();
    if sig.is_empty() {
        return Err(CompileDiagnostic::new(
            negative_error,
            "expected a single integer literal",
            fallback_pos,
        ));
    }
    if sig.len() == 2 {
        if let TokenKind::Operator(Operator::Minus) = tokens[sig[0]].kind {
            return Err(CompileDiagnostic::new(
                negative_error,
                "negative value is not permitted",
                pos_of(tokens, sig[0]),
            ));
        }
    }
    if sig.iter().any(|&i| matches!(tokens[i].kind, TokenKind::Punctuation(Punctuation::Comma))) {
        return Err(CompileDiagnostic::new(
            comma_error,
            "comma-separated shorthand is not permitted",
            pos_of(tokens, sig[0]),
        ));
    }
    if sig.len() != 1 {
        return Err(CompileDiagnostic::new(
            negative_error,
            "expected a single integer literal",
            pos_of(tokens, sig[0]),
        ));
    }
    match &tokens[sig[0]].kind {
        TokenKind::Number => tokens[sig[0]]
            .raw()
            .parse::<i64>()
            .map_err(|_| CompileDiagnostic::new(negative_error, "malformed integer literal", pos_of(tokens, sig[0]))),
        _ => Err(CompileDiagnostic::new(
            negative_error,
            "expected an integer literal",
            pos_of(tokens, sig[0]),
        )),
    }
}

fn finalize_limit(clause: &mut Clause, tokens: &[Token]) -> Result<(), CompileError> {
    let sig = significant_in(tokens, clause.body.clone());
    if sig.is_empty() {
        return Err(CompileError::single(CompileDiagnostic::new(
            ErrorKind::RequiredClauseMissing,
            "LIMIT clause has no content",
            pos_of(tokens, clause.heading.start),
        )));
    }
    let value = parse_single_integer(tokens, &sig, ErrorKind::NegativeLimitForbidden, ErrorKind::CommaLimitForbidden)
        .map_err(CompileError::single)?;
    clause.content = Some(ClauseContent::Limit(LimitClauseContent { value }));
    Ok(())
}

fn finalize_offset(clause: &mut Clause, tokens: &[Token]) -> Result<(), CompileError> {
    let sig = significant_in(tokens, clause.body.clone());
    if sig.is_empty() {
        return Err(CompileError::single(CompileDiagnostic::new(
            ErrorKind::RequiredClauseMissing,
            "OFFSET clause has no content",
            pos_of(tokens, clause.heading.start),
        )));
    }
    let value = parse_single_integer(tokens, &sig, ErrorKind::NegativeLimitForbidden, ErrorKind::CommaLimitForbidden)
        .map_err(CompileError::single)?;
    clause.content = Some(ClauseContent::Offset(OffsetClauseContent { value }));
    Ok(())
}

fn finalize_insert_into(clause: &mut Clause, tokens: &[Token]) -> Result<(), CompileError> {
    let sig = significant_in(tokens, clause.body.clone());
    if sig.is_empty() {
        return Err(CompileError::single(CompileDiagnostic::new(
            ErrorKind::RequiredClauseMissing,
            "INSERT INTO requires a target table",
            pos_of(tokens, clause.heading.start),
        )));
    }
    let (table, pos) = parse_table_ref(tokens, &sig, 0);
    if pos >= sig.len() || !matches!(tokens[sig[pos]].kind, TokenKind::Punctuation(Punctuation::LParen)) {
        return Err(CompileError::single(CompileDiagnostic::new(
            ErrorKind::InsertColumnListRequired,
            "INSERT INTO requires an explicit column list",
            pos_of(tokens, sig[0]),
        )));
    }
    let mut p = pos + 1;
    let mut columns = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut sink = Vec::new();
    while p < sig.len() && !matches!(tokens[sig[p]].kind, TokenKind::Punctuation(Punctuation::RParen)) {
        if !matches!(tokens[sig[p]].kind, TokenKind::Punctuation(Punctuation::Comma)) {
            let name = tokens[sig[p]].raw().to_string();
            if !seen.insert(name.clone()) {
                sink.push(CompileDiagnostic::new(
                    ErrorKind::DuplicateColumn,
                    format!("duplicate column {name:?} in INSERT column list"),
                    pos_of(tokens, sig[p]),
                ));
            }
            columns.push(name);
        }
        p += 1;
    }
    if !sink.is_empty() {
        return Err(CompileError::new(sink));
    }
    clause.content = Some(ClauseContent::InsertInto(InsertIntoContent { table, columns }));
    Ok(())
}

fn finalize_values(clause: &mut Clause, tokens: &[Token]) -> Result<(), CompileError> {
    let sig = significant_in(tokens, clause.body.clone());
    let mut tuples = Vec::new();
    let mut pos = 0;
    while pos < sig.len() {
        if !matches!(tokens[sig[pos]].kind, TokenKind::Punctuation(Punctuation::LParen)) {
            pos += 1;
            continue;
        }
        let mut depth = 1i32;
        let start = pos + 1;
        pos += 1;
        while pos < sig.len() && depth > 0 {
            match &tokens[sig[pos]].kind {
                TokenKind::Punctuation(Punctuation::LParen) => depth += 1,
                TokenKind::Punctuation(Punctuation::RParen) => depth -= 1,
                _ => {}
            }
            pos += 1;
        }
        let inner = &sig[start..pos - 1];
        let exprs = split_top_level_commas(tokens, inner)
            .into_iter()
            .filter(|g| !g.is_empty())
            .map(|g| g[0]..*g.last().unwrap() + 1)
            .collect();
        tuples.push(exprs);
    }
    if tuples.is_empty() {
        return Err(CompileError::single(CompileDiagnostic::new(
            ErrorKind::RequiredClauseMissing,
            "VALUES requires at least one tuple",
            pos_of(tokens, clause.heading.start),
        )));
    }
    clause.content = Some(ClauseContent::Values(ValuesContent { tuples }));
    Ok(())
}

fn parse_set_body(tokens: &[Token], sig: &[usize]) -> Result<SetClauseContent, CompileError> {
    let mut sink = Vec::new();
    let mut assignments = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for group in split_top_level_commas(tokens, sig) {
        if group.len() < 3 {
            continue;
        }
        let column = tokens[group[0]].raw().to_string();
        if !matches!(tokens[group[1]].kind, TokenKind::Operator(Operator::Eq)) {
            continue;
        }
        if !seen.insert(column.clone()) {
            sink.push(CompileDiagnostic::new(
                ErrorKind::DuplicateSetAssign,
                format!("duplicate assignment to column {column:?}"),
                pos_of(tokens, group[0]),
            ));
            continue;
        }
        assignments.push(SetAssignment {
            column,
            expr: group[2]..*group.last().unwrap() + 1,
        });
    }
    if !sink.is_empty() {
        return Err(CompileError::new(sink));
    }
    Ok(SetClauseContent { assignments })
}

fn finalize_on_conflict(clause: &mut Clause, tokens: &[Token]) -> Result<(), CompileError> {
    let sig = significant_in(tokens, clause.body.clone());
    let mut pos = 0;
    let mut target_columns = Vec::new();
    if pos < sig.len() && matches!(tokens[sig[pos]].kind, TokenKind::Punctuation(Punctuation::LParen)) {
        pos += 1;
        while pos < sig.len() && !matches!(tokens[sig[pos]].kind, TokenKind::Punctuation(Punctuation::RParen)) {
            if !matches!(tokens[sig[pos]].kind, TokenKind::Punctuation(Punctuation::Comma)) {
                target_columns.push(tokens[sig[pos]].raw().to_string());
            }
            pos += 1;
        }
        pos += 1;
    }
    if pos < sig.len() && is_keyword(tokens, sig[pos], Keyword::Do) {
        pos += 1;
    }
    let action = if pos < sig.len() && is_keyword(tokens, sig[pos], Keyword::Nothing) {
        OnConflictAction::DoNothing
    } else if pos < sig.len() && is_keyword(tokens, sig[pos], Keyword::Update) {
        pos += 1;
        if pos < sig.len() && is_keyword(tokens, sig[pos], Keyword::Set) {
            pos += 1;
        }
        OnConflictAction::DoUpdate(parse_set_body(tokens, &sig[pos..])?)
    } else {
        return Err(CompileError::single(CompileDiagnostic::new(
            ErrorKind::RequiredClauseMissing,
            "ON CONFLICT requires DO NOTHING or DO UPDATE SET",
            pos_of(tokens, clause.heading.start),
        )));
    };
    clause.content = Some(ClauseContent::OnConflict(OnConflictContent {
        target_columns,
        action,
    }));
    Ok(())
}

fn finalize_update(clause: &mut Clause, tokens: &[Token]) -> Result<(), CompileError> {
    let sig = significant_in(tokens, clause.body.clone());
    if sig.is_empty() {
        return Err(CompileError::single(CompileDiagnostic::new(
            ErrorKind::RequiredClauseMissing,
            "UPDATE requires a target table",
            pos_of(tokens, clause.heading.start),
        )));
    }
    let (table, _) = parse_table_ref(tokens, &sig, 0);
    clause.content = Some(ClauseContent::Update(UpdateClauseContent { table }));
    Ok(())
}

fn finalize_set(clause: &mut Clause, tokens: &[Token]) -> Result<(), CompileError> {
    let sig = significant_in(tokens, clause.body.clone());
    let content = parse_set_body(tokens, &sig)?;
    clause.content = Some(ClauseContent::Set(content));
    Ok(())
}

fn finalize_delete_from(clause: &mut Clause, tokens: &[Token]) -> Result<(), CompileError> {
    let sig = significant_in(tokens, clause.body.clone());
    if sig.is_empty() {
        return Err(CompileError::single(CompileDiagnostic::new(
            ErrorKind::RequiredClauseMissing,
            "DELETE FROM requires a target table",
            pos_of(tokens, clause.heading.start),
        )));
    }
    let (table, _) = parse_table_ref(tokens, &sig, 0);
    clause.content = Some(ClauseContent::DeleteFrom(DeleteFromClauseContent { table }));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{stage2, stage3};
    use crate::tokenizer::tokenize;

    fn compile_to_stage4(src: &str) -> Result<Statement, CompileError> {
        let tokens = tokenize(src).unwrap();
        let statement = stage2::run(&tokens).unwrap();
        stage3::run(&statement, &tokens).unwrap();
        run(statement, &tokens)
    }

    #[test]
    fn bare_asterisk_rejected() {
        let err = compile_to_stage4("SELECT * FROM users").unwrap_err();
        assert_eq!(err.diagnostics[0].kind, ErrorKind::AsteriskInSelect);
    }

    #[test]
    fn insert_without_columns_rejected() {
        let err = compile_to_stage4("INSERT INTO users VALUES (1, 'a')").unwrap_err();
        assert_eq!(err.diagnostics[0].kind, ErrorKind::InsertColumnListRequired);
    }

    #[test]
    fn subquery_without_alias_rejected() {
        let err = compile_to_stage4("SELECT x FROM (SELECT id AS x FROM t)").unwrap_err();
        assert_eq!(err.diagnostics[0].kind, ErrorKind::SubqueryAliasMissing);
    }

    #[test]
    fn negative_limit_rejected() {
        let err = compile_to_stage4("SELECT id FROM t LIMIT -1").unwrap_err();
        assert_eq!(err.diagnostics[0].kind, ErrorKind::NegativeLimitForbidden);
    }

    #[test]
    fn well_formed_select_finalizes() {
        let statement = compile_to_stage4("SELECT id, name FROM users WHERE active = true").unwrap();
        assert!(statement.clause(ClauseKind::Select).unwrap().content.is_some());
        assert!(statement.clause(ClauseKind::From).unwrap().content.is_some());
    }

    #[test]
    fn directive_backed_limit_finalizes() {
        let statement = compile_to_stage4("SELECT id FROM t LIMIT /*= limit */10").unwrap();
        let clause = statement.clause(ClauseKind::Limit).unwrap();
        match clause.content.as_ref().unwrap() {
            ClauseContent::Limit(limit) => assert_eq!(limit.value, 10),
            other => panic!("expected a limit clause, got {other:?}"),
        }
    }

    #[test]
    fn distinct_on_alias_is_rejected() {
        let err = compile_to_stage4("SELECT DISTINCT ON (x) id AS x, name FROM users").unwrap_err();
        assert_eq!(err.diagnostics[0].kind, ErrorKind::DistinctAliasDisallowed);
    }

    #[test]
    fn distinct_on_column_name_is_accepted() {
        let statement = compile_to_stage4("SELECT DISTINCT ON (id) id, name FROM users").unwrap();
        match statement.clause(ClauseKind::Select).unwrap().content.as_ref().unwrap() {
            ClauseContent::Select(select) => assert_eq!(select.distinct_on, vec!["id".to_string()]),
            other => panic!("expected a select clause, got {other:?}"),
        }
    }
}
