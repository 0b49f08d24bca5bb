//! Character-stream to flat token-sequence tokenizer (spec.md §4.1).
//!
//! A single forward pass produces an ordered `Vec<Token>` including
//! whitespace and comments, so that concatenating every token's `raw`
//! reconstructs the source byte-for-byte (the "Round-trip" invariant in
//! spec.md §8).

use smol_str::SmolStr;
use snapsql_token::{
    DirectiveKind, DirectivePayload, Keyword, LexError, Operator, Position, Punctuation, Token,
    TokenId, TokenKind, TokenSpan,
};

pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Tokenizer::new(source).run()
}

struct Tokenizer<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: u32,
    column: u32,
    next_id: u32,
    tokens: Vec<Token>,
}

impl<'a> Tokenizer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            line: 1,
            column: 1,
            next_id: 0,
            tokens: Vec::new(),
        }
    }

    fn pos(&self, offset: usize) -> Position {
        Position::new(self.line, self.column, offset)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn peek_at(&self, skip: usize) -> Option<char> {
        self.chars.clone().nth(skip).map(|(_, c)| c)
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, c)) = next {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn current_offset(&mut self) -> usize {
        self.chars
            .peek()
            .map(|&(i, _)| i)
            .unwrap_or(self.source.len())
    }

    fn emit(&mut self, kind: TokenKind, start: Position, end_offset: usize) {
        let raw = &self.source[start.offset..end_offset];
        let id = TokenId(self.next_id);
        self.next_id += 1;
        self.tokens.push(Token::new(id, kind, raw, TokenSpan::new(start, self.pos(end_offset))));
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        while let Some(&(offset, c)) = self.chars.peek() {
            let start = self.pos(offset);
            if c.is_whitespace() {
                self.lex_whitespace(start);
            } else if c == '-' && self.peek_at(1) == Some('-') {
                self.lex_line_comment(start);
            } else if c == '/' && self.peek_at(1) == Some('*') {
                self.lex_block_comment(start)?;
            } else if c.is_alphabetic() || c == '_' {
                self.lex_word(start);
            } else if c.is_ascii_digit() {
                self.lex_number(start)?;
            } else if c == '\'' {
                self.lex_string(start)?;
            } else if c == '"' || c == '`' || c == '[' {
                self.lex_quoted_identifier(start)?;
            } else if c == '(' {
                self.bump();
                self.emit(TokenKind::Punctuation(Punctuation::LParen), start, offset + 1);
            } else if c == ')' {
                self.bump();
                self.emit(TokenKind::Punctuation(Punctuation::RParen), start, offset + 1);
            } else if c == ',' {
                self.bump();
                self.emit(TokenKind::Punctuation(Punctuation::Comma), start, offset + 1);
            } else if c == ';' {
                self.bump();
                self.emit(TokenKind::Punctuation(Punctuation::Semicolon), start, offset + 1);
            } else {
                self.lex_operator(start)?;
            }
        }

        let eof_offset = self.source.len();
        let eof_pos = self.pos(eof_offset);
        self.emit(TokenKind::EndOfFile, eof_pos, eof_offset);

        Ok(self.tokens)
    }

    fn lex_whitespace(&mut self, start: Position) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
        let end = self.current_offset();
        self.emit(TokenKind::Whitespace, start, end);
    }

    fn lex_line_comment(&mut self, start: Position) {
        self.bump();
        self.bump();
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
        let end = self.current_offset();
        self.emit(TokenKind::LineComment, start, end);
    }

    fn lex_block_comment(&mut self, start: Position) -> Result<(), LexError> {
        self.bump();
        self.bump();
        let mut terminated = false;
        while let Some(c) = self.peek() {
            if c == '*' && self.peek_at(1) == Some('/') {
                self.bump();
                self.bump();
                terminated = true;
                break;
            }
            self.bump();
        }
        if !terminated {
            return Err(LexError::UnterminatedComment { pos: start });
        }
        let end = self.current_offset();
        let raw = &self.source[start.offset..end];
        let content = &raw[2..raw.len() - 2];
        let directive = parse_directive(content);

        let id = TokenId(self.next_id);
        self.next_id += 1;
        let mut token = Token::new(
            id,
            TokenKind::BlockComment,
            raw,
            TokenSpan::new(start, self.pos(end)),
        );
        if let Some(payload) = directive {
            token = token.with_directive(payload);
        }
        self.tokens.push(token);
        Ok(())
    }

    fn lex_word(&mut self, start: Position) {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let end = self.current_offset();
        let raw = &self.source[start.offset..end];
        let kind = match raw.to_ascii_uppercase().as_str() {
            "TRUE" | "FALSE" => TokenKind::Boolean,
            "NULL" => TokenKind::Null,
            _ => match Keyword::lookup(raw) {
                Some(keyword) => TokenKind::Keyword(keyword),
                None => TokenKind::Identifier,
            },
        };
        self.emit(kind, start, end);
    }

    fn lex_number(&mut self, start: Position) -> Result<(), LexError> {
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut lookahead = 1;
            if matches!(self.peek_at(lookahead), Some('+') | Some('-')) {
                lookahead += 1;
            }
            if !matches!(self.peek_at(lookahead), Some(c) if c.is_ascii_digit()) {
                let end = self.current_offset();
                let bad_end = self.source[end..]
                    .char_indices()
                    .find(|&(_, c)| c.is_whitespace() || c == ',' || c == ')')
                    .map(|(i, _)| end + i)
                    .unwrap_or(self.source.len());
                return Err(LexError::InvalidNumber {
                    pos: start,
                    text: self.source[start.offset..bad_end].to_string(),
                });
            }
            self.bump();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.bump();
            }
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }
        let end = self.current_offset();
        self.emit(TokenKind::Number, start, end);
        Ok(())
    }

    fn lex_string(&mut self, start: Position) -> Result<(), LexError> {
        self.bump();
        let mut terminated = false;
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.bump();
                self.bump();
                continue;
            }
            if c == '\'' {
                self.bump();
                if self.peek() == Some('\'') {
                    self.bump();
                    continue;
                }
                terminated = true;
                break;
            }
            self.bump();
        }
        if !terminated {
            return Err(LexError::UnterminatedString { pos: start });
        }
        let end = self.current_offset();
        self.emit(TokenKind::String, start, end);
        Ok(())
    }

    fn lex_quoted_identifier(&mut self, start: Position) -> Result<(), LexError> {
        let (open, close) = match self.peek().unwrap() {
            '"' => ('"', '"'),
            '`' => ('`', '`'),
            '[' => ('[', ']'),
            _ => unreachable!(),
        };
        self.bump();
        let mut terminated = false;
        while let Some(c) = self.peek() {
            if c == close {
                self.bump();
                if close == open && self.peek() == Some(close) {
                    self.bump();
                    continue;
                }
                terminated = true;
                break;
            }
            self.bump();
        }
        if !terminated {
            return Err(LexError::UnterminatedString { pos: start });
        }
        let _ = open;
        let end = self.current_offset();
        self.emit(TokenKind::QuotedIdentifier, start, end);
        Ok(())
    }

    fn lex_operator(&mut self, start: Position) -> Result<(), LexError> {
        let c = self.peek().unwrap();
        let op = match c {
            '<' => {
                self.bump();
                match self.peek() {
                    Some('=') => {
                        self.bump();
                        Operator::LtEq
                    }
                    Some('>') => {
                        self.bump();
                        Operator::NotEq
                    }
                    _ => Operator::Lt,
                }
            }
            '>' => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    Operator::GtEq
                } else {
                    Operator::Gt
                }
            }
            '=' => {
                self.bump();
                Operator::Eq
            }
            '!' => {
                self.bump();
                if self.peek() == Some('=') {
                    self.bump();
                    Operator::NotEq
                } else {
                    return Err(LexError::InvalidNumber {
                        pos: start,
                        text: "!".to_string(),
                    });
                }
            }
            '+' => {
                self.bump();
                Operator::Plus
            }
            '-' => {
                self.bump();
                if self.peek() == Some('>') {
                    self.bump();
                    if self.peek() == Some('>') {
                        self.bump();
                        Operator::JsonArrowText
                    } else {
                        Operator::JsonArrow
                    }
                } else {
                    Operator::Minus
                }
            }
            '*' => {
                self.bump();
                Operator::Star
            }
            '/' => {
                self.bump();
                Operator::Slash
            }
            '%' => {
                self.bump();
                Operator::Percent
            }
            '|' => {
                self.bump();
                if self.peek() == Some('|') {
                    self.bump();
                }
                Operator::Concat
            }
            '.' => {
                self.bump();
                Operator::Dot
            }
            ':' => {
                self.bump();
                if self.peek() == Some(':') {
                    self.bump();
                }
                Operator::DoubleColon
            }
            '#' => {
                self.bump();
                if self.peek() == Some('>') {
                    self.bump();
                    if self.peek() == Some('>') {
                        self.bump();
                        Operator::JsonHashArrowText
                    } else {
                        Operator::JsonHashArrow
                    }
                } else {
                    return Err(LexError::InvalidNumber {
                        pos: start,
                        text: "#".to_string(),
                    });
                }
            }
            other => {
                return Err(LexError::InvalidNumber {
                    pos: start,
                    text: other.to_string(),
                });
            }
        };
        let end = self.current_offset();
        self.emit(TokenKind::Operator(op), start, end);
        Ok(())
    }
}

/// Parses a block comment's stripped content into a directive payload, if
/// the first non-whitespace character marks one of the three directive
/// families (`#` control, `=` variable, `$` const).
fn parse_directive(content: &str) -> Option<DirectivePayload> {
    let trimmed = content.trim();
    let marker = trimmed.chars().next()?;
    match marker {
        '#' => parse_control_directive(trimmed[1..].trim()),
        '=' => Some(DirectivePayload {
            kind: DirectiveKind::Variable,
            condition: Some(SmolStr::new(trimmed[1..].trim())),
            loop_var: None,
            system_field: None,
        }),
        '$' => Some(DirectivePayload {
            kind: DirectiveKind::Const,
            condition: Some(SmolStr::new(trimmed[1..].trim())),
            loop_var: None,
            system_field: None,
        }),
        _ => None,
    }
}

fn parse_control_directive(body: &str) -> Option<DirectivePayload> {
    let (head, rest) = split_first_word(body);
    match head.to_ascii_lowercase().as_str() {
        "if" => Some(DirectivePayload {
            kind: DirectiveKind::If,
            condition: Some(SmolStr::new(rest.trim())),
            loop_var: None,
            system_field: None,
        }),
        "elseif" => Some(DirectivePayload {
            kind: DirectiveKind::ElseIf,
            condition: Some(SmolStr::new(rest.trim())),
            loop_var: None,
            system_field: None,
        }),
        "else" => Some(DirectivePayload {
            kind: DirectiveKind::Else,
            condition: None,
            loop_var: None,
            system_field: None,
        }),
        "end" => Some(DirectivePayload {
            kind: DirectiveKind::End,
            condition: None,
            loop_var: None,
            system_field: None,
        }),
        "for" => {
            let rest = rest.trim();
            let (var, list_expr) = rest.split_once(" in ")?;
            Some(DirectivePayload {
                kind: DirectiveKind::For,
                condition: Some(SmolStr::new(list_expr.trim())),
                loop_var: Some(SmolStr::new(var.trim())),
                system_field: None,
            })
        }
        "system_value" => Some(DirectivePayload {
            kind: DirectiveKind::SystemValue,
            condition: None,
            loop_var: None,
            system_field: Some(SmolStr::new(rest.trim())),
        }),
        _ => None,
    }
}

fn split_first_word(s: &str) -> (&str, &str) {
    match s.find(char::is_whitespace) {
        Some(idx) => (&s[..idx], &s[idx..]),
        None => (s, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raws(tokens: &[Token]) -> String {
        tokens.iter().map(|t| t.raw.as_str()).collect()
    }

    #[test]
    fn round_trip_reconstructs_source() {
        let source = "SELECT id, name FROM users /*# if active != null */WHERE active = /*= active */true/*# end */";
        let tokens = tokenize(source).unwrap();
        assert_eq!(raws(&tokens), source);
    }

    #[test]
    fn recognizes_keywords_case_insensitively() {
        let tokens = tokenize("select Id from Users").unwrap();
        assert!(tokens[0].is_keyword(Keyword::Select));
        assert_eq!(tokens[0].raw(), "select");
    }

    #[test]
    fn unterminated_string_errors() {
        let err = tokenize("SELECT 'abc").unwrap_err();
        assert!(matches!(err, LexError::UnterminatedString { .. }));
    }

    #[test]
    fn unterminated_comment_errors() {
        let err = tokenize("SELECT 1 /* oops").unwrap_err();
        assert!(matches!(err, LexError::UnterminatedComment { .. }));
    }

    #[test]
    fn malformed_exponent_errors() {
        let err = tokenize("SELECT 1e").unwrap_err();
        assert!(matches!(err, LexError::InvalidNumber { .. }));
    }

    #[test]
    fn variable_directive_captures_expression() {
        let tokens = tokenize("/*= user.id */1").unwrap();
        let directive = tokens[0].directive.as_ref().unwrap();
        assert_eq!(directive.kind, DirectiveKind::Variable);
        assert_eq!(directive.condition.as_deref(), Some("user.id"));
    }

    #[test]
    fn for_directive_splits_var_and_list() {
        let tokens = tokenize("/*# for f in fields */").unwrap();
        let directive = tokens[0].directive.as_ref().unwrap();
        assert_eq!(directive.kind, DirectiveKind::For);
        assert_eq!(directive.loop_var.as_deref(), Some("f"));
        assert_eq!(directive.condition.as_deref(), Some("fields"));
    }

    #[test]
    fn postgres_cast_operator_is_tokenized() {
        let tokens = tokenize("id::text").unwrap();
        assert!(tokens.iter().any(|t| t.is_operator(Operator::DoubleColon)));
    }
}
