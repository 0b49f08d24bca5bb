use smol_str::SmolStr;

use crate::keyword::Keyword;

/// A 1-based line/column plus a 0-based byte offset into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

impl Position {
    pub const fn new(line: u32, column: u32, offset: usize) -> Self {
        Self { line, column, offset }
    }
}

/// The source range a token occupies, from its first byte (inclusive) to
/// one past its last byte (exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TokenSpan {
    pub start: Position,
    pub end: Position,
}

impl TokenSpan {
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// Stable index of a token within its tokenizer's output arena. Cross-stage
/// references use this instead of borrowing the token itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TokenId(pub u32);

/// Punctuation that is never itself an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::IntoStaticStr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
pub enum Punctuation {
    LParen,
    RParen,
    Comma,
    Semicolon,
}

/// Comparison, arithmetic, JSON, and cast operators recognized by the
/// tokenizer (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::IntoStaticStr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    /// `||`
    Concat,
    /// `.`
    Dot,
    /// PostgreSQL `::`
    DoubleColon,
    /// `->`
    JsonArrow,
    /// `->>`
    JsonArrowText,
    /// `#>`
    JsonHashArrow,
    /// `#>>`
    JsonHashArrowText,
}

/// The directive families recognized inside a block comment (spec.md §6
/// "Directive comment syntax"). The directive's own expression text is
/// captured verbatim; it is not parsed until Parserstep6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DirectiveKind {
    If,
    ElseIf,
    Else,
    End,
    For,
    Variable,
    Const,
    SystemValue,
}

/// Extra payload a block-comment token carries when it is a directive.
/// `condition` holds the raw expression text for `if`/`elseif`/the list
/// expression of `for`/the expression of a variable or const directive.
/// `loop_var` holds the bound name for `for <ident> in <expr>`.
/// `system_field` holds the identifier named by `system_value <ident>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DirectivePayload {
    pub kind: DirectiveKind,
    pub condition: Option<SmolStr>,
    pub loop_var: Option<SmolStr>,
    pub system_field: Option<SmolStr>,
}

/// The closed set of lexical categories a token may belong to (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TokenKind {
    Whitespace,
    Identifier,
    /// `"..."`, `` `...` ``, or `[...]`.
    QuotedIdentifier,
    Keyword(Keyword),
    Number,
    String,
    Boolean,
    Null,
    Punctuation(Punctuation),
    Operator(Operator),
    /// `-- ... \n`
    LineComment,
    /// `/* ... */`, possibly carrying a `DirectivePayload`.
    BlockComment,
    EndOfFile,
}

/// An immutable lexical token. `raw` preserves the exact source text
/// (including original keyword casing) so that concatenating every token's
/// `raw` reconstructs the input byte-for-byte (spec.md §8 "Round-trip").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Token {
    pub id: TokenId,
    pub kind: TokenKind,
    pub raw: SmolStr,
    pub span: TokenSpan,
    pub directive: Option<DirectivePayload>,
}

impl Token {
    pub fn new(id: TokenId, kind: TokenKind, raw: impl Into<SmolStr>, span: TokenSpan) -> Self {
        Self {
            id,
            kind,
            raw: raw.into(),
            span,
            directive: None,
        }
    }

    pub fn with_directive(mut self, payload: DirectivePayload) -> Self {
        self.directive = Some(payload);
        self
    }

    pub fn raw(&self) -> &str {
        self.raw.as_str()
    }

    pub fn is_whitespace(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace)
    }

    pub fn is_comment(&self) -> bool {
        matches!(self.kind, TokenKind::LineComment | TokenKind::BlockComment)
    }

    pub fn is_trivia(&self) -> bool {
        self.is_whitespace() || (self.is_comment() && self.directive.is_none())
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        matches!(self.kind, TokenKind::Keyword(k) if k == keyword)
    }

    pub fn is_punctuation(&self, punctuation: Punctuation) -> bool {
        matches!(self.kind, TokenKind::Punctuation(p) if p == punctuation)
    }

    pub fn is_operator(&self, operator: Operator) -> bool {
        matches!(self.kind, TokenKind::Operator(op) if op == operator)
    }

    pub fn directive_kind(&self) -> Option<DirectiveKind> {
        self.directive.as_ref().map(|d| d.kind)
    }
}
