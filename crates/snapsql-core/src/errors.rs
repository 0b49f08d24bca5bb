use snapsql_token::Position;

/// The closed set of structural/semantic error kinds named in spec.md §6.
#[derive(Debug, Clone, PartialEq, Eq, strum_macros::IntoStaticStr)]
#[strum(serialize_all = "PascalCase")]
pub enum ErrorKind {
    UnmatchedParen,
    UnmatchedDirective,
    DuplicateClause,
    RequiredClauseMissing,
    ClauseOrderViolation,
    SubqueryNotAllowed,
    DistinctAliasDisallowed,
    AsteriskInSelect,
    LiteralInSelect,
    SubqueryAliasMissing,
    NaturalJoinForbidden,
    CommaLimitForbidden,
    NegativeLimitForbidden,
    OffsetWithoutLimit,
    HavingWithoutGroupBy,
    DuplicateColumn,
    DuplicateSetAssign,
    InsertColumnListRequired,
    UndefinedParameter,
    ExpressionTypeError,
    ForLoopListTypeError,
    ExpressionIndexNotFound,
    UnsupportedDialect,
}

/// One diagnostic: an error kind, the offending identifier/clause text,
/// its source position, and an optional "see also" secondary position
/// (spec.md §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileDiagnostic {
    pub kind: ErrorKind,
    pub message: String,
    pub pos: Position,
    pub secondary_pos: Option<Position>,
}

impl CompileDiagnostic {
    pub fn new(kind: ErrorKind, message: impl Into<String>, pos: Position) -> Self {
        Self {
            kind,
            message: message.into(),
            pos,
            secondary_pos: None,
        }
    }

    pub fn with_secondary(mut self, pos: Position) -> Self {
        self.secondary_pos = Some(pos);
        self
    }
}

impl std::fmt::Display for CompileDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}: {}",
            self.pos.line, self.pos.column, self.message
        )
    }
}

/// A stage's accumulated diagnostics. Diagnostics are ordered first by
/// source position, ties broken by the stage that produced them
/// (spec.md §5 "Ordering guarantees").
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("compilation failed with {} diagnostic(s)", .diagnostics.len())]
pub struct CompileError {
    pub diagnostics: Vec<CompileDiagnostic>,
}

impl CompileError {
    pub fn new(mut diagnostics: Vec<CompileDiagnostic>) -> Self {
        diagnostics.sort_by_key(|d| (d.pos.offset, d.pos.line, d.pos.column));
        Self { diagnostics }
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn single(diagnostic: CompileDiagnostic) -> Self {
        Self::new(vec![diagnostic])
    }
}

/// Aggregates diagnostics within a single parser stage; the stage returns
/// the aggregate only if non-empty, otherwise later stages proceed
/// (spec.md §7 band 2).
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<CompileDiagnostic>,
}

impl DiagnosticSink {
    pub fn push(&mut self, diagnostic: CompileDiagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn into_result<T>(self, value: T) -> Result<T, CompileError> {
        if self.diagnostics.is_empty() {
            Ok(value)
        } else {
            Err(CompileError::new(self.diagnostics))
        }
    }
}

/// The error type at the `compile` boundary, unifying the lexical band
/// (tokenizer) with the structural/semantic band (parser stages 1-6),
/// per spec.md §7's two compile-time bands.
#[derive(Debug, thiserror::Error)]
pub enum SnapSqlError {
    #[error(transparent)]
    Lex(#[from] snapsql_token::LexError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("compilation was cancelled")]
    Cancelled,
}
