//! The statement/clause/field AST produced by Parserstep2-4 (spec.md §3).
//!
//! Clause and expression bodies are stored as token index ranges into the
//! tokenizer's flat `Vec<Token>` rather than as a nested expression tree —
//! spec.md only ever asks for "original expression tokens", never a full
//! SQL expression grammar, so a token range is the faithful, minimal
//! representation. The CEL directive language (`crate::expr`) is the one
//! sub-grammar that does get a real AST, because stage 6 must type-check
//! it.

use std::ops::Range;

use crate::schema::ParamType;

/// A half-open range of token indices into the compiling template's token
/// vector (not `TokenId`s from another template).
pub type TokenRange = Range<usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    InsertInto,
    Update,
    DeleteFrom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClauseKind {
    With,
    Select,
    From,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
    Offset,
    ForLock,
    Returning,
    InsertInto,
    Values,
    OnConflict,
    Update,
    Set,
    DeleteFrom,
}

impl ClauseKind {
    pub fn keyword_text(self) -> &'static str {
        match self {
            ClauseKind::With => "WITH",
            ClauseKind::Select => "SELECT",
            ClauseKind::From => "FROM",
            ClauseKind::Where => "WHERE",
            ClauseKind::GroupBy => "GROUP BY",
            ClauseKind::Having => "HAVING",
            ClauseKind::OrderBy => "ORDER BY",
            ClauseKind::Limit => "LIMIT",
            ClauseKind::Offset => "OFFSET",
            ClauseKind::ForLock => "FOR",
            ClauseKind::Returning => "RETURNING",
            ClauseKind::InsertInto => "INSERT INTO",
            ClauseKind::Values => "VALUES",
            ClauseKind::OnConflict => "ON CONFLICT",
            ClauseKind::Update => "UPDATE",
            ClauseKind::Set => "SET",
            ClauseKind::DeleteFrom => "DELETE FROM",
        }
    }

    /// Clauses allowed to carry an enclosing `if` guard (spec.md §4.3).
    pub fn is_conditionally_guardable(self) -> bool {
        matches!(
            self,
            ClauseKind::Where | ClauseKind::OrderBy | ClauseKind::Limit | ClauseKind::Offset
        )
    }
}

/// One clause as framed by Parserstep2 and finalized by Parserstep4.
#[derive(Debug, Clone)]
pub struct Clause {
    pub kind: ClauseKind,
    pub heading: TokenRange,
    pub body: TokenRange,
    /// Source text of the condition directive guarding this clause, if
    /// any — either author-written (Parserstep2) or synthesized
    /// (Parserstep5, for bare `LIMIT`/`OFFSET`).
    pub if_condition: Option<String>,
    pub implicit_guard: bool,
    pub content: Option<ClauseContent>,
}

impl Clause {
    pub fn new(kind: ClauseKind, heading: TokenRange, body: TokenRange) -> Self {
        Self {
            kind,
            heading,
            body,
            if_condition: None,
            implicit_guard: false,
            content: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Single,
    TableQualified,
    Function,
    ComplexExpression,
}

#[derive(Debug, Clone)]
pub struct SelectField {
    pub kind: FieldKind,
    pub tokens: TokenRange,
    pub result_type: Option<ParamType>,
    pub alias: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SelectClauseContent {
    pub distinct: bool,
    pub distinct_on: Vec<String>,
    pub fields: Vec<SelectField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    None,
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

#[derive(Debug, Clone)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
    pub alias: Option<String>,
    pub is_subquery: bool,
    pub subquery_tokens: Option<TokenRange>,
}

#[derive(Debug, Clone)]
pub struct JoinItem {
    pub join_type: JoinType,
    pub table: TableRef,
    pub on_condition: Option<TokenRange>,
    pub using_columns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FromClauseContent {
    pub first: TableRef,
    pub joins: Vec<JoinItem>,
}

#[derive(Debug, Clone)]
pub struct WhereClauseContent {
    pub expr: TokenRange,
}

#[derive(Debug, Clone)]
pub struct HavingClauseContent {
    pub expr: TokenRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone)]
pub struct OrderByKey {
    pub expr: TokenRange,
    pub direction: Option<SortDirection>,
    pub nulls: Option<NullsOrder>,
}

#[derive(Debug, Clone)]
pub struct LimitClauseContent {
    pub value: i64,
}

#[derive(Debug, Clone)]
pub struct OffsetClauseContent {
    pub value: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStrength {
    Update,
    Share,
}

#[derive(Debug, Clone)]
pub struct ForLockContent {
    pub strength: LockStrength,
    pub nowait: bool,
    pub skip_locked: bool,
}

#[derive(Debug, Clone)]
pub struct ReturningContent {
    pub fields: Vec<SelectField>,
}

#[derive(Debug, Clone)]
pub struct InsertIntoContent {
    pub table: TableRef,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ValuesContent {
    pub tuples: Vec<Vec<TokenRange>>,
}

#[derive(Debug, Clone)]
pub struct SetAssignment {
    pub column: String,
    pub expr: TokenRange,
}

#[derive(Debug, Clone)]
pub struct SetClauseContent {
    pub assignments: Vec<SetAssignment>,
}

#[derive(Debug, Clone)]
pub enum OnConflictAction {
    DoNothing,
    DoUpdate(SetClauseContent),
}

#[derive(Debug, Clone)]
pub struct OnConflictContent {
    pub target_columns: Vec<String>,
    pub action: OnConflictAction,
}

#[derive(Debug, Clone)]
pub struct UpdateClauseContent {
    pub table: TableRef,
}

#[derive(Debug, Clone)]
pub struct DeleteFromClauseContent {
    pub table: TableRef,
}

#[derive(Debug, Clone)]
pub enum ClauseContent {
    Select(SelectClauseContent),
    From(FromClauseContent),
    Where(WhereClauseContent),
    GroupBy(Vec<TokenRange>),
    Having(HavingClauseContent),
    OrderBy(Vec<OrderByKey>),
    Limit(LimitClauseContent),
    Offset(OffsetClauseContent),
    ForLock(ForLockContent),
    Returning(ReturningContent),
    InsertInto(InsertIntoContent),
    Values(ValuesContent),
    OnConflict(OnConflictContent),
    Update(UpdateClauseContent),
    Set(SetClauseContent),
    DeleteFrom(DeleteFromClauseContent),
}

#[derive(Debug, Clone)]
pub struct CteDefinition {
    pub name: String,
    pub recursive: bool,
    pub columns: Vec<String>,
    pub body: TokenRange,
}

/// A fully framed, clause-legal, clause-finalized statement: the AST
/// handed to Parserstep5/6 and then the emitter.
#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    pub ctes: Vec<CteDefinition>,
    pub clauses: Vec<Clause>,
}

impl Statement {
    pub fn clause(&self, kind: ClauseKind) -> Option<&Clause> {
        self.clauses.iter().find(|c| c.kind == kind)
    }

    pub fn clause_mut(&mut self, kind: ClauseKind) -> Option<&mut Clause> {
        self.clauses.iter_mut().find(|c| c.kind == kind)
    }

    pub fn clauses_of(&self, kind: ClauseKind) -> impl Iterator<Item = &Clause> {
        self.clauses.iter().filter(move |c| c.kind == kind)
    }
}
