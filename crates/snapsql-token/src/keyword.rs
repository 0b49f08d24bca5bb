/// How strongly a keyword binds compared to an identifier in the same
/// position (spec.md §4.1: "strict-reserved, contextual, or non-reserved").
/// The classification only affects diagnostics and future grammar
/// flexibility; the tokenizer always emits the specific `Keyword` variant
/// when the spelling matches, regardless of class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeywordClass {
    /// Never valid as a bare identifier (e.g. `SELECT`, `FROM`, `WHERE`).
    StrictReserved,
    /// Valid as an identifier in some positions but carries special
    /// meaning in clause position (e.g. `LIMIT`, `RECURSIVE`).
    Contextual,
    /// Only keyword-like at the head of a construct (e.g. `NOWAIT`,
    /// `CONFLICT`).
    NonReserved,
}

/// The closed set of SQL keywords the tokenizer recognizes for the
/// SELECT/INSERT/UPDATE/DELETE subset this compiler targets. Matching is
/// case-insensitive; `Token::raw` preserves the author's original casing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::EnumString, strum_macros::IntoStaticStr)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Keyword {
    Select,
    Distinct,
    All,
    From,
    As,
    Join,
    Inner,
    Left,
    Right,
    Full,
    Outer,
    Cross,
    Natural,
    On,
    Using,
    Where,
    Group,
    By,
    Having,
    Order,
    Asc,
    Desc,
    Nulls,
    First,
    Last,
    Limit,
    Offset,
    For,
    Update,
    Share,
    Nowait,
    Skip,
    Locked,
    Returning,
    With,
    Recursive,
    Insert,
    Into,
    Values,
    Conflict,
    Do,
    Nothing,
    Set,
    Delete,
    And,
    Or,
    Not,
    In,
    Is,
    Like,
    Between,
    Exists,
    Cast,
    Case,
    When,
    Then,
    Else,
    End,
    Union,
    Except,
    Intersect,
}

impl Keyword {
    pub const fn class(self) -> KeywordClass {
        use Keyword::*;
        match self {
            Select | From | Where | Join | On | As | And | Or | Not | Case | When | Then
            | Else | End | Union | Except | Intersect => KeywordClass::StrictReserved,
            Limit | Offset | Returning | Recursive | Distinct | Group | By | Having | Order
            | Insert | Into | Values | Update | Set | Delete | Using | In | Is | Like
            | Between | Exists | Cast | With => KeywordClass::Contextual,
            All | Inner | Left | Right | Full | Outer | Cross | Natural | Asc | Desc | Nulls
            | First | Last | For | Share | Nowait | Skip | Locked | Conflict | Do | Nothing => {
                KeywordClass::NonReserved
            }
        }
    }

    /// Attempt to classify a raw identifier spelling as a keyword.
    pub fn lookup(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}
