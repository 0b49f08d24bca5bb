use crate::token::Position;

/// Lexical failures, surfaced verbatim via the error kinds named in
/// spec.md §6 ("Error kinds surfaced at the boundary").
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    #[error("unterminated string literal starting at {pos:?}")]
    UnterminatedString { pos: Position },
    #[error("unterminated block comment starting at {pos:?}")]
    UnterminatedComment { pos: Position },
    #[error("invalid number literal {text:?} at {pos:?}")]
    InvalidNumber { pos: Position, text: String },
}

impl LexError {
    pub fn pos(&self) -> Position {
        match self {
            LexError::UnterminatedString { pos }
            | LexError::UnterminatedComment { pos }
            | LexError::InvalidNumber { pos, .. } => *pos,
        }
    }
}
