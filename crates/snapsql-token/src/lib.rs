//! Token, keyword, and lexical-error types shared by the snapsql tokenizer
//! (`snapsql-core`) and every later compiler stage. Kept in its own crate
//! so the parser and renderer can depend on the token vocabulary without
//! pulling in the rest of the compiler.

mod errors;
mod keyword;
mod token;

pub use errors::LexError;
pub use keyword::{Keyword, KeywordClass};
pub use token::{
    DirectiveKind, DirectivePayload, Operator, Position, Punctuation, Token, TokenId, TokenKind,
    TokenSpan,
};
