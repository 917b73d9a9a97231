//! Minimal front end: tokenizer and top-level declaration splitter.
//!
//! This layer is purely syntactic. It produces the token and declaration
//! streams that the source table registers and the expanders consume.

pub mod declarations;
pub mod lexer;
pub mod token;

pub use declarations::{split_declarations, Declaration, FunctionDecl, FunctionModifier};
pub use lexer::tokenize;
pub use token::{render_tokens, Keyword, SourceFile, Span, Token, TokenKind};
