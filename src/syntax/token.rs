//! Token model shared by every pipeline stage.
//!
//! Tokens own a handle to the [`SourceFile`] they were lexed from, so any
//! stage can turn a token back into a `path:line:column` location or a miette
//! label without threading the unit table around.

use std::{fmt, path::Path, path::PathBuf, sync::Arc};

use miette::{NamedSource, SourceSpan};
use serde::{Deserialize, Serialize};

use crate::errors::{SourceArc, SourceLocation};

// ============================================================================
// SPANS AND SOURCE FILES
// ============================================================================

/// Byte range inside a single source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Span> for SourceSpan {
    fn from(span: Span) -> Self {
        SourceSpan::new(span.start.into(), span.len().max(1))
    }
}

/// A loaded source file: its canonical path plus the text used for diagnostics.
#[derive(Debug)]
pub struct SourceFile {
    path: PathBuf,
    named: SourceArc,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Arc<Self> {
        let path = path.into();
        let named = Arc::new(NamedSource::new(path.display().to_string(), text.into()));
        Arc::new(Self { path, named })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        self.named.inner()
    }

    pub fn named_source(&self) -> SourceArc {
        Arc::clone(&self.named)
    }

    /// One-based line and column of a byte offset.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let text = self.text();
        let offset = offset.min(text.len());
        let before = &text[..offset];
        let line = before.matches('\n').count() + 1;
        let column = match before.rfind('\n') {
            Some(newline) => before[newline + 1..].chars().count() + 1,
            None => before.chars().count() + 1,
        };
        (line, column)
    }
}

// ============================================================================
// TOKENS
// ============================================================================

/// Reserved words of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Keyword {
    Include,
    Macro,
    Inline,
    Extern,
    Func,
    Call,
    While,
    Do,
    If,
    Else,
    End,
    Const,
}

impl Keyword {
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Include => "include",
            Keyword::Macro => "macro",
            Keyword::Inline => "inline",
            Keyword::Extern => "extern",
            Keyword::Func => "func",
            Keyword::Call => "call",
            Keyword::While => "while",
            Keyword::Do => "do",
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::End => "end",
            Keyword::Const => "const",
        }
    }

    pub fn from_word(word: &str) -> Option<Self> {
        let keyword = match word {
            "include" => Keyword::Include,
            "macro" => Keyword::Macro,
            "inline" => Keyword::Inline,
            "extern" => Keyword::Extern,
            "func" => Keyword::Func,
            "call" => Keyword::Call,
            "while" => Keyword::While,
            "do" => Keyword::Do,
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "end" => Keyword::End,
            "const" => Keyword::Const,
            _ => return None,
        };
        Some(keyword)
    }

    /// Keywords that open a block closed by `end`.
    pub fn opens_block(&self) -> bool {
        matches!(self, Keyword::Do | Keyword::If)
    }

    /// Keywords that start a top-level declaration.
    pub fn starts_declaration(&self) -> bool {
        matches!(
            self,
            Keyword::Include
                | Keyword::Macro
                | Keyword::Inline
                | Keyword::Extern
                | Keyword::Func
                | Keyword::Const
        )
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    Integer(i64),
    /// Character literals are integers carrying their code point.
    Character(i64),
    String(String),
    Bool(bool),
    Keyword(Keyword),
    Word(String),
}

/// A lexical token with its origin.
#[derive(Clone)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw text as written in the source.
    pub text: String,
    pub span: Span,
    /// Position of the token inside its unit's token stream.
    pub index: usize,
    pub file: Arc<SourceFile>,
}

impl Token {
    pub fn keyword(&self) -> Option<Keyword> {
        match self.kind {
            TokenKind::Keyword(keyword) => Some(keyword),
            _ => None,
        }
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.keyword() == Some(keyword)
    }

    pub fn word(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Word(word) => Some(word),
            _ => None,
        }
    }

    pub fn is_word(&self, word: &str) -> bool {
        self.word() == Some(word)
    }

    pub fn location(&self) -> SourceLocation {
        let (line, column) = self.file.line_col(self.span.start);
        SourceLocation {
            path: self.file.path().to_path_buf(),
            token: self.index,
            span: self.span,
            line,
            column,
        }
    }
}

impl PartialEq for Token {
    /// Tokens compare by kind only, so expanded streams can be compared
    /// against freshly lexed ones regardless of where their tokens came from.
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?} @ {})", self.text, self.location())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Renders a token stream back into space separated source text.
pub fn render_tokens(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
