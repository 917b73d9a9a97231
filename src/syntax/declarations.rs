//! Splits a unit's token stream into top-level declarations.
//!
//! Definitions (`macro`, `func`, `inline func`, `extern func`, `const`) and
//! `include` directives are only recognized at the top level. Every other
//! token is a statement of the program entry stream, in source order.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{CompileError, ErrorKind, Result};
use crate::syntax::token::{Keyword, Token, TokenKind};
use crate::types::{DataType, Signature};

static SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\[([A-Za-z_,\s]*)\]$").expect("signature pattern is valid")
});

// ============================================================================
// DECLARATION MODEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionModifier {
    None,
    Inline,
    Extern,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub modifier: FunctionModifier,
    pub name: String,
    /// The `name[...]` token, used for diagnostics.
    pub name_token: Token,
    pub signature: Signature,
    /// Empty for `extern` declarations.
    pub body: Vec<Token>,
}

#[derive(Debug, Clone)]
pub enum Declaration {
    Include {
        path: String,
        token: Token,
    },
    Macro {
        name: String,
        name_token: Token,
        body: Vec<Token>,
    },
    Function(FunctionDecl),
    Constant {
        name: String,
        name_token: Token,
        value: i64,
    },
    Statement(Token),
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Groups tokens into declarations.
pub fn split_declarations(tokens: Vec<Token>) -> Result<Vec<Declaration>> {
    let mut cursor = Cursor {
        tokens: tokens.into_iter(),
    };
    let mut declarations = Vec::new();

    while let Some(token) = cursor.next() {
        let declaration = match token.keyword() {
            Some(Keyword::Include) => parse_include(&mut cursor, token)?,
            Some(Keyword::Macro) => parse_macro(&mut cursor, token)?,
            Some(Keyword::Const) => parse_constant(&mut cursor, token)?,
            Some(Keyword::Inline) => {
                let func = cursor.expect_keyword(Keyword::Func, &token)?;
                parse_function(&mut cursor, func, FunctionModifier::Inline)?
            }
            Some(Keyword::Extern) => {
                let func = cursor.expect_keyword(Keyword::Func, &token)?;
                parse_function(&mut cursor, func, FunctionModifier::Extern)?
            }
            Some(Keyword::Func) => parse_function(&mut cursor, token, FunctionModifier::None)?,
            _ => Declaration::Statement(token),
        };
        declarations.push(declaration);
    }

    Ok(declarations)
}

/// Parses a `name[t1,t2]` header word into a name and parameter tags.
pub fn parse_signature_word(token: &Token) -> Result<(String, Vec<DataType>)> {
    let malformed = || {
        CompileError::new(ErrorKind::MalformedSignature {
            text: token.text.clone(),
        })
        .at(token)
        .with_help("signatures are written as one word: `name[int,ptr]`")
    };

    let TokenKind::Word(text) = &token.kind else {
        return Err(malformed());
    };
    let captures = SIGNATURE.captures(text).ok_or_else(malformed)?;
    let name = captures[1].to_string();

    let mut params = Vec::new();
    for part in captures[2].split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match DataType::from_name(part) {
            Some(DataType::Void) | None => {
                return Err(malformed().with_help(format!(
                    "`{part}` is not a parameter type; use int, ptr or bool"
                )))
            }
            Some(ty) => params.push(ty),
        }
    }
    Ok((name, params))
}

// ============================================================================
// DECLARATION PARSERS
// ============================================================================

struct Cursor {
    tokens: std::vec::IntoIter<Token>,
}

impl Cursor {
    fn next(&mut self) -> Option<Token> {
        self.tokens.next()
    }

    fn expect(&mut self, what: &str, after: &Token) -> Result<Token> {
        self.next().ok_or_else(|| {
            CompileError::new(ErrorKind::UnexpectedToken {
                expected: what.to_string(),
                found: "end of file".into(),
            })
            .at(after)
        })
    }

    fn expect_keyword(&mut self, keyword: Keyword, after: &Token) -> Result<Token> {
        let token = self.expect(&format!("`{keyword}`"), after)?;
        if token.is_keyword(keyword) {
            Ok(token)
        } else {
            Err(unexpected(&format!("`{keyword}`"), &token))
        }
    }

    fn expect_name(&mut self, what: &str, after: &Token) -> Result<Token> {
        let token = self.expect(what, after)?;
        match token.kind {
            TokenKind::Word(_) => Ok(token),
            _ => Err(unexpected(what, &token)),
        }
    }

    /// Collects a definition body up to its matching `end`.
    fn body(&mut self, opener: &Token, name: &str) -> Result<Vec<Token>> {
        let mut body = Vec::new();
        let mut depth = 0usize;

        while let Some(token) = self.next() {
            match token.keyword() {
                Some(Keyword::End) if depth == 0 => return Ok(body),
                Some(Keyword::End) => depth -= 1,
                Some(keyword) if keyword.opens_block() => depth += 1,
                Some(keyword) if keyword.starts_declaration() => {
                    return Err(unexpected("a statement", &token).with_help(format!(
                        "definitions are only allowed at the top level; is `{name}` missing its `end`?"
                    )));
                }
                _ => {}
            }
            body.push(token);
        }

        Err(CompileError::new(ErrorKind::UnclosedBlock {
            block: format!("{} {name}", opener.text),
        })
        .at(opener)
        .with_help("close the definition with `end`"))
    }
}

fn unexpected(expected: &str, found: &Token) -> CompileError {
    CompileError::new(ErrorKind::UnexpectedToken {
        expected: expected.to_string(),
        found: format!("`{}`", found.text),
    })
    .at(found)
}

fn parse_include(cursor: &mut Cursor, keyword: Token) -> Result<Declaration> {
    let token = cursor.expect("an include path string", &keyword)?;
    match &token.kind {
        TokenKind::String(path) => Ok(Declaration::Include {
            path: path.clone(),
            token,
        }),
        _ => Err(unexpected("an include path string", &token)
            .with_help("include paths are string literals: include \"std/io.stk\"")),
    }
}

fn parse_macro(cursor: &mut Cursor, keyword: Token) -> Result<Declaration> {
    let name_token = cursor.expect_name("a macro name", &keyword)?;
    let name = name_token.text.clone();
    let body = cursor.body(&keyword, &name)?;
    Ok(Declaration::Macro {
        name,
        name_token,
        body,
    })
}

fn parse_constant(cursor: &mut Cursor, keyword: Token) -> Result<Declaration> {
    let name_token = cursor.expect_name("a constant name", &keyword)?;
    let value_token = cursor.expect("a constant value", &name_token)?;
    let value = match value_token.kind {
        TokenKind::Integer(value) | TokenKind::Character(value) => value,
        _ => {
            return Err(unexpected("an integer or character literal", &value_token))
        }
    };
    Ok(Declaration::Constant {
        name: name_token.text.clone(),
        name_token,
        value,
    })
}

fn parse_function(
    cursor: &mut Cursor,
    keyword: Token,
    modifier: FunctionModifier,
) -> Result<Declaration> {
    let return_token = cursor.expect("a return type", &keyword)?;
    let returns = return_token
        .word()
        .and_then(DataType::from_name)
        .ok_or_else(|| {
            unexpected("a return type (int, ptr, bool or void)", &return_token)
        })?;

    let name_token = cursor.expect("a function signature", &return_token)?;
    let (name, params) = parse_signature_word(&name_token)?;

    let body = match modifier {
        FunctionModifier::Extern => Vec::new(),
        _ => cursor.body(&keyword, &name)?,
    };

    Ok(Declaration::Function(FunctionDecl {
        modifier,
        name,
        name_token,
        signature: Signature::new(params, returns),
        body,
    }))
}
