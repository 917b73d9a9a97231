//! Block structure of an expanded token stream.
//!
//! `while <cond> do <body> end`, `<cond> if <then> [else <else>] end` and
//! `call <name>` are grouped into nodes here; everything else stays a plain
//! token. Label and jump emission happens in the lowering pass.

use std::slice;

use crate::errors::{CompileError, ErrorKind, Result};
use crate::syntax::{Keyword, Token, TokenKind};

#[derive(Debug, Clone)]
pub enum Node {
    Token(Token),
    Call {
        keyword: Token,
        target: Token,
    },
    While {
        keyword: Token,
        condition: Vec<Node>,
        body: Vec<Node>,
    },
    If {
        keyword: Token,
        then: Vec<Node>,
        otherwise: Option<Vec<Node>>,
    },
}

/// Where a sequence is being parsed, which decides its valid terminators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    TopLevel,
    Condition,
    Body,
    Then,
}

impl Context {
    fn accepts(&self, keyword: Keyword) -> bool {
        matches!(
            (self, keyword),
            (Context::Condition, Keyword::Do)
                | (Context::Body, Keyword::End)
                | (Context::Then, Keyword::End)
                | (Context::Then, Keyword::Else)
        )
    }
}

pub fn structure(tokens: &[Token]) -> Result<Vec<Node>> {
    let mut parser = Parser {
        tokens: tokens.iter(),
    };
    let (nodes, _) = parser.sequence(Context::TopLevel)?;
    Ok(nodes)
}

struct Parser<'t> {
    tokens: slice::Iter<'t, Token>,
}

impl<'t> Parser<'t> {
    /// Parses nodes until a terminator valid in `context`, which is returned.
    fn sequence(&mut self, context: Context) -> Result<(Vec<Node>, Option<&'t Token>)> {
        let mut nodes = Vec::new();

        while let Some(token) = self.tokens.next() {
            let Some(keyword) = token.keyword() else {
                nodes.push(Node::Token(token.clone()));
                continue;
            };

            if context.accepts(keyword) {
                return Ok((nodes, Some(token)));
            }

            let node = match keyword {
                Keyword::While => self.parse_while(token)?,
                Keyword::If => self.parse_if(token)?,
                Keyword::Call => self.parse_call(token)?,
                Keyword::Do => {
                    return Err(stray(token, "`do` without a matching `while`"));
                }
                Keyword::Else => {
                    return Err(stray(token, "`else` outside of an `if` block"));
                }
                Keyword::End => {
                    return Err(stray(token, "`end` without an open block"));
                }
                _ => {
                    return Err(stray(token, "definitions are only allowed at the top level of a file"));
                }
            };
            nodes.push(node);
        }

        Ok((nodes, None))
    }

    fn parse_while(&mut self, keyword: &Token) -> Result<Node> {
        let (condition, terminator) = self.sequence(Context::Condition)?;
        let Some(do_token) = terminator else {
            return Err(unclosed(keyword, "while"));
        };
        if condition.is_empty() {
            return Err(CompileError::new(ErrorKind::UnexpectedToken {
                expected: "a loop condition".into(),
                found: "`do`".into(),
            })
            .at(do_token)
            .with_help("a `while` loop needs a condition between `while` and `do`"));
        }

        let (body, terminator) = self.sequence(Context::Body)?;
        if terminator.is_none() {
            return Err(unclosed(do_token, "do"));
        }

        Ok(Node::While {
            keyword: keyword.clone(),
            condition,
            body,
        })
    }

    fn parse_if(&mut self, keyword: &Token) -> Result<Node> {
        let (then, terminator) = self.sequence(Context::Then)?;
        let Some(terminator) = terminator else {
            return Err(unclosed(keyword, "if"));
        };
        if then.is_empty() {
            return Err(CompileError::new(ErrorKind::UnexpectedToken {
                expected: "an `if` body".into(),
                found: format!("`{}`", terminator.text),
            })
            .at(terminator)
            .with_help("an `if` needs at least one statement before `else` or `end`"));
        }

        let otherwise = if terminator.is_keyword(Keyword::Else) {
            let (otherwise, closing) = self.sequence(Context::Body)?;
            if closing.is_none() {
                return Err(unclosed(terminator, "else"));
            }
            Some(otherwise)
        } else {
            None
        };

        Ok(Node::If {
            keyword: keyword.clone(),
            then,
            otherwise,
        })
    }

    fn parse_call(&mut self, keyword: &Token) -> Result<Node> {
        match self.tokens.next() {
            Some(target) if matches!(target.kind, TokenKind::Word(_)) => Ok(Node::Call {
                keyword: keyword.clone(),
                target: target.clone(),
            }),
            Some(other) => Err(CompileError::new(ErrorKind::UnexpectedToken {
                expected: "a name to call".into(),
                found: format!("`{}`", other.text),
            })
            .at(other)),
            None => Err(CompileError::new(ErrorKind::UnexpectedToken {
                expected: "a name to call".into(),
                found: "end of input".into(),
            })
            .at(keyword)),
        }
    }
}

fn stray(token: &Token, help: &str) -> CompileError {
    CompileError::new(ErrorKind::UnexpectedToken {
        expected: "a statement".into(),
        found: format!("`{}`", token.text),
    })
    .at(token)
    .with_help(help)
}

fn unclosed(opener: &Token, block: &str) -> CompileError {
    CompileError::new(ErrorKind::UnclosedBlock {
        block: block.to_string(),
    })
    .at(opener)
    .with_help("close the block with `end`")
}
