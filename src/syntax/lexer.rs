//! Tokenizer built on the pest grammar in `grammar.pest`.
//!
//! Purely lexical: keywords are recognized here, but whether a word names a
//! macro, function or intrinsic is decided much later.

use std::sync::Arc;

use pest::{error::InputLocation, iterators::Pair, Parser};
use pest_derive::Parser;

use crate::errors::{CompileError, ErrorKind, Result};
use crate::syntax::token::{Keyword, SourceFile, Span, Token, TokenKind};

#[derive(Parser)]
#[grammar = "syntax/grammar.pest"]
struct TokenParser;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Splits a source file into tokens.
pub fn tokenize(file: &Arc<SourceFile>) -> Result<Vec<Token>> {
    let text = file.text();
    let mut pairs = TokenParser::parse(Rule::program, text).map_err(|e| {
        let offset = match e.location {
            InputLocation::Pos(pos) => pos,
            InputLocation::Span((start, _)) => start,
        };
        let found = text[offset..]
            .split_whitespace()
            .next()
            .unwrap_or("end of file")
            .to_string();
        let token = Token {
            kind: TokenKind::Word(found.clone()),
            text: found.clone(),
            span: Span::new(offset, offset + found.len().min(text.len() - offset)),
            index: 0,
            file: Arc::clone(file),
        };
        let help = if found.starts_with('"') {
            "string literals must be closed with `\"` before the end of the file"
        } else if found.starts_with('\'') {
            "character literals hold exactly one character, e.g. 'a' or '\\n'"
        } else {
            "check the literal syntax near this point"
        };
        CompileError::new(ErrorKind::UnexpectedToken {
            expected: "a literal or word".into(),
            found,
        })
        .at(&token)
        .with_help(help)
    })?;

    let Some(program) = pairs.next() else {
        return Ok(Vec::new());
    };

    let mut tokens = Vec::new();
    for pair in program.into_inner() {
        if pair.as_rule() == Rule::EOI {
            continue;
        }
        let index = tokens.len();
        tokens.push(build_token(pair, index, file)?);
    }
    Ok(tokens)
}

// ============================================================================
// TOKEN BUILDERS
// ============================================================================

fn build_token(pair: Pair<Rule>, index: usize, file: &Arc<SourceFile>) -> Result<Token> {
    let span = Span::new(pair.as_span().start(), pair.as_span().end());
    let text = pair.as_str().to_string();

    let kind = match pair.as_rule() {
        Rule::integer => match parse_integer(&text) {
            Some(value) => TokenKind::Integer(value),
            None => {
                let token = Token {
                    kind: TokenKind::Word(text.clone()),
                    text: text.clone(),
                    span,
                    index,
                    file: Arc::clone(file),
                };
                return Err(CompileError::new(ErrorKind::IntegerOutOfRange { literal: text })
                    .at(&token)
                    .with_help(format!(
                        "decimal literals range from {} to {}; hex literals take at most 16 digits",
                        i64::MIN,
                        i64::MAX
                    )));
            }
        },
        Rule::string => {
            let body = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            TokenKind::String(unescape(body))
        }
        Rule::character => {
            let body = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            let ch = unescape(body).chars().next().unwrap_or('\0');
            TokenKind::Character(ch as i64)
        }
        _ => classify_word(&text),
    };

    Ok(Token {
        kind,
        text,
        span,
        index,
        file: Arc::clone(file),
    })
}

fn classify_word(word: &str) -> TokenKind {
    match word {
        "true" => TokenKind::Bool(true),
        "false" => TokenKind::Bool(false),
        _ => match Keyword::from_word(word) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Word(word.to_string()),
        },
    }
}

/// `None` when the literal overflows. Hex literals are 64-bit patterns, so
/// `0xFFFFFFFFFFFFFFFF` is `-1`.
fn parse_integer(text: &str) -> Option<i64> {
    match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok().map(|bits| bits as i64),
        None => text.parse::<i64>().ok(),
    }
}

fn unescape(body: &str) -> String {
    let mut result = String::with_capacity(body.len());
    let mut chars = body.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('0') => result.push('\0'),
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let file = SourceFile::new("/test.stk", source);
        tokenize(&file).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn splits_literals_words_and_keywords() {
        assert_eq!(
            kinds("macro TWO 2 end TWO TWO +"),
            vec![
                TokenKind::Keyword(Keyword::Macro),
                TokenKind::Word("TWO".into()),
                TokenKind::Integer(2),
                TokenKind::Keyword(Keyword::End),
                TokenKind::Word("TWO".into()),
                TokenKind::Word("TWO".into()),
                TokenKind::Word("+".into()),
            ]
        );
    }

    #[test]
    fn strings_chars_and_escapes() {
        assert_eq!(
            kinds(r#""hi\n" 'a' '\n' "say \"x\"""#),
            vec![
                TokenKind::String("hi\n".into()),
                TokenKind::Character('a' as i64),
                TokenKind::Character('\n' as i64),
                TokenKind::String("say \"x\"".into()),
            ]
        );
    }

    #[test]
    fn numbers_booleans_and_signature_words() {
        assert_eq!(
            kinds("-3 0x1F 12ab true write[int,ptr]"),
            vec![
                TokenKind::Integer(-3),
                TokenKind::Integer(31),
                TokenKind::Word("12ab".into()),
                TokenKind::Bool(true),
                TokenKind::Word("write[int,ptr]".into()),
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("1 // two three\n4"),
            vec![TokenKind::Integer(1), TokenKind::Integer(4)]
        );
    }

    #[test]
    fn token_indices_and_spans_are_recorded() {
        let file = SourceFile::new("/test.stk", "a  bb\nccc");
        let tokens = tokenize(&file).unwrap();
        assert_eq!(tokens[2].index, 2);
        assert_eq!(tokens[1].span, Span::new(3, 5));
        assert_eq!(tokens[2].location().line, 2);
    }

    #[test]
    fn integer_limits_are_exact() {
        assert_eq!(
            kinds("9223372036854775807 -9223372036854775808 0xFFFFFFFFFFFFFFFF"),
            vec![
                TokenKind::Integer(i64::MAX),
                TokenKind::Integer(i64::MIN),
                TokenKind::Integer(-1),
            ]
        );
    }

    #[test]
    fn oversized_decimal_is_rejected_at_the_literal() {
        let file = SourceFile::new("/test.stk", "1 99999999999999999999 drop");
        let err = tokenize(&file).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::IntegerOutOfRange { literal } if literal == "99999999999999999999"
        ));
        assert_eq!(err.location().map(|l| l.column), Some(3));
    }

    #[test]
    fn oversized_hex_is_rejected() {
        let file = SourceFile::new("/test.stk", "0xFFFFFFFFFFFFFFFFFF");
        let err = tokenize(&file).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::IntegerOutOfRange { .. }));
        assert!(tokenize(&SourceFile::new("/test.stk", "-9223372036854775809")).is_err());
    }

    #[test]
    fn unterminated_string_is_reported() {
        let file = SourceFile::new("/test.stk", "1 \"open");
        let err = tokenize(&file).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnexpectedToken { .. }));
    }
}
