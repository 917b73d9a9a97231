//! Macro expansion.
//!
//! A macro reference is a bare word naming a macro, or `call` followed by
//! one. Each reference is replaced by the macro body, and the replacement is
//! rescanned, so the output contains no macro references at all. Expansion is
//! leftmost first; with tracing enabled every substitution is recorded as an
//! [`ExpansionStep`] holding the whole stream before and after it.

use serde::Serialize;
use tracing::trace;

use crate::errors::{CompileError, ErrorKind, Result, SourceLocation};
use crate::expand::ExpansionFrame;
use crate::symbols::{DefinitionKind, Registry};
use crate::syntax::{Keyword, Token};

/// One macro substitution, for the `trace` command.
#[derive(Debug, Clone, Serialize)]
pub struct ExpansionStep {
    pub name: String,
    pub site: SourceLocation,
    /// Nesting depth of the substitution, 1 for references in the input.
    pub depth: usize,
    pub before: String,
    pub after: String,
}

pub struct MacroExpander<'r> {
    registry: &'r Registry,
    max_depth: usize,
    steps: Option<Vec<ExpansionStep>>,
}

type Pending = (Token, ExpansionFrame);

impl<'r> MacroExpander<'r> {
    pub fn new(registry: &'r Registry, max_depth: usize) -> Self {
        Self {
            registry,
            max_depth,
            steps: None,
        }
    }

    /// Records every substitution from now on.
    pub fn with_trace(mut self) -> Self {
        self.steps = Some(Vec::new());
        self
    }

    pub fn take_trace(&mut self) -> Vec<ExpansionStep> {
        self.steps.as_mut().map(std::mem::take).unwrap_or_default()
    }

    pub fn expand(&mut self, tokens: &[Token]) -> Result<Vec<Token>> {
        let root = ExpansionFrame::root();
        let mut pending: Vec<Pending> = tokens
            .iter()
            .rev()
            .map(|t| (t.clone(), root.clone()))
            .collect();
        let mut out = Vec::with_capacity(tokens.len());

        while let Some((token, frame)) = pending.pop() {
            let Some((name, consumed)) = self.reference(&token, &mut pending) else {
                out.push(token);
                continue;
            };
            let Some(definition) = self.registry.get(DefinitionKind::Macro, &name) else {
                out.push(token);
                continue;
            };

            let inner = frame.enter(&name, self.max_depth).map_err(|chain| {
                CompileError::new(ErrorKind::MacroRecursionLimitExceeded {
                    name: name.clone(),
                    chain,
                })
                .at(&token)
                .with_help(format!(
                    "macros are substituted textually; a macro may not expand to itself (limit {} levels)",
                    self.max_depth
                ))
            })?;
            trace!(name = %name, depth = inner.depth(), at = %token.location(), "expanding macro");

            if let Some(steps) = self.steps.as_mut() {
                steps.push(ExpansionStep {
                    name: name.clone(),
                    site: token.location(),
                    depth: inner.depth(),
                    before: snapshot(&out, &consumed, &pending),
                    after: snapshot(&out, &definition.body, &pending),
                });
            }

            pending.extend(
                definition
                    .body
                    .iter()
                    .rev()
                    .map(|t| (t.clone(), inner.clone())),
            );
        }

        Ok(out)
    }

    /// The macro named by `token`, plus the tokens that make up the
    /// reference. A `call` consumes the following word.
    fn reference(&self, token: &Token, pending: &mut Vec<Pending>) -> Option<(String, Vec<Token>)> {
        if token.is_keyword(Keyword::Call) {
            let target = pending.last()?.0.word()?.to_string();
            if !self.registry.is_macro(&target) {
                return None;
            }
            let (word, _) = pending.pop()?;
            return Some((target, vec![token.clone(), word]));
        }
        let word = token.word()?;
        self.registry
            .is_macro(word)
            .then(|| (word.to_string(), vec![token.clone()]))
    }
}

fn snapshot(done: &[Token], middle: &[Token], pending: &[Pending]) -> String {
    done.iter()
        .chain(middle)
        .chain(pending.iter().rev().map(|(t, _)| t))
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{InMemory, SourceTable};
    use crate::syntax::render_tokens;

    fn expand_with(definitions: &str, limit: usize, trace: bool) -> Result<(String, Vec<ExpansionStep>)> {
        let files = InMemory::new().with_file("/main.stk", definitions);
        let mut table = SourceTable::new(files, Vec::new());
        let root = table.load_root("/main.stk")?;
        let registry = Registry::collect(table.units())?;
        let mut expander = MacroExpander::new(&registry, limit);
        if trace {
            expander = expander.with_trace();
        }
        let expanded = expander.expand(&table.entry_statements(&[root]))?;
        Ok((render_tokens(&expanded), expander.take_trace()))
    }

    fn expand(source: &str) -> Result<String> {
        expand_with(source, 128, false).map(|(text, _)| text)
    }

    #[test]
    fn substitutes_bodies() {
        assert_eq!(expand("macro TWO 2 end TWO TWO +").unwrap(), "2 2 +");
    }

    #[test]
    fn nested_and_called_macros_expand_fully() {
        let source = "macro ONE 1 end macro INC ONE + end 0 INC call INC";
        assert_eq!(expand(source).unwrap(), "0 1 + 1 +");
    }

    #[test]
    fn use_may_precede_definition() {
        assert_eq!(expand("LATE macro LATE 7 end").unwrap(), "7");
    }

    #[test]
    fn call_of_a_non_macro_is_left_alone() {
        assert_eq!(expand("func void f[] end call f").unwrap(), "call f");
    }

    #[test]
    fn direct_recursion_is_rejected() {
        let err = expand("macro A A end A").unwrap_err();
        match err.kind() {
            ErrorKind::MacroRecursionLimitExceeded { name, chain } => {
                assert_eq!(name, "A");
                assert_eq!(chain, &["A", "A"]);
            }
            other => panic!("expected recursion error, got {other:?}"),
        }
    }

    #[test]
    fn mutual_recursion_is_rejected() {
        let err = expand("macro A 1 B end macro B A end A").unwrap_err();
        assert!(
            matches!(err.kind(), ErrorKind::MacroRecursionLimitExceeded { chain, .. } if chain == &["A", "B", "A"])
        );
    }

    #[test]
    fn depth_limit_applies_without_cycles() {
        let source = "macro A B end macro B C end macro C 1 end A";
        assert!(expand_with(source, 3, false).is_ok());
        let err = expand_with(source, 2, false).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MacroRecursionLimitExceeded { .. }));
    }

    #[test]
    fn expansion_reaches_a_fixed_point() {
        let files = InMemory::new().with_file(
            "/main.stk",
            "macro SQ copy * end macro QUAD SQ SQ end 3 QUAD while 1 do QUAD end",
        );
        let mut table = SourceTable::new(files, Vec::new());
        let root = table.load_root("/main.stk").unwrap();
        let registry = Registry::collect(table.units()).unwrap();
        let mut expander = MacroExpander::new(&registry, 128);
        let once = expander.expand(&table.entry_statements(&[root])).unwrap();
        let twice = expander.expand(&once).unwrap();
        assert_eq!(once, twice);
        assert!(once.iter().all(|t| !t.word().is_some_and(|w| registry.is_macro(w))));
    }

    #[test]
    fn trace_records_each_substitution() {
        let (_, steps) = expand_with("macro ONE 1 end macro TWO ONE ONE + end TWO drop", 128, true).unwrap();
        let befores: Vec<_> = steps.iter().map(|s| s.before.as_str()).collect();
        assert_eq!(befores, ["TWO drop", "ONE ONE + drop", "1 ONE + drop"]);
        assert_eq!(steps[2].after, "1 1 + drop");
        assert_eq!(steps[1].depth, 2);
    }
}
