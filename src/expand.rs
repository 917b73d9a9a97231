//! Compile-time expansion: macros and inline functions.
//!
//! Both expanders guard recursion the same way. Every substitution carries
//! an [`ExpansionFrame`], the chain of definitions currently being expanded
//! at that point. Entering a name that is already on the chain, or growing
//! the chain past the depth limit, aborts the expansion with the chain as
//! evidence.

pub mod inline;
pub mod macros;

pub use inline::{check_arity, InlineExpander, Template};
pub use macros::{ExpansionStep, MacroExpander};

use im::{HashSet, Vector};

/// Default limit on nested expansions.
pub const MAX_EXPANSION_DEPTH: usize = 128;

/// The active expansion chain at one point of an expansion.
///
/// Frames are persistent: entering a definition yields a new frame sharing
/// structure with its parent, so every pending token can keep its own frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionFrame {
    chain: Vector<String>,
    active: HashSet<String>,
}

impl ExpansionFrame {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.active.contains(name)
    }

    pub fn chain(&self) -> Vec<String> {
        self.chain.iter().cloned().collect()
    }

    /// The frame inside `name`. On failure returns the offending chain,
    /// starting at the first occurrence of `name` for cycles.
    pub fn enter(&self, name: &str, max_depth: usize) -> Result<Self, Vec<String>> {
        if self.contains(name) {
            let start = self.chain.index_of(&name.to_string()).unwrap_or(0);
            let mut chain: Vec<String> = self.chain.iter().skip(start).cloned().collect();
            chain.push(name.to_string());
            return Err(chain);
        }
        if self.depth() >= max_depth {
            let mut chain = self.chain();
            chain.push(name.to_string());
            return Err(chain);
        }

        let mut child = self.clone();
        child.chain.push_back(name.to_string());
        child.active.insert(name.to_string());
        Ok(child)
    }
}
