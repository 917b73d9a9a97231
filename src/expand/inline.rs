//! Inline function expansion.
//!
//! An inline function body is lowered once into a [`Template`]. Every call
//! site receives its own instance of the template, in which each label gets
//! the instance number appended. Two sites therefore never share a jump
//! target, and neither shares one with the code around it.

use std::collections::HashMap;

use tracing::debug;

use crate::errors::{CompileError, ErrorKind, Result};
use crate::expand::ExpansionFrame;
use crate::lower::instruction::{Instruction, Label};
use crate::symbols::Definition;
use crate::syntax::Token;

/// A lowered inline body with its local labels not yet made unique.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    body: Vec<Instruction>,
}

impl Template {
    pub fn new(name: impl Into<String>, body: Vec<Instruction>) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }

    /// A copy of the body with every label renamed for `instance`.
    pub fn instantiate(&self, instance: usize) -> Vec<Instruction> {
        let rename = |label: &Label| label.instance(instance);
        self.body
            .iter()
            .map(|instruction| match instruction {
                Instruction::Label(label) => Instruction::Label(rename(label)),
                Instruction::Jump(label) => Instruction::Jump(rename(label)),
                Instruction::JumpIfFalse(label) => Instruction::JumpIfFalse(rename(label)),
                other => other.clone(),
            })
            .collect()
    }
}

pub struct InlineExpander {
    templates: HashMap<String, Template>,
    frame: ExpansionFrame,
    max_depth: usize,
    instances: usize,
}

impl InlineExpander {
    pub fn new(max_depth: usize) -> Self {
        Self {
            templates: HashMap::new(),
            frame: ExpansionFrame::root(),
            max_depth,
            instances: 0,
        }
    }

    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn store(&mut self, template: Template) {
        debug!(name = %template.name, instructions = template.body.len(), "built inline template");
        self.templates.insert(template.name.clone(), template);
    }

    /// Marks `name` as being built and returns the frame to restore with
    /// [`InlineExpander::leave`].
    pub fn enter(&mut self, name: &str, site: &Token) -> Result<ExpansionFrame> {
        let inner = self.frame.enter(name, self.max_depth).map_err(|chain| {
            CompileError::new(ErrorKind::InlineRecursionLimitExceeded {
                name: name.to_string(),
                chain,
            })
            .at(site)
            .with_help("inline functions are copied into their callers; use a plain `func` for recursion")
        })?;
        Ok(std::mem::replace(&mut self.frame, inner))
    }

    pub fn leave(&mut self, previous: ExpansionFrame) {
        self.frame = previous;
    }

    /// A fresh instance number, never handed out twice in one compilation.
    pub fn next_instance(&mut self) -> usize {
        let instance = self.instances;
        self.instances += 1;
        instance
    }

    pub fn instantiate(&mut self, name: &str) -> Option<Vec<Instruction>> {
        let instance = self.next_instance();
        self.templates.get(name).map(|t| t.instantiate(instance))
    }
}

/// Fails with `ArityMismatch` when fewer than `callee.arity()` values are
/// known to be on the stack at `site`.
pub fn check_arity(callee: &Definition, available: usize, site: &Token) -> Result<()> {
    let expected = callee.arity();
    if available >= expected {
        return Ok(());
    }
    Err(CompileError::new(ErrorKind::ArityMismatch {
        callee: callee.name.clone(),
        expected,
        actual: available,
    })
    .at(site)
    .with_related(&callee.site, "declared here")
    .with_help(format!(
        "`{}` takes {}; only values pushed since the last label or jump are counted",
        callee.name,
        callee
            .signature
            .as_ref()
            .map_or_else(|| "no arguments".to_string(), |s| s.to_string())
    )))
}
