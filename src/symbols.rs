//! Symbol registry: every named compile-time construct of a compilation.
//!
//! Definitions from all loaded units are collected before anything is
//! expanded, so a use site may textually precede its definition. Names are
//! unique per [`DefinitionKind`]; the same name in two kinds is allowed but
//! resolution picks the kind that comes first in [`RESOLUTION_ORDER`].

use std::{collections::HashMap, fmt, sync::Arc};

use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::{CompileError, ErrorKind, Result};
use crate::lower::intrinsic::Intrinsic;
use crate::source::Unit;
use crate::syntax::{Declaration, FunctionModifier, Keyword, Token};
use crate::types::{DataType, Signature};

// ============================================================================
// DEFINITIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
    Macro,
    Constant,
    InlineFunction,
    Function,
    Foreign,
}

/// Order in which a bare word is resolved against the registry.
pub const RESOLUTION_ORDER: [DefinitionKind; 5] = [
    DefinitionKind::Macro,
    DefinitionKind::Constant,
    DefinitionKind::InlineFunction,
    DefinitionKind::Function,
    DefinitionKind::Foreign,
];

impl DefinitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefinitionKind::Macro => "macro",
            DefinitionKind::Constant => "constant",
            DefinitionKind::InlineFunction => "inline function",
            DefinitionKind::Function => "function",
            DefinitionKind::Foreign => "foreign symbol",
        }
    }
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named macro, function, foreign declaration or constant.
#[derive(Debug, Clone)]
pub struct Definition {
    pub kind: DefinitionKind,
    pub name: String,
    /// Present for the three function kinds.
    pub signature: Option<Signature>,
    /// Body tokens for macros and non-foreign functions.
    pub body: Vec<Token>,
    /// Present for constants.
    pub value: Option<i64>,
    /// The defining name token.
    pub site: Token,
}

impl Definition {
    pub fn arity(&self) -> usize {
        self.signature.as_ref().map_or(0, Signature::arity)
    }

    pub fn returns(&self) -> DataType {
        self.signature.as_ref().map_or(DataType::Void, |s| s.returns)
    }

    fn from_declaration(declaration: &Declaration) -> Option<Self> {
        let definition = match declaration {
            Declaration::Macro {
                name,
                name_token,
                body,
            } => Definition {
                kind: DefinitionKind::Macro,
                name: name.clone(),
                signature: None,
                body: body.clone(),
                value: None,
                site: name_token.clone(),
            },
            Declaration::Function(func) => Definition {
                kind: match func.modifier {
                    FunctionModifier::None => DefinitionKind::Function,
                    FunctionModifier::Inline => DefinitionKind::InlineFunction,
                    FunctionModifier::Extern => DefinitionKind::Foreign,
                },
                name: func.name.clone(),
                signature: Some(func.signature.clone()),
                body: func.body.clone(),
                value: None,
                site: func.name_token.clone(),
            },
            Declaration::Constant {
                name,
                name_token,
                value,
            } => Definition {
                kind: DefinitionKind::Constant,
                name: name.clone(),
                signature: None,
                body: Vec::new(),
                value: Some(*value),
                site: name_token.clone(),
            },
            Declaration::Include { .. } | Declaration::Statement(_) => return None,
        };
        Some(definition)
    }
}

/// True for names the language itself owns.
pub fn is_reserved(name: &str) -> bool {
    Keyword::from_word(name).is_some()
        || Intrinsic::from_word(name).is_some()
        || DataType::from_name(name).is_some()
        || matches!(name, "true" | "false")
}

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Debug, Default)]
pub struct Registry {
    definitions: Vec<Definition>,
    index: HashMap<(DefinitionKind, String), usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the definitions of every unit, in registration order.
    pub fn collect(units: &[Arc<Unit>]) -> Result<Self> {
        let mut registry = Registry::new();
        for unit in units {
            for definition in unit.declarations.iter().filter_map(Definition::from_declaration) {
                registry.define(definition)?;
            }
        }
        debug!(definitions = registry.len(), "collected definitions");
        Ok(registry)
    }

    pub fn define(&mut self, definition: Definition) -> Result<()> {
        if is_reserved(&definition.name) {
            return Err(CompileError::new(ErrorKind::ReservedName {
                name: definition.name.clone(),
            })
            .at(&definition.site)
            .with_help("pick a name that is not a keyword, intrinsic word or type name"));
        }

        let key = (definition.kind, definition.name.clone());
        if let Some(&existing) = self.index.get(&key) {
            let first = &self.definitions[existing].site;
            return Err(CompileError::new(ErrorKind::DuplicateDefinition {
                kind: definition.kind,
                name: definition.name.clone(),
                first: first.location().to_string(),
            })
            .at(&definition.site)
            .with_related(first, "first defined here"));
        }

        for other in RESOLUTION_ORDER {
            if other != definition.kind && self.index.contains_key(&(other, definition.name.clone())) {
                warn!(
                    name = %definition.name,
                    kind = %definition.kind,
                    shadowed_by = %other,
                    at = %definition.site.location(),
                    "name is defined in more than one kind"
                );
            }
        }

        self.index.insert(key, self.definitions.len());
        self.definitions.push(definition);
        Ok(())
    }

    pub fn get(&self, kind: DefinitionKind, name: &str) -> Option<&Definition> {
        self.index
            .get(&(kind, name.to_string()))
            .map(|&i| &self.definitions[i])
    }

    pub fn lookup(&self, kind: DefinitionKind, name: &str) -> Result<&Definition> {
        self.get(kind, name).ok_or_else(|| {
            CompileError::new(ErrorKind::UndefinedSymbol {
                name: name.to_string(),
            })
        })
    }

    pub fn is_macro(&self, name: &str) -> bool {
        self.get(DefinitionKind::Macro, name).is_some()
    }

    /// Resolves a bare word: macro, constant, inline function, function,
    /// foreign declaration, in that order.
    pub fn resolve(&self, name: &str) -> Option<&Definition> {
        RESOLUTION_ORDER
            .iter()
            .find_map(|kind| self.get(*kind, name))
    }

    /// Definitions in the order they were collected.
    pub fn iter(&self) -> impl Iterator<Item = &Definition> {
        self.definitions.iter()
    }

    pub fn of_kind(&self, kind: DefinitionKind) -> impl Iterator<Item = &Definition> {
        self.definitions.iter().filter(move |d| d.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
