//! The source table: one [`Unit`] per distinct canonical path.
//!
//! Loading a unit tokenizes it, splits its declarations and recursively
//! resolves its `include` directives before the unit itself is registered.
//! The inclusion stack detects cycles; the path cache makes repeated and
//! diamond-shaped inclusion idempotent.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::errors::{CompileError, ErrorKind, Result};
use crate::source::provider::SourceProvider;
use crate::syntax::{split_declarations, tokenize, Declaration, SourceFile, Token};

// ============================================================================
// UNITS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UnitId(pub usize);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single loaded source file. Immutable once registered.
#[derive(Debug)]
pub struct Unit {
    pub id: UnitId,
    pub file: Arc<SourceFile>,
    /// Hex SHA-256 of the source text.
    pub fingerprint: String,
    pub declarations: Vec<Declaration>,
    /// Resolved target of each `include`, keyed by declaration index.
    includes: Vec<(usize, UnitId)>,
}

impl Unit {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Units this unit includes, in source order.
    pub fn included_units(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.includes.iter().map(|(_, id)| *id)
    }

    fn include_target(&self, declaration: usize) -> Option<UnitId> {
        self.includes
            .iter()
            .find(|(index, _)| *index == declaration)
            .map(|(_, id)| *id)
    }
}

// ============================================================================
// SOURCE TABLE
// ============================================================================

pub struct SourceTable<P> {
    provider: P,
    search_paths: Vec<PathBuf>,
    units: Vec<Arc<Unit>>,
    by_path: HashMap<PathBuf, UnitId>,
    /// Canonical paths of the units currently being loaded.
    stack: Vec<PathBuf>,
}

impl<P: SourceProvider> SourceTable<P> {
    pub fn new(provider: P, search_paths: Vec<PathBuf>) -> Self {
        Self {
            provider,
            search_paths,
            units: Vec::new(),
            by_path: HashMap::new(),
            stack: Vec::new(),
        }
    }

    /// Loads a unit that is not referenced by any `include` (the main file or
    /// a platform prelude).
    pub fn load_root(&mut self, path: impl AsRef<Path>) -> Result<UnitId> {
        self.load(path.as_ref(), None)
    }

    /// Resolves an `include` directive found at `site`.
    pub fn resolve(&mut self, requested: &str, site: &Token) -> Result<UnitId> {
        self.load(Path::new(requested), Some(site))
    }

    /// Registered units, dependencies before the units that include them.
    pub fn units(&self) -> &[Arc<Unit>] {
        &self.units
    }

    pub fn unit(&self, id: UnitId) -> &Arc<Unit> {
        &self.units[id.0]
    }

    pub fn lookup(&self, path: &Path) -> Option<UnitId> {
        let canonical = self.provider.locate(path)?;
        self.by_path.get(&canonical).copied()
    }

    /// The program entry stream: top-level statements of `roots`, with the
    /// statements of each included unit spliced in at its first inclusion.
    pub fn entry_statements(&self, roots: &[UnitId]) -> Vec<Token> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for root in roots {
            self.splice(*root, &mut seen, &mut out);
        }
        out
    }

    fn splice(&self, id: UnitId, seen: &mut HashSet<UnitId>, out: &mut Vec<Token>) {
        if !seen.insert(id) {
            return;
        }
        let unit = self.unit(id);
        for (index, declaration) in unit.declarations.iter().enumerate() {
            match declaration {
                Declaration::Include { .. } => {
                    if let Some(target) = unit.include_target(index) {
                        self.splice(target, seen, out);
                    }
                }
                Declaration::Statement(token) => out.push(token.clone()),
                _ => {}
            }
        }
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    fn locate(&self, requested: &Path, site: Option<&Token>) -> Option<PathBuf> {
        if requested.is_absolute() {
            return self.provider.locate(requested);
        }

        let mut candidates = Vec::with_capacity(self.search_paths.len() + 1);
        match site.and_then(|t| t.file.path().parent()) {
            Some(dir) => candidates.push(dir.join(requested)),
            None => candidates.push(requested.to_path_buf()),
        }
        candidates.extend(self.search_paths.iter().map(|dir| dir.join(requested)));

        candidates.iter().find_map(|c| self.provider.locate(c))
    }

    fn load(&mut self, requested: &Path, site: Option<&Token>) -> Result<UnitId> {
        let path = self.locate(requested, site).ok_or_else(|| {
            let err = CompileError::new(ErrorKind::IncludeNotFound {
                path: requested.display().to_string(),
            });
            let searched: Vec<_> = self
                .search_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            let err = err.with_help(if searched.is_empty() {
                "no include directories are configured; add one with -I".to_string()
            } else {
                format!("searched next to the including file and in: {}", searched.join(", "))
            });
            match site {
                Some(token) => err.at(token),
                None => err,
            }
        })?;

        if let Some(start) = self.stack.iter().position(|p| *p == path) {
            let mut chain: Vec<String> = self.stack[start..]
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            chain.push(path.display().to_string());
            let err = CompileError::new(ErrorKind::IncludeCycle { chain })
                .with_help("each file may only be included by files it does not itself include");
            return Err(match site {
                Some(token) => err.at(token),
                None => err,
            });
        }

        if let Some(&id) = self.by_path.get(&path) {
            debug!(path = %path.display(), unit = %id, "include served from cache");
            return Ok(id);
        }

        let text = self.provider.read(&path).map_err(|e| {
            CompileError::new(ErrorKind::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        })?;
        let fingerprint = fingerprint(&text);
        let file = SourceFile::new(path.clone(), text);
        let declarations = split_declarations(tokenize(&file)?)?;

        self.stack.push(path.clone());
        let includes = self.load_includes(&declarations);
        self.stack.pop();
        let includes = includes?;

        let id = UnitId(self.units.len());
        debug!(
            path = %path.display(),
            unit = %id,
            declarations = declarations.len(),
            "registered unit"
        );
        self.units.push(Arc::new(Unit {
            id,
            file,
            fingerprint,
            declarations,
            includes,
        }));
        self.by_path.insert(path, id);
        Ok(id)
    }

    fn load_includes(&mut self, declarations: &[Declaration]) -> Result<Vec<(usize, UnitId)>> {
        let mut includes = Vec::new();
        for (index, declaration) in declarations.iter().enumerate() {
            if let Declaration::Include { path, token } = declaration {
                includes.push((index, self.resolve(path, token)?));
            }
        }
        Ok(includes)
    }
}

fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
