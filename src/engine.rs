//! The compilation pipeline.
//!
//! Compilation runs in two phases. Loading registers every unit reachable
//! from the main file (and the target prelude) and collects all definitions.
//! Expansion then lowers the entry stream and the functions against the
//! complete registry. A compilation either yields a whole [`Program`] or the
//! first error.

use std::{path::Path, sync::Arc};

use tracing::{debug, info};

use crate::{
    config::CompilerConfig,
    errors::Result,
    expand::{ExpansionStep, MacroExpander},
    lower::{Lowerer, Program},
    platform::Platform,
    source::{SourceProvider, SourceTable, Unit},
    symbols::Registry,
    syntax::Token,
};

// ============================================================================
// PIPELINE OUTPUTS
// ============================================================================

/// Everything the loading phase produces.
pub struct Loaded {
    /// Units in registration order.
    pub units: Vec<Arc<Unit>>,
    pub registry: Registry,
    /// Top-level statements of the prelude and the main file.
    pub entry: Vec<Token>,
}

/// The entry stream before and after macro expansion, with every step.
pub struct ExpansionTrace {
    pub input: Vec<Token>,
    pub output: Vec<Token>,
    pub steps: Vec<ExpansionStep>,
}

/// A successful compilation.
#[derive(Debug)]
pub struct Compilation {
    pub units: Vec<Arc<Unit>>,
    pub registry: Registry,
    pub program: Program,
}

// ============================================================================
// COMPILATION PIPELINE
// ============================================================================

pub struct CompilationPipeline<P> {
    provider: P,
    config: CompilerConfig,
    platform: Platform,
}

impl<P: SourceProvider> CompilationPipeline<P> {
    /// Resolves the configured platform up front, so target errors surface
    /// before any file is read.
    pub fn new(provider: P, config: CompilerConfig) -> Result<Self> {
        let platform = config.platform()?;
        Ok(Self::with_platform(provider, config, platform))
    }

    pub fn with_platform(provider: P, config: CompilerConfig, platform: Platform) -> Self {
        Self {
            provider,
            config,
            platform,
        }
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Phase one: units, definitions and the entry stream.
    pub fn load(&self, path: &Path) -> Result<Loaded> {
        let mut table = SourceTable::new(&self.provider, self.config.search_paths());

        // Step 1: the prelude comes first so its statements lead the entry stream.
        let mut roots = Vec::with_capacity(2);
        if self.config.prelude {
            if let Some(prelude) = &self.platform.prelude {
                debug!(prelude = %prelude, "loading platform prelude");
                roots.push(table.load_root(prelude)?);
            }
        }

        // Step 2: the main file and everything it includes.
        roots.push(table.load_root(path)?);

        // Step 3: collect every definition before anything is expanded.
        let registry = Registry::collect(table.units())?;
        let entry = table.entry_statements(&roots);

        debug!(
            units = table.units().len(),
            definitions = registry.len(),
            statements = entry.len(),
            "loaded sources"
        );
        Ok(Loaded {
            units: table.units().to_vec(),
            registry,
            entry,
        })
    }

    /// Both phases.
    pub fn compile(&self, path: &Path) -> Result<Compilation> {
        let Loaded {
            units,
            registry,
            entry,
            ..
        } = self.load(path)?;

        let program = Lowerer::new(&registry, &self.platform, self.config.max_expansion_depth)
            .lower_program(&entry)?;

        info!(
            path = %path.display(),
            platform = %self.platform.name,
            instructions = program.instructions().count(),
            "compiled"
        );
        Ok(Compilation {
            units,
            registry,
            program,
        })
    }

    /// The macro-expanded entry stream, without lowering.
    pub fn expand(&self, path: &Path) -> Result<Vec<Token>> {
        let loaded = self.load(path)?;
        MacroExpander::new(&loaded.registry, self.config.max_expansion_depth).expand(&loaded.entry)
    }

    /// Like [`CompilationPipeline::expand`], also returning every substitution.
    pub fn trace(&self, path: &Path) -> Result<ExpansionTrace> {
        let loaded = self.load(path)?;
        let mut expander =
            MacroExpander::new(&loaded.registry, self.config.max_expansion_depth).with_trace();
        let output = expander.expand(&loaded.entry)?;
        Ok(ExpansionTrace {
            input: loaded.entry,
            output,
            steps: expander.take_trace(),
        })
    }
}
