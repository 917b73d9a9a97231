//! stackweave: the expansion and foreign-call binding core of a small
//! concatenative language.
//!
//! A compilation loads a root file and its includes into a
//! [`source::SourceTable`], collects every definition into a
//! [`symbols::Registry`], and then lowers the entry stream: macros are
//! substituted, inline functions copied with fresh labels, and calls to
//! foreign symbols bound to the registers of the selected [`platform`].
//! [`engine::CompilationPipeline`] runs the whole thing.

pub use crate::errors::{print_error, CompileError, ErrorKind, Result};

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod expand;
pub mod lower;
pub mod platform;
pub mod source;
pub mod symbols;
pub mod syntax;
pub mod types;

pub use crate::config::CompilerConfig;
pub use crate::engine::{Compilation, CompilationPipeline};
pub use crate::lower::{ForeignCall, Instruction, Program};
pub use crate::platform::Platform;
