//! Command-line arguments and subcommands for the stackweave CLI.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "stackweave",
    version,
    about = "Include resolution, macro and inline expansion, and foreign-call lowering."
)]
pub struct StackweaveArgs {
    /// Target platform name or alias (see `stackweave targets`).
    #[arg(long, global = true)]
    pub target: Option<String>,

    /// Include directory, searched after the including file's directory.
    #[arg(short = 'I', long = "include", value_name = "DIR", global = true)]
    pub include: Vec<PathBuf>,

    /// Configuration file. Defaults to `stackweave.yaml` in the working directory.
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Custom platform descriptor (YAML).
    #[arg(long, value_name = "FILE", global = true)]
    pub platform_file: Option<PathBuf>,

    /// Do not load the target's prelude.
    #[arg(long, global = true)]
    pub no_prelude: bool,

    /// Nesting limit for macro and inline expansion.
    #[arg(long, value_name = "N", global = true)]
    pub max_depth: Option<usize>,

    /// More log output; repeat for more detail.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Full pipeline: load, expand, bind foreign calls, and print the program.
    Lower {
        /// The source file to compile.
        #[arg(required = true)]
        file: PathBuf,
        /// Print the program as JSON instead of a listing.
        #[arg(long)]
        json: bool,
    },
    /// Print the macro-expanded entry stream.
    Expand {
        /// The source file to expand.
        #[arg(required = true)]
        file: PathBuf,
    },
    /// Show a stepwise macro expansion trace with diffs.
    Trace {
        /// The source file to trace.
        #[arg(required = true)]
        file: PathBuf,
        /// Print the steps as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List the units loaded for a file, with fingerprints.
    Units {
        /// The root source file.
        #[arg(required = true)]
        file: PathBuf,
    },
    /// List every definition visible to a file.
    Symbols {
        /// The root source file.
        #[arg(required = true)]
        file: PathBuf,
    },
    /// Compile every `.stk` file under a directory.
    Check {
        /// The directory to search.
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// List the built-in target platforms.
    Targets,
}
