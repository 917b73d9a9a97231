//! The stackweave command-line interface.
//!
//! This module is the entry point for all CLI commands and orchestrates the
//! library: it layers flags over the loaded configuration, runs the
//! compilation pipeline and hands results to [`output`].

use std::{
    env,
    path::{Path, PathBuf},
    process,
};

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use walkdir::WalkDir;

use crate::{
    cli::args::{Command, StackweaveArgs},
    config::CompilerConfig,
    engine::CompilationPipeline,
    errors::{print_error, CompileError, ErrorKind, Result},
    platform::Platform,
    source::FileSystem,
    syntax::render_tokens,
};

pub mod args;
pub mod output;

/// Source file extension picked up by `check`.
pub const SOURCE_EXTENSION: &str = "stk";

// ============================================================================
// MAIN ENTRY POINT
// ============================================================================

/// The main entry point for the CLI.
pub fn run() {
    let args = StackweaveArgs::parse();
    init_logging(args.verbose);

    let config = resolve_config(&args).unwrap_or_else(|e| exit_with(e));

    match args.command {
        Command::Lower { file, json } => {
            let compilation = pipeline(config).compile(&file).unwrap_or_else(|e| exit_with(e));
            if json {
                print_json_or_exit(&compilation.program);
            } else {
                print!("{}", compilation.program);
            }
        }

        Command::Expand { file } => {
            let tokens = pipeline(config).expand(&file).unwrap_or_else(|e| exit_with(e));
            println!("{}", render_tokens(&tokens));
        }

        Command::Trace { file, json } => {
            let trace = pipeline(config).trace(&file).unwrap_or_else(|e| exit_with(e));
            if json {
                print_json_or_exit(&trace.steps);
            } else {
                output::print_trace(&render_tokens(&trace.input), &trace.steps);
            }
        }

        Command::Units { file } => {
            let loaded = pipeline(config).load(&file).unwrap_or_else(|e| exit_with(e));
            output::print_units(&loaded.units);
        }

        Command::Symbols { file } => {
            let loaded = pipeline(config).load(&file).unwrap_or_else(|e| exit_with(e));
            output::print_symbols(&loaded.registry);
        }

        Command::Check { path } => {
            if !check_tree(&pipeline(config), &path) {
                process::exit(1);
            }
        }

        Command::Targets => {
            let platforms = Platform::all_builtin().unwrap_or_else(|e| exit_with(e));
            output::print_targets(&platforms);
        }
    }
}

// ============================================================================
// SETUP
// ============================================================================

/// `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let _ = tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("stackweave={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Config file (explicit or discovered), then the environment, then flags.
fn resolve_config(args: &StackweaveArgs) -> Result<CompilerConfig> {
    let mut config = match &args.config {
        Some(path) => CompilerConfig::load(path)?,
        None => {
            let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            CompilerConfig::discover(&cwd)?
        }
    };
    config.apply_env();

    if let Some(target) = &args.target {
        config.target = target.clone();
        // An explicit target replaces a descriptor file named in the config.
        config.platform_file = None;
    }
    if let Some(file) = &args.platform_file {
        config.platform_file = Some(file.clone());
    }
    if args.no_prelude {
        config.prelude = false;
    }
    if let Some(depth) = args.max_depth {
        if depth == 0 {
            return Err(CompileError::from(ErrorKind::InvalidConfig {
                reason: "--max-depth must be at least 1".into(),
            }));
        }
        config.max_expansion_depth = depth;
    }
    // Flag directories are searched before the configured ones.
    let mut include_dirs = args.include.clone();
    include_dirs.append(&mut config.include_dirs);
    config.include_dirs = include_dirs;

    Ok(config)
}

fn pipeline(config: CompilerConfig) -> CompilationPipeline<FileSystem> {
    CompilationPipeline::new(FileSystem, config).unwrap_or_else(|e| exit_with(e))
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Compiles every source file under `root`. Returns whether all passed.
fn check_tree(pipeline: &CompilationPipeline<FileSystem>, root: &Path) -> bool {
    let files: Vec<PathBuf> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION))
        .collect();

    if files.is_empty() {
        eprintln!("no .{SOURCE_EXTENSION} files found under {}", root.display());
        return false;
    }

    let mut passed = Vec::new();
    let mut failed = Vec::new();
    for file in files {
        match pipeline.compile(&file) {
            Ok(_) => passed.push(file),
            Err(e) => {
                print_error(e);
                failed.push(file);
            }
        }
    }

    output::print_check_summary(&passed, &failed, root);
    failed.is_empty()
}

fn print_json_or_exit<T: serde::Serialize>(value: &T) {
    if let Err(e) = output::print_json(value) {
        eprintln!("error: cannot serialize output: {e}");
        process::exit(1);
    }
}

fn exit_with(error: CompileError) -> ! {
    print_error(error);
    process::exit(1);
}
