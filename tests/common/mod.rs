//! Shared helpers for the integration tests.
//!
//! Pipelines built here read from an in-memory tree that carries the real
//! bundled preludes under `/std`, so tests exercise the shipped syscall
//! tables without touching the filesystem.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use stackweave::{source::InMemory, CompilationPipeline, CompilerConfig};

pub const STD_DIR: &str = "/std";

const PRELUDES: &[(&str, &str)] = &[
    (
        "/std/platform/x86_64-linux.stk",
        include_str!("../../std/platform/x86_64-linux.stk"),
    ),
    (
        "/std/platform/arm64-linux.stk",
        include_str!("../../std/platform/arm64-linux.stk"),
    ),
    (
        "/std/platform/arm64-macos.stk",
        include_str!("../../std/platform/arm64-macos.stk"),
    ),
];

/// An in-memory tree with the bundled preludes plus `files`.
pub fn tree(files: &[(&str, &str)]) -> InMemory {
    let mut tree = InMemory::new();
    for (path, text) in PRELUDES.iter().chain(files) {
        tree.insert(path, *text);
    }
    tree
}

pub fn config(target: &str) -> CompilerConfig {
    CompilerConfig {
        target: target.to_string(),
        std_dir: Some(PathBuf::from(STD_DIR)),
        ..CompilerConfig::default()
    }
}

pub fn pipeline(files: &[(&str, &str)], target: &str) -> CompilationPipeline<InMemory> {
    CompilationPipeline::new(tree(files), config(target)).expect("target is bundled")
}

/// Path of an on-disk fixture.
pub fn fixture(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(relative)
}
