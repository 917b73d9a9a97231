//! Handles all user-facing output for the CLI.
//!
//! Everything the CLI prints on stdout goes through here. Diagnostics go to
//! stderr through [`crate::errors::print_error`].

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use difference::{Changeset, Difference};
use serde::Serialize;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use unicode_width::UnicodeWidthStr;

use crate::{
    expand::ExpansionStep,
    platform::Platform,
    source::Unit,
    symbols::{Definition, DefinitionKind, Registry},
};

// ============================================================================
// CORE OUTPUT FUNCTIONS
// ============================================================================

/// Colour only when stdout is a terminal.
fn stdout() -> StandardStream {
    let choice = if atty::is(atty::Stream::Stdout) {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

pub fn print_json<T: Serialize>(value: &T) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prints a macro expansion trace with word-level diffs between steps.
pub fn print_trace(initial: &str, trace: &[ExpansionStep]) {
    let mut stdout = stdout();

    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true));
    println!("--- Input ---");
    let _ = stdout.reset();
    println!("{initial}");
    println!();

    for (i, step) in trace.iter().enumerate() {
        let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true));
        println!(
            "--- Step {}: {} at {} (depth {}) ---",
            i + 1,
            step.name,
            step.site,
            step.depth
        );
        let _ = stdout.reset();

        let changeset = Changeset::new(&step.before, &step.after, " ");
        print_diff(&mut stdout, &changeset.diffs);
        println!();
    }

    if trace.is_empty() {
        println!("(no macro references)");
    }
}

pub fn print_units(units: &[Arc<Unit>]) {
    if units.is_empty() {
        println!("  No units loaded.");
        return;
    }
    let rows: Vec<[String; 4]> = units
        .iter()
        .map(|unit| {
            let includes: Vec<String> = unit.included_units().map(|id| id.to_string()).collect();
            [
                unit.id.to_string(),
                unit.fingerprint.chars().take(12).collect(),
                unit.path().display().to_string(),
                includes.join(" "),
            ]
        })
        .collect();
    print_table(["unit", "sha256", "path", "includes"], &rows);
}

pub fn print_symbols(registry: &Registry) {
    if registry.is_empty() {
        println!("  No definitions found.");
        return;
    }
    let mut definitions: Vec<&Definition> = registry.iter().collect();
    definitions.sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));

    let rows: Vec<[String; 4]> = definitions
        .into_iter()
        .map(|d| [d.kind.to_string(), d.name.clone(), describe(d), d.site.location().to_string()])
        .collect();
    print_table(["kind", "name", "shape", "defined at"], &rows);
}

pub fn print_targets(platforms: &[Platform]) {
    let rows: Vec<[String; 4]> = platforms
        .iter()
        .map(|p| {
            [
                p.name.clone(),
                p.aliases.join(", "),
                format!("{} / {}", p.syscall.tag, p.ccall.tag),
                p.prelude.clone().unwrap_or_else(|| "-".into()),
            ]
        })
        .collect();
    print_table(["target", "aliases", "conventions", "prelude"], &rows);
}

/// Per-file results of `check`, then a summary line.
pub fn print_check_summary(passed: &[PathBuf], failed: &[PathBuf], root: &Path) {
    let mut stdout = stdout();
    for path in passed {
        let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)));
        print!("✓");
        let _ = stdout.reset();
        println!(" {}", relative(path, root));
    }
    for path in failed {
        let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Red)));
        print!("✗");
        let _ = stdout.reset();
        println!(" {}", relative(path, root));
    }

    println!();
    let _ = stdout.set_color(ColorSpec::new().set_bold(true));
    println!(
        "{} checked: {} passed, {} failed",
        passed.len() + failed.len(),
        passed.len(),
        failed.len()
    );
    let _ = stdout.reset();
    let _ = io::stdout().flush();
}

// ============================================================================
// PRIVATE HELPERS
// ============================================================================

fn print_diff(stdout: &mut StandardStream, diffs: &[Difference]) {
    for diff in diffs {
        match diff {
            Difference::Same(x) => {
                let _ = stdout.reset();
                print!(" {x}");
            }
            Difference::Add(x) => {
                let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)));
                print!(" +{x}");
            }
            Difference::Rem(x) => {
                let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Red)));
                print!(" -{x}");
            }
        }
    }
    let _ = stdout.reset();
    println!();
}

fn describe(definition: &Definition) -> String {
    match definition.kind {
        DefinitionKind::Constant => definition
            .value
            .map_or_else(String::new, |v| v.to_string()),
        DefinitionKind::Macro => format!("{} token(s)", definition.body.len()),
        _ => definition
            .signature
            .as_ref()
            .map_or_else(String::new, ToString::to_string),
    }
}

fn relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

/// Left-aligned columns, padded by display width.
fn print_table<const N: usize>(header: [&str; N], rows: &[[String; N]]) {
    let mut widths = header.map(|h| h.width());
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.width());
        }
    }

    let mut stdout = stdout();
    let _ = stdout.set_color(ColorSpec::new().set_bold(true));
    println!("{}", format_row(header.iter().copied(), &widths));
    let _ = stdout.reset();
    for row in rows {
        println!("{}", format_row(row.iter().map(String::as_str), &widths));
    }
}

fn format_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let mut line = String::new();
    for (cell, width) in cells.zip(widths) {
        line.push_str(cell);
        line.push_str(&" ".repeat(width.saturating_sub(cell.width()) + 2));
    }
    line.trim_end().to_string()
}
