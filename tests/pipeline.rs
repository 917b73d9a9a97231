//! End-to-end compilations through `CompilationPipeline`, using in-memory
//! sources and the bundled platform preludes.

mod common;

use std::path::Path;

use common::{config, pipeline, tree};
use stackweave::{
    lower::{ArgumentSlot, ForeignTarget},
    syntax::render_tokens,
    CompilationPipeline, ErrorKind, Instruction, Platform,
};

fn main_file(source: &str) -> Vec<(&'static str, String)> {
    vec![("/app/main.stk", source.to_string())]
}

fn files<'a>(entries: &'a [(&'static str, String)]) -> Vec<(&'static str, &'a str)> {
    entries.iter().map(|(p, t)| (*p, t.as_str())).collect()
}

// ============================================================================
// FOREIGN CALLS THROUGH THE PRELUDE
// ============================================================================

#[test]
fn prelude_turns_write_into_a_linux_syscall() {
    let sources = main_file("1 \"hi\" 2 call write drop\n0 call exit\n");
    let compilation = pipeline(&files(&sources), "x86_64-linux")
        .compile(Path::new("/app/main.stk"))
        .unwrap();

    let calls: Vec<_> = compilation.program.foreign_calls().collect();
    assert_eq!(calls.len(), 2);

    let write = calls[0];
    assert_eq!(
        write.target,
        ForeignTarget::Syscall {
            number: 1,
            register: "rax".into()
        }
    );
    let registers: Vec<_> = write.arguments.iter().map(|a| a.slot.clone()).collect();
    assert_eq!(
        registers,
        ["rdi", "rsi", "rdx"].map(|r| ArgumentSlot::Register(r.into()))
    );
    assert!(write.discard_result);

    let exit = calls[1];
    assert_eq!(
        exit.target,
        ForeignTarget::Syscall {
            number: 60,
            register: "rax".into()
        }
    );
    assert!(!exit.discard_result);
}

#[test]
fn the_same_source_binds_differently_per_target() {
    let sources = main_file("1 \"hi\" 2 call write drop");
    let mac = pipeline(&files(&sources), "arm64-macos")
        .compile(Path::new("/app/main.stk"))
        .unwrap();
    let write = mac.program.foreign_calls().next().unwrap();
    assert_eq!(
        write.target,
        ForeignTarget::Syscall {
            number: 4,
            register: "X16".into()
        }
    );
    assert_eq!(write.arguments[0].slot, ArgumentSlot::Register("X0".into()));
    assert_eq!(mac.program.target, "arm64-macos");
}

#[test]
fn user_declared_externals_are_c_calls() {
    let sources = main_file("extern func int puts[ptr]\n\"hi\" call puts drop");
    let compilation = pipeline(&files(&sources), "x86_64-linux")
        .compile(Path::new("/app/main.stk"))
        .unwrap();
    let call = compilation.program.foreign_calls().next().unwrap();
    assert_eq!(call.target, ForeignTarget::External { linkage: "puts".into() });
    assert_eq!(call.convention, "sysv64");
}

#[test]
fn redeclaring_a_prelude_symbol_is_a_duplicate() {
    let sources = main_file("extern func void exit[int]\n0 call exit");
    let err = pipeline(&files(&sources), "x86_64-linux")
        .compile(Path::new("/app/main.stk"))
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::DuplicateDefinition { name, .. } if name == "exit"
    ));
}

// ============================================================================
// INCLUDES
// ============================================================================

#[test]
fn diamond_includes_register_each_unit_once() {
    let compilation = pipeline(
        &[
            ("/app/main.stk", "include \"left.stk\" include \"right.stk\" LEFT RIGHT +"),
            ("/app/left.stk", "include \"shared.stk\" macro LEFT ONE end"),
            ("/app/right.stk", "include \"shared.stk\" macro RIGHT ONE ONE + end"),
            ("/app/shared.stk", "macro ONE 1 end"),
        ],
        "x86_64-linux",
    )
    .compile(Path::new("/app/main.stk"))
    .unwrap();

    // prelude + four sources
    assert_eq!(compilation.units.len(), 5);
    let shared = compilation
        .units
        .iter()
        .filter(|u| u.path() == Path::new("/app/shared.stk"))
        .count();
    assert_eq!(shared, 1);
    assert!(!compilation.program.entry.is_empty());
}

#[test]
fn definitions_are_visible_before_their_include() {
    let mut config = config("x86_64-linux");
    config.prelude = false;
    let files = tree(&[
        ("/app/main.stk", "GREETING drop include \"defs.stk\""),
        ("/app/defs.stk", "macro GREETING 42 end"),
    ]);
    let pipeline = CompilationPipeline::new(files, config).unwrap();
    let expanded = pipeline.expand(Path::new("/app/main.stk")).unwrap();
    assert_eq!(render_tokens(&expanded), "42 drop");
}

#[test]
fn include_dirs_are_searched_after_the_local_directory() {
    let mut config = config("x86_64-linux");
    config.include_dirs = vec!["/vendor".into()];
    let files = tree(&[
        ("/app/main.stk", "include \"util.stk\" VALUE"),
        ("/app/util.stk", "macro VALUE 1 end"),
        ("/vendor/util.stk", "macro VALUE 2 end"),
        ("/app/other.stk", "include \"only_vendor.stk\""),
        ("/vendor/only_vendor.stk", "macro V 3 end"),
    ]);
    let pipeline = CompilationPipeline::new(files, config).unwrap();

    let expanded = pipeline.expand(Path::new("/app/main.stk")).unwrap();
    assert_eq!(render_tokens(&expanded[expanded.len() - 1..]), "1");

    let loaded = pipeline.load(Path::new("/app/other.stk")).unwrap();
    assert!(loaded
        .units
        .iter()
        .any(|u| u.path() == Path::new("/vendor/only_vendor.stk")));
}

#[test]
fn include_cycles_report_the_chain() {
    let err = pipeline(
        &[
            ("/app/a.stk", "include \"b.stk\""),
            ("/app/b.stk", "include \"a.stk\""),
        ],
        "x86_64-linux",
    )
    .compile(Path::new("/app/a.stk"))
    .unwrap_err();
    match err.kind() {
        ErrorKind::IncludeCycle { chain } => {
            assert_eq!(chain, &["/app/a.stk", "/app/b.stk", "/app/a.stk"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    let location = err.location().expect("cycle points at the include");
    assert_eq!(location.path, Path::new("/app/b.stk"));
}

#[test]
fn missing_include_points_at_the_directive() {
    let err = pipeline(&[("/app/main.stk", "1 drop\ninclude \"nope.stk\"")], "x86_64-linux")
        .compile(Path::new("/app/main.stk"))
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::IncludeNotFound { path } if path == "nope.stk"));
    assert_eq!(err.location().map(|l| l.line), Some(2));
}

// ============================================================================
// EXPANSION
// ============================================================================

#[test]
fn two_two_plus() {
    let sources = main_file("macro TWO 2 end TWO TWO +");
    let pipeline = pipeline(&files(&sources), "x86_64-linux");
    let trace = pipeline.trace(Path::new("/app/main.stk")).unwrap();
    assert_eq!(render_tokens(&trace.output), "2 2 +");
    assert_eq!(trace.steps.len(), 2);
    assert_eq!(trace.steps[0].name, "TWO");
    assert_eq!(trace.steps[0].after, "2 TWO +");
}

#[test]
fn expansion_reaches_a_fixed_point() {
    let sources = main_file("macro A B B end macro B C end macro C 7 end A");
    let pipeline = pipeline(&files(&sources), "x86_64-linux");
    let once = pipeline.expand(Path::new("/app/main.stk")).unwrap();
    assert_eq!(render_tokens(&once), "7 7");
}

#[test]
fn mutual_macro_recursion_terminates_with_an_error() {
    let sources = main_file("macro PING PONG end macro PONG PING end PING");
    let err = pipeline(&files(&sources), "x86_64-linux")
        .compile(Path::new("/app/main.stk"))
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::MacroRecursionLimitExceeded { chain, .. } if chain == &["PING", "PONG", "PING"]
    ));
}

#[test]
fn inline_loops_stay_hygienic_across_units() {
    let compilation = pipeline(
        &[
            (
                "/app/lib.stk",
                "inline func void countdown[int] while copy 0 > do dec end drop end",
            ),
            ("/app/main.stk", "include \"lib.stk\" 3 countdown 5 countdown"),
        ],
        "x86_64-linux",
    )
    .compile(Path::new("/app/main.stk"))
    .unwrap();

    let labels = compilation.program.defined_labels();
    let unique: std::collections::HashSet<_> = labels.iter().collect();
    assert_eq!(labels.len(), unique.len());
    assert_eq!(labels.len(), 4);
    assert!(!compilation
        .program
        .instructions()
        .any(|i| matches!(i, Instruction::Call { .. })));
}

#[test]
fn inline_loops_stay_hygienic_inside_functions() {
    let compilation = pipeline(
        &[
            (
                "/app/lib.stk",
                "inline func void countdown[int] while copy 0 > do dec end drop end",
            ),
            (
                "/app/main.stk",
                "include \"lib.stk\"\n\
                 inline func void twice[int] copy countdown countdown end\n\
                 func void run[] 3 countdown 5 countdown 7 twice end\n\
                 call run",
            ),
        ],
        "x86_64-linux",
    )
    .compile(Path::new("/app/main.stk"))
    .unwrap();

    let run = &compilation.program.functions[0];
    assert_eq!(run.name, "run");
    let labels: Vec<_> = run
        .body
        .iter()
        .filter_map(|i| match i {
            Instruction::Label(label) => Some(label),
            _ => None,
        })
        .collect();
    let unique: std::collections::HashSet<_> = labels.iter().collect();
    assert_eq!(labels.len(), 8);
    assert_eq!(unique.len(), 8);
}

// ============================================================================
// PLATFORMS
// ============================================================================

#[test]
fn unknown_targets_fail_before_loading() {
    let err = CompilationPipeline::new(tree(&[]), config("pdp11-unix"))
        .err()
        .expect("target is not bundled");
    assert!(matches!(err.kind(), ErrorKind::UnknownTarget { .. }));
}

#[test]
fn custom_descriptors_drive_binding() {
    let platform = Platform::from_yaml(
        r#"
name: toy
syscall:
  tag: trap
  number_register: r7
  argument_registers: [r0, r1]
  return_register: r0
ccall:
  tag: toycall
  argument_registers: [a0]
  return_register: a0
  stack_slot_size: 4
"#,
        "toy.yaml",
    )
    .unwrap();
    let mut config = config("x86_64-linux");
    config.prelude = false;
    let files = tree(&[(
        "/app/main.stk",
        "const SYS_beep 3 extern func void beep[int] extern func int add[int,int] 1 call beep 1 2 call add",
    )]);
    let compilation = CompilationPipeline::with_platform(files, config, platform)
        .compile(Path::new("/app/main.stk"))
        .unwrap();

    let calls: Vec<_> = compilation.program.foreign_calls().collect();
    assert_eq!(
        calls[0].target,
        ForeignTarget::Syscall {
            number: 3,
            register: "r7".into()
        }
    );
    assert_eq!(calls[1].arguments[1].slot, ArgumentSlot::Stack { offset: 0 });
    assert_eq!(compilation.program.target, "toy");
}

#[test]
fn raw_syscalls_are_limited_by_the_descriptor() {
    let platform = Platform::from_yaml(
        r#"
name: toy
syscall:
  tag: trap
  number_register: r7
  argument_registers: [r0, r1]
  return_register: r0
ccall:
  tag: toycall
  argument_registers: [a0]
  return_register: a0
  stack_slot_size: 4
"#,
        "toy.yaml",
    )
    .unwrap();
    let mut config = config("x86_64-linux");
    config.prelude = false;

    let files = tree(&[("/app/main.stk", "1 2 3 syscall3 drop")]);
    let compilation = CompilationPipeline::with_platform(files, config.clone(), platform.clone())
        .compile(Path::new("/app/main.stk"))
        .unwrap();
    let call = compilation.program.foreign_calls().next().unwrap();
    assert_eq!(
        call.target,
        ForeignTarget::Syscall {
            number: 3,
            register: "r7".into()
        }
    );
    assert_eq!(call.convention, "trap");

    let files = tree(&[("/app/main.stk", "1 2 3 4 syscall4")]);
    let err = CompilationPipeline::with_platform(files, config, platform)
        .compile(Path::new("/app/main.stk"))
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::ArityMismatch { callee, expected: 2, actual: 3 } if callee == "syscall4"
    ));
}
