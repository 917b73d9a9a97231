//! Lowering of expanded token streams to instructions.
//!
//! Every body (the program entry stream, each function, each inline
//! template) goes through the same three steps: macro expansion, block
//! structuring, and emission. Emission resolves words against the registry,
//! instantiates inline templates, binds foreign calls and turns `while` and
//! `if` blocks into labels and jumps.

pub mod control_flow;
pub mod foreign;
pub mod instruction;
pub mod intrinsic;
pub mod stack;

pub use instruction::{
    ArgumentBinding, ArgumentSlot, ForeignCall, ForeignTarget, Instruction, Label, LoweredFunction,
    Program,
};

use tracing::debug;

use crate::errors::{CompileError, ErrorKind, Result};
use crate::expand::{check_arity, InlineExpander, MacroExpander, Template};
use crate::platform::Platform;
use crate::symbols::{Definition, DefinitionKind, Registry};
use crate::syntax::{Token, TokenKind};
use crate::types::Signature;

use control_flow::{structure, Node};
use foreign::ForeignBinder;
use intrinsic::Intrinsic;
use stack::StackTracker;

// ============================================================================
// BODY BUILDER
// ============================================================================

/// Instructions of one body under construction.
struct Body {
    scope: String,
    blocks: usize,
    out: Vec<Instruction>,
    stack: StackTracker,
}

impl Body {
    fn new(scope: &str, params: usize) -> Self {
        Self {
            scope: scope.to_string(),
            blocks: 0,
            out: Vec::new(),
            stack: StackTracker::with_params(params),
        }
    }

    /// `main.while0`, `main.if1`, ...
    fn block_label(&mut self, kind: &str) -> Label {
        let label = Label::new(format!("{}.{kind}{}", self.scope, self.blocks));
        self.blocks += 1;
        label
    }

    fn push(&mut self, instruction: Instruction) {
        if instruction.is_boundary() {
            self.stack.boundary();
        }
        self.out.push(instruction);
    }
}

// ============================================================================
// LOWERER
// ============================================================================

pub struct Lowerer<'a> {
    registry: &'a Registry,
    platform: &'a Platform,
    macros: MacroExpander<'a>,
    inline: InlineExpander,
    binder: ForeignBinder<'a>,
}

impl<'a> Lowerer<'a> {
    pub fn new(registry: &'a Registry, platform: &'a Platform, max_depth: usize) -> Self {
        Self {
            registry,
            platform,
            macros: MacroExpander::new(registry, max_depth),
            inline: InlineExpander::new(max_depth),
            binder: ForeignBinder::new(platform, registry),
        }
    }

    /// Lowers the entry stream and every non-inline function. Inline
    /// functions that are never called are still lowered once so their
    /// errors surface.
    pub fn lower_program(mut self, entry: &[Token]) -> Result<Program> {
        let registry = self.registry;

        let entry = self.lower_body(entry, "main", 0)?;

        let mut functions = Vec::new();
        for definition in registry.of_kind(DefinitionKind::Function) {
            let mut body = self.lower_body(
                &definition.body,
                &format!("fn.{}", definition.name),
                definition.arity(),
            )?;
            body.push(Instruction::Return);
            functions.push(LoweredFunction {
                name: definition.name.clone(),
                signature: definition
                    .signature
                    .clone()
                    .unwrap_or_else(|| Signature::new(Vec::new(), definition.returns())),
                body,
            });
        }

        for definition in registry.of_kind(DefinitionKind::InlineFunction) {
            if self.inline.template(&definition.name).is_none() {
                let template = self.build_template(definition, &definition.site)?;
                self.inline.store(template);
            }
        }

        debug!(
            platform = %self.platform.name,
            entry = entry.len(),
            functions = functions.len(),
            "lowered program"
        );
        Ok(Program {
            target: self.platform.name.clone(),
            entry,
            functions,
        })
    }

    fn lower_body(&mut self, tokens: &[Token], scope: &str, params: usize) -> Result<Vec<Instruction>> {
        let expanded = self.macros.expand(tokens)?;
        let nodes = structure(&expanded)?;
        let mut body = Body::new(scope, params);
        self.emit(&nodes, &mut body)?;
        Ok(body.out)
    }

    fn emit(&mut self, nodes: &[Node], body: &mut Body) -> Result<()> {
        for node in nodes {
            match node {
                Node::Token(token) => self.emit_token(token, body)?,
                Node::Call { target, .. } => self.emit_call(target, body)?,
                Node::While {
                    condition,
                    body: inner,
                    ..
                } => {
                    let start = body.block_label("while");
                    let end = start.child("end");
                    body.push(Instruction::Label(start.clone()));
                    self.emit(condition, body)?;
                    body.push(Instruction::JumpIfFalse(end.clone()));
                    self.emit(inner, body)?;
                    body.push(Instruction::Jump(start));
                    body.push(Instruction::Label(end));
                }
                Node::If { then, otherwise, .. } => {
                    let block = body.block_label("if");
                    let end = block.child("end");
                    match otherwise {
                        None => {
                            body.push(Instruction::JumpIfFalse(end.clone()));
                            self.emit(then, body)?;
                        }
                        Some(otherwise) => {
                            let alternative = block.child("else");
                            body.push(Instruction::JumpIfFalse(alternative.clone()));
                            self.emit(then, body)?;
                            body.push(Instruction::Jump(end.clone()));
                            body.push(Instruction::Label(alternative));
                            self.emit(otherwise, body)?;
                        }
                    }
                    body.push(Instruction::Label(end));
                }
            }
        }
        Ok(())
    }

    fn emit_token(&mut self, token: &Token, body: &mut Body) -> Result<()> {
        let instruction = match &token.kind {
            TokenKind::Integer(value) | TokenKind::Character(value) => Instruction::PushInt(*value),
            TokenKind::Bool(value) => Instruction::PushBool(*value),
            TokenKind::String(value) => Instruction::PushStr(value.clone()),
            TokenKind::Keyword(_) => {
                return Err(CompileError::new(ErrorKind::UnexpectedToken {
                    expected: "a statement".into(),
                    found: format!("`{}`", token.text),
                })
                .at(token))
            }
            TokenKind::Word(word) => {
                if let Some(intrinsic) = Intrinsic::from_word(word) {
                    return self.emit_intrinsic(intrinsic, token, body);
                }
                let registry = self.registry;
                return match registry.resolve(word) {
                    Some(definition) if definition.kind == DefinitionKind::Constant => {
                        body.push(Instruction::PushInt(definition.value.unwrap_or_default()));
                        body.stack.push(Some(token.location()));
                        Ok(())
                    }
                    Some(definition) => self.emit_invocation(definition, token, body),
                    None => Err(CompileError::new(ErrorKind::UndefinedSymbol {
                        name: word.clone(),
                    })
                    .at(token)),
                };
            }
        };
        body.push(instruction);
        body.stack.push(Some(token.location()));
        Ok(())
    }

    /// `call <name>`: an inline function, function or foreign declaration.
    fn emit_call(&mut self, target: &Token, body: &mut Body) -> Result<()> {
        let registry = self.registry;
        let name = target.word().unwrap_or(&target.text);
        let callee = [
            DefinitionKind::InlineFunction,
            DefinitionKind::Function,
            DefinitionKind::Foreign,
        ]
        .into_iter()
        .find_map(|kind| registry.get(kind, name));

        match callee {
            Some(definition) => self.emit_invocation(definition, target, body),
            None => Err(self.binder.unknown_symbol(target)),
        }
    }

    fn emit_invocation(&mut self, callee: &'a Definition, site: &Token, body: &mut Body) -> Result<()> {
        check_arity(callee, body.stack.available(), site)?;
        let arity = callee.arity();
        let returns = callee.returns();

        match callee.kind {
            DefinitionKind::InlineFunction => {
                let copy = self.inline_copy(callee, site)?;
                // Labels inside the copy are local to it; the caller sees
                // only the signature's effect.
                body.out.extend(copy);
                body.stack
                    .apply(arity, returns.stack_slots(), Some(site.location()));
            }
            DefinitionKind::Function => {
                body.push(Instruction::Call {
                    function: callee.name.clone(),
                    arguments: arity,
                    returns,
                });
                body.stack
                    .apply(arity, returns.stack_slots(), Some(site.location()));
            }
            DefinitionKind::Foreign => {
                let origins = body.stack.take(arity);
                let call = self.binder.bind(callee, site, origins)?;
                body.push(Instruction::ForeignCall(call));
                // The result register is always pushed, even for void.
                body.stack.push(Some(site.location()));
            }
            DefinitionKind::Macro | DefinitionKind::Constant => {
                return Err(self.binder.unknown_symbol(site));
            }
        }
        Ok(())
    }

    fn emit_intrinsic(&mut self, intrinsic: Intrinsic, token: &Token, body: &mut Body) -> Result<()> {
        match intrinsic {
            Intrinsic::Drop => {
                if let Some(Instruction::ForeignCall(call)) = body.out.last_mut() {
                    if !call.discard_result {
                        call.discard_result = true;
                        body.stack.pop();
                        return Ok(());
                    }
                }
                body.push(Instruction::Drop);
                body.stack.apply(1, 0, None);
            }
            Intrinsic::Stack(op) => {
                body.push(Instruction::Stack(op));
                body.stack.shuffle(op);
            }
            Intrinsic::Syscall(values) => self.emit_raw_syscall(values, token, body)?,
            other => {
                let (pops, pushes) = other.effect();
                if let Some(instruction) = other.instruction() {
                    body.push(instruction);
                }
                if pops > 0 || pushes > 0 {
                    body.stack.apply(pops, pushes, Some(token.location()));
                }
            }
        }
        Ok(())
    }

    /// `syscallN`: the top value is the number, the `N - 1` below it are the
    /// arguments. A number pushed by the previous instruction is folded into
    /// the call.
    fn emit_raw_syscall(&mut self, values: usize, token: &Token, body: &mut Body) -> Result<()> {
        let available = body.stack.available();
        if available < values {
            return Err(CompileError::new(ErrorKind::ArityMismatch {
                callee: token.text.clone(),
                expected: values,
                actual: available,
            })
            .at(token)
            .with_help(format!(
                "`{}` takes {} arguments and then the syscall number; only values pushed since the last label or jump are counted",
                token.text,
                values - 1
            )));
        }

        let number = match body.out.last() {
            Some(Instruction::PushInt(number)) => Some(*number),
            _ => None,
        };
        if number.is_some() {
            body.out.pop();
        }
        let mut origins = body.stack.take(values);
        origins.pop();

        let call = self.binder.bind_raw_syscall(token, number, origins)?;
        body.push(Instruction::ForeignCall(call));
        body.stack.push(Some(token.location()));
        Ok(())
    }

    fn inline_copy(&mut self, callee: &Definition, site: &Token) -> Result<Vec<Instruction>> {
        if self.inline.template(&callee.name).is_none() {
            let template = self.build_template(callee, site)?;
            self.inline.store(template);
        }
        self.inline.instantiate(&callee.name).ok_or_else(|| {
            CompileError::new(ErrorKind::UndefinedSymbol {
                name: callee.name.clone(),
            })
            .at(site)
        })
    }

    fn build_template(&mut self, callee: &Definition, site: &Token) -> Result<Template> {
        let previous = self.inline.enter(&callee.name, site)?;
        let body = self.lower_body(&callee.body, &format!("inline.{}", callee.name), callee.arity());
        self.inline.leave(previous);
        Ok(Template::new(callee.name.clone(), body?))
    }
}

/// Lowers `entry` and the registry's functions for `platform`.
pub fn lower_program(
    registry: &Registry,
    platform: &Platform,
    entry: &[Token],
    max_depth: usize,
) -> Result<Program> {
    Lowerer::new(registry, platform, max_depth).lower_program(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::instruction::{ArithmeticOp, CompareOp, StackOp};
    use crate::source::{InMemory, SourceTable};
    use crate::types::DataType;

    fn lower_for(target: &str, source: &str) -> Result<Program> {
        let files = InMemory::new().with_file("/main.stk", source);
        let mut table = SourceTable::new(files, Vec::new());
        let root = table.load_root("/main.stk")?;
        let registry = Registry::collect(table.units())?;
        let platform = Platform::builtin(target)?;
        lower_program(&registry, &platform, &table.entry_statements(&[root]), 128)
    }

    fn lower(source: &str) -> Result<Program> {
        lower_for("x86_64-linux", source)
    }

    fn only_foreign_call(program: &Program) -> &ForeignCall {
        let calls: Vec<_> = program.foreign_calls().collect();
        assert_eq!(calls.len(), 1, "{program}");
        calls[0]
    }

    #[test]
    fn write_binds_two_arguments_in_source_order_and_absorbs_drop() {
        let program = lower(
            "const SYS_write 1\n\
             extern func void write[int,ptr]\n\
             macro write_fd 1 end\n\
             0 write_fd 1 \"ok\" ptr call write drop\n",
        )
        .unwrap();

        assert!(!program.entry.contains(&Instruction::Drop));
        let call = only_foreign_call(&program);
        assert!(call.discard_result);
        assert_eq!(
            call.target,
            ForeignTarget::Syscall {
                number: 1,
                register: "rax".into()
            }
        );
        let slots: Vec<_> = call.arguments.iter().map(|a| (a.position, a.ty, a.slot.clone())).collect();
        assert_eq!(
            slots,
            [
                (0, DataType::Int, ArgumentSlot::Register("rdi".into())),
                (1, DataType::Ptr, ArgumentSlot::Register("rsi".into())),
            ]
        );
        let columns: Vec<_> = call
            .arguments
            .iter()
            .map(|a| a.origin.as_ref().map(|o| (o.line, o.column)))
            .collect();
        assert_eq!(columns, [Some((4, 12)), Some((4, 14))]);
    }

    #[test]
    fn second_drop_is_a_real_drop() {
        let program = lower("const SYS_getpid 39 extern func int getpid[] 7 call getpid drop drop").unwrap();
        assert!(only_foreign_call(&program).discard_result);
        assert_eq!(program.entry.last(), Some(&Instruction::Drop));
    }

    #[test]
    fn missing_syscall_number_means_external_call() {
        let source = "extern func int puts[ptr] \"hi\" call puts drop";
        let linux = lower(source).unwrap();
        let call = only_foreign_call(&linux);
        assert_eq!(call.target, ForeignTarget::External { linkage: "puts".into() });
        assert_eq!(call.convention, "sysv64");

        let mac = lower_for("arm64-macos", source).unwrap();
        assert_eq!(
            only_foreign_call(&mac).target,
            ForeignTarget::External { linkage: "_puts".into() }
        );
    }

    #[test]
    fn external_calls_spill_surplus_arguments() {
        let program = lower("extern func int many[int,int,int,int,int,int,int,int] 1 2 3 4 5 6 7 8 call many").unwrap();
        let call = only_foreign_call(&program);
        assert_eq!(call.arguments[5].slot, ArgumentSlot::Register("r9".into()));
        assert_eq!(call.arguments[6].slot, ArgumentSlot::Stack { offset: 0 });
        assert_eq!(call.arguments[7].slot, ArgumentSlot::Stack { offset: 8 });
    }

    #[test]
    fn syscalls_cannot_spill() {
        let err = lower("const SYS_many 9 extern func int many[int,int,int,int,int,int,int] 1 2 3 4 5 6 7 call many")
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::ArityMismatch { expected: 6, actual: 7, .. }
        ));
    }

    #[test]
    fn unknown_call_target_is_reported() {
        let err = lower("1 call nothing").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UnknownForeignSymbol { name: "nothing".into() });
    }

    #[test]
    fn arity_needs_enough_values_since_the_last_boundary() {
        let err = lower("extern func void exit[int] call exit").unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::ArityMismatch { expected: 1, actual: 0, .. }
        ));
        assert!(lower("extern func void exit[int] 0 call exit").is_ok());

        let err = lower("extern func void exit[int] 0 while false do end call exit").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ArityMismatch { .. }));
    }

    #[test]
    fn loop_body_is_kept_between_labels() {
        let program = lower("while false false == do 1 drop end").unwrap();
        assert_eq!(
            program.entry,
            [
                Instruction::Label(Label::new("main.while0")),
                Instruction::PushBool(false),
                Instruction::PushBool(false),
                Instruction::Compare(CompareOp::Equal),
                Instruction::JumpIfFalse(Label::new("main.while0.end")),
                Instruction::PushInt(1),
                Instruction::Drop,
                Instruction::Jump(Label::new("main.while0")),
                Instruction::Label(Label::new("main.while0.end")),
            ]
        );
    }

    #[test]
    fn if_else_lowers_to_two_labels() {
        let program = lower("1 2 < if 10 else 20 end drop").unwrap();
        assert_eq!(
            &program.entry[3..],
            [
                Instruction::JumpIfFalse(Label::new("main.if0.else")),
                Instruction::PushInt(10),
                Instruction::Jump(Label::new("main.if0.end")),
                Instruction::Label(Label::new("main.if0.else")),
                Instruction::PushInt(20),
                Instruction::Label(Label::new("main.if0.end")),
                Instruction::Drop,
            ]
        );
    }

    #[test]
    fn inline_copies_have_disjoint_labels() {
        let program = lower(
            "inline func void spin[int] while copy 0 > do dec end drop end\n\
             3 spin 4 call spin",
        )
        .unwrap();
        let labels = program.defined_labels();
        assert_eq!(labels.len(), 4);
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), 4);
        assert!(labels.iter().all(|l| l.as_str().starts_with("inline.spin.while0")));
        assert!(!program.instructions().any(|i| matches!(i, Instruction::Call { .. })));
    }

    #[test]
    fn inline_copies_inside_a_function_have_disjoint_labels() {
        let program = lower(
            "inline func void spin[int] while copy 0 > do dec end drop end\n\
             func void twice[] 3 spin 4 spin end\n\
             call twice",
        )
        .unwrap();
        assert_eq!(program.entry.len(), 1);
        let body = &program.functions[0].body;
        let labels: Vec<_> = body
            .iter()
            .filter_map(|i| match i {
                Instruction::Label(label) => Some(label),
                _ => None,
            })
            .collect();
        assert_eq!(labels.len(), 4);
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), 4);
        assert_eq!(body.last(), Some(&Instruction::Return));
    }

    #[test]
    fn nested_inline_copies_have_disjoint_labels() {
        let program = lower(
            "inline func void spin[int] while copy 0 > do dec end drop end\n\
             inline func void both[int] copy spin while copy 0 > do dec end drop end\n\
             3 both 4 both",
        )
        .unwrap();
        let labels = program.defined_labels();
        assert_eq!(labels.len(), 8);
        let unique: std::collections::HashSet<_> = labels.iter().collect();
        assert_eq!(unique.len(), 8);
        let inner = labels
            .iter()
            .filter(|l| l.as_str().starts_with("inline.spin."))
            .count();
        assert_eq!(inner, 4);
    }

    #[test]
    fn inline_recursion_is_rejected() {
        let err = lower("inline func int f[int] f end 1 f").unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::InlineRecursionLimitExceeded { chain, .. } if chain == &["f", "f"]
        ));

        let err = lower("inline func int f[int] g end inline func int g[int] f end 1 f").unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::InlineRecursionLimitExceeded { chain, .. } if chain == &["f", "g", "f"]
        ));
    }

    #[test]
    fn plain_functions_are_called_and_lowered_once() {
        let program = lower("func int square[int] copy * end 3 square drop 4 call square drop").unwrap();
        let calls = program
            .entry
            .iter()
            .filter(|i| matches!(i, Instruction::Call { function, arguments: 1, returns: DataType::Int } if function == "square"))
            .count();
        assert_eq!(calls, 2);
        assert_eq!(program.functions.len(), 1);
        assert_eq!(
            program.functions[0].body,
            [
                Instruction::Stack(StackOp::Copy),
                Instruction::Arithmetic(ArithmeticOp::Multiply),
                Instruction::Return,
            ]
        );
    }

    #[test]
    fn constants_push_their_value() {
        let program = lower("const LIMIT 0x10 const NL '\\n' LIMIT NL +").unwrap();
        assert_eq!(program.entry[..2], [Instruction::PushInt(16), Instruction::PushInt(10)]);
    }

    #[test]
    fn raw_syscall_folds_a_literal_number() {
        let program = lower("1 \"hi\" 2 1 syscall4 drop").unwrap();
        assert_eq!(
            program.entry[..2],
            [Instruction::PushInt(1), Instruction::PushStr("hi".into())]
        );
        let call = only_foreign_call(&program);
        assert_eq!(call.symbol, "syscall4");
        assert_eq!(
            call.target,
            ForeignTarget::Syscall {
                number: 1,
                register: "rax".into()
            }
        );
        let slots: Vec<_> = call.arguments.iter().map(|a| a.slot.clone()).collect();
        assert_eq!(slots, ["rdi", "rsi", "rdx"].map(|r| ArgumentSlot::Register(r.into())));
        assert!(call.arguments.iter().all(|a| a.ty == DataType::Int));
        assert_eq!(call.returns, DataType::Int);
        assert!(call.discard_result);
        assert_eq!(program.entry.len(), 4);
    }

    #[test]
    fn raw_syscall_reads_a_computed_number_from_the_stack() {
        let program = lower_for("arm64-macos", "0 copy 1 + syscall2").unwrap();
        let call = only_foreign_call(&program);
        assert_eq!(call.target, ForeignTarget::DynamicSyscall { register: "X16".into() });
        assert_eq!(call.arguments.len(), 1);
        assert_eq!(call.arguments[0].slot, ArgumentSlot::Register("X0".into()));
        assert_eq!(call.result_register, "X0");
        assert!(!call.discard_result);
        assert_eq!(program.entry[2], Instruction::PushInt(1));
    }

    #[test]
    fn raw_syscall_result_feeds_later_words() {
        let program = lower("60 syscall1 drop 0 60 syscall2 1 +").unwrap();
        let calls: Vec<_> = program.foreign_calls().collect();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].discard_result);
        assert!(!calls[1].discard_result);
        assert_eq!(program.entry.last(), Some(&Instruction::Arithmetic(ArithmeticOp::Add)));
    }

    #[test]
    fn raw_syscall_needs_its_number_and_arguments() {
        let err = lower("1 2 syscall3").unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::ArityMismatch { callee, expected: 3, actual: 2 } if callee == "syscall3"
        ));

        let err = lower("1 2 while false do end 60 syscall3").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ArityMismatch { actual: 1, .. }));
    }

    #[test]
    fn raw_syscall_words_are_reserved() {
        let err = lower("macro syscall3 1 end").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ReservedName { .. }));
    }

    #[test]
    fn unknown_words_are_undefined() {
        let err = lower("1 frobnicate").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UndefinedSymbol { name: "frobnicate".into() });
    }

    #[test]
    fn uncalled_inline_functions_are_still_checked() {
        let err = lower("inline func int bad[] nothing end 1 drop").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UndefinedSymbol { name: "nothing".into() });
    }
}
