//! Built-in words that lower directly to a single instruction.
//!
//! `syscall1` to `syscall7` are the exception: they become a foreign call
//! bound against the platform's syscall convention by the lowerer.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::lower::instruction::{ArithmeticOp, CompareOp, Instruction, StackOp};
use crate::types::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    Arithmetic(ArithmeticOp),
    Compare(CompareOp),
    Stack(StackOp),
    Cast(DataType),
    Drop,
    /// Raw system call over this many stack values. The topmost is the
    /// syscall number, the rest are its arguments.
    Syscall(usize),
}

/// `syscall7` carries six arguments, the most any bundled target has
/// registers for.
pub const MAX_SYSCALL_VALUES: usize = 7;

static INTRINSICS: Lazy<HashMap<&'static str, Intrinsic>> = Lazy::new(|| {
    use Intrinsic::*;
    HashMap::from([
        ("+", Arithmetic(ArithmeticOp::Add)),
        ("-", Arithmetic(ArithmeticOp::Subtract)),
        ("*", Arithmetic(ArithmeticOp::Multiply)),
        ("/", Arithmetic(ArithmeticOp::Divide)),
        ("%", Arithmetic(ArithmeticOp::Modulo)),
        ("inc", Arithmetic(ArithmeticOp::Increment)),
        ("dec", Arithmetic(ArithmeticOp::Decrement)),
        ("==", Compare(CompareOp::Equal)),
        ("!=", Compare(CompareOp::NotEqual)),
        ("<", Compare(CompareOp::Less)),
        (">", Compare(CompareOp::Greater)),
        ("<=", Compare(CompareOp::LessEqual)),
        (">=", Compare(CompareOp::GreaterEqual)),
        ("copy", Stack(StackOp::Copy)),
        ("copy2", Stack(StackOp::Copy2)),
        ("copy_over", Stack(StackOp::CopyOver)),
        ("swap", Stack(StackOp::Swap)),
        ("swap_over", Stack(StackOp::SwapOver)),
        ("int", Cast(DataType::Int)),
        ("ptr", Cast(DataType::Ptr)),
        ("bool", Cast(DataType::Bool)),
        ("drop", Drop),
        ("syscall1", Syscall(1)),
        ("syscall2", Syscall(2)),
        ("syscall3", Syscall(3)),
        ("syscall4", Syscall(4)),
        ("syscall5", Syscall(5)),
        ("syscall6", Syscall(6)),
        ("syscall7", Syscall(MAX_SYSCALL_VALUES)),
    ])
});

impl Intrinsic {
    pub fn from_word(word: &str) -> Option<Self> {
        INTRINSICS.get(word).copied()
    }

    pub fn words() -> impl Iterator<Item = &'static str> {
        INTRINSICS.keys().copied()
    }

    /// Values consumed and produced on the stack.
    pub fn effect(&self) -> (usize, usize) {
        match self {
            Intrinsic::Arithmetic(op) => (op.operands(), 1),
            Intrinsic::Compare(_) => (2, 1),
            Intrinsic::Stack(op) => {
                let (consumed, produced) = op.shuffle();
                (consumed, produced.len())
            }
            Intrinsic::Cast(_) => (0, 0),
            Intrinsic::Drop => (1, 0),
            Intrinsic::Syscall(values) => (*values, 1),
        }
    }

    /// `None` for raw syscalls, which need the platform to bind.
    pub fn instruction(&self) -> Option<Instruction> {
        Some(match *self {
            Intrinsic::Arithmetic(op) => Instruction::Arithmetic(op),
            Intrinsic::Compare(op) => Instruction::Compare(op),
            Intrinsic::Stack(op) => Instruction::Stack(op),
            Intrinsic::Cast(ty) => Instruction::Cast(ty),
            Intrinsic::Drop => Instruction::Drop,
            Intrinsic::Syscall(_) => return None,
        })
    }
}
