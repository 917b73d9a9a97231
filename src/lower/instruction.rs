//! The backend-facing instruction model and its text listing.

use std::fmt;

use serde::Serialize;

use crate::errors::SourceLocation;
use crate::types::{DataType, Signature};

// ============================================================================
// OPERATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Increment,
    Decrement,
}

impl ArithmeticOp {
    pub fn operands(&self) -> usize {
        match self {
            ArithmeticOp::Increment | ArithmeticOp::Decrement => 1,
            _ => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Subtract => "sub",
            ArithmeticOp::Multiply => "mul",
            ArithmeticOp::Divide => "div",
            ArithmeticOp::Modulo => "mod",
            ArithmeticOp::Increment => "inc",
            ArithmeticOp::Decrement => "dec",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Equal => "eq",
            CompareOp::NotEqual => "ne",
            CompareOp::Less => "lt",
            CompareOp::Greater => "gt",
            CompareOp::LessEqual => "le",
            CompareOp::GreaterEqual => "ge",
        }
    }
}

/// Stack shuffles. Each one reads a fixed number of values from the top of
/// the stack and writes them back in a new arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StackOp {
    /// `a -- a a`
    Copy,
    /// `a b -- a b a b`
    Copy2,
    /// `a b -- a b a`
    CopyOver,
    /// `a b -- b a`
    Swap,
    /// `a b c -- b a c`
    SwapOver,
}

impl StackOp {
    /// Indices into the consumed values (bottom first) of each produced value.
    pub fn shuffle(&self) -> (usize, &'static [usize]) {
        match self {
            StackOp::Copy => (1, &[0, 0]),
            StackOp::Copy2 => (2, &[0, 1, 0, 1]),
            StackOp::CopyOver => (2, &[0, 1, 0]),
            StackOp::Swap => (2, &[1, 0]),
            StackOp::SwapOver => (3, &[1, 0, 2]),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StackOp::Copy => "copy",
            StackOp::Copy2 => "copy2",
            StackOp::CopyOver => "copy_over",
            StackOp::Swap => "swap",
            StackOp::SwapOver => "swap_over",
        }
    }
}

// ============================================================================
// LABELS
// ============================================================================

/// A jump target, unique within a program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `main.while0` + `end` -> `main.while0.end`
    pub fn child(&self, part: &str) -> Self {
        Self(format!("{}.{part}", self.0))
    }

    /// The copy of this label inside inline instance `instance`.
    pub fn instance(&self, instance: usize) -> Self {
        Self(format!("{}~{instance}", self.0))
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// FOREIGN CALLS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ForeignTarget {
    Syscall { number: i64, register: String },
    /// A raw syscall whose number is only known at run time. It sits on top
    /// of the stack, above the arguments, and is popped into `register`.
    DynamicSyscall { register: String },
    External { linkage: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentSlot {
    Register(String),
    /// Offset in bytes from the outgoing argument area.
    Stack { offset: usize },
}

impl fmt::Display for ArgumentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentSlot::Register(register) => f.write_str(register),
            ArgumentSlot::Stack { offset } => write!(f, "[sp+{offset}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgumentBinding {
    /// Zero-based position in the declared parameter list.
    pub position: usize,
    pub ty: DataType,
    pub slot: ArgumentSlot,
    /// Token that pushed the value, when it is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<SourceLocation>,
}

/// A call that leaves the program: a system call or an external symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignCall {
    pub symbol: String,
    pub target: ForeignTarget,
    pub convention: String,
    pub arguments: Vec<ArgumentBinding>,
    pub returns: DataType,
    pub result_register: String,
    /// Set when the result is dropped right after the call.
    pub discard_result: bool,
}

// ============================================================================
// INSTRUCTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Instruction {
    PushInt(i64),
    PushBool(bool),
    PushStr(String),
    Arithmetic(ArithmeticOp),
    Compare(CompareOp),
    Stack(StackOp),
    /// Retags the top value.
    Cast(DataType),
    Drop,
    Label(Label),
    Jump(Label),
    JumpIfFalse(Label),
    Call {
        function: String,
        arguments: usize,
        returns: DataType,
    },
    ForeignCall(ForeignCall),
    Return,
}

impl Instruction {
    /// Labels defined or referenced by this instruction.
    pub fn label(&self) -> Option<&Label> {
        match self {
            Instruction::Label(label) | Instruction::Jump(label) | Instruction::JumpIfFalse(label) => {
                Some(label)
            }
            _ => None,
        }
    }

    pub fn is_boundary(&self) -> bool {
        self.label().is_some()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::PushInt(value) => write!(f, "push_int {value}"),
            Instruction::PushBool(value) => write!(f, "push_bool {value}"),
            Instruction::PushStr(value) => write!(f, "push_str {value:?}"),
            Instruction::Arithmetic(op) => f.write_str(op.as_str()),
            Instruction::Compare(op) => write!(f, "cmp_{}", op.as_str()),
            Instruction::Stack(op) => f.write_str(op.as_str()),
            Instruction::Cast(ty) => write!(f, "cast {ty}"),
            Instruction::Drop => f.write_str("drop"),
            Instruction::Label(label) => write!(f, "{label}:"),
            Instruction::Jump(label) => write!(f, "jump {label}"),
            Instruction::JumpIfFalse(label) => write!(f, "jump_if_false {label}"),
            Instruction::Call {
                function,
                arguments,
                returns,
            } => write!(f, "call {function} ({arguments} -> {returns})"),
            Instruction::ForeignCall(call) => {
                match &call.target {
                    ForeignTarget::Syscall { number, register } => {
                        write!(f, "syscall {} {register}={number}", call.symbol)?
                    }
                    ForeignTarget::DynamicSyscall { register } => {
                        write!(f, "syscall {} {register}=<stack>", call.symbol)?
                    }
                    ForeignTarget::External { linkage } => write!(f, "ccall {linkage}")?,
                }
                let args: Vec<_> = call
                    .arguments
                    .iter()
                    .map(|a| format!("{}:{}", a.slot, a.ty))
                    .collect();
                write!(f, " [{}] -> {}:{}", args.join(", "), call.result_register, call.returns)?;
                if call.discard_result {
                    f.write_str(" (discarded)")?;
                }
                Ok(())
            }
            Instruction::Return => f.write_str("return"),
        }
    }
}

// ============================================================================
// PROGRAM
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoweredFunction {
    pub name: String,
    pub signature: Signature,
    pub body: Vec<Instruction>,
}

/// A fully resolved program for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Program {
    pub target: String,
    pub entry: Vec<Instruction>,
    pub functions: Vec<LoweredFunction>,
}

impl Program {
    /// Every instruction of the program, entry stream first.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.entry
            .iter()
            .chain(self.functions.iter().flat_map(|f| f.body.iter()))
    }

    pub fn foreign_calls(&self) -> impl Iterator<Item = &ForeignCall> {
        self.instructions().filter_map(|i| match i {
            Instruction::ForeignCall(call) => Some(call),
            _ => None,
        })
    }

    /// Labels defined (not merely referenced) anywhere in the program.
    pub fn defined_labels(&self) -> Vec<&Label> {
        self.instructions()
            .filter_map(|i| match i {
                Instruction::Label(label) => Some(label),
                _ => None,
            })
            .collect()
    }
}

fn write_body(f: &mut fmt::Formatter<'_>, body: &[Instruction]) -> fmt::Result {
    for instruction in body {
        match instruction {
            Instruction::Label(_) => writeln!(f, "  {instruction}")?,
            _ => writeln!(f, "    {instruction}")?,
        }
    }
    Ok(())
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; target {}", self.target)?;
        writeln!(f, "entry:")?;
        write_body(f, &self.entry)?;
        for function in &self.functions {
            writeln!(f)?;
            writeln!(f, "{} {}:", function.name, function.signature)?;
            write_body(f, &function.body)?;
        }
        Ok(())
    }
}
