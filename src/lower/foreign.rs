//! Binding of foreign calls to the target's calling conventions.
//!
//! A declared `extern func` lowers as a system call when the registry holds
//! a syscall-number constant for it, and as an external C-ABI call otherwise.
//! The `syscallN` intrinsics bypass declarations and always use the syscall
//! convention with `int` arguments.

use tracing::trace;

use crate::errors::{CompileError, ErrorKind, Result, SourceLocation};
use crate::lower::instruction::{ArgumentBinding, ArgumentSlot, ForeignCall, ForeignTarget};
use crate::platform::Platform;
use crate::symbols::{Definition, DefinitionKind, Registry};
use crate::syntax::Token;
use crate::types::DataType;

pub struct ForeignBinder<'a> {
    platform: &'a Platform,
    registry: &'a Registry,
}

impl<'a> ForeignBinder<'a> {
    pub fn new(platform: &'a Platform, registry: &'a Registry) -> Self {
        Self { platform, registry }
    }

    /// The error for a `call` target that names nothing callable.
    pub fn unknown_symbol(&self, site: &Token) -> CompileError {
        let name = site.word().unwrap_or(&site.text);
        let mut err = CompileError::new(ErrorKind::UnknownForeignSymbol {
            name: name.to_string(),
        })
        .at(site);
        if self.registry.get(DefinitionKind::Constant, &self.platform.syscall_constant(name)).is_some() {
            err = err.with_help(format!(
                "{} has a syscall number for `{name}`; declare it with `extern func <ret> {name}[<params>]`",
                self.platform.name
            ));
        } else {
            err = err.with_help(format!(
                "declare it with `extern func <ret> {name}[<params>]` or include the platform prelude"
            ));
        }
        err
    }

    /// Binds `origins` (the argument values, bottom first) to `declaration`.
    pub fn bind(
        &self,
        declaration: &Definition,
        site: &Token,
        origins: Vec<Option<SourceLocation>>,
    ) -> Result<ForeignCall> {
        let params = declaration
            .signature
            .as_ref()
            .map(|s| s.params.as_slice())
            .unwrap_or_default();
        let syscall_number = self
            .registry
            .get(DefinitionKind::Constant, &self.platform.syscall_constant(&declaration.name))
            .and_then(|c| c.value);

        let call = match syscall_number {
            Some(number) => {
                let convention = &self.platform.syscall;
                if params.len() > convention.argument_registers.len() {
                    return Err(CompileError::new(ErrorKind::ArityMismatch {
                        callee: declaration.name.clone(),
                        expected: convention.argument_registers.len(),
                        actual: params.len(),
                    })
                    .at(site)
                    .with_help(format!(
                        "{} system calls take at most {} arguments",
                        self.platform.name,
                        convention.argument_registers.len()
                    )));
                }
                ForeignCall {
                    symbol: declaration.name.clone(),
                    target: ForeignTarget::Syscall {
                        number,
                        register: convention.number_register.clone(),
                    },
                    convention: convention.tag.clone(),
                    arguments: self.arguments(params, origins, &convention.argument_registers, 0),
                    returns: declaration.returns(),
                    result_register: convention.return_register.clone(),
                    discard_result: false,
                }
            }
            None => {
                let convention = &self.platform.ccall;
                ForeignCall {
                    symbol: declaration.name.clone(),
                    target: ForeignTarget::External {
                        linkage: self.platform.linkage_name(&declaration.name),
                    },
                    convention: convention.tag.clone(),
                    arguments: self.arguments(
                        params,
                        origins,
                        &convention.argument_registers,
                        convention.stack_slot_size,
                    ),
                    returns: declaration.returns(),
                    result_register: convention.return_register.clone(),
                    discard_result: false,
                }
            }
        };

        trace!(symbol = %call.symbol, convention = %call.convention, arguments = call.arguments.len(), "bound foreign call");
        Ok(call)
    }

    /// Binds a `syscallN` intrinsic. `origins` are the argument values,
    /// bottom first, without the number. A `number` known at compile time
    /// gives a plain syscall; otherwise it is read from the stack.
    pub fn bind_raw_syscall(
        &self,
        site: &Token,
        number: Option<i64>,
        origins: Vec<Option<SourceLocation>>,
    ) -> Result<ForeignCall> {
        let convention = &self.platform.syscall;
        let name = site.word().unwrap_or(&site.text).to_string();
        let registers = convention.argument_registers.len();
        if origins.len() > registers {
            return Err(CompileError::new(ErrorKind::ArityMismatch {
                callee: name,
                expected: registers,
                actual: origins.len(),
            })
            .at(site)
            .with_help(format!(
                "{} system calls take at most {registers} arguments besides the number",
                self.platform.name
            )));
        }

        let target = match number {
            Some(number) => ForeignTarget::Syscall {
                number,
                register: convention.number_register.clone(),
            },
            None => ForeignTarget::DynamicSyscall {
                register: convention.number_register.clone(),
            },
        };
        let params = vec![DataType::Int; origins.len()];
        let call = ForeignCall {
            symbol: name,
            target,
            convention: convention.tag.clone(),
            arguments: self.arguments(&params, origins, &convention.argument_registers, 0),
            returns: DataType::Int,
            result_register: convention.return_register.clone(),
            discard_result: false,
        };
        trace!(symbol = %call.symbol, convention = %call.convention, arguments = call.arguments.len(), "bound raw syscall");
        Ok(call)
    }

    /// Leftmost argument goes to the first register; the rest spill to stack
    /// slots in order.
    fn arguments(
        &self,
        params: &[DataType],
        origins: Vec<Option<SourceLocation>>,
        registers: &[String],
        slot_size: usize,
    ) -> Vec<ArgumentBinding> {
        let mut origins = origins.into_iter();
        params
            .iter()
            .enumerate()
            .map(|(position, ty)| {
                let slot = match registers.get(position) {
                    Some(register) => ArgumentSlot::Register(register.clone()),
                    None => ArgumentSlot::Stack {
                        offset: (position - registers.len()) * slot_size,
                    },
                };
                ArgumentBinding {
                    position,
                    ty: *ty,
                    slot,
                    origin: origins.next().flatten(),
                }
            })
            .collect()
    }
}
