//! Target platform descriptors.
//!
//! A descriptor names the registers and tags of the two foreign calling
//! conventions a target supports (system calls and C-ABI external calls),
//! plus the prelude include that declares the target's syscall numbers.
//! Descriptors are YAML; three are bundled and a custom one can be loaded
//! from a file.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{CompileError, ErrorKind, Result};

const BUILTIN: &[(&str, &str)] = &[
    ("x86_64-linux", include_str!("platform/targets/x86_64-linux.yaml")),
    ("arm64-linux", include_str!("platform/targets/arm64-linux.yaml")),
    ("arm64-macos", include_str!("platform/targets/arm64-macos.yaml")),
];

pub const DEFAULT_TARGET: &str = "x86_64-linux";

fn default_syscall_prefix() -> String {
    "SYS_".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyscallConvention {
    pub tag: String,
    pub number_register: String,
    pub argument_registers: Vec<String>,
    pub return_register: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CCallConvention {
    pub tag: String,
    pub argument_registers: Vec<String>,
    pub return_register: String,
    /// Bytes per spilled argument.
    pub stack_slot_size: usize,
    #[serde(default)]
    pub symbol_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Platform {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Include path of the syscall table, resolved against the search paths.
    #[serde(default)]
    pub prelude: Option<String>,
    #[serde(default = "default_syscall_prefix")]
    pub syscall_prefix: String,
    pub syscall: SyscallConvention,
    pub ccall: CCallConvention,
}

impl Platform {
    /// Looks up a bundled descriptor by name or alias.
    pub fn builtin(name: &str) -> Result<Self> {
        for platform in Self::all_builtin()? {
            if platform.name == name || platform.aliases.iter().any(|a| a == name) {
                return Ok(platform);
            }
        }
        Err(CompileError::new(ErrorKind::UnknownTarget {
            name: name.to_string(),
        })
        .with_help(format!("known targets: {}", Self::builtin_names().join(", "))))
    }

    pub fn builtin_names() -> Vec<&'static str> {
        BUILTIN.iter().map(|(name, _)| *name).collect()
    }

    pub fn all_builtin() -> Result<Vec<Self>> {
        BUILTIN
            .iter()
            .map(|(name, text)| Self::from_yaml(text, name))
            .collect()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            CompileError::new(ErrorKind::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        })?;
        let platform = Self::from_yaml(&text, &path.display().to_string())?;
        debug!(platform = %platform.name, path = %path.display(), "loaded platform descriptor");
        Ok(platform)
    }

    /// Parses and validates a descriptor. `origin` names it in errors.
    pub fn from_yaml(text: &str, origin: &str) -> Result<Self> {
        let platform: Platform = serde_yaml::from_str(text).map_err(|e| {
            CompileError::new(ErrorKind::InvalidConfig {
                reason: format!("platform descriptor {origin}: {e}"),
            })
        })?;
        platform.validate(origin)?;
        Ok(platform)
    }

    fn validate(&self, origin: &str) -> Result<()> {
        let problem = if self.name.trim().is_empty() {
            Some("`name` is empty")
        } else if self.syscall.argument_registers.is_empty() {
            Some("`syscall.argument_registers` is empty")
        } else if self.ccall.argument_registers.is_empty() {
            Some("`ccall.argument_registers` is empty")
        } else if self.ccall.stack_slot_size == 0 {
            Some("`ccall.stack_slot_size` must be positive")
        } else {
            None
        };
        match problem {
            Some(problem) => Err(CompileError::new(ErrorKind::InvalidConfig {
                reason: format!("platform descriptor {origin}: {problem}"),
            })),
            None => Ok(()),
        }
    }

    /// Name of the constant that holds the syscall number of `symbol`.
    pub fn syscall_constant(&self, symbol: &str) -> String {
        format!("{}{symbol}", self.syscall_prefix)
    }

    pub fn linkage_name(&self, symbol: &str) -> String {
        format!("{}{symbol}", self.ccall.symbol_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_descriptors_parse() {
        let all = Platform::all_builtin().unwrap();
        assert_eq!(all.len(), 3);
        let linux = Platform::builtin("x86_64-linux").unwrap();
        assert_eq!(linux.syscall.number_register, "rax");
        assert_eq!(linux.syscall.argument_registers[3], "r10");
        assert_eq!(linux.ccall.argument_registers[3], "rcx");
    }

    #[test]
    fn aliases_resolve() {
        let mac = Platform::builtin("darwin").unwrap();
        assert_eq!(mac.name, "arm64-macos");
        assert_eq!(mac.linkage_name("puts"), "_puts");
        assert_eq!(mac.syscall_constant("write"), "SYS_write");
    }

    #[test]
    fn unknown_target_is_rejected() {
        let err = Platform::builtin("riscv-plan9").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnknownTarget { name } if name == "riscv-plan9"));
    }

    #[test]
    fn invalid_descriptors_are_config_errors() {
        let text = r#"
name: toy
syscall: { tag: t, number_register: r0, argument_registers: [], return_register: r0 }
ccall: { tag: c, argument_registers: [r1], return_register: r0, stack_slot_size: 4 }
"#;
        let err = Platform::from_yaml(text, "toy.yaml").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidConfig { reason } if reason.contains("syscall.argument_registers")));

        let err = Platform::from_yaml("name: [", "broken.yaml").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidConfig { .. }));
    }
}
