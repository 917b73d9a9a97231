//! Type tags used in function signatures.
//!
//! Tags are only checked structurally (counts and names); there is no type
//! checker in this crate.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int,
    Ptr,
    Bool,
    Void,
}

impl DataType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(DataType::Int),
            "ptr" => Some(DataType::Ptr),
            "bool" => Some(DataType::Bool),
            "void" => Some(DataType::Void),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Int => "int",
            DataType::Ptr => "ptr",
            DataType::Bool => "bool",
            DataType::Void => "void",
        }
    }

    /// Number of stack values a value of this type occupies.
    pub fn stack_slots(&self) -> usize {
        match self {
            DataType::Void => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter and return tags of a function, e.g. `int write[int,ptr]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub params: Vec<DataType>,
    pub returns: DataType,
}

impl Signature {
    pub fn new(params: Vec<DataType>, returns: DataType) -> Self {
        Self { params, returns }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<_> = self.params.iter().map(DataType::as_str).collect();
        write!(f, "[{}] -> {}", params.join(","), self.returns)
    }
}
