//! Source table: loading, deduplicating and ordering included units.

pub mod provider;
pub mod table;

pub use provider::{FileSystem, InMemory, SourceProvider};
pub use table::{SourceTable, Unit, UnitId};
