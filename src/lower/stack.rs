//! Structural stack counting for arity checks and argument origins.
//!
//! The tracker only knows about values pushed since the last statement
//! boundary (a label or a jump). Past a boundary, control may arrive from
//! several places, so nothing is assumed about what is on the stack.

use crate::errors::SourceLocation;
use crate::lower::instruction::StackOp;

#[derive(Debug, Clone, Default)]
pub struct StackTracker {
    /// Known values, bottom first. `None` when the producing token is unknown.
    values: Vec<Option<SourceLocation>>,
}

impl StackTracker {
    /// A tracker for a body that starts with `params` values available.
    pub fn with_params(params: usize) -> Self {
        Self {
            values: vec![None; params],
        }
    }

    pub fn available(&self) -> usize {
        self.values.len()
    }

    pub fn push(&mut self, origin: Option<SourceLocation>) {
        self.values.push(origin);
    }

    /// Consumes up to `pops` known values and pushes `pushes` values
    /// produced at `origin`.
    pub fn apply(&mut self, pops: usize, pushes: usize, origin: Option<SourceLocation>) {
        let keep = self.values.len().saturating_sub(pops);
        self.values.truncate(keep);
        self.values.extend(std::iter::repeat(origin).take(pushes));
    }

    pub fn shuffle(&mut self, op: StackOp) {
        let (consumed, produced) = op.shuffle();
        if self.values.len() < consumed {
            self.apply(consumed, produced.len(), None);
            return;
        }
        let inputs = self.values.split_off(self.values.len() - consumed);
        self.values
            .extend(produced.iter().map(|&index| inputs[index].clone()));
    }

    /// Removes the top `count` values, returned bottom first.
    pub fn take(&mut self, count: usize) -> Vec<Option<SourceLocation>> {
        let at = self.values.len().saturating_sub(count);
        self.values.split_off(at)
    }

    pub fn pop(&mut self) {
        self.values.pop();
    }

    pub fn boundary(&mut self) {
        self.values.clear();
    }
}
