//! Instruction: one operation applied to concrete variables (spec §3
//! "Instruction").

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::operation::Operation;
use crate::variable::Variable;

/// Inline storage for up to four inputs/outputs before spilling to the
/// heap — most operations in this IL have one or two of each.
pub type VarList = SmallVec<[Variable; 4]>;

/// `(operation, inputs[], outputs[], inner_outputs[], index)` (spec §3).
///
/// `inner_outputs` are variables visible only inside the block the
/// instruction opens (a for-loop's induction variable, a catch clause's
/// bound parameter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub operation: Operation,
    pub inputs: VarList,
    pub outputs: VarList,
    pub inner_outputs: VarList,
    /// Dense index within the owning `Code`, refreshed by `Code::finalize`.
    pub index: usize,
}

impl Instruction {
    pub fn new(
        operation: Operation,
        inputs: VarList,
        outputs: VarList,
        inner_outputs: VarList,
        index: usize,
    ) -> Self {
        Self {
            operation,
            inputs,
            outputs,
            inner_outputs,
            index,
        }
    }

    pub fn is_block_start(&self) -> bool {
        self.operation.is_block_start()
    }

    pub fn is_block_end(&self) -> bool {
        self.operation.is_block_end()
    }

    /// All variables this instruction defines (outputs + inner outputs).
    pub fn all_outputs(&self) -> impl Iterator<Item = Variable> + '_ {
        self.outputs.iter().chain(self.inner_outputs.iter()).copied()
    }
}
