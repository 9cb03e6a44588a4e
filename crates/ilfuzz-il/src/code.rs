//! Code: an ordered, validated sequence of instructions (spec §3 "Code").

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::{ILError, Result};
use crate::instruction::Instruction;
use crate::operation::Context;
use crate::variable::Variable;

/// An ordered sequence of instructions satisfying the invariants listed in
/// spec §3:
///
/// - every block-start is matched by a block-end in well-nested order;
/// - every input refers to an output of an earlier, still-open instruction;
/// - every variable is defined exactly once;
/// - the cumulative context at each instruction includes what the
///   operation requires;
/// - instruction indices are dense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Code {
    instructions: Vec<Instruction>,
}

/// One entry of the open-block stack used by [`Code::validate`] and by the
/// builder's own context stack.
struct OpenBlock {
    start_index: usize,
    contributed: Context,
}

impl Code {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_instructions(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Overwrites the instruction at `index` in place, used by the
    /// minimizer (`ilfuzz-corpus::Minimizer`) to swap a candidate
    /// instruction in before re-validating and re-executing.
    pub fn replace(&mut self, index: usize, instruction: Instruction) {
        self.instructions[index] = instruction;
    }

    pub fn as_slice(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }

    /// Renumbers instruction indices densely, i.e. `instructions[i].index == i`.
    pub fn renumber(&mut self) {
        for (i, instr) in self.instructions.iter_mut().enumerate() {
            instr.index = i;
        }
    }

    /// Computes the cumulative context in effect at instruction `index`
    /// (linear scan of block opens/closes, per spec §3).
    pub fn context_at(&self, index: usize) -> Context {
        let mut stack: Vec<Context> = vec![Context::SCRIPT];
        for instr in self.instructions.iter().take(index) {
            if instr.is_block_start() {
                let contributed = instr.operation.metadata().contributed_context;
                let current = *stack.last().unwrap();
                stack.push(current | contributed);
            } else if instr.is_block_end() {
                if stack.len() > 1 {
                    stack.pop();
                }
            }
        }
        *stack.last().unwrap()
    }

    /// Full structural validation (testable properties #2, #3, #4 in spec §8).
    pub fn validate(&self) -> Result<()> {
        let mut defined: FxHashMap<Variable, usize> = FxHashMap::default();
        let mut open_blocks: Vec<OpenBlock> = Vec::new();
        let mut context_stack: Vec<Context> = vec![Context::SCRIPT];

        for (i, instr) in self.instructions.iter().enumerate() {
            if instr.is_block_end() {
                if open_blocks.pop().is_none() {
                    return Err(ILError::UnmatchedBlockEnd(i));
                }
                context_stack.pop();
                if context_stack.is_empty() {
                    return Err(ILError::UnmatchedBlockEnd(i));
                }
            }

            let required = instr.operation.metadata().required_context;
            let available = *context_stack.last().unwrap();
            if !available.contains(required) {
                return Err(ILError::ContextViolation {
                    index: i,
                    required,
                    available,
                });
            }

            let meta = instr.operation.metadata();
            if instr.inputs.len() != meta.num_inputs {
                return Err(ILError::ArityMismatch {
                    index: i,
                    expected: meta.num_inputs,
                    actual: instr.inputs.len(),
                });
            }

            for &input in instr.inputs.iter() {
                match defined.get(&input) {
                    None => return Err(ILError::UndefinedVariable(input)),
                    Some(&def_index) => {
                        if def_index >= i {
                            return Err(ILError::UndefinedVariable(input));
                        }
                        // Scope-correctness: if the defining instruction opened
                        // an inner-output binding (e.g. a catch parameter) that
                        // block must still be open at the use site.
                        if !self.is_visible(def_index, i, &open_blocks) {
                            return Err(ILError::OutOfScope(input));
                        }
                    }
                }
            }

            for output in instr.all_outputs() {
                if defined.contains_key(&output) {
                    return Err(ILError::DuplicateDefinition(output));
                }
                defined.insert(output, i);
            }

            if instr.is_block_start() {
                open_blocks.push(OpenBlock {
                    start_index: i,
                    contributed: meta.contributed_context,
                });
                context_stack.push(available | meta.contributed_context);
            }
        }

        if !open_blocks.is_empty() {
            return Err(ILError::UnmatchedBlockStart {
                open: open_blocks[0].start_index,
            });
        }

        Ok(())
    }

    /// All variables already defined and still in scope immediately before
    /// instruction `index` runs. Used by mutators (`ilfuzz-mutate`) that
    /// need a legal replacement input without re-deriving scope rules.
    pub fn visible_variables_at(&self, index: usize) -> FxHashSet<Variable> {
        let mut defined: FxHashMap<Variable, usize> = FxHashMap::default();
        let mut open_blocks: Vec<OpenBlock> = Vec::new();

        for (i, instr) in self.instructions.iter().enumerate().take(index) {
            if instr.is_block_end() && !open_blocks.is_empty() {
                open_blocks.pop();
            }
            for output in instr.all_outputs() {
                defined.insert(output, i);
            }
            if instr.is_block_start() {
                open_blocks.push(OpenBlock {
                    start_index: i,
                    contributed: instr.operation.metadata().contributed_context,
                });
            }
        }

        defined
            .iter()
            .filter(|&(_, &def_index)| self.is_visible(def_index, index, &open_blocks))
            .map(|(&v, _)| v)
            .collect()
    }

    /// Whether a variable defined as an inner-output at `def_index` is still
    /// visible at `use_index`, given the currently open block stack. Plain
    /// (non-inner) outputs are always visible once defined; inner outputs
    /// belong to whichever block is open at their definition and die when
    /// that block closes.
    fn is_visible(&self, def_index: usize, _use_index: usize, open_blocks: &[OpenBlock]) -> bool {
        let def_instr = &self.instructions[def_index];

        // A plain output is visible anywhere after its definition (already
        // enforced by `def_index < i` above). An inner-output is visible
        // only while the block it was produced for remains open, i.e. the
        // defining instruction's index is still represented on the open
        // block stack.
        if def_instr.inner_outputs.is_empty() {
            true
        } else {
            open_blocks.iter().any(|b| b.start_index == def_index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::VarList;
    use crate::operation::Operation;

    fn instr(op: Operation, inputs: &[Variable], outputs: &[Variable]) -> Instruction {
        Instruction::new(
            op,
            VarList::from_slice(inputs),
            VarList::from_slice(outputs),
            VarList::new(),
            0,
        )
    }

    #[test]
    fn empty_code_validates() {
        assert!(Code::new().validate().is_ok());
    }

    #[test]
    fn use_before_def_is_rejected() {
        let mut code = Code::new();
        code.push(instr(Operation::Print, &[Variable::new(0)], &[]));
        assert!(matches!(
            code.validate(),
            Err(ILError::UndefinedVariable(_))
        ));
    }

    #[test]
    fn unmatched_block_end_is_rejected() {
        let mut code = Code::new();
        code.push(instr(Operation::EndIf, &[], &[]));
        assert!(matches!(code.validate(), Err(ILError::UnmatchedBlockEnd(0))));
    }

    #[test]
    fn visible_variables_excludes_closed_inner_outputs() {
        let mut code = Code::new();
        code.push(instr(Operation::LoadBoolean(true), &[], &[Variable::new(0)]));
        code.push(Instruction::new(
            Operation::BeginFor,
            VarList::from_slice(&[Variable::new(0), Variable::new(0), Variable::new(0)]),
            VarList::new(),
            VarList::from_slice(&[Variable::new(1)]),
            1,
        ));
        code.push(instr(Operation::Print, &[Variable::new(1)], &[]));
        code.push(instr(Operation::EndFor, &[], &[]));
        code.push(instr(Operation::Print, &[Variable::new(0)], &[]));

        let inside_loop = code.visible_variables_at(2);
        assert!(inside_loop.contains(&Variable::new(1)));
        assert!(inside_loop.contains(&Variable::new(0)));

        let after_loop = code.visible_variables_at(4);
        assert!(!after_loop.contains(&Variable::new(1)));
        assert!(after_loop.contains(&Variable::new(0)));
    }

    #[test]
    fn well_formed_if_validates() {
        let mut code = Code::new();
        code.push(instr(Operation::LoadBoolean(true), &[], &[Variable::new(0)]));
        code.push(instr(Operation::BeginIf, &[Variable::new(0)], &[]));
        code.push(instr(Operation::Print, &[Variable::new(0)], &[]));
        code.push(instr(Operation::EndIf, &[], &[]));
        assert!(code.validate().is_ok());
    }

    use proptest::prelude::*;

    proptest! {
        /// Any well-nested stack of `if` blocks around a run of integer
        /// literals validates (testable properties #2-#4 in spec §8) and
        /// round-trips through the binary format unchanged (property #5).
        #[test]
        fn nested_if_blocks_validate_and_round_trip(
            depth in 0usize..6,
            values in proptest::collection::vec(any::<i64>(), 0..6),
        ) {
            let cond = Variable::new(0);
            let mut code = Code::new();
            code.push(instr(Operation::LoadBoolean(true), &[], &[cond]));
            for _ in 0..depth {
                code.push(instr(Operation::BeginIf, &[cond], &[]));
            }
            for (i, value) in values.iter().enumerate() {
                let out = Variable::new(1 + i as u32);
                code.push(instr(Operation::LoadInteger(*value), &[], &[out]));
            }
            for _ in 0..depth {
                code.push(instr(Operation::EndIf, &[], &[]));
            }

            prop_assert!(code.validate().is_ok());

            let program = crate::program::Program::from_code(code.clone());
            let bytes = crate::format::encode(&program);
            let decoded = crate::format::decode(&bytes).unwrap();
            prop_assert_eq!(decoded.code(), &code);
        }
    }
}
