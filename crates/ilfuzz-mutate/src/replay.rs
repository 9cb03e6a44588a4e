//! Shared replay machinery: feeding an existing, already-valid [`Code`]
//! back through a fresh [`ProgramBuilder`], remapping variable identities as
//! it goes.
//!
//! Several mutators (`SpliceMutator`, `CombineMutator`, `ConcatMutator`,
//! `CodeGenMutator`) need to interleave one program's instructions with
//! newly generated or foreign material at an arbitrary cut point; the
//! builder only knows how to append at its current position, so "insert in
//! the middle" becomes "replay the prefix, do the insertion, replay the
//! suffix" with a translation table carrying old variable ids to the new
//! ones the builder allocated for them (spec §9 "Variable identity": an
//! O(n) table lookup, never a pointer fixup).

use rustc_hash::FxHashMap;

use ilfuzz_builder::ProgramBuilder;
use ilfuzz_il::{Code, Instruction, VarList, Variable};

/// Replays one instruction into `builder`, remapping its inputs through
/// `translation` and recording where its outputs (and inner outputs) landed.
/// Returns `false` if an input has no known translation (its defining
/// instruction was not part of whatever's been replayed so far) or if the
/// builder rejected the instruction outright (context/arity violation).
pub fn replay_one(
    builder: &mut ProgramBuilder<'_>,
    instr: &Instruction,
    translation: &mut FxHashMap<Variable, Variable>,
) -> bool {
    let mut new_inputs = VarList::new();
    for &input in instr.inputs.iter() {
        match translation.get(&input) {
            Some(&v) => new_inputs.push(v),
            None => return false,
        }
    }

    if builder.append(instr.operation.clone(), &new_inputs).is_err() {
        return false;
    }

    let appended = builder
        .code()
        .as_slice()
        .last()
        .expect("append just pushed an instruction");
    for (orig, new) in instr.outputs.iter().zip(appended.outputs.iter()) {
        translation.insert(*orig, *new);
    }
    for (orig, new) in instr.inner_outputs.iter().zip(appended.inner_outputs.iter()) {
        translation.insert(*orig, *new);
    }
    true
}

/// Replays every instruction in `range` in order; stops and returns `false`
/// on the first instruction `replay_one` can't place.
pub fn replay_range(
    builder: &mut ProgramBuilder<'_>,
    code: &Code,
    range: std::ops::Range<usize>,
    translation: &mut FxHashMap<Variable, Variable>,
) -> bool {
    for instr in &code.as_slice()[range] {
        if !replay_one(builder, instr, translation) {
            return false;
        }
    }
    true
}
