//! Program: the immutable, owned bundle produced by `ProgramBuilder::finalize`
//! (spec §3 "Program", "Program lifecycle").

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::code::Code;

/// A structural fingerprint used for corpus deduplication and parent
/// tracking. Two programs with identical `Code` hash identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub fn of(code: &Code) -> Self {
        let mut hasher = DefaultHasher::new();
        for instr in code.iter() {
            instr.operation.mnemonic().hash(&mut hasher);
            instr.inputs.len().hash(&mut hasher);
            instr.outputs.len().hash(&mut hasher);
            // Hash a debug rendering of the operation so that attribute
            // changes (new literal, renamed property) also change the
            // fingerprint, while variable identities (renamed by splicing)
            // do not.
            format!("{:?}", instr.operation).hash(&mut hasher);
        }
        Fingerprint(hasher.finish())
    }
}

/// Which generators/mutators/templates touched a program on its way to
/// existing, for statistics and diagnostics. Whether this list is
/// propagated through subsequent mutations is Open Question (a) in spec §9;
/// this implementation keeps the *original* template's tag through the
/// whole mutation chain so that `HybridEngine`'s per-template statistics
/// attribute a mutated program's eventual interestingness back to the
/// template that started it (see DESIGN.md).
pub type Contributors = Vec<String>;

/// Immutable program bundle (spec §3 "Program"). Clone is O(n); equality is
/// structural (`Code` derives `PartialEq`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    code: Code,
    parent: Option<Fingerprint>,
    contributors: Contributors,
}

impl Program {
    pub(crate) fn new(code: Code, parent: Option<Fingerprint>, contributors: Contributors) -> Self {
        Self {
            code,
            parent,
            contributors,
        }
    }

    /// Builds a program directly from already-validated `Code`, with no
    /// parent/contributors. The normal construction path is
    /// `ProgramBuilder::finalize`; this exists for callers that work on
    /// `Code` directly after the fact (`ilfuzz-corpus::Minimizer`'s
    /// reduce/inline/simplify passes, and decoding from the binary format).
    pub fn from_code(code: Code) -> Self {
        Self {
            code,
            parent: None,
            contributors: Vec::new(),
        }
    }

    pub fn code(&self) -> &Code {
        &self.code
    }

    pub fn parent(&self) -> Option<Fingerprint> {
        self.parent
    }

    pub fn contributors(&self) -> &[String] {
        &self.contributors
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.code)
    }

    pub fn size(&self) -> usize {
        self.code.len()
    }

    /// Re-derives a program with the same contributors/parent but different
    /// code, used by the minimizer (which must preserve provenance while
    /// shrinking instructions) and by mutators that hand back a
    /// freshly-finalized variant via the builder instead.
    pub fn with_code(&self, code: Code) -> Self {
        Self {
            code,
            parent: self.parent,
            contributors: self.contributors.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Instruction, VarList};
    use crate::operation::Operation;
    use crate::variable::Variable;

    #[test]
    fn fingerprint_is_structural_not_positional_in_memory() {
        let mut a = Code::new();
        a.push(Instruction::new(
            Operation::LoadInteger(1),
            VarList::new(),
            VarList::from_slice(&[Variable::new(0)]),
            VarList::new(),
            0,
        ));
        let b = a.clone();
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
    }

    #[test]
    fn fingerprint_changes_with_literal_value() {
        let mut a = Code::new();
        a.push(Instruction::new(
            Operation::LoadInteger(1),
            VarList::new(),
            VarList::from_slice(&[Variable::new(0)]),
            VarList::new(),
            0,
        ));
        let mut b = Code::new();
        b.push(Instruction::new(
            Operation::LoadInteger(2),
            VarList::new(),
            VarList::from_slice(&[Variable::new(0)]),
            VarList::new(),
            0,
        ));
        assert_ne!(Fingerprint::of(&a), Fingerprint::of(&b));
    }
}
