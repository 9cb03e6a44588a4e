//! `ProgramBuilder`: the mutable program-under-construction (spec §4.2).
//!
//! A scratchpad maintaining a growing [`Code`], a context stack, a scope
//! stack, an incrementally-updated variable→type map, a variable pool, and
//! a probing set, exposing the operations generators and mutators use to
//! build or extend a program.

use rand::{Rng, RngCore};
use rustc_hash::{FxHashMap, FxHashSet};

use ilfuzz_il::{
    Code, Context, Environment, Fingerprint, ILType, Instruction, Operation, Program,
    TypeAnalyzer, TypeState, VarList, Variable, VariableAllocator,
};

use crate::context::ContextStack;
use crate::error::{BuilderError, Result};
use crate::generators::GeneratorRegistry;
use crate::scope::ScopeStack;
use crate::varpool::VariablePool;

/// Which strategy `ProgramBuilder::build` should use to append instructions.
pub enum BuildMethod<'a> {
    /// Sample the weighted code-generator registry.
    Generating,
    /// Splice contiguous fragments out of existing corpus programs.
    Splicing { sources: &'a [Program] },
}

pub struct ProgramBuilder<'env> {
    env: &'env Environment,
    code: Code,
    var_alloc: VariableAllocator,
    context_stack: ContextStack,
    scope_stack: ScopeStack,
    var_pool: VariablePool,
    type_state: TypeState,
    strict: bool,
    parent: Option<Fingerprint>,
    contributors: Vec<String>,
}

impl<'env> ProgramBuilder<'env> {
    pub fn new(env: &'env Environment) -> Self {
        Self {
            env,
            code: Code::new(),
            var_alloc: VariableAllocator::new(),
            context_stack: ContextStack::new(),
            scope_stack: ScopeStack::new(),
            var_pool: VariablePool::new(),
            type_state: TypeState::default(),
            strict: false,
            parent: None,
            contributors: Vec::new(),
        }
    }

    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn seeded_from(mut self, parent: Fingerprint) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn tag_contributor(&mut self, name: impl Into<String>) {
        self.contributors.push(name.into());
    }

    pub fn env(&self) -> &'env Environment {
        self.env
    }

    pub fn code(&self) -> &Code {
        &self.code
    }

    pub fn current_context(&self) -> Context {
        self.context_stack.current()
    }

    pub fn type_of(&self, v: Variable) -> ILType {
        self.type_state.get(&v).cloned().unwrap_or_else(ILType::anything)
    }

    pub fn visible_variables(&self) -> impl Iterator<Item = Variable> + '_ {
        self.scope_stack.visible_variables()
    }

    /// `append(operation, inputs)` (spec §4.2): validates arity and context
    /// strictly (a caller providing the wrong arity/context for an
    /// operation is a programmer bug); input *type* mismatches are a
    /// warning unless strict mode is enabled, per §4.2 "at most a warning,
    /// strict mode optional".
    pub fn append(&mut self, operation: Operation, inputs: &[Variable]) -> Result<VarList> {
        let meta = operation.metadata();

        if inputs.len() != meta.num_inputs {
            return Err(BuilderError::ArityMismatch {
                expected: meta.num_inputs,
                actual: inputs.len(),
            });
        }

        let available = self.context_stack.current();
        if !available.contains(meta.required_context) {
            return Err(BuilderError::ContextViolation {
                required: meta.required_context,
                available,
            });
        }

        if self.strict {
            for &input in inputs {
                if self.type_of(input).is_nothing() {
                    return Err(BuilderError::Invalid(ilfuzz_il::ILError::UndefinedVariable(input)));
                }
            }
        }

        if operation.is_block_end() {
            if self.context_stack.pop().is_none() {
                return Err(BuilderError::NoOpenBlock);
            }
            let leaving = self.scope_stack.pop_level();
            self.var_pool.remove_out_of_scope(|v| !leaving.contains(&v));
        }

        let is_block_start = operation.is_block_start();
        let contributed = meta.contributed_context;
        let mnemonic = operation.mnemonic();

        let index = self.code.len();
        let mut outputs = VarList::new();
        for _ in 0..meta.num_outputs {
            outputs.push(self.var_alloc.next());
        }
        let mut inner_outputs = VarList::new();
        for _ in 0..meta.num_inner_outputs {
            inner_outputs.push(self.var_alloc.next());
        }

        self.code.push(Instruction::new(
            operation,
            VarList::from_slice(inputs),
            outputs.clone(),
            inner_outputs.clone(),
            index,
        ));

        for &v in &outputs {
            self.scope_stack.declare(v);
        }

        if is_block_start {
            self.context_stack.push(contributed, mnemonic);
            self.scope_stack.push_level();
            for &v in &inner_outputs {
                self.scope_stack.declare(v);
            }
        }

        self.retype();

        for &v in outputs.iter().chain(inner_outputs.iter()) {
            let ty = self.type_of(v);
            self.var_pool.insert(v, ty);
        }

        Ok(outputs)
    }

    /// Re-runs the type analyzer over the whole program-so-far. Simpler and
    /// a more literal reading of spec §4.2 ("updated incrementally by
    /// running the analyzer on each appended instruction") than a truly
    /// incremental analyzer would be; acceptable because `build()` budgets
    /// are O(tens) of instructions, not O(thousands).
    #[tracing::instrument(level = "trace", skip_all, fields(len = self.code.len()))]
    fn retype(&mut self) {
        let analyzer = TypeAnalyzer::new(self.env);
        let analysis = analyzer.run(&self.code, TypeState::default());
        self.type_state = analysis.state_after(self.code.len().checked_sub(1));
    }

    /// `buildPrefix()` (spec §4.2, glossary "Prefix"): seeds the program
    /// with a small pool of typed variables, one per interesting base type,
    /// so subsequent generators have inputs.
    pub fn build_prefix(&mut self, count: usize, rng: &mut dyn RngCore) {
        let candidates: [fn(&Environment) -> Operation; 6] = [
            |env| Operation::LoadInteger(*env.interesting_integers().first().unwrap_or(&0)),
            |env| Operation::LoadFloat(*env.interesting_floats().first().unwrap_or(&0.0)),
            |_| Operation::LoadBigInt(1),
            |_| Operation::LoadBoolean(true),
            |env| {
                Operation::LoadString(
                    env.interesting_strings()
                        .first()
                        .map(|s| s.to_string())
                        .unwrap_or_default(),
                )
            },
            |_| Operation::CreateObject { keys: vec![] },
        ];
        let n = count.clamp(1, candidates.len());
        let mut indices: Vec<usize> = (0..candidates.len()).collect();
        for i in 0..n {
            let j = rng.gen_range(i..indices.len());
            indices.swap(i, j);
        }
        for &i in indices.iter().take(n) {
            let op = candidates[i](self.env);
            let _ = self.append(op, &[]);
        }
    }

    /// `findOrGenerate(type)` (spec §4.2): returns an existing variable of
    /// `type`, or invokes a registered producing generator, or reaches into
    /// the environment to construct one, falling back to `jsAnything`.
    pub fn find_or_generate(
        &mut self,
        ty: &ILType,
        registry: &GeneratorRegistry,
        rng: &mut dyn RngCore,
    ) -> Variable {
        if let Some(v) = self.var_pool.find(ty) {
            return v;
        }

        if let Some(entry) = registry.find_producer_of(ty, self.context_stack.current(), rng) {
            let emit = entry.emit;
            let env = self.env;
            if emit(self, env, rng).is_ok() {
                if let Some(v) = self.var_pool.find(ty) {
                    return v;
                }
            }
        }

        if let Some(group) = ty.group() {
            if self.env.builtins().any(|(name, _)| name == group) {
                if let Ok(outs) = self.append(Operation::LoadBuiltin(group.to_string()), &[]) {
                    let ctor = outs[0];
                    if let Ok(outs) = self.append(Operation::Construct { guarded: false }, &[ctor]) {
                        return outs[0];
                    }
                }
            }
        }

        if let Some(v) = self.var_pool.find_any_may_be(ty) {
            return v;
        }

        self.append(Operation::LoadUndefined, &[])
            .map(|outs| outs[0])
            .unwrap_or_else(|_| self.var_alloc.next())
    }

    /// `build(n, by)` (spec §4.2): appends approximately `n` instructions.
    /// Budgets are approximate because generators may open blocks that must
    /// be closed before the budget is considered spent.
    pub fn build(
        &mut self,
        approx_n: usize,
        method: BuildMethod<'_>,
        registry: &GeneratorRegistry,
        rng: &mut dyn RngCore,
    ) -> usize {
        let start_len = self.code.len();
        let start_depth = self.context_stack.depth();
        let mut appended = 0usize;

        match method {
            BuildMethod::Generating => {
                while appended < approx_n {
                    let ctx = self.context_stack.current();
                    let Some(entry) = registry.sample(ctx, rng) else {
                        break;
                    };
                    let emit = entry.emit;
                    let env = self.env;
                    if emit(self, env, rng).is_ok() {
                        appended += 1;
                    }
                }
                while self.context_stack.depth() > start_depth {
                    self.close_innermost_block();
                }
            }
            BuildMethod::Splicing { sources } => {
                while appended < approx_n && !sources.is_empty() {
                    let idx = rng.gen_range(0..sources.len());
                    self.splice(&sources[idx], rng);
                    appended += 1;
                }
            }
        }

        let grown = self.code.len().saturating_sub(start_len);
        tracing::debug!(requested = approx_n, grown, "build finished");
        grown
    }

    /// Closes whatever block is innermost, using the context stack's label
    /// (the mnemonic of the instruction that opened it) to choose a
    /// matching end-operation, filling whatever inputs it needs from
    /// whatever's visible. Used to make `build`'s approximate budget leave
    /// well-formed code behind.
    fn close_innermost_block(&mut self) {
        let Some(label) = self.context_stack.top_label() else {
            return;
        };
        let end_op = match label {
            "BeginIf" | "BeginElse" => Operation::EndIf,
            "BeginWhile" => Operation::EndWhile,
            "BeginDoWhile" => Operation::EndDoWhile,
            "BeginFor" => Operation::EndFor,
            "BeginForIn" => Operation::EndForIn,
            "BeginForOf" => Operation::EndForOf,
            "BeginSwitch" => Operation::EndSwitch,
            "BeginSwitchCase" => Operation::EndSwitchCase { falls_through: false },
            "BeginTry" | "BeginCatch" | "BeginFinally" => Operation::EndTryCatchFinally,
            "BeginClassDefinition" => Operation::EndClassDefinition,
            "BeginClassMember" => Operation::EndClassMember,
            "BeginPlainFunction" => Operation::EndPlainFunction,
            "BeginWith" => Operation::EndWith,
            "WasmBeginModule" => Operation::WasmEndModule,
            "WasmBeginFunction" => Operation::WasmEndFunction,
            "WasmBeginBlock" => Operation::WasmEndBlock,
            "BeginGuard" => Operation::EndGuard { fired: false },
            _ => Operation::Nop,
        };

        let needed = end_op.metadata().num_inputs;
        let mut inputs = VarList::new();
        for _ in 0..needed {
            match self.scope_stack.visible_variables().next() {
                Some(v) => inputs.push(v),
                None => return,
            }
        }
        let _ = self.append(end_op, &inputs);
    }

    /// `splice(from)` (spec §4.2): picks a contiguous slice of instructions
    /// from `from` whose required context is satisfiable here, renames its
    /// variables, and appends; holes for inputs from outside the slice are
    /// filled from the current variable pool by type. Leaves the builder
    /// unchanged (silently skipped, per §4.2 failure semantics) if no
    /// satisfiable slice exists; returns whether anything was appended.
    pub fn splice(&mut self, from: &Program, rng: &mut dyn RngCore) -> bool {
        let src = from.code();
        if src.is_empty() {
            return false;
        }

        let start = rng.gen_range(0..src.len());
        let mut depth = 0i32;
        let mut end = start;
        for (offset, instr) in src.as_slice()[start..].iter().enumerate() {
            if instr.is_block_start() {
                depth += 1;
            } else if instr.is_block_end() {
                depth -= 1;
            }
            end = start + offset;
            if depth <= 0 {
                break;
            }
        }
        if depth > 0 {
            return false;
        }

        let slice_required_context = src.context_at(start);
        if !self.context_stack.current().contains(slice_required_context) {
            return false;
        }

        let mut rename: FxHashMap<Variable, Variable> = FxHashMap::default();
        let mut defined_in_slice: FxHashSet<Variable> = FxHashSet::default();
        for instr in &src.as_slice()[start..=end] {
            for v in instr.all_outputs() {
                defined_in_slice.insert(v);
            }
        }

        for instr in &src.as_slice()[start..=end] {
            let mut new_inputs = VarList::new();
            for &input in instr.inputs.iter() {
                if defined_in_slice.contains(&input) {
                    let renamed = *rename.entry(input).or_insert_with(|| self.var_alloc.next());
                    new_inputs.push(renamed);
                } else {
                    let ty = ILType::anything();
                    let replacement = self.var_pool.find(&ty).unwrap_or_else(|| {
                        self.scope_stack
                            .visible_variables()
                            .next()
                            .unwrap_or_else(|| self.var_alloc.next())
                    });
                    new_inputs.push(replacement);
                }
            }

            let mut new_outputs = VarList::new();
            for &out in instr.outputs.iter() {
                let renamed = *rename.entry(out).or_insert_with(|| self.var_alloc.next());
                new_outputs.push(renamed);
            }
            let mut new_inner = VarList::new();
            for &out in instr.inner_outputs.iter() {
                let renamed = *rename.entry(out).or_insert_with(|| self.var_alloc.next());
                new_inner.push(renamed);
            }

            let index = self.code.len();
            let is_start = instr.is_block_start();
            let is_end = instr.is_block_end();
            let contributed = instr.operation.metadata().contributed_context;
            let mnemonic = instr.operation.mnemonic();

            self.code.push(Instruction::new(
                instr.operation.clone(),
                new_inputs,
                new_outputs.clone(),
                new_inner.clone(),
                index,
            ));
            for &v in &new_outputs {
                self.scope_stack.declare(v);
            }
            if is_start {
                self.context_stack.push(contributed, mnemonic);
                self.scope_stack.push_level();
                for &v in &new_inner {
                    self.scope_stack.declare(v);
                }
            } else if is_end {
                self.context_stack.pop();
                self.scope_stack.pop_level();
            }
        }

        self.retype();
        for &new_v in rename.values() {
            let ty = self.type_of(new_v);
            self.var_pool.insert(new_v, ty);
        }
        true
    }

    /// `finalize()` (spec §4.2): produces an immutable `Program`, renumbers
    /// instructions, and verifies invariants.
    pub fn finalize(mut self) -> Result<Program> {
        if self.context_stack.depth() != 0 {
            return Err(BuilderError::UnclosedBlocks(self.context_stack.depth()));
        }
        self.code.renumber();
        self.code.validate()?;
        Ok(Program::new(self.code, self.parent, self.contributors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ilfuzz_il::MinimalProfile;
    use rand::SeedableRng;

    fn env() -> Environment {
        let mut env = Environment::new();
        env.apply(&MinimalProfile);
        env
    }

    #[test]
    fn prefix_then_literal_finalizes() {
        let env = env();
        let mut builder = ProgramBuilder::new(&env);
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        builder.build_prefix(3, &mut rng);
        builder.append(Operation::LoadInteger(42), &[]).unwrap();
        let program = builder.finalize().unwrap();
        assert!(program.code().validate().is_ok());
    }

    #[test]
    fn append_rejects_wrong_arity() {
        let env = env();
        let mut builder = ProgramBuilder::new(&env);
        let err = builder.append(Operation::LoadInteger(1), &[Variable::new(0)]);
        assert!(matches!(err, Err(BuilderError::ArityMismatch { .. })));
    }

    #[test]
    fn append_rejects_wrong_context() {
        let env = env();
        let mut builder = ProgramBuilder::new(&env);
        let err = builder.append(Operation::Return, &[Variable::new(0)]);
        assert!(matches!(
            err,
            Err(BuilderError::ArityMismatch { .. }) | Err(BuilderError::ContextViolation { .. })
        ));
    }

    #[test]
    fn if_block_closes_cleanly() {
        let env = env();
        let mut builder = ProgramBuilder::new(&env);
        let cond = builder.append(Operation::LoadBoolean(true), &[]).unwrap()[0];
        builder.append(Operation::BeginIf, &[cond]).unwrap();
        builder.append(Operation::Print, &[cond]).unwrap();
        builder.append(Operation::EndIf, &[]).unwrap();
        let program = builder.finalize().unwrap();
        assert_eq!(program.code().len(), 3);
    }

    #[test]
    fn unclosed_block_fails_finalize() {
        let env = env();
        let mut builder = ProgramBuilder::new(&env);
        let cond = builder.append(Operation::LoadBoolean(true), &[]).unwrap()[0];
        builder.append(Operation::BeginIf, &[cond]).unwrap();
        assert!(matches!(builder.finalize(), Err(BuilderError::UnclosedBlocks(1))));
    }

    #[test]
    fn build_with_generating_closes_leftover_blocks() {
        let env = env();
        let mut builder = ProgramBuilder::new(&env);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let registry = GeneratorRegistry::default_pool();
        builder.build_prefix(3, &mut rng);
        builder.build(12, BuildMethod::Generating, &registry, &mut rng);
        assert!(builder.finalize().is_ok());
    }

    use proptest::prelude::*;

    proptest! {
        /// For any seed and budget, `build_prefix` + `build(Generating)` +
        /// `finalize` either yields a program whose code validates (spec §8
        /// property #1: the analyzer accepts every instruction of anything
        /// the builder finalizes) with every variable defined exactly once
        /// (property #2), or the budget was too small to close every block
        /// `close_innermost_block` can't reach — never a panic.
        #[test]
        fn generated_programs_always_finalize_validly(seed: u64, n in 1usize..40) {
            let env = env();
            let registry = GeneratorRegistry::default_pool();
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let mut builder = ProgramBuilder::new(&env);
            builder.build_prefix(4, &mut rng);
            builder.build(n, BuildMethod::Generating, &registry, &mut rng);

            let program = builder.finalize();
            prop_assert!(program.is_ok());
            let program = program.unwrap();
            prop_assert!(program.code().validate().is_ok());

            let mut defined = std::collections::HashSet::new();
            for instr in program.code().iter() {
                for v in instr.all_outputs() {
                    prop_assert!(defined.insert(v));
                }
            }
        }
    }
}
