//! The nine mutators of spec §4.4, each `(Program, &MutationContext) ->
//! Option<Program>`. All of them preserve IL invariants or return `None`;
//! none of them panic on a parent that already passed `finalize`.

use rand::{Rng, RngCore};
use rustc_hash::FxHashMap;

use ilfuzz_builder::{BuildMethod, ProgramBuilder};
use ilfuzz_il::{
    BaseType, Code, Environment, ILType, Instruction, Operation, PropertyKey, Program,
    TypeAnalyzer, TypeState, VarList, Variable,
};

use crate::context::MutationContext;
use crate::replay::{replay_one, replay_range};

/// A transformation over an existing, already-finalized program. Returns
/// `None` rather than panicking whenever no eligible rewrite site exists or
/// the rewrite would violate an IL invariant (spec §4.4).
pub trait Mutator: Send + Sync {
    fn name(&self) -> &'static str;

    fn mutate(&self, program: &Program, ctx: &MutationContext<'_>, rng: &mut dyn RngCore) -> Option<Program>;
}

// ---------------------------------------------------------------------
// OperationMutator: rewrite immediate attributes of a random instruction.
// ---------------------------------------------------------------------

pub struct OperationMutator;

impl Mutator for OperationMutator {
    fn name(&self) -> &'static str {
        "OperationMutator"
    }

    fn mutate(&self, program: &Program, ctx: &MutationContext<'_>, rng: &mut dyn RngCore) -> Option<Program> {
        let code = program.code();
        if code.is_empty() {
            return None;
        }
        let mut instructions = code.as_slice().to_vec();

        for _ in 0..8 {
            let idx = rng.gen_range(0..instructions.len());
            let Some(new_op) = mutate_attributes(&instructions[idx].operation, ctx.env, rng) else {
                continue;
            };
            let original = instructions[idx].operation.clone();
            instructions[idx].operation = new_op;

            let mut new_code = Code::from_instructions(instructions.clone());
            new_code.renumber();
            if new_code.validate().is_ok() {
                return Some(program.with_code(new_code));
            }
            instructions[idx].operation = original;
        }
        None
    }
}

/// Rewrites one attribute of `op` in place, keeping arity (and therefore IL
/// validity) unchanged: a literal value, a property/method name, a guard
/// flag, or similar. Returns `None` for operations with nothing mutable
/// (`Nop`, block-ends, pure control-flow markers).
fn mutate_attributes(op: &Operation, env: &Environment, rng: &mut dyn RngCore) -> Option<Operation> {
    use Operation::*;

    let mut new_op = op.clone();
    let mut changed = false;

    if op.is_guardable() && rng.gen_bool(0.5) {
        new_op.set_guarded(!op.is_guarded());
        changed = true;
    }

    match &mut new_op {
        LoadInteger(v) => {
            *v = pick_integer(env, rng);
            changed = true;
        }
        LoadFloat(v) => {
            *v = pick_float(env, rng);
            changed = true;
        }
        LoadBigInt(v) => {
            *v = rng.gen_range(-1000..1000);
            changed = true;
        }
        LoadString(v) => {
            *v = pick_string(env, rng);
            changed = true;
        }
        LoadBoolean(v) => {
            *v = !*v;
            changed = true;
        }
        LoadRegExp { pattern, flags } => {
            const FLAG_SETS: &[&str] = &["", "g", "i", "gi", "m", "gim"];
            *pattern = pick_string(env, rng);
            *flags = pick(rng, FLAG_SETS).to_string();
            changed = true;
        }
        LoadBuiltin(name) => {
            let names: Vec<&str> = env.builtins().map(|(n, _)| n).collect();
            if !names.is_empty() {
                *name = pick(rng, &names).to_string();
                changed = true;
            }
        }
        CreateObject { keys } => {
            let names: Vec<&str> = env.property_names().collect();
            if !names.is_empty() {
                if let Some(PropertyKey::Named(n)) = keys.iter_mut().find(|k| matches!(k, PropertyKey::Named(_))) {
                    *n = pick(rng, &names).to_string();
                    changed = true;
                }
            }
        }
        GetProperty { name, .. } | SetProperty { name } | DeleteProperty { name, .. } => {
            let names: Vec<&str> = env.property_names().collect();
            if !names.is_empty() {
                *name = pick(rng, &names).to_string();
                changed = true;
            }
        }
        CallMethod { name, .. } => {
            let names: Vec<&str> = env.method_names().collect();
            if !names.is_empty() {
                *name = pick(rng, &names).to_string();
                changed = true;
            }
        }
        BeginPlainFunction { is_strict, .. } => {
            *is_strict = !*is_strict;
            changed = true;
        }
        BeginClassMember { name, is_static, .. } => {
            *is_static = !*is_static;
            let names: Vec<&str> = env.method_names().collect();
            if !names.is_empty() {
                *name = pick(rng, &names).to_string();
            }
            changed = true;
        }
        CreateTypedArray { kind } => {
            const KINDS: &[&str] = &["Int8Array", "Uint8Array", "Int32Array", "Float64Array", "BigInt64Array"];
            *kind = pick(rng, KINDS).to_string();
            changed = true;
        }
        WasmOpaque { mnemonic } => {
            *mnemonic = format!("op{}", rng.gen_range(0..64));
            changed = true;
        }
        EndSwitchCase { falls_through } => {
            *falls_through = !*falls_through;
            changed = true;
        }
        EndGuard { fired } => {
            *fired = !*fired;
            changed = true;
        }
        Probe { id } => {
            *id = rng.gen_range(0..1000);
            changed = true;
        }
        _ => {}
    }

    if changed {
        Some(new_op)
    } else {
        None
    }
}

fn pick<'a, T: Copy>(rng: &mut dyn RngCore, items: &'a [T]) -> T {
    items[rng.gen_range(0..items.len())]
}

fn pick_integer(env: &Environment, rng: &mut dyn RngCore) -> i64 {
    let pool = env.interesting_integers();
    if pool.is_empty() || rng.gen_bool(0.5) {
        rng.gen_range(-1000..1000)
    } else {
        pick(rng, pool)
    }
}

fn pick_float(env: &Environment, rng: &mut dyn RngCore) -> f64 {
    let pool = env.interesting_floats();
    if pool.is_empty() || rng.gen_bool(0.5) {
        rng.gen_range(-1000.0..1000.0)
    } else {
        pick(rng, pool)
    }
}

fn pick_string(env: &Environment, rng: &mut dyn RngCore) -> String {
    let pool: Vec<String> = env.interesting_strings().iter().map(|s| s.to_string()).collect();
    if pool.is_empty() {
        String::new()
    } else {
        pick(rng, &pool).clone()
    }
}

// ---------------------------------------------------------------------
// InputMutator: replace one input variable with another of compatible type.
// ---------------------------------------------------------------------

pub struct InputMutator;

impl Mutator for InputMutator {
    fn name(&self) -> &'static str {
        "InputMutator"
    }

    fn mutate(&self, program: &Program, ctx: &MutationContext<'_>, rng: &mut dyn RngCore) -> Option<Program> {
        let code = program.code();
        if code.is_empty() {
            return None;
        }
        let analyzer = TypeAnalyzer::new(ctx.env);
        let analysis = analyzer.run(code, TypeState::default());

        for _ in 0..8 {
            let idx = rng.gen_range(0..code.len());
            let instr = code.get(idx)?;
            if instr.inputs.is_empty() {
                continue;
            }
            let input_pos = rng.gen_range(0..instr.inputs.len());
            let old_var = instr.inputs[input_pos];
            let wanted_ty = analysis.type_before(idx, old_var);

            let visible = code.visible_variables_at(idx);
            let candidates: Vec<Variable> = visible
                .into_iter()
                .filter(|&v| v != old_var)
                .filter(|&v| analysis.type_before(idx, v).may_be(&wanted_ty))
                .collect();
            if candidates.is_empty() {
                continue;
            }
            let new_var = pick(rng, &candidates);

            let mut instructions = code.as_slice().to_vec();
            instructions[idx].inputs[input_pos] = new_var;
            let mut new_code = Code::from_instructions(instructions);
            new_code.renumber();
            if new_code.validate().is_ok() {
                return Some(program.with_code(new_code));
            }
        }
        None
    }
}

// ---------------------------------------------------------------------
// SpliceMutator: insert a slice of another corpus program at a random point.
// ---------------------------------------------------------------------

pub struct SpliceMutator;

impl Mutator for SpliceMutator {
    fn name(&self) -> &'static str {
        "SpliceMutator"
    }

    fn mutate(&self, program: &Program, ctx: &MutationContext<'_>, rng: &mut dyn RngCore) -> Option<Program> {
        let source = ctx.corpus.random_program(rng)?;
        let code = program.code();
        if code.is_empty() || source.code().is_empty() {
            return None;
        }

        let cut = rng.gen_range(0..=code.len());
        let mut builder = ProgramBuilder::new(ctx.env).seeded_from(program.fingerprint());
        let mut translation = FxHashMap::default();

        if !replay_range(&mut builder, code, 0..cut, &mut translation) {
            return None;
        }
        let spliced = builder.splice(source, rng);
        if !replay_range(&mut builder, code, cut..code.len(), &mut translation) {
            return None;
        }
        if !spliced {
            return None;
        }

        let built = builder.finalize().ok()?;
        Some(program.with_code(built.code().clone()))
    }
}

// ---------------------------------------------------------------------
// CombineMutator: append another program after rebasing variables.
// ---------------------------------------------------------------------

pub struct CombineMutator;

impl Mutator for CombineMutator {
    fn name(&self) -> &'static str {
        "CombineMutator"
    }

    fn mutate(&self, program: &Program, ctx: &MutationContext<'_>, rng: &mut dyn RngCore) -> Option<Program> {
        let source = ctx.corpus.random_program(rng)?;
        if source.code().is_empty() {
            return None;
        }

        let mut builder = ProgramBuilder::new(ctx.env).seeded_from(program.fingerprint());
        let mut own_translation = FxHashMap::default();
        if !replay_range(&mut builder, program.code(), 0..program.code().len(), &mut own_translation) {
            return None;
        }
        let mut foreign_translation = FxHashMap::default();
        if !replay_range(&mut builder, source.code(), 0..source.code().len(), &mut foreign_translation) {
            return None;
        }

        let built = builder.finalize().ok()?;
        Some(program.with_code(built.code().clone()))
    }
}

// ---------------------------------------------------------------------
// ConcatMutator: concatenate two programs with prefix reconciliation.
// ---------------------------------------------------------------------

pub struct ConcatMutator;

impl Mutator for ConcatMutator {
    fn name(&self) -> &'static str {
        "ConcatMutator"
    }

    fn mutate(&self, program: &Program, ctx: &MutationContext<'_>, rng: &mut dyn RngCore) -> Option<Program> {
        let source = ctx.corpus.random_program(rng)?;
        if source.code().is_empty() {
            return None;
        }

        let mut builder = ProgramBuilder::new(ctx.env).seeded_from(program.fingerprint());
        let mut own_translation = FxHashMap::default();
        // Track which zero-input literal was placed where, keyed by its
        // debug rendering (Operation has float fields so can't derive
        // Eq/Hash; this mirrors `Fingerprint::of`'s own workaround), so the
        // second program's leading literal run can be reconciled against
        // identical values the first program already produced instead of
        // re-emitting them.
        let mut literal_cache: FxHashMap<String, Variable> = FxHashMap::default();

        for instr in program.code().iter() {
            if !replay_one(&mut builder, instr, &mut own_translation) {
                return None;
            }
            if is_zero_input_literal(&instr.operation) {
                if let (Some(&orig_out), Some(&new_out)) =
                    (instr.outputs.first(), own_translation.get(&instr.outputs[0]))
                {
                    let _ = orig_out;
                    literal_cache
                        .entry(format!("{:?}", instr.operation))
                        .or_insert(new_out);
                }
            }
        }

        let mut foreign_translation = FxHashMap::default();
        let mut reconciling = true;
        for instr in source.code().iter() {
            if reconciling && is_zero_input_literal(&instr.operation) {
                if let Some(&existing) = literal_cache.get(&format!("{:?}", instr.operation)) {
                    if let Some(&orig_out) = instr.outputs.first() {
                        foreign_translation.insert(orig_out, existing);
                        continue;
                    }
                }
                reconciling = false;
            } else {
                reconciling = false;
            }
            if !replay_one(&mut builder, instr, &mut foreign_translation) {
                return None;
            }
        }

        let built = builder.finalize().ok()?;
        Some(program.with_code(built.code().clone()))
    }
}

fn is_zero_input_literal(op: &Operation) -> bool {
    matches!(
        op,
        Operation::LoadUndefined
            | Operation::LoadNull
            | Operation::LoadInteger(_)
            | Operation::LoadFloat(_)
            | Operation::LoadBigInt(_)
            | Operation::LoadString(_)
            | Operation::LoadBoolean(_)
    )
}

// ---------------------------------------------------------------------
// CodeGenMutator: insert a freshly generated block at a random point.
// ---------------------------------------------------------------------

pub struct CodeGenMutator;

impl Mutator for CodeGenMutator {
    fn name(&self) -> &'static str {
        "CodeGenMutator"
    }

    fn mutate(&self, program: &Program, ctx: &MutationContext<'_>, rng: &mut dyn RngCore) -> Option<Program> {
        let code = program.code();
        if code.is_empty() {
            return None;
        }
        let cut = rng.gen_range(0..=code.len());
        let mut builder = ProgramBuilder::new(ctx.env).seeded_from(program.fingerprint());
        let mut translation = FxHashMap::default();

        if !replay_range(&mut builder, code, 0..cut, &mut translation) {
            return None;
        }
        let n = rng.gen_range(1..4usize);
        let grown = builder.build(n, BuildMethod::Generating, ctx.generators, rng);
        if !replay_range(&mut builder, code, cut..code.len(), &mut translation) {
            return None;
        }
        if grown == 0 {
            return None;
        }

        let built = builder.finalize().ok()?;
        Some(program.with_code(built.code().clone()))
    }
}

// ---------------------------------------------------------------------
// ExplorationMutator: instrument points with a runtime probe.
// ---------------------------------------------------------------------

pub struct ExplorationMutator;

impl Mutator for ExplorationMutator {
    fn name(&self) -> &'static str {
        "ExplorationMutator"
    }

    fn mutate(&self, program: &Program, _ctx: &MutationContext<'_>, rng: &mut dyn RngCore) -> Option<Program> {
        let code = program.code();
        if code.is_empty() {
            return None;
        }
        let budget = (code.len() / 4).clamp(1, 3);
        let mut out = Vec::with_capacity(code.len() + budget);
        let mut next_id = 0u32;
        let mut inserted = 0usize;

        for instr in code.iter() {
            out.push(instr.clone());
            if inserted < budget {
                if let Some(&v) = instr.outputs.first() {
                    if rng.gen_bool(0.3) {
                        out.push(probe_instruction(v, next_id));
                        next_id += 1;
                        inserted += 1;
                    }
                }
            }
        }
        if inserted == 0 {
            return None;
        }

        let mut new_code = Code::from_instructions(out);
        new_code.renumber();
        new_code.validate().ok()?;
        Some(program.with_code(new_code))
    }
}

/// Resolves `Probe` markers `ExplorationMutator`/`ProbeMutator` left behind,
/// now that a prior execution has reported concrete observations for some
/// of them (probe id -> observed type). Not a `Mutator` impl: only the
/// owning fuzz engine has the runtime feedback this needs, so it calls this
/// directly rather than going through the weighted pool.
///
/// A resolved probe becomes `Nop`: the concrete follow-on action the real
/// fuzzer would splice in (a property access shaped by the observed type)
/// depends on the external lifter's vocabulary, which is out of scope here;
/// collapsing to `Nop` still frees the instruction slot for the minimizer
/// and stops the marker from re-triggering on a later pass.
pub fn resolve_exploration_probes(
    program: &Program,
    observations: &FxHashMap<u32, ILType>,
) -> Option<Program> {
    let mut instructions = program.code().as_slice().to_vec();
    let mut changed = false;
    for instr in instructions.iter_mut() {
        if let Operation::Probe { id } = &instr.operation {
            if observations.contains_key(id) {
                instr.operation = Operation::Nop;
                instr.inputs.clear();
                changed = true;
            }
        }
    }
    if !changed {
        return None;
    }
    let mut new_code = Code::from_instructions(instructions);
    new_code.renumber();
    new_code.validate().ok()?;
    Some(program.with_code(new_code))
}

fn probe_instruction(target: Variable, id: u32) -> Instruction {
    Instruction::new(
        Operation::Probe { id },
        VarList::from_slice(&[target]),
        VarList::new(),
        VarList::new(),
        0,
    )
}

// ---------------------------------------------------------------------
// ProbeMutator: records object shapes/properties to guide property access.
// ---------------------------------------------------------------------

pub struct ProbeMutator;

impl Mutator for ProbeMutator {
    fn name(&self) -> &'static str {
        "ProbeMutator"
    }

    fn mutate(&self, program: &Program, ctx: &MutationContext<'_>, rng: &mut dyn RngCore) -> Option<Program> {
        let code = program.code();
        if code.is_empty() {
            return None;
        }
        let analyzer = TypeAnalyzer::new(ctx.env);
        let analysis = analyzer.run(code, TypeState::default());

        let budget = 2usize;
        let mut out = Vec::with_capacity(code.len() + budget);
        let mut next_id = 0u32;
        let mut inserted = 0usize;

        for (i, instr) in code.iter().enumerate() {
            out.push(instr.clone());
            if inserted >= budget {
                continue;
            }
            let Some(&v) = instr.outputs.first() else {
                continue;
            };
            let ty = analysis.type_after(i, v);
            if ty.base.contains(BaseType::OBJECT) && rng.gen_bool(0.4) {
                out.push(probe_instruction(v, next_id));
                next_id += 1;
                inserted += 1;
            }
        }
        if inserted == 0 {
            return None;
        }

        let mut new_code = Code::from_instructions(out);
        new_code.renumber();
        new_code.validate().ok()?;
        Some(program.with_code(new_code))
    }
}

// ---------------------------------------------------------------------
// FixupMutator: remove guards that did not trigger, given runtime feedback.
// ---------------------------------------------------------------------

pub struct FixupMutator;

impl Mutator for FixupMutator {
    fn name(&self) -> &'static str {
        "FixupMutator"
    }

    fn mutate(&self, program: &Program, ctx: &MutationContext<'_>, _rng: &mut dyn RngCore) -> Option<Program> {
        let fired = ctx.guard_firings?;
        let mut instructions = program.code().as_slice().to_vec();
        let mut changed = false;
        for (i, instr) in instructions.iter_mut().enumerate() {
            if instr.operation.is_guarded() && !fired.contains(&i) {
                instr.operation.set_guarded(false);
                changed = true;
            }
        }
        if !changed {
            return None;
        }
        let mut new_code = Code::from_instructions(instructions);
        new_code.renumber();
        new_code.validate().ok()?;
        Some(program.with_code(new_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CorpusSource;
    use ilfuzz_builder::{BuildMethod, GeneratorRegistry, ProgramBuilder};
    use ilfuzz_il::{MinimalProfile, Operation};
    use rand::SeedableRng;
    use rustc_hash::FxHashSet;

    fn env() -> Environment {
        let mut env = Environment::new();
        env.apply(&MinimalProfile);
        env
    }

    fn sample_program(env: &Environment, seed: u64) -> Program {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let registry = GeneratorRegistry::default_pool();
        let mut builder = ProgramBuilder::new(env);
        builder.build_prefix(4, &mut rng);
        builder.build(10, BuildMethod::Generating, &registry, &mut rng);
        builder.finalize().unwrap()
    }

    struct FixedSource(Vec<Program>);
    impl CorpusSource for FixedSource {
        fn random_program(&self, rng: &mut dyn RngCore) -> Option<&Program> {
            if self.0.is_empty() {
                return None;
            }
            let idx = rng.gen_range(0..self.0.len());
            self.0.get(idx)
        }
    }

    #[test]
    fn operation_mutator_preserves_validity() {
        let env = env();
        let generators = GeneratorRegistry::default_pool();
        let program = sample_program(&env, 1);
        let corpus = FixedSource(vec![]);
        let ctx = MutationContext::new(&env, &generators, &corpus);
        let mut rng = rand::rngs::StdRng::seed_from_u64(2);
        if let Some(mutated) = OperationMutator.mutate(&program, &ctx, &mut rng) {
            assert!(mutated.code().validate().is_ok());
        }
    }

    #[test]
    fn input_mutator_preserves_validity() {
        let env = env();
        let generators = GeneratorRegistry::default_pool();
        let program = sample_program(&env, 3);
        let corpus = FixedSource(vec![]);
        let ctx = MutationContext::new(&env, &generators, &corpus);
        let mut rng = rand::rngs::StdRng::seed_from_u64(4);
        if let Some(mutated) = InputMutator.mutate(&program, &ctx, &mut rng) {
            assert!(mutated.code().validate().is_ok());
        }
    }

    #[test]
    fn splice_mutator_preserves_validity() {
        let env = env();
        let generators = GeneratorRegistry::default_pool();
        let program = sample_program(&env, 5);
        let other = sample_program(&env, 6);
        let corpus = FixedSource(vec![other]);
        let ctx = MutationContext::new(&env, &generators, &corpus);
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        if let Some(mutated) = SpliceMutator.mutate(&program, &ctx, &mut rng) {
            assert!(mutated.code().validate().is_ok());
        }
    }

    #[test]
    fn combine_mutator_appends_and_stays_valid() {
        let env = env();
        let generators = GeneratorRegistry::default_pool();
        let program = sample_program(&env, 8);
        let other = sample_program(&env, 9);
        let corpus = FixedSource(vec![other.clone()]);
        let ctx = MutationContext::new(&env, &generators, &corpus);
        let mut rng = rand::rngs::StdRng::seed_from_u64(10);
        let mutated = CombineMutator.mutate(&program, &ctx, &mut rng).expect("combine should succeed");
        assert!(mutated.code().validate().is_ok());
        assert!(mutated.code().len() >= program.code().len() + other.code().len());
    }

    #[test]
    fn concat_mutator_reconciles_shared_literal() {
        let env = env();
        let mut builder_a = ProgramBuilder::new(&env);
        let v0 = builder_a.append(Operation::LoadInteger(7), &[]).unwrap()[0];
        builder_a.append(Operation::Print, &[v0]).unwrap();
        let a = builder_a.finalize().unwrap();

        let mut builder_b = ProgramBuilder::new(&env);
        let v1 = builder_b.append(Operation::LoadInteger(7), &[]).unwrap()[0];
        builder_b.append(Operation::Print, &[v1]).unwrap();
        let b = builder_b.finalize().unwrap();

        let generators = GeneratorRegistry::default_pool();
        let corpus = FixedSource(vec![b.clone()]);
        let ctx = MutationContext::new(&env, &generators, &corpus);
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let mutated = ConcatMutator.mutate(&a, &ctx, &mut rng).expect("concat should succeed");
        assert!(mutated.code().validate().is_ok());
        // Reconciliation should avoid re-emitting the duplicate literal.
        assert!(mutated.code().len() < a.code().len() + b.code().len());
    }

    #[test]
    fn codegen_mutator_grows_program() {
        let env = env();
        let generators = GeneratorRegistry::default_pool();
        let program = sample_program(&env, 12);
        let corpus = FixedSource(vec![]);
        let ctx = MutationContext::new(&env, &generators, &corpus);
        let mut rng = rand::rngs::StdRng::seed_from_u64(13);
        if let Some(mutated) = CodeGenMutator.mutate(&program, &ctx, &mut rng) {
            assert!(mutated.code().validate().is_ok());
            assert!(mutated.code().len() > program.code().len());
        }
    }

    #[test]
    fn exploration_mutator_inserts_probes() {
        let env = env();
        let generators = GeneratorRegistry::default_pool();
        let program = sample_program(&env, 14);
        let corpus = FixedSource(vec![]);
        let ctx = MutationContext::new(&env, &generators, &corpus);
        let mut rng = rand::rngs::StdRng::seed_from_u64(15);
        let mutated = ExplorationMutator.mutate(&program, &ctx, &mut rng).expect("should insert a probe");
        assert!(mutated.code().validate().is_ok());
        assert!(mutated
            .code()
            .iter()
            .any(|i| matches!(i.operation, Operation::Probe { .. })));
    }

    #[test]
    fn resolve_exploration_probes_turns_resolved_ones_into_nop() {
        let env = env();
        let mut builder = ProgramBuilder::new(&env);
        let v = builder.append(Operation::LoadInteger(1), &[]).unwrap()[0];
        builder.append(Operation::Probe { id: 0 }, &[v]).unwrap();
        let program = builder.finalize().unwrap();

        let mut observed = FxHashMap::default();
        observed.insert(0u32, ILType::integer());
        let resolved = resolve_exploration_probes(&program, &observed).unwrap();
        assert!(resolved
            .code()
            .iter()
            .any(|i| matches!(i.operation, Operation::Nop)));
    }

    #[test]
    fn fixup_mutator_strips_unfired_guards() {
        let env = env();
        let mut builder = ProgramBuilder::new(&env);
        let obj = builder.append(Operation::LoadBuiltin("Object".into()), &[]).unwrap()[0];
        builder
            .append(Operation::GetProperty { name: "nosuch".into(), guarded: true }, &[obj])
            .unwrap();
        let program = builder.finalize().unwrap();

        let generators = GeneratorRegistry::default_pool();
        let corpus = FixedSource(vec![]);
        let fired: FxHashSet<usize> = FxHashSet::default();
        let ctx = MutationContext::new(&env, &generators, &corpus).with_guard_firings(&fired);
        let mut rng = rand::rngs::StdRng::seed_from_u64(16);
        let mutated = FixupMutator.mutate(&program, &ctx, &mut rng).expect("should strip guard");
        assert!(!mutated.code().get(1).unwrap().operation.is_guarded());
    }

    use proptest::prelude::*;

    proptest! {
        /// Every mutator either refuses (`None`) or returns a program whose
        /// code still validates (spec §4.4 "All mutators preserve IL
        /// invariants (§3) or return `None`"); `SpliceMutator` in particular
        /// covers property #8 ("splice preserves invariants 2-4").
        #[test]
        fn mutators_never_produce_invalid_programs(
            parent_seed: u64,
            splice_seed: u64,
            rng_seed: u64,
            mutator_idx in 0usize..9,
        ) {
            let env = env();
            let generators = GeneratorRegistry::default_pool();
            let program = sample_program(&env, parent_seed);
            let other = sample_program(&env, splice_seed);
            let corpus = FixedSource(vec![other]);
            let ctx = MutationContext::new(&env, &generators, &corpus);
            let mut rng = rand::rngs::StdRng::seed_from_u64(rng_seed);

            let mutator: &dyn Mutator = match mutator_idx {
                0 => &OperationMutator,
                1 => &InputMutator,
                2 => &SpliceMutator,
                3 => &CombineMutator,
                4 => &ConcatMutator,
                5 => &CodeGenMutator,
                6 => &ExplorationMutator,
                7 => &ProbeMutator,
                _ => &FixupMutator,
            };

            if let Some(mutated) = mutator.mutate(&program, &ctx, &mut rng) {
                prop_assert!(mutated.code().validate().is_ok());
            }
        }
    }
}
