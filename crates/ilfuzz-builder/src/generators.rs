//! Code generators: the weighted recipe table `ProgramBuilder::build` and
//! `find_or_generate` sample from (spec §4.3 "Generators").
//!
//! Each generator is a plain function rather than a trait object — matching
//! how [`crate::builder::ProgramBuilder::build_prefix`] already picks among
//! a fixed table of literal producers — so the registry stays a flat,
//! inspectable array instead of a dynamic-dispatch zoo.

use rand::RngCore;

use ilfuzz_il::{
    BinaryOp, ClassMemberKind, Context, Environment, FunctionKind, ILType, Operation, Signature,
    UnaryOp,
};

use crate::builder::ProgramBuilder;
use crate::error::Result;

pub type GeneratorFn = fn(&mut ProgramBuilder<'_>, &Environment, &mut dyn RngCore) -> Result<()>;

/// One registered recipe: the context it requires, its relative sampling
/// weight, the type it's known to produce (used by `findOrGenerate` to pick
/// a producer for a requested type), and the function that emits it.
pub struct CodeGeneratorEntry {
    pub name: &'static str,
    pub required_context: Context,
    pub weight: u32,
    pub produces: Option<ILType>,
    pub emit: GeneratorFn,
}

#[derive(Default)]
pub struct GeneratorRegistry {
    entries: Vec<CodeGeneratorEntry>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: CodeGeneratorEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Weighted sample among generators whose required context is satisfied
    /// by `ctx`.
    pub fn sample(&self, ctx: Context, rng: &mut dyn RngCore) -> Option<&CodeGeneratorEntry> {
        let candidates: Vec<&CodeGeneratorEntry> = self
            .entries
            .iter()
            .filter(|e| ctx.contains(e.required_context))
            .collect();
        let total: u32 = candidates.iter().map(|e| e.weight).sum();
        if candidates.is_empty() || total == 0 {
            return None;
        }
        let mut pick = rng.gen_range(0..total);
        for entry in &candidates {
            if pick < entry.weight {
                return Some(entry);
            }
            pick -= entry.weight;
        }
        candidates.last().copied()
    }

    fn gen_range(rng: &mut dyn RngCore, range: std::ops::Range<u32>) -> u32 {
        use rand::Rng;
        rng.gen_range(range)
    }

    /// A generator known (by its `produces` tag) to overlap with `ty`,
    /// uniformly chosen among matches, used by `findOrGenerate`.
    pub fn find_producer_of(
        &self,
        ty: &ILType,
        ctx: Context,
        rng: &mut dyn RngCore,
    ) -> Option<&CodeGeneratorEntry> {
        let candidates: Vec<&CodeGeneratorEntry> = self
            .entries
            .iter()
            .filter(|e| ctx.contains(e.required_context))
            .filter(|e| e.produces.as_ref().is_some_and(|p| p.may_be(ty)))
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let idx = Self::gen_range(rng, 0..candidates.len() as u32) as usize;
        Some(candidates[idx])
    }

    /// The default generator pool (spec §4.3's non-exhaustive worked
    /// examples): literals, property/element access, operators, calls,
    /// function/class definitions, control flow, destructuring, and the
    /// handful of "misc language feature" operations.
    pub fn default_pool() -> Self {
        let mut reg = Self::new();
        for entry in DEFAULT_GENERATORS {
            reg.register(CodeGeneratorEntry {
                name: entry.0,
                required_context: entry.1,
                weight: entry.2,
                produces: (entry.3)(),
                emit: entry.4,
            });
        }
        reg
    }
}

type Recipe = (
    &'static str,
    Context,
    u32,
    fn() -> Option<ILType>,
    GeneratorFn,
);

const DEFAULT_GENERATORS: &[Recipe] = &[
    ("IntegerLiteral", Context::SCRIPT, 10, || Some(ILType::integer()), gen_integer_literal),
    ("FloatLiteral", Context::SCRIPT, 6, || Some(ILType::float()), gen_float_literal),
    ("StringLiteral", Context::SCRIPT, 6, || Some(ILType::string()), gen_string_literal),
    ("BooleanLiteral", Context::SCRIPT, 4, || Some(ILType::boolean()), gen_boolean_literal),
    ("BigIntLiteral", Context::SCRIPT, 2, || Some(ILType::bigint()), gen_bigint_literal),
    ("ArrayLiteral", Context::SCRIPT, 6, || Some(ILType::object_with_group("Array")), gen_array_literal),
    ("ObjectLiteral", Context::SCRIPT, 6, || Some(ILType::object()), gen_object_literal),
    ("BinaryArith", Context::SCRIPT, 10, || None, gen_binary_arith),
    ("UnaryOp", Context::SCRIPT, 6, || None, gen_unary_op),
    ("Compare", Context::SCRIPT, 6, || Some(ILType::boolean()), gen_compare),
    ("TypeOf", Context::SCRIPT, 3, || Some(ILType::string()), gen_typeof),
    ("GetProperty", Context::SCRIPT, 8, || None, gen_get_property),
    ("SetProperty", Context::SCRIPT, 8, || None, gen_set_property),
    ("GetElement", Context::SCRIPT, 5, || None, gen_get_element),
    ("SetElement", Context::SCRIPT, 5, || None, gen_set_element),
    ("DeleteProperty", Context::SCRIPT, 2, || Some(ILType::boolean()), gen_delete_property),
    ("CallMethod", Context::SCRIPT, 8, || None, gen_call_method),
    ("Construct", Context::SCRIPT, 6, || None, gen_construct),
    ("PlainFunctionDef", Context::SCRIPT | Context::FUNCTION, 5, || None, gen_plain_function_def),
    ("ArrowFunctionDef", Context::SCRIPT | Context::FUNCTION, 4, || None, gen_arrow_function_def),
    ("CallDefinedFunction", Context::SCRIPT, 6, || None, gen_call_function),
    ("ClassDef", Context::SCRIPT, 3, || None, gen_class_definition),
    ("IfElse", Context::SCRIPT, 6, || None, gen_if_else),
    ("WhileLoop", Context::SCRIPT, 4, || None, gen_while_loop),
    ("ForLoop", Context::SCRIPT, 4, || None, gen_for_loop),
    ("ForOfLoop", Context::SCRIPT, 3, || None, gen_for_of_loop),
    ("ForInLoop", Context::SCRIPT, 3, || None, gen_for_in_loop),
    ("SwitchStatement", Context::SCRIPT, 3, || None, gen_switch_statement),
    ("TryCatch", Context::SCRIPT, 3, || None, gen_try_catch),
    ("ThrowException", Context::SCRIPT, 2, || None, gen_throw),
    ("DestructureArray", Context::SCRIPT, 2, || None, gen_destructure_array),
    ("WithStatement", Context::SCRIPT, 1, || None, gen_with_statement),
    ("EvalCall", Context::SCRIPT, 1, || None, gen_eval_call),
    ("TypedArrayCreate", Context::SCRIPT, 2, || Some(ILType::object_with_group("TypedArray")), gen_typed_array),
    ("PrintStatement", Context::SCRIPT, 3, || None, gen_print),
];

fn pick<'a, T: Copy>(rng: &mut dyn RngCore, items: &'a [T]) -> T {
    use rand::Rng;
    items[rng.gen_range(0..items.len())]
}

fn gen_integer_literal(b: &mut ProgramBuilder<'_>, env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let pool = env.interesting_integers();
    let value = if pool.is_empty() { 0 } else { pick(rng, pool) };
    b.append(Operation::LoadInteger(value), &[])?;
    Ok(())
}

fn gen_float_literal(b: &mut ProgramBuilder<'_>, env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let pool = env.interesting_floats();
    let value = if pool.is_empty() { 0.0 } else { pick(rng, pool) };
    b.append(Operation::LoadFloat(value), &[])?;
    Ok(())
}

fn gen_string_literal(b: &mut ProgramBuilder<'_>, env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let pool = env.interesting_strings();
    let value = if pool.is_empty() {
        String::new()
    } else {
        pick(rng, &pool.iter().collect::<Vec<_>>()).to_string()
    };
    b.append(Operation::LoadString(value), &[])?;
    Ok(())
}

fn gen_boolean_literal(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    use rand::Rng;
    b.append(Operation::LoadBoolean(rng.gen_bool(0.5)), &[])?;
    Ok(())
}

fn gen_bigint_literal(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    use rand::Rng;
    b.append(Operation::LoadBigInt(rng.gen_range(-100..100)), &[])?;
    Ok(())
}

fn gen_array_literal(b: &mut ProgramBuilder<'_>, env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let outs = b.append(Operation::CreateArray, &[])?;
    let array = outs[0];
    use rand::Rng;
    let count = rng.gen_range(0..3usize);
    for i in 0..count {
        let idx = b.append(Operation::LoadInteger(i as i64), &[])?[0];
        let registry = GeneratorRegistry::default_pool();
        let value = b.find_or_generate(&ILType::anything(), &registry, rng);
        let _ = env;
        b.append(Operation::SetElement, &[array, idx, value])?;
    }
    Ok(())
}

fn gen_object_literal(b: &mut ProgramBuilder<'_>, env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    use rand::Rng;
    let names: Vec<&str> = env.property_names().collect();
    let count = rng.gen_range(0..3usize.min(names.len().max(1)));
    let mut keys = Vec::new();
    let mut values = Vec::new();
    let registry = GeneratorRegistry::default_pool();
    for _ in 0..count {
        if names.is_empty() {
            break;
        }
        keys.push(ilfuzz_il::PropertyKey::Named(pick(rng, &names).to_string()));
        values.push(b.find_or_generate(&ILType::anything(), &registry, rng));
    }
    b.append(Operation::CreateObject { keys }, &values)?;
    Ok(())
}

fn gen_binary_arith(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    const OPS: &[BinaryOp] = &[
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Mod,
        BinaryOp::BitAnd,
        BinaryOp::BitOr,
        BinaryOp::BitXor,
        BinaryOp::LogicalAnd,
        BinaryOp::LogicalOr,
    ];
    let registry = GeneratorRegistry::default_pool();
    let lhs = b.find_or_generate(&ILType::number(), &registry, rng);
    let rhs = b.find_or_generate(&ILType::number(), &registry, rng);
    b.append(Operation::BinaryOperation(pick(rng, OPS)), &[lhs, rhs])?;
    Ok(())
}

fn gen_unary_op(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    const OPS: &[UnaryOp] = &[UnaryOp::Neg, UnaryOp::Plus, UnaryOp::BitNot, UnaryOp::LogicalNot, UnaryOp::Void];
    let registry = GeneratorRegistry::default_pool();
    let input = b.find_or_generate(&ILType::anything(), &registry, rng);
    b.append(Operation::UnaryOperation(pick(rng, OPS)), &[input])?;
    Ok(())
}

fn gen_compare(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    const OPS: &[BinaryOp] = &[BinaryOp::Eq, BinaryOp::StrictEq, BinaryOp::Lt, BinaryOp::Gt, BinaryOp::Ne];
    let registry = GeneratorRegistry::default_pool();
    let lhs = b.find_or_generate(&ILType::anything(), &registry, rng);
    let rhs = b.find_or_generate(&ILType::anything(), &registry, rng);
    b.append(Operation::Compare(pick(rng, OPS)), &[lhs, rhs])?;
    Ok(())
}

fn gen_typeof(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let registry = GeneratorRegistry::default_pool();
    let input = b.find_or_generate(&ILType::anything(), &registry, rng);
    b.append(Operation::TypeOf, &[input])?;
    Ok(())
}

fn gen_get_property(b: &mut ProgramBuilder<'_>, env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let registry = GeneratorRegistry::default_pool();
    let base = b.find_or_generate(&ILType::object(), &registry, rng);
    let names: Vec<&str> = env.property_names().collect();
    let name = if names.is_empty() { "value".to_string() } else { pick(rng, &names).to_string() };
    use rand::Rng;
    b.append(
        Operation::GetProperty { name, guarded: rng.gen_bool(0.3) },
        &[base],
    )?;
    Ok(())
}

fn gen_set_property(b: &mut ProgramBuilder<'_>, env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let registry = GeneratorRegistry::default_pool();
    let base = b.find_or_generate(&ILType::object(), &registry, rng);
    let value = b.find_or_generate(&ILType::anything(), &registry, rng);
    let names: Vec<&str> = env.property_names().collect();
    let name = if names.is_empty() { "value".to_string() } else { pick(rng, &names).to_string() };
    b.append(Operation::SetProperty { name }, &[base, value])?;
    Ok(())
}

fn gen_get_element(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    use rand::Rng;
    let registry = GeneratorRegistry::default_pool();
    let base = b.find_or_generate(&ILType::object_with_group("Array"), &registry, rng);
    let index = b.find_or_generate(&ILType::integer(), &registry, rng);
    b.append(Operation::GetElement { guarded: rng.gen_bool(0.3) }, &[base, index])?;
    Ok(())
}

fn gen_set_element(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let registry = GeneratorRegistry::default_pool();
    let base = b.find_or_generate(&ILType::object_with_group("Array"), &registry, rng);
    let index = b.find_or_generate(&ILType::integer(), &registry, rng);
    let value = b.find_or_generate(&ILType::anything(), &registry, rng);
    b.append(Operation::SetElement, &[base, index, value])?;
    Ok(())
}

fn gen_delete_property(b: &mut ProgramBuilder<'_>, env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let registry = GeneratorRegistry::default_pool();
    let base = b.find_or_generate(&ILType::object(), &registry, rng);
    let names: Vec<&str> = env.property_names().collect();
    let name = if names.is_empty() { "value".to_string() } else { pick(rng, &names).to_string() };
    use rand::Rng;
    b.append(Operation::DeleteProperty { name, guarded: rng.gen_bool(0.3) }, &[base])?;
    Ok(())
}

fn gen_call_method(b: &mut ProgramBuilder<'_>, env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let groups: Vec<&str> = env.groups().filter_map(|g| g.methods.keys().next().map(|_| g.name.as_ref())).collect();
    let group = if groups.is_empty() { "Array" } else { pick(rng, &groups) };
    let registry = GeneratorRegistry::default_pool();
    let base = b.find_or_generate(&ILType::object_with_group(group), &registry, rng);
    let method_name = env
        .group(group)
        .and_then(|g| g.methods.keys().next())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "toString".to_string());
    use rand::Rng;
    b.append(
        Operation::CallMethod { name: method_name, guarded: rng.gen_bool(0.3) },
        &[base],
    )?;
    Ok(())
}

fn gen_construct(b: &mut ProgramBuilder<'_>, env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let ctors: Vec<&str> = env
        .builtins()
        .filter(|(_, ty)| ty.base.contains(ilfuzz_il::BaseType::CONSTRUCTOR))
        .map(|(name, _)| name)
        .collect();
    if ctors.is_empty() {
        return gen_object_literal(b, env, rng);
    }
    let name = pick(rng, &ctors);
    let callee = b.append(Operation::LoadBuiltin(name.to_string()), &[])?[0];
    use rand::Rng;
    b.append(Operation::Construct { guarded: rng.gen_bool(0.2) }, &[callee])?;
    Ok(())
}

fn gen_plain_function_def(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    const KINDS: &[FunctionKind] =
        &[FunctionKind::Plain, FunctionKind::Generator, FunctionKind::Async, FunctionKind::AsyncGenerator];
    build_function(b, rng, pick(rng, KINDS))
}

fn gen_arrow_function_def(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    use rand::Rng;
    let kind = if rng.gen_bool(0.5) { FunctionKind::Arrow } else { FunctionKind::AsyncArrow };
    build_function(b, rng, kind)
}

fn build_function(b: &mut ProgramBuilder<'_>, rng: &mut dyn RngCore, kind: FunctionKind) -> Result<()> {
    use rand::Rng;
    let parameter_count = rng.gen_range(0..3u32);
    let is_strict = rng.gen_bool(0.2);
    let registry = GeneratorRegistry::default_pool();
    b.append(
        Operation::BeginPlainFunction { kind, is_strict, parameter_count },
        &[],
    )?;
    let body_value = b.find_or_generate(&ILType::anything(), &registry, rng);
    b.append(Operation::Return, &[body_value])?;
    b.append(Operation::EndPlainFunction, &[])?;
    Ok(())
}

fn gen_call_function(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let registry = GeneratorRegistry::default_pool();
    let unknown_fn = ILType::function(Signature::unknown());
    let callee = b.find_or_generate(&unknown_fn, &registry, rng);
    use rand::Rng;
    b.append(Operation::CallFunction { guarded: rng.gen_bool(0.2) }, &[callee])?;
    Ok(())
}

fn gen_class_definition(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    use rand::Rng;
    let has_superclass = rng.gen_bool(0.2);
    let registry = GeneratorRegistry::default_pool();
    let mut inputs = ilfuzz_il::VarList::new();
    if has_superclass {
        let unknown_ctor = ILType::constructor(Signature::unknown());
        inputs.push(b.find_or_generate(&unknown_ctor, &registry, rng));
    }
    b.append(Operation::BeginClassDefinition { has_superclass }, &inputs)?;

    const KINDS: &[ClassMemberKind] = &[
        ClassMemberKind::Method,
        ClassMemberKind::Getter,
        ClassMemberKind::Setter,
        ClassMemberKind::Constructor,
        ClassMemberKind::Field,
    ];
    let kind = pick(rng, KINDS);
    let name = match kind {
        ClassMemberKind::Constructor => "constructor".to_string(),
        ClassMemberKind::Getter | ClassMemberKind::Setter => "value".to_string(),
        _ => "run".to_string(),
    };
    let is_static = rng.gen_bool(0.2);

    if matches!(kind, ClassMemberKind::Field) {
        let value = b.find_or_generate(&ILType::anything(), &registry, rng);
        b.append(Operation::BeginClassMember { kind, name, is_static }, &[value])?;
    } else {
        b.append(Operation::BeginClassMember { kind, name, is_static }, &[])?;
        let value = b.find_or_generate(&ILType::anything(), &registry, rng);
        b.append(Operation::Return, &[value])?;
    }
    b.append(Operation::EndClassMember, &[])?;
    b.append(Operation::EndClassDefinition, &[])?;
    Ok(())
}

fn gen_if_else(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let registry = GeneratorRegistry::default_pool();
    let cond = b.find_or_generate(&ILType::boolean(), &registry, rng);
    b.append(Operation::BeginIf, &[cond])?;
    let v = b.find_or_generate(&ILType::anything(), &registry, rng);
    b.append(Operation::Print, &[v])?;
    use rand::Rng;
    if rng.gen_bool(0.4) {
        b.append(Operation::BeginElse, &[])?;
        let v2 = b.find_or_generate(&ILType::anything(), &registry, rng);
        b.append(Operation::Print, &[v2])?;
    }
    b.append(Operation::EndIf, &[])?;
    Ok(())
}

fn gen_while_loop(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let registry = GeneratorRegistry::default_pool();
    let cond = b.find_or_generate(&ILType::boolean(), &registry, rng);
    b.append(Operation::BeginWhile, &[cond])?;
    let v = b.find_or_generate(&ILType::anything(), &registry, rng);
    b.append(Operation::Print, &[v])?;
    b.append(Operation::EndWhile, &[])?;
    Ok(())
}

fn gen_for_loop(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let registry = GeneratorRegistry::default_pool();
    let init = b.find_or_generate(&ILType::integer(), &registry, rng);
    let cond = b.find_or_generate(&ILType::boolean(), &registry, rng);
    let update = b.find_or_generate(&ILType::anything(), &registry, rng);
    b.append(Operation::BeginFor, &[init, cond, update])?;
    let v = b.find_or_generate(&ILType::anything(), &registry, rng);
    b.append(Operation::Print, &[v])?;
    b.append(Operation::EndFor, &[])?;
    Ok(())
}

fn gen_for_of_loop(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let registry = GeneratorRegistry::default_pool();
    let iterable = b.find_or_generate(&ILType::object_with_group("Array"), &registry, rng);
    b.append(Operation::BeginForOf, &[iterable])?;
    let v = b.find_or_generate(&ILType::anything(), &registry, rng);
    b.append(Operation::Print, &[v])?;
    b.append(Operation::EndForOf, &[])?;
    Ok(())
}

fn gen_for_in_loop(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let registry = GeneratorRegistry::default_pool();
    let base = b.find_or_generate(&ILType::object(), &registry, rng);
    b.append(Operation::BeginForIn, &[base])?;
    let v = b.find_or_generate(&ILType::anything(), &registry, rng);
    b.append(Operation::Print, &[v])?;
    b.append(Operation::EndForIn, &[])?;
    Ok(())
}

fn gen_switch_statement(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    use rand::Rng;
    let registry = GeneratorRegistry::default_pool();
    let discriminant = b.find_or_generate(&ILType::anything(), &registry, rng);
    b.append(Operation::BeginSwitch, &[discriminant])?;
    for _ in 0..rng.gen_range(1..3u32) {
        let test = b.find_or_generate(&ILType::anything(), &registry, rng);
        b.append(Operation::BeginSwitchCase { is_default: false }, &[test])?;
        let v = b.find_or_generate(&ILType::anything(), &registry, rng);
        b.append(Operation::Print, &[v])?;
        b.append(Operation::EndSwitchCase { falls_through: rng.gen_bool(0.3) }, &[])?;
    }
    if rng.gen_bool(0.5) {
        b.append(Operation::BeginSwitchCase { is_default: true }, &[])?;
        let v = b.find_or_generate(&ILType::anything(), &registry, rng);
        b.append(Operation::Print, &[v])?;
        b.append(Operation::EndSwitchCase { falls_through: false }, &[])?;
    }
    b.append(Operation::EndSwitch, &[])?;
    Ok(())
}

fn gen_try_catch(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    use rand::Rng;
    let registry = GeneratorRegistry::default_pool();
    b.append(Operation::BeginTry, &[])?;
    let v = b.find_or_generate(&ILType::anything(), &registry, rng);
    b.append(Operation::ThrowException, &[v])?;
    b.append(Operation::BeginCatch, &[])?;
    if rng.gen_bool(0.4) {
        let caught = b.find_or_generate(&ILType::anything(), &registry, rng);
        b.append(Operation::Print, &[caught])?;
        b.append(Operation::BeginFinally, &[])?;
        let v2 = b.find_or_generate(&ILType::anything(), &registry, rng);
        b.append(Operation::Print, &[v2])?;
    }
    b.append(Operation::EndTryCatchFinally, &[])?;
    Ok(())
}

fn gen_throw(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let registry = GeneratorRegistry::default_pool();
    let v = b.find_or_generate(&ILType::anything(), &registry, rng);
    b.append(Operation::ThrowException, &[v])?;
    Ok(())
}

fn gen_destructure_array(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let registry = GeneratorRegistry::default_pool();
    let arr = b.find_or_generate(&ILType::object_with_group("Array"), &registry, rng);
    b.append(Operation::DestructArray { indices: vec![0, 1] }, &[arr])?;
    Ok(())
}

fn gen_with_statement(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let registry = GeneratorRegistry::default_pool();
    let obj = b.find_or_generate(&ILType::object(), &registry, rng);
    b.append(Operation::BeginWith, &[obj])?;
    b.append(Operation::EndWith, &[])?;
    Ok(())
}

fn gen_eval_call(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let registry = GeneratorRegistry::default_pool();
    let src = b.find_or_generate(&ILType::string(), &registry, rng);
    b.append(Operation::Eval, &[src])?;
    Ok(())
}

fn gen_typed_array(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    const KINDS: &[&str] = &["Int8Array", "Uint8Array", "Float64Array"];
    let registry = GeneratorRegistry::default_pool();
    let len = b.find_or_generate(&ILType::integer(), &registry, rng);
    b.append(Operation::CreateTypedArray { kind: pick(rng, KINDS).to_string() }, &[len])?;
    Ok(())
}

fn gen_print(b: &mut ProgramBuilder<'_>, _env: &Environment, rng: &mut dyn RngCore) -> Result<()> {
    let registry = GeneratorRegistry::default_pool();
    let v = b.find_or_generate(&ILType::anything(), &registry, rng);
    b.append(Operation::Print, &[v])?;
    Ok(())
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
    fn default_pool_is_nonempty() {
        assert!(!GeneratorRegistry::default_pool().is_empty());
    }

    #[test]
    fn sample_respects_context_filter() {
        let registry = GeneratorRegistry::default_pool();
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let entry = registry.sample(Context::SCRIPT, &mut rng);
        assert!(entry.is_some());
    }

    #[test]
    fn building_with_each_generator_leaves_valid_code() {
        let env = env();
        let registry = GeneratorRegistry::default_pool();
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let mut builder = ProgramBuilder::new(&env);
        builder.build_prefix(4, &mut rng);
        for entry in registry.entries.iter() {
            let emit = entry.emit;
            let _ = emit(&mut builder, &env, &mut rng);
        }
    }
}
