//! Static type analyzer: a single forward pass producing per-instruction
//! variable→type maps, control-flow-sensitive by merging branch states at
//! joins (spec §4.1).

use rustc_hash::FxHashMap;

use crate::code::Code;
use crate::environment::Environment;
use crate::instruction::Instruction;
use crate::operation::{BinaryOp, Operation, UnaryOp};
use crate::types::ILType;
use crate::variable::Variable;

/// Snapshot of variable types, either the prefix state the analyzer was
/// seeded with or the state after some instruction.
pub type TypeState = FxHashMap<Variable, ILType>;

/// Per-instruction types observed during one analyzer pass: the state just
/// before the instruction ran (used to type its inputs) and just after
/// (used to type its outputs for subsequent instructions).
#[derive(Debug, Default, Clone)]
pub struct AnalysisResult {
    before: Vec<TypeState>,
    after: Vec<TypeState>,
}

impl AnalysisResult {
    pub fn type_before(&self, index: usize, v: Variable) -> ILType {
        self.before
            .get(index)
            .and_then(|s| s.get(&v))
            .cloned()
            .unwrap_or_else(ILType::anything)
    }

    pub fn type_after(&self, index: usize, v: Variable) -> ILType {
        self.after
            .get(index)
            .and_then(|s| s.get(&v))
            .cloned()
            .unwrap_or_else(ILType::anything)
    }

    /// The type state a caller should use to seed further analysis starting
    /// right after instruction `index` (or the program prefix, for `None`).
    pub fn state_after(&self, index: Option<usize>) -> TypeState {
        match index {
            Some(i) => self.after.get(i).cloned().unwrap_or_default(),
            None => TypeState::default(),
        }
    }
}

/// The forward type-analysis pass described in spec §4.1.
///
/// Malformed IL (undefined variable, unmatched block, wrong context) is a
/// programmer error per the spec's contract; callers (the builder) validate
/// with [`Code::validate`] first, so this pass is free to `expect`/
/// `unreachable!` on conditions that should already be excluded.
pub struct TypeAnalyzer<'a> {
    env: &'a Environment,
}

struct LoopJoin {
    open_index: usize,
    state_at_entry: TypeState,
}

impl<'a> TypeAnalyzer<'a> {
    pub fn new(env: &'a Environment) -> Self {
        Self { env }
    }

    /// Runs the analyzer over `code` starting from `prefix_state`.
    #[tracing::instrument(level = "debug", skip_all, fields(len = code.len()))]
    pub fn run(&self, code: &Code, prefix_state: TypeState) -> AnalysisResult {
        let mut result = AnalysisResult {
            before: vec![TypeState::default(); code.len()],
            after: vec![TypeState::default(); code.len()],
        };
        let mut state = prefix_state;
        let mut loop_joins: Vec<LoopJoin> = Vec::new();
        let mut branch_stack: Vec<(usize, TypeState)> = Vec::new();

        let mut i = 0;
        while i < code.len() {
            let instr = code
                .get(i)
                .unwrap_or_else(|| unreachable!("index {i} within validated code"));

            result.before[i] = state.clone();

            match &instr.operation {
                Operation::BeginWhile | Operation::BeginFor | Operation::BeginForIn | Operation::BeginForOf => {
                    loop_joins.push(LoopJoin {
                        open_index: i,
                        state_at_entry: state.clone(),
                    });
                }
                Operation::EndWhile | Operation::EndFor | Operation::EndForIn | Operation::EndForOf => {
                    if let Some(join) = loop_joins.pop() {
                        // One widening pass (spec §4.1): union the body's
                        // exit state back into the loop's entry state so a
                        // second conceptual iteration sees variables that
                        // only stabilize after the first pass through the
                        // body. We don't literally re-run the body (its
                        // instructions already executed above); we widen the
                        // state carried forward past `EndWhile` instead,
                        // which is observably equivalent for this linear
                        // single-pass analyzer.
                        let widened = merge_states(&join.state_at_entry, &state);
                        state = widened;
                    }
                }
                Operation::BeginIf => {
                    branch_stack.push((i, state.clone()));
                }
                Operation::BeginElse => {
                    // swap in the pre-if state so the else-branch starts
                    // from the same point the if-branch did
                    if let Some((_, pre_if_state)) = branch_stack.last() {
                        let post_if_state = state.clone();
                        state = pre_if_state.clone();
                        branch_stack.last_mut().unwrap().1 = post_if_state;
                    }
                }
                Operation::EndIf => {
                    if let Some((_, other_branch_state)) = branch_stack.pop() {
                        state = merge_states(&other_branch_state, &state);
                    }
                }
                _ => {}
            }

            self.apply_operation(instr, &mut state);
            result.after[i] = state.clone();
            i += 1;
        }

        result
    }

    fn apply_operation(&self, instr: &Instruction, state: &mut TypeState) {
        let input_type = |idx: usize| -> ILType {
            instr
                .inputs
                .get(idx)
                .and_then(|v| state.get(v))
                .cloned()
                .unwrap_or_else(ILType::anything)
        };

        let output_ty = match &instr.operation {
            Operation::LoadUndefined => Some(ILType::undefined()),
            Operation::LoadNull => Some(ILType::null()),
            Operation::LoadInteger(_) => Some(ILType::integer()),
            Operation::LoadFloat(_) => Some(ILType::float()),
            Operation::LoadBigInt(_) => Some(ILType::bigint()),
            Operation::LoadString(_) => Some(ILType::string()),
            Operation::LoadBoolean(_) => Some(ILType::boolean()),
            Operation::LoadRegExp { .. } => Some(ILType::regexp()),
            Operation::LoadBuiltin(name) => Some(self.env.type_of(name)),
            Operation::CreateArray => Some(ILType::object_with_group("Array")),
            Operation::CreateObject { .. } => Some(ILType::object()),
            Operation::CreateTemplateString { .. } => Some(ILType::string()),

            Operation::GetProperty { name, guarded } => {
                let base = input_type(0);
                let ty = self.env.type_of_property(name, &base);
                Some(if *guarded { ty.union(&ILType::undefined()) } else { ty })
            }
            Operation::DeleteProperty { guarded, .. } => {
                let ty = ILType::boolean();
                Some(if *guarded { ty.union(&ILType::undefined()) } else { ty })
            }
            Operation::GetElement { .. } => Some(ILType::anything()),
            Operation::GetComputedProperty { guarded } => {
                // The property name isn't known statically, so the analyzer
                // can't narrow past the environment's top type.
                let ty = ILType::anything();
                Some(if *guarded { ty.union(&ILType::undefined()) } else { ty })
            }

            Operation::UnaryOperation(op) => Some(self.unary_result_type(*op, input_type(0))),
            Operation::BinaryOperation(op) => {
                Some(self.binary_result_type(*op, input_type(0), input_type(1)))
            }
            Operation::Update(_) => Some(ILType::number()),
            Operation::Dup => Some(input_type(0)),
            Operation::Compare(_) => Some(ILType::boolean()),
            Operation::TypeOf => Some(ILType::string()),

            Operation::CallFunction { guarded } => {
                let callee = input_type(0);
                let ty = callee
                    .signature()
                    .map(|sig| (*sig.return_type).clone())
                    .unwrap_or_else(ILType::anything);
                Some(if *guarded { ty.union(&ILType::undefined()) } else { ty })
            }
            Operation::CallMethod { name, guarded } => {
                let base = input_type(0);
                let ty = self
                    .env
                    .type_of_method(name, &base)
                    .map(|sig| (*sig.return_type).clone())
                    .unwrap_or_else(ILType::anything);
                Some(if *guarded { ty.union(&ILType::undefined()) } else { ty })
            }
            Operation::CallComputedMethod { guarded } => {
                let ty = ILType::anything();
                Some(if *guarded { ty.union(&ILType::undefined()) } else { ty })
            }
            Operation::Construct { guarded } => {
                let callee = input_type(0);
                let ty = callee
                    .signature()
                    .map(|sig| (*sig.return_type).clone())
                    .unwrap_or_else(ILType::anything);
                Some(if *guarded { ty.union(&ILType::undefined()) } else { ty })
            }

            Operation::BeginPlainFunction { .. } => Some(ILType::function(crate::types::Signature::unknown())),
            Operation::Yield | Operation::Await => Some(ILType::anything()),
            Operation::LoadArgument { .. } => Some(ILType::anything()),

            Operation::DestructArray { indices } => {
                for out in instr.outputs.iter() {
                    state.insert(*out, ILType::anything());
                }
                let _ = indices;
                None
            }
            Operation::DestructObject { names } => {
                for out in instr.outputs.iter() {
                    state.insert(*out, ILType::anything());
                }
                let _ = names;
                None
            }

            Operation::Eval => Some(ILType::anything()),
            Operation::CreateTypedArray { .. } => Some(ILType::object_with_group("TypedArray")),

            Operation::BeginClassDefinition { .. } => Some(ILType::constructor(crate::types::Signature::unknown())),

            Operation::WasmBeginModule | Operation::WasmBeginFunction { .. } => Some(ILType::anything()),
            Operation::WasmOpaque { .. } => Some(ILType::anything()),

            Operation::BeginFor | Operation::BeginForIn | Operation::BeginForOf => {
                for out in instr.inner_outputs.iter() {
                    state.insert(*out, ILType::anything());
                }
                None
            }
            Operation::BeginCatch => {
                for out in instr.inner_outputs.iter() {
                    state.insert(*out, ILType::anything());
                }
                None
            }

            _ => None,
        };

        if let Some(ty) = output_ty {
            for out in instr.outputs.iter() {
                state.insert(*out, ty.clone());
            }
        }
    }

    fn unary_result_type(&self, op: UnaryOp, input: ILType) -> ILType {
        match op {
            UnaryOp::LogicalNot => ILType::boolean(),
            UnaryOp::TypeOf => ILType::string(),
            UnaryOp::Void => ILType::undefined(),
            UnaryOp::Delete => ILType::boolean(),
            UnaryOp::Neg | UnaryOp::Plus | UnaryOp::Inc | UnaryOp::Dec => {
                if input.is(&ILType::integer()) {
                    ILType::integer()
                } else {
                    ILType::number()
                }
            }
            UnaryOp::BitNot => ILType::integer(),
        }
    }

    /// Arithmetic binaries produce `integer`, `float`, or their union
    /// according to input bases (spec §4.1).
    fn binary_result_type(&self, op: BinaryOp, lhs: ILType, rhs: ILType) -> ILType {
        use BinaryOp::*;
        match op {
            Add => {
                if lhs.is(&ILType::string()) || rhs.is(&ILType::string()) {
                    ILType::string()
                } else {
                    numeric_union(&lhs, &rhs)
                }
            }
            Sub | Mul | Div | Mod | Pow => numeric_union(&lhs, &rhs),
            BitAnd | BitOr | BitXor | Shl | Shr | UShr => ILType::integer(),
            Eq | StrictEq | Ne | StrictNe | Lt | Le | Gt | Ge | In | InstanceOf => ILType::boolean(),
            LogicalAnd | LogicalOr | NullishCoalesce => lhs.union(&rhs),
        }
    }
}

fn numeric_union(lhs: &ILType, rhs: &ILType) -> ILType {
    use crate::types::BaseType;
    if lhs.base.contains(BaseType::BIGINT) || rhs.base.contains(BaseType::BIGINT) {
        return ILType::bigint();
    }
    let both_integer = lhs.is(&ILType::integer()) && rhs.is(&ILType::integer());
    if both_integer {
        ILType::integer()
    } else if lhs.may_be(&ILType::float()) || rhs.may_be(&ILType::float()) {
        ILType::number()
    } else {
        ILType::number()
    }
}

/// Union per-variable types from two incoming branches; a variable defined
/// on only one side becomes `T | undefined` (spec §4.1, join semantics).
fn merge_states(a: &TypeState, b: &TypeState) -> TypeState {
    let mut out = TypeState::default();
    for (v, ty) in a.iter() {
        match b.get(v) {
            Some(other) => {
                out.insert(*v, ty.merge_branch(other));
            }
            None => {
                out.insert(*v, ty.clone().union(&ILType::undefined()));
            }
        }
    }
    for (v, ty) in b.iter() {
        if !out.contains_key(v) {
            out.insert(*v, ty.clone().union(&ILType::undefined()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::MinimalProfile;
    use crate::instruction::{Instruction, VarList};

    fn env() -> Environment {
        let mut env = Environment::new();
        env.apply(&MinimalProfile);
        env
    }

    #[test]
    fn literal_produces_concrete_type() {
        let mut code = Code::new();
        code.push(Instruction::new(
            Operation::LoadInteger(42),
            VarList::new(),
            VarList::from_slice(&[Variable::new(0)]),
            VarList::new(),
            0,
        ));
        let env = env();
        let analyzer = TypeAnalyzer::new(&env);
        let result = analyzer.run(&code, TypeState::default());
        assert!(result.type_after(0, Variable::new(0)).is(&ILType::integer()));
    }

    #[test]
    fn guarded_property_unions_undefined() {
        let mut code = Code::new();
        code.push(Instruction::new(
            Operation::LoadBuiltin("Object".into()),
            VarList::new(),
            VarList::from_slice(&[Variable::new(0)]),
            VarList::new(),
            0,
        ));
        code.push(Instruction::new(
            Operation::GetProperty { name: "nosuch".into(), guarded: true },
            VarList::from_slice(&[Variable::new(0)]),
            VarList::from_slice(&[Variable::new(1)]),
            VarList::new(),
            1,
        ));
        let env = env();
        let analyzer = TypeAnalyzer::new(&env);
        let result = analyzer.run(&code, TypeState::default());
        let ty = result.type_after(1, Variable::new(1));
        assert!(ty.base.contains(crate::types::BaseType::UNDEFINED));
    }

    #[test]
    fn binary_add_of_two_integers_is_integer() {
        let mut code = Code::new();
        code.push(Instruction::new(
            Operation::LoadInteger(1),
            VarList::new(),
            VarList::from_slice(&[Variable::new(0)]),
            VarList::new(),
            0,
        ));
        code.push(Instruction::new(
            Operation::LoadInteger(2),
            VarList::new(),
            VarList::from_slice(&[Variable::new(1)]),
            VarList::new(),
            1,
        ));
        code.push(Instruction::new(
            Operation::BinaryOperation(BinaryOp::Add),
            VarList::from_slice(&[Variable::new(0), Variable::new(1)]),
            VarList::from_slice(&[Variable::new(2)]),
            VarList::new(),
            2,
        ));
        let env = env();
        let analyzer = TypeAnalyzer::new(&env);
        let result = analyzer.run(&code, TypeState::default());
        assert!(result.type_after(2, Variable::new(2)).is(&ILType::integer()));
    }
}
