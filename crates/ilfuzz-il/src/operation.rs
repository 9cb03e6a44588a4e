//! Operations: the tagged-variant action vocabulary of the IL (spec §3
//! "Operation", §9 "Tagged-variant operations").
//!
//! The original implementation's deep class hierarchy with dynamic
//! downcasts becomes a sum type. Pattern matching replaces downcasts; a new
//! operation is one enum arm plus handlers in the analyzer, any mutator that
//! inspects operations, and (externally) the lifter.

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Where an operation may appear / what context its block body opens.
    #[derive(Serialize, Deserialize)]
    pub struct Context: u32 {
        const SCRIPT        = 1 << 0;
        const FUNCTION      = 1 << 1;
        const GENERATOR     = 1 << 2;
        const ASYNC         = 1 << 3;
        const LOOP          = 1 << 4;
        const CLASS_BODY    = 1 << 5;
        const SWITCH_BODY   = 1 << 6;
        const OBJECT_LITERAL = 1 << 7;
        const WASM_FUNCTION = 1 << 8;
        const WASM_BLOCK    = 1 << 9;
        const TRY_BLOCK     = 1 << 10;
        const WITH_BODY     = 1 << 11;

        const EMPTY = 0;
    }
}

/// A property/object-literal key: computed, static, or a method shorthand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyKey {
    Named(String),
    Computed,
}

/// Which built-in JS binary operator a `BinaryOperation` performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    Eq,
    StrictEq,
    Ne,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    LogicalAnd,
    LogicalOr,
    NullishCoalesce,
    In,
    InstanceOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Plus,
    BitNot,
    LogicalNot,
    TypeOf,
    Void,
    Delete,
    Inc,
    Dec,
}

/// Subkind of a function definition (spec §4.3 "function definitions of
/// each subkind").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionKind {
    Plain,
    Arrow,
    Generator,
    Async,
    AsyncArrow,
    AsyncGenerator,
}

/// A method/getter/setter/constructor definition inside a class body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassMemberKind {
    Method,
    Getter,
    Setter,
    Constructor,
    Field,
}

/// The tagged-variant operation vocabulary. Attributes are the mutable
/// immediate values an `OperationMutator` may rewrite in place (literals,
/// names, flags); everything else about an operation (context requirement/
/// contribution, arity, purity) is derived structurally by
/// [`Operation::metadata`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    // ---- Literals ----
    LoadUndefined,
    LoadNull,
    LoadInteger(i64),
    LoadFloat(f64),
    LoadBigInt(i64),
    LoadString(String),
    LoadBoolean(bool),
    LoadRegExp { pattern: String, flags: String },
    LoadBuiltin(String),

    // ---- Arrays / Objects ----
    CreateArray,
    CreateObject { keys: Vec<PropertyKey> },
    CreateTemplateString { parts: Vec<String> },
    Spread,

    // ---- Property access ----
    GetProperty { name: String, guarded: bool },
    SetProperty { name: String },
    DeleteProperty { name: String, guarded: bool },
    GetElement { guarded: bool },
    SetElement,
    GetComputedProperty { guarded: bool },

    // ---- Operators ----
    UnaryOperation(UnaryOp),
    BinaryOperation(BinaryOp),
    Update(UnaryOp),
    Dup,
    Reassign,
    Compare(BinaryOp),
    TypeOf,

    // ---- Calls ----
    CallFunction { guarded: bool },
    CallMethod { name: String, guarded: bool },
    CallComputedMethod { guarded: bool },
    Construct { guarded: bool },

    // ---- Functions ----
    BeginPlainFunction { kind: FunctionKind, is_strict: bool, parameter_count: u32 },
    EndPlainFunction,
    Return,
    Yield,
    YieldEach,
    Await,

    // ---- Variables ----
    LoadArgument { index: u32 },
    Nop,

    // ---- Control flow ----
    BeginIf,
    BeginElse,
    EndIf,
    BeginWhile,
    EndWhile,
    BeginDoWhile,
    EndDoWhile,
    BeginFor,
    EndFor,
    BeginForIn,
    EndForIn,
    BeginForOf,
    EndForOf,
    LoopBreak,
    LoopContinue,
    BeginSwitch,
    BeginSwitchCase { is_default: bool },
    EndSwitchCase { falls_through: bool },
    EndSwitch,

    // ---- Exceptions ----
    BeginTry,
    BeginCatch,
    BeginFinally,
    EndTryCatchFinally,
    ThrowException,

    // ---- Classes ----
    BeginClassDefinition { has_superclass: bool },
    BeginClassMember { kind: ClassMemberKind, name: String, is_static: bool },
    EndClassMember,
    EndClassDefinition,

    // ---- Destructuring ----
    DestructArray { indices: Vec<u32> },
    DestructObject { names: Vec<String> },

    // ---- Misc language features ----
    BeginWith,
    EndWith,
    Eval,
    Print,

    // ---- Typed arrays ----
    CreateTypedArray { kind: String },

    // ---- Wasm extension point (spec §1: extension point, not core) ----
    WasmBeginModule,
    WasmEndModule,
    WasmBeginFunction { signature_name: String },
    WasmEndFunction,
    WasmBeginBlock,
    WasmEndBlock,
    WasmOpaque { mnemonic: String },

    // ---- Guard bookkeeping (ExplorationMutator/ProbeMutator instrumentation) ----
    BeginGuard,
    EndGuard { fired: bool },
    Probe { id: u32 },
}

/// Structural metadata about one operation, computed by [`Operation::metadata`]
/// rather than stored per-instance (the variant itself is the only state
/// that needs to live in the IL).
pub struct OperationMetadata {
    pub required_context: Context,
    pub contributed_context: Context,
    pub num_inputs: usize,
    pub num_outputs: usize,
    pub num_inner_outputs: usize,
    pub is_block_start: bool,
    pub is_block_end: bool,
    pub is_jump: bool,
    pub is_guardable: bool,
    pub is_pure: bool,
}

impl OperationMetadata {
    fn leaf(num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            required_context: Context::SCRIPT,
            contributed_context: Context::EMPTY,
            num_inputs,
            num_outputs,
            num_inner_outputs: 0,
            is_block_start: false,
            is_block_end: false,
            is_jump: false,
            is_guardable: false,
            is_pure: true,
        }
    }

    fn block_start(required: Context, contributed: Context, num_inputs: usize, num_outputs: usize, num_inner_outputs: usize) -> Self {
        Self {
            required_context: required,
            contributed_context: contributed,
            num_inputs,
            num_outputs,
            num_inner_outputs,
            is_block_start: true,
            is_block_end: false,
            is_jump: false,
            is_guardable: false,
            is_pure: true,
        }
    }

    fn block_end(num_inputs: usize) -> Self {
        Self {
            required_context: Context::EMPTY,
            contributed_context: Context::EMPTY,
            num_inputs,
            num_outputs: 0,
            num_inner_outputs: 0,
            is_block_start: false,
            is_block_end: true,
            is_jump: false,
            is_guardable: false,
            is_pure: true,
        }
    }

    fn guardable(mut self) -> Self {
        self.is_guardable = true;
        self
    }

    fn impure(mut self) -> Self {
        self.is_pure = false;
        self
    }

    fn jump(mut self) -> Self {
        self.is_jump = true;
        self
    }
}

impl Operation {
    /// Structural metadata used by the builder for arity/context checks and
    /// by the analyzer for input/output bookkeeping.
    pub fn metadata(&self) -> OperationMetadata {
        use Operation::*;
        match self {
            LoadUndefined | LoadNull | LoadInteger(_) | LoadFloat(_) | LoadBigInt(_)
            | LoadString(_) | LoadBoolean(_) | LoadRegExp { .. } | LoadBuiltin(_) => {
                OperationMetadata::leaf(0, 1)
            }
            CreateArray => OperationMetadata::leaf(0, 1).impure(),
            CreateObject { keys } => OperationMetadata::leaf(keys.len(), 1).impure(),
            CreateTemplateString { parts } => {
                OperationMetadata::leaf(parts.len().saturating_sub(1).max(0), 1)
            }
            Spread => OperationMetadata::leaf(1, 1),

            GetProperty { guarded, .. } => {
                let m = OperationMetadata::leaf(1, 1).impure();
                if *guarded { m.guardable() } else { m }
            }
            SetProperty { .. } => OperationMetadata::leaf(2, 0).impure(),
            DeleteProperty { guarded, .. } => {
                let m = OperationMetadata::leaf(1, 1).impure();
                if *guarded { m.guardable() } else { m }
            }
            GetElement { guarded } => {
                let m = OperationMetadata::leaf(2, 1).impure();
                if *guarded { m.guardable() } else { m }
            }
            SetElement => OperationMetadata::leaf(3, 0).impure(),
            GetComputedProperty { guarded } => {
                let m = OperationMetadata::leaf(2, 1).impure();
                if *guarded { m.guardable() } else { m }
            }

            UnaryOperation(_) => OperationMetadata::leaf(1, 1),
            BinaryOperation(_) => OperationMetadata::leaf(2, 1),
            Update(_) => OperationMetadata::leaf(1, 1).impure(),
            Dup => OperationMetadata::leaf(1, 1),
            Reassign => OperationMetadata::leaf(2, 0).impure(),
            Compare(_) => OperationMetadata::leaf(2, 1),
            TypeOf => OperationMetadata::leaf(1, 1),

            CallFunction { guarded } => {
                let m = OperationMetadata::leaf(1, 1).impure();
                if *guarded { m.guardable() } else { m }
            }
            CallMethod { guarded, .. } => {
                let m = OperationMetadata::leaf(1, 1).impure();
                if *guarded { m.guardable() } else { m }
            }
            CallComputedMethod { guarded } => {
                let m = OperationMetadata::leaf(2, 1).impure();
                if *guarded { m.guardable() } else { m }
            }
            Construct { guarded } => {
                let m = OperationMetadata::leaf(1, 1).impure();
                if *guarded { m.guardable() } else { m }
            }

            BeginPlainFunction { kind, parameter_count, .. } => {
                let mut ctx = Context::FUNCTION;
                match kind {
                    FunctionKind::Generator | FunctionKind::AsyncGenerator => {
                        ctx |= Context::GENERATOR
                    }
                    _ => {}
                }
                match kind {
                    FunctionKind::Async | FunctionKind::AsyncArrow | FunctionKind::AsyncGenerator => {
                        ctx |= Context::ASYNC
                    }
                    _ => {}
                }
                OperationMetadata::block_start(
                    Context::SCRIPT | Context::FUNCTION | Context::CLASS_BODY,
                    ctx,
                    0,
                    1,
                    *parameter_count as usize,
                )
            }
            EndPlainFunction => OperationMetadata::block_end(0),
            Return => {
                let mut m = OperationMetadata::leaf(1, 0).impure().jump();
                m.required_context = Context::FUNCTION;
                m
            }
            Yield => {
                let mut m = OperationMetadata::leaf(1, 1).impure();
                m.required_context = Context::GENERATOR;
                m
            }
            YieldEach => {
                let mut m = OperationMetadata::leaf(1, 0).impure();
                m.required_context = Context::GENERATOR;
                m
            }
            Await => {
                let mut m = OperationMetadata::leaf(1, 1).impure();
                m.required_context = Context::ASYNC;
                m
            }

            LoadArgument { .. } => {
                let mut m = OperationMetadata::leaf(0, 1);
                m.required_context = Context::FUNCTION;
                m
            }
            Nop => OperationMetadata::leaf(0, 0),

            BeginIf => OperationMetadata::block_start(Context::EMPTY, Context::EMPTY, 1, 0, 0),
            BeginElse => OperationMetadata::block_start(Context::EMPTY, Context::EMPTY, 0, 0, 0),
            EndIf => OperationMetadata::block_end(0),
            BeginWhile => OperationMetadata::block_start(Context::EMPTY, Context::LOOP, 1, 0, 0),
            EndWhile => OperationMetadata::block_end(0),
            BeginDoWhile => OperationMetadata::block_start(Context::EMPTY, Context::LOOP, 0, 0, 0),
            EndDoWhile => {
                let mut m = OperationMetadata::block_end(1);
                m.is_jump = false;
                m
            }
            BeginFor => OperationMetadata::block_start(Context::EMPTY, Context::LOOP, 3, 0, 1),
            EndFor => OperationMetadata::block_end(0),
            BeginForIn => OperationMetadata::block_start(Context::EMPTY, Context::LOOP, 1, 0, 1),
            EndForIn => OperationMetadata::block_end(0),
            BeginForOf => OperationMetadata::block_start(Context::EMPTY, Context::LOOP, 1, 0, 1),
            EndForOf => OperationMetadata::block_end(0),
            LoopBreak => {
                let mut m = OperationMetadata::leaf(0, 0).jump();
                m.required_context = Context::LOOP | Context::SWITCH_BODY;
                m
            }
            LoopContinue => {
                let mut m = OperationMetadata::leaf(0, 0).jump();
                m.required_context = Context::LOOP;
                m
            }
            BeginSwitch => OperationMetadata::block_start(Context::EMPTY, Context::SWITCH_BODY, 1, 0, 0),
            BeginSwitchCase { is_default } => OperationMetadata::block_start(
                Context::SWITCH_BODY,
                Context::SWITCH_BODY,
                if *is_default { 0 } else { 1 },
                0,
                0,
            ),
            EndSwitchCase { .. } => OperationMetadata::block_end(0),
            EndSwitch => OperationMetadata::block_end(0),

            BeginTry => OperationMetadata::block_start(Context::EMPTY, Context::TRY_BLOCK, 0, 0, 0),
            BeginCatch => OperationMetadata::block_start(Context::EMPTY, Context::EMPTY, 0, 0, 1),
            BeginFinally => OperationMetadata::block_start(Context::EMPTY, Context::EMPTY, 0, 0, 0),
            EndTryCatchFinally => OperationMetadata::block_end(0),
            ThrowException => OperationMetadata::leaf(1, 0).impure().jump(),

            BeginClassDefinition { has_superclass } => OperationMetadata::block_start(
                Context::SCRIPT | Context::FUNCTION,
                Context::CLASS_BODY,
                if *has_superclass { 1 } else { 0 },
                1,
                0,
            ),
            BeginClassMember { kind, .. } => {
                let inputs = if matches!(kind, ClassMemberKind::Field) { 1 } else { 0 };
                OperationMetadata::block_start(Context::CLASS_BODY, Context::FUNCTION, inputs, 0, 0)
            }
            EndClassMember => OperationMetadata::block_end(0),
            EndClassDefinition => OperationMetadata::block_end(0),

            DestructArray { indices } => OperationMetadata::leaf(1, indices.len()).impure(),
            DestructObject { names } => OperationMetadata::leaf(1, names.len()).impure(),

            BeginWith => OperationMetadata::block_start(Context::EMPTY, Context::WITH_BODY, 1, 0, 0),
            EndWith => OperationMetadata::block_end(0),
            Eval => OperationMetadata::leaf(1, 1).impure(),
            Print => OperationMetadata::leaf(1, 0).impure(),

            CreateTypedArray { .. } => OperationMetadata::leaf(1, 1).impure(),

            WasmBeginModule => OperationMetadata::block_start(Context::SCRIPT, Context::EMPTY, 0, 1, 0),
            WasmEndModule => OperationMetadata::block_end(0),
            WasmBeginFunction { .. } => {
                OperationMetadata::block_start(Context::EMPTY, Context::WASM_FUNCTION, 0, 1, 0)
            }
            WasmEndFunction => OperationMetadata::block_end(0),
            WasmBeginBlock => {
                let mut m = OperationMetadata::block_start(Context::WASM_FUNCTION, Context::WASM_BLOCK, 0, 0, 0);
                m.required_context |= Context::WASM_BLOCK;
                m
            }
            WasmEndBlock => OperationMetadata::block_end(0),
            WasmOpaque { .. } => {
                let mut m = OperationMetadata::leaf(0, 1).impure();
                m.required_context = Context::WASM_FUNCTION | Context::WASM_BLOCK;
                m
            }

            BeginGuard => OperationMetadata::block_start(Context::EMPTY, Context::EMPTY, 0, 0, 0),
            EndGuard { .. } => OperationMetadata::block_end(0),
            Probe { .. } => OperationMetadata::leaf(1, 0).impure(),
        }
    }

    pub fn is_block_start(&self) -> bool {
        self.metadata().is_block_start
    }

    pub fn is_block_end(&self) -> bool {
        self.metadata().is_block_end
    }

    pub fn is_guardable(&self) -> bool {
        self.metadata().is_guardable
    }

    pub fn is_guarded(&self) -> bool {
        matches!(
            self,
            Operation::GetProperty { guarded: true, .. }
                | Operation::DeleteProperty { guarded: true, .. }
                | Operation::GetElement { guarded: true }
                | Operation::GetComputedProperty { guarded: true }
                | Operation::CallFunction { guarded: true }
                | Operation::CallMethod { guarded: true, .. }
                | Operation::CallComputedMethod { guarded: true }
                | Operation::Construct { guarded: true }
        )
    }

    /// Flip the `guarded` flag on a guardable operation. Used by
    /// `OperationMutator` (flag flips) and `FixupMutator` (strip unused
    /// guards). No-op on operations without a guard flag.
    pub fn set_guarded(&mut self, guarded: bool) {
        use Operation::*;
        match self {
            GetProperty { guarded: g, .. }
            | DeleteProperty { guarded: g, .. }
            | GetElement { guarded: g }
            | GetComputedProperty { guarded: g }
            | CallFunction { guarded: g }
            | CallMethod { guarded: g, .. }
            | CallComputedMethod { guarded: g }
            | Construct { guarded: g } => *g = guarded,
            _ => {}
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        use Operation::*;
        match self {
            LoadUndefined => "LoadUndefined",
            LoadNull => "LoadNull",
            LoadInteger(_) => "LoadInteger",
            LoadFloat(_) => "LoadFloat",
            LoadBigInt(_) => "LoadBigInt",
            LoadString(_) => "LoadString",
            LoadBoolean(_) => "LoadBoolean",
            LoadRegExp { .. } => "LoadRegExp",
            LoadBuiltin(_) => "LoadBuiltin",
            CreateArray => "CreateArray",
            CreateObject { .. } => "CreateObject",
            CreateTemplateString { .. } => "CreateTemplateString",
            Spread => "Spread",
            GetProperty { .. } => "GetProperty",
            SetProperty { .. } => "SetProperty",
            DeleteProperty { .. } => "DeleteProperty",
            GetElement { .. } => "GetElement",
            SetElement => "SetElement",
            GetComputedProperty { .. } => "GetComputedProperty",
            UnaryOperation(_) => "UnaryOperation",
            BinaryOperation(_) => "BinaryOperation",
            Update(_) => "Update",
            Dup => "Dup",
            Reassign => "Reassign",
            Compare(_) => "Compare",
            TypeOf => "TypeOf",
            CallFunction { .. } => "CallFunction",
            CallMethod { .. } => "CallMethod",
            CallComputedMethod { .. } => "CallComputedMethod",
            Construct { .. } => "Construct",
            BeginPlainFunction { .. } => "BeginPlainFunction",
            EndPlainFunction => "EndPlainFunction",
            Return => "Return",
            Yield => "Yield",
            YieldEach => "YieldEach",
            Await => "Await",
            LoadArgument { .. } => "LoadArgument",
            Nop => "Nop",
            BeginIf => "BeginIf",
            BeginElse => "BeginElse",
            EndIf => "EndIf",
            BeginWhile => "BeginWhile",
            EndWhile => "EndWhile",
            BeginDoWhile => "BeginDoWhile",
            EndDoWhile => "EndDoWhile",
            BeginFor => "BeginFor",
            EndFor => "EndFor",
            BeginForIn => "BeginForIn",
            EndForIn => "EndForIn",
            BeginForOf => "BeginForOf",
            EndForOf => "EndForOf",
            LoopBreak => "LoopBreak",
            LoopContinue => "LoopContinue",
            BeginSwitch => "BeginSwitch",
            BeginSwitchCase { .. } => "BeginSwitchCase",
            EndSwitchCase { .. } => "EndSwitchCase",
            EndSwitch => "EndSwitch",
            BeginTry => "BeginTry",
            BeginCatch => "BeginCatch",
            BeginFinally => "BeginFinally",
            EndTryCatchFinally => "EndTryCatchFinally",
            ThrowException => "ThrowException",
            BeginClassDefinition { .. } => "BeginClassDefinition",
            BeginClassMember { .. } => "BeginClassMember",
            EndClassMember => "EndClassMember",
            EndClassDefinition => "EndClassDefinition",
            DestructArray { .. } => "DestructArray",
            DestructObject { .. } => "DestructObject",
            BeginWith => "BeginWith",
            EndWith => "EndWith",
            Eval => "Eval",
            Print => "Print",
            CreateTypedArray { .. } => "CreateTypedArray",
            WasmBeginModule => "WasmBeginModule",
            WasmEndModule => "WasmEndModule",
            WasmBeginFunction { .. } => "WasmBeginFunction",
            WasmEndFunction => "WasmEndFunction",
            WasmBeginBlock => "WasmBeginBlock",
            WasmEndBlock => "WasmEndBlock",
            WasmOpaque { .. } => "WasmOpaque",
            BeginGuard => "BeginGuard",
            EndGuard { .. } => "EndGuard",
            Probe { .. } => "Probe",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_flip_is_noop_on_ungardable_ops() {
        let mut op = Operation::LoadInteger(1);
        op.set_guarded(true);
        assert_eq!(op, Operation::LoadInteger(1));
    }

    #[test]
    fn guarded_get_property_reports_guardable() {
        let op = Operation::GetProperty { name: "x".into(), guarded: true };
        assert!(op.is_guardable());
        assert!(op.is_guarded());
    }

    #[test]
    fn begin_function_contributes_generator_context() {
        let op = Operation::BeginPlainFunction {
            kind: FunctionKind::Generator,
            is_strict: false,
            parameter_count: 0,
        };
        assert!(op.metadata().contributed_context.contains(Context::GENERATOR));
    }
}
