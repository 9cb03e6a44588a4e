//! Typed, block-structured intermediate language for JavaScript programs.
//!
//! This crate holds the four leaf concepts every other `ilfuzz-*` crate
//! builds on: the [`types`] lattice, the [`environment`] registry, the IL
//! itself ([`operation`], [`instruction`], [`code`], [`program`],
//! [`variable`]), and the [`analyzer`] that assigns types to it. The
//! [`format`] module is the self-describing binary encoding used by corpus
//! storage and the sync protocol.

pub mod analyzer;
pub mod code;
pub mod environment;
pub mod error;
pub mod format;
pub mod instruction;
pub mod operation;
pub mod program;
pub mod types;
pub mod variable;

pub use analyzer::{AnalysisResult, TypeAnalyzer, TypeState};
pub use code::Code;
pub use environment::{Environment, MinimalProfile, ObjectGroup, Profile};
pub use error::{DecodeError, ILError};
pub use instruction::{Instruction, VarList};
pub use operation::{BinaryOp, ClassMemberKind, Context, FunctionKind, Operation, PropertyKey, UnaryOp};
pub use program::{Contributors, Fingerprint, Program};
pub use types::{BaseType, ILType, Parameter, Signature, TypeExtension};
pub use variable::{Variable, VariableAllocator};
