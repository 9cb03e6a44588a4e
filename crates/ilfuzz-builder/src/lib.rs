//! Program construction: the mutable [`builder`] scratchpad, the
//! [`generators`] it samples from, hand-authored [`templates`], and the
//! supporting [`context`]/[`scope`]/[`varpool`] bookkeeping stacks.
//!
//! This crate turns "pick a type, get a variable" into concrete IL
//! instructions; it knows nothing about mutating existing programs
//! (`ilfuzz-mutate`) or running them (`ilfuzz-exec`).

pub mod builder;
pub mod context;
pub mod error;
pub mod generators;
pub mod scope;
pub mod templates;
pub mod varpool;

pub use builder::{BuildMethod, ProgramBuilder};
pub use context::ContextStack;
pub use error::{BuilderError, Result};
pub use generators::{CodeGeneratorEntry, GeneratorFn, GeneratorRegistry};
pub use scope::ScopeStack;
pub use templates::{ProgramTemplate, TemplateRegistry, TemplateStats};
pub use varpool::VariablePool;
