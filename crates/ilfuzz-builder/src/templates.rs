//! Program templates: hand-authored skeletons that `HybridEngine` samples
//! alongside the generic generator-driven `build()` path (spec §4.3
//! "Templates").
//!
//! Per Open Question (a) (see DESIGN.md), a program's `contributors` list
//! keeps the name of the template that originated it through the whole
//! mutation chain, so per-template statistics here reflect how often a
//! template's *descendants* turn out interesting, not just the template
//! itself.

use rand::RngCore;

use ilfuzz_il::{Environment, ILType, Operation, Program};

use crate::builder::ProgramBuilder;
use crate::error::Result;
use crate::generators::GeneratorRegistry;

/// A hand-authored program skeleton. Unlike a `CodeGeneratorEntry`, a
/// template owns the whole program shape and calls back into the builder
/// and generator registry to fill in its variable pieces.
pub trait ProgramTemplate: Send + Sync {
    fn name(&self) -> &'static str;

    fn weight(&self) -> u32 {
        1
    }

    fn build(
        &self,
        builder: &mut ProgramBuilder<'_>,
        registry: &GeneratorRegistry,
        rng: &mut dyn RngCore,
    ) -> Result<()>;
}

/// Running counters for one template, used by `HybridEngine` to bias
/// sampling toward templates whose output keeps finding coverage.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateStats {
    pub executions: u64,
    pub interesting: u64,
    pub crashes: u64,
}

impl TemplateStats {
    pub fn record_execution(&mut self) {
        self.executions += 1;
    }

    pub fn record_interesting(&mut self) {
        self.interesting += 1;
    }

    pub fn record_crash(&mut self) {
        self.crashes += 1;
    }

    /// Fraction of executions that produced new coverage; `0.0` before any
    /// executions are recorded rather than `NaN`, so callers can sort on it
    /// directly.
    pub fn yield_rate(&self) -> f64 {
        if self.executions == 0 {
            0.0
        } else {
            self.interesting as f64 / self.executions as f64
        }
    }
}

pub struct TemplateRegistry {
    templates: Vec<Box<dyn ProgramTemplate>>,
    stats: Vec<TemplateStats>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self {
            templates: Vec::new(),
            stats: Vec::new(),
        }
    }

    pub fn register(&mut self, template: Box<dyn ProgramTemplate>) {
        self.templates.push(template);
        self.stats.push(TemplateStats::default());
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&'static str> {
        self.templates.get(index).map(|t| t.name())
    }

    pub fn stats(&self, index: usize) -> TemplateStats {
        self.stats.get(index).copied().unwrap_or_default()
    }

    pub fn record_execution(&mut self, index: usize) {
        if let Some(s) = self.stats.get_mut(index) {
            s.record_execution();
        }
    }

    pub fn record_interesting(&mut self, index: usize) {
        if let Some(s) = self.stats.get_mut(index) {
            s.record_interesting();
        }
    }

    pub fn record_crash(&mut self, index: usize) {
        if let Some(s) = self.stats.get_mut(index) {
            s.record_crash();
        }
    }

    /// Weighted sample, returning the sampled template's index so callers
    /// can later attribute execution outcomes back via `record_*`.
    pub fn sample(&self, rng: &mut dyn RngCore) -> Option<usize> {
        use rand::Rng;
        if self.templates.is_empty() {
            return None;
        }
        let total: u32 = self.templates.iter().map(|t| t.weight()).sum();
        if total == 0 {
            return None;
        }
        let mut pick = rng.gen_range(0..total);
        for (i, t) in self.templates.iter().enumerate() {
            if pick < t.weight() {
                return Some(i);
            }
            pick -= t.weight();
        }
        Some(self.templates.len() - 1)
    }

    /// Builds a fresh program from the template at `index`, tagging it as a
    /// contributor before finalizing.
    pub fn build_from(
        &self,
        index: usize,
        env: &Environment,
        generators: &GeneratorRegistry,
        rng: &mut dyn RngCore,
    ) -> Result<Program> {
        let template = self
            .templates
            .get(index)
            .ok_or(crate::error::BuilderError::TemplateNotFound(index))?;
        let mut builder = ProgramBuilder::new(env);
        builder.tag_contributor(template.name());
        builder.build_prefix(4, rng);
        template.build(&mut builder, generators, rng)?;
        builder.finalize()
    }
}

/// A handful of arithmetic operations chained over the prefix's numeric
/// variables, exercising the analyzer's numeric-union rules.
pub struct ArithmeticStress;

impl ProgramTemplate for ArithmeticStress {
    fn name(&self) -> &'static str {
        "ArithmeticStress"
    }

    fn build(
        &self,
        builder: &mut ProgramBuilder<'_>,
        registry: &GeneratorRegistry,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        use rand::Rng;
        let rounds = rng.gen_range(2..6u32);
        for _ in 0..rounds {
            let lhs = builder.find_or_generate(&ILType::number(), registry, rng);
            let rhs = builder.find_or_generate(&ILType::number(), registry, rng);
            builder.append(
                Operation::BinaryOperation(ilfuzz_il::BinaryOp::Add),
                &[lhs, rhs],
            )?;
        }
        Ok(())
    }
}

/// Builds an object, reads a property back through a guarded access, and
/// deletes it — a shape that tends to perturb inline-cache state in real
/// engines.
pub struct PropertyShapeChurn;

impl ProgramTemplate for PropertyShapeChurn {
    fn name(&self) -> &'static str {
        "PropertyShapeChurn"
    }

    fn build(
        &self,
        builder: &mut ProgramBuilder<'_>,
        registry: &GeneratorRegistry,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        let value = builder.find_or_generate(&ILType::anything(), registry, rng);
        let outs = builder.append(
            Operation::CreateObject {
                keys: vec![ilfuzz_il::PropertyKey::Named("value".to_string())],
            },
            &[value],
        )?;
        let obj = outs[0];
        builder.append(
            Operation::GetProperty { name: "value".to_string(), guarded: true },
            &[obj],
        )?;
        builder.append(
            Operation::DeleteProperty { name: "value".to_string(), guarded: false },
            &[obj],
        )?;
        builder.append(
            Operation::GetProperty { name: "value".to_string(), guarded: true },
            &[obj],
        )?;
        Ok(())
    }
}

/// Defines a small function, calls it once directly and once through a
/// guarded call, exercising signature-based return typing and the
/// guard/exploration bookkeeping operations together.
pub struct FunctionCallRoundTrip;

impl ProgramTemplate for FunctionCallRoundTrip {
    fn name(&self) -> &'static str {
        "FunctionCallRoundTrip"
    }

    fn build(
        &self,
        builder: &mut ProgramBuilder<'_>,
        registry: &GeneratorRegistry,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        let fn_outs = builder.append(
            Operation::BeginPlainFunction {
                kind: ilfuzz_il::FunctionKind::Plain,
                is_strict: false,
                parameter_count: 1,
            },
            &[],
        )?;
        let func_var = fn_outs[0];
        let ret = builder.find_or_generate(&ILType::anything(), registry, rng);
        builder.append(Operation::Return, &[ret])?;
        builder.append(Operation::EndPlainFunction, &[])?;

        builder.append(Operation::CallFunction { guarded: false }, &[func_var])?;
        builder.append(Operation::CallFunction { guarded: true }, &[func_var])?;
        Ok(())
    }
}

/// The default template pool registered by `ilfuzz-core`'s fuzzer
/// orchestrator.
pub fn default_pool() -> TemplateRegistry {
    let mut registry = TemplateRegistry::new();
    registry.register(Box::new(ArithmeticStress));
    registry.register(Box::new(PropertyShapeChurn));
    registry.register(Box::new(FunctionCallRoundTrip));
    registry
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
    fn default_templates_build_valid_programs() {
        let env = env();
        let generators = GeneratorRegistry::default_pool();
        let templates = default_pool();
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        for i in 0..templates.len() {
            let program = templates.build_from(i, &env, &generators, &mut rng).unwrap();
            assert!(program.code().validate().is_ok());
            assert_eq!(program.contributors(), &[templates.name(i).unwrap().to_string()]);
        }
    }

    #[test]
    fn stats_track_yield_rate() {
        let mut templates = default_pool();
        templates.record_execution(0);
        templates.record_execution(0);
        templates.record_interesting(0);
        assert_eq!(templates.stats(0).yield_rate(), 0.5);
    }
}
