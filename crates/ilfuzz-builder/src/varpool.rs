//! Variable pool: an index from frequently-requested types to
//! known-available variables for cheap lookup (spec §4.2).

use ilfuzz_il::{ILType, Variable};

/// One entry: a variable together with the type it was last known to hold,
/// so `find` can do a cheap `ILType::is` check instead of re-querying the
/// analyzer.
#[derive(Debug, Clone)]
struct Entry {
    variable: Variable,
    ty: ILType,
    /// Marked "loose" so splicing may replace the variable's use sites
    /// later (spec §4.2 "probing set").
    probing: bool,
}

#[derive(Debug, Default, Clone)]
pub struct VariablePool {
    entries: Vec<Entry>,
}

impl VariablePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, variable: Variable, ty: ILType) {
        self.entries.push(Entry {
            variable,
            ty,
            probing: false,
        });
    }

    pub fn mark_probing(&mut self, variable: Variable) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.variable == variable) {
            entry.probing = true;
        }
    }

    pub fn probing_variables(&self) -> impl Iterator<Item = Variable> + '_ {
        self.entries.iter().filter(|e| e.probing).map(|e| e.variable)
    }

    /// Returns a variable whose last-known type `is` a subtype of
    /// `requested`, if any are available.
    pub fn find(&self, requested: &ILType) -> Option<Variable> {
        self.entries
            .iter()
            .filter(|e| e.ty.is(requested))
            .map(|e| e.variable)
            .last()
    }

    pub fn find_any_may_be(&self, requested: &ILType) -> Option<Variable> {
        self.entries
            .iter()
            .filter(|e| e.ty.may_be(requested))
            .map(|e| e.variable)
            .last()
    }

    pub fn remove_out_of_scope(&mut self, still_visible: impl Fn(Variable) -> bool) {
        self.entries.retain(|e| still_visible(e.variable));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_prefers_exact_subtype_match() {
        let mut pool = VariablePool::new();
        pool.insert(Variable::new(0), ILType::integer());
        pool.insert(Variable::new(1), ILType::string());
        assert_eq!(pool.find(&ILType::integer()), Some(Variable::new(0)));
        assert_eq!(pool.find(&ILType::string()), Some(Variable::new(1)));
        assert_eq!(pool.find(&ILType::boolean()), None);
    }

    #[test]
    fn out_of_scope_removal_drops_entries() {
        let mut pool = VariablePool::new();
        pool.insert(Variable::new(0), ILType::integer());
        pool.insert(Variable::new(1), ILType::string());
        pool.remove_out_of_scope(|v| v == Variable::new(0));
        assert_eq!(pool.len(), 1);
    }
}
