//! Scope stack: lists of variables visible at each nesting level.

use ilfuzz_il::Variable;

#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    levels: Vec<Vec<Variable>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            levels: vec![Vec::new()],
        }
    }

    pub fn push_level(&mut self) {
        self.levels.push(Vec::new());
    }

    pub fn pop_level(&mut self) -> Vec<Variable> {
        if self.levels.len() <= 1 {
            Vec::new()
        } else {
            self.levels.pop().unwrap_or_default()
        }
    }

    pub fn declare(&mut self, v: Variable) {
        self.levels
            .last_mut()
            .expect("at least one scope level always exists")
            .push(v);
    }

    pub fn visible_variables(&self) -> impl Iterator<Item = Variable> + '_ {
        self.levels.iter().flatten().copied()
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn popped_level_variables_are_no_longer_visible() {
        let mut scopes = ScopeStack::new();
        scopes.declare(Variable::new(0));
        scopes.push_level();
        scopes.declare(Variable::new(1));
        assert_eq!(scopes.visible_variables().count(), 2);
        scopes.pop_level();
        assert_eq!(scopes.visible_variables().count(), 1);
    }
}
