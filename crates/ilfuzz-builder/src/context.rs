//! Builder context stack.
//!
//! Rather than relying on runtime exceptions when a block is closed out of
//! order, the builder pushes/pops explicit tokens and validates at every
//! `append` (spec §9 "Builder context & scope stacks").

use ilfuzz_il::Context;

/// One entry of the open-block stack: the cumulative context available
/// inside the block, and the kind tag used to pair a block-end with the
/// block-start that opened it (so "close the wrong kind of block" is
/// caught here rather than only by `Code::validate` after finalize).
#[derive(Debug, Clone)]
struct Frame {
    context: Context,
    label: &'static str,
}

#[derive(Debug, Clone)]
pub struct ContextStack {
    frames: Vec<Frame>,
}

impl Default for ContextStack {
    fn default() -> Self {
        Self {
            frames: vec![Frame {
                context: Context::SCRIPT,
                label: "script",
            }],
        }
    }
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Context {
        self.frames.last().map(|f| f.context).unwrap_or(Context::EMPTY)
    }

    pub fn push(&mut self, contributed: Context, label: &'static str) {
        let merged = self.current() | contributed;
        self.frames.push(Frame {
            context: merged,
            label,
        });
    }

    /// Pops the innermost frame, returning its label so the caller
    /// (`ProgramBuilder::append` handling a block-end) can sanity-check it
    /// against the expected matching block-start kind.
    pub fn pop(&mut self) -> Option<&'static str> {
        if self.frames.len() <= 1 {
            None
        } else {
            self.frames.pop().map(|f| f.label)
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    /// The label of the innermost open block, without popping it. Used to
    /// pick a matching end-operation when a build budget runs out with
    /// blocks still open.
    pub fn top_label(&self) -> Option<&'static str> {
        if self.frames.len() <= 1 {
            None
        } else {
            self.frames.last().map(|f| f.label)
        }
    }

    pub fn satisfies(&self, required: Context) -> bool {
        self.current().contains(required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_push_accumulates_context() {
        let mut stack = ContextStack::new();
        stack.push(Context::FUNCTION, "function");
        stack.push(Context::LOOP, "loop");
        assert!(stack.current().contains(Context::SCRIPT));
        assert!(stack.current().contains(Context::FUNCTION));
        assert!(stack.current().contains(Context::LOOP));
    }

    #[test]
    fn cannot_pop_past_script() {
        let mut stack = ContextStack::new();
        assert!(stack.pop().is_none());
    }
}
