//! Scope stack: a LIFO chain of frames carrying value
//! symbols, type parameters, local type aliases, and loop metadata.

use std::collections::HashMap;

use fin_ast::TypeConstraint;
use inkwell::basic_block::BasicBlock;
use inkwell::values::BasicValueEnum;

use crate::fin_type::FinType;

/// A single `(LLVM value, FinType)` entry for a named value symbol.
#[derive(Debug, Clone)]
pub struct ValueSymbol<'ctx> {
    pub value: BasicValueEnum<'ctx>,
    pub fin_type: FinType,
}

/// Loop condition/exit blocks, recorded on the scope that introduces a
/// loop so `break`/`continue` in a nested scope can find them by walking
/// up the stack.
#[derive(Debug, Clone, Copy)]
pub struct LoopBlocks<'ctx> {
    pub continue_block: BasicBlock<'ctx>,
    pub break_block: BasicBlock<'ctx>,
}

#[derive(Default)]
struct Frame<'ctx> {
    symbols: HashMap<String, ValueSymbol<'ctx>>,
    type_parameters: HashMap<String, Option<TypeConstraint>>,
    type_aliases: HashMap<String, String>,
    loop_blocks: Option<LoopBlocks<'ctx>>,
}

/// Owned stack of frames. `push`/`pop` bracket every nested compilation
/// (function body, method body, constructor, block, foreach body, struct
/// declaration), mirroring the IR builder's block-scoped discipline.
pub struct ScopeStack<'ctx> {
    frames: Vec<Frame<'ctx>>,
}

impl<'ctx> ScopeStack<'ctx> {
    /// A fresh stack with just the global frame.
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::default()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(Frame::default());
    }

    /// Pops the top frame. Refuses to pop the last (global) frame — per
    /// This is a non-fatal situation the caller should log a
    /// warning about, never panic on, so callers get `false` back instead
    /// of an empty stack.
    pub fn pop(&mut self) -> bool {
        if self.frames.len() <= 1 {
            return false;
        }
        self.frames.pop();
        true
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Defines a symbol in the *topmost* frame only.
    pub fn define(&mut self, name: impl Into<String>, value: BasicValueEnum<'ctx>, fin_type: FinType) {
        let frame = self.frames.last_mut().expect("global frame always present");
        frame.symbols.insert(name.into(), ValueSymbol { value, fin_type });
    }

    /// Walks the chain from the top down, returning the first match.
    pub fn resolve(&self, name: &str) -> Option<&ValueSymbol<'ctx>> {
        self.frames.iter().rev().find_map(|f| f.symbols.get(name))
    }

    /// Introduces a type parameter (with optional constraint) in the
    /// topmost frame, shadowing any outer parameter of the same name.
    pub fn define_type_parameter(&mut self, name: impl Into<String>, constraint: Option<TypeConstraint>) {
        let frame = self.frames.last_mut().expect("global frame always present");
        frame.type_parameters.insert(name.into(), constraint);
    }

    pub fn is_type_parameter(&self, name: &str) -> bool {
        self.frames.iter().rev().any(|f| f.type_parameters.contains_key(name))
    }

    pub fn type_constraint(&self, name: &str) -> Option<&TypeConstraint> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.type_parameters.get(name))
            .and_then(|c| c.as_ref())
    }

    /// Installed by `import`; resolved only when looking up *type* names.
    pub fn define_type_alias(&mut self, short_name: impl Into<String>, mangled_target: impl Into<String>) {
        let frame = self.frames.last_mut().expect("global frame always present");
        frame.type_aliases.insert(short_name.into(), mangled_target.into());
    }

    pub fn resolve_type_alias(&self, short_name: &str) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.type_aliases.get(short_name))
            .map(String::as_str)
    }

    /// Marks the topmost frame as a loop frame with the given blocks.
    pub fn enter_loop(&mut self, blocks: LoopBlocks<'ctx>) {
        let frame = self.frames.last_mut().expect("global frame always present");
        frame.loop_blocks = Some(blocks);
    }

    /// `find_loop_scope`: nearest enclosing loop's blocks, walking up from
    /// the top.
    pub fn find_loop_scope(&self) -> Option<LoopBlocks<'ctx>> {
        self.frames.iter().rev().find_map(|f| f.loop_blocks)
    }

    /// Snapshots the value symbols bound in the topmost frame, used by the
    /// module loader to capture a just-compiled module's public namespace
    /// before popping its scope.
    pub fn snapshot_top_frame(&self) -> HashMap<String, ValueSymbol<'ctx>> {
        self.frames.last().expect("global frame always present").symbols.clone()
    }
}

impl<'ctx> Default for ScopeStack<'ctx> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkwell::context::Context;

    #[test]
    fn definitions_write_only_to_the_top_frame() {
        let context = Context::create();
        let mut scope = ScopeStack::new();
        let v = context.i32_type().const_int(1, false).into();
        scope.define("x", v, FinType::int());
        scope.push();
        assert!(scope.resolve("x").is_some());
        scope.define("y", v, FinType::int());
        assert!(scope.resolve("y").is_some());
        scope.pop();
        assert!(scope.resolve("y").is_none());
        assert!(scope.resolve("x").is_some());
    }

    #[test]
    fn cannot_pop_below_the_global_frame() {
        let mut scope: ScopeStack = ScopeStack::new();
        assert!(!scope.pop());
        assert_eq!(scope.depth(), 1);
    }

    #[test]
    fn inner_type_parameter_shadows_outer() {
        let mut scope: ScopeStack = ScopeStack::new();
        scope.define_type_parameter("T", None);
        scope.push();
        scope.define_type_parameter("T", None);
        assert!(scope.is_type_parameter("T"));
        scope.pop();
        assert!(scope.is_type_parameter("T"));
    }

    #[test]
    fn type_alias_resolves_only_for_types() {
        let mut scope: ScopeStack = ScopeStack::new();
        scope.define_type_alias("Vector", "lib_math__Vector");
        assert_eq!(scope.resolve_type_alias("Vector"), Some("lib_math__Vector"));
        assert_eq!(scope.resolve_type_alias("Unknown"), None);
    }
}
