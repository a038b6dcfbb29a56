//! Global registries keyed by mangled struct/function name.
//!
//! These could be `dashmap`s so compilation can, in principle, happen off
//! the main thread; Fin's pipeline is strictly sequential, so these are
//! plain owned maps on `Compiler` instead — a `Mutex`/`DashMap` would be
//! dead weight here. The one registry that does stay concurrent-shaped is
//! the string interner, since it is meant to be reused verbatim across
//! separately-compiled modules.

use std::collections::HashMap;

use dashmap::DashMap;
use fin_ast::{ConstructorDecl, DestructorDecl, FunctionDecl, MacroDecl, OperatorSymbol, SpecialDecl, StructDecl};
use inkwell::types::StructType;
use inkwell::values::GlobalValue;

use crate::fin_type::FinType;

/// Compilation policy chosen for a generic declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Standard,
    Erased,
    Mono,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// Per-field metadata recorded during struct lowering.
#[derive(Debug, Clone)]
pub struct FieldMeta {
    pub index: u32,
    pub default: Option<fin_ast::PExpr>,
    pub visibility: Visibility,
    /// Source-level type identifier used to recognize "this field's
    /// declared type is the struct's generic parameter `T`" during
    /// unboxing on member access.
    pub source_type: FinType,
}

#[derive(Default)]
pub struct Registries<'ctx> {
    pub struct_types: HashMap<String, StructType<'ctx>>,
    pub struct_field_indices: HashMap<String, HashMap<String, u32>>,
    pub struct_field_meta: HashMap<String, HashMap<String, FieldMeta>>,
    pub struct_generic_params: HashMap<String, Vec<String>>,
    /// Mangled parent struct/interface names, in declaration order, for
    /// field-flattening and upcast validation.
    pub struct_parents: HashMap<String, Vec<String>>,
    pub struct_operators: HashMap<String, HashMap<OperatorSymbol, String>>,
    pub struct_methods: HashMap<String, Vec<FunctionDecl>>,
    pub struct_constructors: HashMap<String, Vec<ConstructorDecl>>,
    pub struct_destructors: HashMap<String, DestructorDecl>,
    /// Interface method order, used to compute vtable slot indices.
    pub interface_methods: HashMap<String, Vec<String>>,
    /// Declared return type of each interface method, keyed by interface
    /// name then method name. Every implementor shares this signature, so
    /// a dynamic-dispatch call site can type its result without knowing
    /// which concrete struct is behind the fat pointer at compile time.
    pub interface_method_return_types: HashMap<String, HashMap<String, FinType>>,
    pub interfaces: std::collections::HashSet<String>,
    pub modes: HashMap<String, Mode>,

    pub struct_templates: HashMap<String, StructDecl>,
    /// Every concrete (non-template) struct/interface declaration, keyed by
    /// mangled name, kept around so the behavior pass can re-read bodies
    /// after the shape pass has already consumed the declaration once.
    pub struct_decls: HashMap<String, StructDecl>,
    pub function_templates: HashMap<String, FunctionDecl>,
    pub mono_struct_cache: HashMap<String, StructType<'ctx>>,
    pub mono_function_cache: HashMap<String, inkwell::values::FunctionValue<'ctx>>,

    pub enum_types: HashMap<String, inkwell::types::IntType<'ctx>>,
    pub enum_members: HashMap<String, HashMap<String, i64>>,

    /// User-declared `macro` bodies, substituted and inlined at each call
    /// site rather than compiled to a standalone function.
    pub macros: HashMap<String, MacroDecl>,
    /// User-declared `special` bodies, executed at the call site alongside
    /// the handful of builtin specials (`@hasattr`, `@name`, `@unsafe_unbox`).
    pub specials: HashMap<String, SpecialDecl>,

    /// Declared return type of every function/method, keyed by mangled
    /// name, filled during the forward-declaration pass so call-site type
    /// inference never has to re-walk a callee's body.
    pub function_return_types: HashMap<String, FinType>,
    pub function_param_types: HashMap<String, Vec<FinType>>,

    /// `(concrete_struct, interface)` -> the global holding that pair's
    /// vtable constant, memoized so repeated packing of the same pair
    /// reuses one global.
    pub vtables: HashMap<(String, String), GlobalValue<'ctx>>,
}

impl<'ctx> Registries<'ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_index(&self, struct_name: &str, field: &str) -> Option<u32> {
        self.struct_field_indices.get(struct_name)?.get(field).copied()
    }

    pub fn total_field_count(&self, struct_name: &str) -> u32 {
        self.struct_field_indices
            .get(struct_name)
            .map(|m| m.len() as u32)
            .unwrap_or(0)
    }
}

/// Process-wide interned-string cache: one `GlobalValue` per distinct
/// string literal, shared across every module compiled in the process.
/// This is the single registry kept concurrent-shaped, since it is a
/// cross-module cache by design rather than per-compilation state.
#[derive(Default)]
pub struct StringInterner<'ctx> {
    strings: DashMap<String, GlobalValue<'ctx>>,
}

impl<'ctx> StringInterner<'ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, value: &str) -> Option<GlobalValue<'ctx>> {
        self.strings.get(value).map(|g| *g)
    }

    pub fn insert(&self, value: String, global: GlobalValue<'ctx>) {
        self.strings.insert(value, global);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_field_count_defaults_to_zero() {
        let registries: Registries = Registries::new();
        assert_eq!(registries.total_field_count("Vector"), 0);
    }
}
