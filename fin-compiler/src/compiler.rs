//! The `Compiler` context object: one LLVM `Module`, one current
//! `Builder`, one current `Function`, one current `Scope`, and the
//! registries. Every lowering routine in this crate is a
//! method on `Compiler` (or a thin free function taking `&mut Compiler`),
//! it is the single context every lowering submodule's `impl` block
//! hangs off of.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use fin_ast::{Program, Span};
use fin_diagnostics::{CompileError, CompileResult, DiagnosticEngine, ErrorSink};
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::values::FunctionValue;

use crate::fin_type::FinType;
use crate::mangler::Mangler;
use crate::options::CompileOptions;
use crate::registry::{Registries, StringInterner};
use crate::scope::ScopeStack;

/// Everything the module loader needs to resolve imports, detect cycles,
/// and cache already-compiled modules.
pub struct LoaderState<'ctx> {
    pub visiting: HashSet<PathBuf>,
    /// Path -> the set of public (exported) symbol names that module
    /// defines. The scope contents themselves live in `Compiler::scope`
    /// only while that module is the one being compiled; what survives
    /// after popping is this visibility record plus whatever the importer
    /// explicitly copied into its own scope during symbol merging.
    pub compiled: HashSet<PathBuf>,
    pub entrypoint: PathBuf,
    /// `import ... as m;` bindings, resolved by `m.Symbol` module access
    /// expressions.
    pub aliases: HashMap<String, PathBuf>,
    /// Every module that finished compiling, keyed by its resolved path,
    /// so a second `import` of the same file is a cache hit rather than a
    /// recompile.
    pub namespaces: HashMap<PathBuf, crate::module_loader::ModuleNamespace<'ctx>>,
}

pub struct Compiler<'ctx> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,

    pub options: CompileOptions,
    pub mangler: Mangler,
    pub errors: DiagnosticEngine,
    pub scope: ScopeStack<'ctx>,
    pub registries: Registries<'ctx>,
    pub interner: StringInterner<'ctx>,
    pub loader: LoaderState<'ctx>,

    /// Parsed ASTs for every file reachable from the entrypoint, supplied
    /// up front by the embedder (this crate has no lexer/parser of its
    /// own). The module loader looks paths up here rather than touching
    /// the filesystem.
    pub module_sources: HashMap<PathBuf, Program>,
    /// Package name -> (exported symbol -> providing file). Consulted
    /// before falling back to the package's root file.
    pub package_exports: HashMap<String, HashMap<String, PathBuf>>,
    pub package_roots: HashMap<String, PathBuf>,

    pub current_function: Option<FunctionValue<'ctx>>,
    pub current_function_return_type: Option<FinType>,
    /// Mangled name of the struct currently being lowered, used to resolve
    /// `Self` and to know which struct's generic-arg bindings apply when
    /// unboxing a field typed as a bare type parameter.
    pub current_struct: Option<String>,
    /// The module-local generic argument bindings active while lowering a
    /// MONO instantiation (`T -> int`, ...).
    pub current_type_bindings: HashMap<String, FinType>,

    pub current_file: PathBuf,

    pub(crate) panic_fn: Option<FunctionValue<'ctx>>,
    pub(crate) malloc_fn: Option<FunctionValue<'ctx>>,
    pub(crate) free_fn: Option<FunctionValue<'ctx>>,
    pub(crate) exit_fn: Option<FunctionValue<'ctx>>,
}

impl<'ctx> Compiler<'ctx> {
    pub fn new(context: &'ctx Context, module_name: &str, options: CompileOptions, entrypoint: PathBuf) -> Self {
        let module = context.create_module(module_name);
        if let Some(triple) = &options.target_triple {
            module.set_triple(&inkwell::targets::TargetTriple::create(triple));
        }
        Self {
            context,
            module,
            builder: context.create_builder(),
            options,
            mangler: Mangler::new(),
            errors: DiagnosticEngine::new(),
            scope: ScopeStack::new(),
            registries: Registries::new(),
            interner: StringInterner::new(),
            loader: LoaderState {
                visiting: HashSet::new(),
                compiled: HashSet::new(),
                entrypoint: entrypoint.clone(),
                aliases: HashMap::new(),
                namespaces: HashMap::new(),
            },
            module_sources: HashMap::new(),
            package_exports: HashMap::new(),
            package_roots: HashMap::new(),
            current_function: None,
            current_function_return_type: None,
            current_struct: None,
            current_type_bindings: HashMap::new(),
            current_file: entrypoint,
            panic_fn: None,
            malloc_fn: None,
            free_fn: None,
            exit_fn: None,
        }
    }

    pub fn mangled(&self, name: &str) -> String {
        self.mangler.mangle(&self.options.project_root, &self.current_file, name)
    }

    pub fn mangled_in(&self, file: &Path, name: &str) -> String {
        self.mangler.mangle(&self.options.project_root, file, name)
    }

    /// Registers a parsed module so `import` can find it by path. The
    /// embedder calls this once per file in the import graph before
    /// compiling the entrypoint.
    pub fn register_module(&mut self, path: PathBuf, program: Program) {
        self.module_sources.insert(path, program);
    }

    /// Registers a package's root file and its per-symbol export map,
    /// used by `import { X } from some_package;`.
    pub fn register_package(&mut self, package: impl Into<String>, root: PathBuf, exports: HashMap<String, PathBuf>) {
        let package = package.into();
        self.package_roots.insert(package.clone(), root);
        self.package_exports.insert(package, exports);
    }

    pub fn error(&mut self, span: &Span, message: impl Into<String>) -> CompileError {
        self.errors.error(span, message, None)
    }

    pub fn error_with_hint(&mut self, span: &Span, message: impl Into<String>, hint: impl Into<String>) -> CompileError {
        self.errors.error(span, message, Some(&hint.into()))
    }

    /// Top-level driver: compile a whole `Program`, two-pass. This is the
    /// entry point the module loader also calls (with a
    /// fresh module-scoped `current_file`/scope frame) for every import.
    pub fn compile_program(&mut self, program: &Program) -> CompileResult<()> {
        self.declare_runtime_intrinsics();

        // Pass 0: forward-declare types and function prototypes so mutual
        // recursion across declarations in the same file resolves.
        crate::functions::lowering::declare_pass(self, program)?;

        // Pass 1: compile bodies.
        crate::functions::lowering::compile_pass(self, program)?;

        Ok(())
    }

    /// Declares the runtime contract functions:
    /// `malloc`, `free`, `exit`, `__panic`. These are external symbols
    /// that bypass the mangler by construction (they are never looked up
    /// through `get_mangled_name`).
    fn declare_runtime_intrinsics(&mut self) {
        use inkwell::AddressSpace;

        let i8_ptr = self.context.ptr_type(AddressSpace::default());
        let i64_ty = self.context.i64_type();
        let i32_ty = self.context.i32_type();
        let void_ty = self.context.void_type();

        if self.module.get_function("malloc").is_none() {
            let fn_ty = i8_ptr.fn_type(&[i64_ty.into()], false);
            self.malloc_fn = Some(self.module.add_function("malloc", fn_ty, None));
        }
        if self.module.get_function("free").is_none() {
            let fn_ty = void_ty.fn_type(&[i8_ptr.into()], false);
            self.free_fn = Some(self.module.add_function("free", fn_ty, None));
        }
        if self.module.get_function("exit").is_none() {
            let fn_ty = void_ty.fn_type(&[i32_ty.into()], false);
            self.exit_fn = Some(self.module.add_function("exit", fn_ty, None));
        }
        if self.module.get_function("__panic").is_none() {
            let fn_ty = void_ty.fn_type(&[i8_ptr.into()], false);
            self.panic_fn = Some(self.module.add_function("__panic", fn_ty, None));
        }

        for name in ["malloc", "free", "exit", "__panic"] {
            self.mangler.register_external(name);
        }
    }

    pub fn malloc_fn(&self) -> FunctionValue<'ctx> {
        self.malloc_fn.expect("runtime intrinsics declared in compile_program")
    }

    pub fn free_fn(&self) -> FunctionValue<'ctx> {
        self.free_fn.expect("runtime intrinsics declared in compile_program")
    }

    pub fn panic_fn(&self) -> FunctionValue<'ctx> {
        self.panic_fn.expect("runtime intrinsics declared in compile_program")
    }
}
