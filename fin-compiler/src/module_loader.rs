//! Import resolution: maps an `import` declaration to a file, compiles it
//! at most once, and merges the requested symbols into the importing
//! module's scope.
//!
//! This crate has no lexer or parser of its own (see `Compiler::module_sources`):
//! every file reachable from the entrypoint must already be parsed and
//! registered with `Compiler::register_module` before compilation starts.
//! Path resolution, cycle detection, and caching below mirror that
//! constraint rather than touching the filesystem.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use fin_ast::{ImportDecl, ImportSource, Program, Span, TopLevel, Visibility};
use fin_diagnostics::CompileResult;

use crate::compiler::Compiler;
use crate::scope::ValueSymbol;

/// What an already-compiled module exposes to an importer: its global
/// value symbols (keyed by their own mangled name) and which top-level
/// names were declared public.
#[derive(Clone)]
pub struct ModuleNamespace<'ctx> {
    values: HashMap<String, ValueSymbol<'ctx>>,
    visibility: HashMap<String, Visibility>,
}

impl<'ctx> Default for ModuleNamespace<'ctx> {
    fn default() -> Self {
        Self { values: HashMap::new(), visibility: HashMap::new() }
    }
}

pub fn process_import<'ctx>(compiler: &mut Compiler<'ctx>, decl: &ImportDecl, span: &Span) -> CompileResult<()> {
    match &decl.source {
        ImportSource::Path(rel) => {
            let path = resolve_relative_path(compiler, rel);
            let ns = load_module(compiler, &path, span)?;
            merge_symbols(compiler, &ns, &path, decl, span)
        }
        ImportSource::Package { package } => process_package_import(compiler, package, decl, span),
    }
}

fn resolve_relative_path(compiler: &Compiler, rel: &str) -> PathBuf {
    let base = compiler.current_file.parent().map(Path::to_path_buf).unwrap_or_default();
    let rel = rel.strip_prefix("./").unwrap_or(rel);
    let joined = base.join(rel);
    if joined.extension().is_some() {
        joined
    } else {
        joined.with_extension("fin")
    }
}

/// Compiles `path` on first visit, returns the cached namespace on every
/// later import, and breaks cycles by handing back an empty namespace
/// while the target is still mid-compilation (its forward-declared
/// prototypes are already visible through `Compiler::module`/registries,
/// which are global rather than scope-bound, so callers only lose access
/// to the target's scope-bound globals until the cycle unwinds).
fn load_module<'ctx>(compiler: &mut Compiler<'ctx>, path: &PathBuf, span: &Span) -> CompileResult<ModuleNamespace<'ctx>> {
    if let Some(ns) = compiler.loader.namespaces.get(path) {
        return Ok(ns.clone());
    }
    if compiler.loader.visiting.contains(path) {
        log::debug!("import cycle detected at '{}', breaking with a partial namespace", path.display());
        return Ok(ModuleNamespace::default());
    }

    let program = compiler
        .module_sources
        .get(path)
        .cloned()
        .ok_or_else(|| compiler.error(span, format!("cannot locate module '{}'", path.display())))?;

    let ns = compile_module(compiler, path, &program)?;
    compiler.loader.namespaces.insert(path.clone(), ns.clone());
    Ok(ns)
}

fn compile_module<'ctx>(compiler: &mut Compiler<'ctx>, path: &Path, program: &Program) -> CompileResult<ModuleNamespace<'ctx>> {
    compiler.loader.visiting.insert(path.to_path_buf());
    let saved_file = std::mem::replace(&mut compiler.current_file, path.to_path_buf());
    compiler.scope.push();

    let result = compiler.compile_program(program);

    let values = compiler.scope.snapshot_top_frame();
    compiler.scope.pop();
    compiler.current_file = saved_file;
    compiler.loader.visiting.remove(path);
    result?;

    let visibility = program
        .items
        .iter()
        .filter(|item| !matches!(item.node, TopLevel::Import(_)))
        .map(|item| (item.node.name().to_string(), item.node.visibility()))
        .collect();

    compiler.loader.compiled.insert(path.to_path_buf());
    log::debug!("compiled module '{}'", path.display());
    Ok(ModuleNamespace { values, visibility })
}

/// Installs the requested targets (or just the module alias, in strict
/// mode) into the importer's current scope. Type names always get a type
/// alias from the short name to the imported mangled name, per the
/// resolved design question on generic-struct imports: installing the
/// alias unconditionally (not only for non-generic structs) is what lets
/// `Vector<int>` resolve after `import { Vector } from "./vector.fin";`.
fn merge_symbols<'ctx>(compiler: &mut Compiler<'ctx>, ns: &ModuleNamespace<'ctx>, path: &Path, decl: &ImportDecl, span: &Span) -> CompileResult<()> {
    if let Some(alias) = &decl.alias {
        compiler.loader.aliases.insert(alias.clone(), path.to_path_buf());
    }

    let Some(targets) = &decl.targets else {
        return Ok(());
    };

    for target in targets {
        match ns.visibility.get(&target.name) {
            Some(Visibility::Public) => {}
            Some(Visibility::Private) => return Err(compiler.error(span, format!("'{}' is private in '{}'", target.name, path.display()))),
            None => return Err(compiler.error(span, format!("'{}' is not defined in '{}'", target.name, path.display()))),
        }

        let local_name = target.alias.clone().unwrap_or_else(|| target.name.clone());
        let mangled_target = compiler.mangled_in(path, &target.name);

        if let Some(sym) = ns.values.get(&mangled_target).cloned() {
            compiler.scope.define(local_name.clone(), sym.value, sym.fin_type);
        }
        compiler.scope.define_type_alias(local_name, mangled_target);
    }
    Ok(())
}

/// A package import resolves to one file per requested target (via the
/// package's export map), falling back to the package's root file for any
/// target the map doesn't mention.
fn process_package_import<'ctx>(compiler: &mut Compiler<'ctx>, package: &str, decl: &ImportDecl, span: &Span) -> CompileResult<()> {
    let Some(targets) = &decl.targets else {
        let root = compiler
            .package_roots
            .get(package)
            .cloned()
            .ok_or_else(|| compiler.error(span, format!("unknown package '{package}'")))?;
        let ns = load_module(compiler, &root, span)?;
        return merge_symbols(compiler, &ns, &root, decl, span);
    };

    let root = compiler.package_roots.get(package).cloned();
    let exports = compiler.package_exports.get(package).cloned().unwrap_or_default();

    for target in targets {
        let providing = exports
            .get(&target.name)
            .cloned()
            .or_else(|| root.clone())
            .ok_or_else(|| compiler.error(span, format!("package '{package}' has no member '{}'", target.name)))?;

        let ns = load_module(compiler, &providing, span)?;
        let single = ImportDecl { source: decl.source.clone(), targets: Some(vec![target.clone()]), alias: None };
        merge_symbols(compiler, &ns, &providing, &single, span)?;
    }

    if let Some(alias) = &decl.alias {
        if let Some(root) = root {
            compiler.loader.aliases.insert(alias.clone(), root);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fin_ast::{Spanned, Visibility as V};

    fn program_with_public_struct(name: &str) -> Program {
        Program {
            file: format!("{name}.fin"),
            items: vec![Spanned::new(
                TopLevel::Struct(fin_ast::StructDecl {
                    name: name.to_string(),
                    type_params: vec![],
                    parents: vec![],
                    fields: vec![],
                    constructors: vec![],
                    operators: vec![],
                    destructor: None,
                    methods: vec![],
                    visibility: V::Public,
                    attributes: vec![],
                    is_interface: false,
                }),
                Span::unknown(),
            )],
        }
    }

    #[test]
    fn path_import_installs_a_type_alias_for_a_public_struct() {
        let context = inkwell::context::Context::create();
        let mut compiler = Compiler::new(&context, "m", crate::options::CompileOptions::new("/p"), PathBuf::from("/p/a.fin"));
        compiler.register_module(PathBuf::from("/p/vector.fin"), program_with_public_struct("Vector"));

        let decl = ImportDecl {
            source: ImportSource::Path("./vector.fin".into()),
            targets: Some(vec![fin_ast::ImportTarget { name: "Vector".into(), alias: None }]),
            alias: None,
        };
        process_import(&mut compiler, &decl, &Span::unknown()).unwrap();

        let mangled = compiler.mangled_in(&PathBuf::from("/p/vector.fin"), "Vector");
        assert_eq!(compiler.scope.resolve_type_alias("Vector"), Some(mangled.as_str()));
    }

    #[test]
    fn importing_a_private_symbol_is_rejected() {
        let context = inkwell::context::Context::create();
        let mut compiler = Compiler::new(&context, "m", crate::options::CompileOptions::new("/p"), PathBuf::from("/p/a.fin"));
        let mut program = program_with_public_struct("Internal");
        if let TopLevel::Struct(s) = &mut program.items[0].node {
            s.visibility = V::Private;
        }
        compiler.register_module(PathBuf::from("/p/lib.fin"), program);

        let decl = ImportDecl {
            source: ImportSource::Path("./lib.fin".into()),
            targets: Some(vec![fin_ast::ImportTarget { name: "Internal".into(), alias: None }]),
            alias: None,
        };
        assert!(process_import(&mut compiler, &decl, &Span::unknown()).is_err());
    }

    #[test]
    fn cyclic_imports_do_not_recurse_infinitely() {
        let context = inkwell::context::Context::create();
        let mut compiler = Compiler::new(&context, "m", crate::options::CompileOptions::new("/p"), PathBuf::from("/p/a.fin"));

        let mut a = program_with_public_struct("A");
        a.items.push(Spanned::new(
            TopLevel::Import(ImportDecl { source: ImportSource::Path("./b.fin".into()), targets: None, alias: None }),
            Span::unknown(),
        ));
        let mut b = program_with_public_struct("B");
        b.items.push(Spanned::new(
            TopLevel::Import(ImportDecl { source: ImportSource::Path("./a.fin".into()), targets: None, alias: None }),
            Span::unknown(),
        ));

        compiler.register_module(PathBuf::from("/p/a.fin"), a);
        compiler.register_module(PathBuf::from("/p/b.fin"), b);

        let decl = ImportDecl { source: ImportSource::Path("./a.fin".into()), targets: None, alias: None };
        assert!(process_import(&mut compiler, &decl, &Span::unknown()).is_ok());
        assert!(compiler.loader.compiled.contains(&PathBuf::from("/p/a.fin")));
        assert!(compiler.loader.compiled.contains(&PathBuf::from("/p/b.fin")));
    }
}
