//! Type resolution: three parallel representations of "what type is
//! this" coexist — AST type nodes (source shape), `FinType` (semantic,
//! deterministic type IDs), and LLVM types (lowered). The conversions
//! between them are `convert_type` (AST -> LLVM direct), `ast_to_fin_type`
//! (AST -> FinType), and `fin_type_to_llvm` (FinType -> LLVM), plus the
//! generic-pattern machinery `match_generic_types`/`get_arg_fin_type`.

mod conversion;
mod inference;
mod unification;

pub use conversion::{array_type_of, convert_type, fin_type_to_llvm, storage_llvm_type};
pub use inference::get_arg_fin_type;
pub use unification::match_generic_types;

use fin_ast::{PType, TypeNode};
use fin_diagnostics::CompileResult;

use crate::compiler::Compiler;
use crate::fin_type::{FinType, Primitive};

/// AST -> `FinType`. Preserves generic arguments symbolically so equality
/// of two `FinType`s is stable across separately-compiled modules that
/// both reference the same struct. `Self` resolves to whichever struct is
/// currently being lowered.
pub fn ast_to_fin_type(compiler: &mut Compiler, ty: &PType) -> CompileResult<FinType> {
    match &ty.node {
        TypeNode::Named(name) => {
            if name == "Self" {
                if let Some(current) = &compiler.current_struct {
                    return Ok(FinType::Struct {
                        name: current.clone(),
                        generic_args: vec![],
                    });
                }
                return Err(compiler.error(&ty.span, "`Self` used outside of a struct body"));
            }
            if compiler.scope.is_type_parameter(name) {
                return Ok(FinType::GenericParam(name.clone()));
            }
            if let Some(p) = Primitive::from_name(name) {
                return Ok(FinType::Primitive(p));
            }
            if name == "any" {
                return Ok(FinType::Any);
            }
            if compiler.registries.enum_types.contains_key(name) {
                return Ok(FinType::Struct {
                    name: name.clone(),
                    generic_args: vec![],
                });
            }
            let resolved = resolve_struct_name(compiler, name);
            Ok(FinType::Struct {
                name: resolved,
                generic_args: vec![],
            })
        }
        TypeNode::ModuleQualified { module: _, name } => Ok(FinType::Struct {
            name: name.clone(),
            generic_args: vec![],
        }),
        TypeNode::Generic { base, args } => {
            if base == "Collection" {
                let elem = args
                    .first()
                    .ok_or_else(|| compiler.error(&ty.span, "Collection<T> requires one type argument"))?;
                let elem_fin = ast_to_fin_type(compiler, elem)?;
                return Ok(FinType::collection(elem_fin));
            }
            let mut generic_args = Vec::with_capacity(args.len());
            for a in args {
                generic_args.push(ast_to_fin_type(compiler, a)?);
            }
            let resolved = resolve_struct_name(compiler, base);
            Ok(FinType::Struct {
                name: resolved,
                generic_args,
            })
        }
        TypeNode::Pointer(inner) => Ok(FinType::Pointer(Box::new(ast_to_fin_type(compiler, inner)?))),
        TypeNode::Array { elem, size } => {
            let elem_fin = ast_to_fin_type(compiler, elem)?;
            match size {
                // No statically-known length (e.g. a parameter written
                // `int[]`): decays to a plain pointer, same as `&T`.
                None => Ok(FinType::Pointer(Box::new(elem_fin))),
                Some(n) => Ok(FinType::Array { elem: Box::new(elem_fin), size: *n }),
            }
        }
        TypeNode::Function { .. } => Ok(FinType::Pointer(Box::new(FinType::void()))),
    }
}

/// Inverse of `ast_to_fin_type` for the one place a `FinType` must be
/// turned back into an AST type node: substituting a MONO template's type
/// parameters with their call-site concrete types before recompiling it.
pub fn fin_type_to_type_node(fin: &FinType) -> TypeNode {
    match fin {
        FinType::Primitive(p) => TypeNode::Named(p.name().to_string()),
        FinType::Any => TypeNode::Named("any".to_string()),
        FinType::GenericParam(name) => TypeNode::Named(name.clone()),
        FinType::Pointer(inner) => TypeNode::Pointer(Box::new(fin_ast::Spanned {
            node: fin_type_to_type_node(inner),
            span: fin_ast::Span::unknown(),
        })),
        FinType::Array { elem, size } => TypeNode::Array {
            elem: Box::new(fin_ast::Spanned {
                node: fin_type_to_type_node(elem),
                span: fin_ast::Span::unknown(),
            }),
            size: Some(*size),
        },
        FinType::Struct { name, generic_args } => {
            if generic_args.is_empty() {
                TypeNode::Named(name.clone())
            } else {
                TypeNode::Generic {
                    base: name.clone(),
                    args: generic_args
                        .iter()
                        .map(|a| fin_ast::Spanned { node: fin_type_to_type_node(a), span: fin_ast::Span::unknown() })
                        .collect(),
                }
            }
        }
    }
}

/// Resolves a bare type name to its mangled form: local struct defined in
/// the current file, an installed type alias (from `import`), or — if
/// neither applies — the bare name as given (covers builtins like
/// `Collection` and names already fully mangled by a caller).
fn resolve_struct_name(compiler: &Compiler, name: &str) -> String {
    let local = compiler.mangled(name);
    if compiler.registries.struct_types.contains_key(&local) || compiler.registries.struct_templates.contains_key(&local) {
        return local;
    }
    if let Some(aliased) = compiler.scope.resolve_type_alias(name) {
        return aliased.to_string();
    }
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fin_ast::Spanned;
    use inkwell::context::Context;
    use std::path::PathBuf;

    fn spanned(node: TypeNode) -> PType {
        Spanned { node, span: fin_ast::Span::unknown() }
    }

    #[test]
    fn primitive_name_resolves_directly() {
        let context = Context::create();
        let mut compiler = Compiler::new(&context, "m", crate::options::CompileOptions::new("/p"), PathBuf::from("/p/a.fin"));
        let ty = spanned(TypeNode::Named("int".into()));
        assert_eq!(ast_to_fin_type(&mut compiler, &ty).unwrap(), FinType::int());
    }

    #[test]
    fn type_parameter_in_scope_resolves_to_generic_param() {
        let context = Context::create();
        let mut compiler = Compiler::new(&context, "m", crate::options::CompileOptions::new("/p"), PathBuf::from("/p/a.fin"));
        compiler.scope.define_type_parameter("T", None);
        let ty = spanned(TypeNode::Named("T".into()));
        assert_eq!(ast_to_fin_type(&mut compiler, &ty).unwrap(), FinType::GenericParam("T".into()));
    }

    #[test]
    fn collection_generic_carries_element_type() {
        let context = Context::create();
        let mut compiler = Compiler::new(&context, "m", crate::options::CompileOptions::new("/p"), PathBuf::from("/p/a.fin"));
        let ty = spanned(TypeNode::Generic {
            base: "Collection".into(),
            args: vec![spanned(TypeNode::Named("long".into()))],
        });
        let fin = ast_to_fin_type(&mut compiler, &ty).unwrap();
        assert!(fin.is_collection());
        assert_eq!(fin.signature(), "Collection<long>");
    }
}
