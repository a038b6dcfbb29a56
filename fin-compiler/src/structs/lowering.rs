use fin_ast::{StructDecl, TypeNode};
use fin_diagnostics::CompileResult;

use crate::compiler::Compiler;
use crate::fin_type::FinType;
use crate::registry::{FieldMeta, Visibility};

/// Compiles a single concrete (non-template) struct declaration through
/// both passes. Used directly by MONO instantiation, which needs the
/// result available immediately at the use site rather than waiting for
/// the module's own two-pass sweep.
pub fn lower_struct(compiler: &mut Compiler, decl: &StructDecl, span: &fin_ast::Span) -> CompileResult<()> {
    declare_struct_shape(compiler, decl)?;
    lower_struct_bodies(compiler, decl)?;
    let _ = span;
    Ok(())
}

/// Pass 1 — shape: opaque struct type, parent flattening, own fields.
pub fn declare_struct_shape(compiler: &mut Compiler, decl: &StructDecl) -> CompileResult<()> {
    // A MONO instantiation already registered its concrete decl under its
    // final signature key (see `structs::mono::instantiate_struct`) before
    // calling in here; mangling that key again would make the name this
    // function builds diverge from the one callers look `struct_types` up
    // by. Anything not already keyed that way is a fresh declaration and
    // still needs its bare name turned into this file's mangled form.
    let already_final = compiler.registries.struct_decls.contains_key(&decl.name);
    let mangled = if decl.type_params.is_empty() && !already_final { compiler.mangled(&decl.name) } else { decl.name.clone() };

    if compiler.registries.struct_field_indices.contains_key(&mangled) {
        return Ok(());
    }

    compiler.registries.struct_decls.insert(mangled.clone(), decl.clone());
    let mode = crate::structs::classify_mode(decl);
    compiler.registries.modes.insert(mangled.clone(), mode);

    if decl.is_interface {
        compiler.registries.interfaces.insert(mangled.clone());
        let method_names: Vec<String> = decl.methods.iter().map(|m| m.name.clone()).collect();
        let mut return_types = std::collections::HashMap::new();
        for method in &decl.methods {
            let ret = match &method.return_type {
                Some(t) => crate::types::ast_to_fin_type(compiler, t)?,
                None => FinType::void(),
            };
            return_types.insert(method.name.clone(), ret);
        }
        compiler.registries.interface_method_return_types.insert(mangled.clone(), return_types);
        compiler.registries.interface_methods.insert(mangled.clone(), method_names);
        compiler.registries.struct_field_indices.insert(mangled, std::collections::HashMap::new());
        return Ok(());
    }

    if matches!(mode, crate::registry::Mode::Mono) {
        compiler.registries.struct_templates.insert(mangled, decl.clone());
        return Ok(());
    }

    let opaque = compiler.context.opaque_struct_type(&mangled);
    compiler.registries.struct_types.insert(mangled.clone(), opaque);
    compiler.registries.struct_generic_params.insert(mangled.clone(), decl.type_params.iter().map(|p| p.name.clone()).collect());

    let mut field_indices = std::collections::HashMap::new();
    let mut field_meta = std::collections::HashMap::new();
    let mut field_llvm_types = Vec::new();
    let mut parent_names = Vec::new();
    let mut next_index = 0u32;

    for parent in &decl.parents {
        let parent_name = match &parent.node {
            TypeNode::Named(name) => name.clone(),
            TypeNode::ModuleQualified { name, .. } => name.clone(),
            _ => return Err(compiler.error(&parent.span, "a struct's parent must be a named struct or interface")),
        };
        let parent_mangled = resolve_or_shape_parent(compiler, &parent_name, &parent.span)?;
        parent_names.push(parent_mangled.clone());

        if compiler.registries.interfaces.contains(&parent_mangled) {
            verify_interface_satisfied(compiler, decl, &parent_mangled, &parent.span)?;
            continue;
        }

        let parent_field_order: Vec<(String, u32)> = {
            let mut v: Vec<(String, u32)> = compiler
                .registries
                .struct_field_indices
                .get(&parent_mangled)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .collect();
            v.sort_by_key(|(_, idx)| *idx);
            v
        };
        for (field_name, _) in parent_field_order {
            let meta = compiler.registries.struct_field_meta[&parent_mangled][&field_name].clone();
            let llvm_ty = crate::types::fin_type_to_llvm(compiler, &meta.source_type)?;
            field_indices.insert(field_name.clone(), next_index);
            field_meta.insert(
                field_name,
                FieldMeta { index: next_index, default: meta.default, visibility: meta.visibility, source_type: meta.source_type },
            );
            field_llvm_types.push(llvm_ty);
            next_index += 1;
        }
    }

    for field in &decl.fields {
        let llvm_ty = crate::types::convert_type(compiler, &field.ty)?;
        let source_type = crate::types::ast_to_fin_type(compiler, &field.ty)?;
        let visibility = match field.visibility {
            fin_ast::Visibility::Public => Visibility::Public,
            fin_ast::Visibility::Private => Visibility::Private,
        };
        field_indices.insert(field.name.clone(), next_index);
        field_meta.insert(field.name.clone(), FieldMeta { index: next_index, default: field.default.clone(), visibility, source_type });
        field_llvm_types.push(llvm_ty);
        next_index += 1;
    }

    opaque.set_body(&field_llvm_types, false);
    compiler.registries.struct_field_indices.insert(mangled.clone(), field_indices);
    compiler.registries.struct_field_meta.insert(mangled.clone(), field_meta);
    compiler.registries.struct_parents.insert(mangled, parent_names);
    Ok(())
}

fn resolve_or_shape_parent(compiler: &mut Compiler, name: &str, span: &fin_ast::Span) -> CompileResult<String> {
    let local = compiler.mangled(name);
    if compiler.registries.struct_field_indices.contains_key(&local) || compiler.registries.interfaces.contains(&local) {
        return Ok(local);
    }
    if compiler.registries.struct_field_indices.contains_key(name) || compiler.registries.interfaces.contains(name) {
        return Ok(name.to_string());
    }
    if let Some(decl) = compiler.registries.struct_decls.get(&local).cloned() {
        declare_struct_shape(compiler, &decl)?;
        return Ok(local);
    }
    Err(compiler.error(span, format!("unknown parent struct or interface '{name}'")))
}

fn verify_interface_satisfied(compiler: &mut Compiler, decl: &StructDecl, interface_mangled: &str, span: &fin_ast::Span) -> CompileResult<()> {
    let required = compiler.registries.interface_methods.get(interface_mangled).cloned().unwrap_or_default();
    for method_name in &required {
        let implemented = decl.methods.iter().any(|m| &m.name == method_name);
        if !implemented {
            return Err(compiler.error_with_hint(
                span,
                format!("'{}' does not implement required method '{method_name}'", decl.name),
                format!("add a method named '{method_name}' matching the interface's signature"),
            ));
        }
    }
    Ok(())
}

/// Pass 2 — behavior: operators, constructor(s), destructor, inherited and
/// own methods.
pub fn lower_struct_bodies(compiler: &mut Compiler, decl: &StructDecl) -> CompileResult<()> {
    if decl.is_interface {
        return Ok(());
    }
    let already_final = compiler.registries.struct_decls.contains_key(&decl.name);
    let mangled = if decl.type_params.is_empty() && !already_final { compiler.mangled(&decl.name) } else { decl.name.clone() };
    if matches!(compiler.registries.modes.get(&mangled), Some(crate::registry::Mode::Mono)) {
        return Ok(());
    }

    let saved_struct = compiler.current_struct.replace(mangled.clone());

    let mut operator_table = std::collections::HashMap::new();
    for op in &decl.operators {
        let fn_name = format!("{mangled}__op_{}", op.symbol.mangled_suffix());
        crate::functions::lowering::compile_operator(compiler, &mangled, &fn_name, op)?;
        operator_table.insert(op.symbol, fn_name);
    }
    compiler.registries.struct_operators.insert(mangled.clone(), operator_table);

    for (i, ctor) in decl.constructors.iter().enumerate() {
        let fn_name = if i == 0 { format!("{mangled}__init") } else { format!("{mangled}__init{i}") };
        crate::functions::lowering::compile_constructor(compiler, &mangled, &fn_name, ctor)?;
    }
    compiler.registries.struct_constructors.insert(mangled.clone(), decl.constructors.clone());

    if let Some(dtor) = &decl.destructor {
        let fn_name = format!("{mangled}__del");
        crate::functions::lowering::compile_destructor(compiler, &mangled, &fn_name, dtor)?;
        compiler.registries.struct_destructors.insert(mangled.clone(), dtor.clone());
    }

    for parent_mangled in compiler.registries.struct_parents.get(&mangled).cloned().unwrap_or_default() {
        if compiler.registries.interfaces.contains(&parent_mangled) {
            continue;
        }
        let inherited = compiler.registries.struct_methods.get(&parent_mangled).cloned().unwrap_or_default();
        for method in inherited {
            let overridden = decl.methods.iter().any(|m| m.name == method.name);
            if !overridden {
                let fn_name = format!("{mangled}__{}", method.name);
                crate::functions::lowering::compile_method(compiler, &mangled, &fn_name, &method)?;
            }
        }
    }

    for method in &decl.methods {
        let fn_name = format!("{mangled}__{}", method.name);
        crate::functions::lowering::compile_method(compiler, &mangled, &fn_name, method)?;
    }
    compiler.registries.struct_methods.insert(mangled, decl.methods.clone());

    compiler.current_struct = saved_struct;
    Ok(())
}

/// Unboxes `value` (a loaded field typed as the struct's own generic
/// parameter) against the parameter's concrete binding, when one is
/// available. No-op when `field_fin_type` is not a bare `GenericParam`.
pub fn unbox_field_if_generic(field_fin_type: &FinType, struct_generic_args: &[FinType], struct_params: &[String]) -> Option<FinType> {
    if let FinType::GenericParam(name) = field_fin_type {
        let pos = struct_params.iter().position(|p| p == name)?;
        return struct_generic_args.get(pos).cloned();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbox_field_resolves_against_matching_param_position() {
        let field = FinType::GenericParam("T".into());
        let params = vec!["T".to_string()];
        let args = vec![FinType::int()];
        assert_eq!(unbox_field_if_generic(&field, &args, &params), Some(FinType::int()));
    }

    #[test]
    fn unbox_field_is_noop_for_concrete_types() {
        let field = FinType::int();
        assert_eq!(unbox_field_if_generic(&field, &[], &[]), None);
    }
}
