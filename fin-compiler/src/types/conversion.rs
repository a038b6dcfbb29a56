use fin_ast::{ErasureMarker, PType, TypeConstraint, TypeNode};
use fin_diagnostics::CompileResult;
use inkwell::types::BasicTypeEnum;
use inkwell::AddressSpace;

use crate::compiler::Compiler;
use crate::fin_type::{FinType, Primitive};
use crate::registry::Mode;

/// AST -> LLVM, direct. This is what every lowering routine calls to get
/// the concrete type an IR instruction needs.
pub fn convert_type<'ctx>(compiler: &mut Compiler<'ctx>, ty: &PType) -> CompileResult<BasicTypeEnum<'ctx>> {
    match &ty.node {
        TypeNode::Named(name) => convert_named(compiler, ty, name),
        TypeNode::ModuleQualified { module, name } => {
            if let Some(path) = compiler.loader.aliases.get(module).cloned() {
                let mangled = compiler.mangled_in(&path, name);
                if let Some(&st) = compiler.registries.struct_types.get(&mangled) {
                    return Ok(struct_reference(compiler, &mangled, st));
                }
            }
            convert_named(compiler, ty, name)
        }
        TypeNode::Pointer(inner) => {
            let _ = convert_type(compiler, inner)?;
            Ok(compiler.context.ptr_type(AddressSpace::default()).into())
        }
        TypeNode::Array { elem, size } => {
            let elem_ty = convert_type(compiler, elem)?;
            let count = size.unwrap_or(0) as u32;
            Ok(array_type_of(elem_ty, count))
        }
        TypeNode::Function { .. } => Ok(compiler.context.ptr_type(AddressSpace::default()).into()),
        TypeNode::Generic { base, args } => convert_generic(compiler, ty, base, args),
    }
}

pub(crate) fn array_type_of(elem: BasicTypeEnum<'_>, count: u32) -> BasicTypeEnum<'_> {
    match elem {
        BasicTypeEnum::IntType(t) => t.array_type(count).into(),
        BasicTypeEnum::FloatType(t) => t.array_type(count).into(),
        BasicTypeEnum::PointerType(t) => t.array_type(count).into(),
        BasicTypeEnum::StructType(t) => t.array_type(count).into(),
        BasicTypeEnum::ArrayType(t) => t.array_type(count).into(),
        BasicTypeEnum::VectorType(t) => t.array_type(count).into(),
        BasicTypeEnum::ScalableVectorType(_) => elem,
    }
}

fn convert_named<'ctx>(compiler: &mut Compiler<'ctx>, ty: &PType, name: &str) -> CompileResult<BasicTypeEnum<'ctx>> {
    // Generic parameters in scope: erasure lowers to ptr-to-byte, unless
    // the active constraint is the reflective erasure marker, in which
    // case the value is already boxed (still a bare pointer at the LLVM
    // level, but semantically {data, type_id} and handled by the boxing
    // helpers rather than here).
    if compiler.scope.is_type_parameter(name) {
        if let Some(binding) = compiler.current_type_bindings.get(name).cloned() {
            return crate::types::fin_type_to_llvm(compiler, &binding);
        }
        return Ok(compiler.context.ptr_type(AddressSpace::default()).into());
    }

    if let Some(p) = Primitive::from_name(name) {
        return Ok(primitive_llvm(compiler, p));
    }

    if name == "any" {
        // `{ data: ptr, type_id: i64 }`
        let i8_ptr = compiler.context.ptr_type(AddressSpace::default());
        let i64_ty = compiler.context.i64_type();
        return Ok(compiler.context.struct_type(&[i8_ptr.into(), i64_ty.into()], false).into());
    }

    if let Some(&int_ty) = compiler.registries.enum_types.get(name) {
        return Ok(int_ty.into());
    }
    let local = compiler.mangled(name);
    if let Some(&int_ty) = compiler.registries.enum_types.get(&local) {
        return Ok(int_ty.into());
    }

    // Local struct/interface, resolved through the mangler.
    if let Some(&st) = compiler.registries.struct_types.get(&local) {
        return Ok(struct_reference(compiler, &local, st));
    }

    // Imported name, resolved through the scope's type aliases.
    if let Some(aliased) = compiler.scope.resolve_type_alias(name).map(str::to_string) {
        if let Some(&st) = compiler.registries.struct_types.get(&aliased) {
            return Ok(struct_reference(compiler, &aliased, st));
        }
    }

    // Already a fully mangled name (e.g. produced by a caller).
    if let Some(&st) = compiler.registries.struct_types.get(name) {
        return Ok(struct_reference(compiler, name, st));
    }

    if let Some(binding) = compiler.current_type_bindings.get(name).cloned() {
        return crate::types::fin_type_to_llvm(compiler, &binding);
    }

    if compiler.registries.struct_templates.contains_key(&local) || compiler.registries.struct_templates.contains_key(name) {
        return Err(compiler.error_with_hint(
            &ty.span,
            format!("'{name}' is a generic template and cannot be used without type arguments"),
            "write it as Name<ConcreteType> at the use site",
        ));
    }

    Err(compiler.error(&ty.span, format!("unknown type '{name}'")))
}

fn primitive_llvm<'ctx>(compiler: &Compiler<'ctx>, p: Primitive) -> BasicTypeEnum<'ctx> {
    match p {
        Primitive::Int => compiler.context.i32_type().into(),
        Primitive::Long => compiler.context.i64_type().into(),
        Primitive::Float => compiler.context.f32_type().into(),
        Primitive::Double => compiler.context.f64_type().into(),
        Primitive::Bool => compiler.context.bool_type().into(),
        Primitive::Char => compiler.context.i8_type().into(),
        Primitive::String => compiler.context.ptr_type(AddressSpace::default()).into(),
        Primitive::Void => compiler.context.i8_type().into(),
    }
}

/// Interfaces lower to the `{data: ptr, vtable: ptr}` fat pointer shape;
/// plain structs lower to the struct type itself (callers that need a
/// pointer-to-struct wrap this, e.g. for locals and parameters).
fn struct_reference<'ctx>(compiler: &Compiler<'ctx>, mangled: &str, st: inkwell::types::StructType<'ctx>) -> BasicTypeEnum<'ctx> {
    if compiler.registries.interfaces.contains(mangled) {
        let i8_ptr = compiler.context.ptr_type(AddressSpace::default());
        return compiler.context.struct_type(&[i8_ptr.into(), i8_ptr.into()], false).into();
    }
    st.into()
}

fn convert_generic<'ctx>(compiler: &mut Compiler<'ctx>, ty: &PType, base: &str, args: &[PType]) -> CompileResult<BasicTypeEnum<'ctx>> {
    if base == "Collection" {
        // Collections are a runtime-managed pointer regardless of element
        // type; element type only matters for semantic (`FinType`) work.
        return Ok(compiler.context.ptr_type(AddressSpace::default()).into());
    }

    let local = compiler.mangled(base);
    let mode = compiler
        .registries
        .modes
        .get(&local)
        .copied()
        .or_else(|| compiler.registries.modes.get(base).copied());

    match mode {
        Some(Mode::Erased) | None if compiler.registries.struct_types.contains_key(&local) => {
            // ERASED: type arguments are ignored, the base (already
            // erased-to-ptr) struct is reused for every instantiation.
            let st = compiler.registries.struct_types[&local];
            Ok(struct_reference(compiler, &local, st))
        }
        Some(Mode::Mono) => {
            let mut fin_args = Vec::with_capacity(args.len());
            for a in args {
                fin_args.push(crate::types::ast_to_fin_type(compiler, a)?);
            }
            let instantiated = crate::structs::mono::instantiate_struct(compiler, &local, &fin_args, &ty.span)?;
            let st = compiler.registries.struct_types[&instantiated];
            Ok(struct_reference(compiler, &instantiated, st))
        }
        _ => Err(compiler.error(&ty.span, format!("'{base}' is not a known generic struct"))),
    }
}

/// `FinType` -> LLVM, the inverse direction used when a semantic type must
/// be re-lowered (inferred function signatures, boxing size computation).
pub fn fin_type_to_llvm<'ctx>(compiler: &mut Compiler<'ctx>, fin: &FinType) -> CompileResult<BasicTypeEnum<'ctx>> {
    match fin {
        FinType::Primitive(p) => Ok(primitive_llvm(compiler, *p)),
        FinType::Pointer(_) => Ok(compiler.context.ptr_type(AddressSpace::default()).into()),
        FinType::Array { elem, size } => {
            let elem_llvm = fin_type_to_llvm(compiler, elem)?;
            Ok(array_type_of(elem_llvm, *size as u32))
        }
        FinType::GenericParam(_) => Ok(compiler.context.ptr_type(AddressSpace::default()).into()),
        FinType::Any => {
            let i8_ptr = compiler.context.ptr_type(AddressSpace::default());
            let i64_ty = compiler.context.i64_type();
            Ok(compiler.context.struct_type(&[i8_ptr.into(), i64_ty.into()], false).into())
        }
        FinType::Struct { name, generic_args } => {
            if name == "Collection" {
                return Ok(compiler.context.ptr_type(AddressSpace::default()).into());
            }
            if let Some(&int_ty) = compiler.registries.enum_types.get(name) {
                return Ok(int_ty.into());
            }
            if generic_args.is_empty() {
                if let Some(&st) = compiler.registries.struct_types.get(name) {
                    return Ok(struct_reference(compiler, name, st));
                }
                return Ok(compiler.context.ptr_type(AddressSpace::default()).into());
            }
            let instantiated = crate::structs::mono::instantiate_struct(compiler, name, generic_args, &fin_ast::Span::unknown())?;
            let st = compiler.registries.struct_types[&instantiated];
            Ok(struct_reference(compiler, &instantiated, st))
        }
    }
}

/// The LLVM type a scope-bound variable's alloca actually holds. Structs
/// use reference semantics for locals/parameters/`self` (the alloca holds
/// a pointer, never the struct body inline) even though the same
/// `FinType::Struct` lowers to the struct body itself inside
/// `fin_type_to_llvm` for field-storage and `sizeof` purposes.
pub fn storage_llvm_type<'ctx>(compiler: &mut Compiler<'ctx>, fin: &FinType) -> CompileResult<BasicTypeEnum<'ctx>> {
    match fin {
        FinType::Struct { name, .. } if name != "Collection" && !compiler.registries.enum_types.contains_key(name) => {
            Ok(compiler.context.ptr_type(AddressSpace::default()).into())
        }
        other => crate::types::fin_type_to_llvm(compiler, other),
    }
}

/// Whether a type-parameter constraint requires the reflective marker
/// shape (`{data, type_id}`) rather than bare `ptr-to-byte`.
pub fn constraint_is_any(constraint: Option<&TypeConstraint>) -> bool {
    matches!(constraint, Some(TypeConstraint::Marker(ErasureMarker::Any)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fin_ast::Spanned;
    use inkwell::context::Context;
    use std::path::PathBuf;

    fn named(name: &str) -> PType {
        Spanned { node: TypeNode::Named(name.into()), span: fin_ast::Span::unknown() }
    }

    #[test]
    fn int_lowers_to_i32() {
        let context = Context::create();
        let mut compiler = Compiler::new(&context, "m", crate::options::CompileOptions::new("/p"), PathBuf::from("/p/a.fin"));
        let llvm = convert_type(&mut compiler, &named("int")).unwrap();
        assert_eq!(llvm, context.i32_type().into());
    }

    #[test]
    fn unbound_type_parameter_is_ptr_to_byte() {
        let context = Context::create();
        let mut compiler = Compiler::new(&context, "m", crate::options::CompileOptions::new("/p"), PathBuf::from("/p/a.fin"));
        compiler.scope.define_type_parameter("T", None);
        let llvm = convert_type(&mut compiler, &named("T")).unwrap();
        assert_eq!(llvm, context.ptr_type(AddressSpace::default()).into());
    }

    #[test]
    fn unknown_name_is_an_error() {
        let context = Context::create();
        let mut compiler = Compiler::new(&context, "m", crate::options::CompileOptions::new("/p"), PathBuf::from("/p/a.fin"));
        assert!(convert_type(&mut compiler, &named("Nonexistent")).is_err());
    }
}
