//! `compile_member_access`: resolves `object.member` to either an
//! L-value (pointer to the field) or an R-value (loaded field), handling
//! `super.*`, constraint-bounded generic fields, `.length`, and ordinary
//! field access with auto-deref and generic-field unboxing.

use fin_ast::{Expr, PExpr};
use fin_diagnostics::CompileResult;
use inkwell::values::{BasicValueEnum, PointerValue};
use inkwell::AddressSpace;

use crate::compiler::Compiler;
use crate::fin_type::FinType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    LValue,
    RValue,
}

pub struct AccessResult<'ctx> {
    pub lvalue: Option<PointerValue<'ctx>>,
    pub value: BasicValueEnum<'ctx>,
    pub fin_type: FinType,
}

pub fn compile_member_access<'ctx>(
    compiler: &mut Compiler<'ctx>,
    object: &PExpr,
    member: &str,
    mode: AccessMode,
    span: &fin_ast::Span,
) -> CompileResult<AccessResult<'ctx>> {
    if matches!(object.node, Expr::SuperExpr) {
        return super_member_access(compiler, member, mode, span);
    }

    let receiver = crate::expressions::lower_expr(compiler, object)?;

    if member == "length" {
        return length_access(compiler, &receiver, span);
    }

    let (struct_name, mut base_ptr) = as_struct_pointer(compiler, &receiver, span)?;

    // Constraint-bounded generic receiver: the erased ptr-to-byte is
    // reinterpreted as ptr-to-SomeStruct so field lookup proceeds as
    // normal below (struct_name already carries the bound struct).
    let _ = &mut base_ptr;

    field_access(compiler, &struct_name, base_ptr, &receiver.fin_type, member, mode, span)
}

fn super_member_access<'ctx>(
    compiler: &mut Compiler<'ctx>,
    member: &str,
    mode: AccessMode,
    span: &fin_ast::Span,
) -> CompileResult<AccessResult<'ctx>> {
    let current_struct = compiler
        .current_struct
        .clone()
        .ok_or_else(|| compiler.error(span, "'super' used outside of a method"))?;
    if compiler.scope.resolve("self").is_none() {
        return Err(compiler.error(span, "'super' used outside of an instance method"));
    }
    let self_lowered = crate::expressions::load_variable(compiler, "self", span)?;
    let self_ptr = self_lowered.value.into_pointer_value();

    if compiler.registries.struct_field_indices.get(&current_struct).is_some_and(|f| f.contains_key(member)) {
        // Inherited field: fields are flattened, so plain field access on
        // `self` already uses the correct (child) layout.
        return field_access(compiler, &current_struct, self_ptr, &self_lowered.fin_type, member, mode, span);
    }

    // Parent method or `super.__init`: produce the mangled parent
    // function pointer as a value rather than a loaded field.
    let parents = compiler.registries.struct_parents.get(&current_struct).cloned().unwrap_or_default();
    let target = if member == "__init" { "__init" } else { member };
    for parent in parents {
        let candidate = format!("{parent}__{target}");
        if let Some(function) = compiler.module.get_function(&candidate) {
            return Ok(AccessResult {
                lvalue: None,
                value: function.as_global_value().as_pointer_value().into(),
                fin_type: FinType::void().pointer_to(),
            });
        }
    }
    Err(compiler.error(span, format!("no parent of '{current_struct}' defines '{member}'")))
}

fn length_access<'ctx>(compiler: &mut Compiler<'ctx>, receiver: &crate::expressions::Lowered<'ctx>, span: &fin_ast::Span) -> CompileResult<AccessResult<'ctx>> {
    if let FinType::Array { size, .. } = &receiver.fin_type {
        let value = compiler.context.i64_type().const_int(*size, false);
        return Ok(AccessResult { lvalue: None, value: value.into(), fin_type: FinType::Primitive(crate::fin_type::Primitive::Long) });
    }
    if let FinType::Struct { name, .. } = &receiver.fin_type {
        if name == "Collection" {
            let ptr = receiver.value.into_pointer_value();
            let i64_ty = compiler.context.i64_type();
            let len_ptr = compiler
                .builder
                .build_struct_gep(collection_layout(compiler), ptr, 1, "len_ptr")
                .map_err(|e| compiler.error(span, format!("failed to address Collection.length: {e}")))?;
            let value = compiler
                .builder
                .build_load(i64_ty, len_ptr, "len")
                .map_err(|e| compiler.error(span, format!("failed to load Collection.length: {e}")))?;
            return Ok(AccessResult { lvalue: Some(len_ptr), value, fin_type: FinType::Primitive(crate::fin_type::Primitive::Long) });
        }
    }
    Err(compiler.error(span, "'.length' is only defined for collections and static arrays"))
}

fn collection_layout<'ctx>(compiler: &Compiler<'ctx>) -> inkwell::types::StructType<'ctx> {
    let i8_ptr = compiler.context.ptr_type(AddressSpace::default());
    let i64_ty = compiler.context.i64_type();
    compiler.context.struct_type(&[i8_ptr.into(), i64_ty.into(), i64_ty.into()], false)
}

/// `coll.length` as a bare `IntValue`, for driving a `foreach` loop bound.
pub fn collection_length<'ctx>(compiler: &mut Compiler<'ctx>, receiver: &crate::expressions::Lowered<'ctx>, span: &fin_ast::Span) -> CompileResult<inkwell::values::IntValue<'ctx>> {
    let access = length_access(compiler, receiver, span)?;
    Ok(access.value.into_int_value())
}

/// Loads `coll[index]` for a known-in-bounds `index` (the caller already
/// drove the loop off `.length`, so no further bounds check is emitted).
pub fn collection_index_load<'ctx>(
    compiler: &mut Compiler<'ctx>,
    receiver: &crate::expressions::Lowered<'ctx>,
    index: inkwell::values::IntValue<'ctx>,
    span: &fin_ast::Span,
) -> CompileResult<(BasicValueEnum<'ctx>, FinType)> {
    if let FinType::Array { elem, size } = &receiver.fin_type {
        let elem_type = elem.as_ref().clone();
        let elem_llvm = crate::types::fin_type_to_llvm(compiler, &elem_type)?;
        let array_llvm = crate::types::array_type_of(elem_llvm, *size as u32);
        let base_ptr = receiver.value.into_pointer_value();
        let zero = compiler.context.i32_type().const_zero();
        let elem_ptr = unsafe {
            compiler
                .builder
                .build_in_bounds_gep(array_llvm, base_ptr, &[zero, index], "foreach_arr_elem_ptr")
                .map_err(|e| compiler.error(span, e.to_string()))?
        };
        let loaded = compiler.builder.build_load(elem_llvm, elem_ptr, "foreach_elem").map_err(|e| compiler.error(span, e.to_string()))?;
        return Ok((loaded, elem_type));
    }

    let FinType::Struct { generic_args, .. } = &receiver.fin_type else {
        return Err(compiler.error(span, "'foreach' requires a collection or static array"));
    };
    let elem_type = generic_args.first().cloned().unwrap_or(FinType::Any);
    let ptr = receiver.value.into_pointer_value();
    let data_ptr = compiler
        .builder
        .build_struct_gep(collection_layout(compiler), ptr, 0, "data_ptr")
        .map_err(|e| compiler.error(span, format!("failed to address Collection.data: {e}")))?;
    let i8_ptr = compiler.context.ptr_type(AddressSpace::default());
    let data = compiler
        .builder
        .build_load(i8_ptr, data_ptr, "data")
        .map_err(|e| compiler.error(span, format!("failed to load Collection.data: {e}")))?
        .into_pointer_value();

    let elem_llvm = crate::types::fin_type_to_llvm(compiler, &elem_type)?;
    let elem_ptr = unsafe {
        compiler
            .builder
            .build_in_bounds_gep(elem_llvm, data, &[index], "foreach_elem_ptr")
            .map_err(|e| compiler.error(span, e.to_string()))?
    };
    let loaded = compiler.builder.build_load(elem_llvm, elem_ptr, "foreach_elem").map_err(|e| compiler.error(span, e.to_string()))?;
    Ok((loaded, elem_type))
}

/// A `FinType::Struct` value is always a single pointer to the struct body
/// (see `types::storage_llvm_type`) — locals, parameters, and `self` never
/// hold a pointer-to-pointer, so no auto-dereference is needed here.
fn as_struct_pointer<'ctx>(compiler: &mut Compiler<'ctx>, receiver: &crate::expressions::Lowered<'ctx>, span: &fin_ast::Span) -> CompileResult<(String, PointerValue<'ctx>)> {
    match &receiver.fin_type {
        FinType::Struct { name, .. } => Ok((name.clone(), receiver.value.into_pointer_value())),
        FinType::GenericParam(_) => Err(compiler.error(span, "member access on an unconstrained generic value")),
        _ => Err(compiler.error(span, "member access on a non-struct value")),
    }
}

fn field_access<'ctx>(
    compiler: &mut Compiler<'ctx>,
    struct_name: &str,
    base_ptr: PointerValue<'ctx>,
    receiver_ty: &FinType,
    member: &str,
    mode: AccessMode,
    span: &fin_ast::Span,
) -> CompileResult<AccessResult<'ctx>> {
    let index = compiler
        .registries
        .field_index(struct_name, member)
        .ok_or_else(|| compiler.error(span, format!("'{struct_name}' has no field '{member}'")))?;
    let meta = compiler.registries.struct_field_meta[struct_name][member].clone();
    let struct_ty = compiler
        .registries
        .struct_types
        .get(struct_name)
        .copied()
        .ok_or_else(|| compiler.error(span, format!("'{struct_name}' has no storage layout")))?;

    let field_ptr = compiler
        .builder
        .build_struct_gep(struct_ty, base_ptr, index, &format!("{member}_ptr"))
        .map_err(|e| compiler.error(span, format!("failed to address field '{member}': {e}")))?;

    let mut fin_type = meta.source_type.clone();
    if let FinType::Struct { generic_args, .. } = receiver_ty {
        let params = compiler.registries.struct_generic_params.get(struct_name).cloned().unwrap_or_default();
        if let Some(unboxed) = crate::structs::lowering::unbox_field_if_generic(&meta.source_type, generic_args, &params) {
            fin_type = unboxed;
        }
    }

    match mode {
        AccessMode::LValue => Ok(AccessResult { lvalue: Some(field_ptr), value: field_ptr.into(), fin_type }),
        AccessMode::RValue => {
            let llvm_ty = crate::types::fin_type_to_llvm(compiler, &fin_type)?;
            let loaded = compiler
                .builder
                .build_load(llvm_ty, field_ptr, &format!("{member}_val"))
                .map_err(|e| compiler.error(span, format!("failed to load field '{member}': {e}")))?;
            Ok(AccessResult { lvalue: Some(field_ptr), value: loaded, fin_type })
        }
    }
}
