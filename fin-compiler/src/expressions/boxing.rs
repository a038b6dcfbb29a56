//! Boxing/unboxing, the `Any` pack/unpack protocol, `typeof`/`sizeof`, and
//! the `std_conv` conversion matrix used by explicit casts, argument
//! coercion, and operator-overload argument passing.

use fin_diagnostics::CompileResult;
use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicValueEnum, IntValue, PointerValue};
use inkwell::AddressSpace;

use super::Lowered;
use crate::compiler::Compiler;
use crate::fin_type::FinType;

/// `sizeof(T)`: the ABI size when the type is sized, otherwise the
/// `gep-of-null` idiom (index one past a null pointer of the type and
/// `ptrtoint` the result).
pub fn size_of_type<'ctx>(compiler: &mut Compiler<'ctx>, llvm_ty: BasicTypeEnum<'ctx>) -> IntValue<'ctx> {
    if let Some(size) = llvm_ty.size_of() {
        return size;
    }
    let ptr_ty = compiler.context.ptr_type(AddressSpace::default());
    let null = ptr_ty.const_null();
    let one_past = unsafe { compiler.builder.build_gep(llvm_ty, null, &[compiler.context.i32_type().const_int(1, false)], "size_gep").expect("gep-of-null never fails to build") };
    compiler.builder.build_ptr_to_int(one_past, compiler.context.i64_type(), "size_of").expect("ptrtoint never fails to build")
}

/// Heap-boxes a concrete value into a `ptr-to-byte`: `malloc` + bitcast +
/// store for value types, a plain bitcast for strings and pointers (they
/// are already pointers to bytes).
pub fn box_value<'ctx>(compiler: &mut Compiler<'ctx>, lowered: &Lowered<'ctx>, span: &fin_ast::Span) -> CompileResult<PointerValue<'ctx>> {
    if let BasicValueEnum::PointerValue(p) = lowered.value {
        return Ok(p);
    }
    let llvm_ty = crate::types::fin_type_to_llvm(compiler, &lowered.fin_type)?;
    let size = size_of_type(compiler, llvm_ty);
    let call = compiler
        .builder
        .build_call(compiler.malloc_fn(), &[size.into()], "box_malloc")
        .map_err(|e| compiler.error(span, format!("failed to malloc for boxing: {e}")))?;
    let raw = call.try_as_basic_value().left().ok_or_else(|| compiler.error(span, "malloc did not return a value"))?.into_pointer_value();
    compiler.builder.build_store(raw, lowered.value).map_err(|e| compiler.error(span, format!("failed to store boxed value: {e}")))?;
    Ok(raw)
}

/// Unboxes a `ptr-to-byte` into `target`: a load through the target's
/// LLVM type for value types, a plain bitcast (no-op at the LLVM level
/// once pointers are opaque) for reference-shaped targets.
pub fn unbox_value<'ctx>(compiler: &mut Compiler<'ctx>, ptr: PointerValue<'ctx>, target: &FinType, span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    if matches!(target, FinType::Pointer(_)) || matches!(target, FinType::Primitive(crate::fin_type::Primitive::String)) {
        return Ok(Lowered::new(ptr.into(), target.clone()));
    }
    let llvm_ty = crate::types::fin_type_to_llvm(compiler, target)?;
    let loaded = compiler.builder.build_load(llvm_ty, ptr, "unboxed").map_err(|e| compiler.error(span, format!("failed to unbox value: {e}")))?;
    Ok(Lowered::new(loaded, target.clone()))
}

/// Packs a concrete value into the `Any` shape: `{data: ptr, type_id: i64}`.
pub fn pack_any<'ctx>(compiler: &mut Compiler<'ctx>, lowered: &Lowered<'ctx>, span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let data = box_value(compiler, lowered, span)?;
    let type_id = compiler.context.i64_type().const_int(lowered.fin_type.type_id(), false);
    let i8_ptr = compiler.context.ptr_type(AddressSpace::default());
    let any_ty = compiler.context.struct_type(&[i8_ptr.into(), compiler.context.i64_type().into()], false);
    let undef = any_ty.get_undef();
    let with_data = compiler.builder.build_insert_value(undef, data, 0, "any_data").map_err(|e| compiler.error(span, format!("failed to pack Any: {e}")))?;
    let packed = compiler.builder.build_insert_value(with_data, type_id, 1, "any_boxed").map_err(|e| compiler.error(span, format!("failed to pack Any: {e}")))?;
    Ok(Lowered::new(packed.as_basic_value_enum(), FinType::Any))
}

/// `typeof(expr)`: the runtime `type_id` field when `expr` is statically
/// `any`, otherwise the compile-time type ID of the inferred `FinType`.
pub fn lower_typeof<'ctx>(compiler: &mut Compiler<'ctx>, inner: &fin_ast::PExpr, span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let lowered = super::lower_expr(compiler, inner)?;
    if matches!(lowered.fin_type, FinType::Any) {
        let struct_val = lowered.value.into_struct_value();
        let type_id = compiler.builder.build_extract_value(struct_val, 1, "type_id").map_err(|e| compiler.error(span, format!("failed to extract type_id: {e}")))?;
        return Ok(Lowered::new(type_id, crate::fin_type::FinType::Primitive(crate::fin_type::Primitive::Long)));
    }
    let id = compiler.context.i64_type().const_int(lowered.fin_type.type_id(), false);
    Ok(Lowered::new(id.into(), crate::fin_type::FinType::Primitive(crate::fin_type::Primitive::Long)))
}

/// `std_conv<Target>(expr)`: the full conversion matrix from spec'd
/// semantics — identity, box/unbox at the `ptr-to-byte` boundary, struct
/// upcast through the inheritance registry, pointer-to-collection-slice,
/// numeric widening/narrowing, and pointer/integer reinterpretation.
pub fn std_conv<'ctx>(compiler: &mut Compiler<'ctx>, lowered: &Lowered<'ctx>, target: &FinType, span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    if &lowered.fin_type == target {
        return Ok(lowered.clone());
    }

    if matches!(target, FinType::Any) {
        return pack_any(compiler, lowered, span);
    }
    if matches!(lowered.fin_type, FinType::Any) {
        let struct_val = lowered.value.into_struct_value();
        let data = compiler.builder.build_extract_value(struct_val, 0, "any_data").map_err(|e| compiler.error(span, format!("failed to unpack Any: {e}")))?;
        return unbox_value(compiler, data.into_pointer_value(), target, span);
    }

    if let (FinType::Struct { name: from_name, .. }, FinType::Struct { name: to_name, .. }) = (&lowered.fin_type, target) {
        if from_name != "Collection" && to_name != "Collection" && crate::structs::dispatch::implements_interface(compiler, &lowered.fin_type, to_name) {
            return Ok(Lowered::new(lowered.value, target.clone()));
        }
        if to_name == "Collection" {
            if let BasicValueEnum::PointerValue(p) = lowered.value {
                return build_collection_slice(compiler, p, target, span);
            }
        }
    }

    match (lowered.value, target) {
        (BasicValueEnum::IntValue(v), FinType::Primitive(p)) if p.name() != "float" && p.name() != "double" && p.name() != "bool" => {
            let target_ty = compiler.context.custom_width_int_type(p.bit_width());
            let converted = if v.get_type().get_bit_width() < target_ty.get_bit_width() {
                compiler.builder.build_int_s_extend(v, target_ty, "sext")
            } else if v.get_type().get_bit_width() > target_ty.get_bit_width() {
                compiler.builder.build_int_truncate(v, target_ty, "trunc")
            } else {
                Ok(v)
            };
            Ok(Lowered::new(converted.map_err(|e| compiler.error(span, e.to_string()))?.into(), target.clone()))
        }
        (BasicValueEnum::IntValue(v), FinType::Primitive(crate::fin_type::Primitive::Float)) => {
            Ok(Lowered::new(compiler.builder.build_signed_int_to_float(v, compiler.context.f32_type(), "sitofp").map_err(|e| compiler.error(span, e.to_string()))?.into(), target.clone()))
        }
        (BasicValueEnum::IntValue(v), FinType::Primitive(crate::fin_type::Primitive::Double)) => {
            Ok(Lowered::new(compiler.builder.build_signed_int_to_float(v, compiler.context.f64_type(), "sitofp").map_err(|e| compiler.error(span, e.to_string()))?.into(), target.clone()))
        }
        (BasicValueEnum::FloatValue(v), FinType::Primitive(p)) if p.name() == "int" || p.name() == "long" || p.name() == "char" => {
            let target_ty = compiler.context.custom_width_int_type(p.bit_width());
            Ok(Lowered::new(compiler.builder.build_float_to_signed_int(v, target_ty, "fptosi").map_err(|e| compiler.error(span, e.to_string()))?.into(), target.clone()))
        }
        (BasicValueEnum::FloatValue(v), FinType::Primitive(crate::fin_type::Primitive::Double)) => {
            Ok(Lowered::new(compiler.builder.build_float_ext(v, compiler.context.f64_type(), "fpext").map_err(|e| compiler.error(span, e.to_string()))?.into(), target.clone()))
        }
        (BasicValueEnum::FloatValue(v), FinType::Primitive(crate::fin_type::Primitive::Float)) => {
            Ok(Lowered::new(compiler.builder.build_float_trunc(v, compiler.context.f32_type(), "fptrunc").map_err(|e| compiler.error(span, e.to_string()))?.into(), target.clone()))
        }
        (BasicValueEnum::IntValue(v), FinType::Pointer(_)) => {
            Ok(Lowered::new(compiler.builder.build_int_to_ptr(v, compiler.context.ptr_type(AddressSpace::default()), "inttoptr").map_err(|e| compiler.error(span, e.to_string()))?.into(), target.clone()))
        }
        (BasicValueEnum::PointerValue(v), FinType::Primitive(p)) if p.name() == "int" || p.name() == "long" => {
            let target_ty = compiler.context.custom_width_int_type(p.bit_width());
            Ok(Lowered::new(compiler.builder.build_ptr_to_int(v, target_ty, "ptrtoint").map_err(|e| compiler.error(span, e.to_string()))?.into(), target.clone()))
        }
        (BasicValueEnum::PointerValue(v), FinType::Pointer(_)) => Ok(Lowered::new(v.into(), target.clone())),
        (BasicValueEnum::PointerValue(v), FinType::Struct { .. }) => Ok(Lowered::new(v.into(), target.clone())),
        _ => Err(compiler.error(span, format!("no conversion from '{}' to '{}'", lowered.fin_type, target))),
    }
}

/// Builds `{ptr, 0}`, the literal-struct shape `Collection<T>` reduces to
/// when constructed directly from a raw pointer (e.g. a cast from a
/// `malloc`'d buffer).
fn build_collection_slice<'ctx>(compiler: &mut Compiler<'ctx>, data: PointerValue<'ctx>, target: &FinType, span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let i8_ptr = compiler.context.ptr_type(AddressSpace::default());
    let i64_ty = compiler.context.i64_type();
    let slice_ty = compiler.context.struct_type(&[i8_ptr.into(), i64_ty.into(), i64_ty.into()], false);
    let alloca = compiler.builder.build_alloca(slice_ty, "collection_slice").map_err(|e| compiler.error(span, e.to_string()))?;
    let data_field = compiler.builder.build_struct_gep(slice_ty, alloca, 0, "data_field").map_err(|e| compiler.error(span, e.to_string()))?;
    compiler.builder.build_store(data_field, data).map_err(|e| compiler.error(span, e.to_string()))?;
    let len_field = compiler.builder.build_struct_gep(slice_ty, alloca, 1, "len_field").map_err(|e| compiler.error(span, e.to_string()))?;
    compiler.builder.build_store(len_field, i64_ty.const_zero()).map_err(|e| compiler.error(span, e.to_string()))?;
    let cap_field = compiler.builder.build_struct_gep(slice_ty, alloca, 2, "cap_field").map_err(|e| compiler.error(span, e.to_string()))?;
    compiler.builder.build_store(cap_field, i64_ty.const_zero()).map_err(|e| compiler.error(span, e.to_string()))?;
    let loaded = compiler.builder.build_load(slice_ty, alloca, "collection_slice_val").map_err(|e| compiler.error(span, e.to_string()))?;
    Ok(Lowered::new(loaded, target.clone()))
}

/// Coerces `arg` to the declared type of parameter `index` of `fn_name`
/// (any-packing, interface-packing, or boxing first, falling back to
/// `std_conv` for numeric/pointer coercion). Used for call-site arguments
/// and operator-overload right-hand operands alike.
pub fn coerce_for_param<'ctx>(compiler: &mut Compiler<'ctx>, arg: &Lowered<'ctx>, fn_name: &str, index: usize, span: &fin_ast::Span) -> CompileResult<BasicValueEnum<'ctx>> {
    let Some(param_type) = compiler.registries.function_param_types.get(fn_name).and_then(|p| p.get(index)).cloned() else {
        return Ok(arg.value);
    };
    if param_type == arg.fin_type {
        return Ok(arg.value);
    }
    Ok(std_conv(compiler, arg, &param_type, span)?.value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_types_are_returned_unchanged() {
        let context = inkwell::context::Context::create();
        let mut compiler = crate::compiler::Compiler::new(&context, "m", crate::options::CompileOptions::new("/p"), std::path::PathBuf::from("/p/a.fin"));
        let v = context.i32_type().const_int(4, false);
        let lowered = Lowered::new(v.into(), FinType::int());
        let result = std_conv(&mut compiler, &lowered, &FinType::int(), &fin_ast::Span::unknown()).unwrap();
        assert_eq!(result.fin_type, FinType::int());
    }
}
