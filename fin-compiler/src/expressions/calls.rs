//! Call resolution: plain function calls, constructor calls, method calls
//! (static and interface-dynamic dispatch), `super(...)`, indexing, struct
//! literals, and `new`.

use fin_ast::{Expr, PExpr, PType};
use fin_diagnostics::CompileResult;
use inkwell::values::{BasicValueEnum, PointerValue};

use super::{lower_expr, Lowered};
use crate::compiler::Compiler;
use crate::fin_type::FinType;

pub fn lower_call<'ctx>(compiler: &mut Compiler<'ctx>, expr: &PExpr) -> CompileResult<Lowered<'ctx>> {
    let Expr::Call { callee, type_args, args } = &expr.node else {
        unreachable!("lower_call called on a non-call expression");
    };
    let span = &expr.span;

    match &callee.node {
        Expr::SuperExpr => lower_super_call(compiler, args, span),
        Expr::MemberAccess { object, member } => lower_method_call(compiler, object, member, args, span),
        Expr::Identifier(name) => lower_named_call(compiler, name, type_args, args, span),
        _ => Err(compiler.error(span, "this expression is not callable")),
    }
}

fn lower_args<'ctx>(compiler: &mut Compiler<'ctx>, args: &[PExpr]) -> CompileResult<Vec<Lowered<'ctx>>> {
    let mut lowered = Vec::with_capacity(args.len());
    for arg in args {
        lowered.push(lower_expr(compiler, arg)?);
    }
    Ok(lowered)
}

/// Coerces each argument to the callee's declared parameter type, then
/// promotes any leftover float arguments (beyond the declared parameter
/// list) to `double` for a variadic tail, matching the C calling
/// convention `malloc`/`printf`-style externs rely on.
fn coerce_args<'ctx>(compiler: &mut Compiler<'ctx>, fn_name: &str, lowered: &[Lowered<'ctx>], is_variadic: bool, declared_count: usize, span: &fin_ast::Span) -> CompileResult<Vec<BasicValueEnum<'ctx>>> {
    let mut values = Vec::with_capacity(lowered.len());
    for (i, arg) in lowered.iter().enumerate() {
        if is_variadic && i >= declared_count {
            if let BasicValueEnum::FloatValue(v) = arg.value {
                if v.get_type() == compiler.context.f32_type() {
                    let widened = compiler.builder.build_float_ext(v, compiler.context.f64_type(), "varargs_promote").map_err(|e| compiler.error(span, e.to_string()))?;
                    values.push(widened.into());
                    continue;
                }
            }
            values.push(arg.value);
            continue;
        }
        values.push(crate::expressions::boxing::coerce_for_param(compiler, arg, fn_name, i, span)?);
    }
    Ok(values)
}

fn lower_named_call<'ctx>(compiler: &mut Compiler<'ctx>, name: &str, type_args: &[PType], args: &[PExpr], span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let mangled = compiler.mangled(name);
    let lowered_args = lower_args(compiler, args)?;

    // Generic function template: resolve/instantiate before anything else.
    if compiler.registries.function_templates.contains_key(&mangled) || compiler.registries.function_templates.contains_key(name) {
        let template_key = if compiler.registries.function_templates.contains_key(&mangled) { mangled.clone() } else { name.to_string() };
        let mut fin_args = Vec::with_capacity(type_args.len());
        for t in type_args {
            fin_args.push(crate::types::ast_to_fin_type(compiler, t)?);
        }
        if fin_args.is_empty() {
            fin_args = infer_template_args(compiler, &template_key, &lowered_args)?;
        }
        let fn_name = crate::functions::mono::instantiate_function(compiler, &template_key, &fin_args, span)?;
        return call_resolved(compiler, &fn_name, lowered_args, span);
    }

    if compiler.module.get_function(&mangled).is_some() {
        return call_resolved(compiler, &mangled, lowered_args, span);
    }
    if compiler.mangler.is_external(name) && compiler.module.get_function(name).is_some() {
        return call_resolved(compiler, name, lowered_args, span);
    }

    // Generic struct constructor (`Vector<int>(...)`), instantiated on use.
    if compiler.registries.struct_templates.contains_key(&mangled) && !type_args.is_empty() {
        let mut fin_args = Vec::with_capacity(type_args.len());
        for t in type_args {
            fin_args.push(crate::types::ast_to_fin_type(compiler, t)?);
        }
        let instantiated = crate::structs::mono::instantiate_struct(compiler, &mangled, &fin_args, span)?;
        let ctor_name = format!("{instantiated}__init");
        return call_resolved(compiler, &ctor_name, lowered_args, span);
    }

    let ctor_name = format!("{mangled}__init");
    if compiler.module.get_function(&ctor_name).is_some() {
        return call_resolved(compiler, &ctor_name, lowered_args, span);
    }

    // Imported function: `import { dot } from "./math.fin";` installs a
    // type alias from the short name to the defining module's mangled
    // name, the same mechanism struct imports use.
    if let Some(aliased) = compiler.scope.resolve_type_alias(name).map(str::to_string) {
        if compiler.module.get_function(&aliased).is_some() {
            return call_resolved(compiler, &aliased, lowered_args, span);
        }
        let aliased_ctor = format!("{aliased}__init");
        if compiler.module.get_function(&aliased_ctor).is_some() {
            return call_resolved(compiler, &aliased_ctor, lowered_args, span);
        }
    }

    Err(compiler.error(span, format!("unknown function or constructor '{name}'")))
}

/// Infers each template type parameter by matching one declared parameter
/// pattern against the corresponding argument's actual `FinType`.
fn infer_template_args(compiler: &mut Compiler, template_key: &str, lowered_args: &[Lowered]) -> CompileResult<Vec<FinType>> {
    let template = compiler
        .registries
        .function_templates
        .get(template_key)
        .cloned()
        .ok_or_else(|| compiler.error(&fin_ast::Span::unknown(), format!("'{template_key}' is not a known generic function")))?;

    let mut bindings = std::collections::HashMap::new();
    for (param, arg) in template.params.iter().zip(lowered_args.iter()) {
        let pattern = crate::types::ast_to_fin_type(compiler, &param.ty)?;
        crate::types::match_generic_types(&pattern, &arg.fin_type, &mut bindings);
    }
    Ok(template.type_params.iter().map(|p| bindings.get(&p.name).cloned().unwrap_or(FinType::Any)).collect())
}

fn call_resolved<'ctx>(compiler: &mut Compiler<'ctx>, fn_name: &str, lowered_args: Vec<Lowered<'ctx>>, span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let function = compiler.module.get_function(fn_name).ok_or_else(|| compiler.error(span, format!("function '{fn_name}' was never compiled")))?;
    let declared_count = compiler.registries.function_param_types.get(fn_name).map(Vec::len).unwrap_or(lowered_args.len());
    let values = coerce_args(compiler, fn_name, &lowered_args, function.get_type().is_var_arg(), declared_count, span)?;

    let call = compiler
        .builder
        .build_call(function, &values.iter().map(|v| (*v).into()).collect::<Vec<_>>(), "call")
        .map_err(|e| compiler.error(span, format!("failed to call '{fn_name}': {e}")))?;

    let return_type = compiler.registries.function_return_types.get(fn_name).cloned().unwrap_or(FinType::void());
    let value = call.try_as_basic_value().left().unwrap_or_else(|| compiler.context.i32_type().const_zero().into());
    Ok(Lowered::new(value, return_type))
}

fn lower_method_call<'ctx>(compiler: &mut Compiler<'ctx>, object: &PExpr, member: &str, args: &[PExpr], span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    if matches!(object.node, Expr::SuperExpr) {
        return lower_super_method_call(compiler, member, args, span);
    }
    let receiver = lower_expr(compiler, object)?;
    let lowered_args = lower_args(compiler, args)?;
    let FinType::Struct { name, .. } = &receiver.fin_type else {
        return Err(compiler.error(span, "method calls require a struct or interface receiver"));
    };

    if compiler.registries.interfaces.contains(name) {
        let arg_values: Vec<BasicValueEnum> = lowered_args.iter().map(|l| l.value).collect();
        let value = crate::structs::dispatch::dynamic_dispatch(compiler, name, member, receiver.value, arg_values, span)?;
        let return_type = compiler.registries.interface_method_return_types.get(name).and_then(|m| m.get(member)).cloned().unwrap_or(FinType::void());
        return Ok(Lowered::new(value, return_type));
    }

    let receiver_ptr = receiver.value.into_pointer_value();
    let fn_name = format!("{name}__{member}");
    let declared_count = compiler.registries.function_param_types.get(&fn_name).map(|p| p.len().saturating_sub(1)).unwrap_or(lowered_args.len());
    let coerced: Vec<BasicValueEnum> = lowered_args
        .iter()
        .enumerate()
        .map(|(i, a)| crate::expressions::boxing::coerce_for_param(compiler, a, &fn_name, i + 1, span))
        .collect::<CompileResult<Vec<_>>>()?;
    let _ = declared_count;

    let call = crate::structs::dispatch::static_dispatch(compiler, name, member, receiver_ptr, coerced, span)?;
    let return_type = compiler.registries.function_return_types.get(&fn_name).cloned().unwrap_or(FinType::void());
    let value = call.try_as_basic_value().left().unwrap_or_else(|| compiler.context.i32_type().const_zero().into());
    Ok(Lowered::new(value, return_type))
}

/// `super(args)`: calls the parent's constructor, then copies the
/// resulting value field-for-field into the parent-typed portion of
/// `self` (field flattening makes this a straight slice copy).
fn lower_super_call<'ctx>(compiler: &mut Compiler<'ctx>, args: &[PExpr], span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let current = compiler.current_struct.clone().ok_or_else(|| compiler.error(span, "'super(...)' used outside of a struct"))?;
    let parent = compiler
        .registries
        .struct_parents
        .get(&current)
        .and_then(|p| p.first())
        .cloned()
        .ok_or_else(|| compiler.error(span, format!("'{current}' has no parent to call 'super' on")))?;

    let ctor_name = format!("{parent}__init");
    let lowered_args = lower_args(compiler, args)?;
    let parent_result = call_resolved(compiler, &ctor_name, lowered_args, span)?;

    if compiler.scope.resolve("self").is_none() {
        return Err(compiler.error(span, "'super(...)' used outside of a method"));
    }
    let self_lowered = crate::expressions::load_variable(compiler, "self", span)?;
    let parent_field_count = compiler.registries.total_field_count(&parent);
    let self_ptr = self_lowered.value.into_pointer_value();
    let parent_ptr = parent_result.value.into_pointer_value();
    let parent_llvm_ty = *compiler.registries.struct_types.get(&parent).ok_or_else(|| compiler.error(span, format!("'{parent}' has no lowered shape")))?;

    for i in 0..parent_field_count {
        let src = compiler.builder.build_struct_gep(parent_llvm_ty, parent_ptr, i, "super_src").map_err(|e| compiler.error(span, e.to_string()))?;
        let dst = compiler.builder.build_struct_gep(parent_llvm_ty, self_ptr, i, "super_dst").map_err(|e| compiler.error(span, e.to_string()))?;
        let field_ty = parent_llvm_ty.get_field_type_at_index(i).ok_or_else(|| compiler.error(span, "parent field index out of range"))?;
        let value = compiler.builder.build_load(field_ty, src, "super_field").map_err(|e| compiler.error(span, e.to_string()))?;
        compiler.builder.build_store(dst, value).map_err(|e| compiler.error(span, e.to_string()))?;
    }

    Ok(self_lowered)
}

fn lower_super_method_call<'ctx>(compiler: &mut Compiler<'ctx>, member: &str, args: &[PExpr], span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let current = compiler.current_struct.clone().ok_or_else(|| compiler.error(span, "'super.*' used outside of a struct"))?;
    let parent = compiler
        .registries
        .struct_parents
        .get(&current)
        .and_then(|p| p.first())
        .cloned()
        .ok_or_else(|| compiler.error(span, format!("'{current}' has no parent")))?;
    let fn_name = format!("{parent}__{member}");
    if compiler.scope.resolve("self").is_none() {
        return Err(compiler.error(span, "'super.*' used outside of a method"));
    }
    let self_lowered = crate::expressions::load_variable(compiler, "self", span)?;
    let lowered_args = lower_args(compiler, args)?;
    let mut values = vec![self_lowered.value];
    values.extend(lowered_args.iter().map(|l| l.value));
    call_resolved_with_values(compiler, &fn_name, values, span)
}

fn call_resolved_with_values<'ctx>(compiler: &mut Compiler<'ctx>, fn_name: &str, values: Vec<BasicValueEnum<'ctx>>, span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let function = compiler.module.get_function(fn_name).ok_or_else(|| compiler.error(span, format!("function '{fn_name}' was never compiled")))?;
    let call = compiler
        .builder
        .build_call(function, &values.iter().map(|v| (*v).into()).collect::<Vec<_>>(), "call")
        .map_err(|e| compiler.error(span, format!("failed to call '{fn_name}': {e}")))?;
    let return_type = compiler.registries.function_return_types.get(fn_name).cloned().unwrap_or(FinType::void());
    let value = call.try_as_basic_value().left().unwrap_or_else(|| compiler.context.i32_type().const_zero().into());
    Ok(Lowered::new(value, return_type))
}

/// `obj[index]` as an r-value: loads through the l-value pointer produced
/// by `lower_index_lvalue`.
pub fn lower_index<'ctx>(compiler: &mut Compiler<'ctx>, object: &PExpr, index: &PExpr, span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let (ptr, elem_type) = lower_index_lvalue(compiler, object, index, span)?;
    let llvm_ty = crate::types::fin_type_to_llvm(compiler, &elem_type)?;
    let loaded = compiler.builder.build_load(llvm_ty, ptr, "index_load").map_err(|e| compiler.error(span, e.to_string()))?;
    Ok(Lowered::new(loaded, elem_type))
}

/// Resolves the element pointer for `obj[index]`. Static arrays with a
/// literal index are bounds-checked at compile time; everything else
/// (collections, pointer arithmetic) gets a runtime `index < length`
/// guard when the receiver exposes a length, and raw pointer arithmetic
/// otherwise.
pub fn lower_index_lvalue<'ctx>(compiler: &mut Compiler<'ctx>, object: &PExpr, index: &PExpr, span: &fin_ast::Span) -> CompileResult<(PointerValue<'ctx>, FinType)> {
    if let FinType::Array { elem, size } = crate::types::get_arg_fin_type(compiler, object)? {
        return lower_static_array_index(compiler, object, index, *elem, size, span);
    }

    let receiver = lower_expr(compiler, object)?;
    let index_val = lower_expr(compiler, index)?;
    let index_int = index_val.value.into_int_value();

    let FinType::Pointer(elem_type) = receiver.fin_type.clone() else {
        if receiver.fin_type.is_collection() {
            return lower_collection_index(compiler, &receiver, index_int, span);
        }
        return Err(compiler.error(span, "this expression is not indexable"));
    };

    let elem_llvm = crate::types::fin_type_to_llvm(compiler, &elem_type)?;
    let ptr = receiver.value.into_pointer_value();
    let elem_ptr = unsafe { compiler.builder.build_in_bounds_gep(elem_llvm, ptr, &[index_int], "elem_ptr").map_err(|e| compiler.error(span, e.to_string()))? };
    Ok((elem_ptr, *elem_type))
}

/// Indexes a fixed-size `[T; N]` local/field directly off its own storage
/// pointer (never the loaded aggregate, since indexing a value loaded by
/// `build_load` has no address to GEP from). A literal index out of
/// `[0, size)` is a compile-time error; a non-literal index gets no
/// runtime guard, matching a static array's no-bounds-check-at-runtime
/// semantics.
fn lower_static_array_index<'ctx>(compiler: &mut Compiler<'ctx>, object: &PExpr, index: &PExpr, elem: FinType, size: u64, span: &fin_ast::Span) -> CompileResult<(PointerValue<'ctx>, FinType)> {
    if let Expr::IntLiteral(i) = index.node {
        if i < 0 || i as u64 >= size {
            return Err(compiler.error(span, format!("index {i} is out of bounds for an array of length {size}")));
        }
    }
    let base_ptr = super::lvalue_pointer(compiler, object, span)?;
    let elem_llvm = crate::types::fin_type_to_llvm(compiler, &elem)?;
    let array_llvm = crate::types::array_type_of(elem_llvm, size as u32);
    let index_val = lower_expr(compiler, index)?;
    let index_int = index_val.value.into_int_value();
    let zero = compiler.context.i32_type().const_zero();
    let elem_ptr = unsafe {
        compiler
            .builder
            .build_in_bounds_gep(array_llvm, base_ptr, &[zero, index_int], "arr_elem_ptr")
            .map_err(|e| compiler.error(span, e.to_string()))?
    };
    Ok((elem_ptr, elem))
}

fn lower_collection_index<'ctx>(compiler: &mut Compiler<'ctx>, receiver: &Lowered<'ctx>, index: inkwell::values::IntValue<'ctx>, span: &fin_ast::Span) -> CompileResult<(PointerValue<'ctx>, FinType)> {
    let FinType::Struct { generic_args, .. } = &receiver.fin_type else {
        return Err(compiler.error(span, "not a collection"));
    };
    let elem_type = generic_args.first().cloned().unwrap_or(FinType::Any);
    let i8_ptr = compiler.context.ptr_type(inkwell::AddressSpace::default());
    let i64_ty = compiler.context.i64_type();
    let slice_ty = compiler.context.struct_type(&[i8_ptr.into(), i64_ty.into(), i64_ty.into()], false);
    let ptr = receiver.value.into_pointer_value();

    let data_field = compiler.builder.build_struct_gep(slice_ty, ptr, 0, "coll_data").map_err(|e| compiler.error(span, e.to_string()))?;
    let data = compiler.builder.build_load(i8_ptr, data_field, "coll_data_val").map_err(|e| compiler.error(span, e.to_string()))?.into_pointer_value();
    let len_field = compiler.builder.build_struct_gep(slice_ty, ptr, 1, "coll_len").map_err(|e| compiler.error(span, e.to_string()))?;
    let len = compiler.builder.build_load(i64_ty, len_field, "coll_len_val").map_err(|e| compiler.error(span, e.to_string()))?.into_int_value();

    let widened_index = if index.get_type().get_bit_width() < 64 {
        compiler.builder.build_int_s_extend(index, i64_ty, "index_ext").map_err(|e| compiler.error(span, e.to_string()))?
    } else {
        index
    };
    super::safety::check_bounds(compiler, widened_index, len, span)?;

    let elem_llvm = crate::types::fin_type_to_llvm(compiler, &elem_type)?;
    let elem_ptr = unsafe { compiler.builder.build_in_bounds_gep(elem_llvm, data, &[widened_index], "coll_elem_ptr").map_err(|e| compiler.error(span, e.to_string()))? };
    Ok((elem_ptr, elem_type))
}

/// `StructName { field: value, ... }`: allocates the struct on the stack,
/// stores each field's value (or its declared default when omitted), and
/// yields a pointer to it — the same reference-semantics shape a
/// constructor call produces.
pub fn lower_struct_instantiation<'ctx>(compiler: &mut Compiler<'ctx>, name: &str, type_args: &[PType], fields: &[(String, PExpr)], span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let mangled = compiler.mangled(name);
    let resolved = if !type_args.is_empty() && compiler.registries.struct_templates.contains_key(&mangled) {
        let mut fin_args = Vec::with_capacity(type_args.len());
        for t in type_args {
            fin_args.push(crate::types::ast_to_fin_type(compiler, t)?);
        }
        crate::structs::mono::instantiate_struct(compiler, &mangled, &fin_args, span)?
    } else {
        mangled
    };

    let struct_ty = *compiler.registries.struct_types.get(&resolved).ok_or_else(|| compiler.error(span, format!("'{name}' is not a known struct")))?;
    let indices = compiler.registries.struct_field_indices.get(&resolved).cloned().unwrap_or_default();
    let meta = compiler.registries.struct_field_meta.get(&resolved).cloned().unwrap_or_default();

    let alloca = compiler.builder.build_alloca(struct_ty, "struct_lit").map_err(|e| compiler.error(span, e.to_string()))?;

    for (field_name, index) in &indices {
        let provided = fields.iter().find(|(n, _)| n == field_name);
        let gep = compiler.builder.build_struct_gep(struct_ty, alloca, *index, field_name).map_err(|e| compiler.error(span, e.to_string()))?;
        if let Some((_, expr)) = provided {
            let lowered = lower_expr(compiler, expr)?;
            compiler.builder.build_store(gep, lowered.value).map_err(|e| compiler.error(span, e.to_string()))?;
        } else if let Some(default_expr) = meta.get(field_name).and_then(|m| m.default.as_ref()) {
            let lowered = lower_expr(compiler, default_expr)?;
            compiler.builder.build_store(gep, lowered.value).map_err(|e| compiler.error(span, e.to_string()))?;
        } else {
            return Err(compiler.error(span, format!("missing field '{field_name}' in struct literal for '{name}'")));
        }
    }

    Ok(Lowered::new(alloca.into(), FinType::Struct { name: resolved, generic_args: vec![] }))
}

/// `new expr`: evaluates `expr` (expected to be a constructor call or
/// struct literal yielding a stack pointer), then promotes the result to
/// a heap allocation the caller owns and must `delete`.
pub fn lower_new<'ctx>(compiler: &mut Compiler<'ctx>, inner: &PExpr, span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let stack_value = lower_expr(compiler, inner)?;
    let FinType::Struct { .. } = &stack_value.fin_type else {
        return Err(compiler.error(span, "'new' requires a struct constructor or struct literal"));
    };
    let llvm_ty = crate::types::fin_type_to_llvm(compiler, &stack_value.fin_type)?;
    let size = crate::expressions::boxing::size_of_type(compiler, llvm_ty);
    let call = compiler.builder.build_call(compiler.malloc_fn(), &[size.into()], "new_malloc").map_err(|e| compiler.error(span, e.to_string()))?;
    let heap_ptr = call.try_as_basic_value().left().ok_or_else(|| compiler.error(span, "malloc did not return a value"))?.into_pointer_value();

    let loaded = compiler.builder.build_load(llvm_ty, stack_value.value.into_pointer_value(), "new_value").map_err(|e| compiler.error(span, e.to_string()))?;
    compiler.builder.build_store(heap_ptr, loaded).map_err(|e| compiler.error(span, e.to_string()))?;
    Ok(Lowered::new(heap_ptr.into(), stack_value.fin_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_args_widens_float_varargs_to_double() {
        let context = inkwell::context::Context::create();
        let mut compiler = crate::compiler::Compiler::new(&context, "m", crate::options::CompileOptions::new("/p"), std::path::PathBuf::from("/p/a.fin"));
        let func = compiler.module.add_function("f", context.void_type().fn_type(&[], false), None);
        let block = context.append_basic_block(func, "entry");
        compiler.builder.position_at_end(block);
        let arg = Lowered::new(context.f32_type().const_float(1.5).into(), FinType::Primitive(crate::fin_type::Primitive::Float));
        let result = coerce_args(&mut compiler, "printf", &[arg], true, 0, &fin_ast::Span::unknown()).unwrap();
        assert!(matches!(result[0], BasicValueEnum::FloatValue(v) if v.get_type() == context.f64_type()));
    }
}
