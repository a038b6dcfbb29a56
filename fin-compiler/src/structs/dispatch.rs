//! Static/dynamic method dispatch and interface packing.

use fin_diagnostics::CompileResult;
use inkwell::values::{BasicValue, BasicValueEnum, PointerValue};
use inkwell::AddressSpace;

use crate::compiler::Compiler;
use crate::fin_type::FinType;

/// Resolves `obj.method(args)` where `obj` has a concrete struct pointer
/// type: `<StructMangled>__<method>`, with `obj` prepended as `self`.
pub fn static_dispatch<'ctx>(
    compiler: &mut Compiler<'ctx>,
    struct_name: &str,
    method: &str,
    receiver: PointerValue<'ctx>,
    mut args: Vec<BasicValueEnum<'ctx>>,
    span: &fin_ast::Span,
) -> CompileResult<inkwell::values::CallSiteValue<'ctx>> {
    let fn_name = resolve_method_owner(compiler, struct_name, method)
        .ok_or_else(|| compiler.error(span, format!("'{struct_name}' has no method '{method}'")))?;
    let function = compiler
        .module
        .get_function(&fn_name)
        .ok_or_else(|| compiler.error(span, format!("method '{fn_name}' was never lowered")))?;

    args.insert(0, receiver.into());
    compiler
        .builder
        .build_call(function, &args.iter().map(|v| (*v).into()).collect::<Vec<_>>(), "call")
        .map_err(|e| compiler.error(span, format!("failed to emit call to '{fn_name}': {e}")))
}

/// Finds the mangled function name implementing `method` on `struct_name`,
/// walking the parent chain when the method is inherited.
fn resolve_method_owner(compiler: &Compiler, struct_name: &str, method: &str) -> Option<String> {
    let direct = format!("{struct_name}__{method}");
    if compiler.module.get_function(&direct).is_some() {
        return Some(direct);
    }
    for parent in compiler.registries.struct_parents.get(struct_name)?.clone() {
        if let Some(found) = resolve_method_owner(compiler, &parent, method) {
            return Some(found);
        }
    }
    None
}

/// Resolves `obj.method(args)` where `obj` has interface type: extract
/// `data`/`vtable`, look up `method`'s slot index, load the function
/// pointer, call it with `data` as the first argument.
pub fn dynamic_dispatch<'ctx>(
    compiler: &mut Compiler<'ctx>,
    interface_name: &str,
    method: &str,
    fat_pointer: BasicValueEnum<'ctx>,
    args: Vec<BasicValueEnum<'ctx>>,
    span: &fin_ast::Span,
) -> CompileResult<BasicValueEnum<'ctx>> {
    let methods = compiler
        .registries
        .interface_methods
        .get(interface_name)
        .cloned()
        .ok_or_else(|| compiler.error(span, format!("unknown interface '{interface_name}' at dynamic dispatch site")))?;
    let slot = methods
        .iter()
        .position(|m| m == method)
        .ok_or_else(|| compiler.error(span, format!("interface '{interface_name}' has no method '{method}'")))?;

    let fat = fat_pointer.into_struct_value();
    let data = compiler
        .builder
        .build_extract_value(fat, 0, "data")
        .map_err(|e| compiler.error(span, format!("failed to extract interface data pointer: {e}")))?;
    let vtable = compiler
        .builder
        .build_extract_value(fat, 1, "vtable")
        .map_err(|e| compiler.error(span, format!("failed to extract interface vtable pointer: {e}")))?
        .into_pointer_value();

    let i8_ptr = compiler.context.ptr_type(AddressSpace::default());
    let slot_ptr = unsafe {
        compiler
            .builder
            .build_in_bounds_gep(i8_ptr, vtable, &[compiler.context.i64_type().const_int(slot as u64, false)], "vtable_slot")
            .map_err(|e| compiler.error(span, format!("failed to index vtable: {e}")))?
    };
    let method_ptr = compiler
        .builder
        .build_load(i8_ptr, slot_ptr, "method_ptr")
        .map_err(|e| compiler.error(span, format!("failed to load vtable slot: {e}")))?
        .into_pointer_value();

    let param_types: Vec<_> = std::iter::once(i8_ptr.into()).chain(args.iter().map(|a| a.get_type().into())).collect();
    let fn_type = compiler.context.ptr_type(AddressSpace::default()).fn_type(&param_types, false);

    let mut call_args: Vec<inkwell::values::BasicMetadataValueEnum> = vec![data.into()];
    call_args.extend(args.iter().map(|a| (*a).into()));

    let call = compiler
        .builder
        .build_indirect_call(fn_type, method_ptr, &call_args, "dyn_call")
        .map_err(|e| compiler.error(span, format!("failed to emit dynamic call: {e}")))?;
    call.try_as_basic_value()
        .left()
        .ok_or_else(|| compiler.error(span, "dynamic dispatch to a void method used as a value"))
}

/// Builds (or reuses) the `(concrete_struct, interface)` vtable global and
/// constructs the fat pointer `{data, vtable}` by `insertvalue`.
pub fn pack_interface<'ctx>(
    compiler: &mut Compiler<'ctx>,
    concrete_struct: &str,
    interface_name: &str,
    data_ptr: PointerValue<'ctx>,
    span: &fin_ast::Span,
) -> CompileResult<BasicValueEnum<'ctx>> {
    let key = (concrete_struct.to_string(), interface_name.to_string());
    let vtable_global = match compiler.registries.vtables.get(&key) {
        Some(g) => *g,
        None => build_vtable(compiler, concrete_struct, interface_name, span)?,
    };

    let i8_ptr = compiler.context.ptr_type(AddressSpace::default());
    let fat_ty = compiler.context.struct_type(&[i8_ptr.into(), i8_ptr.into()], false);
    let data_cast = data_ptr;
    let vtable_ptr = vtable_global.as_pointer_value();

    let undef = fat_ty.get_undef();
    let with_data = compiler
        .builder
        .build_insert_value(undef, data_cast, 0, "with_data")
        .map_err(|e| compiler.error(span, format!("failed to pack interface data: {e}")))?;
    let packed = compiler
        .builder
        .build_insert_value(with_data, vtable_ptr, 1, "packed_iface")
        .map_err(|e| compiler.error(span, format!("failed to pack interface vtable: {e}")))?;
    Ok(packed.as_basic_value_enum())
}

fn build_vtable<'ctx>(
    compiler: &mut Compiler<'ctx>,
    concrete_struct: &str,
    interface_name: &str,
    span: &fin_ast::Span,
) -> CompileResult<inkwell::values::GlobalValue<'ctx>> {
    let methods = compiler
        .registries
        .interface_methods
        .get(interface_name)
        .cloned()
        .ok_or_else(|| compiler.error(span, format!("unknown interface '{interface_name}'")))?;

    let i8_ptr = compiler.context.ptr_type(AddressSpace::default());
    let mut slots = Vec::with_capacity(methods.len());
    for method in &methods {
        let fn_name = resolve_method_owner(compiler, concrete_struct, method)
            .ok_or_else(|| compiler.error(span, format!("'{concrete_struct}' does not implement '{method}' required by '{interface_name}'")))?;
        let function = compiler
            .module
            .get_function(&fn_name)
            .ok_or_else(|| compiler.error(span, format!("method '{fn_name}' was never lowered")))?;
        slots.push(function.as_global_value().as_pointer_value());
    }

    let array_ty = i8_ptr.array_type(slots.len() as u32);
    let global_name = format!("__vtable_{concrete_struct}_{interface_name}");
    let global = compiler.module.add_global(array_ty, None, &global_name);
    global.set_constant(true);
    global.set_initializer(&i8_ptr.const_array(&slots));

    compiler.registries.vtables.insert((concrete_struct.to_string(), interface_name.to_string()), global);
    Ok(global)
}

/// Whether `value_type` names a struct that implements `interface_name`,
/// directly or through an ancestor.
pub fn implements_interface(compiler: &Compiler, value_type: &FinType, interface_name: &str) -> bool {
    let FinType::Struct { name, .. } = value_type else { return false };
    let mut frontier = vec![name.clone()];
    let mut seen = std::collections::HashSet::new();
    while let Some(current) = frontier.pop() {
        if !seen.insert(current.clone()) {
            continue;
        }
        if current == interface_name {
            return true;
        }
        if let Some(parents) = compiler.registries.struct_parents.get(&current) {
            frontier.extend(parents.clone());
        }
    }
    false
}
