//! Function, extern, enum, and global-variable lowering: the module-level
//! declare/compile two-pass driver, plus the shared body-compilation
//! machinery every struct method/operator/constructor/destructor (and every
//! MONO function instantiation) ultimately funnels through.

use std::collections::HashMap;

use fin_ast::{
    ConstructorDecl, DestructorDecl, EnumDecl, Expr, ExternDecl, FunctionDecl, OperatorDecl, Program, Span, TopLevel, UnaryOp, VarDecl,
};
use fin_diagnostics::CompileResult;
use inkwell::module::Linkage;
use inkwell::types::{BasicTypeEnum, FunctionType};
use inkwell::values::{BasicValueEnum, FunctionValue, PointerValue};

use crate::compiler::Compiler;
use crate::fin_type::FinType;
use crate::registry::FieldMeta;

/// Pass 0: forward-declares every top-level type and function prototype so
/// mutual recursion across declarations in the same file resolves.
pub fn declare_pass(compiler: &mut Compiler, program: &Program) -> CompileResult<()> {
    for item in &program.items {
        match &item.node {
            TopLevel::Import(decl) => crate::module_loader::process_import(compiler, decl, &item.span)?,
            TopLevel::Extern(decl) => declare_extern(compiler, decl, &item.span)?,
            TopLevel::Enum(decl) => declare_enum(compiler, decl, &item.span)?,
            TopLevel::Struct(decl) => crate::structs::declare_struct_shape(compiler, decl)?,
            TopLevel::Function(decl) => declare_function_item(compiler, decl, &item.span)?,
            TopLevel::Macro(decl) => {
                compiler.registries.macros.insert(decl.name.clone(), decl.clone());
            }
            TopLevel::Special(decl) => {
                compiler.registries.specials.insert(decl.name.clone(), decl.clone());
            }
            TopLevel::Variable(decl) => declare_global_variable(compiler, decl, &item.span)?,
        }
    }
    Ok(())
}

/// Pass 1: compiles every non-generic function and struct body. Generic
/// templates are left untouched here; they compile lazily, on first MONO
/// instantiation, through [`compile_instantiated_function`] and
/// `structs::mono::instantiate_struct`.
pub fn compile_pass(compiler: &mut Compiler, program: &Program) -> CompileResult<()> {
    for item in &program.items {
        match &item.node {
            TopLevel::Function(decl) if decl.type_params.is_empty() => compile_function_item(compiler, decl, &item.span)?,
            TopLevel::Struct(decl) if !decl.is_interface && decl.type_params.is_empty() => crate::structs::lower_struct_bodies(compiler, decl)?,
            _ => {}
        }
    }
    Ok(())
}

/// `extern fn puts(s: string): int;` — declares the LLVM prototype under
/// its bare (or `@llvm_name`-overridden) name and marks it as an external
/// so the mangler never rewrites call sites that reference it.
fn declare_extern(compiler: &mut Compiler, decl: &ExternDecl, span: &Span) -> CompileResult<()> {
    let name = crate::attributes::llvm_name_override(&decl.attributes).map(str::to_string).unwrap_or_else(|| decl.name.clone());
    compiler.mangler.register_external(&decl.name);
    if compiler.module.get_function(&name).is_some() {
        return Ok(());
    }

    let mut param_fin = Vec::with_capacity(decl.params.len());
    let mut param_llvm = Vec::with_capacity(decl.params.len());
    for p in &decl.params {
        let fin = crate::types::ast_to_fin_type(compiler, &p.ty)?;
        let llvm = crate::types::storage_llvm_type(compiler, &fin)?;
        param_fin.push(fin);
        param_llvm.push(llvm);
    }
    let return_fin = match &decl.return_type {
        Some(t) => crate::types::ast_to_fin_type(compiler, t)?,
        None => FinType::void(),
    };
    let return_llvm = non_void_llvm(compiler, &return_fin)?;

    let fn_type = build_fn_type(compiler, return_llvm, &param_llvm, decl.is_variadic);
    let function = compiler.module.add_function(&name, fn_type, Some(Linkage::External));
    if let Some(linkage) = crate::attributes::linkage_override(&decl.attributes) {
        function.set_linkage(linkage);
    }

    compiler.registries.function_return_types.insert(name.clone(), return_fin);
    compiler.registries.function_param_types.insert(name, param_fin);
    let _ = span;
    Ok(())
}

/// `enum Color { Red, Green = 5, Blue }` — members auto-increment from the
/// previous one (or from zero) unless given an explicit constant value.
fn declare_enum(compiler: &mut Compiler, decl: &EnumDecl, span: &Span) -> CompileResult<()> {
    let backing = match &decl.backing_type {
        Some(t) => crate::types::convert_type(compiler, t)?,
        None => compiler.context.i32_type().into(),
    };
    let BasicTypeEnum::IntType(int_ty) = backing else {
        return Err(compiler.error(span, format!("'{}' must have an integer backing type", decl.name)));
    };

    let mut members = HashMap::with_capacity(decl.members.len());
    let mut next = 0i64;
    for member in &decl.members {
        let value = match &member.value {
            Some(expr) => constant_fold_int(compiler, expr, span)?,
            None => next,
        };
        members.insert(member.name.clone(), value);
        next = value + 1;
    }

    compiler.registries.enum_types.insert(decl.name.clone(), int_ty);
    compiler.registries.enum_members.insert(decl.name.clone(), members);
    Ok(())
}

/// Folds the handful of expression shapes an enum member's value can take
/// without needing a live builder: integer/long literals and their unary
/// negation. Anything else isn't a compile-time constant here.
fn constant_fold_int(compiler: &mut Compiler, expr: &fin_ast::PExpr, span: &Span) -> CompileResult<i64> {
    match &expr.node {
        Expr::IntLiteral(v) => Ok(*v as i64),
        Expr::LongLiteral(v) => Ok(*v),
        Expr::Unary { op: UnaryOp::Neg, operand } => constant_fold_int(compiler, operand, span).map(|v| -v),
        _ => Err(compiler.error(span, "enum member values must be a constant integer")),
    }
}

/// `let counter: int = 0;` at module scope. String and struct initializers
/// can't be constant-folded here (interning a string requires an active
/// builder insertion point this pass doesn't have); those fall back to a
/// zero-initialized global that the first assignment then fills in.
fn declare_global_variable(compiler: &mut Compiler, decl: &VarDecl, span: &Span) -> CompileResult<()> {
    let ty = decl.declared_type.as_ref().ok_or_else(|| compiler.error(span, format!("global '{}' needs an explicit type", decl.name)))?;
    let fin_type = crate::types::ast_to_fin_type(compiler, ty)?;
    let llvm_ty = crate::types::fin_type_to_llvm(compiler, &fin_type)?;

    let mangled = compiler.mangled(&decl.name);
    let global = compiler.module.add_global(llvm_ty, None, &mangled);
    let initializer = decl.value.as_ref().and_then(|v| constant_fold_scalar(compiler, v, llvm_ty));
    global.set_initializer(&initializer.unwrap_or_else(|| zero_value(llvm_ty)));

    compiler.scope.define(decl.name.clone(), global.as_pointer_value().into(), fin_type);
    Ok(())
}

fn constant_fold_scalar<'ctx>(compiler: &Compiler<'ctx>, expr: &fin_ast::PExpr, llvm_ty: BasicTypeEnum<'ctx>) -> Option<BasicValueEnum<'ctx>> {
    match (&expr.node, llvm_ty) {
        (Expr::IntLiteral(v), BasicTypeEnum::IntType(t)) => Some(t.const_int(*v as u64, true).into()),
        (Expr::LongLiteral(v), BasicTypeEnum::IntType(t)) => Some(t.const_int(*v as u64, true).into()),
        (Expr::BoolLiteral(v), BasicTypeEnum::IntType(t)) => Some(t.const_int(*v as u64, false).into()),
        (Expr::CharLiteral(v), BasicTypeEnum::IntType(t)) => Some(t.const_int(*v as u64, false).into()),
        (Expr::FloatLiteral(v), BasicTypeEnum::FloatType(t)) => Some(t.const_float(*v as f64).into()),
        (Expr::DoubleLiteral(v), BasicTypeEnum::FloatType(t)) => Some(t.const_float(*v).into()),
        (Expr::Null, BasicTypeEnum::PointerType(t)) => Some(t.const_null().into()),
        _ => {
            let _ = compiler;
            None
        }
    }
}

fn zero_value(ty: BasicTypeEnum) -> BasicValueEnum {
    match ty {
        BasicTypeEnum::IntType(t) => t.const_zero().into(),
        BasicTypeEnum::FloatType(t) => t.const_zero().into(),
        BasicTypeEnum::PointerType(t) => t.const_null().into(),
        BasicTypeEnum::StructType(t) => t.const_zero().into(),
        BasicTypeEnum::ArrayType(t) => t.const_zero().into(),
        BasicTypeEnum::VectorType(t) => t.const_zero().into(),
        BasicTypeEnum::ScalableVectorType(t) => t.const_zero().into(),
    }
}

/// Generic functions are stashed under their bare name for
/// `functions::mono::instantiate_function` to find; everything else is
/// declared eagerly.
fn declare_function_item(compiler: &mut Compiler, decl: &FunctionDecl, span: &Span) -> CompileResult<()> {
    if !decl.type_params.is_empty() {
        compiler.registries.function_templates.insert(decl.name.clone(), decl.clone());
        return Ok(());
    }
    declare_function_prototype(compiler, decl, span).map(|_| ())
}

fn resolved_plain_name(compiler: &Compiler, decl: &FunctionDecl) -> String {
    crate::attributes::llvm_name_override(&decl.attributes).map(str::to_string).unwrap_or_else(|| compiler.mangled(&decl.name))
}

fn declare_function_prototype<'ctx>(compiler: &mut Compiler<'ctx>, decl: &FunctionDecl, span: &Span) -> CompileResult<FunctionValue<'ctx>> {
    let name = resolved_plain_name(compiler, decl);
    if let Some(existing) = compiler.module.get_function(&name) {
        return Ok(existing);
    }

    let (param_fin, param_llvm) = lower_param_types(compiler, &decl.params)?;
    let return_fin = match &decl.return_type {
        Some(t) => crate::types::ast_to_fin_type(compiler, t)?,
        None => FinType::void(),
    };
    let return_llvm = non_void_llvm(compiler, &return_fin)?;

    let fn_type = build_fn_type(compiler, return_llvm, &param_llvm, decl.is_variadic);
    let function = compiler.module.add_function(&name, fn_type, None);
    if let Some(linkage) = crate::attributes::linkage_override(&decl.attributes) {
        function.set_linkage(linkage);
    }

    compiler.registries.function_return_types.insert(name.clone(), return_fin);
    compiler.registries.function_param_types.insert(name, param_fin);
    let _ = span;
    Ok(function)
}

fn compile_function_item(compiler: &mut Compiler, decl: &FunctionDecl, span: &Span) -> CompileResult<()> {
    if !decl.type_params.is_empty() {
        return Ok(());
    }
    let name = resolved_plain_name(compiler, decl);
    let function = compiler.module.get_function(&name).ok_or_else(|| compiler.error(span, format!("function '{name}' was never declared")))?;
    if function.count_basic_blocks() > 0 {
        return Ok(());
    }

    let param_fin = compiler.registries.function_param_types.get(&name).cloned().unwrap_or_default();
    let return_type = compiler.registries.function_return_types.get(&name).cloned().unwrap_or_else(FinType::void);
    let params: Vec<(String, FinType)> = decl.params.iter().map(|p| p.name.clone()).zip(param_fin).collect();
    let fallthrough = plain_fallthrough(&return_type, &name);
    compile_body(compiler, function, &params, &decl.body, return_type, fallthrough, None, span)
}

/// Compiles a MONO function instantiation's body. `decl.name` is already
/// the globally unique signature key `functions::mono::instantiate_function`
/// computed and handed back to its caller — it must be declared under that
/// literal string, with no further mangling, or the cache key callers look
/// the function up by would diverge from the symbol actually declared (see
/// the matching fix in `structs::lowering::declare_struct_shape`).
pub fn compile_instantiated_function<'ctx>(compiler: &mut Compiler<'ctx>, decl: &FunctionDecl, span: &Span) -> CompileResult<FunctionValue<'ctx>> {
    if let Some(existing) = compiler.module.get_function(&decl.name) {
        return Ok(existing);
    }

    let (param_fin, param_llvm) = lower_param_types(compiler, &decl.params)?;
    let return_fin = match &decl.return_type {
        Some(t) => crate::types::ast_to_fin_type(compiler, t)?,
        None => FinType::void(),
    };
    let return_llvm = non_void_llvm(compiler, &return_fin)?;

    let fn_type = build_fn_type(compiler, return_llvm, &param_llvm, decl.is_variadic);
    let function = compiler.module.add_function(&decl.name, fn_type, None);

    compiler.registries.function_return_types.insert(decl.name.clone(), return_fin.clone());
    compiler.registries.function_param_types.insert(decl.name.clone(), param_fin.clone());

    let params: Vec<(String, FinType)> = decl.params.iter().map(|p| p.name.clone()).zip(param_fin).collect();
    let fallthrough = plain_fallthrough(&return_fin, &decl.name);
    log::debug!("instantiating generic function body for '{}'", decl.name);
    compile_body(compiler, function, &params, &decl.body, return_fin, fallthrough, None, span)?;
    Ok(function)
}

/// `a op b` overloads. Always take `self` plus the declared right-hand
/// operand; fall through only when the operator is declared `void`
/// (operators are never fluent builders, so there's no implicit-`self`
/// return the way there is for methods).
pub fn compile_operator(compiler: &mut Compiler, mangled: &str, fn_name: &str, op: &OperatorDecl) -> CompileResult<()> {
    let span = Span::unknown();
    if compiler.module.get_function(fn_name).is_some() {
        return Ok(());
    }

    let self_fin = struct_fin(mangled);
    let self_llvm = crate::types::storage_llvm_type(compiler, &self_fin)?;
    let rhs_fin = crate::types::ast_to_fin_type(compiler, &op.rhs.ty)?;
    let rhs_llvm = crate::types::storage_llvm_type(compiler, &rhs_fin)?;
    let return_fin = match &op.return_type {
        Some(t) => crate::types::ast_to_fin_type(compiler, t)?,
        None => FinType::void(),
    };
    let return_llvm = non_void_llvm(compiler, &return_fin)?;

    let fn_type = build_fn_type(compiler, return_llvm, &[self_llvm, rhs_llvm], false);
    let function = compiler.module.add_function(fn_name, fn_type, None);

    compiler.registries.function_return_types.insert(fn_name.to_string(), return_fin.clone());
    compiler.registries.function_param_types.insert(fn_name.to_string(), vec![self_fin.clone(), rhs_fin.clone()]);

    let params = vec![("self".to_string(), self_fin), (op.rhs.name.clone(), rhs_fin)];
    let fallthrough = if return_fin.is_void() { Fallthrough::Void } else { Fallthrough::Error };
    compile_body(compiler, function, &params, &op.body, return_fin, fallthrough, Some(mangled.to_string()), &span)
}

/// Constructors don't receive `self` as a parameter: they allocate it fresh
/// on entry, seed every field with its declared default (or zero), then run
/// the body and implicitly return the new instance.
pub fn compile_constructor(compiler: &mut Compiler, mangled: &str, fn_name: &str, ctor: &ConstructorDecl) -> CompileResult<()> {
    let span = Span::unknown();
    if compiler.module.get_function(fn_name).is_some() {
        return Ok(());
    }

    let self_fin = struct_fin(mangled);
    let (param_fin, param_llvm) = lower_param_types(compiler, &ctor.params)?;
    let self_ptr_llvm = crate::types::storage_llvm_type(compiler, &self_fin)?;

    let fn_type = build_fn_type(compiler, Some(self_ptr_llvm), &param_llvm, false);
    let function = compiler.module.add_function(fn_name, fn_type, None);

    compiler.registries.function_return_types.insert(fn_name.to_string(), self_fin.clone());
    compiler.registries.function_param_types.insert(fn_name.to_string(), param_fin.clone());

    let saved_block = compiler.builder.get_insert_block();
    let saved_function = compiler.current_function.replace(function);
    let saved_return_type = compiler.current_function_return_type.replace(self_fin.clone());
    let saved_struct = compiler.current_struct.replace(mangled.to_string());

    let entry = compiler.context.append_basic_block(function, "entry");
    compiler.builder.position_at_end(entry);
    compiler.scope.push();
    let result = compile_constructor_entry(compiler, function, mangled, &self_fin, ctor, &param_fin, &span);
    compiler.scope.pop();

    compiler.current_function = saved_function;
    compiler.current_function_return_type = saved_return_type;
    compiler.current_struct = saved_struct;
    if let Some(bb) = saved_block {
        compiler.builder.position_at_end(bb);
    }
    result
}

fn compile_constructor_entry(
    compiler: &mut Compiler,
    function: FunctionValue,
    mangled: &str,
    self_fin: &FinType,
    ctor: &ConstructorDecl,
    param_fin: &[FinType],
    span: &Span,
) -> CompileResult<()> {
    let struct_llvm = crate::types::fin_type_to_llvm(compiler, self_fin)?;
    let BasicTypeEnum::StructType(struct_ty) = struct_llvm else {
        return Err(compiler.error(span, format!("'{mangled}' did not lower to a struct body")));
    };
    let self_alloca = compiler.builder.build_alloca(struct_ty, "self").map_err(|e| compiler.error(span, e.to_string()))?;
    initialize_field_defaults(compiler, mangled, self_alloca, struct_ty, span)?;
    compiler.scope.define("self", self_alloca.into(), self_fin.clone());

    for (i, (p, fin)) in ctor.params.iter().zip(param_fin).enumerate() {
        let raw = function.get_nth_param(i as u32).ok_or_else(|| compiler.error(span, format!("missing constructor parameter '{}'", p.name)))?;
        let storage_ty = crate::types::storage_llvm_type(compiler, fin)?;
        let alloca = compiler.builder.build_alloca(storage_ty, &p.name).map_err(|e| compiler.error(span, e.to_string()))?;
        compiler.builder.build_store(alloca, raw).map_err(|e| compiler.error(span, e.to_string()))?;
        compiler.scope.define(p.name.clone(), alloca.into(), fin.clone());
    }

    crate::statements::lower_block(compiler, &ctor.body)?;
    if compiler.builder.get_insert_block().and_then(|b| b.get_terminator()).is_none() {
        let self_value = crate::expressions::load_variable(compiler, "self", span)?;
        compiler.builder.build_return(Some(&self_value.value)).map_err(|e| compiler.error(span, e.to_string()))?;
    }
    Ok(())
}

fn initialize_field_defaults(
    compiler: &mut Compiler,
    mangled: &str,
    self_ptr: PointerValue,
    struct_ty: inkwell::types::StructType,
    span: &Span,
) -> CompileResult<()> {
    let mut fields: Vec<(String, FieldMeta)> = compiler.registries.struct_field_meta.get(mangled).cloned().unwrap_or_default().into_iter().collect();
    fields.sort_by_key(|(_, meta)| meta.index);

    for (_, field) in fields {
        let gep = compiler.builder.build_struct_gep(struct_ty, self_ptr, field.index, "field_default").map_err(|e| compiler.error(span, e.to_string()))?;
        let field_ty = struct_ty.get_field_type_at_index(field.index).ok_or_else(|| compiler.error(span, "field index out of range"))?;
        let value = match &field.default {
            Some(expr) => constant_fold_scalar(compiler, expr, field_ty).unwrap_or_else(|| zero_value(field_ty)),
            None => zero_value(field_ty),
        };
        compiler.builder.build_store(gep, value).map_err(|e| compiler.error(span, e.to_string()))?;
    }
    Ok(())
}

/// The struct's single destructor, always `void`, always taking `self` and
/// nothing else.
pub fn compile_destructor(compiler: &mut Compiler, mangled: &str, fn_name: &str, dtor: &DestructorDecl) -> CompileResult<()> {
    let span = Span::unknown();
    if compiler.module.get_function(fn_name).is_some() {
        return Ok(());
    }

    let self_fin = struct_fin(mangled);
    let self_llvm = crate::types::storage_llvm_type(compiler, &self_fin)?;
    let fn_type = build_fn_type(compiler, None, &[self_llvm], false);
    let function = compiler.module.add_function(fn_name, fn_type, None);

    compiler.registries.function_return_types.insert(fn_name.to_string(), FinType::void());
    compiler.registries.function_param_types.insert(fn_name.to_string(), vec![self_fin.clone()]);

    let params = vec![("self".to_string(), self_fin)];
    compile_body(compiler, function, &params, &dtor.body, FinType::void(), Fallthrough::Void, Some(mangled.to_string()), &span)
}

/// A non-static method always takes an implicit `self` as its first
/// parameter; a static one doesn't. Either way it falls through to an
/// implicit `return self;` only when declared to return `Self` — the
/// fluent-builder pattern.
pub fn compile_method(compiler: &mut Compiler, mangled: &str, fn_name: &str, method: &FunctionDecl) -> CompileResult<()> {
    let span = Span::unknown();
    if compiler.module.get_function(fn_name).is_some() {
        return Ok(());
    }

    let self_fin = struct_fin(mangled);
    let (mut param_fin, mut param_llvm) = lower_param_types(compiler, &method.params)?;
    let mut params_named: Vec<(String, FinType)> = method.params.iter().map(|p| p.name.clone()).zip(param_fin.iter().cloned()).collect();

    if !method.is_static {
        let self_llvm = crate::types::storage_llvm_type(compiler, &self_fin)?;
        param_fin.insert(0, self_fin.clone());
        param_llvm.insert(0, self_llvm);
        params_named.insert(0, ("self".to_string(), self_fin.clone()));
    }

    let return_fin = match &method.return_type {
        Some(t) => crate::types::ast_to_fin_type(compiler, t)?,
        None => FinType::void(),
    };
    let return_llvm = non_void_llvm(compiler, &return_fin)?;

    let fn_type = build_fn_type(compiler, return_llvm, &param_llvm, method.is_variadic);
    let function = compiler.module.add_function(fn_name, fn_type, None);

    compiler.registries.function_return_types.insert(fn_name.to_string(), return_fin.clone());
    compiler.registries.function_param_types.insert(fn_name.to_string(), param_fin);

    let fallthrough = method_fallthrough(&return_fin, &self_fin);
    compile_body(compiler, function, &params_named, &method.body, return_fin, fallthrough, Some(mangled.to_string()), &span)
}

fn struct_fin(mangled: &str) -> FinType {
    FinType::Struct { name: mangled.to_string(), generic_args: vec![] }
}

fn lower_param_types<'ctx>(compiler: &mut Compiler<'ctx>, params: &[fin_ast::Param]) -> CompileResult<(Vec<FinType>, Vec<BasicTypeEnum<'ctx>>)> {
    let mut fin = Vec::with_capacity(params.len());
    let mut llvm = Vec::with_capacity(params.len());
    for p in params {
        let f = crate::types::ast_to_fin_type(compiler, &p.ty)?;
        let l = crate::types::storage_llvm_type(compiler, &f)?;
        fin.push(f);
        llvm.push(l);
    }
    Ok((fin, llvm))
}

fn non_void_llvm<'ctx>(compiler: &mut Compiler<'ctx>, fin: &FinType) -> CompileResult<Option<BasicTypeEnum<'ctx>>> {
    if fin.is_void() {
        Ok(None)
    } else {
        Ok(Some(crate::types::fin_type_to_llvm(compiler, fin)?))
    }
}

fn build_fn_type<'ctx>(compiler: &Compiler<'ctx>, return_ty: Option<BasicTypeEnum<'ctx>>, params: &[BasicTypeEnum<'ctx>], is_variadic: bool) -> FunctionType<'ctx> {
    let meta: Vec<inkwell::types::BasicMetadataTypeEnum> = params.iter().map(|p| (*p).into()).collect();
    match return_ty {
        None => compiler.context.void_type().fn_type(&meta, is_variadic),
        Some(BasicTypeEnum::IntType(t)) => t.fn_type(&meta, is_variadic),
        Some(BasicTypeEnum::FloatType(t)) => t.fn_type(&meta, is_variadic),
        Some(BasicTypeEnum::PointerType(t)) => t.fn_type(&meta, is_variadic),
        Some(BasicTypeEnum::StructType(t)) => t.fn_type(&meta, is_variadic),
        Some(BasicTypeEnum::ArrayType(t)) => t.fn_type(&meta, is_variadic),
        Some(BasicTypeEnum::VectorType(t)) => t.fn_type(&meta, is_variadic),
        Some(BasicTypeEnum::ScalableVectorType(_)) => compiler.context.void_type().fn_type(&meta, is_variadic),
    }
}

/// What to emit when a body falls off its end without an explicit `return`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallthrough {
    Void,
    Error,
    ReturnSelf,
    MainZero,
}

fn plain_fallthrough(return_type: &FinType, resolved_name: &str) -> Fallthrough {
    if return_type.is_void() {
        Fallthrough::Void
    } else if resolved_name == "main" {
        Fallthrough::MainZero
    } else {
        Fallthrough::Error
    }
}

fn method_fallthrough(return_type: &FinType, self_type: &FinType) -> Fallthrough {
    if return_type.is_void() {
        Fallthrough::Void
    } else if return_type == self_type {
        Fallthrough::ReturnSelf
    } else {
        Fallthrough::Error
    }
}

/// Shared entry/exit bookkeeping for every function-shaped body: swaps in
/// the new function's basic block, current-function/return-type/struct
/// context, binds parameters, compiles the body, and restores the saved
/// context no matter how compilation of the body turns out.
#[allow(clippy::too_many_arguments)]
fn compile_body(
    compiler: &mut Compiler,
    function: FunctionValue,
    params: &[(String, FinType)],
    body: &fin_ast::Block,
    return_type: FinType,
    fallthrough: Fallthrough,
    struct_ctx: Option<String>,
    span: &Span,
) -> CompileResult<()> {
    let saved_block = compiler.builder.get_insert_block();
    let saved_function = compiler.current_function.replace(function);
    let saved_return_type = compiler.current_function_return_type.replace(return_type.clone());
    let saved_struct = std::mem::replace(&mut compiler.current_struct, struct_ctx);

    let entry = compiler.context.append_basic_block(function, "entry");
    compiler.builder.position_at_end(entry);
    compiler.scope.push();
    let result = bind_params_and_compile(compiler, function, params, body, &return_type, fallthrough, span);
    compiler.scope.pop();

    compiler.current_function = saved_function;
    compiler.current_function_return_type = saved_return_type;
    compiler.current_struct = saved_struct;
    if let Some(bb) = saved_block {
        compiler.builder.position_at_end(bb);
    }
    result
}

fn bind_params_and_compile(
    compiler: &mut Compiler,
    function: FunctionValue,
    params: &[(String, FinType)],
    body: &fin_ast::Block,
    return_type: &FinType,
    fallthrough: Fallthrough,
    span: &Span,
) -> CompileResult<()> {
    for (i, (name, fin)) in params.iter().enumerate() {
        let raw = function.get_nth_param(i as u32).ok_or_else(|| compiler.error(span, format!("missing parameter '{name}'")))?;
        let storage_ty = crate::types::storage_llvm_type(compiler, fin)?;
        let alloca = compiler.builder.build_alloca(storage_ty, name).map_err(|e| compiler.error(span, e.to_string()))?;
        compiler.builder.build_store(alloca, raw).map_err(|e| compiler.error(span, e.to_string()))?;
        compiler.scope.define(name.clone(), alloca.into(), fin.clone());
    }

    crate::statements::lower_block(compiler, body)?;

    if compiler.builder.get_insert_block().and_then(|b| b.get_terminator()).is_none() {
        emit_fallthrough(compiler, return_type, fallthrough, span)?;
    }
    Ok(())
}

fn emit_fallthrough(compiler: &mut Compiler, return_type: &FinType, fallthrough: Fallthrough, span: &Span) -> CompileResult<()> {
    match fallthrough {
        Fallthrough::Void => {
            compiler.builder.build_return(None).map_err(|e| compiler.error(span, e.to_string()))?;
        }
        Fallthrough::MainZero => {
            let llvm = crate::types::fin_type_to_llvm(compiler, return_type)?;
            let BasicTypeEnum::IntType(int_ty) = llvm else {
                return Err(compiler.error(span, "'main' must return an integer type"));
            };
            let zero = int_ty.const_zero();
            compiler.builder.build_return(Some(&zero)).map_err(|e| compiler.error(span, e.to_string()))?;
        }
        Fallthrough::ReturnSelf => {
            let self_value = crate::expressions::load_variable(compiler, "self", span)?;
            compiler.builder.build_return(Some(&self_value.value)).map_err(|e| compiler.error(span, e.to_string()))?;
        }
        Fallthrough::Error => {
            return Err(compiler.error(span, "missing return statement"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fin_ast::{Param, Spanned, Visibility};
    use inkwell::context::Context;
    use std::path::PathBuf;

    fn new_compiler(context: &Context) -> Compiler<'_> {
        Compiler::new(context, "m", crate::options::CompileOptions::new("/p"), PathBuf::from("/p/a.fin"))
    }

    fn named_type(name: &str) -> fin_ast::PType {
        Box::new(Spanned { node: fin_ast::TypeNode::Named(name.into()), span: Span::unknown() })
    }

    #[test]
    fn plain_fallthrough_routes_main_to_zero() {
        assert_eq!(plain_fallthrough(&FinType::int(), "main"), Fallthrough::MainZero);
        assert_eq!(plain_fallthrough(&FinType::void(), "add"), Fallthrough::Void);
        assert_eq!(plain_fallthrough(&FinType::int(), "add"), Fallthrough::Error);
    }

    #[test]
    fn method_fallthrough_returns_self_only_when_types_match() {
        let self_ty = struct_fin("Builder");
        assert_eq!(method_fallthrough(&self_ty, &self_ty), Fallthrough::ReturnSelf);
        assert_eq!(method_fallthrough(&FinType::int(), &self_ty), Fallthrough::Error);
        assert_eq!(method_fallthrough(&FinType::void(), &self_ty), Fallthrough::Void);
    }

    #[test]
    fn declare_enum_auto_increments_from_the_previous_member() {
        let context = Context::create();
        let mut compiler = new_compiler(&context);
        let decl = EnumDecl {
            name: "Color".into(),
            backing_type: None,
            members: vec![
                fin_ast::EnumMember { name: "Red".into(), value: None },
                fin_ast::EnumMember { name: "Green".into(), value: Some(Box::new(Spanned { node: Expr::IntLiteral(5), span: Span::unknown() })) },
                fin_ast::EnumMember { name: "Blue".into(), value: None },
            ],
            visibility: Visibility::Public,
        };
        declare_enum(&mut compiler, &decl, &Span::unknown()).unwrap();
        let members = &compiler.registries.enum_members["Color"];
        assert_eq!(members["Red"], 0);
        assert_eq!(members["Green"], 5);
        assert_eq!(members["Blue"], 6);
    }

    #[test]
    fn declare_function_prototype_records_param_and_return_types() {
        let context = Context::create();
        let mut compiler = new_compiler(&context);
        let decl = FunctionDecl {
            name: "add".into(),
            type_params: vec![],
            params: vec![Param { name: "a".into(), ty: named_type("int") }, Param { name: "b".into(), ty: named_type("int") }],
            return_type: Some(named_type("int")),
            body: fin_ast::Block { statements: vec![] },
            visibility: Visibility::Public,
            is_static: false,
            is_variadic: false,
            attributes: vec![],
        };
        let function = declare_function_prototype(&mut compiler, &decl, &Span::unknown()).unwrap();
        assert_eq!(function.count_params(), 2);
        let name = compiler.mangled("add");
        assert_eq!(compiler.registries.function_return_types[&name], FinType::int());
    }

    #[test]
    fn compile_function_item_emits_the_declared_body() {
        let context = Context::create();
        let mut compiler = new_compiler(&context);
        let decl = FunctionDecl {
            name: "answer".into(),
            type_params: vec![],
            params: vec![],
            return_type: Some(named_type("int")),
            body: fin_ast::Block { statements: vec![Spanned { node: fin_ast::Stmt::Return(Some(Box::new(Spanned { node: Expr::IntLiteral(42), span: Span::unknown() }))), span: Span::unknown() }] },
            visibility: Visibility::Public,
            is_static: false,
            is_variadic: false,
            attributes: vec![],
        };
        declare_function_prototype(&mut compiler, &decl, &Span::unknown()).unwrap();
        compile_function_item(&mut compiler, &decl, &Span::unknown()).unwrap();
        let name = compiler.mangled("answer");
        let function = compiler.module.get_function(&name).unwrap();
        assert!(function.count_basic_blocks() > 0);
    }

    #[test]
    fn compile_function_item_is_a_noop_the_second_time() {
        let context = Context::create();
        let mut compiler = new_compiler(&context);
        let decl = FunctionDecl {
            name: "once".into(),
            type_params: vec![],
            params: vec![],
            return_type: None,
            body: fin_ast::Block { statements: vec![] },
            visibility: Visibility::Public,
            is_static: false,
            is_variadic: false,
            attributes: vec![],
        };
        declare_function_prototype(&mut compiler, &decl, &Span::unknown()).unwrap();
        compile_function_item(&mut compiler, &decl, &Span::unknown()).unwrap();
        compile_function_item(&mut compiler, &decl, &Span::unknown()).unwrap();
        let name = compiler.mangled("once");
        let function = compiler.module.get_function(&name).unwrap();
        assert_eq!(function.count_basic_blocks(), 1);
    }
}
