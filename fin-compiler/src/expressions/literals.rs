use fin_ast::{Expr, PExpr};
use fin_diagnostics::CompileResult;
use inkwell::AddressSpace;

use super::Lowered;
use crate::compiler::Compiler;
use crate::fin_type::{FinType, Primitive};

pub fn lower_literal<'ctx>(compiler: &mut Compiler<'ctx>, expr: &PExpr) -> CompileResult<Lowered<'ctx>> {
    match &expr.node {
        Expr::IntLiteral(v) => Ok(Lowered::new(compiler.context.i32_type().const_int(*v as u64, true).into(), FinType::int())),
        Expr::LongLiteral(v) => Ok(Lowered::new(compiler.context.i64_type().const_int(*v as u64, true).into(), FinType::Primitive(Primitive::Long))),
        Expr::FloatLiteral(v) => Ok(Lowered::new(compiler.context.f32_type().const_float(*v as f64).into(), FinType::Primitive(Primitive::Float))),
        Expr::DoubleLiteral(v) => Ok(Lowered::new(compiler.context.f64_type().const_float(*v).into(), FinType::Primitive(Primitive::Double))),
        Expr::BoolLiteral(v) => Ok(Lowered::new(compiler.context.bool_type().const_int(*v as u64, false).into(), FinType::Primitive(Primitive::Bool))),
        Expr::CharLiteral(v) => Ok(Lowered::new(compiler.context.i8_type().const_int(*v as u64, false).into(), FinType::Primitive(Primitive::Char))),
        Expr::StringLiteral(s) => Ok(Lowered::new(intern_string(compiler, s), FinType::string())),
        Expr::Null => Ok(Lowered::new(compiler.context.ptr_type(AddressSpace::default()).const_null().into(), FinType::Pointer(Box::new(FinType::void())))),
        _ => unreachable!("lower_literal called on a non-literal expression"),
    }
}

/// Interns a string literal: one global per distinct value, shared across
/// every module compiled in this process.
pub(crate) fn intern_string<'ctx>(compiler: &mut Compiler<'ctx>, value: &str) -> inkwell::values::BasicValueEnum<'ctx> {
    if let Some(global) = compiler.interner.get(value) {
        return global.as_pointer_value().into();
    }
    let global = compiler
        .builder
        .build_global_string_ptr(value, "str")
        .expect("global string literal construction never fails");
    let global_value = global.as_pointer_value();
    // `build_global_string_ptr` returns a `GlobalValue`-backed pointer; we
    // re-derive the `GlobalValue` handle via the module so later lookups
    // for the same literal reuse it instead of emitting a duplicate.
    if let Some(g) = compiler.module.get_global(global.get_name().to_str().unwrap_or_default()) {
        compiler.interner.insert(value.to_string(), g);
    }
    global_value.into()
}

pub fn lower_array_literal<'ctx>(compiler: &mut Compiler<'ctx>, items: &[PExpr], span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    if items.is_empty() {
        return Err(compiler.error(span, "empty array literals require an explicit element type"));
    }
    let mut lowered = Vec::with_capacity(items.len());
    for item in items {
        lowered.push(super::lower_expr(compiler, item)?);
    }
    let elem_type = lowered[0].fin_type.clone();
    let elem_llvm = crate::types::fin_type_to_llvm(compiler, &elem_type)?;

    let array_ty = match elem_llvm {
        inkwell::types::BasicTypeEnum::IntType(t) => t.array_type(items.len() as u32),
        inkwell::types::BasicTypeEnum::FloatType(t) => t.array_type(items.len() as u32),
        inkwell::types::BasicTypeEnum::PointerType(t) => t.array_type(items.len() as u32),
        inkwell::types::BasicTypeEnum::StructType(t) => t.array_type(items.len() as u32),
        inkwell::types::BasicTypeEnum::ArrayType(t) => t.array_type(items.len() as u32),
        inkwell::types::BasicTypeEnum::VectorType(t) => t.array_type(items.len() as u32),
        inkwell::types::BasicTypeEnum::ScalableVectorType(_) => return Err(compiler.error(span, "array literals of this element type are unsupported")),
    };

    let alloca = compiler
        .builder
        .build_alloca(array_ty, "array_lit")
        .map_err(|e| compiler.error(span, format!("failed to allocate array literal: {e}")))?;
    for (i, item) in lowered.iter().enumerate() {
        let slot = unsafe {
            compiler
                .builder
                .build_in_bounds_gep(
                    array_ty,
                    alloca,
                    &[compiler.context.i32_type().const_zero(), compiler.context.i32_type().const_int(i as u64, false)],
                    "elem_ptr",
                )
                .map_err(|e| compiler.error(span, format!("failed to index array literal: {e}")))?
        };
        compiler
            .builder
            .build_store(slot, item.value)
            .map_err(|e| compiler.error(span, format!("failed to store array literal element: {e}")))?;
    }
    Ok(Lowered::new(alloca.into(), FinType::Array { elem: Box::new(elem_type), size: items.len() as u64 }))
}
