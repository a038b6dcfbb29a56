//! Binary, unary, and postfix operator lowering, including struct
//! operator-overload dispatch (`registries.struct_operators`).

use fin_ast::{BinaryOp, OperatorSymbol, PExpr, PostfixOp, UnaryOp};
use fin_diagnostics::CompileResult;
use inkwell::values::BasicValueEnum;
use inkwell::{FloatPredicate, IntPredicate};

use super::{lower_expr, Lowered};
use crate::compiler::Compiler;
use crate::fin_type::{FinType, Primitive};

pub fn lower_binary<'ctx>(compiler: &mut Compiler<'ctx>, left: &PExpr, op: BinaryOp, right: &PExpr, span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let lhs = lower_expr(compiler, left)?;

    if let FinType::Struct { name, .. } = &lhs.fin_type {
        if name != "Collection" {
            if let Some(symbol) = OperatorSymbol::from_binary(op) {
                if let Some(fn_name) = compiler.registries.struct_operators.get(name).and_then(|ops| ops.get(&symbol)).cloned() {
                    return call_operator_overload(compiler, &fn_name, name, &lhs, right, span);
                }
            }
        }
    }

    let rhs = lower_expr(compiler, right)?;

    match (lhs.value, rhs.value) {
        (BasicValueEnum::IntValue(l), BasicValueEnum::IntValue(r)) => int_binary(compiler, l, r, op, span),
        (BasicValueEnum::FloatValue(l), BasicValueEnum::FloatValue(r)) => float_binary(compiler, l, r, op, span),
        (BasicValueEnum::PointerValue(l), BasicValueEnum::PointerValue(r)) => pointer_binary(compiler, l, r, op, span),
        _ => Err(compiler.error(span, "operand types are not compatible with this operator")),
    }
}

fn call_operator_overload<'ctx>(compiler: &mut Compiler<'ctx>, fn_name: &str, struct_name: &str, lhs: &Lowered<'ctx>, right: &PExpr, span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let rhs = lower_expr(compiler, right)?;
    let function = compiler.module.get_function(fn_name).ok_or_else(|| compiler.error(span, format!("operator function '{fn_name}' was never compiled")))?;
    let coerced = crate::expressions::boxing::coerce_for_param(compiler, &rhs, fn_name, 1, span)?;

    let call = compiler
        .builder
        .build_call(function, &[lhs.value.into(), coerced.into()], "op_call")
        .map_err(|e| compiler.error(span, format!("failed to call operator '{struct_name}' overload: {e}")))?;

    let return_type = compiler.registries.function_return_types.get(fn_name).cloned().unwrap_or(FinType::void());
    let value = call.try_as_basic_value().left().unwrap_or_else(|| compiler.context.i32_type().const_zero().into());
    Ok(Lowered::new(value, return_type))
}

pub(crate) fn int_binary<'ctx>(compiler: &mut Compiler<'ctx>, l: inkwell::values::IntValue<'ctx>, r: inkwell::values::IntValue<'ctx>, op: BinaryOp, span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let (l, r) = match l.get_type().get_bit_width().cmp(&r.get_type().get_bit_width()) {
        std::cmp::Ordering::Less => (compiler.builder.build_int_s_extend(l, r.get_type(), "sext").map_err(|e| compiler.error(span, e.to_string()))?, r),
        std::cmp::Ordering::Greater => (l, compiler.builder.build_int_s_extend(r, l.get_type(), "sext").map_err(|e| compiler.error(span, e.to_string()))?),
        std::cmp::Ordering::Equal => (l, r),
    };
    let is_wide = l.get_type().get_bit_width() > 32;
    let int_fin = if is_wide { FinType::Primitive(Primitive::Long) } else { FinType::int() };
    let bool_fin = FinType::Primitive(Primitive::Bool);

    macro_rules! cmp {
        ($pred:expr, $name:expr) => {
            compiler.builder.build_int_compare($pred, l, r, $name).map_err(|e| compiler.error(span, e.to_string())).map(|v| Lowered::new(v.into(), bool_fin.clone()))
        };
    }

    match op {
        BinaryOp::Add => Ok(Lowered::new(compiler.builder.build_int_add(l, r, "add").map_err(|e| compiler.error(span, e.to_string()))?.into(), int_fin)),
        BinaryOp::Sub => Ok(Lowered::new(compiler.builder.build_int_sub(l, r, "sub").map_err(|e| compiler.error(span, e.to_string()))?.into(), int_fin)),
        BinaryOp::Mul => Ok(Lowered::new(compiler.builder.build_int_mul(l, r, "mul").map_err(|e| compiler.error(span, e.to_string()))?.into(), int_fin)),
        BinaryOp::Div => {
            super::safety::check_division(compiler, r, span, false)?;
            Ok(Lowered::new(compiler.builder.build_int_signed_div(l, r, "div").map_err(|e| compiler.error(span, e.to_string()))?.into(), int_fin))
        }
        BinaryOp::Mod => {
            super::safety::check_division(compiler, r, span, false)?;
            Ok(Lowered::new(compiler.builder.build_int_signed_rem(l, r, "mod").map_err(|e| compiler.error(span, e.to_string()))?.into(), int_fin))
        }
        BinaryOp::Eq => cmp!(IntPredicate::EQ, "eq"),
        BinaryOp::NotEq => cmp!(IntPredicate::NE, "ne"),
        BinaryOp::Lt => cmp!(IntPredicate::SLT, "lt"),
        BinaryOp::LtEq => cmp!(IntPredicate::SLE, "le"),
        BinaryOp::Gt => cmp!(IntPredicate::SGT, "gt"),
        BinaryOp::GtEq => cmp!(IntPredicate::SGE, "ge"),
        BinaryOp::And => Ok(Lowered::new(compiler.builder.build_and(l, r, "and").map_err(|e| compiler.error(span, e.to_string()))?.into(), bool_fin)),
        BinaryOp::Or => Ok(Lowered::new(compiler.builder.build_or(l, r, "or").map_err(|e| compiler.error(span, e.to_string()))?.into(), bool_fin)),
        BinaryOp::BitAnd => Ok(Lowered::new(compiler.builder.build_and(l, r, "bitand").map_err(|e| compiler.error(span, e.to_string()))?.into(), int_fin)),
        BinaryOp::BitOr => Ok(Lowered::new(compiler.builder.build_or(l, r, "bitor").map_err(|e| compiler.error(span, e.to_string()))?.into(), int_fin)),
        BinaryOp::BitXor => Ok(Lowered::new(compiler.builder.build_xor(l, r, "bitxor").map_err(|e| compiler.error(span, e.to_string()))?.into(), int_fin)),
        BinaryOp::Shl => Ok(Lowered::new(compiler.builder.build_left_shift(l, r, "shl").map_err(|e| compiler.error(span, e.to_string()))?.into(), int_fin)),
        BinaryOp::Shr => Ok(Lowered::new(compiler.builder.build_right_shift(l, r, true, "shr").map_err(|e| compiler.error(span, e.to_string()))?.into(), int_fin)),
    }
}

pub(crate) fn float_binary<'ctx>(compiler: &mut Compiler<'ctx>, l: inkwell::values::FloatValue<'ctx>, r: inkwell::values::FloatValue<'ctx>, op: BinaryOp, span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let float_fin = FinType::Primitive(Primitive::Double);
    let bool_fin = FinType::Primitive(Primitive::Bool);

    macro_rules! cmp {
        ($pred:expr, $name:expr) => {
            compiler.builder.build_float_compare($pred, l, r, $name).map_err(|e| compiler.error(span, e.to_string())).map(|v| Lowered::new(v.into(), bool_fin.clone()))
        };
    }

    match op {
        BinaryOp::Add => Ok(Lowered::new(compiler.builder.build_float_add(l, r, "fadd").map_err(|e| compiler.error(span, e.to_string()))?.into(), float_fin)),
        BinaryOp::Sub => Ok(Lowered::new(compiler.builder.build_float_sub(l, r, "fsub").map_err(|e| compiler.error(span, e.to_string()))?.into(), float_fin)),
        BinaryOp::Mul => Ok(Lowered::new(compiler.builder.build_float_mul(l, r, "fmul").map_err(|e| compiler.error(span, e.to_string()))?.into(), float_fin)),
        BinaryOp::Div => Ok(Lowered::new(compiler.builder.build_float_div(l, r, "fdiv").map_err(|e| compiler.error(span, e.to_string()))?.into(), float_fin)),
        BinaryOp::Mod => {
            super::safety::check_float_division(compiler, r, span)?;
            Ok(Lowered::new(compiler.builder.build_float_rem(l, r, "frem").map_err(|e| compiler.error(span, e.to_string()))?.into(), float_fin))
        }
        BinaryOp::Eq => cmp!(FloatPredicate::OEQ, "feq"),
        BinaryOp::NotEq => cmp!(FloatPredicate::ONE, "fne"),
        BinaryOp::Lt => cmp!(FloatPredicate::OLT, "flt"),
        BinaryOp::LtEq => cmp!(FloatPredicate::OLE, "fle"),
        BinaryOp::Gt => cmp!(FloatPredicate::OGT, "fgt"),
        BinaryOp::GtEq => cmp!(FloatPredicate::OGE, "fge"),
        _ => Err(compiler.error(span, "this operator is not defined for floating-point operands")),
    }
}

/// Pointers (including `string`, which lowers to `ptr`) only support
/// identity comparison here; content comparison is a library concern, not
/// a builtin operator.
fn pointer_binary<'ctx>(compiler: &mut Compiler<'ctx>, l: inkwell::values::PointerValue<'ctx>, r: inkwell::values::PointerValue<'ctx>, op: BinaryOp, span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let bool_fin = FinType::Primitive(Primitive::Bool);
    match op {
        BinaryOp::Eq => Ok(Lowered::new(compiler.builder.build_int_compare(IntPredicate::EQ, l, r, "peq").map_err(|e| compiler.error(span, e.to_string()))?.into(), bool_fin)),
        BinaryOp::NotEq => Ok(Lowered::new(compiler.builder.build_int_compare(IntPredicate::NE, l, r, "pne").map_err(|e| compiler.error(span, e.to_string()))?.into(), bool_fin)),
        _ => Err(compiler.error(span, "only == and != are defined for pointer operands")),
    }
}

pub fn lower_unary<'ctx>(compiler: &mut Compiler<'ctx>, op: UnaryOp, operand: &PExpr, span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let lowered = lower_expr(compiler, operand)?;
    match (op, lowered.value) {
        (UnaryOp::Neg, BasicValueEnum::IntValue(v)) => Ok(Lowered::new(compiler.builder.build_int_neg(v, "neg").map_err(|e| compiler.error(span, e.to_string()))?.into(), lowered.fin_type)),
        (UnaryOp::Neg, BasicValueEnum::FloatValue(v)) => Ok(Lowered::new(compiler.builder.build_float_neg(v, "fneg").map_err(|e| compiler.error(span, e.to_string()))?.into(), lowered.fin_type)),
        (UnaryOp::Not, BasicValueEnum::IntValue(v)) => Ok(Lowered::new(compiler.builder.build_not(v, "not").map_err(|e| compiler.error(span, e.to_string()))?.into(), lowered.fin_type)),
        (UnaryOp::BitNot, BasicValueEnum::IntValue(v)) => Ok(Lowered::new(compiler.builder.build_not(v, "bitnot").map_err(|e| compiler.error(span, e.to_string()))?.into(), lowered.fin_type)),
        _ => Err(compiler.error(span, "this unary operator is not defined for the operand's type")),
    }
}

/// `x++`/`x--`. Only legal on an addressable operand (identifier, `self`
/// field, indexing) since it reads through the l-value pointer, adds/subs
/// one, stores back, and yields the pre-increment value.
pub fn lower_postfix<'ctx>(compiler: &mut Compiler<'ctx>, operand: &PExpr, op: PostfixOp, span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let ptr = super::lvalue_pointer(compiler, operand, span)?;
    let fin_type = super::get_arg_fin_type_of(compiler, operand)?;
    let llvm_ty = crate::types::fin_type_to_llvm(compiler, &fin_type)?;
    let loaded = compiler.builder.build_load(llvm_ty, ptr, "postfix_load").map_err(|e| compiler.error(span, e.to_string()))?;

    let updated = match loaded {
        BasicValueEnum::IntValue(v) => {
            let one = v.get_type().const_int(1, false);
            let result = match op {
                PostfixOp::Increment => compiler.builder.build_int_add(v, one, "inc"),
                PostfixOp::Decrement => compiler.builder.build_int_sub(v, one, "dec"),
            };
            result.map_err(|e| compiler.error(span, e.to_string()))?.into()
        }
        BasicValueEnum::FloatValue(v) => {
            let one = v.get_type().const_float(1.0);
            let result = match op {
                PostfixOp::Increment => compiler.builder.build_float_add(v, one, "finc"),
                PostfixOp::Decrement => compiler.builder.build_float_sub(v, one, "fdec"),
            };
            result.map_err(|e| compiler.error(span, e.to_string()))?.into()
        }
        _ => return Err(compiler.error(span, "'++'/'--' only apply to numeric operands")),
    };
    compiler.builder.build_store(ptr, updated).map_err(|e| compiler.error(span, e.to_string()))?;
    Ok(Lowered::new(loaded, fin_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_bit_width_ints_are_promoted_before_comparison() {
        let context = inkwell::context::Context::create();
        let mut compiler = crate::compiler::Compiler::new(&context, "m", crate::options::CompileOptions::new("/p"), std::path::PathBuf::from("/p/a.fin"));
        let func = compiler.module.add_function("f", context.void_type().fn_type(&[], false), None);
        let block = context.append_basic_block(func, "entry");
        compiler.builder.position_at_end(block);
        let small = context.i32_type().const_int(3, true);
        let big = context.i64_type().const_int(3, true);
        let result = int_binary(&mut compiler, small, big, BinaryOp::Eq, &fin_ast::Span::unknown());
        assert!(result.is_ok());
    }
}
