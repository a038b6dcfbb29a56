//! `target = value` and compound assignment (`+=`, `-=`, `*=`, `/=`,
//! `%=`), both resolved through the same l-value pointer `&expr` and
//! `++`/`--` use.

use fin_ast::{AssignOp, BinaryOp, PExpr};
use fin_diagnostics::CompileResult;
use inkwell::values::BasicValueEnum;

use crate::compiler::Compiler;
use crate::expressions::{boxing, lower_expr, lvalue_pointer};
use crate::fin_type::FinType;

pub fn lower_assignment(compiler: &mut Compiler, target: &PExpr, op: AssignOp, value: &PExpr, span: &fin_ast::Span) -> CompileResult<()> {
    let ptr = lvalue_pointer(compiler, target, span)?;
    let target_type = crate::types::get_arg_fin_type(compiler, target)?;

    let new_value = if op == AssignOp::Assign {
        let rhs = lower_expr(compiler, value)?;
        coerce_to(compiler, &rhs, &target_type, span)?
    } else {
        let current_llvm = crate::types::fin_type_to_llvm(compiler, &target_type)?;
        let current = compiler.builder.build_load(current_llvm, ptr, "compound_lhs").map_err(|e| compiler.error(span, e.to_string()))?;
        let rhs = lower_expr(compiler, value)?;
        let rhs_value = coerce_to(compiler, &rhs, &target_type, span)?;
        let binary_op = match op {
            AssignOp::Add => BinaryOp::Add,
            AssignOp::Sub => BinaryOp::Sub,
            AssignOp::Mul => BinaryOp::Mul,
            AssignOp::Div => BinaryOp::Div,
            AssignOp::Mod => BinaryOp::Mod,
            AssignOp::Assign => unreachable!("handled above"),
        };
        apply_binary(compiler, current, rhs_value, binary_op, span)?
    };

    compiler.builder.build_store(ptr, new_value).map_err(|e| compiler.error(span, e.to_string()))?;
    Ok(())
}

fn coerce_to<'ctx>(compiler: &mut Compiler<'ctx>, value: &crate::expressions::Lowered<'ctx>, target: &FinType, span: &fin_ast::Span) -> CompileResult<BasicValueEnum<'ctx>> {
    if &value.fin_type == target {
        return Ok(value.value);
    }
    Ok(boxing::std_conv(compiler, value, target, span)?.value)
}

fn apply_binary<'ctx>(compiler: &mut Compiler<'ctx>, lhs: BasicValueEnum<'ctx>, rhs: BasicValueEnum<'ctx>, op: BinaryOp, span: &fin_ast::Span) -> CompileResult<BasicValueEnum<'ctx>> {
    use crate::expressions::operators::{float_binary, int_binary};
    match (lhs, rhs) {
        (BasicValueEnum::IntValue(l), BasicValueEnum::IntValue(r)) => Ok(int_binary(compiler, l, r, op, span)?.value),
        (BasicValueEnum::FloatValue(l), BasicValueEnum::FloatValue(r)) => Ok(float_binary(compiler, l, r, op, span)?.value),
        _ => Err(compiler.error(span, "compound assignment requires matching numeric operand types")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_assign_coerces_to_the_target_type() {
        let context = inkwell::context::Context::create();
        let mut compiler = crate::compiler::Compiler::new(&context, "m", crate::options::CompileOptions::new("/p"), std::path::PathBuf::from("/p/a.fin"));
        let func = compiler.module.add_function("f", context.void_type().fn_type(&[], false), None);
        let block = context.append_basic_block(func, "entry");
        compiler.builder.position_at_end(block);
        compiler.current_function = Some(func);

        let alloca = compiler.builder.build_alloca(context.i64_type(), "x").unwrap();
        compiler.builder.build_store(alloca, context.i64_type().const_zero()).unwrap();
        compiler.scope.define("x", alloca.into(), FinType::Primitive(crate::fin_type::Primitive::Long));

        let target = fin_ast::Spanned { node: fin_ast::Expr::Identifier("x".into()), span: fin_ast::Span::unknown() };
        let value = fin_ast::Spanned { node: fin_ast::Expr::IntLiteral(5), span: fin_ast::Span::unknown() };
        let result = lower_assignment(&mut compiler, &target, AssignOp::Assign, &value, &fin_ast::Span::unknown());
        assert!(result.is_ok());
    }
}
