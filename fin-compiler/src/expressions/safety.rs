//! Runtime safety checks: division/modulo by zero, null dereference, and
//! array bounds, each backed by a call into the `__panic` runtime
//! contract function followed by `unreachable`.

use fin_diagnostics::CompileResult;
use inkwell::values::{IntValue, PointerValue};
use inkwell::{FloatPredicate, IntPredicate};

use crate::compiler::Compiler;

fn emit_panic_and_unreachable(compiler: &mut Compiler, message: &str, span: &fin_ast::Span) -> CompileResult<()> {
    let msg_ptr = compiler
        .builder
        .build_global_string_ptr(message, "panic_msg")
        .map_err(|e| compiler.error(span, format!("failed to build panic message: {e}")))?;
    compiler
        .builder
        .build_call(compiler.panic_fn(), &[msg_ptr.as_pointer_value().into()], "panic_call")
        .map_err(|e| compiler.error(span, format!("failed to call __panic: {e}")))?;
    compiler.builder.build_unreachable().map_err(|e| compiler.error(span, format!("failed to terminate panic block: {e}")))?;
    Ok(())
}

/// Emits a branch to a panic block when `divisor` is zero (int division
/// and modulo). If the divisor is a compile-time constant the check is
/// resolved statically: a literal zero is a fatal compile error, any
/// other literal is a no-op.
pub fn check_division(compiler: &mut Compiler, divisor: IntValue, span: &fin_ast::Span, is_float: bool) -> CompileResult<()> {
    if let Some(constant) = divisor.get_zero_extended_constant() {
        if constant == 0 && !is_float {
            return Err(compiler.error(span, "division by a compile-time-constant zero"));
        }
        return Ok(());
    }

    let function = compiler.current_function.expect("division only occurs inside a function body");
    let zero_block = compiler.context.append_basic_block(function, "div_zero");
    let ok_block = compiler.context.append_basic_block(function, "div_ok");

    let is_zero = compiler
        .builder
        .build_int_compare(IntPredicate::EQ, divisor, divisor.get_type().const_zero(), "is_zero")
        .map_err(|e| compiler.error(span, format!("failed to compare divisor to zero: {e}")))?;
    compiler
        .builder
        .build_conditional_branch(is_zero, zero_block, ok_block)
        .map_err(|e| compiler.error(span, format!("failed to branch on zero divisor: {e}")))?;

    compiler.builder.position_at_end(zero_block);
    emit_panic_and_unreachable(compiler, "division by zero", span)?;

    compiler.builder.position_at_end(ok_block);
    Ok(())
}

/// Float division/modulo only panics when told to by the caller (Fin
/// treats float division by zero as producing `inf`/`nan`, matching IEEE
/// 754, so this is only invoked for the explicit modulo operator which
/// still wants the guard for parity with the integer path).
pub fn check_float_division(compiler: &mut Compiler, divisor: inkwell::values::FloatValue, span: &fin_ast::Span) -> CompileResult<()> {
    let function = compiler.current_function.expect("division only occurs inside a function body");
    let zero_block = compiler.context.append_basic_block(function, "fdiv_zero");
    let ok_block = compiler.context.append_basic_block(function, "fdiv_ok");

    let is_zero = compiler
        .builder
        .build_float_compare(FloatPredicate::OEQ, divisor, divisor.get_type().const_zero(), "is_zero")
        .map_err(|e| compiler.error(span, format!("failed to compare divisor to zero: {e}")))?;
    compiler
        .builder
        .build_conditional_branch(is_zero, zero_block, ok_block)
        .map_err(|e| compiler.error(span, format!("failed to branch on zero divisor: {e}")))?;

    compiler.builder.position_at_end(zero_block);
    emit_panic_and_unreachable(compiler, "modulo by zero", span)?;

    compiler.builder.position_at_end(ok_block);
    Ok(())
}

/// Calls `__panic` with an already-computed message pointer and emits
/// `unreachable`. Used by `blame`, whose message is a runtime value
/// (a loaded `error_msg` field) rather than a fixed string constant.
pub fn emit_panic_with_message(compiler: &mut Compiler, message: PointerValue, span: &fin_ast::Span) -> CompileResult<()> {
    compiler
        .builder
        .build_call(compiler.panic_fn(), &[message.into()], "panic_call")
        .map_err(|e| compiler.error(span, format!("failed to call __panic: {e}")))?;
    compiler.builder.build_unreachable().map_err(|e| compiler.error(span, format!("failed to terminate panic block: {e}")))?;
    Ok(())
}

/// Emits a compare-to-null check before a `load`/method-call through a
/// dereferenced pointer.
pub fn check_non_null(compiler: &mut Compiler, pointer: PointerValue, span: &fin_ast::Span) -> CompileResult<()> {
    let function = compiler.current_function.expect("dereference only occurs inside a function body");
    let null_block = compiler.context.append_basic_block(function, "null_deref");
    let ok_block = compiler.context.append_basic_block(function, "deref_ok");

    let is_null = compiler
        .builder
        .build_is_null(pointer, "is_null")
        .map_err(|e| compiler.error(span, format!("failed to compare pointer to null: {e}")))?;
    compiler
        .builder
        .build_conditional_branch(is_null, null_block, ok_block)
        .map_err(|e| compiler.error(span, format!("failed to branch on null pointer: {e}")))?;

    compiler.builder.position_at_end(null_block);
    emit_panic_and_unreachable(compiler, "null pointer dereference", span)?;

    compiler.builder.position_at_end(ok_block);
    Ok(())
}

/// For collections: `index < length` (unsigned), panicking otherwise. For
/// static arrays with a literal index, the caller is expected to check at
/// compile time instead (see `expressions::calls::lower_index`) and never
/// reach this runtime path.
pub fn check_bounds(compiler: &mut Compiler, index: IntValue, length: IntValue, span: &fin_ast::Span) -> CompileResult<()> {
    let function = compiler.current_function.expect("indexing only occurs inside a function body");
    let oob_block = compiler.context.append_basic_block(function, "out_of_bounds");
    let ok_block = compiler.context.append_basic_block(function, "bounds_ok");

    let in_bounds = compiler
        .builder
        .build_int_compare(IntPredicate::ULT, index, length, "in_bounds")
        .map_err(|e| compiler.error(span, format!("failed to compare index to length: {e}")))?;
    compiler
        .builder
        .build_conditional_branch(in_bounds, ok_block, oob_block)
        .map_err(|e| compiler.error(span, format!("failed to branch on bounds check: {e}")))?;

    compiler.builder.position_at_end(oob_block);
    emit_panic_and_unreachable(compiler, "index out of bounds", span)?;

    compiler.builder.position_at_end(ok_block);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_zero_divisor_is_a_compile_error() {
        let context = inkwell::context::Context::create();
        let mut compiler = crate::compiler::Compiler::new(
            &context,
            "m",
            crate::options::CompileOptions::new("/p"),
            std::path::PathBuf::from("/p/a.fin"),
        );
        let zero = context.i32_type().const_int(0, false);
        assert!(check_division(&mut compiler, zero, &fin_ast::Span::unknown(), false).is_err());
    }

    #[test]
    fn literal_nonzero_divisor_is_a_noop() {
        let context = inkwell::context::Context::create();
        let mut compiler = crate::compiler::Compiler::new(
            &context,
            "m",
            crate::options::CompileOptions::new("/p"),
            std::path::PathBuf::from("/p/a.fin"),
        );
        let five = context.i32_type().const_int(5, false);
        assert!(check_division(&mut compiler, five, &fin_ast::Span::unknown(), false).is_ok());
    }
}
