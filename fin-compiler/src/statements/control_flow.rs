//! `if`/`elif`/`else`, `while`, `for`, `foreach`, `break`/`continue`,
//! `return`, and `try`/`catch`/`blame`.

use fin_ast::{Block, PExpr, PStmt, PType};
use fin_diagnostics::CompileResult;
use inkwell::values::BasicValueEnum;
use inkwell::IntPredicate;

use crate::compiler::Compiler;
use crate::expressions::lower_expr;
use crate::fin_type::FinType;
use crate::scope::LoopBlocks;

fn to_bool<'ctx>(compiler: &mut Compiler<'ctx>, value: BasicValueEnum<'ctx>, span: &fin_ast::Span) -> CompileResult<inkwell::values::IntValue<'ctx>> {
    match value {
        BasicValueEnum::IntValue(v) if v.get_type().get_bit_width() == 1 => Ok(v),
        BasicValueEnum::IntValue(v) => {
            let zero = v.get_type().const_zero();
            compiler.builder.build_int_compare(IntPredicate::NE, v, zero, "tobool").map_err(|e| compiler.error(span, e.to_string()))
        }
        _ => Err(compiler.error(span, "condition must be a boolean or integer value")),
    }
}

fn block_has_terminator(compiler: &Compiler) -> bool {
    compiler.builder.get_insert_block().and_then(|b| b.get_terminator()).is_some()
}

pub fn lower_if(compiler: &mut Compiler, branches: &[(PExpr, Block)], else_block: &Option<Block>, span: &fin_ast::Span) -> CompileResult<()> {
    let function = compiler.current_function.ok_or_else(|| compiler.error(span, "'if' used outside of a function"))?;
    let merge_bb = compiler.context.append_basic_block(function, "ifcont");

    let mut branch_blocks = Vec::with_capacity(branches.len());
    for i in 0..branches.len() {
        let cond_bb = compiler.context.append_basic_block(function, &format!("if.cond.{i}"));
        let then_bb = compiler.context.append_basic_block(function, &format!("if.then.{i}"));
        branch_blocks.push((cond_bb, then_bb));
    }
    let else_bb = compiler.context.append_basic_block(function, "if.else");

    compiler.builder.build_unconditional_branch(branch_blocks[0].0).map_err(|e| compiler.error(span, e.to_string()))?;

    let mut any_reaches_merge = false;
    for (i, (cond_expr, body)) in branches.iter().enumerate() {
        let (cond_bb, then_bb) = branch_blocks[i];
        compiler.builder.position_at_end(cond_bb);
        let cond_val = lower_expr(compiler, cond_expr)?;
        let bool_val = to_bool(compiler, cond_val.value, span)?;
        let next_bb = branch_blocks.get(i + 1).map(|(c, _)| *c).unwrap_or(else_bb);
        compiler.builder.build_conditional_branch(bool_val, then_bb, next_bb).map_err(|e| compiler.error(span, e.to_string()))?;

        compiler.builder.position_at_end(then_bb);
        super::lower_block(compiler, body)?;
        if !block_has_terminator(compiler) {
            compiler.builder.build_unconditional_branch(merge_bb).map_err(|e| compiler.error(span, e.to_string()))?;
            any_reaches_merge = true;
        }
    }

    compiler.builder.position_at_end(else_bb);
    if let Some(b) = else_block {
        super::lower_block(compiler, b)?;
    }
    if !block_has_terminator(compiler) {
        compiler.builder.build_unconditional_branch(merge_bb).map_err(|e| compiler.error(span, e.to_string()))?;
        any_reaches_merge = true;
    }

    compiler.builder.position_at_end(merge_bb);
    if !any_reaches_merge {
        compiler.builder.build_unreachable().map_err(|e| compiler.error(span, e.to_string()))?;
    }
    Ok(())
}

pub fn lower_while(compiler: &mut Compiler, cond: &PExpr, body: &Block, span: &fin_ast::Span) -> CompileResult<()> {
    let function = compiler.current_function.ok_or_else(|| compiler.error(span, "'while' used outside of a function"))?;
    let cond_bb = compiler.context.append_basic_block(function, "while.cond");
    let body_bb = compiler.context.append_basic_block(function, "while.body");
    let end_bb = compiler.context.append_basic_block(function, "while.end");

    compiler.builder.build_unconditional_branch(cond_bb).map_err(|e| compiler.error(span, e.to_string()))?;

    compiler.builder.position_at_end(cond_bb);
    let cond_val = lower_expr(compiler, cond)?;
    let bool_val = to_bool(compiler, cond_val.value, span)?;
    compiler.builder.build_conditional_branch(bool_val, body_bb, end_bb).map_err(|e| compiler.error(span, e.to_string()))?;

    compiler.builder.position_at_end(body_bb);
    compiler.scope.push();
    compiler.scope.enter_loop(LoopBlocks { continue_block: cond_bb, break_block: end_bb });
    let result = super::lower_block(compiler, body);
    compiler.scope.pop();
    result?;
    if !block_has_terminator(compiler) {
        compiler.builder.build_unconditional_branch(cond_bb).map_err(|e| compiler.error(span, e.to_string()))?;
    }

    compiler.builder.position_at_end(end_bb);
    Ok(())
}

pub fn lower_for(compiler: &mut Compiler, init: Option<&PStmt>, cond: Option<&PExpr>, step: Option<&PStmt>, body: &Block, span: &fin_ast::Span) -> CompileResult<()> {
    let function = compiler.current_function.ok_or_else(|| compiler.error(span, "'for' used outside of a function"))?;

    compiler.scope.push();
    if let Some(i) = init {
        super::lower_stmt(compiler, &i.node, &i.span)?;
    }

    let cond_bb = compiler.context.append_basic_block(function, "for.cond");
    let body_bb = compiler.context.append_basic_block(function, "for.body");
    let step_bb = compiler.context.append_basic_block(function, "for.step");
    let end_bb = compiler.context.append_basic_block(function, "for.end");

    compiler.builder.build_unconditional_branch(cond_bb).map_err(|e| compiler.error(span, e.to_string()))?;

    compiler.builder.position_at_end(cond_bb);
    if let Some(c) = cond {
        let cond_val = lower_expr(compiler, c)?;
        let bool_val = to_bool(compiler, cond_val.value, span)?;
        compiler.builder.build_conditional_branch(bool_val, body_bb, end_bb).map_err(|e| compiler.error(span, e.to_string()))?;
    } else {
        compiler.builder.build_unconditional_branch(body_bb).map_err(|e| compiler.error(span, e.to_string()))?;
    }

    compiler.builder.position_at_end(body_bb);
    compiler.scope.push();
    compiler.scope.enter_loop(LoopBlocks { continue_block: step_bb, break_block: end_bb });
    let body_result = super::lower_block(compiler, body);
    compiler.scope.pop();
    body_result?;
    if !block_has_terminator(compiler) {
        compiler.builder.build_unconditional_branch(step_bb).map_err(|e| compiler.error(span, e.to_string()))?;
    }

    compiler.builder.position_at_end(step_bb);
    if let Some(s) = step {
        super::lower_stmt(compiler, &s.node, &s.span)?;
    }
    if !block_has_terminator(compiler) {
        compiler.builder.build_unconditional_branch(cond_bb).map_err(|e| compiler.error(span, e.to_string()))?;
    }

    compiler.builder.position_at_end(end_bb);
    compiler.scope.pop();
    Ok(())
}

/// `foreach x <T> in coll { body }`: lowers to a counted loop driven by
/// `coll.length` (the `Collection` literal-struct length field), indexing
/// the element on each iteration through the same bounds-checked path
/// `[]` uses.
pub fn lower_foreach(compiler: &mut Compiler, var: &str, _elem_type: Option<&PType>, iterable: &PExpr, body: &Block, span: &fin_ast::Span) -> CompileResult<()> {
    let function = compiler.current_function.ok_or_else(|| compiler.error(span, "'foreach' used outside of a function"))?;
    // A static array has no pointer-backed storage representation once
    // loaded (`storage_llvm_type` keeps it inline, unlike a struct), so a
    // plain `lower_expr` would hand us a loaded aggregate with no address
    // to GEP into. Resolve its own storage pointer directly instead; a
    // `Collection` stays on the ordinary `lower_expr` path since it is
    // already reference-typed.
    let collection = match crate::types::get_arg_fin_type(compiler, iterable)? {
        FinType::Array { elem, size } => {
            let ptr = crate::expressions::lvalue_pointer(compiler, iterable, span)?;
            crate::expressions::Lowered::new(ptr.into(), FinType::Array { elem, size })
        }
        _ => lower_expr(compiler, iterable)?,
    };

    let length = crate::structs::member_access::collection_length(compiler, &collection, span)?;
    let i64_ty = compiler.context.i64_type();
    let index_alloca = compiler.builder.build_alloca(i64_ty, "foreach_idx").map_err(|e| compiler.error(span, e.to_string()))?;
    compiler.builder.build_store(index_alloca, i64_ty.const_zero()).map_err(|e| compiler.error(span, e.to_string()))?;

    let cond_bb = compiler.context.append_basic_block(function, "foreach.cond");
    let body_bb = compiler.context.append_basic_block(function, "foreach.body");
    let step_bb = compiler.context.append_basic_block(function, "foreach.step");
    let end_bb = compiler.context.append_basic_block(function, "foreach.end");

    compiler.builder.build_unconditional_branch(cond_bb).map_err(|e| compiler.error(span, e.to_string()))?;

    compiler.builder.position_at_end(cond_bb);
    let index = compiler.builder.build_load(i64_ty, index_alloca, "foreach_idx_val").map_err(|e| compiler.error(span, e.to_string()))?.into_int_value();
    let keep_going = compiler.builder.build_int_compare(IntPredicate::ULT, index, length, "foreach_cond").map_err(|e| compiler.error(span, e.to_string()))?;
    compiler.builder.build_conditional_branch(keep_going, body_bb, end_bb).map_err(|e| compiler.error(span, e.to_string()))?;

    compiler.builder.position_at_end(body_bb);
    let (elem_value, elem_type) = crate::structs::member_access::collection_index_load(compiler, &collection, index, span)?;
    compiler.scope.push();
    compiler.scope.enter_loop(LoopBlocks { continue_block: step_bb, break_block: end_bb });
    compiler.scope.define(var.to_string(), elem_value, elem_type);
    let body_result = super::lower_block(compiler, body);
    compiler.scope.pop();
    body_result?;
    if !block_has_terminator(compiler) {
        compiler.builder.build_unconditional_branch(step_bb).map_err(|e| compiler.error(span, e.to_string()))?;
    }

    compiler.builder.position_at_end(step_bb);
    let next_index = compiler.builder.build_int_add(index, i64_ty.const_int(1, false), "foreach_next").map_err(|e| compiler.error(span, e.to_string()))?;
    compiler.builder.build_store(index_alloca, next_index).map_err(|e| compiler.error(span, e.to_string()))?;
    compiler.builder.build_unconditional_branch(cond_bb).map_err(|e| compiler.error(span, e.to_string()))?;

    compiler.builder.position_at_end(end_bb);
    Ok(())
}

pub fn lower_break(compiler: &mut Compiler, span: &fin_ast::Span) -> CompileResult<()> {
    let blocks = compiler.scope.find_loop_scope().ok_or_else(|| compiler.error(span, "'break' used outside of a loop"))?;
    compiler.builder.build_unconditional_branch(blocks.break_block).map_err(|e| compiler.error(span, e.to_string()))?;
    Ok(())
}

pub fn lower_continue(compiler: &mut Compiler, span: &fin_ast::Span) -> CompileResult<()> {
    let blocks = compiler.scope.find_loop_scope().ok_or_else(|| compiler.error(span, "'continue' used outside of a loop"))?;
    compiler.builder.build_unconditional_branch(blocks.continue_block).map_err(|e| compiler.error(span, e.to_string()))?;
    Ok(())
}

pub fn lower_return(compiler: &mut Compiler, expr: Option<&PExpr>, span: &fin_ast::Span) -> CompileResult<()> {
    let declared_return = compiler.current_function_return_type.clone().unwrap_or(FinType::void());
    match expr {
        Some(e) => {
            let lowered = lower_expr(compiler, e)?;
            let coerced = if lowered.fin_type == declared_return || declared_return.is_void() {
                lowered
            } else {
                crate::expressions::boxing::std_conv(compiler, &lowered, &declared_return, span)?
            };
            compiler.builder.build_return(Some(&coerced.value)).map_err(|e| compiler.error(span, e.to_string()))?;
        }
        None => {
            compiler.builder.build_return(None).map_err(|e| compiler.error(span, e.to_string()))?;
        }
    }
    Ok(())
}

/// `try { body } catch(name) { handler }`: `try` compiles in-line since
/// there is no unwinding; `catch` compiles into a detached block that is
/// reachable only once real exception support lands in the runtime.
pub fn lower_try(compiler: &mut Compiler, body: &Block, catch: Option<&(Option<String>, Block)>, span: &fin_ast::Span) -> CompileResult<()> {
    super::lower_block(compiler, body)?;
    if let Some((_, catch_body)) = catch {
        if let Some(function) = compiler.current_function {
            let catch_bb = compiler.context.append_basic_block(function, "catch");
            let current = compiler.builder.get_insert_block();
            compiler.builder.position_at_end(catch_bb);
            super::lower_block(compiler, catch_body)?;
            if !block_has_terminator(compiler) {
                compiler.builder.build_unreachable().map_err(|e| compiler.error(span, e.to_string()))?;
            }
            if let Some(bb) = current {
                compiler.builder.position_at_end(bb);
            }
        }
    }
    Ok(())
}

/// `blame expr`: if `expr` is a struct carrying an `error_msg` field,
/// loads that field as the panic message; otherwise panics with a
/// fallback message naming the expression's static type.
pub fn lower_blame(compiler: &mut Compiler, expr: &PExpr, span: &fin_ast::Span) -> CompileResult<()> {
    let lowered = lower_expr(compiler, expr)?;
    let message = if let FinType::Struct { name, .. } = &lowered.fin_type {
        if let Some(index) = compiler.registries.field_index(name, "error_msg") {
            let struct_ty = *compiler.registries.struct_types.get(name).ok_or_else(|| compiler.error(span, format!("'{name}' has no lowered shape")))?;
            let ptr = lowered.value.into_pointer_value();
            let field_ptr = compiler.builder.build_struct_gep(struct_ty, ptr, index, "error_msg").map_err(|e| compiler.error(span, e.to_string()))?;
            let i8_ptr = compiler.context.ptr_type(inkwell::AddressSpace::default());
            Some(compiler.builder.build_load(i8_ptr, field_ptr, "error_msg_val").map_err(|e| compiler.error(span, e.to_string()))?.into_pointer_value())
        } else {
            None
        }
    } else {
        None
    };

    let message = match message {
        Some(m) => m,
        None => crate::expressions::literals::intern_string(compiler, "blame").into_pointer_value(),
    };
    crate::expressions::safety::emit_panic_with_message(compiler, message, span)
}
