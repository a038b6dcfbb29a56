//! Statement lowering: control flow, assignment (with the full coercion
//! order), `try`/`catch`/`blame`, and the inline-compilation entry point
//! macros and specials expand into.

mod assignment;
mod control_flow;

use fin_ast::{Block, Stmt};
use fin_diagnostics::CompileResult;

use crate::compiler::Compiler;
use crate::expressions::{lower_expr, Lowered};
use crate::fin_type::FinType;

/// Compiles every statement in `block` in the current basic block, inside
/// a fresh scope frame. Used for function/method/constructor bodies and
/// every nested block (`if`/`while`/`for`/`foreach` bodies).
pub fn lower_block(compiler: &mut Compiler, block: &Block) -> CompileResult<()> {
    compiler.scope.push();
    let result = lower_block_statements(compiler, block);
    compiler.scope.pop();
    result
}

fn lower_block_statements(compiler: &mut Compiler, block: &Block) -> CompileResult<()> {
    for stmt in &block.statements {
        lower_stmt(compiler, &stmt.node, &stmt.span)?;
        if compiler.builder.get_insert_block().and_then(|b| b.get_terminator()).is_some() {
            break;
        }
    }
    Ok(())
}

/// Entry point for macro/special-body inline compilation: runs the body's
/// statements directly into the current block (no new function, no new
/// basic blocks beyond what control flow inside the body needs) and
/// yields the value of a trailing expression statement, or void.
pub fn compile_block_inline<'ctx>(compiler: &mut Compiler<'ctx>, block: &Block, span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    compiler.scope.push();
    let mut last_value = None;
    for (i, stmt) in block.statements.iter().enumerate() {
        if i == block.statements.len() - 1 {
            if let Stmt::Expr(expr) = &stmt.node {
                last_value = Some(lower_expr(compiler, expr)?);
                continue;
            }
        }
        lower_stmt(compiler, &stmt.node, &stmt.span)?;
    }
    compiler.scope.pop();
    Ok(last_value.unwrap_or_else(|| Lowered::new(compiler.context.i32_type().const_zero().into(), FinType::void())))
}

fn lower_stmt(compiler: &mut Compiler, stmt: &Stmt, span: &fin_ast::Span) -> CompileResult<()> {
    match stmt {
        Stmt::Expr(expr) => {
            lower_expr(compiler, expr)?;
            Ok(())
        }
        Stmt::VarDecl(decl) => lower_var_decl(compiler, decl, span),
        Stmt::Assignment { target, op, value } => assignment::lower_assignment(compiler, target, *op, value, span),
        Stmt::Return(expr) => control_flow::lower_return(compiler, expr.as_ref(), span),
        Stmt::If { branches, else_block } => control_flow::lower_if(compiler, branches, else_block, span),
        Stmt::While { cond, body } => control_flow::lower_while(compiler, cond, body, span),
        Stmt::For { init, cond, step, body } => control_flow::lower_for(compiler, init.as_deref(), cond.as_ref(), step.as_deref(), body, span),
        Stmt::ForEach { var, elem_type, iterable, body } => control_flow::lower_foreach(compiler, var, elem_type.as_ref(), iterable, body, span),
        Stmt::Break => control_flow::lower_break(compiler, span),
        Stmt::Continue => control_flow::lower_continue(compiler, span),
        Stmt::Block(b) => lower_block(compiler, b),
        Stmt::Try { body, catch } => control_flow::lower_try(compiler, body, catch.as_ref(), span),
        Stmt::Blame(expr) => control_flow::lower_blame(compiler, expr, span),
        Stmt::Delete(expr) => lower_delete(compiler, expr, span),
    }
}

fn lower_var_decl(compiler: &mut Compiler, decl: &fin_ast::VarDecl, span: &fin_ast::Span) -> CompileResult<()> {
    let (value, fin_type) = match (&decl.value, &decl.declared_type) {
        (Some(expr), Some(declared)) => {
            let lowered = lower_expr(compiler, expr)?;
            let target = crate::types::ast_to_fin_type(compiler, declared)?;
            let coerced = if lowered.fin_type == target { lowered } else { crate::expressions::boxing::std_conv(compiler, &lowered, &target, span)? };
            (coerced.value, coerced.fin_type)
        }
        (Some(expr), None) => {
            let lowered = lower_expr(compiler, expr)?;
            (lowered.value, lowered.fin_type)
        }
        (None, Some(declared)) => {
            let target = crate::types::ast_to_fin_type(compiler, declared)?;
            let llvm_ty = crate::types::fin_type_to_llvm(compiler, &target)?;
            (llvm_ty.const_zero(), target)
        }
        (None, None) => return Err(compiler.error(span, format!("'{}' needs either a type annotation or an initializer", decl.name))),
    };

    let storage_ty = crate::types::storage_llvm_type(compiler, &fin_type)?;
    let alloca = compiler.builder.build_alloca(storage_ty, &decl.name).map_err(|e| compiler.error(span, e.to_string()))?;
    compiler.builder.build_store(alloca, value).map_err(|e| compiler.error(span, e.to_string()))?;
    compiler.scope.define(decl.name.clone(), alloca.into(), fin_type);
    Ok(())
}

/// `delete expr`: calls `free` on the expression's pointer value. No
/// destructor dispatch here — struct destructors run through an explicit
/// `<Struct>__del` call the caller is expected to have already made
/// (or that a future ownership pass inserts); `delete` itself only
/// reclaims the backing allocation.
fn lower_delete(compiler: &mut Compiler, expr: &fin_ast::PExpr, span: &fin_ast::Span) -> CompileResult<()> {
    let lowered = lower_expr(compiler, expr)?;
    let ptr = match lowered.value {
        inkwell::values::BasicValueEnum::PointerValue(p) => p,
        _ => return Err(compiler.error(span, "'delete' requires a pointer or struct value")),
    };
    if let FinType::Struct { name, .. } = &lowered.fin_type {
        if let Some(dtor_name) = compiler.registries.struct_destructors.get(name).map(|_| format!("{name}__del")) {
            if let Some(function) = compiler.module.get_function(&dtor_name) {
                compiler.builder.build_call(function, &[ptr.into()], "dtor_call").map_err(|e| compiler.error(span, e.to_string()))?;
            }
        }
    }
    compiler.builder.build_call(compiler.free_fn(), &[ptr.into()], "delete_free").map_err(|e| compiler.error(span, e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_decl_without_type_or_value_is_an_error() {
        let context = inkwell::context::Context::create();
        let mut compiler = crate::compiler::Compiler::new(&context, "m", crate::options::CompileOptions::new("/p"), std::path::PathBuf::from("/p/a.fin"));
        let decl = fin_ast::VarDecl { name: "x".into(), declared_type: None, value: None, visibility: fin_ast::Visibility::Private };
        let result = lower_var_decl(&mut compiler, &decl, &fin_ast::Span::unknown());
        assert!(result.is_err());
    }
}
