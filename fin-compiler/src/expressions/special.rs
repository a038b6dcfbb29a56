//! `@builtin(...)` special calls and user-defined `macro`/`special`
//! invocations, both resolved and expanded at their call site rather than
//! compiled to a standalone function.

use fin_ast::{Expr, PExpr};
use fin_diagnostics::CompileResult;

use super::Lowered;
use crate::compiler::Compiler;
use crate::fin_type::FinType;

pub fn lower_special_call<'ctx>(compiler: &mut Compiler<'ctx>, name: &str, args: &[PExpr], span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    match name {
        "hasattr" => lower_hasattr(compiler, args, span),
        "name" => lower_name_of(compiler, args, span),
        "unsafe_unbox" => lower_unsafe_unbox(compiler, args, span),
        _ => lower_user_special(compiler, name, args, span),
    }
}

/// `@hasattr(expr, "field")`: resolved statically against the receiver's
/// field table, with no code emitted either way.
fn lower_hasattr<'ctx>(compiler: &mut Compiler<'ctx>, args: &[PExpr], span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let [target, field] = args else {
        return Err(compiler.error(span, "'@hasattr' takes exactly two arguments"));
    };
    let Expr::StringLiteral(field_name) = &field.node else {
        return Err(compiler.error(span, "'@hasattr' requires a string literal field name"));
    };
    let fin_type = crate::types::get_arg_fin_type(compiler, target)?;
    let has = match &fin_type {
        FinType::Struct { name, .. } => compiler.registries.field_index(name, field_name).is_some(),
        _ => false,
    };
    Ok(Lowered::new(compiler.context.bool_type().const_int(has as u64, false).into(), FinType::Primitive(crate::fin_type::Primitive::Bool)))
}

/// `@name(expr)`: the source-level name of the expression's static type,
/// as an interned string constant.
fn lower_name_of<'ctx>(compiler: &mut Compiler<'ctx>, args: &[PExpr], span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let [target] = args else {
        return Err(compiler.error(span, "'@name' takes exactly one argument"));
    };
    let fin_type = crate::types::get_arg_fin_type(compiler, target)?;
    let type_name = fin_type.signature();
    let global = crate::expressions::literals::intern_string(compiler, &type_name);
    Ok(Lowered::new(global, FinType::Primitive(crate::fin_type::Primitive::String)))
}

/// `@unsafe_unbox(expr)`: a raw bitcast with no runtime check, bypassing
/// the tagged `Any` protocol entirely.
fn lower_unsafe_unbox<'ctx>(compiler: &mut Compiler<'ctx>, args: &[PExpr], span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let [target] = args else {
        return Err(compiler.error(span, "'@unsafe_unbox' takes exactly one argument"));
    };
    let lowered = super::lower_expr(compiler, target)?;
    let ptr = if let inkwell::values::BasicValueEnum::StructValue(any_val) = lowered.value {
        compiler.builder.build_extract_value(any_val, 0, "unsafe_unbox_data").map_err(|e| compiler.error(span, e.to_string()))?.into_pointer_value()
    } else {
        lowered.value.into_pointer_value()
    };
    Ok(Lowered::new(ptr.into(), FinType::Pointer(Box::new(FinType::Any))))
}

fn lower_user_special<'ctx>(compiler: &mut Compiler<'ctx>, name: &str, args: &[PExpr], span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let decl = compiler
        .registries
        .specials
        .get(name)
        .cloned()
        .ok_or_else(|| compiler.error(span, format!("unknown special '@{name}'")))?;
    if decl.params.len() != args.len() {
        return Err(compiler.error(span, format!("'@{name}' expects {} arguments, got {}", decl.params.len(), args.len())));
    }
    let body = substitute_params(&decl.body, &decl.params, args);
    crate::statements::compile_block_inline(compiler, &body, span)
}

pub fn lower_macro_call<'ctx>(compiler: &mut Compiler<'ctx>, name: &str, args: &[PExpr], span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let decl = compiler
        .registries
        .macros
        .get(name)
        .cloned()
        .ok_or_else(|| compiler.error(span, format!("unknown macro '{name}'")))?;
    if decl.params.len() != args.len() {
        return Err(compiler.error(span, format!("macro '{name}' expects {} arguments, got {}", decl.params.len(), args.len())));
    }
    let body = substitute_params(&decl.body, &decl.params, args);
    crate::statements::compile_block_inline(compiler, &body, span)
}

/// Rewrites every `Identifier(param)` in a cloned copy of `body` into the
/// matching actual-argument expression, implementing "substitutes actual
/// arguments into the body by AST rewriting" for both macros and specials.
fn substitute_params(body: &fin_ast::Block, params: &[String], args: &[PExpr]) -> fin_ast::Block {
    let mut cloned = body.clone();
    let bindings: std::collections::HashMap<&str, &PExpr> = params.iter().map(String::as_str).zip(args.iter()).collect();
    for stmt in &mut cloned.statements {
        rewrite_stmt(&mut stmt.node, &bindings);
    }
    cloned
}

fn rewrite_stmt(stmt: &mut fin_ast::Stmt, bindings: &std::collections::HashMap<&str, &PExpr>) {
    use fin_ast::Stmt;
    match stmt {
        Stmt::Expr(e) | Stmt::Blame(e) | Stmt::Delete(e) => rewrite_expr(&mut e.node, bindings),
        Stmt::VarDecl(decl) => {
            if let Some(v) = &mut decl.value {
                rewrite_expr(&mut v.node, bindings);
            }
        }
        Stmt::Assignment { target, value, .. } => {
            rewrite_expr(&mut target.node, bindings);
            rewrite_expr(&mut value.node, bindings);
        }
        Stmt::Return(Some(e)) => rewrite_expr(&mut e.node, bindings),
        Stmt::Return(None) => {}
        Stmt::If { branches, else_block } => {
            for (cond, body) in branches {
                rewrite_expr(&mut cond.node, bindings);
                rewrite_block(body, bindings);
            }
            if let Some(b) = else_block {
                rewrite_block(b, bindings);
            }
        }
        Stmt::While { cond, body } => {
            rewrite_expr(&mut cond.node, bindings);
            rewrite_block(body, bindings);
        }
        Stmt::For { init, cond, step, body } => {
            if let Some(i) = init {
                rewrite_stmt(&mut i.node, bindings);
            }
            if let Some(c) = cond {
                rewrite_expr(&mut c.node, bindings);
            }
            if let Some(s) = step {
                rewrite_stmt(&mut s.node, bindings);
            }
            rewrite_block(body, bindings);
        }
        Stmt::ForEach { iterable, body, .. } => {
            rewrite_expr(&mut iterable.node, bindings);
            rewrite_block(body, bindings);
        }
        Stmt::Break | Stmt::Continue => {}
        Stmt::Block(b) => rewrite_block(b, bindings),
        Stmt::Try { body, catch } => {
            rewrite_block(body, bindings);
            if let Some((_, catch_body)) = catch {
                rewrite_block(catch_body, bindings);
            }
        }
    }
}

fn rewrite_block(block: &mut fin_ast::Block, bindings: &std::collections::HashMap<&str, &PExpr>) {
    for stmt in &mut block.statements {
        rewrite_stmt(&mut stmt.node, bindings);
    }
}

fn rewrite_expr(expr: &mut fin_ast::Expr, bindings: &std::collections::HashMap<&str, &PExpr>) {
    use fin_ast::Expr;
    if let Expr::Identifier(name) = expr {
        if let Some(replacement) = bindings.get(name.as_str()) {
            *expr = (*replacement).node.clone();
            return;
        }
    }
    match expr {
        Expr::Binary { left, right, .. } => {
            rewrite_expr(&mut left.node, bindings);
            rewrite_expr(&mut right.node, bindings);
        }
        Expr::Unary { operand, .. } | Expr::Postfix { operand, .. } => rewrite_expr(&mut operand.node, bindings),
        Expr::Call { callee, args, .. } => {
            rewrite_expr(&mut callee.node, bindings);
            for a in args {
                rewrite_expr(&mut a.node, bindings);
            }
        }
        Expr::MemberAccess { object, .. } => rewrite_expr(&mut object.node, bindings),
        Expr::ArrayIndex { object, index } => {
            rewrite_expr(&mut object.node, bindings);
            rewrite_expr(&mut index.node, bindings);
        }
        Expr::ArrayLiteral(items) => {
            for i in items {
                rewrite_expr(&mut i.node, bindings);
            }
        }
        Expr::StructInstantiation { fields, .. } => {
            for (_, value) in fields {
                rewrite_expr(&mut value.node, bindings);
            }
        }
        Expr::AddressOf(inner) | Expr::Dereference(inner) | Expr::New(inner) | Expr::TypeOf(inner) => rewrite_expr(&mut inner.node, bindings),
        Expr::Cast { expr: inner, .. } => rewrite_expr(&mut inner.node, bindings),
        Expr::SpecialCall { args, .. } | Expr::MacroCall { args, .. } => {
            for a in args {
                rewrite_expr(&mut a.node, bindings);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fin_ast::{Block, Spanned, Stmt};

    #[test]
    fn substitutes_identifier_matching_a_param_name() {
        let body = Block { statements: vec![Spanned { node: Stmt::Return(Some(Spanned { node: Expr::Identifier("x".into()), span: fin_ast::Span::unknown() })), span: fin_ast::Span::unknown() }] };
        let arg = Spanned { node: Expr::IntLiteral(7), span: fin_ast::Span::unknown() };
        let result = substitute_params(&body, &["x".to_string()], std::slice::from_ref(&arg));
        let Stmt::Return(Some(e)) = &result.statements[0].node else { panic!("expected return") };
        assert_eq!(e.node, Expr::IntLiteral(7));
    }
}
