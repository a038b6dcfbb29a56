//! MONO instantiation: clone a generic template's AST, substitute every
//! occurrence of its type parameters with the call-site concrete types,
//! rename it to `<Base>_<arg-signatures>`, and compile the result once.

use fin_ast::{FieldDecl, FunctionDecl, Param, PType, Spanned, StructDecl, TypeNode};
use fin_diagnostics::CompileResult;

use crate::compiler::Compiler;
use crate::fin_type::FinType;

/// Returns the mangled name of the instantiated concrete struct,
/// compiling it on first use and reusing the cached result afterward.
pub fn instantiate_struct(compiler: &mut Compiler, base_mangled: &str, args: &[FinType], span: &fin_ast::Span) -> CompileResult<String> {
    let signature_key = format!("{base_mangled}_{}", args.iter().map(FinType::signature).collect::<Vec<_>>().join("_"));

    if compiler.registries.struct_types.contains_key(&signature_key) {
        return Ok(signature_key);
    }

    let template = compiler
        .registries
        .struct_templates
        .get(base_mangled)
        .cloned()
        .ok_or_else(|| compiler.error(span, format!("'{base_mangled}' is not a known generic struct template")))?;

    if args.len() > template.type_params.len() {
        return Err(compiler.error(
            span,
            format!(
                "'{base_mangled}' expects at most {} type arguments, got {}",
                template.type_params.len(),
                args.len()
            ),
        ));
    }

    let mut bindings = std::collections::HashMap::new();
    for (param, concrete) in template.type_params.iter().zip(args.iter()) {
        bindings.insert(param.name.clone(), concrete.clone());
    }

    let mut concrete_decl = template;
    concrete_decl.name = signature_key.clone();
    concrete_decl.type_params.clear();
    substitute_fields(&mut concrete_decl.fields, &bindings);
    for ctor in &mut concrete_decl.constructors {
        for p in &mut ctor.params {
            substitute_type(&mut p.ty, &bindings);
        }
        substitute_block(&mut ctor.body, &bindings);
    }
    for method in &mut concrete_decl.methods {
        substitute_function(method, &bindings);
    }

    compiler.registries.struct_decls.insert(signature_key.clone(), concrete_decl.clone());

    let saved_bindings = std::mem::replace(&mut compiler.current_type_bindings, bindings);
    let result = crate::structs::lowering::lower_struct(compiler, &concrete_decl, span);
    compiler.current_type_bindings = saved_bindings;
    result?;

    Ok(signature_key)
}

pub(crate) fn substitute_fields(fields: &mut [FieldDecl], bindings: &std::collections::HashMap<String, FinType>) {
    for field in fields {
        substitute_type(&mut field.ty, bindings);
    }
}

pub(crate) fn substitute_function(function: &mut FunctionDecl, bindings: &std::collections::HashMap<String, FinType>) {
    for Param { ty, .. } in &mut function.params {
        substitute_type(ty, bindings);
    }
    if let Some(ret) = &mut function.return_type {
        substitute_type(ret, bindings);
    }
    substitute_block(&mut function.body, bindings);
}

pub(crate) fn substitute_type(ty: &mut PType, bindings: &std::collections::HashMap<String, FinType>) {
    match &mut ty.node {
        TypeNode::Named(name) => {
            if let Some(concrete) = bindings.get(name) {
                ty.node = crate::types::fin_type_to_type_node(concrete);
            }
        }
        TypeNode::ModuleQualified { .. } => {}
        TypeNode::Generic { args, .. } => {
            for a in args {
                substitute_type(a, bindings);
            }
        }
        TypeNode::Pointer(inner) => substitute_type(inner, bindings),
        TypeNode::Array { elem, .. } => substitute_type(elem, bindings),
        TypeNode::Function { params, ret } => {
            for p in params {
                substitute_type(p, bindings);
            }
            substitute_type(ret, bindings);
        }
    }
}

/// Walks every expression and nested type annotation in a method body so a
/// template's `let x: T = ...`, casts, and `sizeof(T)` all see the
/// call-site concrete type too.
pub(crate) fn substitute_block(block: &mut fin_ast::Block, bindings: &std::collections::HashMap<String, FinType>) {
    for stmt in &mut block.statements {
        substitute_stmt(&mut stmt.node, bindings);
    }
}

pub(crate) fn substitute_stmt(stmt: &mut fin_ast::Stmt, bindings: &std::collections::HashMap<String, FinType>) {
    use fin_ast::Stmt;
    match stmt {
        Stmt::Expr(e) | Stmt::Blame(e) | Stmt::Delete(e) => substitute_expr(&mut e.node, bindings),
        Stmt::VarDecl(decl) => {
            if let Some(t) = &mut decl.declared_type {
                substitute_type(t, bindings);
            }
            if let Some(v) = &mut decl.value {
                substitute_expr(&mut v.node, bindings);
            }
        }
        Stmt::Assignment { target, value, .. } => {
            substitute_expr(&mut target.node, bindings);
            substitute_expr(&mut value.node, bindings);
        }
        Stmt::Return(Some(e)) => substitute_expr(&mut e.node, bindings),
        Stmt::Return(None) => {}
        Stmt::If { branches, else_block } => {
            for (cond, body) in branches {
                substitute_expr(&mut cond.node, bindings);
                substitute_block(body, bindings);
            }
            if let Some(b) = else_block {
                substitute_block(b, bindings);
            }
        }
        Stmt::While { cond, body } => {
            substitute_expr(&mut cond.node, bindings);
            substitute_block(body, bindings);
        }
        Stmt::For { init, cond, step, body } => {
            if let Some(i) = init {
                substitute_stmt(&mut i.node, bindings);
            }
            if let Some(c) = cond {
                substitute_expr(&mut c.node, bindings);
            }
            if let Some(s) = step {
                substitute_stmt(&mut s.node, bindings);
            }
            substitute_block(body, bindings);
        }
        Stmt::ForEach { elem_type, iterable, body, .. } => {
            if let Some(t) = elem_type {
                substitute_type(t, bindings);
            }
            substitute_expr(&mut iterable.node, bindings);
            substitute_block(body, bindings);
        }
        Stmt::Break | Stmt::Continue => {}
        Stmt::Block(b) => substitute_block(b, bindings),
        Stmt::Try { body, catch } => {
            substitute_block(body, bindings);
            if let Some((_, catch_body)) = catch {
                substitute_block(catch_body, bindings);
            }
        }
    }
}

pub(crate) fn substitute_expr(expr: &mut fin_ast::Expr, bindings: &std::collections::HashMap<String, FinType>) {
    use fin_ast::Expr;
    match expr {
        Expr::Binary { left, right, .. } => {
            substitute_expr(&mut left.node, bindings);
            substitute_expr(&mut right.node, bindings);
        }
        Expr::Unary { operand, .. } | Expr::Postfix { operand, .. } => substitute_expr(&mut operand.node, bindings),
        Expr::Call { callee, type_args, args } => {
            substitute_expr(&mut callee.node, bindings);
            for t in type_args {
                substitute_type(t, bindings);
            }
            for a in args {
                substitute_expr(&mut a.node, bindings);
            }
        }
        Expr::MemberAccess { object, .. } => substitute_expr(&mut object.node, bindings),
        Expr::ModuleAccess { .. } => {}
        Expr::ArrayIndex { object, index } => {
            substitute_expr(&mut object.node, bindings);
            substitute_expr(&mut index.node, bindings);
        }
        Expr::ArrayLiteral(items) => {
            for i in items {
                substitute_expr(&mut i.node, bindings);
            }
        }
        Expr::StructInstantiation { type_args, fields, .. } => {
            for t in type_args {
                substitute_type(t, bindings);
            }
            for (_, value) in fields {
                substitute_expr(&mut value.node, bindings);
            }
        }
        Expr::AddressOf(inner) | Expr::Dereference(inner) | Expr::New(inner) | Expr::TypeOf(inner) => {
            substitute_expr(&mut inner.node, bindings);
        }
        Expr::Cast { expr: inner, target } => {
            substitute_expr(&mut inner.node, bindings);
            substitute_type(target, bindings);
        }
        Expr::SizeOf(t) => substitute_type(t, bindings),
        Expr::Lambda { params, return_type, body } => {
            for p in params {
                substitute_type(&mut p.ty, bindings);
            }
            if let Some(r) = return_type {
                substitute_type(r, bindings);
            }
            match &mut body.node {
                fin_ast::LambdaBody::Expr(e) => substitute_expr(&mut e.node, bindings),
                fin_ast::LambdaBody::Block(b) => substitute_block(b, bindings),
            }
        }
        Expr::SpecialCall { args, .. } | Expr::MacroCall { args, .. } => {
            for a in args {
                substitute_expr(&mut a.node, bindings);
            }
        }
        Expr::IntLiteral(_)
        | Expr::LongLiteral(_)
        | Expr::FloatLiteral(_)
        | Expr::DoubleLiteral(_)
        | Expr::BoolLiteral(_)
        | Expr::CharLiteral(_)
        | Expr::StringLiteral(_)
        | Expr::Null
        | Expr::Identifier(_)
        | Expr::SelfExpr
        | Expr::SuperExpr => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fin_ast::Visibility;

    fn spanned(node: TypeNode) -> PType {
        Spanned { node, span: fin_ast::Span::unknown() }
    }

    #[test]
    fn substitutes_bound_type_parameter_in_a_field() {
        let mut field = FieldDecl {
            name: "value".into(),
            ty: spanned(TypeNode::Named("T".into())),
            default: None,
            visibility: Visibility::Public,
        };
        let mut bindings = std::collections::HashMap::new();
        bindings.insert("T".to_string(), FinType::int());
        substitute_fields(std::slice::from_mut(&mut field), &bindings);
        assert_eq!(field.ty.node, TypeNode::Named("int".into()));
    }

    #[test]
    fn leaves_unbound_names_untouched() {
        let mut ty = spanned(TypeNode::Named("U".into()));
        let bindings = std::collections::HashMap::new();
        substitute_type(&mut ty, &bindings);
        assert_eq!(ty.node, TypeNode::Named("U".into()));
    }
}
