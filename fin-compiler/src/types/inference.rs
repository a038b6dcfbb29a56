use fin_ast::{Expr, PExpr};
use fin_diagnostics::CompileResult;

use crate::compiler::Compiler;
use crate::fin_type::FinType;

/// Best-effort `FinType` for a call argument, used by MONO call-site
/// inference to recover what a template's type parameters should bind to.
/// Falls back to inferring from the produced LLVM value's shape only when
/// none of the structural cases below apply.
pub fn get_arg_fin_type(compiler: &mut Compiler, expr: &PExpr) -> CompileResult<FinType> {
    match &expr.node {
        Expr::Identifier(name) => {
            if let Some(sym) = compiler.scope.resolve(name) {
                return Ok(sym.fin_type.clone());
            }
            Err(compiler.error(&expr.span, format!("unknown identifier '{name}'")))
        }
        Expr::SelfExpr => {
            let current = compiler
                .current_struct
                .clone()
                .ok_or_else(|| compiler.error(&expr.span, "'self' used outside of a method"))?;
            Ok(FinType::Struct { name: current, generic_args: vec![] })
        }
        Expr::AddressOf(inner) => Ok(FinType::Pointer(Box::new(get_arg_fin_type(compiler, inner)?))),
        Expr::Dereference(inner) => match get_arg_fin_type(compiler, inner)? {
            FinType::Pointer(pointee) => Ok(*pointee),
            other => Ok(other),
        },
        Expr::MemberAccess { object, member } => {
            let object_ty = get_arg_fin_type(compiler, object)?;
            member_field_type(compiler, &object_ty, member, &expr.span)
        }
        Expr::ArrayIndex { object, .. } => match get_arg_fin_type(compiler, object)? {
            FinType::Struct { name, generic_args } if name == "Collection" => {
                generic_args.into_iter().next().ok_or_else(|| compiler.error(&expr.span, "Collection missing element type"))
            }
            FinType::Pointer(inner) => Ok(*inner),
            FinType::Array { elem, .. } => Ok(*elem),
            other => Ok(other),
        },
        Expr::IntLiteral(_) => Ok(FinType::int()),
        Expr::LongLiteral(_) => Ok(FinType::Primitive(crate::fin_type::Primitive::Long)),
        Expr::FloatLiteral(_) => Ok(FinType::Primitive(crate::fin_type::Primitive::Float)),
        Expr::DoubleLiteral(_) => Ok(FinType::Primitive(crate::fin_type::Primitive::Double)),
        Expr::BoolLiteral(_) => Ok(FinType::Primitive(crate::fin_type::Primitive::Bool)),
        Expr::CharLiteral(_) => Ok(FinType::Primitive(crate::fin_type::Primitive::Char)),
        Expr::StringLiteral(_) => Ok(FinType::string()),
        Expr::Null => Ok(FinType::Pointer(Box::new(FinType::void()))),
        Expr::StructInstantiation { name, type_args, .. } => {
            let local = compiler.mangled(name);
            let resolved = if compiler.registries.struct_types.contains_key(&local) { local } else { name.clone() };
            let mut generic_args = Vec::with_capacity(type_args.len());
            for a in type_args {
                generic_args.push(crate::types::ast_to_fin_type(compiler, a)?);
            }
            Ok(FinType::Struct { name: resolved, generic_args })
        }
        Expr::Cast { target, .. } => crate::types::ast_to_fin_type(compiler, target),
        Expr::New(inner) => get_arg_fin_type(compiler, inner),
        Expr::Call { callee, .. } => infer_call_return(compiler, callee, &expr.span),
        _ => {
            // Nothing structural applies: lower the expression and infer
            // the FinType from the LLVM value's own shape as a last
            // resort (e.g. arithmetic on mixed literals).
            let value = crate::expressions::lower_expr(compiler, expr)?;
            Ok(crate::expressions::llvm_value_fin_type(&value.value))
        }
    }
}

fn member_field_type(compiler: &mut Compiler, object_ty: &FinType, member: &str, span: &fin_ast::Span) -> CompileResult<FinType> {
    if member == "length" && matches!(object_ty, FinType::Array { .. }) {
        return Ok(FinType::Primitive(crate::fin_type::Primitive::Long));
    }
    let struct_name = match object_ty {
        FinType::Struct { name, .. } => name.clone(),
        FinType::Pointer(inner) => match inner.as_ref() {
            FinType::Struct { name, .. } => name.clone(),
            _ => return Ok(FinType::Any),
        },
        _ => return Ok(FinType::Any),
    };
    if member == "length" {
        return Ok(FinType::Primitive(crate::fin_type::Primitive::Long));
    }
    let meta = compiler
        .registries
        .struct_field_meta
        .get(&struct_name)
        .and_then(|fields| fields.get(member))
        .cloned();
    match meta {
        Some(meta) => {
            // Unbox a field declared with the struct's own generic
            // parameter through the instance's concrete generic_args.
            if let FinType::GenericParam(param) = &meta.source_type {
                if let FinType::Struct { generic_args, .. } = object_ty {
                    let params = compiler.registries.struct_generic_params.get(&struct_name).cloned().unwrap_or_default();
                    if let Some(pos) = params.iter().position(|p| p == param) {
                        if let Some(concrete) = generic_args.get(pos) {
                            return Ok(concrete.clone());
                        }
                    }
                }
            }
            Ok(meta.source_type)
        }
        None => Err(compiler.error(span, format!("'{struct_name}' has no field '{member}'"))),
    }
}

fn infer_call_return(compiler: &mut Compiler, callee: &PExpr, span: &fin_ast::Span) -> CompileResult<FinType> {
    if let Expr::Identifier(name) = &callee.node {
        let local = compiler.mangled(name);
        if let Some(ret) = compiler.registries.function_return_types.get(&local).cloned() {
            return Ok(ret);
        }
        if let Some(ret) = compiler.registries.function_return_types.get(name).cloned() {
            return Ok(ret);
        }
    }
    let _ = span;
    Ok(FinType::void())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fin_ast::Spanned;
    use inkwell::context::Context;
    use std::path::PathBuf;

    fn lit(node: Expr) -> PExpr {
        Spanned { node, span: fin_ast::Span::unknown() }
    }

    #[test]
    fn int_literal_infers_int() {
        let context = Context::create();
        let mut compiler = Compiler::new(&context, "m", crate::options::CompileOptions::new("/p"), PathBuf::from("/p/a.fin"));
        assert_eq!(get_arg_fin_type(&mut compiler, &lit(Expr::IntLiteral(1))).unwrap(), FinType::int());
    }

    #[test]
    fn address_of_wraps_inner_type_in_pointer() {
        let context = Context::create();
        let mut compiler = Compiler::new(&context, "m", crate::options::CompileOptions::new("/p"), PathBuf::from("/p/a.fin"));
        let expr = lit(Expr::AddressOf(Box::new(lit(Expr::IntLiteral(1)))));
        assert_eq!(get_arg_fin_type(&mut compiler, &expr).unwrap(), FinType::int().pointer_to());
    }
}
