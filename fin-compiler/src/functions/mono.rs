//! MONO function instantiation: the same clone-substitute-rename-compile
//! recipe `structs::mono` uses, applied to a standalone generic function
//! template rather than a struct declaration.

use fin_ast::FunctionDecl;
use fin_diagnostics::CompileResult;

use crate::compiler::Compiler;
use crate::fin_type::FinType;

/// Returns the mangled name of the instantiated concrete function,
/// compiling it on first use and reusing the cached result afterward.
pub fn instantiate_function(compiler: &mut Compiler, template_key: &str, args: &[FinType], span: &fin_ast::Span) -> CompileResult<String> {
    let signature_key = format!("{template_key}_{}", args.iter().map(FinType::signature).collect::<Vec<_>>().join("_"));

    if compiler.registries.mono_function_cache.contains_key(&signature_key) {
        return Ok(signature_key);
    }

    let template = compiler
        .registries
        .function_templates
        .get(template_key)
        .cloned()
        .ok_or_else(|| compiler.error(span, format!("'{template_key}' is not a known generic function template")))?;

    if args.len() > template.type_params.len() {
        return Err(compiler.error(
            span,
            format!("'{template_key}' expects at most {} type arguments, got {}", template.type_params.len(), args.len()),
        ));
    }

    let mut bindings = std::collections::HashMap::new();
    for (param, concrete) in template.type_params.iter().zip(args.iter()) {
        bindings.insert(param.name.clone(), concrete.clone());
    }

    let mut concrete_decl: FunctionDecl = template;
    concrete_decl.name = signature_key.clone();
    concrete_decl.type_params.clear();
    crate::structs::mono::substitute_function(&mut concrete_decl, &bindings);

    let saved_bindings = std::mem::replace(&mut compiler.current_type_bindings, bindings);
    let result = crate::functions::lowering::compile_instantiated_function(compiler, &concrete_decl, span);
    compiler.current_type_bindings = saved_bindings;
    let function = result?;

    compiler.registries.mono_function_cache.insert(signature_key.clone(), function);
    Ok(signature_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fin_ast::{Block, TypeParam, Visibility};

    fn template() -> FunctionDecl {
        FunctionDecl {
            name: "identity".into(),
            type_params: vec![TypeParam { name: "T".into(), constraint: None }],
            params: vec![],
            return_type: None,
            body: Block { statements: vec![] },
            visibility: Visibility::Public,
            is_static: true,
            is_variadic: false,
            attributes: vec![],
        }
    }

    #[test]
    fn signature_key_carries_the_concrete_argument_signature() {
        let context = inkwell::context::Context::create();
        let mut compiler = Compiler::new(&context, "m", crate::options::CompileOptions::new("/p"), std::path::PathBuf::from("/p/a.fin"));
        compiler.registries.function_templates.insert("identity".into(), template());
        let name = instantiate_function(&mut compiler, "identity", &[FinType::int()], &fin_ast::Span::unknown()).unwrap();
        assert_eq!(name, "identity_int");
    }

    #[test]
    fn unknown_template_is_an_error() {
        let context = inkwell::context::Context::create();
        let mut compiler = Compiler::new(&context, "m", crate::options::CompileOptions::new("/p"), std::path::PathBuf::from("/p/a.fin"));
        assert!(instantiate_function(&mut compiler, "nope", &[], &fin_ast::Span::unknown()).is_err());
    }
}
