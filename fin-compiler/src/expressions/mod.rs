//! Expression lowering: literals, operators (with overload resolution),
//! calls, boxing/unboxing, `Any`, and the `std_conv` conversion matrix.

pub mod boxing;
pub mod calls;
pub mod literals;
pub mod operators;
pub mod safety;
pub mod special;

use fin_ast::{Expr, PExpr};
use fin_diagnostics::CompileResult;
use inkwell::values::BasicValueEnum;

use crate::compiler::Compiler;
use crate::fin_type::FinType;
use crate::structs::member_access::AccessMode;

/// The result of lowering any expression: the LLVM value plus the
/// semantic type the rest of the pipeline reasons about.
#[derive(Debug, Clone)]
pub struct Lowered<'ctx> {
    pub value: BasicValueEnum<'ctx>,
    pub fin_type: FinType,
}

impl<'ctx> Lowered<'ctx> {
    pub fn new(value: BasicValueEnum<'ctx>, fin_type: FinType) -> Self {
        Self { value, fin_type }
    }
}

pub fn lower_expr<'ctx>(compiler: &mut Compiler<'ctx>, expr: &PExpr) -> CompileResult<Lowered<'ctx>> {
    match &expr.node {
        Expr::IntLiteral(_)
        | Expr::LongLiteral(_)
        | Expr::FloatLiteral(_)
        | Expr::DoubleLiteral(_)
        | Expr::BoolLiteral(_)
        | Expr::CharLiteral(_)
        | Expr::StringLiteral(_)
        | Expr::Null => literals::lower_literal(compiler, expr),

        Expr::Identifier(name) => load_variable(compiler, name, &expr.span),
        Expr::SelfExpr => load_variable(compiler, "self", &expr.span),
        Expr::SuperExpr => Err(compiler.error(&expr.span, "'super' is only valid as a call or member-access receiver")),

        Expr::Binary { left, op, right } => operators::lower_binary(compiler, left, *op, right, &expr.span),
        Expr::Unary { op, operand } => operators::lower_unary(compiler, *op, operand, &expr.span),
        Expr::Postfix { operand, op } => operators::lower_postfix(compiler, operand, *op, &expr.span),

        Expr::Call { .. } => calls::lower_call(compiler, expr),
        Expr::MemberAccess { object, member } => {
            if let Expr::Identifier(obj_name) = &object.node {
                if let Some((value, enum_key)) = enum_member_value(compiler, obj_name, member) {
                    let int_ty = compiler.registries.enum_types[&enum_key];
                    let iv = int_ty.const_int(value as u64, true);
                    return Ok(Lowered::new(iv.into(), FinType::Struct { name: enum_key, generic_args: vec![] }));
                }
            }
            let access = crate::structs::member_access::compile_member_access(compiler, object, member, AccessMode::RValue, &expr.span)?;
            Ok(Lowered::new(access.value, access.fin_type))
        }
        Expr::ModuleAccess { module, member } => {
            let mangled = match compiler.loader.aliases.get(module).cloned() {
                Some(path) => compiler.mangled_in(&path, member),
                None => compiler.mangled_in(&compiler.current_file.clone(), member),
            };
            if let Some(sym) = compiler.scope.resolve(&mangled).cloned() {
                return Ok(Lowered::new(sym.value, sym.fin_type));
            }
            Err(compiler.error(&expr.span, format!("unknown module member '{member}'")))
        }
        Expr::ArrayIndex { object, index } => calls::lower_index(compiler, object, index, &expr.span),
        Expr::ArrayLiteral(items) => literals::lower_array_literal(compiler, items, &expr.span),
        Expr::StructInstantiation { name, type_args, fields } => calls::lower_struct_instantiation(compiler, name, type_args, fields, &expr.span),

        Expr::AddressOf(inner) => lower_address_of(compiler, inner, &expr.span),
        Expr::Dereference(inner) => {
            let lowered = lower_expr(compiler, inner)?;
            let FinType::Pointer(pointee) = lowered.fin_type.clone() else {
                return Err(compiler.error(&expr.span, "cannot dereference a non-pointer value"));
            };
            safety::check_non_null(compiler, lowered.value.into_pointer_value(), &expr.span)?;
            let llvm_ty = crate::types::fin_type_to_llvm(compiler, &pointee)?;
            let loaded = compiler
                .builder
                .build_load(llvm_ty, lowered.value.into_pointer_value(), "deref")
                .map_err(|e| compiler.error(&expr.span, format!("failed to dereference: {e}")))?;
            Ok(Lowered::new(loaded, *pointee))
        }
        Expr::Cast { expr: inner, target } => {
            let lowered = lower_expr(compiler, inner)?;
            let target_fin = crate::types::ast_to_fin_type(compiler, target)?;
            boxing::std_conv(compiler, &lowered, &target_fin, &expr.span)
        }
        Expr::TypeOf(inner) => boxing::lower_typeof(compiler, inner, &expr.span),
        Expr::SizeOf(ty) => {
            let llvm_ty = crate::types::convert_type(compiler, ty)?;
            let size = boxing::size_of_type(compiler, llvm_ty);
            Ok(Lowered::new(size.into(), FinType::Primitive(crate::fin_type::Primitive::Long)))
        }
        Expr::New(inner) => calls::lower_new(compiler, inner, &expr.span),
        Expr::Lambda { .. } => Err(compiler.error(&expr.span, "closures with captures are not supported")),
        Expr::SpecialCall { name, args } => special::lower_special_call(compiler, name, args, &expr.span),
        Expr::MacroCall { name, args } => special::lower_macro_call(compiler, name, args, &expr.span),
    }
}

/// Looks up `EnumName.Member` as a constant, trying the bare name (a
/// same-file enum), the mangled name, and an imported alias in turn.
/// Returns the member's integer value and the key its LLVM `IntType` is
/// registered under.
fn enum_member_value(compiler: &Compiler, name: &str, member: &str) -> Option<(i64, String)> {
    for key in [name.to_string(), compiler.mangled(name)] {
        if let Some(&value) = compiler.registries.enum_members.get(&key).and_then(|m| m.get(member)) {
            return Some((value, key));
        }
    }
    let aliased = compiler.scope.resolve_type_alias(name)?.to_string();
    let value = *compiler.registries.enum_members.get(&aliased)?.get(member)?;
    Some((value, aliased))
}

/// Every scope-bound symbol is an alloca; reading it means loading
/// through its storage type (see `types::storage_llvm_type`). `self` is no
/// exception — bound the same way as any other parameter — so this is also
/// how `super.*`/`super(...)` recover the real `self` pointer.
pub(crate) fn load_variable<'ctx>(compiler: &mut Compiler<'ctx>, name: &str, span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let sym = compiler.scope.resolve(name).cloned().ok_or_else(|| compiler.error(span, format!("unknown identifier '{name}'")))?;
    let ptr = sym.value.into_pointer_value();
    let storage_ty = crate::types::storage_llvm_type(compiler, &sym.fin_type)?;
    let loaded = compiler
        .builder
        .build_load(storage_ty, ptr, name)
        .map_err(|e| compiler.error(span, format!("failed to load '{name}': {e}")))?;
    Ok(Lowered::new(loaded, sym.fin_type))
}

/// `&expr`: resolves the l-value pointer for identifiers, `self`, member
/// access, and indexing without loading through it.
fn lower_address_of<'ctx>(compiler: &mut Compiler<'ctx>, inner: &PExpr, span: &fin_ast::Span) -> CompileResult<Lowered<'ctx>> {
    let fin_type = get_arg_fin_type_of(compiler, inner)?;
    let ptr = lvalue_pointer(compiler, inner, span)?;
    Ok(Lowered::new(ptr.into(), fin_type.pointer_to()))
}

/// Resolves the raw l-value pointer behind an addressable expression
/// (identifier, `self`, module access, member access, indexing), without
/// loading through it. Shared by `&expr` and by `++`/`--`/compound
/// assignment, which all need to read-modify-write the same storage slot.
pub(crate) fn lvalue_pointer<'ctx>(compiler: &mut Compiler<'ctx>, expr: &PExpr, span: &fin_ast::Span) -> CompileResult<inkwell::values::PointerValue<'ctx>> {
    match &expr.node {
        Expr::Identifier(name) | Expr::ModuleAccess { member: name, .. } => {
            let sym = compiler.scope.resolve(name).cloned().ok_or_else(|| compiler.error(span, format!("unknown identifier '{name}'")))?;
            Ok(sym.value.into_pointer_value())
        }
        Expr::SelfExpr => {
            let sym = compiler.scope.resolve("self").cloned().ok_or_else(|| compiler.error(span, "'self' used outside of a method"))?;
            Ok(sym.value.into_pointer_value())
        }
        Expr::MemberAccess { object, member } => {
            let access = crate::structs::member_access::compile_member_access(compiler, object, member, AccessMode::LValue, span)?;
            access.lvalue.ok_or_else(|| compiler.error(span, "cannot take the address of this field"))
        }
        Expr::ArrayIndex { object, index } => Ok(calls::lower_index_lvalue(compiler, object, index, span)?.0),
        _ => Err(compiler.error(span, "this expression has no address")),
    }
}

/// `get_arg_fin_type` re-exported under the name the operator/statement
/// lowering modules reach for; kept as a thin wrapper so callers inside
/// `expressions` don't need to know the type lives in `crate::types`.
pub(crate) fn get_arg_fin_type_of(compiler: &mut Compiler, expr: &PExpr) -> CompileResult<FinType> {
    crate::types::get_arg_fin_type(compiler, expr)
}

/// Infers a `FinType` from an LLVM value's own shape — the last-resort
/// fallback `get_arg_fin_type` reaches for when nothing structural in the
/// source expression pins down the type.
pub fn llvm_value_fin_type(value: &BasicValueEnum) -> FinType {
    use crate::fin_type::Primitive;
    match value {
        BasicValueEnum::IntValue(v) => match v.get_type().get_bit_width() {
            1 => FinType::Primitive(Primitive::Bool),
            8 => FinType::Primitive(Primitive::Char),
            64 => FinType::Primitive(Primitive::Long),
            _ => FinType::int(),
        },
        BasicValueEnum::FloatValue(_) => FinType::Primitive(Primitive::Double),
        BasicValueEnum::PointerValue(_) => FinType::Pointer(Box::new(FinType::void())),
        _ => FinType::Any,
    }
}
