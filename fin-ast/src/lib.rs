//! Abstract syntax tree produced by the Fin lexer/parser (out of scope here)
//! and consumed by the compiler core.
//!
//! Every node that can be the target of a diagnostic carries a [`Span`] so
//! the error sink can always report `(file, line, column)`.

use serde::{Deserialize, Serialize};

/// Source location of a single AST node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn unknown() -> Self {
        Self {
            file: String::new(),
            line: 0,
            column: 0,
        }
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Wraps a node kind together with the span it was parsed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

pub type PExpr = Box<Spanned<Expr>>;
pub type PStmt = Box<Spanned<Stmt>>;
pub type PType = Box<Spanned<TypeNode>>;

/// Root of the AST: an ordered list of top-level declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub file: String,
    pub items: Vec<Spanned<TopLevel>>,
}

/// A single attribute attached to a declaration, e.g. `@llvm_name("puts")`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: Option<String>,
}

impl Attribute {
    pub fn find<'a>(attrs: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
        attrs.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn is_public(self) -> bool {
        matches!(self, Visibility::Public)
    }
}

/// Markers that force a generic declaration into the `ERASED` compilation
/// policy instead of `MONO`. `Any` additionally selects the fat-pointer
/// erasure representation (`{ptr, type_id}`) rather than a bare `ptr-to-byte`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErasureMarker {
    Castable,
    Any,
    Object,
    VoidPointer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeConstraint {
    Marker(ErasureMarker),
    Type(PType),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeParam {
    pub name: String,
    pub constraint: Option<TypeConstraint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: PType,
}

/// Type-level AST nodes (source shape, pre-lowering).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeNode {
    /// A bare identifier: `int`, `T`, `Vector`, `Self`.
    Named(String),
    /// A module-qualified type: `math.Vector`.
    ModuleQualified { module: String, name: String },
    /// A generic instantiation: `Box<int>`.
    Generic { base: String, args: Vec<PType> },
    /// `&T`
    Pointer(PType),
    /// `[T; N]` (size `None` means a dynamic `Collection<T>`).
    Array { elem: PType, size: Option<u64> },
    /// `function<[T1, T2], R>`
    Function { params: Vec<PType>, ret: PType },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostfixOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// An operator symbol a struct can overload. Mirrors `BinaryOp` but kept
/// distinct because only a subset of operators are overloadable and the
/// mangled suffix (`__op_add`, ...) is derived from this enum, not from the
/// expression-level operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorSymbol {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Lt,
    Gt,
    Index,
}

impl OperatorSymbol {
    /// Suffix used when mangling the generated function name, e.g.
    /// `Vector__op_add`.
    pub fn mangled_suffix(self) -> &'static str {
        match self {
            OperatorSymbol::Add => "op_add",
            OperatorSymbol::Sub => "op_sub",
            OperatorSymbol::Mul => "op_mul",
            OperatorSymbol::Div => "op_div",
            OperatorSymbol::Mod => "op_mod",
            OperatorSymbol::Eq => "op_eq",
            OperatorSymbol::Lt => "op_lt",
            OperatorSymbol::Gt => "op_gt",
            OperatorSymbol::Index => "op_index",
        }
    }

    pub fn from_binary(op: BinaryOp) -> Option<Self> {
        match op {
            BinaryOp::Add => Some(Self::Add),
            BinaryOp::Sub => Some(Self::Sub),
            BinaryOp::Mul => Some(Self::Mul),
            BinaryOp::Div => Some(Self::Div),
            BinaryOp::Mod => Some(Self::Mod),
            BinaryOp::Eq => Some(Self::Eq),
            BinaryOp::Lt => Some(Self::Lt),
            BinaryOp::Gt => Some(Self::Gt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    IntLiteral(i32),
    LongLiteral(i64),
    FloatLiteral(f32),
    DoubleLiteral(f64),
    BoolLiteral(bool),
    CharLiteral(u8),
    StringLiteral(String),
    Null,

    Identifier(String),
    SelfExpr,
    /// Bare `super`, only legal as the receiver of a call or member access.
    SuperExpr,

    Binary {
        left: PExpr,
        op: BinaryOp,
        right: PExpr,
    },
    Unary {
        op: UnaryOp,
        operand: PExpr,
    },
    Postfix {
        operand: PExpr,
        op: PostfixOp,
    },

    Call {
        callee: PExpr,
        type_args: Vec<PType>,
        args: Vec<PExpr>,
    },
    MemberAccess {
        object: PExpr,
        member: String,
    },
    ModuleAccess {
        module: String,
        member: String,
    },
    ArrayIndex {
        object: PExpr,
        index: PExpr,
    },
    ArrayLiteral(Vec<PExpr>),
    StructInstantiation {
        name: String,
        type_args: Vec<PType>,
        fields: Vec<(String, PExpr)>,
    },

    AddressOf(PExpr),
    Dereference(PExpr),

    Cast {
        expr: PExpr,
        target: PType,
    },
    TypeOf(PExpr),
    SizeOf(PType),

    New(PExpr),

    Lambda {
        params: Vec<Param>,
        return_type: Option<PType>,
        body: Box<Spanned<LambdaBody>>,
    },

    /// `@name(expr)`, `@hasattr(expr, "field")`, `@unsafe_unbox(expr)`, ...
    SpecialCall {
        name: String,
        args: Vec<PExpr>,
    },

    /// Invocation of a user-defined `macro`: textual AST substitution, then
    /// inline compilation of the result.
    MacroCall {
        name: String,
        args: Vec<PExpr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LambdaBody {
    Expr(PExpr),
    Block(Block),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<PStmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub declared_type: Option<PType>,
    pub value: Option<PExpr>,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Expr(PExpr),
    VarDecl(VarDecl),
    Assignment {
        target: PExpr,
        op: AssignOp,
        value: PExpr,
    },
    Return(Option<PExpr>),
    If {
        branches: Vec<(PExpr, Block)>,
        else_block: Option<Block>,
    },
    While {
        cond: PExpr,
        body: Block,
    },
    For {
        init: Option<PStmt>,
        cond: Option<PExpr>,
        step: Option<PStmt>,
        body: Block,
    },
    ForEach {
        var: String,
        elem_type: Option<PType>,
        iterable: PExpr,
        body: Block,
    },
    Break,
    Continue,
    Block(Block),
    Try {
        body: Block,
        catch: Option<(Option<String>, Block)>,
    },
    /// `blame expr;` — raises a runtime panic using `expr.error_msg` (or the
    /// stringified expression) as the message.
    Blame(PExpr),
    Delete(PExpr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: PType,
    pub default: Option<PExpr>,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub params: Vec<Param>,
    pub return_type: Option<PType>,
    pub body: Block,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_variadic: bool,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructorDecl {
    pub params: Vec<Param>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorDecl {
    pub symbol: OperatorSymbol,
    pub rhs: Param,
    pub return_type: Option<PType>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestructorDecl {
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,
    pub type_params: Vec<TypeParam>,
    pub parents: Vec<PType>,
    pub fields: Vec<FieldDecl>,
    pub constructors: Vec<ConstructorDecl>,
    pub operators: Vec<OperatorDecl>,
    pub destructor: Option<DestructorDecl>,
    pub methods: Vec<FunctionDecl>,
    pub visibility: Visibility,
    pub attributes: Vec<Attribute>,
    /// `true` when this declaration is an `interface` rather than a
    /// concrete `struct`. Interfaces only carry method signatures in
    /// `methods` (empty bodies) and no fields/constructors.
    pub is_interface: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumMember {
    pub name: String,
    pub value: Option<PExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    pub backing_type: Option<PType>,
    pub members: Vec<EnumMember>,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImportSource {
    /// `import "./vector.fin";`
    Path(String),
    /// `import { Vector, dot } from math;`
    Package { package: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportTarget {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportDecl {
    pub source: ImportSource,
    pub targets: Option<Vec<ImportTarget>>,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<PType>,
    pub is_variadic: bool,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TopLevel {
    Variable(VarDecl),
    Function(FunctionDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    Macro(MacroDecl),
    Special(SpecialDecl),
    Import(ImportDecl),
    Extern(ExternDecl),
}

impl TopLevel {
    pub fn name(&self) -> &str {
        match self {
            TopLevel::Variable(v) => &v.name,
            TopLevel::Function(f) => &f.name,
            TopLevel::Struct(s) => &s.name,
            TopLevel::Enum(e) => &e.name,
            TopLevel::Macro(m) => &m.name,
            TopLevel::Special(s) => &s.name,
            TopLevel::Import(_) => "",
            TopLevel::Extern(e) => &e.name,
        }
    }

    pub fn visibility(&self) -> Visibility {
        match self {
            TopLevel::Variable(v) => v.visibility,
            TopLevel::Function(f) => f.visibility,
            TopLevel::Struct(s) => s.visibility,
            TopLevel::Enum(e) => e.visibility,
            TopLevel::Macro(_) | TopLevel::Special(_) | TopLevel::Import(_) => Visibility::Private,
            TopLevel::Extern(_) => Visibility::Public,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp<T>(node: T) -> Spanned<T> {
        Spanned::new(node, Span::unknown())
    }

    #[test]
    fn program_round_trips_through_json() {
        let program = Program {
            file: "main.fin".into(),
            items: vec![sp(TopLevel::Function(FunctionDecl {
                name: "main".into(),
                type_params: vec![],
                params: vec![],
                return_type: Some(Box::new(sp(TypeNode::Named("int".into())))),
                body: Block { statements: vec![] },
                visibility: Visibility::Public,
                is_static: false,
                is_variadic: false,
                attributes: vec![],
            }))],
        };

        let json = serde_json::to_string(&program).expect("serialize");
        let back: Program = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(program, back);
    }

    #[test]
    fn operator_symbol_maps_to_mangled_suffix() {
        assert_eq!(OperatorSymbol::Add.mangled_suffix(), "op_add");
        assert_eq!(OperatorSymbol::from_binary(BinaryOp::Mul), Some(OperatorSymbol::Mul));
        assert_eq!(OperatorSymbol::from_binary(BinaryOp::And), None);
    }
}
