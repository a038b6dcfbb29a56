//! `FinType`: the compiler's high-level semantic type representation
//! representation. Independent of LLVM, carries a deterministic 64-bit type
//! ID derived from FNV-1a over a canonical signature string.

use std::fmt;

/// The primitive kinds `FinType::Primitive` can name, with their bit width
/// baked in so `fin_type_to_llvm` never has to re-derive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Int,
    Long,
    Float,
    Double,
    Bool,
    Char,
    String,
    Void,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::Bool => "bool",
            Primitive::Char => "char",
            Primitive::String => "string",
            Primitive::Void => "void",
        }
    }

    pub fn bit_width(self) -> u32 {
        match self {
            Primitive::Int => 32,
            Primitive::Long => 64,
            Primitive::Float => 32,
            Primitive::Double => 64,
            Primitive::Bool => 1,
            Primitive::Char => 8,
            // `string` is a pointer to i8, not a scalar; width is moot.
            Primitive::String => 8,
            Primitive::Void => 0,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "int" => Primitive::Int,
            "long" => Primitive::Long,
            "float" => Primitive::Float,
            "double" => Primitive::Double,
            "bool" => Primitive::Bool,
            "char" => Primitive::Char,
            "string" => Primitive::String,
            "void" | "noret" => Primitive::Void,
            _ => return None,
        })
    }
}

/// Semantic type: the middle representation between the AST's type nodes
/// and LLVM's concrete types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FinType {
    Primitive(Primitive),
    Pointer(Box<FinType>),
    /// Also represents interfaces (the struct name is recorded in the
    /// `interfaces` registry, not distinguished in the type itself) and
    /// `Collection<T>` (`name == "Collection"`).
    Struct {
        name: String,
        generic_args: Vec<FinType>,
    },
    /// A fixed-size static array, `[T; N]`. Carries its element count so
    /// `.length` and literal-index bounds checks can be resolved at
    /// compile time; an array with no statically-known size decays to
    /// `Pointer` instead (see `types::ast_to_fin_type`).
    Array {
        elem: Box<FinType>,
        size: u64,
    },
    GenericParam(String),
    Any,
}

impl FinType {
    pub fn void() -> Self {
        FinType::Primitive(Primitive::Void)
    }

    pub fn int() -> Self {
        FinType::Primitive(Primitive::Int)
    }

    pub fn string() -> Self {
        FinType::Primitive(Primitive::String)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, FinType::Primitive(Primitive::Void))
    }

    pub fn pointer_to(self) -> Self {
        FinType::Pointer(Box::new(self))
    }

    pub fn collection(elem: FinType) -> Self {
        FinType::Struct {
            name: "Collection".to_string(),
            generic_args: vec![elem],
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, FinType::Struct { name, .. } if name == "Collection")
    }

    /// Canonical textual signature. Two structurally-equal `FinType`s must
    /// produce byte-identical signatures (and therefore identical type
    /// IDs); this is what makes `typeof` stable across compilations of the
    /// same program.
    pub fn signature(&self) -> String {
        match self {
            FinType::Primitive(p) => p.name().to_string(),
            FinType::Pointer(inner) => format!("&{}", inner.signature()),
            FinType::Struct { name, generic_args } => {
                if generic_args.is_empty() {
                    name.clone()
                } else {
                    let args: Vec<String> = generic_args.iter().map(FinType::signature).collect();
                    format!("{name}<{}>", args.join(","))
                }
            }
            FinType::Array { elem, size } => format!("[{};{size}]", elem.signature()),
            FinType::GenericParam(name) => format!("${name}"),
            FinType::Any => "any".to_string(),
        }
    }

    /// FNV-1a-64 of `self.signature()`. Deterministic across runs and
    /// across machines since it only depends on the signature bytes.
    pub fn type_id(&self) -> u64 {
        fnv1a_64(self.signature().as_bytes())
    }
}

impl fmt::Display for FinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}

/// FNV-1a, 64-bit variant. Offset basis and prime are the standard
/// constants; this is not a cryptographic hash, only a stable fingerprint.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET_BASIS;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_id_is_fnv1a_of_signature() {
        let t = FinType::int();
        assert_eq!(t.type_id(), fnv1a_64(b"int"));
    }

    #[test]
    fn structurally_equal_types_share_an_id() {
        let a = FinType::Struct {
            name: "lib_math__Vector".into(),
            generic_args: vec![FinType::int()],
        };
        let b = FinType::Struct {
            name: "lib_math__Vector".into(),
            generic_args: vec![FinType::int()],
        };
        assert_eq!(a.type_id(), b.type_id());
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_generic_args_change_the_signature() {
        let box_int = FinType::Struct {
            name: "Box".into(),
            generic_args: vec![FinType::int()],
        };
        let box_long = FinType::Struct {
            name: "Box".into(),
            generic_args: vec![FinType::Primitive(Primitive::Long)],
        };
        assert_ne!(box_int.signature(), box_long.signature());
        assert_ne!(box_int.type_id(), box_long.type_id());
    }

    #[test]
    fn known_fnv1a_vector() {
        // Empty-string FNV-1a-64 offset basis is a well-known test vector.
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
    }
}
