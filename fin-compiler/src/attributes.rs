//! Reads the handful of attributes lowering cares about directly, rather
//! than going through the mangler or the usual declare/compile pipeline.

use fin_ast::Attribute;
use inkwell::module::Linkage;

/// `@llvm_name("puts")` on an `extern` or plain function bypasses the
/// mangler entirely; the function is declared and called under exactly
/// this string.
pub fn llvm_name_override(attrs: &[Attribute]) -> Option<&str> {
    Attribute::find(attrs, "llvm_name")?.value.as_deref()
}

/// `@linkage("internal")` maps onto the matching LLVM linkage. Unknown
/// values are ignored rather than rejected, since a new linkage kind
/// showing up in source shouldn't be a hard error at this layer.
pub fn linkage_override(attrs: &[Attribute]) -> Option<Linkage> {
    let value = Attribute::find(attrs, "linkage")?.value.as_deref()?;
    match value {
        "external" => Some(Linkage::External),
        "internal" => Some(Linkage::Internal),
        "weak" => Some(Linkage::WeakAny),
        "private" => Some(Linkage::Private),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(name: &str, value: &str) -> Attribute {
        Attribute { name: name.into(), value: Some(value.into()) }
    }

    #[test]
    fn finds_llvm_name_by_attribute_name() {
        let attrs = vec![attr("llvm_name", "puts")];
        assert_eq!(llvm_name_override(&attrs), Some("puts"));
    }

    #[test]
    fn unknown_linkage_value_is_ignored() {
        let attrs = vec![attr("linkage", "bogus")];
        assert_eq!(linkage_override(&attrs), None);
    }

    #[test]
    fn absent_attribute_is_none() {
        assert_eq!(llvm_name_override(&[]), None);
    }
}
