use fin_ast::{StructDecl, TypeConstraint};

use crate::registry::Mode;
use crate::types::conversion::constraint_is_any;

/// `STANDARD` for non-generic declarations, `ERASED` when at least one
/// type parameter carries a reflective/erasure marker constraint, `MONO`
/// otherwise (generic with no erasure marker, compiled per call site).
pub fn classify_mode(decl: &StructDecl) -> Mode {
    if decl.type_params.is_empty() {
        return Mode::Standard;
    }
    let has_erasure_marker = decl.type_params.iter().any(|p| matches!(&p.constraint, Some(TypeConstraint::Marker(_))));
    if has_erasure_marker {
        Mode::Erased
    } else {
        Mode::Mono
    }
}

/// Whether `param`'s constraint on `decl` is the reflective `any` marker,
/// which changes the erased representation from bare `ptr-to-byte` to the
/// boxed `{data, type_id}` shape.
pub fn param_is_any_erased(decl: &StructDecl, param: &str) -> bool {
    decl.type_params
        .iter()
        .find(|p| p.name == param)
        .is_some_and(|p| constraint_is_any(p.constraint.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fin_ast::{ErasureMarker, TypeParam, Visibility};

    fn decl_with_params(params: Vec<TypeParam>) -> StructDecl {
        StructDecl {
            name: "Box".into(),
            type_params: params,
            parents: vec![],
            fields: vec![],
            constructors: vec![],
            operators: vec![],
            destructor: None,
            methods: vec![],
            visibility: Visibility::Public,
            attributes: vec![],
            is_interface: false,
        }
    }

    #[test]
    fn no_type_params_is_standard() {
        assert_eq!(classify_mode(&decl_with_params(vec![])), Mode::Standard);
    }

    #[test]
    fn generic_without_marker_is_mono() {
        let decl = decl_with_params(vec![TypeParam { name: "T".into(), constraint: None }]);
        assert_eq!(classify_mode(&decl), Mode::Mono);
    }

    #[test]
    fn generic_with_erasure_marker_is_erased() {
        let decl = decl_with_params(vec![TypeParam {
            name: "T".into(),
            constraint: Some(TypeConstraint::Marker(ErasureMarker::Castable)),
        }]);
        assert_eq!(classify_mode(&decl), Mode::Erased);
    }
}
