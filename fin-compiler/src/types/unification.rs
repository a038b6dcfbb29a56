use std::collections::HashMap;

use crate::fin_type::FinType;

/// Unifies a concrete `FinType` against a generic pattern (a type that may
/// contain `FinType::GenericParam` leaves), filling `bindings` in place.
/// Enforces consistency: a parameter bound twice to two different concrete
/// types fails the match rather than silently keeping the first binding.
///
/// Returns `true` on success. On failure `bindings` may already contain
/// partial entries from the matched prefix; callers that need atomicity
/// should match_generic_types onto a scratch map and merge only on success.
pub fn match_generic_types(pattern: &FinType, concrete: &FinType, bindings: &mut HashMap<String, FinType>) -> bool {
    match pattern {
        FinType::GenericParam(name) => match bindings.get(name) {
            Some(existing) => existing == concrete,
            None => {
                bindings.insert(name.clone(), concrete.clone());
                true
            }
        },
        FinType::Pointer(inner_pattern) => match concrete {
            FinType::Pointer(inner_concrete) => match_generic_types(inner_pattern, inner_concrete, bindings),
            _ => false,
        },
        FinType::Struct { name: pname, generic_args: pargs } => match concrete {
            FinType::Struct { name: cname, generic_args: cargs } => {
                if pname != cname || pargs.len() != cargs.len() {
                    return false;
                }
                pargs.iter().zip(cargs.iter()).all(|(p, c)| match_generic_types(p, c, bindings))
            }
            _ => false,
        },
        FinType::Array { elem: pelem, size: psize } => match concrete {
            FinType::Array { elem: celem, size: csize } => psize == csize && match_generic_types(pelem, celem, bindings),
            _ => false,
        },
        FinType::Primitive(_) | FinType::Any => pattern == concrete,
    }
}

/// Runs `match_generic_types` for every `(pattern, concrete)` argument
/// pair, short-circuiting as soon as one pair is inconsistent with an
/// earlier binding.
pub fn match_all(pairs: &[(FinType, FinType)]) -> Option<HashMap<String, FinType>> {
    let mut bindings = HashMap::new();
    for (pattern, concrete) in pairs {
        if !match_generic_types(pattern, concrete, &mut bindings) {
            return None;
        }
    }
    Some(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_a_fresh_parameter() {
        let mut bindings = HashMap::new();
        let pattern = FinType::GenericParam("T".into());
        assert!(match_generic_types(&pattern, &FinType::int(), &mut bindings));
        assert_eq!(bindings.get("T"), Some(&FinType::int()));
    }

    #[test]
    fn rejects_inconsistent_rebinding() {
        let mut bindings = HashMap::new();
        bindings.insert("T".to_string(), FinType::int());
        let pattern = FinType::GenericParam("T".into());
        assert!(!match_generic_types(&pattern, &FinType::Primitive(crate::fin_type::Primitive::Float), &mut bindings));
    }

    #[test]
    fn unifies_through_nested_struct_generic_args() {
        let pattern = FinType::Struct { name: "Box".into(), generic_args: vec![FinType::GenericParam("T".into())] };
        let concrete = FinType::Struct { name: "Box".into(), generic_args: vec![FinType::string()] };
        let mut bindings = HashMap::new();
        assert!(match_generic_types(&pattern, &concrete, &mut bindings));
        assert_eq!(bindings.get("T"), Some(&FinType::string()));
    }

    #[test]
    fn mismatched_struct_names_fail() {
        let pattern = FinType::Struct { name: "Box".into(), generic_args: vec![] };
        let concrete = FinType::Struct { name: "Pair".into(), generic_args: vec![] };
        let mut bindings = HashMap::new();
        assert!(!match_generic_types(&pattern, &concrete, &mut bindings));
    }
}
