//! Builtin overload resolution (spec §4.2 "Symbol resolution"): an exact
//! arity+type match pass, then a reorder-and-fill-defaults pass, then a
//! uniqueness check. Shared by call-expressions (`BuiltinFunction`) and
//! handler call statements (`BuiltinHandler`).

use flow_syntax::symbol::BuiltinSignature;
use flow_syntax::LiteralType;

/// Try every candidate for an exact arity and type match. Multiple exact
/// matches would mean the host registered two identical signatures under
/// one name, which is itself an ambiguity.
fn exact_match<'a>(candidates: &'a [BuiltinSignature], args: &[LiteralType]) -> Vec<&'a BuiltinSignature> {
    candidates
        .iter()
        .filter(|sig| sig.params.len() == args.len() && sig.params.iter().zip(args).all(|(p, a)| p.ty == *a))
        .collect()
}

/// A candidate matches under the reorder+defaults pass if the caller
/// supplied a prefix of the signature's parameters (in order) and every
/// omitted trailing parameter has a default.
fn defaults_match<'a>(candidates: &'a [BuiltinSignature], args: &[LiteralType]) -> Vec<&'a BuiltinSignature> {
    candidates
        .iter()
        .filter(|sig| {
            if args.len() > sig.params.len() || args.len() < sig.params.iter().filter(|p| !p.has_default).count() {
                return false;
            }
            let supplied_ok = sig.params.iter().zip(args).all(|(p, a)| p.ty == *a);
            let omitted_ok = sig.params[args.len()..].iter().all(|p| p.has_default);
            supplied_ok && omitted_ok
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<'a> {
    Unique(&'a BuiltinSignature),
    None,
    Ambiguous,
}

/// Resolve one overload set against the given argument types, per spec
/// §4.2: exact-match pass first; if that yields nothing, the
/// reorder+defaults pass; the result must be a single candidate.
pub fn resolve_overload<'a>(candidates: &'a [BuiltinSignature], args: &[LiteralType]) -> Resolution<'a> {
    let exact = exact_match(candidates, args);
    let matches = if !exact.is_empty() { exact } else { defaults_match(candidates, args) };
    match matches.len() {
        0 => Resolution::None,
        1 => Resolution::Unique(matches[0]),
        _ => Resolution::Ambiguous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_syntax::symbol::Param;
    use LiteralType::*;

    #[test]
    fn exact_arity_and_types_resolve_uniquely() {
        let candidates = vec![BuiltinSignature { params: vec![Param::required(String), Param::required(Number)], return_type: Void }];
        assert_eq!(resolve_overload(&candidates, &[String, Number]), Resolution::Unique(&candidates[0]));
    }

    #[test]
    fn omitted_trailing_default_resolves_via_second_pass() {
        let candidates = vec![BuiltinSignature {
            params: vec![Param::required(String), Param::required(Number), Param::defaulted(Number)],
            return_type: Void,
        }];
        assert_eq!(resolve_overload(&candidates, &[String, Number]), Resolution::Unique(&candidates[0]));
    }

    #[test]
    fn missing_required_param_does_not_resolve() {
        let candidates = vec![BuiltinSignature { params: vec![Param::required(String), Param::required(Number)], return_type: Void }];
        assert_eq!(resolve_overload(&candidates, &[String]), Resolution::None);
    }

    #[test]
    fn two_equally_good_candidates_are_ambiguous() {
        let candidates = vec![
            BuiltinSignature { params: vec![Param::required(String)], return_type: Void },
            BuiltinSignature { params: vec![Param::required(String)], return_type: Boolean },
        ];
        assert_eq!(resolve_overload(&candidates, &[String]), Resolution::Ambiguous);
    }
}
