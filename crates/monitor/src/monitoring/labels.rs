//! Label matching for Pod membership.

use super::Labels;

/// Label injected by the ReplicaSet controller on every managed Pod. It is
/// not part of the pod template, so it is stripped before comparison.
pub const GENERATED_HASH_LABEL: &str = "pod-template-hash";

/// True iff `got`, with the generated hash label removed, equals one of the
/// `expected` label sets by value. Order of `expected` is irrelevant.
pub fn matches(expected: &[Labels], got: &Labels) -> bool {
    let mut stripped = got.clone();
    stripped.remove(GENERATED_HASH_LABEL);

    expected.iter().any(|exp| *exp == stripped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn matches_exact_label_set() {
        let expected = vec![labels(&[("app", "catalog")])];
        assert!(matches(&expected, &labels(&[("app", "catalog")])));
    }

    #[test]
    fn strips_generated_hash_label_before_comparing() {
        let expected = vec![labels(&[("app", "catalog")])];
        let got = labels(&[("app", "catalog"), (GENERATED_HASH_LABEL, "7b9f8c6d5")]);
        assert!(matches(&expected, &got));
    }

    #[test]
    fn requires_full_set_equality_not_subset() {
        let expected = vec![labels(&[("app", "catalog")])];
        let got = labels(&[("app", "catalog"), ("tier", "backend")]);
        assert!(!matches(&expected, &got));

        let expected = vec![labels(&[("app", "catalog"), ("tier", "backend")])];
        let got = labels(&[("app", "catalog")]);
        assert!(!matches(&expected, &got));
    }

    #[test]
    fn any_of_several_expected_sets_matches() {
        let expected = vec![
            labels(&[("app", "broker")]),
            labels(&[("app", "catalog"), ("tier", "backend")]),
        ];
        assert!(matches(
            &expected,
            &labels(&[("app", "catalog"), ("tier", "backend")])
        ));
        assert!(matches(&expected, &labels(&[("app", "broker")])));
        assert!(!matches(&expected, &labels(&[("app", "ui")])));
    }

    #[test]
    fn empty_inputs_never_match() {
        assert!(!matches(&[], &labels(&[("app", "catalog")])));
        assert!(!matches(&[labels(&[("app", "catalog")])], &Labels::new()));
    }

    #[test]
    fn hash_only_pod_matches_empty_expected_set() {
        // A pod carrying nothing but the generated label has an empty
        // effective label set.
        let expected = vec![Labels::new()];
        assert!(matches(&expected, &labels(&[(GENERATED_HASH_LABEL, "abc")])));
    }

    #[test]
    fn differing_values_do_not_match() {
        let expected = vec![labels(&[("app", "catalog")])];
        assert!(!matches(&expected, &labels(&[("app", "broker")])));
    }
}
