/// Predicates every deployment needs indexed for identifying-field lookups.
pub const DEFAULT_INDEXED_PREDICATES: &[&str] = &["email_address", "id"];

/// Schema declaring each predicate as an exact-indexed string.
///
/// Re-applying the same declaration is a no-op on the store side.
pub fn exact_string_schema<S: AsRef<str>>(predicates: &[S]) -> String {
    predicates
        .iter()
        .map(|p| format!("{}: string @index(exact) .", p.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schema() {
        assert_eq!(
            exact_string_schema(DEFAULT_INDEXED_PREDICATES),
            "email_address: string @index(exact) .\nid: string @index(exact) ."
        );
    }

    #[test]
    fn test_custom_predicates() {
        let predicates = vec!["external_ref".to_string()];
        assert_eq!(
            exact_string_schema(&predicates),
            "external_ref: string @index(exact) ."
        );
    }
}
