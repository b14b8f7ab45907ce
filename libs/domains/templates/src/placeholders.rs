//! Placeholder extraction and validation.
//!
//! Template strings reference variables as `{{ident}}`; whitespace
//! inside the braces and dotted paths are tolerated. The catalog
//! invariant is `placeholders(content) ⊆ variables`.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\s*\}\}")
            .expect("placeholder regex is valid")
    })
}

/// Collect every placeholder identifier appearing in `content`.
pub fn extract_placeholders(content: &BTreeMap<String, String>) -> BTreeSet<String> {
    let mut placeholders = BTreeSet::new();

    for template in content.values() {
        for capture in placeholder_regex().captures_iter(template) {
            placeholders.insert(capture[1].to_string());
        }
    }

    placeholders
}

/// Validate `placeholders(content) ⊆ variables`.
///
/// Returns the declared-but-unused variables (a warning, not an error)
/// or the set of undeclared placeholders as the error payload.
pub fn validate_placeholders(
    content: &BTreeMap<String, String>,
    variables: &[String],
) -> Result<Vec<String>, Vec<String>> {
    let declared: BTreeSet<&str> = variables.iter().map(|v| v.as_str()).collect();
    let used = extract_placeholders(content);

    let undeclared: Vec<String> = used
        .iter()
        .filter(|p| !declared.contains(p.as_str()))
        .cloned()
        .collect();

    if !undeclared.is_empty() {
        return Err(undeclared);
    }

    let unused: Vec<String> = variables
        .iter()
        .filter(|v| !used.contains(*v))
        .cloned()
        .collect();

    Ok(unused)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(fields: &[(&str, &str)]) -> BTreeMap<String, String> {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_extract_simple_placeholders() {
        let c = content(&[("body", "hi {{name}}, click {{link}}")]);
        let placeholders = extract_placeholders(&c);

        assert_eq!(
            placeholders,
            BTreeSet::from(["name".to_string(), "link".to_string()])
        );
    }

    #[test]
    fn test_extract_tolerates_whitespace_and_dots() {
        let c = content(&[("body", "hi {{ name }}, from {{user.company}}")]);
        let placeholders = extract_placeholders(&c);

        assert!(placeholders.contains("name"));
        assert!(placeholders.contains("user.company"));
    }

    #[test]
    fn test_extract_spans_all_fields() {
        let c = content(&[("subject", "hey {{name}}"), ("body", "use {{link}}")]);
        let placeholders = extract_placeholders(&c);

        assert_eq!(placeholders.len(), 2);
    }

    #[test]
    fn test_extract_ignores_malformed_braces() {
        let c = content(&[("body", "hi {name} and {{ }} and {{1bad}}")]);
        assert!(extract_placeholders(&c).is_empty());
    }

    #[test]
    fn test_validate_accepts_subset() {
        let c = content(&[("body", "hi {{name}}")]);
        let unused = validate_placeholders(
            &c,
            &["name".to_string(), "link".to_string()],
        )
        .unwrap();

        // Declared-but-unused is a warning, surfaced to the caller
        assert_eq!(unused, vec!["link".to_string()]);
    }

    #[test]
    fn test_validate_rejects_undeclared_placeholder() {
        let c = content(&[("body", "hi {{name}}, see {{link}}")]);
        let undeclared = validate_placeholders(&c, &["name".to_string()]).unwrap_err();

        assert_eq!(undeclared, vec!["link".to_string()]);
    }

    #[test]
    fn test_validate_empty_content() {
        let c = content(&[]);
        assert!(validate_placeholders(&c, &[]).unwrap().is_empty());
    }
}
