//! Per-recipient template rendering.
//!
//! Rendering is a pure function of `(content, variables)`: every
//! `{{ident}}` placeholder is substituted from the variables map,
//! missing variables render as empty strings, and declared-but-unused
//! variables are ignored. Handlebars does the substitution with strict
//! mode off, which gives exactly those semantics, plus tolerated
//! whitespace (`{{ name }}`) and dotted paths (`{{user.name}}`).

use crate::error::{NotificationError, NotificationResult};
use handlebars::Handlebars;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

fn renderer() -> &'static Handlebars<'static> {
    static HB: OnceLock<Handlebars<'static>> = OnceLock::new();
    HB.get_or_init(|| {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars
    })
}

/// Render every field of a template's content map.
pub fn render_content(
    content: &BTreeMap<String, String>,
    variables: &HashMap<String, Value>,
) -> NotificationResult<BTreeMap<String, String>> {
    let mut rendered = BTreeMap::new();

    for (field, template) in content {
        let output = renderer()
            .render_template(template, variables)
            .map_err(|e| {
                NotificationError::Render(format!("field '{}': {}", field, e))
            })?;
        rendered.insert(field.clone(), output);
    }

    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn content(fields: &[(&str, &str)]) -> BTreeMap<String, String> {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_substitutes_variables() {
        let rendered = render_content(
            &content(&[("subject", "hey {{name}}"), ("body", "hi {{name}}, see {{link}}")]),
            &vars(&[("name", json!("X")), ("link", json!("https://e.co"))]),
        )
        .unwrap();

        assert_eq!(rendered["subject"], "hey X");
        assert_eq!(rendered["body"], "hi X, see https://e.co");
    }

    #[test]
    fn test_missing_variables_render_empty() {
        let rendered = render_content(
            &content(&[("body", "hi {{name}}!")]),
            &vars(&[]),
        )
        .unwrap();

        assert_eq!(rendered["body"], "hi !");
    }

    #[test]
    fn test_whitespace_in_braces_tolerated() {
        let rendered = render_content(
            &content(&[("body", "hi {{ name }}")]),
            &vars(&[("name", json!("X"))]),
        )
        .unwrap();

        assert_eq!(rendered["body"], "hi X");
    }

    #[test]
    fn test_dotted_paths_resolve() {
        let rendered = render_content(
            &content(&[("body", "from {{user.company}}")]),
            &vars(&[("user", json!({"company": "ACME"}))]),
        )
        .unwrap();

        assert_eq!(rendered["body"], "from ACME");
    }

    #[test]
    fn test_unused_variables_ignored() {
        let rendered = render_content(
            &content(&[("body", "plain text")]),
            &vars(&[("name", json!("X"))]),
        )
        .unwrap();

        assert_eq!(rendered["body"], "plain text");
    }

    #[test]
    fn test_numbers_and_booleans_stringify() {
        let rendered = render_content(
            &content(&[("body", "{{count}} items, verified: {{verified}}")]),
            &vars(&[("count", json!(3)), ("verified", json!(true))]),
        )
        .unwrap();

        assert_eq!(rendered["body"], "3 items, verified: true");
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let c = content(&[("body", "hi {{name}}")]);
        let v = vars(&[("name", json!("X"))]);

        let a = render_content(&c, &v).unwrap();
        let b = render_content(&c, &v).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_malformed_template_is_render_error() {
        let result = render_content(&content(&[("body", "hi {{#if}}")]), &vars(&[]));
        assert!(matches!(result, Err(NotificationError::Render(_))));
    }
}
