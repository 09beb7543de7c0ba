//! Placeholder component returned when every model failed.

use super::types::GeneratedPayload;
use std::collections::BTreeMap;

pub const MOCK_EXPLANATION_PREFIX: &str = "Mock component: no AI model was available";

/// Deterministic payload for `prompt`. Depends on nothing but the prompt.
pub fn mock_payload(prompt: &str) -> GeneratedPayload {
    let text = escape_jsx_text(prompt.trim());

    let jsx = format!(
        r#"export default function GeneratedComponent({{ title = "Preview unavailable" }}) {{
  return (
    <section className="kiln-mock" role="status" aria-live="polite">
      <h2 className="kiln-mock__title">{{title}}</h2>
      <p className="kiln-mock__prompt">{text}</p>
      <p className="kiln-mock__note">The AI service is unavailable. Try again shortly.</p>
    </section>
  );
}}"#
    );

    let css = r".kiln-mock {
  border: 2px dashed #94a3b8;
  border-radius: 8px;
  padding: 1.5rem;
  font-family: system-ui, sans-serif;
  color: #334155;
  max-width: 32rem;
}

.kiln-mock__title {
  margin: 0 0 0.5rem;
  font-size: 1.25rem;
}

.kiln-mock__prompt {
  font-style: italic;
}

.kiln-mock__note {
  font-size: 0.875rem;
  color: #64748b;
}"
    .to_string();

    let mut props = BTreeMap::new();
    props.insert("title".to_string(), "Heading shown above the prompt".to_string());

    GeneratedPayload {
        jsx,
        css,
        explanation: format!("{MOCK_EXPLANATION_PREFIX}, so this placeholder stands in for: {}", prompt.trim()),
        features: vec![
            "Placeholder layout".to_string(),
            "Accessible status region".to_string(),
        ],
        props,
    }
}

/// Make arbitrary text safe inside JSX children.
fn escape_jsx_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '{' => out.push_str("&#123;"),
            '}' => out.push_str("&#125;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_is_deterministic_and_complete() {
        let a = mock_payload("a login form");
        let b = mock_payload("a login form");
        assert_eq!(a, b);
        assert!(a.is_valid());
        assert!(!a.css.is_empty());
        assert!(a.explanation.starts_with(MOCK_EXPLANATION_PREFIX));
        assert!(a.jsx.contains("a login form"));
    }

    #[test]
    fn test_mock_differs_by_prompt() {
        assert_ne!(mock_payload("one").jsx, mock_payload("two").jsx);
    }

    #[test]
    fn test_prompt_is_escaped() {
        let payload = mock_payload("<script>{alert(1)}</script>");
        assert!(!payload.jsx.contains("<script>"));
        assert!(payload.jsx.contains("&lt;script&gt;&#123;alert(1)&#125;"));
    }
}
