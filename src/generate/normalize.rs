//! Coerce free-form model output into a [`GeneratedPayload`].
//!
//! Models are asked for a JSON object but answer with anything from clean
//! JSON to prose wrapped around fenced code. [`normalize`] accepts all of it
//! and never fails:
//!
//! 1. A JSON object spanning the first `{` to the last `}` that carries a
//!    `jsx` or `css` key is taken as the payload, with defaults filled in.
//! 2. Otherwise fenced code blocks are harvested: a `jsx`/`tsx`/`js`/`ts`
//!    block for the markup and a `css` block for the styles.
//! 3. Blank input gets the fallback payload.

use super::types::GeneratedPayload;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

pub const JSX_PLACEHOLDER: &str = "// No component code was generated";
pub const CSS_PLACEHOLDER: &str = "/* No styles were generated */";
pub const DEFAULT_EXPLANATION: &str = "Component generated successfully";
pub const DEFAULT_FEATURE: &str = "AI-generated component";
pub const FALLBACK_EXPLANATION: &str =
    "The model response could not be parsed; showing the raw output as code";

static SCRIPT_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:jsx|tsx|javascript|typescript|js|ts)[ \t]*\r?\n([\s\S]*?)```")
        .expect("script fence regex must be valid")
});

static CSS_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```css[ \t]*\r?\n([\s\S]*?)```")
        .expect("css fence regex must be valid")
});

/// Turn raw model text into a payload. Total: any input yields a payload
/// with non-empty `jsx`.
pub fn normalize(raw: &str) -> GeneratedPayload {
    from_json(raw)
        .or_else(|| from_fences(raw))
        .unwrap_or_else(|| fallback(raw))
}

/// Greedy brace match: first `{` to last `}`, so prose before and after the
/// object is ignored.
fn json_object_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn from_json(raw: &str) -> Option<GeneratedPayload> {
    let candidate = json_object_span(raw)?;
    let Value::Object(map) = serde_json::from_str::<Value>(candidate).ok()? else {
        return None;
    };

    // `{}` inside a stylesheet or a stray config object is not a payload.
    if !map.contains_key("jsx") && !map.contains_key("css") {
        return None;
    }

    // Code keeps its whitespace; blank strings count as missing.
    let text = |key: &str| {
        map.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };

    let features = match map.get("features") {
        Some(Value::Array(items)) => items.iter().map(value_to_text).collect(),
        Some(Value::String(single)) if !single.trim().is_empty() => vec![single.clone()],
        _ => vec![DEFAULT_FEATURE.to_string()],
    };

    let props = match map.get("props") {
        Some(Value::Object(entries)) => entries
            .iter()
            .map(|(name, desc)| (name.clone(), value_to_text(desc)))
            .collect(),
        _ => BTreeMap::new(),
    };

    Some(GeneratedPayload {
        jsx: text("jsx").unwrap_or_else(|| JSX_PLACEHOLDER.to_string()),
        css: text("css").unwrap_or_else(|| CSS_PLACEHOLDER.to_string()),
        explanation: text("explanation")
            .map(|e| e.trim().to_string())
            .unwrap_or_else(|| DEFAULT_EXPLANATION.to_string()),
        features,
        props,
    })
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn first_capture(re: &Regex, raw: &str) -> Option<String> {
    re.captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn from_fences(raw: &str) -> Option<GeneratedPayload> {
    if raw.trim().is_empty() {
        return None;
    }

    Some(GeneratedPayload {
        jsx: first_capture(&SCRIPT_FENCE, raw).unwrap_or_else(|| raw.to_string()),
        css: first_capture(&CSS_FENCE, raw).unwrap_or_else(|| CSS_PLACEHOLDER.to_string()),
        explanation: DEFAULT_EXPLANATION.to_string(),
        features: vec![DEFAULT_FEATURE.to_string()],
        props: BTreeMap::new(),
    })
}

fn fallback(raw: &str) -> GeneratedPayload {
    let jsx = if raw.trim().is_empty() {
        JSX_PLACEHOLDER.to_string()
    } else {
        raw.to_string()
    };

    GeneratedPayload {
        jsx,
        css: String::new(),
        explanation: FALLBACK_EXPLANATION.to_string(),
        features: vec![DEFAULT_FEATURE.to_string()],
        props: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_json() {
        let raw = r#"{"jsx":"<Button/>","css":".btn{}","explanation":"A button","features":["click"],"props":{"label":"Button text"}}"#;
        let payload = normalize(raw);
        assert_eq!(payload.jsx, "<Button/>");
        assert_eq!(payload.css, ".btn{}");
        assert_eq!(payload.explanation, "A button");
        assert_eq!(payload.features, vec!["click"]);
        assert_eq!(payload.props.get("label").map(String::as_str), Some("Button text"));
    }

    #[test]
    fn test_json_wrapped_in_prose_and_fence() {
        let raw = "Sure! Here you go:\n```json\n{\"jsx\": \"<Card/>\"}\n```\nEnjoy.";
        let payload = normalize(raw);
        assert_eq!(payload.jsx, "<Card/>");
        assert_eq!(payload.css, CSS_PLACEHOLDER);
        assert_eq!(payload.explanation, DEFAULT_EXPLANATION);
        assert_eq!(payload.features, vec![DEFAULT_FEATURE]);
        assert!(payload.props.is_empty());
    }

    #[test]
    fn test_json_code_keeps_indentation() {
        let raw = r#"{"jsx":"  <div>\n    <p/>\n  </div>\n","css":"\n.a {\n  color: red;\n}\n","explanation":"  Nested  "}"#;
        let payload = normalize(raw);
        assert_eq!(payload.jsx, "  <div>\n    <p/>\n  </div>\n");
        assert_eq!(payload.css, "\n.a {\n  color: red;\n}\n");
        assert_eq!(payload.explanation, "Nested");

        let blank = normalize(r#"{"jsx":"   ","css":"a{}"}"#);
        assert_eq!(blank.jsx, JSX_PLACEHOLDER);
    }

    #[test]
    fn test_json_missing_jsx_gets_placeholder() {
        let payload = normalize(r#"{"css":"a{}","explanation":"styles only"}"#);
        assert_eq!(payload.jsx, JSX_PLACEHOLDER);
        assert_eq!(payload.css, "a{}");
    }

    #[test]
    fn test_non_string_props_and_features_are_stringified() {
        let payload = normalize(
            r#"{"jsx":"<X/>","features":["a",2],"props":{"size":{"type":"number"},"label":"text"}}"#,
        );
        assert_eq!(payload.features, vec!["a", "2"]);
        assert_eq!(payload.props["size"], r#"{"type":"number"}"#);
        assert_eq!(payload.props["label"], "text");
    }

    #[test]
    fn test_fenced_blocks() {
        let payload =
            normalize("here is code: ```jsx\nconst A=()=>1;\n``` and ```css\nbody{}\n```");
        assert_eq!(payload.jsx, "const A=()=>1;");
        assert_eq!(payload.css, "body{}");
        assert_eq!(payload.explanation, DEFAULT_EXPLANATION);
        assert_eq!(payload.features.len(), 1);
        assert!(payload.props.is_empty());
    }

    #[test]
    fn test_tsx_fence_without_css() {
        let payload = normalize("```tsx\nexport const B = () => <b/>;\n```");
        assert_eq!(payload.jsx, "export const B = () => <b/>;");
        assert_eq!(payload.css, CSS_PLACEHOLDER);
    }

    #[test]
    fn test_code_with_braces_is_not_mistaken_for_json() {
        let raw = "```jsx\nfunction A() { return <div/>; }\n```";
        let payload = normalize(raw);
        assert_eq!(payload.jsx, "function A() { return <div/>; }");
    }

    #[test]
    fn test_prose_without_fences_becomes_jsx_verbatim() {
        let raw = "I cannot draw that, but here is an idea.";
        let payload = normalize(raw);
        assert_eq!(payload.jsx, raw);
        assert_eq!(payload.css, CSS_PLACEHOLDER);
    }

    #[test]
    fn test_truncated_json_falls_through() {
        let raw = r#"{"jsx": "<div>half"#;
        let payload = normalize(raw);
        assert_eq!(payload.jsx, raw);
    }

    #[test]
    fn test_empty_and_blank_input() {
        for raw in ["", "   \n\t"] {
            let payload = normalize(raw);
            assert_eq!(payload.jsx, JSX_PLACEHOLDER);
            assert_eq!(payload.css, "");
            assert_eq!(payload.explanation, FALLBACK_EXPLANATION);
        }
    }

    #[test]
    fn test_never_empty_jsx() {
        let inputs = [
            "",
            "{",
            "}",
            "}{",
            "{}",
            r#"{"jsx":""}"#,
            r#"{"jsx":null,"css":"x"}"#,
            "```jsx\n```",
            "[1,2,3]",
            "\u{0}\u{1}",
        ];
        for raw in inputs {
            assert!(normalize(raw).is_valid(), "empty jsx for {raw:?}");
        }
    }
}
