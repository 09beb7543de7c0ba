//! Prompt construction for component generation.

use super::types::{ComponentState, GenerationContext};

const RESPONSE_CONTRACT: &str = r#"Respond with a single JSON object and nothing else:
{
  "jsx": "<complete component source>",
  "css": "<stylesheet, empty string if styles are inline>",
  "explanation": "<one or two sentences describing the component>",
  "features": ["<feature>", "..."],
  "props": { "<propName>": "<what it controls>" }
}"#;

const FRESH_DIRECTIVES: &[&str] = &[
    "Make it responsive across mobile, tablet and desktop widths.",
    "Make it accessible: semantic elements, labels, keyboard support and sufficient contrast.",
    "Keep it well-structured: small focused pieces, clear prop names, no dead code.",
    "Export the component as the default export.",
];

/// System prompt describing the target stack and the response contract.
pub fn system_prompt(ctx: &GenerationContext) -> String {
    let language = if ctx.typescript {
        "TypeScript with explicit prop types"
    } else {
        "JavaScript"
    };

    format!(
        "You are an expert {framework} developer who writes production-quality UI components.\n\
         Target framework: {framework}.\n\
         Styling: {style}.\n\
         Language: {language}.\n\n\
         {RESPONSE_CONTRACT}",
        framework = ctx.framework,
        style = ctx.style_framework,
    )
}

/// User prompt. Iteration mode embeds the existing code and asks for a
/// targeted change; fresh mode asks for a new component.
pub fn user_prompt(prompt: &str, ctx: &GenerationContext) -> String {
    match ctx.iterates_on() {
        Some(existing) => iteration_prompt(prompt, existing),
        None => fresh_prompt(prompt),
    }
}

fn fresh_prompt(prompt: &str) -> String {
    let directives: Vec<String> = FRESH_DIRECTIVES.iter().map(|d| format!("- {d}")).collect();
    format!(
        "Create a new component: {prompt}\n\nRequirements:\n{}",
        directives.join("\n")
    )
}

fn iteration_prompt(prompt: &str, existing: &ComponentState) -> String {
    let css = if existing.css.trim().is_empty() {
        "/* none */"
    } else {
        existing.css.as_str()
    };

    format!(
        "Modify the existing component below. Apply only this change and keep \
         everything else intact: {prompt}\n\n\
         Current component code:\n```jsx\n{jsx}\n```\n\n\
         Current styles:\n```css\n{css}\n```\n\n\
         Return the complete updated component, not a diff.",
        jsx = existing.jsx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::types::{Framework, StyleFramework};

    #[test]
    fn test_system_prompt_reflects_stack() {
        let ctx = GenerationContext {
            framework: Framework::Vue,
            style_framework: StyleFramework::Tailwind,
            typescript: true,
            ..Default::default()
        };
        let prompt = system_prompt(&ctx);
        assert!(prompt.contains("Vue"));
        assert!(prompt.contains("Tailwind CSS"));
        assert!(prompt.contains("TypeScript"));
        assert!(prompt.contains("\"jsx\""));
    }

    #[test]
    fn test_fresh_mode_has_quality_directives() {
        let prompt = user_prompt("a pricing table", &GenerationContext::default());
        assert!(prompt.starts_with("Create a new component: a pricing table"));
        assert!(prompt.contains("responsive"));
        assert!(prompt.contains("accessible"));
        assert!(prompt.contains("well-structured"));
    }

    #[test]
    fn test_iteration_mode_embeds_existing_code() {
        let ctx = GenerationContext::default()
            .iterating_on(ComponentState::new("<Table/>", ".t{color:red}", false));
        let prompt = user_prompt("make the header sticky", &ctx);
        assert!(prompt.contains("make the header sticky"));
        assert!(prompt.contains("<Table/>"));
        assert!(prompt.contains(".t{color:red}"));
        assert!(!prompt.contains("Create a new component"));
    }

    #[test]
    fn test_iteration_flag_without_code_is_fresh() {
        let ctx = GenerationContext {
            is_iteration: true,
            ..Default::default()
        };
        assert!(user_prompt("x", &ctx).starts_with("Create a new component"));
    }
}
