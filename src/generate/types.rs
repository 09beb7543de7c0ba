//! Component and payload types shared by generation and the session ledger.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Target UI framework.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    #[default]
    React,
    Vue,
    Angular,
}

impl Framework {
    pub fn label(self) -> &'static str {
        match self {
            Framework::React => "React",
            Framework::Vue => "Vue",
            Framework::Angular => "Angular",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Styling approach for generated components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StyleFramework {
    #[default]
    Css,
    Tailwind,
    StyledComponents,
    Emotion,
}

impl StyleFramework {
    pub fn label(self) -> &'static str {
        match self {
            StyleFramework::Css => "plain CSS",
            StyleFramework::Tailwind => "Tailwind CSS",
            StyleFramework::StyledComponents => "styled-components",
            StyleFramework::Emotion => "Emotion",
        }
    }
}

impl fmt::Display for StyleFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Code of one component: markup/logic plus its stylesheet.
///
/// `jsx` and `css` are never null; a JSON `null` decodes to an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComponentState {
    #[serde(deserialize_with = "null_as_empty")]
    pub jsx: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub css: String,
    pub typescript: bool,
}

impl ComponentState {
    pub fn new(jsx: impl Into<String>, css: impl Into<String>, typescript: bool) -> Self {
        Self {
            jsx: jsx.into(),
            css: css.into(),
            typescript,
        }
    }

    /// No code at all. Empty states are never archived.
    pub fn is_empty(&self) -> bool {
        self.jsx.trim().is_empty() && self.css.trim().is_empty()
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Structured result of one generation or refinement call.
///
/// `jsx` is non-empty for every payload produced by the normalizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratedPayload {
    pub jsx: String,
    pub css: String,
    pub explanation: String,
    pub features: Vec<String>,
    pub props: BTreeMap<String, String>,
}

impl GeneratedPayload {
    /// The code part, tagged with the caller's TypeScript flag.
    pub fn component(&self, typescript: bool) -> ComponentState {
        ComponentState::new(self.jsx.clone(), self.css.clone(), typescript)
    }

    /// Usable as-is: has actual markup.
    pub fn is_valid(&self) -> bool {
        !self.jsx.trim().is_empty()
    }
}

/// Inputs that shape prompt construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationContext {
    pub framework: Framework,
    pub style_framework: StyleFramework,
    pub typescript: bool,
    /// Modify `existing_code` instead of starting fresh.
    pub is_iteration: bool,
    pub existing_code: Option<ComponentState>,
}

impl GenerationContext {
    /// Iteration mode needs both the flag and something to iterate on.
    pub fn iterates_on(&self) -> Option<&ComponentState> {
        if self.is_iteration {
            self.existing_code.as_ref()
        } else {
            None
        }
    }

    /// Same settings, switched to modifying `original`.
    pub fn iterating_on(&self, original: ComponentState) -> Self {
        Self {
            is_iteration: true,
            existing_code: Some(original),
            ..self.clone()
        }
    }
}

/// Where a payload came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "model", rename_all = "lowercase")]
pub enum GenerationSource {
    /// A model answered.
    Model(String),
    /// Served from the generation cache.
    Cache,
    /// Every model failed; placeholder component.
    Mock,
}

impl GenerationSource {
    pub fn is_mock(&self) -> bool {
        matches!(self, GenerationSource::Mock)
    }

    /// Short label for chat metadata and logs.
    pub fn label(&self) -> &str {
        match self {
            GenerationSource::Model(model) => model,
            GenerationSource::Cache => "cache",
            GenerationSource::Mock => "mock",
        }
    }
}

/// A payload together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Generated {
    pub payload: GeneratedPayload,
    pub source: GenerationSource,
}
