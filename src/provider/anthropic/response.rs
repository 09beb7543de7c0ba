//! Anthropic API response types.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    #[serde(default)]
    pub content: Vec<ResponseBlock>,
}

/// Content block in a response. Only text matters for completions; other
/// block kinds are skipped.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

impl AnthropicResponse {
    /// Concatenated text blocks.
    pub fn into_text(self) -> Option<String> {
        let text: String = self
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text),
                ResponseBlock::Other => None,
            })
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }
}
