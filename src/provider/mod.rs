//! Completion provider abstraction.
//!
//! Generation only needs one capability from a model: turn a system prompt
//! and a user prompt into text. [`CompletionProvider`] is that capability;
//! [`Client`] implements it over the OpenAI-compatible and Anthropic HTTP APIs
//! and routes `provider/model` identifiers to the right backend.
//!
//! # Example
//!
//! ```ignore
//! use kiln::provider::{Client, CompletionProvider, CompletionRequest};
//!
//! let client = Client::from_settings(&Default::default())?;
//! let text = client
//!     .complete(CompletionRequest::new("openai/gpt-4o-mini", system, user))
//!     .await?;
//! ```

mod anthropic;
mod api_provider;
mod client;
mod error;
mod http;
mod openai_compat;
mod retry;
mod types;

pub use anthropic::AnthropicClient;
pub use api_provider::Provider;
pub use client::{BackendSettings, Client};
pub use error::{Error, format_api_error};
pub use openai_compat::OpenAICompatClient;
pub use retry::failure_category;
pub use types::*;
