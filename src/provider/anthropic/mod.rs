//! Anthropic Messages API backend.

mod client;
mod request;
mod response;

pub use client::AnthropicClient;
