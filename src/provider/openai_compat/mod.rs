//! OpenAI-compatible chat completions backend.
//!
//! Serves OpenAI, OpenRouter and Ollama, which share the `/chat/completions`
//! wire format.

mod client;
mod request;
mod response;

pub use client::OpenAICompatClient;
