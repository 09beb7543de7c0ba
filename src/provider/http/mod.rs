//! Shared HTTP plumbing for completion backends.

mod client;

pub use client::{AuthConfig, HttpClient};
