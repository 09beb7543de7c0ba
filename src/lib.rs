#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod auth;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod generate;
pub mod provider;
pub mod server;
pub mod session;
pub mod studio;
pub mod sync;

pub use error::{Error, Result};
