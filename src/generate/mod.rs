//! Component generation: prompt building, model fallback, response
//! normalization and the cache-assisted pipeline on top.

mod mock;
mod normalize;
mod orchestrator;
mod pipeline;
mod prompt;
mod types;

pub use mock::{MOCK_EXPLANATION_PREFIX, mock_payload};
pub use normalize::{CSS_PLACEHOLDER, DEFAULT_EXPLANATION, JSX_PLACEHOLDER, normalize};
pub use orchestrator::{MAX_VARIATIONS, Orchestrator, Variation};
pub use pipeline::{GenerationPipeline, cache_key};
pub use prompt::{system_prompt, user_prompt};
pub use types::*;

use crate::error::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Generation cancelled")]
    Cancelled,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}
