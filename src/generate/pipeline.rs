//! Cache lookup and write-through around the orchestrator.

use super::GenerateError;
use super::orchestrator::Orchestrator;
use super::types::{ComponentState, Generated, GeneratedPayload, GenerationContext, GenerationSource};
use crate::cache::Cache;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Field order is fixed by the struct, so equal inputs serialize equally.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KeyMaterial<'a> {
    prompt: &'a str,
    framework: super::types::Framework,
    style_framework: super::types::StyleFramework,
    typescript: bool,
    is_iteration: bool,
    existing_code_fingerprint: Option<String>,
}

fn fingerprint(code: &ComponentState) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.jsx.as_bytes());
    hasher.update([0u8]);
    hasher.update(code.css.as_bytes());
    hasher.update([u8::from(code.typescript)]);
    hex(&hasher.finalize())
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Cache key for a generation request.
///
/// Folds in the iteration flag and a fingerprint of the code being iterated
/// on, so a refinement never collides with a fresh generation of the same
/// prompt, nor with a refinement of different code. Requests that agree on
/// all of these share a key and therefore a cached payload.
pub fn cache_key(prompt: &str, ctx: &GenerationContext, scope: &str) -> String {
    let material = KeyMaterial {
        prompt: prompt.trim(),
        framework: ctx.framework,
        style_framework: ctx.style_framework,
        typescript: ctx.typescript,
        is_iteration: ctx.is_iteration,
        existing_code_fingerprint: ctx.iterates_on().map(fingerprint),
    };
    let canonical = serde_json::to_string(&material).unwrap_or_else(|_| prompt.to_string());
    let digest = Sha256::digest(canonical.as_bytes());
    format!("component:{scope}:{}", hex(&digest))
}

pub struct GenerationPipeline {
    orchestrator: Orchestrator,
    cache: Option<Arc<dyn Cache>>,
    ttl: Duration,
}

impl GenerationPipeline {
    pub fn new(orchestrator: Orchestrator, cache: Option<Arc<dyn Cache>>, ttl: Duration) -> Self {
        Self {
            orchestrator,
            cache,
            ttl,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Generate through the cache. A structurally valid cached payload is
    /// returned without calling any model; otherwise the orchestrator runs
    /// and its result is written back. Cache failures only cost the
    /// shortcut.
    pub async fn generate_cached(
        &self,
        prompt: &str,
        ctx: &GenerationContext,
        scope: &str,
        cancel: &CancellationToken,
    ) -> Result<Generated, GenerateError> {
        let Some(cache) = &self.cache else {
            return self.orchestrator.generate(prompt, ctx, cancel).await;
        };

        let key = cache_key(prompt, ctx, scope);

        if let Some(payload) = self.lookup(cache.as_ref(), &key).await {
            debug!(key = %key, "Generation cache hit");
            return Ok(Generated {
                payload,
                source: GenerationSource::Cache,
            });
        }

        let generated = self.orchestrator.generate(prompt, ctx, cancel).await?;

        // A mock means the models were down; caching it would keep serving
        // the placeholder after they recover.
        if !generated.source.is_mock() {
            self.store(cache.as_ref(), &key, &generated.payload).await;
        }

        Ok(generated)
    }

    /// Refinement through the cache: iteration mode on `original`.
    pub async fn refine_cached(
        &self,
        prompt: &str,
        original: ComponentState,
        ctx: &GenerationContext,
        scope: &str,
        cancel: &CancellationToken,
    ) -> Result<Generated, GenerateError> {
        self.generate_cached(prompt, &ctx.iterating_on(original), scope, cancel)
            .await
    }

    async fn lookup(&self, cache: &dyn Cache, key: &str) -> Option<GeneratedPayload> {
        let raw = match cache.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Cache read failed, generating");
                return None;
            }
        };

        match serde_json::from_str::<GeneratedPayload>(&raw) {
            Ok(payload) if payload.is_valid() => Some(payload),
            Ok(_) | Err(_) => {
                debug!(key = %key, "Discarding malformed cache entry");
                None
            }
        }
    }

    async fn store(&self, cache: &dyn Cache, key: &str, payload: &GeneratedPayload) {
        let raw = match serde_json::to_string(payload) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Failed to encode payload for cache");
                return;
            }
        };

        if let Err(e) = cache.set(key, &raw, self.ttl).await {
            warn!(error = %e, "Cache write failed");
        }
    }
}
