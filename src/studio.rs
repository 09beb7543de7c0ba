//! Application flows: generation through the pipeline, recorded in the
//! session ledger.
//!
//! A flow that names a session checks ownership before any model is called,
//! so a foreign or missing session costs nothing. Flows without a session
//! only generate.

use crate::auth::Principal;
use crate::error::ValidationError;
use crate::generate::{
    ComponentState, Framework, GenerateError, Generated, GenerationContext, GenerationPipeline,
    StyleFramework, Variation,
};
use crate::session::{ImageRef, Lookup, Session, SessionError, SessionService};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Error)]
pub enum StudioError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Generate(#[from] GenerateError),
}

/// Per-request generation options. Unset fields fall back to the session's
/// settings, then to the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextInput {
    pub framework: Option<Framework>,
    pub style_framework: Option<StyleFramework>,
    pub typescript: Option<bool>,
    pub is_iteration: bool,
    pub existing_code: Option<ComponentState>,
}

impl ContextInput {
    fn resolve(self, session: Option<&Session>) -> GenerationContext {
        let settings = session.map(|s| &s.settings);
        let current = session
            .map(|s| &s.current_component)
            .filter(|c| !c.is_empty());

        let existing_code = if self.is_iteration {
            self.existing_code.or_else(|| current.cloned())
        } else {
            None
        };

        GenerationContext {
            framework: self
                .framework
                .or(settings.map(|s| s.framework))
                .unwrap_or_default(),
            style_framework: self
                .style_framework
                .or(settings.map(|s| s.style_framework))
                .unwrap_or_default(),
            typescript: self
                .typescript
                .or(current.map(|c| c.typescript))
                .unwrap_or(false),
            is_iteration: self.is_iteration,
            existing_code,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateRequest {
    pub prompt: String,
    pub session_id: Option<String>,
    pub context: ContextInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefineRequest {
    pub prompt: String,
    pub session_id: Option<String>,
    /// Code to refine. Defaults to the session's current component.
    pub original_code: Option<ComponentState>,
    pub context: ContextInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariationsRequest {
    pub prompt: String,
    pub count: usize,
    pub session_id: Option<String>,
    pub context: ContextInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageUpload {
    pub name: String,
    pub media_type: String,
    /// Base64, or a `data:` URL.
    pub data: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageGenerateRequest {
    pub prompt: String,
    pub session_id: Option<String>,
    pub image: ImageUpload,
    pub context: ContextInput,
}

/// A generation and, when a session was named, the session after recording
/// it.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub generated: Generated,
    pub session: Option<Session>,
}

#[derive(Clone)]
pub struct Studio {
    pipeline: Arc<GenerationPipeline>,
    sessions: SessionService,
}

impl Studio {
    pub fn new(pipeline: Arc<GenerationPipeline>, sessions: SessionService) -> Self {
        Self { pipeline, sessions }
    }

    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    pub async fn generate(
        &self,
        principal: &Principal,
        request: GenerateRequest,
        cancel: &CancellationToken,
    ) -> Result<Outcome, StudioError> {
        require_prompt(&request.prompt)?;
        let session = self.owned_session(principal, request.session_id.as_deref())?;
        let ctx = request.context.resolve(session.as_ref());

        let generated = self
            .pipeline
            .generate_cached(&request.prompt, &ctx, &principal.id, cancel)
            .await?;
        info!(source = generated.source.label(), iteration = ctx.is_iteration, "Generated component");

        let session = match session {
            Some(s) => Some(self.sessions.record_generation(
                principal,
                &s.id,
                &request.prompt,
                &generated,
                ctx.typescript,
            )?),
            None => None,
        };
        Ok(Outcome { generated, session })
    }

    pub async fn refine(
        &self,
        principal: &Principal,
        request: RefineRequest,
        cancel: &CancellationToken,
    ) -> Result<Outcome, StudioError> {
        require_prompt(&request.prompt)?;
        let session = self.owned_session(principal, request.session_id.as_deref())?;

        let original = request
            .original_code
            .filter(|c| !c.is_empty())
            .or_else(|| {
                session
                    .as_ref()
                    .map(|s| s.current_component.clone())
                    .filter(|c| !c.is_empty())
            })
            .ok_or_else(|| ValidationError::field("originalCode", "nothing to refine"))?;

        let ctx = request.context.resolve(session.as_ref());
        let generated = self
            .pipeline
            .refine_cached(&request.prompt, original, &ctx, &principal.id, cancel)
            .await?;
        info!(source = generated.source.label(), "Refined component");

        let session = match session {
            Some(s) => Some(self.sessions.record_refinement(
                principal,
                &s.id,
                &request.prompt,
                &generated,
            )?),
            None => None,
        };
        Ok(Outcome { generated, session })
    }

    /// Independent generations. Only the session's access time is recorded.
    pub async fn generate_variations(
        &self,
        principal: &Principal,
        request: VariationsRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Variation>, StudioError> {
        let session = match request.session_id.as_deref() {
            Some(id) => Some(self.sessions.get(principal, id)?),
            None => None,
        };
        let ctx = request.context.resolve(session.as_ref());
        Ok(self
            .pipeline
            .orchestrator()
            .generate_variations(&request.prompt, request.count, &ctx, cancel)
            .await?)
    }

    pub async fn generate_with_image(
        &self,
        principal: &Principal,
        request: ImageGenerateRequest,
        cancel: &CancellationToken,
    ) -> Result<Outcome, StudioError> {
        require_prompt(&request.prompt)?;
        let upload = &request.image;
        let (image, _bytes) = ImageRef::from_base64(&upload.name, &upload.media_type, &upload.data)?;
        let session = self.owned_session(principal, request.session_id.as_deref())?;

        let ctx = ContextInput {
            is_iteration: false,
            existing_code: None,
            ..request.context
        }
        .resolve(session.as_ref());

        let prompt = image_prompt(&request.prompt, &image);
        let generated = self
            .pipeline
            .generate_cached(&prompt, &ctx, &principal.id, cancel)
            .await?;
        info!(source = generated.source.label(), image = %image.name, "Generated component from image");

        let session = match session {
            Some(s) => Some(self.sessions.record_image_generation(
                principal,
                &s.id,
                &request.prompt,
                image,
                &generated,
                ctx.typescript,
            )?),
            None => None,
        };
        Ok(Outcome { generated, session })
    }

    fn owned_session(
        &self,
        principal: &Principal,
        id: Option<&str>,
    ) -> Result<Option<Session>, StudioError> {
        let Some(id) = id else { return Ok(None) };
        match self.sessions.lookup(principal, id)? {
            Lookup::Found(session) => Ok(Some(session)),
            Lookup::NotFound => Err(SessionError::NotFound.into()),
        }
    }
}

fn require_prompt(prompt: &str) -> Result<(), ValidationError> {
    if prompt.trim().is_empty() {
        return Err(ValidationError::field("prompt", "must not be empty"));
    }
    Ok(())
}

/// The completion API takes text only; the model is told what was attached.
fn image_prompt(prompt: &str, image: &ImageRef) -> String {
    format!(
        "{prompt}\n\nThe user attached a design image \"{}\" ({}, {} bytes). \
         Build the component it depicts.",
        image.name, image.media_type, image.size_bytes
    )
}
