//! Editor-to-session sync.
//!
//! Local buffer changes are pushed as manual edits once the editor has been
//! quiet for the configured period. Only the latest buffer state of a burst
//! is sent. Closing the editor drops whatever is still waiting.

mod debounce;

pub use debounce::Debouncer;

use crate::auth::Principal;
use crate::generate::ComponentState;
use crate::session::{ComponentEdit, SessionError, SessionService};
use async_trait::async_trait;
use futures::FutureExt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Destination of debounced edits.
#[async_trait]
pub trait ManualEditSink: Send + Sync {
    async fn apply(&self, edit: ComponentEdit) -> Result<(), SessionError>;
}

/// Applies edits to one session through the session service.
pub struct SessionEditSink {
    service: SessionService,
    principal: Principal,
    session_id: String,
}

impl SessionEditSink {
    pub fn new(service: SessionService, principal: Principal, session_id: impl Into<String>) -> Self {
        Self {
            service,
            principal,
            session_id: session_id.into(),
        }
    }
}

#[async_trait]
impl ManualEditSink for SessionEditSink {
    async fn apply(&self, edit: ComponentEdit) -> Result<(), SessionError> {
        self.service
            .apply_manual_edit(&self.principal, &self.session_id, &edit)?;
        Ok(())
    }
}

/// Debounced mirror of one editor's buffers.
pub struct EditorSync {
    buffers: Mutex<ComponentState>,
    debouncer: Debouncer<ComponentEdit>,
}

impl EditorSync {
    pub fn new(initial: ComponentState, quiet: Duration, sink: Arc<dyn ManualEditSink>) -> Self {
        let debouncer = Debouncer::new(quiet, move |edit: ComponentEdit| {
            let sink = Arc::clone(&sink);
            async move {
                match sink.apply(edit).await {
                    Ok(()) => debug!("Synced editor buffers"),
                    Err(e) => warn!(error = %e, "Editor sync failed"),
                }
            }
            .boxed()
        });

        Self {
            buffers: Mutex::new(initial),
            debouncer,
        }
    }

    pub fn set_jsx(&self, jsx: impl Into<String>) {
        self.update(|b| b.jsx = jsx.into());
    }

    pub fn set_css(&self, css: impl Into<String>) {
        self.update(|b| b.css = css.into());
    }

    pub fn set_typescript(&self, typescript: bool) {
        self.update(|b| b.typescript = typescript);
    }

    pub fn buffers(&self) -> ComponentState {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Teardown: the pending sync, if any, is dropped.
    pub fn close(&self) {
        self.debouncer.cancel();
    }

    fn update(&self, change: impl FnOnce(&mut ComponentState)) {
        let snapshot = {
            let mut buffers = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
            change(&mut buffers);
            buffers.clone()
        };
        self.debouncer.schedule(ComponentEdit {
            jsx: Some(snapshot.jsx),
            css: Some(snapshot.css),
            typescript: Some(snapshot.typescript),
        });
    }
}
