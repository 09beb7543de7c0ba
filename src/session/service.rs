use super::ledger::{self, SessionExport};
use super::store::{SessionFilter, SessionRepository, SessionStoreError};
use super::{ComponentEdit, DEFAULT_TITLE, ImageRef, NewSession, Role, Session, SessionPatch};
use crate::auth::Principal;
use crate::error::ValidationError;
use crate::generate::Generated;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum SessionError {
    /// Missing, inactive, or owned by someone else. Callers cannot tell which.
    #[error("Session not found")]
    NotFound,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] SessionStoreError),
}

/// Result of an ownership-checked read.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Session),
    NotFound,
}

impl Lookup {
    pub fn found(self) -> Result<Session, SessionError> {
        match self {
            Lookup::Found(session) => Ok(session),
            Lookup::NotFound => Err(SessionError::NotFound),
        }
    }
}

/// Ownership-checked session operations.
///
/// Mutations load the stored document, apply the ledger to that copy,
/// recompute stats and save. Nothing is returned until the save succeeds, so
/// a failed write leaves the stored session as it was.
#[derive(Clone)]
pub struct SessionService {
    repo: Arc<dyn SessionRepository>,
}

impl SessionService {
    pub fn new(repo: Arc<dyn SessionRepository>) -> Self {
        Self { repo }
    }

    pub fn create(&self, principal: &Principal, new: NewSession) -> Result<Session, SessionError> {
        let patch = SessionPatch::from(new);
        patch.validate()?;

        let mut session = Session::new(principal.id.clone(), DEFAULT_TITLE);
        patch.apply(&mut session);
        self.persist(&mut session)?;
        debug!(session_id = %session.id, user_id = %principal.id, "Created session");
        Ok(session)
    }

    pub fn lookup(&self, principal: &Principal, id: &str) -> Result<Lookup, SessionError> {
        let filter = SessionFilter::active_for(&principal.id).with_id(id);
        Ok(match self.repo.find_one(&filter)? {
            Some(session) => Lookup::Found(session),
            None => Lookup::NotFound,
        })
    }

    /// Read a session, recording the access.
    pub fn get(&self, principal: &Principal, id: &str) -> Result<Session, SessionError> {
        self.mutate(principal, id, |_| Ok(())).map(|(session, ())| session)
    }

    /// Active sessions of the principal, most recent first.
    pub fn list(&self, principal: &Principal, limit: usize) -> Result<Vec<Session>, SessionError> {
        Ok(self.repo.find_many(&SessionFilter::active_for(&principal.id), limit)?)
    }

    pub fn count_active(&self, principal: &Principal) -> Result<usize, SessionError> {
        Ok(self.repo.count(&SessionFilter::active_for(&principal.id))?)
    }

    pub fn update(
        &self,
        principal: &Principal,
        id: &str,
        patch: SessionPatch,
    ) -> Result<Session, SessionError> {
        patch.validate()?;
        self.mutate(principal, id, |session| {
            patch.apply(session);
            Ok(())
        })
        .map(|(session, ())| session)
    }

    /// Soft delete. The session disappears from every read.
    pub fn deactivate(&self, principal: &Principal, id: &str) -> Result<(), SessionError> {
        self.mutate(principal, id, |session| {
            session.is_active = false;
            Ok(())
        })?;
        debug!(session_id = %id, "Deactivated session");
        Ok(())
    }

    pub fn append_chat(
        &self,
        principal: &Principal,
        id: &str,
        role: Role,
        content: &str,
    ) -> Result<Session, SessionError> {
        self.mutate(principal, id, |session| ledger::append_message(session, role, content))
            .map(|(session, ())| session)
    }

    pub fn record_generation(
        &self,
        principal: &Principal,
        id: &str,
        prompt: &str,
        generated: &Generated,
        typescript: bool,
    ) -> Result<Session, SessionError> {
        self.mutate(principal, id, |session| {
            ledger::apply_generation(session, prompt, &generated.payload, typescript, &generated.source)
        })
        .map(|(session, ())| session)
    }

    pub fn record_refinement(
        &self,
        principal: &Principal,
        id: &str,
        prompt: &str,
        generated: &Generated,
    ) -> Result<Session, SessionError> {
        self.mutate(principal, id, |session| {
            ledger::apply_refinement(session, prompt, &generated.payload, &generated.source)
        })
        .map(|(session, ())| session)
    }

    pub fn record_image_generation(
        &self,
        principal: &Principal,
        id: &str,
        prompt: &str,
        image: ImageRef,
        generated: &Generated,
        typescript: bool,
    ) -> Result<Session, SessionError> {
        self.mutate(principal, id, |session| {
            ledger::apply_image_generation(
                session,
                prompt,
                image,
                &generated.payload,
                typescript,
                &generated.source,
            )
        })
        .map(|(session, ())| session)
    }

    pub fn apply_manual_edit(
        &self,
        principal: &Principal,
        id: &str,
        edit: &ComponentEdit,
    ) -> Result<Session, SessionError> {
        self.mutate(principal, id, |session| ledger::apply_manual_edit(session, edit))
            .map(|(session, ())| session)
    }

    /// Export counts as a mutation: the bumped counter is saved before the
    /// projection is returned.
    pub fn export(&self, principal: &Principal, id: &str) -> Result<SessionExport, SessionError> {
        let (_, export) = self.mutate(principal, id, |session| Ok(ledger::export(session)))?;
        Ok(export)
    }

    fn mutate<T>(
        &self,
        principal: &Principal,
        id: &str,
        apply: impl FnOnce(&mut Session) -> Result<T, ValidationError>,
    ) -> Result<(Session, T), SessionError> {
        let mut session = self.lookup(principal, id)?.found()?;
        let out = apply(&mut session)?;
        session.touch();
        self.persist(&mut session)?;
        Ok((session, out))
    }

    fn persist(&self, session: &mut Session) -> Result<(), SessionError> {
        ledger::recompute_stats(session);
        session.updated_at = chrono::Utc::now();
        self.repo.save(session).map_err(|e| {
            error!(session_id = %session.id, error = %e, "Failed to save session");
            SessionError::from(e)
        })
    }
}
