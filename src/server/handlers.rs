//! Request dispatch, independent of the HTTP transport.

use super::routes::{Route, RouteMatch, parse_route, split_url};
use crate::auth::{Authenticator, Credentials, Principal};
use crate::error::{FieldError, ValidationError};
use crate::generate::{GenerateError, Generated, GeneratedPayload, GenerationSource};
use crate::session::{
    NewSession, Role, Session, SessionError, SessionPatch, SessionStats,
};
use crate::studio::{
    GenerateRequest, ImageGenerateRequest, RefineRequest, Studio, StudioError, VariationsRequest,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tiny_http::Method;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 100;

/// Shared by every request.
pub struct AppState {
    pub studio: Studio,
    pub auth: Arc<dyn Authenticator>,
}

/// Transport-neutral request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub authorization: Option<String>,
    pub user_id: Option<String>,
    pub body: String,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            authorization: None,
            user_id: None,
            body: String::new(),
        }
    }

    #[must_use]
    pub fn bearer(mut self, token: &str) -> Self {
        self.authorization = Some(format!("Bearer {token}"));
        self
    }

    #[must_use]
    pub fn json(mut self, body: &Value) -> Self {
        self.body = body.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok(data: impl Serialize) -> Self {
        Self::with_status(200, data)
    }

    fn with_status(status: u16, data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self {
                status,
                body: json!({ "success": true, "data": data }),
            },
            Err(e) => {
                error!(error = %e, "Failed to encode response");
                ApiError::Internal.into()
            }
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest {
        message: String,
        details: Vec<FieldError>,
    },
    Unauthorized,
    NotFound,
    MethodNotAllowed,
    PayloadTooLarge,
    /// The request was abandoned mid-generation.
    Cancelled,
    Internal,
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::BadRequest { .. } => 400,
            ApiError::Unauthorized => 401,
            ApiError::NotFound => 404,
            ApiError::MethodNotAllowed => 405,
            ApiError::PayloadTooLarge => 413,
            ApiError::Cancelled => 499,
            ApiError::Internal => 500,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::BadRequest { message, .. } => message,
            ApiError::Unauthorized => "Authentication required",
            ApiError::NotFound => "Not found",
            ApiError::MethodNotAllowed => "Method not allowed",
            ApiError::PayloadTooLarge => "Request body too large",
            ApiError::Cancelled => "Request cancelled",
            ApiError::Internal => "Internal server error",
        }
    }
}

impl From<ApiError> for ApiResponse {
    fn from(err: ApiError) -> Self {
        let mut body = json!({ "success": false, "error": err.message() });
        if let ApiError::BadRequest { details, .. } = &err
            && !details.is_empty()
        {
            body["details"] = json!(details);
        }
        Self {
            status: err.status(),
            body,
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest {
            message: "Validation failed".into(),
            details: err.errors,
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound => ApiError::NotFound,
            SessionError::Validation(v) => v.into(),
            // Logged where it happened; the client gets no detail.
            SessionError::Persistence(_) => ApiError::Internal,
        }
    }
}

impl From<GenerateError> for ApiError {
    fn from(err: GenerateError) -> Self {
        match err {
            GenerateError::Cancelled => ApiError::Cancelled,
            GenerateError::Validation(v) => v.into(),
        }
    }
}

impl From<StudioError> for ApiError {
    fn from(err: StudioError) -> Self {
        match err {
            StudioError::Validation(v) => v.into(),
            StudioError::Session(e) => e.into(),
            StudioError::Generate(e) => e.into(),
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    let body = if body.trim().is_empty() { "{}" } else { body };
    serde_json::from_str(body).map_err(|e| ApiError::BadRequest {
        message: format!("Invalid JSON body: {e}"),
        details: Vec::new(),
    })
}

/// Route, authenticate and run one request.
pub async fn handle(state: &AppState, request: ApiRequest, cancel: &CancellationToken) -> ApiResponse {
    let route = match parse_route(&request.method, &request.url) {
        RouteMatch::Found(route) => route,
        RouteMatch::MethodNotAllowed => return ApiError::MethodNotAllowed.into(),
        RouteMatch::NotFound => return ApiError::NotFound.into(),
    };

    if !route.requires_principal() {
        return ApiResponse::ok(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }));
    }

    let credentials = Credentials {
        authorization: request.authorization.as_deref(),
        user_id: request.user_id.as_deref(),
    };
    let Some(principal) = state.auth.authenticate(&credentials) else {
        return ApiError::Unauthorized.into();
    };

    debug!(method = %request.method, url = %request.url, user_id = %principal.id, "Request");
    match dispatch(state, &principal, route, &request, cancel).await {
        Ok(response) => response,
        Err(err) => err.into(),
    }
}

async fn dispatch(
    state: &AppState,
    principal: &Principal,
    route: Route,
    request: &ApiRequest,
    cancel: &CancellationToken,
) -> Result<ApiResponse, ApiError> {
    let sessions = state.studio.sessions();

    let response = match route {
        Route::Health => ApiResponse::ok(json!({ "status": "ok" })),

        Route::CreateSession => {
            let new: NewSession = parse_body(&request.body)?;
            ApiResponse::with_status(201, sessions.create(principal, new)?)
        }
        Route::ListSessions => {
            let limit = list_limit(&request.url)?;
            let listed = sessions.list(principal, limit)?;
            let items: Vec<SessionSummary> = listed.iter().map(SessionSummary::from).collect();
            let total = sessions.count_active(principal)?;
            ApiResponse::ok(json!({ "sessions": items, "total": total }))
        }
        Route::GetSession(id) => ApiResponse::ok(sessions.get(principal, &id)?),
        Route::UpdateSession(id) => {
            let patch: SessionPatch = parse_body(&request.body)?;
            ApiResponse::ok(sessions.update(principal, &id, patch)?)
        }
        Route::DeleteSession(id) => {
            sessions.deactivate(principal, &id)?;
            ApiResponse::ok(json!({ "id": id, "deleted": true }))
        }
        Route::AppendChat(id) => {
            let input: ChatInput = parse_body(&request.body)?;
            ApiResponse::ok(sessions.append_chat(principal, &id, input.role, &input.content)?)
        }
        Route::ExportSession(id) => ApiResponse::ok(sessions.export(principal, &id)?),

        Route::Generate => {
            let req: GenerateRequest = parse_body(&request.body)?;
            let outcome = state.studio.generate(principal, req, cancel).await?;
            ApiResponse::ok(GenerationBody::new(&outcome.generated, outcome.session.as_ref()))
        }
        Route::Refine => {
            let req: RefineRequest = parse_body(&request.body)?;
            let outcome = state.studio.refine(principal, req, cancel).await?;
            ApiResponse::ok(GenerationBody::new(&outcome.generated, outcome.session.as_ref()))
        }
        Route::GenerateVariations => {
            let req: VariationsRequest = parse_body(&request.body)?;
            let variations = state.studio.generate_variations(principal, req, cancel).await?;
            ApiResponse::ok(json!({ "variations": variations }))
        }
        Route::GenerateWithImage => {
            let req: ImageGenerateRequest = parse_body(&request.body)?;
            let outcome = state.studio.generate_with_image(principal, req, cancel).await?;
            ApiResponse::ok(GenerationBody::new(&outcome.generated, outcome.session.as_ref()))
        }
    };

    Ok(response)
}

fn list_limit(url: &str) -> Result<usize, ApiError> {
    let (_, query) = split_url(url);
    let Some((_, raw)) = query.iter().find(|(k, _)| k == "limit") else {
        return Ok(DEFAULT_LIST_LIMIT);
    };
    match raw.parse::<usize>() {
        Ok(n) if (1..=MAX_LIST_LIMIT).contains(&n) => Ok(n),
        _ => Err(ValidationError::field("limit", format!("must be between 1 and {MAX_LIST_LIMIT}")).into()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatInput {
    #[serde(default = "default_role")]
    role: Role,
    content: String,
}

fn default_role() -> Role {
    Role::User
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionSummary<'a> {
    id: &'a str,
    title: &'a str,
    description: &'a str,
    tags: &'a [String],
    stats: SessionStats,
    updated_at: DateTime<Utc>,
    last_accessed: DateTime<Utc>,
}

impl<'a> From<&'a Session> for SessionSummary<'a> {
    fn from(s: &'a Session) -> Self {
        Self {
            id: &s.id,
            title: &s.title,
            description: &s.description,
            tags: &s.tags,
            stats: s.stats,
            updated_at: s.updated_at,
            last_accessed: s.last_accessed,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationBody<'a> {
    #[serde(flatten)]
    payload: &'a GeneratedPayload,
    source: &'a GenerationSource,
    is_mock: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<&'a Session>,
}

impl<'a> GenerationBody<'a> {
    fn new(generated: &'a Generated, session: Option<&'a Session>) -> Self {
        Self {
            payload: &generated.payload,
            source: &generated.source,
            is_mock: generated.source.is_mock(),
            session,
        }
    }
}
