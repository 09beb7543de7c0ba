//! REST server.
//!
//! `tiny_http` accepts connections on a blocking thread; each request is
//! handed to the tokio runtime. Shutdown stops the accept loop and cancels
//! every in-flight request.

mod handlers;
mod routes;

pub use handlers::{ApiError, ApiRequest, ApiResponse, AppState, handle};
pub use routes::{Route, RouteMatch, parse_route};

use crate::auth::USER_ID_HEADER;
use crate::error::{Error, Result};
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tiny_http::{Header, Request, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bodies larger than this are refused. Fits a maximal image upload as base64.
pub const MAX_BODY_BYTES: u64 = 8 * 1024 * 1024;

const ACCEPT_POLL: Duration = Duration::from_millis(250);

pub struct ApiServer {
    http: Arc<tiny_http::Server>,
}

impl ApiServer {
    pub fn bind(addr: &str) -> Result<Self> {
        let http = tiny_http::Server::http(addr)
            .map_err(|e| Error::Server(format!("Failed to bind {addr}: {e}")))?;
        Ok(Self {
            http: Arc::new(http),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.http.server_addr().to_ip()
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn run(self, state: Arc<AppState>, shutdown: CancellationToken) -> Result<()> {
        if let Some(addr) = self.local_addr() {
            info!(%addr, "Listening");
        }

        let runtime = tokio::runtime::Handle::current();
        let http = Arc::clone(&self.http);
        let stop = shutdown.clone();

        tokio::task::spawn_blocking(move || {
            while !stop.is_cancelled() {
                match http.recv_timeout(ACCEPT_POLL) {
                    Ok(Some(request)) => {
                        let state = Arc::clone(&state);
                        let cancel = stop.child_token();
                        runtime.spawn(serve_request(state, request, cancel));
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Accept failed"),
                }
            }
        })
        .await
        .map_err(|e| Error::Server(format!("Accept loop panicked: {e}")))?;

        info!("Server stopped");
        Ok(())
    }
}

async fn serve_request(state: Arc<AppState>, mut request: Request, cancel: CancellationToken) {
    let read = tokio::task::spawn_blocking(move || {
        let parsed = read_request(&mut request);
        (request, parsed)
    })
    .await;
    let Ok((request, parsed)) = read else {
        warn!("Request reader panicked");
        return;
    };

    let response = match parsed {
        Ok(api_request) => handle(&state, api_request, &cancel).await,
        Err(err) => err.into(),
    };
    debug!(status = response.status, "Response");

    let written = tokio::task::spawn_blocking(move || request.respond(to_http(&response))).await;
    match written {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Client went away before the response"),
        Err(e) => warn!(error = %e, "Response writer panicked"),
    }
}

fn header(request: &Request, name: &'static str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv(name))
        .map(|h| h.value.as_str().to_string())
}

fn read_request(request: &mut Request) -> std::result::Result<ApiRequest, ApiError> {
    if request
        .body_length()
        .is_some_and(|len| len as u64 > MAX_BODY_BYTES)
    {
        return Err(ApiError::PayloadTooLarge);
    }

    let mut body = String::new();
    request
        .as_reader()
        .take(MAX_BODY_BYTES + 1)
        .read_to_string(&mut body)
        .map_err(|e| ApiError::BadRequest {
            message: format!("Unreadable body: {e}"),
            details: Vec::new(),
        })?;
    if body.len() as u64 > MAX_BODY_BYTES {
        return Err(ApiError::PayloadTooLarge);
    }

    Ok(ApiRequest {
        method: request.method().clone(),
        url: request.url().to_string(),
        authorization: header(request, "Authorization"),
        user_id: header(request, USER_ID_HEADER),
        body,
    })
}

fn to_http(response: &ApiResponse) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut http =
        Response::from_string(response.body.to_string()).with_status_code(StatusCode(response.status));
    if let Ok(content_type) = Header::from_bytes("Content-Type", "application/json") {
        http.add_header(content_type);
    }
    http
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenAuthenticator;
    use crate::generate::{GenerationPipeline, Orchestrator};
    use crate::provider::{CompletionProvider, CompletionRequest, Error as ProviderError};
    use crate::session::{SessionService, SessionStore};
    use crate::studio::Studio;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::HashMap;

    struct Fixed;

    #[async_trait]
    impl CompletionProvider for Fixed {
        async fn complete(&self, _request: CompletionRequest) -> std::result::Result<String, ProviderError> {
            Ok(r#"{"jsx":"<Nav/>","css":"nav{}","explanation":"A nav bar"}"#.into())
        }
    }

    fn state() -> Arc<AppState> {
        let orchestrator = Orchestrator::new(Arc::new(Fixed), vec!["test/model".into()]);
        let pipeline = GenerationPipeline::new(orchestrator, None, Duration::from_secs(60));
        let sessions = SessionService::new(Arc::new(SessionStore::open_in_memory().unwrap()));
        Arc::new(AppState {
            studio: Studio::new(Arc::new(pipeline), sessions),
            auth: Arc::new(TokenAuthenticator::new(HashMap::new(), true)),
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_serves_over_http_until_shutdown() {
        let server = ApiServer::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", server.local_addr().unwrap());
        let shutdown = CancellationToken::new();
        let running = tokio::spawn(server.run(state(), shutdown.clone()));

        let http = reqwest::Client::new();
        let health: Value = http
            .get(format!("{base}/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["success"], true);

        let created = http
            .post(format!("{base}/sessions"))
            .header(USER_ID_HEADER, "carol")
            .json(&json!({ "title": "Nav" }))
            .send()
            .await
            .unwrap();
        assert_eq!(created.status().as_u16(), 201);
        let created: Value = created.json().await.unwrap();
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let generated = http
            .post(format!("{base}/ai/generate"))
            .header(USER_ID_HEADER, "carol")
            .json(&json!({ "prompt": "a nav bar", "sessionId": id }))
            .send()
            .await
            .unwrap();
        assert_eq!(generated.status().as_u16(), 200);
        let generated: Value = generated.json().await.unwrap();
        assert_eq!(generated["data"]["jsx"], "<Nav/>");

        let anonymous = http.get(format!("{base}/sessions")).send().await.unwrap();
        assert_eq!(anonymous.status().as_u16(), 401);

        shutdown.cancel();
        running.await.unwrap().unwrap();
    }

    #[test]
    fn test_bind_failure_is_server_error() {
        let err = ApiServer::bind("not an address").err().unwrap();
        assert!(matches!(err, Error::Server(_)));
    }
}
