//! Request principals.
//!
//! Credential issuance lives outside this crate. A request carries either a
//! bearer token that the configured token map resolves to a user id, or,
//! behind a trusted proxy, the user id itself in `X-User-Id`.

use crate::config::AuthSettings;
use std::collections::HashMap;
use std::fmt;

pub const USER_ID_HEADER: &str = "X-User-Id";

/// The authenticated user a request acts for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    pub id: String,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Raw identity headers of one request.
#[derive(Debug, Clone, Copy, Default)]
pub struct Credentials<'a> {
    pub authorization: Option<&'a str>,
    pub user_id: Option<&'a str>,
}

pub trait Authenticator: Send + Sync {
    /// `None` means unauthenticated.
    fn authenticate(&self, credentials: &Credentials<'_>) -> Option<Principal>;
}

/// Static token map plus optional trusted user header.
pub struct TokenAuthenticator {
    tokens: HashMap<String, String>,
    trust_user_header: bool,
}

impl fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthenticator")
            .field("tokens", &self.tokens.len())
            .field("trust_user_header", &self.trust_user_header)
            .finish()
    }
}

impl TokenAuthenticator {
    pub fn new(tokens: HashMap<String, String>, trust_user_header: bool) -> Self {
        Self {
            tokens,
            trust_user_header,
        }
    }

    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self::new(settings.tokens.clone(), settings.trust_user_header)
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

impl Authenticator for TokenAuthenticator {
    fn authenticate(&self, credentials: &Credentials<'_>) -> Option<Principal> {
        if let Some(token) = credentials.authorization.and_then(bearer_token) {
            return self.tokens.get(token).map(|id| Principal::new(id.clone()));
        }

        if self.trust_user_header
            && let Some(id) = credentials.user_id.map(str::trim)
            && !id.is_empty()
        {
            return Some(Principal::new(id));
        }

        None
    }
}
