use tiny_http::Method;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Health,
    CreateSession,
    ListSessions,
    GetSession(String),
    UpdateSession(String),
    DeleteSession(String),
    AppendChat(String),
    ExportSession(String),
    Generate,
    Refine,
    GenerateVariations,
    GenerateWithImage,
}

impl Route {
    /// Everything but the health probe needs a principal.
    pub fn requires_principal(&self) -> bool {
        !matches!(self, Route::Health)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMatch {
    Found(Route),
    /// Known path, wrong method.
    MethodNotAllowed,
    NotFound,
}

/// Path and query of a request URL.
pub fn split_url(url: &str) -> (String, Vec<(String, String)>) {
    match Url::parse("http://localhost").and_then(|base| base.join(url)) {
        Ok(parsed) => (
            parsed.path().to_string(),
            parsed
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        ),
        Err(_) => (url.to_string(), Vec::new()),
    }
}

pub fn parse_route(method: &Method, url: &str) -> RouteMatch {
    let (path, _) = split_url(url);
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    let route = match (method, segments.as_slice()) {
        (Method::Get, ["health"]) => Route::Health,

        (Method::Post, ["sessions"]) => Route::CreateSession,
        (Method::Get, ["sessions"]) => Route::ListSessions,
        (Method::Get, ["sessions", id]) => Route::GetSession((*id).to_string()),
        (Method::Put, ["sessions", id]) => Route::UpdateSession((*id).to_string()),
        (Method::Delete, ["sessions", id]) => Route::DeleteSession((*id).to_string()),
        (Method::Post, ["sessions", id, "chat"]) => Route::AppendChat((*id).to_string()),
        (Method::Get, ["sessions", id, "export"]) => Route::ExportSession((*id).to_string()),

        (Method::Post, ["ai", "generate"]) => Route::Generate,
        (Method::Post, ["ai", "refine"]) => Route::Refine,
        (Method::Post, ["ai", "generate-variations"]) => Route::GenerateVariations,
        (Method::Post, ["ai", "generate-with-image"]) => Route::GenerateWithImage,

        (_, ["health" | "sessions"])
        | (_, ["sessions", _])
        | (_, ["sessions", _, "chat" | "export"])
        | (_, ["ai", "generate" | "refine" | "generate-variations" | "generate-with-image"]) => {
            return RouteMatch::MethodNotAllowed;
        }
        _ => return RouteMatch::NotFound,
    };

    RouteMatch::Found(route)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found(method: Method, url: &str) -> Route {
        match parse_route(&method, url) {
            RouteMatch::Found(route) => route,
            other => panic!("{url}: {other:?}"),
        }
    }

    #[test]
    fn test_session_routes() {
        assert_eq!(found(Method::Post, "/sessions"), Route::CreateSession);
        assert_eq!(found(Method::Get, "/sessions?limit=5"), Route::ListSessions);
        assert_eq!(found(Method::Get, "/sessions/abc"), Route::GetSession("abc".into()));
        assert_eq!(found(Method::Put, "/sessions/abc/"), Route::UpdateSession("abc".into()));
        assert_eq!(found(Method::Delete, "/sessions/abc"), Route::DeleteSession("abc".into()));
        assert_eq!(found(Method::Post, "/sessions/abc/chat"), Route::AppendChat("abc".into()));
        assert_eq!(found(Method::Get, "/sessions/abc/export"), Route::ExportSession("abc".into()));
    }

    #[test]
    fn test_ai_routes() {
        assert_eq!(found(Method::Post, "/ai/generate"), Route::Generate);
        assert_eq!(found(Method::Post, "/ai/refine"), Route::Refine);
        assert_eq!(found(Method::Post, "/ai/generate-variations"), Route::GenerateVariations);
        assert_eq!(found(Method::Post, "/ai/generate-with-image"), Route::GenerateWithImage);
        assert!(Route::Generate.requires_principal());
        assert!(!found(Method::Get, "/health").requires_principal());
    }

    #[test]
    fn test_wrong_method_and_unknown_path() {
        assert_eq!(parse_route(&Method::Get, "/ai/generate"), RouteMatch::MethodNotAllowed);
        assert_eq!(parse_route(&Method::Patch, "/sessions/abc"), RouteMatch::MethodNotAllowed);
        assert_eq!(parse_route(&Method::Get, "/nope"), RouteMatch::NotFound);
        assert_eq!(parse_route(&Method::Get, "/sessions/a/b/c"), RouteMatch::NotFound);
    }

    #[test]
    fn test_split_url_decodes_query() {
        let (path, query) = split_url("/sessions?limit=5&q=a%20b");
        assert_eq!(path, "/sessions");
        assert_eq!(query, vec![("limit".into(), "5".into()), ("q".into(), "a b".into())]);
    }
}
