//! Request handler for the single-route HTTP transport.

use super::Route;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE, LOCATION};
use hyper::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

const NOT_FOUND_BODY: &[u8] = b"404 page not found\n";

/// Whether `path` is served by `route`.
///
/// A route ending in `/` matches itself and everything below it; any other
/// route must match exactly. Query strings are not part of `path`.
pub fn route_matches(route: &str, path: &str) -> bool {
    if route.ends_with('/') {
        path.starts_with(route)
    } else {
        path == route
    }
}

/// For a subtree route, the location `path` should be redirected to when it
/// names the subtree root without its trailing slash.
pub fn redirect_target(route: &str, path: &str, query: Option<&str>) -> Option<String> {
    let root = route.strip_suffix('/').filter(|root| !root.is_empty())?;
    if path != root {
        return None;
    }
    Some(match query {
        Some(query) => format!("{route}?{query}"),
        None => route.to_string(),
    })
}

/// Answer one request: payload on the route, a redirect to a subtree
/// route's root, 404 elsewhere.
pub async fn handle_request(
    route: Arc<Route>,
    peer: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path();

    if let Some(location) = redirect_target(&route.path, path, req.uri().query()) {
        if let Ok(location) = HeaderValue::from_str(&location) {
            debug!(ip = %peer.ip(), path, "Redirecting to subtree route");
            return Ok(moved_permanently(location));
        }
    }

    if !route_matches(&route.path, path) {
        debug!(ip = %peer.ip(), method = %req.method(), path, "No route");
        return Ok(not_found());
    }

    info!(ip = %peer.ip(), method = %req.method(), path, "Serving content over HTTP");
    Ok(Response::new(Full::new(route.body.clone())))
}

fn moved_permanently(location: HeaderValue) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::MOVED_PERMANENTLY;
    response.headers_mut().insert(LOCATION, location);
    response
}

fn not_found() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(NOT_FOUND_BODY)));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtree_route() {
        assert!(route_matches("/", "/"));
        assert!(route_matches("/", "/flag"));
        assert!(route_matches("/static/", "/static/a/b"));
        assert!(!route_matches("/static/", "/static"));
    }

    #[test]
    fn test_exact_route() {
        assert!(route_matches("/f", "/f"));
        assert!(!route_matches("/f", "/f/"));
        assert!(!route_matches("/f", "/flag"));
        assert!(!route_matches("/f", "/"));
    }

    #[test]
    fn test_redirect_target() {
        assert_eq!(
            redirect_target("/static/", "/static", None),
            Some("/static/".to_string())
        );
        assert_eq!(
            redirect_target("/static/", "/static", Some("a=1")),
            Some("/static/?a=1".to_string())
        );
        assert_eq!(redirect_target("/static/", "/static/", None), None);
        assert_eq!(redirect_target("/static/", "/stat", None), None);
        assert_eq!(redirect_target("/", "", None), None);
        assert_eq!(redirect_target("/f", "/f", None), None);
    }

    #[test]
    fn test_not_found_response() {
        let response = not_found();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }
}
