//! Deferred-construction route lookup and dispatch.
//!
//! # Responsibilities
//! - Order registered patterns once, longest first
//! - Resolve a request to a handler plus extracted path bindings
//! - Build each handler on first use only, through the handler cache
//!
//! # Data Flow
//! ```text
//! Incoming request (path, method, host)
//!     → ordered candidate walk (pattern.rs)
//!     → winning pattern consults the handler cache (cache.rs)
//!     → cache miss runs the registered constructor, memoizes on success
//!     → Return: (handler, bindings) or explicit no-match
//! ```
//!
//! # Design Decisions
//! - Pattern table immutable after construction; the cache is the only
//!   shared mutable state
//! - Longest registration wins when several could match
//! - Construction errors surface to the caller and are never memoized

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use thiserror::Error;

use crate::routing::cache::HandlerCache;
use crate::routing::pattern::{PatternError, RoutePattern, TemplateCache};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The unit of request-serving logic bound to a winning route pattern.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, req: Request<Body>) -> Response;
}

impl std::fmt::Debug for dyn RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RequestHandler")
    }
}

/// Deferred constructor for a route's handler. Invoked at most once per
/// pattern, on the first request that resolves to it.
pub type HandlerFactory = Arc<dyn Fn() -> Result<Arc<dyn RequestHandler>, BoxError> + Send + Sync>;

/// Path variables captured by a wildcard match, in declaration order.
///
/// Installed into the request's extensions before dispatch; scoped to that
/// one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathBindings(Vec<(String, String)>);

impl PathBindings {
    pub fn new(values: Vec<(String, String)>) -> Self {
        Self(values)
    }

    /// Value of the first binding named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Request-time routing failure.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The winning pattern's constructor failed. Not cached; the next
    /// request to hit the pattern will retry construction.
    #[error("failed to construct handler for pattern '{pattern}': {source}")]
    Construction {
        pattern: String,
        #[source]
        source: BoxError,
    },
}

struct Route {
    pattern: RoutePattern,
    factory: HandlerFactory,
}

/// A router that defers building each endpoint's handler until a request
/// actually selects it.
///
/// Routing itself mirrors the standard mux conventions: literal patterns
/// match by prefix, `{name}` patterns match segment-for-segment, and the
/// longest registration wins. What differs is handler lifetime:
/// registration stores only constructors, and the first request to resolve
/// a pattern pays its construction cost. Useful where process startup is on
/// the request path (serverless adapters) and most routes never run.
pub struct LazyRouter {
    routes: Vec<Route>,
    cache: HandlerCache,
}

impl LazyRouter {
    /// Build a router from a registration table. Every key is parsed and
    /// compiled up front; a malformed key fails construction rather than
    /// surfacing per-request.
    pub fn new(handlers: HashMap<String, HandlerFactory>) -> Result<Self, PatternError> {
        let mut templates = TemplateCache::new();
        let mut routes = Vec::with_capacity(handlers.len());

        for (key, factory) in handlers {
            let pattern = RoutePattern::parse_with(&key, &mut templates)?;
            routes.push(Route { pattern, factory });
        }

        // Longest registration first, so the more specific pattern wins
        // when two could match the same request.
        routes.sort_by(|a, b| {
            b.pattern
                .key()
                .len()
                .cmp(&a.pattern.key().len())
                .then_with(|| a.pattern.key().cmp(b.pattern.key()))
        });

        Ok(Self {
            routes,
            cache: HandlerCache::new(),
        })
    }

    /// Resolve a request to a handler and its path bindings.
    ///
    /// `Ok(None)` means no registered pattern matched. An `Err` means a
    /// pattern matched but its handler could not be built.
    pub fn resolve(
        &self,
        path: &str,
        method: &Method,
        host: Option<&str>,
    ) -> Result<Option<(Arc<dyn RequestHandler>, PathBindings)>, RouteError> {
        for route in &self.routes {
            let Some(values) = route.pattern.match_request(path, method, host) else {
                continue;
            };

            let key = route.pattern.key();
            tracing::debug!(pattern = key, path, "route matched");

            let handler = self
                .cache
                .get_or_construct(key, || (route.factory)())
                .map_err(|source| RouteError::Construction {
                    pattern: key.to_string(),
                    source,
                })?;

            return Ok(Some((handler, PathBindings::new(values))));
        }

        Ok(None)
    }

    /// Number of registered patterns.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Number of handlers constructed so far.
    pub fn constructed_count(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::response::IntoResponse;

    struct Static(&'static str);

    #[async_trait]
    impl RequestHandler for Static {
        async fn handle(&self, _req: Request<Body>) -> Response {
            self.0.into_response()
        }
    }

    fn static_factory(body: &'static str) -> HandlerFactory {
        Arc::new(move || Ok(Arc::new(Static(body)) as Arc<dyn RequestHandler>))
    }

    fn router(entries: Vec<(&str, HandlerFactory)>) -> LazyRouter {
        let handlers = entries
            .into_iter()
            .map(|(k, f)| (k.to_string(), f))
            .collect();
        LazyRouter::new(handlers).unwrap()
    }

    fn resolve_path(
        router: &LazyRouter,
        path: &str,
    ) -> Option<(Arc<dyn RequestHandler>, PathBindings)> {
        router.resolve(path, &Method::GET, None).unwrap()
    }

    #[test]
    fn test_longest_pattern_wins() {
        let r = router(vec![
            ("/foo", static_factory("foo")),
            ("/foo/bar", static_factory("bar")),
        ]);

        let (_, bindings) = resolve_path(&r, "/foo/bar").expect("match");
        assert!(bindings.is_empty());
        // The winner is /foo/bar, so only that handler was constructed.
        assert_eq!(r.constructed_count(), 1);

        resolve_path(&r, "/foo").expect("match");
        assert_eq!(r.constructed_count(), 2);
    }

    #[test]
    fn test_no_match_is_none_and_uncached() {
        let r = router(vec![("/foo", static_factory("foo"))]);
        assert!(resolve_path(&r, "/bar").is_none());
        assert_eq!(r.constructed_count(), 0);
    }

    #[test]
    fn test_trailing_slash_resolves_like_bare_path() {
        let r = router(vec![("/foo", static_factory("foo"))]);
        let a = resolve_path(&r, "/foo").expect("match");
        let b = resolve_path(&r, "/foo/").expect("match");
        assert!(Arc::ptr_eq(&a.0, &b.0));
    }

    #[test]
    fn test_wildcard_bindings_in_declaration_order() {
        let r = router(vec![("/{hello}/omg/wtf/{world}", static_factory("pv"))]);
        let (_, bindings) = resolve_path(&r, "/horse/omg/wtf/email").expect("match");
        assert_eq!(bindings.get("hello"), Some("horse"));
        assert_eq!(bindings.get("world"), Some("email"));
        let order: Vec<_> = bindings.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(order, vec!["hello", "world"]);
    }

    #[test]
    fn test_method_mismatch_is_no_match_not_error() {
        let r = router(vec![("POST /foo/post", static_factory("post"))]);
        assert!(r.resolve("/foo/post", &Method::GET, None).unwrap().is_none());
        assert!(r.resolve("/foo/post", &Method::POST, None).unwrap().is_some());
    }

    #[test]
    fn test_host_mismatch_is_no_match() {
        let r = router(vec![("example.com/data", static_factory("data"))]);
        assert!(r.resolve("/data", &Method::GET, None).unwrap().is_none());
        assert!(r
            .resolve("/data", &Method::GET, Some("example.com"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counting = calls.clone();
        let factory: HandlerFactory = Arc::new(move || {
            counting.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Static("once")) as Arc<dyn RequestHandler>)
        });

        let r = router(vec![("/once", factory)]);
        let first = resolve_path(&r, "/once").expect("match");
        let second = resolve_path(&r, "/once").expect("match");

        assert!(Arc::ptr_eq(&first.0, &second.0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_construction_error_surfaces_and_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counting = calls.clone();
        let factory: HandlerFactory = Arc::new(move || {
            if counting.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("flaky init".into())
            } else {
                Ok(Arc::new(Static("recovered")) as Arc<dyn RequestHandler>)
            }
        });

        let r = router(vec![("/flaky", factory)]);

        let err = r.resolve("/flaky", &Method::GET, None).unwrap_err();
        assert!(matches!(err, RouteError::Construction { ref pattern, .. } if pattern == "/flaky"));
        assert_eq!(r.constructed_count(), 0);

        // The failure was not cached, so the next request retries.
        assert!(r.resolve("/flaky", &Method::GET, None).unwrap().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_malformed_registration_fails_construction() {
        let mut handlers: HashMap<String, HandlerFactory> = HashMap::new();
        handlers.insert("FETCH /nope".to_string(), static_factory("nope"));
        assert!(LazyRouter::new(handlers).is_err());
    }

    #[tokio::test]
    async fn test_concurrent_first_access_constructs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counting = calls.clone();
        let factory: HandlerFactory = Arc::new(move || {
            counting.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Static("racy")) as Arc<dyn RequestHandler>)
        });

        let r = Arc::new(router(vec![("/racy", factory)]));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let r = r.clone();
                tokio::spawn(
                    async move { r.resolve("/racy", &Method::GET, None).unwrap().is_some() },
                )
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(r.constructed_count(), 1);
    }
}
