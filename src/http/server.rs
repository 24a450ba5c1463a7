//! HTTP gateway assembly.
//!
//! # Responsibilities
//! - Build the Axum router dispatching every request into the lazy router
//! - Wire up middleware (timeout, request ID, tracing)
//! - Convert routing outcomes to HTTP statuses at the boundary
//! - Record per-request metrics
//!
//! # Design Decisions
//! - One catch-all route; all real routing happens in `routing::LazyRouter`
//! - Path bindings ride the request extensions into the handler
//! - Routing errors never leak internals into the response body

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::http::request::{self, UuidRequestId};
use crate::observability::metrics;
use crate::routing::{LazyRouter, RouteError};

/// Application state injected into the gateway handler.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<LazyRouter>,
}

/// Build the Axum router with all middleware layers.
pub fn build_router(config: &GatewayConfig, router: Arc<LazyRouter>) -> Router {
    let state = AppState { router };

    Router::new()
        .route("/{*path}", any(gateway_handler))
        .route("/", any(gateway_handler))
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.timeouts.request_secs,
        )))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
}

/// Main gateway handler. Resolves the route, installs path bindings, and
/// dispatches into the (possibly just-constructed) handler.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request::request_id(&request).unwrap_or("unknown").to_string();

    let path = request.uri().path().to_string();
    let method = request.method().clone();
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        "dispatching request"
    );

    let response = match state.router.resolve(&path, &method, host.as_deref()) {
        Ok(Some((handler, bindings))) => {
            let mut request = request;
            request.extensions_mut().insert(bindings);
            handler.handle(request).await
        }
        Ok(None) => {
            tracing::warn!(request_id = %request_id, path = %path, "no route matched");
            (StatusCode::NOT_FOUND, "Not found").into_response()
        }
        Err(RouteError::Construction { pattern, source }) => {
            tracing::error!(
                request_id = %request_id,
                path = %path,
                pattern = %pattern,
                error = %source,
                "failed to construct handler"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    };

    metrics::record_request(
        method.as_str(),
        response.status().as_u16(),
        &path,
        start_time,
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use async_trait::async_trait;
    use tower::ServiceExt;

    use crate::routing::{HandlerFactory, PathBindings, RequestHandler};

    struct Echo;

    #[async_trait]
    impl RequestHandler for Echo {
        async fn handle(&self, req: Request<Body>) -> Response {
            let bindings = req
                .extensions()
                .get::<PathBindings>()
                .cloned()
                .unwrap_or_default();
            let body = bindings
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            body.into_response()
        }
    }

    fn test_app(entries: Vec<&str>) -> Router {
        let handlers: HashMap<String, HandlerFactory> = entries
            .into_iter()
            .map(|key| {
                let factory: HandlerFactory =
                    Arc::new(|| Ok(Arc::new(Echo) as Arc<dyn RequestHandler>));
                (key.to_string(), factory)
            })
            .collect();
        let router = Arc::new(LazyRouter::new(handlers).unwrap());
        build_router(&GatewayConfig::default(), router)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    #[tokio::test]
    async fn test_bindings_reach_the_handler() {
        let app = test_app(vec!["/id/{id}"]);
        let (status, body) = get(app, "/id/1234").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "id=1234");
    }

    #[tokio::test]
    async fn test_unmatched_path_is_404() {
        let app = test_app(vec!["/id/{id}"]);
        let (status, _) = get(app, "/other").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_construction_failure_is_500() {
        let factory: HandlerFactory = Arc::new(|| Err("init exploded".into()));
        let handlers = HashMap::from([("/broken".to_string(), factory)]);
        let router = Arc::new(LazyRouter::new(handlers).unwrap());
        let app = build_router(&GatewayConfig::default(), router);

        let (status, body) = get(app, "/broken").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        // The failure reason stays in the logs, not the body.
        assert_eq!(body, "Internal server error");
    }

    #[tokio::test]
    async fn test_response_carries_request_id() {
        let app = test_app(vec!["/id/{id}"]);
        let response = app
            .oneshot(Request::builder().uri("/id/1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }
}
