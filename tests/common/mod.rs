//! Shared utilities for integration testing.

// Each integration test binary compiles its own copy; not every test file
// uses every helper.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};

use http_gateway::config::GatewayConfig;
use http_gateway::routing::{HandlerFactory, PathBindings, RequestHandler};
use http_gateway::{LazyRouter, Shutdown};

/// Handler answering with a fixed body.
pub struct TextHandler(pub &'static str);

#[async_trait]
impl RequestHandler for TextHandler {
    async fn handle(&self, _req: Request<Body>) -> Response {
        self.0.into_response()
    }
}

/// Handler answering with the value of one path binding.
pub struct BindingHandler(pub &'static str);

#[async_trait]
impl RequestHandler for BindingHandler {
    async fn handle(&self, req: Request<Body>) -> Response {
        let value = req
            .extensions()
            .get::<PathBindings>()
            .and_then(|b| b.get(self.0))
            .unwrap_or_default()
            .to_string();
        value.into_response()
    }
}

/// Handler answering with `"{hello} {world}"` from the path bindings.
pub struct GreetingHandler;

#[async_trait]
impl RequestHandler for GreetingHandler {
    async fn handle(&self, req: Request<Body>) -> Response {
        let bindings = req
            .extensions()
            .get::<PathBindings>()
            .cloned()
            .unwrap_or_default();
        let hello = bindings.get("hello").unwrap_or_default();
        let world = bindings.get("world").unwrap_or_default();
        format!("{hello} {world}").into_response()
    }
}

pub fn text_factory(body: &'static str) -> HandlerFactory {
    Arc::new(move || Ok(Arc::new(TextHandler(body)) as Arc<dyn RequestHandler>))
}

pub fn binding_factory(key: &'static str) -> HandlerFactory {
    Arc::new(move || Ok(Arc::new(BindingHandler(key)) as Arc<dyn RequestHandler>))
}

pub fn greeting_factory() -> HandlerFactory {
    Arc::new(|| Ok(Arc::new(GreetingHandler) as Arc<dyn RequestHandler>))
}

/// Spawn a gateway for `handlers` on a loopback port. Returns the bound
/// address and the shutdown handle keeping the server alive.
pub async fn spawn_gateway(handlers: HashMap<String, HandlerFactory>) -> (SocketAddr, Shutdown) {
    let router = Arc::new(LazyRouter::new(handlers).expect("route table should parse"));
    let app = http_gateway::http::build_router(&GatewayConfig::default(), router);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let mut rx = shutdown.subscribe();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = rx.recv().await;
            })
            .await
            .unwrap();
    });

    (addr, shutdown)
}

/// Non-pooling client so each request exercises a fresh connection.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
