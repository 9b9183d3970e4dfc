//! Proxy server: shared state, router and lifecycle.
//!
//! # Usage
//!
//! ```rust,ignore
//! use aip::{Config, ProxyServer};
//!
//! let mut config = Config::default();
//! config.proxy.target = "http://localhost:11434/v1".to_string();
//!
//! let server = ProxyServer::new(config)?;
//! server.run().await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use super::dispatch::proxy_handler;
use super::stats::{RequestStats, RequestSummary};
use crate::cache::{CacheStats, ResponseCache};
use crate::compress::{Savings, TextCompressor};
use crate::config::Config;
use crate::error::{ProxyError, Result};

/// Shared proxy state, built once at startup
pub struct ProxyState {
    pub(crate) config: Config,
    pub(crate) client: Client,
    pub(crate) compressor: TextCompressor,
    pub(crate) cache: ResponseCache,
    pub(crate) stats: Arc<RequestStats>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ProxyState {
    fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.proxy.timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ProxyError::Network(format!("Failed to create HTTP client: {e}")))?;

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            compressor: TextCompressor::new(config.compression.level),
            cache: ResponseCache::new(&config.cache),
            stats: Arc::new(RequestStats::new()),
            client,
            config,
            shutdown_tx,
        })
    }
}

/// Compressing, caching reverse proxy
pub struct ProxyServer {
    state: Arc<ProxyState>,
}

impl ProxyServer {
    /// Create a new proxy server
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            state: Arc::new(ProxyState::new(config)?),
        })
    }

    /// Get the router for the proxy
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/stats", get(stats_handler))
            .route("/stats/reset", post(reset_stats_handler))
            .fallback(proxy_handler)
            .layer(DefaultBodyLimit::max(self.state.config.proxy.max_body_size))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state))
    }

    /// Bind the configured address and serve until ctrl-c or [`shutdown`].
    ///
    /// [`shutdown`]: ProxyServer::shutdown
    pub async fn run(&self) -> Result<()> {
        let addr = self.state.config.proxy.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ProxyError::Server(format!("Failed to bind {addr}: {e}")))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let config = &self.state.config;
        tracing::info!("AIP proxy listening on {}", listener.local_addr()?);
        tracing::info!("Upstream: {}", config.proxy.target_base());
        tracing::info!("Compression level: {}", config.compression.level);
        if self.state.cache.is_enabled() {
            tracing::info!(
                "Response cache: ttl={}s, max_entries={}",
                config.cache.ttl_secs,
                self.state.cache.max_entries()
            );
        } else {
            tracing::info!("Response cache: disabled");
        }

        let mut shutdown_rx = self.state.shutdown_tx.subscribe();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Received ctrl-c, shutting down");
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Shutdown requested");
                    }
                }
            })
            .await
            .map_err(|e| ProxyError::Server(e.to_string()))
    }

    /// Snapshot of every counter
    pub fn stats(&self) -> StatsReport {
        StatsReport::collect(&self.state)
    }

    /// Send shutdown signal
    pub fn shutdown(&self) {
        let _ = self.state.shutdown_tx.send(());
    }
}

/// Body of `GET /stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    /// Compression savings
    pub compressor: Savings,
    /// Response cache counters
    pub cache: CacheStats,
    /// Request counters and latencies
    pub requests: RequestSummary,
}

impl StatsReport {
    fn collect(state: &ProxyState) -> Self {
        Self {
            compressor: state.compressor.savings(),
            cache: state.cache.stats(),
            requests: state.stats.summary(),
        }
    }
}

// === Handlers ===

async fn health_handler(State(state): State<Arc<ProxyState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "aip-proxy",
        "version": env!("CARGO_PKG_VERSION"),
        "target": state.config.proxy.target_base(),
        "compression_level": u8::from(state.compressor.level()),
        "stats": state.stats.summary()
    }))
}

async fn stats_handler(State(state): State<Arc<ProxyState>>) -> impl IntoResponse {
    Json(StatsReport::collect(&state))
}

async fn reset_stats_handler(State(state): State<Arc<ProxyState>>) -> impl IntoResponse {
    state.stats.reset();
    state.compressor.reset();
    Json(json!({"status": "reset"}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::proxy::RequestEvent;

    fn server() -> ProxyServer {
        let mut config = Config::default();
        config.proxy.target = "http://127.0.0.1:9/v1/".to_string();
        ProxyServer::new(config).unwrap()
    }

    async fn get_json(router: Router, uri: &str) -> Value {
        let response = router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn test_proxy_state_creation() {
        let state = ProxyState::new(Config::default()).unwrap();
        assert_eq!(state.stats.total_requests(), 0);
        assert!(state.cache.is_enabled());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = Config::default();
        config.proxy.target = "ftp://example.com".to_string();
        assert!(ProxyServer::new(config).is_err());
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let body = get_json(server().router(), "/health").await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "aip-proxy");
        assert_eq!(body["target"], "http://127.0.0.1:9/v1");
        assert_eq!(body["compression_level"], 2);
        assert_eq!(body["stats"]["total_requests"], 0);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let body = get_json(server().router(), "/stats").await;
        assert_eq!(body["compressor"]["calls"], 0);
        assert_eq!(body["cache"]["entries"], 0);
        assert_eq!(body["cache"]["max_entries"], 200);
        assert_eq!(body["requests"]["total_requests"], 0);
    }

    #[tokio::test]
    async fn test_reset_endpoint() {
        let server = server();
        server.state.stats.record(RequestEvent::new(
            "/v1/models",
            Duration::from_millis(3),
            200,
        ));
        assert_eq!(server.stats().requests.total_requests, 1);

        let response = server
            .router()
            .oneshot(
                Request::post("/stats/reset")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(server.stats().requests.total_requests, 0);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let response = server()
            .router()
            .oneshot(Request::get("/v1/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"]["type"], "proxy_error");
    }
}
