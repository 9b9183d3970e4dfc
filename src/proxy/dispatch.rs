//! Catch-all request dispatcher.
//!
//! Every request that is not a local endpoint lands here and is forwarded
//! to `target + path (+ ?query)`. `POST .../chat/completions` bodies that
//! parse as a chat request additionally go through the response cache and
//! the text compressor; anything else travels untouched.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::Stream;
use serde_json::{json, Value};
use tracing::Instrument;
use uuid::Uuid;

use super::headers::{self, BUFFERED_RESPONSE_STRIP, REQUEST_STRIP, STREAMING_RESPONSE_STRIP};
use super::server::ProxyState;
use super::stats::{RequestEvent, RequestStats};
use crate::compress::TextCompressor;
use crate::error::ProxyError;
use crate::protocol::{is_chat_path, replace_messages, ChatRequest};

/// How an inbound request is handled
#[derive(Debug)]
pub(crate) enum Inbound {
    /// Forward the original bytes untouched
    Raw,
    /// Parsed chat completion request
    Chat(ChatRequest),
}

impl Inbound {
    /// Classify a request. Malformed chat bodies fall back to [`Inbound::Raw`].
    pub(crate) fn classify(method: &Method, path: &str, body: &[u8]) -> Self {
        if method != Method::POST || !is_chat_path(path) {
            return Inbound::Raw;
        }

        match ChatRequest::from_slice(body) {
            Ok(request) => Inbound::Chat(request),
            Err(e) => {
                tracing::debug!("Forwarding chat body unparsed: {}", e);
                Inbound::Raw
            },
        }
    }

    fn is_streaming(&self) -> bool {
        matches!(self, Inbound::Chat(request) if request.is_streaming())
    }
}

/// Fallback handler proxying everything to the upstream
pub(crate) async fn proxy_handler(
    State(state): State<Arc<ProxyState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let span = tracing::info_span!(
        "proxy",
        request_id = %Uuid::new_v4(),
        method = %method,
        path = %uri.path(),
    );
    dispatch(state, method, uri, headers, body)
        .instrument(span)
        .await
}

async fn dispatch(
    state: Arc<ProxyState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let start = Instant::now();
    let path = uri.path().to_string();
    let inbound = Inbound::classify(&method, &path, &body);

    if let Inbound::Chat(request) = &inbound {
        if !request.is_streaming() {
            if let Some(payload) = state.cache.lookup(request) {
                state
                    .stats
                    .record(RequestEvent::new(path, start.elapsed(), 200).cached());
                return (StatusCode::OK, Json(payload)).into_response();
            }
        }
    }

    let outbound = match &inbound {
        Inbound::Chat(request) => compress_body(&state.compressor, request, &body),
        Inbound::Raw => body,
    };

    let url = upstream_url(state.config.proxy.target_base(), &uri);
    tracing::debug!(url = %url, bytes = outbound.len(), "Forwarding upstream");

    let sent = state
        .client
        .request(method, url.as_str())
        .headers(headers::without(&headers, REQUEST_STRIP))
        .body(outbound)
        .send()
        .await;

    let response = match sent {
        Ok(response) => response,
        Err(e) => {
            let timed_out = e.is_timeout();
            let error = ProxyError::from(e);
            tracing::warn!("Failed to reach upstream: {}", error);
            let relayed = gateway_error(&error, timed_out);
            state.stats.record(RequestEvent::new(
                path,
                start.elapsed(),
                relayed.status().as_u16(),
            ));
            return relayed;
        },
    };

    if inbound.is_streaming() {
        return relay_stream(&state.stats, response, path, start);
    }

    let cache_as = match inbound {
        Inbound::Chat(request) => Some(request),
        Inbound::Raw => None,
    };
    relay_buffered(&state, response, cache_as.as_ref(), path, start).await
}

/// Body to send upstream for a parsed chat request.
///
/// Only the `messages` array is rewritten; the rest of the body keeps its
/// original JSON text. At level 0, without messages, or if splicing fails,
/// the original bytes go out.
fn compress_body(compressor: &TextCompressor, request: &ChatRequest, original: &Bytes) -> Bytes {
    if compressor.level().is_off() {
        return original.clone();
    }
    let Some(messages) = &request.messages else {
        return original.clone();
    };

    let compressed = compressor.compress_messages(messages);
    match replace_messages(original, &compressed) {
        Ok(body) => Bytes::from(body),
        Err(e) => {
            tracing::debug!("Forwarding original body, message rewrite failed: {}", e);
            original.clone()
        },
    }
}

fn upstream_url(base: &str, uri: &Uri) -> String {
    let path_and_query = uri
        .path_and_query()
        .map_or_else(|| uri.path(), |pq| pq.as_str());
    format!("{base}{path_and_query}")
}

/// JSON error response for a failed upstream exchange
fn gateway_error(error: &ProxyError, timed_out: bool) -> Response {
    let status = if timed_out {
        StatusCode::GATEWAY_TIMEOUT
    } else {
        StatusCode::BAD_GATEWAY
    };

    (
        status,
        Json(json!({
            "error": {
                "message": error.to_string(),
                "type": "proxy_error"
            }
        })),
    )
        .into_response()
}

async fn relay_buffered(
    state: &ProxyState,
    response: reqwest::Response,
    cache_as: Option<&ChatRequest>,
    path: String,
    start: Instant,
) -> Response {
    let status = response.status();
    let headers = headers::without(response.headers(), BUFFERED_RESPONSE_STRIP);

    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            let timed_out = e.is_timeout();
            let error = ProxyError::Upstream(format!("Failed to read upstream response: {e}"));
            tracing::warn!("{}", error);
            let relayed = gateway_error(&error, timed_out);
            state.stats.record(RequestEvent::new(
                path,
                start.elapsed(),
                relayed.status().as_u16(),
            ));
            return relayed;
        },
    };

    if let Some(request) = cache_as {
        if status == StatusCode::OK && state.cache.is_enabled() {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(payload) => state.cache.store(request, payload),
                Err(e) => tracing::debug!("Upstream body is not JSON, not caching: {}", e),
            }
        }
    }

    state
        .stats
        .record(RequestEvent::new(path, start.elapsed(), status.as_u16()));

    let mut relayed = Response::new(Body::from(bytes));
    *relayed.status_mut() = status;
    *relayed.headers_mut() = headers;
    relayed
}

fn relay_stream(
    stats: &Arc<RequestStats>,
    response: reqwest::Response,
    path: String,
    start: Instant,
) -> Response {
    let status = response.status();
    let headers = headers::without(response.headers(), STREAMING_RESPONSE_STRIP);

    let body = RelayStream {
        inner: Box::pin(response.bytes_stream()),
        guard: RelayGuard {
            stats: Arc::clone(stats),
            path,
            status: status.as_u16(),
            start,
            bytes: 0,
            failed: false,
        },
    };

    let mut relayed = Response::new(Body::from_stream(body));
    *relayed.status_mut() = status;
    *relayed.headers_mut() = headers;
    relayed
}

type UpstreamBytes = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Upstream byte stream relayed to the client as-is
struct RelayStream {
    inner: UpstreamBytes,
    guard: RelayGuard,
}

impl Stream for RelayStream {
    type Item = reqwest::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = self.inner.as_mut().poll_next(cx);
        match &polled {
            Poll::Ready(Some(Ok(chunk))) => self.guard.bytes += chunk.len(),
            Poll::Ready(Some(Err(e))) => {
                tracing::warn!("Upstream stream failed: {}", e);
                self.guard.failed = true;
            },
            _ => {},
        }
        polled
    }
}

/// Records the streamed request once the relay body is dropped, whether it
/// finished, failed or the client went away.
struct RelayGuard {
    stats: Arc<RequestStats>,
    path: String,
    status: u16,
    start: Instant,
    bytes: usize,
    failed: bool,
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        tracing::debug!(
            bytes = self.bytes,
            failed = self.failed,
            "Stream relay finished"
        );
        let event = RequestEvent::new(
            std::mem::take(&mut self.path),
            self.start.elapsed(),
            self.status,
        );
        self.stats.record(event.streamed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::CompressionLevel;
    use crate::protocol::Content;

    const CHAT: &str = "/v1/chat/completions";

    #[test]
    fn test_classify_chat_post() {
        let body = br#"{"model": "m", "messages": [{"role": "user", "content": "hi"}]}"#;
        match Inbound::classify(&Method::POST, CHAT, body) {
            Inbound::Chat(request) => assert_eq!(request.model.as_deref(), Some("m")),
            Inbound::Raw => panic!("expected chat request"),
        }
    }

    #[test]
    fn test_classify_falls_back_to_raw() {
        assert!(matches!(
            Inbound::classify(&Method::POST, CHAT, b"not json {"),
            Inbound::Raw
        ));
        assert!(matches!(
            Inbound::classify(&Method::POST, CHAT, b"[1, 2]"),
            Inbound::Raw
        ));
        assert!(matches!(
            Inbound::classify(&Method::GET, CHAT, b"{}"),
            Inbound::Raw
        ));
        assert!(matches!(
            Inbound::classify(&Method::POST, "/v1/embeddings", b"{}"),
            Inbound::Raw
        ));
    }

    #[test]
    fn test_streaming_detection() {
        let streaming = Inbound::classify(&Method::POST, CHAT, br#"{"stream": true}"#);
        assert!(streaming.is_streaming());
        let buffered = Inbound::classify(&Method::POST, CHAT, br#"{"stream": false}"#);
        assert!(!buffered.is_streaming());
        assert!(!Inbound::Raw.is_streaming());
    }

    #[test]
    fn test_upstream_url_keeps_query() {
        let uri: Uri = "/v1/models?limit=5&order=desc".parse().unwrap();
        assert_eq!(
            upstream_url("http://upstream:9000/api", &uri),
            "http://upstream:9000/api/v1/models?limit=5&order=desc"
        );

        let uri: Uri = "/v1/chat/completions".parse().unwrap();
        assert_eq!(
            upstream_url("http://upstream:9000", &uri),
            "http://upstream:9000/v1/chat/completions"
        );
    }

    #[test]
    fn test_compress_body_level_zero_is_identity() {
        let compressor = TextCompressor::new(CompressionLevel::Off);
        let original = Bytes::from_static(
            br#"{ "messages": [ {"role":"user","content":"a    b"} ], "model":"m" }"#,
        );
        let request = ChatRequest::from_slice(&original).unwrap();
        assert_eq!(compress_body(&compressor, &request, &original), original);
    }

    #[test]
    fn test_compress_body_rewrites_messages() {
        let compressor = TextCompressor::new(CompressionLevel::Balanced);
        let original = Bytes::from_static(
            br#"{"model":"m","messages":[{"role":"user","content":"a    b"}],"top_p":0.5}"#,
        );
        let request = ChatRequest::from_slice(&original).unwrap();

        let sent = compress_body(&compressor, &request, &original);
        let parsed = ChatRequest::from_slice(&sent).unwrap();
        assert_eq!(parsed.messages()[0].content, Content::Text("a b".to_string()));
        assert_eq!(parsed.extra.get("top_p"), Some(&json!(0.5)));
    }

    #[test]
    fn test_compress_body_keeps_wide_integers_and_nulls() {
        let compressor = TextCompressor::new(CompressionLevel::Balanced);
        let original = Bytes::from_static(
            br#"{"model":"m","messages":[{"role":"user","content":"a    b"}],"seed":18446744073709551616,"user_id":123456789012345678901234567890,"stream":null,"max_tokens":null}"#,
        );
        let request = ChatRequest::from_slice(&original).unwrap();

        let sent = compress_body(&compressor, &request, &original);
        let text = std::str::from_utf8(&sent).unwrap();
        assert!(text.contains(r#""seed":18446744073709551616"#));
        assert!(text.contains(r#""user_id":123456789012345678901234567890"#));
        assert!(text.contains(r#""stream":null"#));
        assert!(text.contains(r#""max_tokens":null"#));
        assert!(text.contains(r#""content":"a b""#));
    }

    #[test]
    fn test_compress_body_without_messages_is_identity() {
        let compressor = TextCompressor::new(CompressionLevel::Aggressive);
        let original = Bytes::from_static(br#"{"model": "m", "prompt": "a    b"}"#);
        let request = ChatRequest::from_slice(&original).unwrap();
        assert_eq!(compress_body(&compressor, &request, &original), original);
    }

    #[test]
    fn test_gateway_error_status() {
        let error = ProxyError::Network("connection refused".to_string());
        assert_eq!(gateway_error(&error, false).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(gateway_error(&error, true).status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_relay_guard_records_on_drop() {
        let stats = Arc::new(RequestStats::new());
        drop(RelayGuard {
            stats: Arc::clone(&stats),
            path: CHAT.to_string(),
            status: 200,
            start: Instant::now(),
            bytes: 0,
            failed: false,
        });

        let summary = stats.summary();
        assert_eq!(summary.total_requests, 1);
        assert_eq!(summary.streamed_responses, 1);
        assert_eq!(summary.chat_requests, 1);
    }
}
