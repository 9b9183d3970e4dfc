//! Proxy request statistics.
//!
//! Tracks request counts, cache/stream outcomes, errors and latencies.
//! Fed through a single [`RequestStats::record`] call per finished request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::protocol::is_chat_path;
use crate::round1;

/// Latency samples kept before trimming
const MAX_LATENCIES: usize = 10_000;
/// Samples kept after a trim
const TRIMMED_LATENCIES: usize = 5_000;

/// One finished (or abandoned) proxied request
#[derive(Debug, Clone)]
pub struct RequestEvent {
    /// Request path
    pub path: String,
    /// Time from arrival to completion
    pub duration: Duration,
    /// Status returned to the client
    pub status: u16,
    /// Answered from the response cache
    pub cached: bool,
    /// Relayed as a stream
    pub streamed: bool,
}

impl RequestEvent {
    /// Create an event for a buffered, uncached request
    pub fn new(path: impl Into<String>, duration: Duration, status: u16) -> Self {
        Self {
            path: path.into(),
            duration,
            status,
            cached: false,
            streamed: false,
        }
    }

    /// Mark as served from cache
    pub fn cached(mut self) -> Self {
        self.cached = true;
        self
    }

    /// Mark as streamed
    pub fn streamed(mut self) -> Self {
        self.streamed = true;
        self
    }
}

/// Thread-safe request statistics
#[derive(Debug)]
pub struct RequestStats {
    requests: AtomicU64,
    chat_requests: AtomicU64,
    cached: AtomicU64,
    streamed: AtomicU64,
    errors: AtomicU64,
    /// Recent latencies (for average and percentiles)
    latencies: RwLock<Vec<Duration>>,
    started_at: RwLock<(Instant, DateTime<Utc>)>,
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            chat_requests: AtomicU64::new(0),
            cached: AtomicU64::new(0),
            streamed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            latencies: RwLock::new(Vec::new()),
            started_at: RwLock::new((Instant::now(), Utc::now())),
        }
    }

    /// Record a finished request
    pub fn record(&self, event: RequestEvent) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if is_chat_path(&event.path) {
            self.chat_requests.fetch_add(1, Ordering::Relaxed);
        }
        if event.cached {
            self.cached.fetch_add(1, Ordering::Relaxed);
        }
        if event.streamed {
            self.streamed.fetch_add(1, Ordering::Relaxed);
        }
        if event.status >= 400 {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut latencies) = self.latencies.write() {
            latencies.push(event.duration);
            if latencies.len() > MAX_LATENCIES {
                let excess = latencies.len() - TRIMMED_LATENCIES;
                latencies.drain(..excess);
            }
        }
    }

    /// Get total requests
    pub fn total_requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Get total errors (status >= 400)
    pub fn total_errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Average latency over the retained samples
    pub fn avg_latency(&self) -> Option<Duration> {
        let latencies = self.latencies.read().ok()?;
        if latencies.is_empty() {
            return None;
        }
        let total: Duration = latencies.iter().sum();
        Some(total / latencies.len() as u32)
    }

    /// Get p50 latency
    pub fn p50_latency(&self) -> Option<Duration> {
        self.percentile_latency(50)
    }

    /// Get p95 latency
    pub fn p95_latency(&self) -> Option<Duration> {
        self.percentile_latency(95)
    }

    /// Calculate percentile latency
    fn percentile_latency(&self, percentile: usize) -> Option<Duration> {
        let latencies = self.latencies.read().ok()?;
        if latencies.is_empty() {
            return None;
        }

        let mut sorted = latencies.clone();
        sorted.sort();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        Some(sorted[idx])
    }

    /// Get uptime
    pub fn uptime(&self) -> Duration {
        self.started_at
            .read()
            .map(|started| started.0.elapsed())
            .unwrap_or_default()
    }

    /// Get summary as JSON-compatible struct
    pub fn summary(&self) -> RequestSummary {
        let started_at = self
            .started_at
            .read()
            .map(|started| started.1)
            .unwrap_or_else(|_| Utc::now());
        let to_ms = |d: Duration| round1(d.as_secs_f64() * 1000.0);

        RequestSummary {
            total_requests: self.total_requests(),
            chat_requests: self.chat_requests.load(Ordering::Relaxed),
            cached_responses: self.cached.load(Ordering::Relaxed),
            streamed_responses: self.streamed.load(Ordering::Relaxed),
            errors: self.total_errors(),
            avg_latency_ms: self.avg_latency().map(to_ms),
            p50_latency_ms: self.p50_latency().map(to_ms),
            p95_latency_ms: self.p95_latency().map(to_ms),
            uptime_secs: self.uptime().as_secs(),
            started_at,
        }
    }

    /// Reset all statistics
    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.chat_requests.store(0, Ordering::Relaxed);
        self.cached.store(0, Ordering::Relaxed);
        self.streamed.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);

        if let Ok(mut latencies) = self.latencies.write() {
            latencies.clear();
        }

        if let Ok(mut started) = self.started_at.write() {
            *started = (Instant::now(), Utc::now());
        }
    }
}

/// Request statistics summary for serialization.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RequestSummary {
    /// Total number of requests proxied.
    pub total_requests: u64,
    /// Requests to a chat-completion path.
    pub chat_requests: u64,
    /// Requests answered from the cache.
    pub cached_responses: u64,
    /// Requests relayed as streams.
    pub streamed_responses: u64,
    /// Requests that ended with status >= 400.
    pub errors: u64,
    /// Mean latency in milliseconds.
    pub avg_latency_ms: Option<f64>,
    /// 50th percentile latency in milliseconds.
    pub p50_latency_ms: Option<f64>,
    /// 95th percentile latency in milliseconds.
    pub p95_latency_ms: Option<f64>,
    /// Seconds since start (or last reset).
    pub uptime_secs: u64,
    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,
}
