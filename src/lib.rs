//! # AIP Proxy - compressing, caching LLM API proxy
//!
//! Transparent HTTP proxy for OpenAI-compatible chat completion APIs. Point
//! a client's base URL at the proxy and it will:
//!
//! - **Compress prompts**: rewrite message text through a pass pipeline
//!   (whitespace, code blocks, repeated sections, verbose phrases)
//! - **Cache responses**: answer identical deterministic requests from memory
//! - **Relay everything else**: any other path or method is forwarded as-is,
//!   including SSE streams
//!
//! ## Architecture
//!
//! ```text
//! Client App             AIP Proxy                    Upstream API
//!     |                      |                             |
//!     |-- POST /v1/chat ---->|-- cache lookup              |
//!     |                      |   (hit: answer directly)    |
//!     |                      |-- compressed request ------>|
//!     |                      |<-- JSON / SSE stream -------|
//!     |<-- JSON / SSE -------|-- cache store (JSON, 200)   |
//! ```
//!
//! Any failure on the request side (malformed JSON, unexpected shapes)
//! fails open: the original body is forwarded untouched.
//!
//! ## Compression Levels
//!
//! | Level | Name       | Passes                                          |
//! |-------|------------|-------------------------------------------------|
//! | 0     | off        | none, bytes forwarded unchanged                 |
//! | 1     | light      | whitespace                                      |
//! | 2     | balanced   | + code-block comments, repeated-section elision |
//! | 3     | aggressive | + verbose-phrase abbreviation                   |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use aip::{CompressionLevel, Config, ProxyServer};
//!
//! let mut config = Config::default();
//! config.proxy.target = "https://api.openai.com/v1".to_string();
//! config.compression.level = CompressionLevel::Aggressive;
//!
//! ProxyServer::new(config)?.run().await?;
//! ```
//!
//! ### Compression Only
//!
//! ```rust
//! use aip::{CompressionLevel, TextCompressor};
//!
//! let compressor = TextCompressor::new(CompressionLevel::Light);
//! assert_eq!(compressor.compress_text("Hello    world\n\n\n\nbye"), "Hello world\n\nbye");
//! ```
//!
//! ## Modules
//!
//! - [`compress`]: Text compression passes and engine
//! - [`cache`]: Response cache
//! - [`proxy`]: HTTP server and request dispatcher
//! - [`protocol`]: Chat completion request types
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod cache;
pub mod compress;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod protocol;
pub mod proxy;

// Re-exports for convenience
pub use cache::{CacheKey, CacheStats, ResponseCache};
pub use compress::{CompressionLevel, Savings, TextCompressor, TextPass};
pub use config::{CacheConfig, CompressionConfig, Config, ProxyConfig};
pub use error::{ProxyError, Result};
pub use protocol::{ChatRequest, Content, Message, Part, TextPart};
pub use proxy::{ProxyServer, RequestStats, RequestSummary, StatsReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Round to one decimal place, as reported in stats
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
