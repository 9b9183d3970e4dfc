//! OpenAI-compatible reverse proxy with prompt compression and response
//! caching.
//!
//! # Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/health` | GET | Health check with request summary |
//! | `/stats` | GET | Compressor, cache and request statistics |
//! | `/stats/reset` | POST | Reset request and compressor counters |
//! | anything else | any | Forwarded to the upstream target |
//!
//! # Client Configuration
//!
//! With `target = "https://api.openai.com/v1"`, point your OpenAI client at
//! the proxy root; `/chat/completions` is then forwarded to
//! `https://api.openai.com/v1/chat/completions`:
//!
//! ```python
//! from openai import OpenAI
//!
//! client = OpenAI(
//!     base_url="http://localhost:8090",
//!     api_key="your-api-key"
//! )
//! ```

mod dispatch;
mod headers;
mod server;
mod stats;

pub use server::{ProxyServer, ProxyState, StatsReport};
pub use stats::{RequestEvent, RequestStats, RequestSummary};
