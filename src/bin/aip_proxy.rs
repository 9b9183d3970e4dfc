//! AIP proxy CLI binary.
//!
//! # Commands
//!
//! - `start` - Run the compressing, caching proxy
//! - `compress` - Compress text locally and print the result
//! - `stats` - Print statistics from a running proxy

use std::io::{self, Read};
use std::path::PathBuf;

use aip::{CompressionLevel, Config, ProxyServer, TextCompressor, VERSION};
use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "aip-proxy")]
#[command(version = VERSION)]
#[command(about = "AIP Proxy - prompt-compressing, response-caching LLM API proxy", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Start {
        /// Upstream API base URL (e.g. https://api.openai.com/v1)
        #[arg(short, long)]
        target: Option<String>,

        /// Listen port [default: 8090]
        #[arg(short, long)]
        port: Option<u16>,

        /// Listen host [default: 127.0.0.1]
        #[arg(long)]
        host: Option<String>,

        /// Compression level: 0-3 or off, light, balanced, aggressive [default: 2]
        #[arg(short, long)]
        level: Option<CompressionLevel>,

        /// Disable the response cache
        #[arg(long)]
        no_cache: bool,

        /// Cache entry TTL in seconds [default: 300]
        #[arg(long)]
        cache_ttl: Option<u64>,

        /// Maximum cached responses [default: 200]
        #[arg(long)]
        cache_max_entries: Option<usize>,

        /// Upstream timeout in seconds [default: 300]
        #[arg(long)]
        timeout: Option<u64>,

        /// Config file (default: <config dir>/aip-proxy/config.toml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,

        /// Emit logs as JSON
        #[arg(long)]
        json_logs: bool,
    },

    /// Compress text with the proxy's pass pipeline
    Compress {
        /// Text input (or - for stdin)
        input: Option<String>,

        /// Input file path
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Compression level: 0-3 or off, light, balanced, aggressive
        #[arg(short, long, default_value = "2")]
        level: CompressionLevel,

        /// Show compression statistics
        #[arg(short, long)]
        stats: bool,
    },

    /// Fetch statistics from a running proxy
    Stats {
        /// Proxy base URL
        #[arg(short, long, default_value = "http://127.0.0.1:8090")]
        url: String,
    },
}

/// `start` flags that override file and environment settings
struct StartOverrides {
    target: Option<String>,
    port: Option<u16>,
    host: Option<String>,
    level: Option<CompressionLevel>,
    no_cache: bool,
    cache_ttl: Option<u64>,
    cache_max_entries: Option<usize>,
    timeout: Option<u64>,
    verbose: bool,
}

impl StartOverrides {
    fn apply(self, config: &mut Config) {
        if let Some(target) = self.target {
            config.proxy.target = target;
        }
        if let Some(port) = self.port {
            config.proxy.port = port;
        }
        if let Some(host) = self.host {
            config.proxy.host = host;
        }
        if let Some(level) = self.level {
            config.compression.level = level;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
        if let Some(ttl) = self.cache_ttl {
            config.cache.ttl_secs = ttl;
        }
        if let Some(max_entries) = self.cache_max_entries {
            config.cache.max_entries = max_entries;
        }
        if let Some(timeout) = self.timeout {
            config.proxy.timeout_secs = timeout;
        }
        config.proxy.verbose |= self.verbose;
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            target,
            port,
            host,
            level,
            no_cache,
            cache_ttl,
            cache_max_entries,
            timeout,
            config,
            verbose,
            json_logs,
        } => cmd_start(
            config,
            StartOverrides {
                target,
                port,
                host,
                level,
                no_cache,
                cache_ttl,
                cache_max_entries,
                timeout,
                verbose,
            },
            json_logs,
        ),

        Commands::Compress {
            input,
            file,
            level,
            stats,
        } => cmd_compress(input, file, level, stats),

        Commands::Stats { url } => cmd_stats(&url),
    }
}

fn cmd_start(
    config_path: Option<PathBuf>,
    overrides: StartOverrides,
    json_logs: bool,
) -> anyhow::Result<()> {
    let config = load_config(config_path, overrides)?;
    init_logging(config.proxy.verbose, json_logs);

    let server = ProxyServer::new(config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async { server.run().await })?;
    Ok(())
}

/// File (explicit or default location), then environment, then flags
fn load_config(path: Option<PathBuf>, overrides: StartOverrides) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => match Config::default_path().filter(|p| p.exists()) {
            Some(path) => Config::from_file(&path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => Config::default(),
        },
    };

    config.apply_env();
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn cmd_compress(
    input: Option<String>,
    file: Option<PathBuf>,
    level: CompressionLevel,
    stats: bool,
) -> anyhow::Result<()> {
    let content = read_input(input, file)?;
    let compressor = TextCompressor::new(level);
    let compressed = compressor.compress_text(&content);

    println!("{compressed}");

    if stats {
        let original = content.chars().count();
        let after = compressed.chars().count();
        let saved = original as i64 - after as i64;
        let pct = if original > 0 {
            saved as f64 / original as f64 * 100.0
        } else {
            0.0
        };

        eprintln!();
        eprintln!("Compression Statistics:");
        eprintln!("  Level:        {level}");
        eprintln!("  Original:     {original} chars");
        eprintln!("  Compressed:   {after} chars");
        eprintln!("  Saved:        {saved} chars ({pct:.1}%)");
    }

    Ok(())
}

fn cmd_stats(url: &str) -> anyhow::Result<()> {
    let endpoint = format!("{}/stats", url.trim_end_matches('/'));

    let runtime = tokio::runtime::Runtime::new()?;
    let stats: Value = runtime.block_on(async {
        reqwest::get(&endpoint)
            .await?
            .error_for_status()?
            .json()
            .await
    })
    .with_context(|| format!("fetching {endpoint}"))?;

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

// Helper functions

fn read_input(input: Option<String>, file: Option<PathBuf>) -> anyhow::Result<String> {
    if let Some(path) = file {
        return Ok(std::fs::read_to_string(path)?);
    }

    match input {
        Some(s) if s != "-" => Ok(s),
        _ => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        },
    }
}
