//! Command line argument parsing

use crate::download::engine::{Discipline, EngineConfig, CHUNK_SIZE, FRAGMENT_SIZE};
use crate::download::retry::RetryConfigBuilder;
use crate::platform::client::HttpClientConfig;
use crate::platform::manifest::Quality;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// vidl - resumable video downloader
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Video, profile, channel or favorites page URLs (or bare playlist ids)
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,

    /// Destination directory
    #[arg(short, long, value_name = "DIR", default_value = "./videos")]
    pub destination: PathBuf,

    /// Maximum number of videos to download
    #[arg(short = 'n', long, value_name = "COUNT")]
    pub maximum: Option<usize>,

    /// Download videos in reverse order
    #[arg(short, long)]
    pub reversed: bool,

    /// Download the low definition file (same as --quality low)
    #[arg(short, long = "low-definition")]
    pub low: bool,

    /// Stream quality: low, middle or high
    #[arg(long, value_name = "QUALITY", default_value = "high")]
    pub quality: Quality,

    /// Overwrite existing files instead of resuming them
    #[arg(short, long)]
    pub overwrite: bool,

    /// Concurrent fragment requests
    #[arg(short, long, default_value = "4")]
    pub workers: usize,

    /// Fetch one fragment at a time
    #[arg(long)]
    pub sequential: bool,

    /// Fragment size (e.g., 1MiB, 512KiB)
    #[arg(long, value_name = "SIZE", default_value = "1MiB")]
    pub fragment_size: String,

    /// HTTP timeout (e.g., 30s, 1m)
    #[arg(long, value_name = "DURATION", default_value = "30s")]
    pub timeout: humantime::Duration,

    /// HTTP attempts for transient errors
    #[arg(long, default_value = "3")]
    pub retries: u32,

    /// Credential refreshes allowed per request
    #[arg(long, default_value = "5")]
    pub auth_retries: u32,

    /// Read replacement cookies from this environment variable instead of prompting
    #[arg(long, value_name = "VAR")]
    pub cookie_env: Option<String>,

    /// Cookie file (default ~/.vidl/cookie)
    #[arg(long, value_name = "PATH")]
    pub cookie_file: Option<PathBuf>,

    /// Site origin, required when only playlist ids are given
    #[arg(long, value_name = "URL")]
    pub site: Option<String>,

    /// Ask for a new cookie before the first request
    #[arg(long)]
    pub new_cookie: bool,

    /// Disable progress output
    #[arg(long)]
    pub no_progress: bool,

    /// Override User-Agent header
    #[arg(long, value_name = "USER_AGENT")]
    pub user_agent: Option<String>,

    /// Proxy URL (http/https/socks)
    #[arg(long, value_name = "URL")]
    pub proxy: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Get HTTP timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        self.timeout.into()
    }

    /// Effective quality, `--low-definition` wins
    pub fn effective_quality(&self) -> Quality {
        if self.low {
            Quality::Low
        } else {
            self.quality
        }
    }

    /// Fragment size in bytes, falling back to the default on bad input
    pub fn fragment_size_bytes(&self) -> u64 {
        parse_size(&self.fragment_size).unwrap_or(FRAGMENT_SIZE)
    }

    pub fn client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: self.timeout_duration(),
            user_agent: self.user_agent.clone(),
            proxy_url: self.proxy.clone(),
            retry: RetryConfigBuilder::new().max_attempts(self.retries).build(),
            max_auth_refreshes: self.auth_retries,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            fragment_size: self.fragment_size_bytes(),
            chunk_size: CHUNK_SIZE,
            workers: self.workers.max(1),
            discipline: if self.sequential {
                Discipline::Sequential
            } else {
                Discipline::Concurrent
            },
            retry: RetryConfigBuilder::new().max_attempts(self.retries).build(),
        }
    }

    /// Get output verbosity level
    pub fn verbosity_level(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Output verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbosityLevel {
    /// Quiet (only errors)
    Quiet,
    /// Normal
    Normal,
    /// Verbose (debug info)
    Verbose,
}

/// Parse a byte size such as `1MiB` or `500KB`
pub fn parse_size(size: &str) -> Option<u64> {
    let size = size.trim().to_uppercase();
    if size.is_empty() {
        return None;
    }

    let number_end = size
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit() || *c == '.')
        .map(|(i, c)| i + c.len_utf8())
        .last()?;

    let number: f64 = size[..number_end].parse().ok()?;
    if number <= 0.0 {
        return None;
    }

    let multiplier: u64 = match size[number_end..].trim() {
        "B" | "" => 1,
        "KB" => 1000,
        "KIB" | "K" => 1024,
        "MB" => 1000 * 1000,
        "MIB" | "M" => 1024 * 1024,
        "GB" => 1000 * 1000 * 1000,
        "GIB" | "G" => 1024 * 1024 * 1024,
        _ => return None,
    };

    Some((number * multiplier as f64) as u64)
}
