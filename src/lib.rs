//! # vidl - resumable video downloader
//!
//! Resolves video, profile, channel and favorites pages into video
//! descriptors and fetches each one through range requests, resuming
//! from whatever is already on disk.
//!
//! ## Features
//!
//! - Sequential or bounded-concurrent fragment fetching with in-order appends
//! - Resume from file size, skip of complete MP4 files
//! - Cookie authentication with pluggable, capped credential refresh
//! - Retry with exponential backoff
//! - Adaptive stream variants remuxed through ffmpeg
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vidl::{ClientContext, DownloadOptions, Downloader, HttpClientConfig, SiteEndpoints};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let url = "https://www.example.com/video123/some_title";
//!     let ctx = Arc::new(ClientContext::interactive(HttpClientConfig::default())?);
//!     let downloader = Downloader::new(ctx, SiteEndpoints::from_url(url)?, DownloadOptions::default());
//!
//!     for video in downloader.collect(url).await? {
//!         println!("{:?}", downloader.download(&video).await?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod core;
pub mod download;
pub mod error;
pub mod platform;
pub mod utils;

// Re-export main types
pub use crate::core::{DownloadOptions, Downloader, ItemOutcome, Progress, VideoDescriptor};
pub use download::{DownloadEngine, EngineConfig, Fragment, FragmentSource};
pub use error::VidlError;
pub use platform::{ClientContext, CredentialSource, CredentialStore, HttpClientConfig, SiteEndpoints};

/// Result type alias for vidl operations
pub type Result<T> = std::result::Result<T, VidlError>;
