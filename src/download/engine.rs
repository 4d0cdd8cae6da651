//! Range-partitioned, resumable download engine
//!
//! The size of the destination file is the only resume cursor. Every
//! byte is appended in fragment order, so after fragment `k` finishes the
//! file always equals the first `fragments[k].end + 1` bytes of the remote
//! resource and a later run can continue from wherever this one stopped.

use crate::core::progress::{percent_of, speed_of, FragmentTimer, Progress};
use crate::download::retry::{RetryConfig, RetryExecutor};
use crate::error::VidlError;
use crate::platform::client::ClientContext;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, RANGE};
use reqwest::{Method, StatusCode};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Default fragment stride (1 MiB)
pub const FRAGMENT_SIZE: u64 = 1024 * 1024;
/// Default append granularity (64 KiB)
pub const CHUNK_SIZE: usize = 64 * 1024;
/// Default worker pool width for the concurrent discipline
pub const DEFAULT_WORKERS: usize = 4;

/// Inclusive byte range `[start, end]` of a remote resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    pub start: u64,
    pub end: u64,
}

impl Fragment {
    /// Number of bytes covered, never zero
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value of the `Range` request header
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Split `[done, size)` into ascending fragments of `stride` bytes.
///
/// The last fragment is clamped to end at `size - 1`. `done >= size`
/// yields an empty plan.
pub fn plan_fragments(done: u64, size: u64, stride: u64) -> Vec<Fragment> {
    let stride = stride.max(1);
    let mut fragments = Vec::new();
    let mut start = done;
    while start < size {
        let next = start.saturating_add(stride).min(size);
        fragments.push(Fragment {
            start,
            end: next - 1,
        });
        start = next;
    }
    fragments
}

/// How fragment requests are issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Discipline {
    /// One fragment at a time, streamed to disk chunk by chunk
    Sequential,
    /// Bounded pool of in-flight fragments, appended strictly in order
    #[default]
    Concurrent,
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub fragment_size: u64,
    pub chunk_size: usize,
    pub workers: usize,
    pub discipline: Discipline,
    /// Whole-fragment retry policy used by the concurrent discipline
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fragment_size: FRAGMENT_SIZE,
            chunk_size: CHUNK_SIZE,
            workers: DEFAULT_WORKERS,
            discipline: Discipline::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Body of a ranged response
pub type ByteStream = BoxStream<'static, Result<Bytes, VidlError>>;

/// Progress callback, invoked after every appended chunk
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// Where fragment bytes come from
#[async_trait]
pub trait FragmentSource: Send + Sync {
    /// Authoritative resource length, `None` when the server does not say
    async fn probe_size(&self, url: &str) -> Result<Option<u64>, VidlError>;

    /// Open the body of one fragment
    async fn open_range(&self, url: &str, fragment: Fragment) -> Result<ByteStream, VidlError>;
}

#[async_trait]
impl FragmentSource for ClientContext {
    async fn probe_size(&self, url: &str) -> Result<Option<u64>, VidlError> {
        let response = self.execute(Method::HEAD, url, HeaderMap::new()).await?;
        // Read the header itself: for HEAD the body length is always zero.
        Ok(response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok()))
    }

    async fn open_range(&self, url: &str, fragment: Fragment) -> Result<ByteStream, VidlError> {
        let mut headers = HeaderMap::new();
        headers.insert(RANGE, HeaderValue::from_str(&fragment.range_header())?);

        let response = self.execute(Method::GET, url, headers).await?;
        if response.status() != StatusCode::PARTIAL_CONTENT {
            let full_body = response
                .content_length()
                .is_some_and(|len| len > fragment.len());
            if fragment.start > 0 || full_body {
                return Err(VidlError::RangeIgnored {
                    url: url.to_string(),
                    start: fragment.start,
                });
            }
        }

        let url = url.to_string();
        Ok(response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| VidlError::Transient(format!("{}: {}", url, e))))
            .boxed())
    }
}

/// Pulls a remote resource into a local file, resuming from its current size
pub struct DownloadEngine {
    source: Arc<dyn FragmentSource>,
    config: EngineConfig,
    progress: Option<ProgressCallback>,
}

impl DownloadEngine {
    pub fn new(source: Arc<dyn FragmentSource>, config: EngineConfig) -> Self {
        Self {
            source,
            config,
            progress: None,
        }
    }

    /// Report progress after every chunk
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Download `url` into `dest` and return the bytes written by this call.
    ///
    /// The size probe runs before anything on disk is touched, so a
    /// `NotFound` leaves an existing partial file alone even with
    /// `overwrite`. Without `resume_supported` an existing file is
    /// truncated, because appending to it would corrupt it. A file
    /// that already holds `size` bytes returns 0 without any range
    /// request.
    pub async fn download_to_file(
        &self,
        url: &str,
        dest: &Path,
        size_hint: Option<u64>,
        resume_supported: bool,
        overwrite: bool,
    ) -> Result<u64, VidlError> {
        let size = match self.source.probe_size(url).await? {
            Some(size) => size,
            None => size_hint.ok_or_else(|| VidlError::SizeUnknown(url.to_string()))?,
        };

        let restart = overwrite || !resume_supported;
        if restart && tokio::fs::try_exists(dest).await? {
            debug!("Removing existing {}", dest.display());
            tokio::fs::remove_file(dest).await?;
        }

        let done = existing_len(dest).await?;
        if done >= size {
            if done > size {
                warn!(
                    "{} is larger than the remote resource ({} > {} bytes)",
                    dest.display(),
                    done,
                    size
                );
            }
            info!("{} already complete", dest.display());
            return Ok(0);
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let plan = plan_fragments(done, size, self.config.fragment_size);
        info!(
            "Downloading {} bytes of {} in {} fragment(s), resuming at {}",
            size - done,
            dest.display(),
            plan.len(),
            done
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dest)
            .await?;

        let result = match self.config.discipline {
            Discipline::Sequential => self.fetch_sequential(url, &plan, &mut file, done, size).await,
            Discipline::Concurrent => self.fetch_concurrent(url, &plan, &mut file, done, size).await,
        };

        // Whatever was appended before a failure is a valid prefix.
        file.flush().await?;
        file.sync_all().await?;
        result
    }

    async fn fetch_sequential(
        &self,
        url: &str,
        plan: &[Fragment],
        file: &mut File,
        mut on_disk: u64,
        size: u64,
    ) -> Result<u64, VidlError> {
        let mut written = 0;

        for fragment in plan {
            let mut body = self.source.open_range(url, *fragment).await?;
            let mut timer = FragmentTimer::start();
            let mut received = 0;

            while let Some(bytes) = body.next().await {
                let bytes = bytes?;
                received += bytes.len() as u64;
                if received > fragment.len() {
                    return Err(VidlError::RangeIgnored {
                        url: url.to_string(),
                        start: fragment.start,
                    });
                }

                for chunk in bytes.chunks(self.chunk_size()) {
                    file.write_all(chunk).await?;
                    written += chunk.len() as u64;
                    on_disk += chunk.len() as u64;
                    timer.record(chunk.len() as u64);
                    self.report(on_disk, size, timer.speed());
                }
            }

            check_complete_fragment(url, fragment, received)?;
            file.flush().await?;
            debug!("Fragment {} written", fragment.range_header());
        }

        Ok(written)
    }

    async fn fetch_concurrent(
        &self,
        url: &str,
        plan: &[Fragment],
        file: &mut File,
        mut on_disk: u64,
        size: u64,
    ) -> Result<u64, VidlError> {
        let retry = RetryExecutor::with_config(self.config.retry.clone());
        let retry = &retry;

        // `buffered` yields results in submission order. Dropping the
        // stream on error cancels every fragment still in flight.
        let mut fetched = stream::iter(plan.iter().copied())
            .map(|fragment| async move {
                let label = format!("{} {}", url, fragment.range_header());
                retry
                    .execute(&label, || self.fetch_whole(url, fragment))
                    .await
                    .map(|body| (fragment, body))
            })
            .buffered(self.config.workers.max(1));

        let mut written = 0;
        while let Some(result) = fetched.next().await {
            let (fragment, (body, elapsed)) = result?;
            let speed = speed_of(body.len() as u64, elapsed);

            for chunk in body.chunks(self.chunk_size()) {
                file.write_all(chunk).await?;
                written += chunk.len() as u64;
                on_disk += chunk.len() as u64;
                self.report(on_disk, size, speed);
            }
            file.flush().await?;
            debug!("Fragment {} written", fragment.range_header());
        }

        Ok(written)
    }

    /// Fetch one fragment into memory, with the time it took
    async fn fetch_whole(
        &self,
        url: &str,
        fragment: Fragment,
    ) -> Result<(Bytes, std::time::Duration), VidlError> {
        let started = Instant::now();
        let mut body = self.source.open_range(url, fragment).await?;
        let mut buffer = BytesMut::with_capacity(fragment.len() as usize);

        while let Some(bytes) = body.next().await {
            buffer.extend_from_slice(&bytes?);
            if buffer.len() as u64 > fragment.len() {
                return Err(VidlError::RangeIgnored {
                    url: url.to_string(),
                    start: fragment.start,
                });
            }
        }

        check_complete_fragment(url, &fragment, buffer.len() as u64)?;
        Ok((buffer.freeze(), started.elapsed()))
    }

    fn chunk_size(&self) -> usize {
        self.config.chunk_size.max(1)
    }

    fn report(&self, on_disk: u64, size: u64, speed: Option<f64>) {
        if let Some(callback) = &self.progress {
            callback(Progress {
                total_size: size,
                downloaded_size: on_disk,
                percent: percent_of(on_disk, size),
                speed,
            });
        }
    }
}

fn check_complete_fragment(url: &str, fragment: &Fragment, received: u64) -> Result<(), VidlError> {
    if received < fragment.len() {
        return Err(VidlError::Transient(format!(
            "{}: body ended after {} of {} bytes for {}",
            url,
            received,
            fragment.len(),
            fragment.range_header()
        )));
    }
    Ok(())
}

async fn existing_len(path: &Path) -> Result<u64, VidlError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}
