//! Main downloader implementation

use crate::core::video::VideoDescriptor;
use crate::download::engine::{DownloadEngine, EngineConfig, FragmentSource, ProgressCallback};
use crate::download::integrity::{SkipDecision, SkipPolicy};
use crate::download::remux::{needs_remux, FfmpegRemuxer, Remuxer};
use crate::error::VidlError;
use crate::platform::client::ClientContext;
use crate::platform::listing::{video_from_page, videos_from_favorites, UploadsPager, UploadsSection};
use crate::platform::locator::{ResourceLocator, SiteEndpoints};
use crate::platform::manifest::Quality;
use crate::utils::url::PageKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const OUTPUT_EXTENSION: &str = "mp4";

/// Main downloader configuration
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Root output directory
    pub destination: PathBuf,
    /// Stream quality
    pub quality: Quality,
    /// Delete existing files instead of resuming or skipping them
    pub overwrite: bool,
    /// Ask for a fresh credential before the first authenticated request
    pub force_new_credential: bool,
    /// Fragment engine settings
    pub engine: EngineConfig,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            destination: PathBuf::from("./videos"),
            quality: Quality::default(),
            overwrite: false,
            force_new_credential: false,
            engine: EngineConfig::default(),
        }
    }
}

/// How a single video ended up on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The file was already complete
    Skipped { path: PathBuf, size: u64 },
    /// Bytes fetched through the fragment engine
    Downloaded { path: PathBuf, bytes: u64 },
    /// Produced by the external muxer
    Remuxed { path: PathBuf, size: u64 },
    /// The remote has no such video
    NotFound,
}

/// Results of a batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<(VideoDescriptor, ItemOutcome)>,
    pub failures: Vec<(VideoDescriptor, VidlError)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Videos gathered from several input URLs
#[derive(Debug, Default)]
pub struct Collection {
    pub videos: Vec<VideoDescriptor>,
    /// Inputs that could not be listed, other than missing pages
    pub failures: Vec<(String, VidlError)>,
}

/// Keep the first `maximum` videos, after reversing when asked
pub fn select_videos(
    mut videos: Vec<VideoDescriptor>,
    reversed: bool,
    maximum: Option<usize>,
) -> Vec<VideoDescriptor> {
    if reversed {
        videos.reverse();
    }
    if let Some(max) = maximum.filter(|m| *m > 0) {
        videos.truncate(max);
    }
    videos
}

/// Main downloader struct
pub struct Downloader {
    ctx: Arc<ClientContext>,
    locator: ResourceLocator,
    engine: DownloadEngine,
    remuxer: Arc<dyn Remuxer>,
    options: DownloadOptions,
    refresh_pending: AtomicBool,
}

impl Downloader {
    pub fn new(ctx: Arc<ClientContext>, endpoints: SiteEndpoints, options: DownloadOptions) -> Self {
        let source: Arc<dyn FragmentSource> = ctx.clone();
        Self {
            locator: ResourceLocator::new(ctx.clone(), endpoints),
            engine: DownloadEngine::new(source, options.engine.clone()),
            remuxer: Arc::new(FfmpegRemuxer::default()),
            refresh_pending: AtomicBool::new(options.force_new_credential),
            ctx,
            options,
        }
    }

    /// Use another muxer for adaptive streams
    pub fn with_remuxer(mut self, remuxer: Arc<dyn Remuxer>) -> Self {
        self.remuxer = remuxer;
        self
    }

    /// Set progress callback
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.engine = self.engine.with_progress(callback);
        self
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    pub fn endpoints(&self) -> &SiteEndpoints {
        self.locator.endpoints()
    }

    /// The forced refresh applies to the first authenticated request only
    fn take_refresh(&self) -> bool {
        self.refresh_pending.swap(false, Ordering::SeqCst)
    }

    /// Expand a user-supplied URL into the videos it refers to
    pub async fn collect(&self, url: &str) -> Result<Vec<VideoDescriptor>, VidlError> {
        let endpoints = self.endpoints().clone();
        match PageKind::classify(url)? {
            PageKind::Video => Ok(vec![video_from_page(&self.ctx, url).await?]),
            PageKind::Favorites(playlist_id) => {
                if self.take_refresh() {
                    self.ctx.force_refresh().await?;
                }
                videos_from_favorites(&self.ctx, &endpoints, &playlist_id).await
            }
            PageKind::Profile(name) => {
                UploadsPager::new(self.ctx.clone(), endpoints, UploadsSection::Profiles, name)
                    .collect_all()
                    .await
            }
            PageKind::Channel(name) => {
                UploadsPager::new(self.ctx.clone(), endpoints, UploadsSection::Channels, name)
                    .collect_all()
                    .await
            }
        }
    }

    /// Expand every input, in order
    ///
    /// A missing page is skipped. Other listing errors are recorded and
    /// the remaining inputs are still listed. `on_listed` sees each
    /// input with its videos or its error.
    pub async fn collect_all<F>(&self, urls: &[String], mut on_listed: F) -> Collection
    where
        F: FnMut(&str, Result<&[VideoDescriptor], &VidlError>),
    {
        let mut collection = Collection::default();

        for url in urls {
            match self.collect(url).await {
                Ok(videos) => {
                    on_listed(url, Ok(videos.as_slice()));
                    collection.videos.extend(videos);
                }
                Err(e) if e.is_skippable() => {
                    warn!("Nothing found at {}, skipping: {}", url, e);
                    on_listed(url, Err(&e));
                }
                Err(e) => {
                    warn!("Listing {} failed: {}", url, e);
                    on_listed(url, Err(&e));
                    collection.failures.push((url.clone(), e));
                }
            }
        }

        collection
    }

    /// Download one video
    ///
    /// A complete file is detected before any network call. Adaptive
    /// variants are only consulted when the video page is known and a
    /// quality above `Low` is requested.
    pub async fn download(&self, video: &VideoDescriptor) -> Result<ItemOutcome, VidlError> {
        let path = video.output_path(&self.options.destination, OUTPUT_EXTENSION);

        match SkipPolicy::new(self.options.overwrite).decide(&path).await? {
            SkipDecision::Complete { size } => {
                info!("{} is complete, skipping", path.display());
                return Ok(ItemOutcome::Skipped { path, size });
            }
            SkipDecision::Resume { done } if done > 0 => {
                info!("Resuming {} at {} bytes", path.display(), done);
            }
            _ => {}
        }

        if let Some(outcome) = self.try_remux(video, &path).await? {
            return Ok(outcome);
        }

        let url = self
            .locator
            .resolve_direct_url(
                &video.id,
                self.options.quality == Quality::Low,
                self.take_refresh(),
            )
            .await?;

        let bytes = self
            .engine
            .download_to_file(&url, &path, None, true, self.options.overwrite)
            .await?;
        Ok(ItemOutcome::Downloaded { path, bytes })
    }

    async fn try_remux(
        &self,
        video: &VideoDescriptor,
        path: &std::path::Path,
    ) -> Result<Option<ItemOutcome>, VidlError> {
        let Some(page_url) = video.page_url.as_deref() else {
            return Ok(None);
        };
        if self.options.quality == Quality::Low {
            return Ok(None);
        }

        let variants = match self.locator.resolve_stream_variants(page_url).await {
            Ok(variants) => variants,
            Err(VidlError::Parse(reason)) => {
                warn!("No stream variants for {}: {}", video.id, reason);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let Some(variant) = self.options.quality.pick(&variants) else {
            return Ok(None);
        };
        if !needs_remux(&variant.name) {
            debug!("Variant {} has a direct resource", variant.name);
            return Ok(None);
        }

        info!("Remuxing {} variant of {}", variant.name, video.id);
        let size = self
            .remuxer
            .remux(&variant.url, path, self.options.overwrite)
            .await?;
        Ok(Some(ItemOutcome::Remuxed {
            path: path.to_path_buf(),
            size,
        }))
    }

    /// Download every video in order.
    ///
    /// `NotFound` is recorded as an outcome and the batch moves on. Other
    /// errors are collected as failures without stopping the batch.
    /// `on_start` gets the 1-based index and the total, `on_done` each
    /// recorded outcome.
    pub async fn download_all<S, D>(
        &self,
        videos: &[VideoDescriptor],
        mut on_start: S,
        mut on_done: D,
    ) -> BatchReport
    where
        S: FnMut(usize, usize, &VideoDescriptor),
        D: FnMut(&VideoDescriptor, Result<&ItemOutcome, &VidlError>),
    {
        let mut report = BatchReport::default();
        let total = videos.len();

        for (index, video) in videos.iter().enumerate() {
            on_start(index + 1, total, video);
            match self.download(video).await {
                Ok(outcome) => {
                    on_done(video, Ok(&outcome));
                    report.outcomes.push((video.clone(), outcome));
                }
                Err(e) if e.is_skippable() => {
                    warn!("Video {} not found, skipping: {}", video.id, e);
                    on_done(video, Ok(&ItemOutcome::NotFound));
                    report.outcomes.push((video.clone(), ItemOutcome::NotFound));
                }
                Err(e) => {
                    warn!("Video {} failed: {}", video.id, e);
                    on_done(video, Err(&e));
                    report.failures.push((video.clone(), e));
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::engine::Discipline;
    use crate::download::retry::RetryConfigBuilder;
    use crate::platform::client::HttpClientConfig;
    use crate::platform::credentials::{CredentialStore, QueuedSource};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingRemuxer {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Remuxer for RecordingRemuxer {
        async fn remux(&self, manifest_url: &str, output: &Path, _overwrite: bool) -> Result<u64, VidlError> {
            self.calls.lock().unwrap().push(manifest_url.to_string());
            tokio::fs::create_dir_all(output.parent().unwrap()).await?;
            tokio::fs::write(output, b"remuxed").await?;
            Ok(7)
        }
    }

    fn downloader(server_url: &str, dir: &Path, quality: Quality) -> Downloader {
        let config = HttpClientConfig {
            retry: RetryConfigBuilder::new()
                .initial_delay(Duration::from_millis(1))
                .build(),
            ..Default::default()
        };
        let ctx = ClientContext::new(
            config,
            CredentialStore::new(dir.join("cookie")),
            Arc::new(QueuedSource::default()),
        )
        .unwrap();
        let options = DownloadOptions {
            destination: dir.join("out"),
            quality,
            engine: EngineConfig {
                fragment_size: 4,
                discipline: Discipline::Sequential,
                ..Default::default()
            },
            ..Default::default()
        };
        Downloader::new(
            Arc::new(ctx),
            SiteEndpoints::from_url(server_url).unwrap(),
            options,
        )
    }

    fn descriptors(ids: &[&str]) -> Vec<VideoDescriptor> {
        ids.iter().map(|id| VideoDescriptor::new(*id, *id)).collect()
    }

    #[test]
    fn test_select_videos() {
        let ids = |v: Vec<VideoDescriptor>| v.into_iter().map(|d| d.id).collect::<Vec<_>>();

        assert_eq!(ids(select_videos(descriptors(&["a", "b", "c"]), false, None)), ["a", "b", "c"]);
        assert_eq!(ids(select_videos(descriptors(&["a", "b", "c"]), true, None)), ["c", "b", "a"]);
        assert_eq!(ids(select_videos(descriptors(&["a", "b", "c"]), true, Some(2))), ["c", "b"]);
        assert_eq!(ids(select_videos(descriptors(&["a", "b"]), false, Some(5))), ["a", "b"]);
        assert_eq!(ids(select_videos(descriptors(&["a", "b"]), false, Some(0))), ["a", "b"]);
    }

    #[test]
    fn test_default_options() {
        let options = DownloadOptions::default();
        assert_eq!(options.destination, PathBuf::from("./videos"));
        assert_eq!(options.quality, Quality::High);
        assert!(!options.overwrite);
    }

    #[tokio::test]
    async fn test_download_direct_low_quality() {
        let mut server = mockito::Server::new_async().await;
        let media_url = format!("{}/media/v.mp4", server.url());
        server
            .mock("GET", "/video-download/5/")
            .with_body(format!(r#"{{"URL": "unused", "URL_LOW": "{}"}}"#, media_url))
            .create_async()
            .await;
        server
            .mock("HEAD", "/media/v.mp4")
            .with_header("content-length", "6")
            .create_async()
            .await;
        server
            .mock("GET", "/media/v.mp4")
            .match_header("range", "bytes=0-3")
            .with_status(206)
            .with_body("abcd")
            .create_async()
            .await;
        server
            .mock("GET", "/media/v.mp4")
            .match_header("range", "bytes=4-5")
            .with_status(206)
            .with_body("ef")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(&server.url(), dir.path(), Quality::Low);
        let video = VideoDescriptor::new("5", "clip")
            .with_collection("list")
            .with_page_url(format!("{}/video5/clip", server.url()));

        let outcome = downloader.download(&video).await.unwrap();
        let path = dir.path().join("out").join("list").join("clip(#5).mp4");
        assert_eq!(outcome, ItemOutcome::Downloaded { path: path.clone(), bytes: 6 });
        assert_eq!(std::fs::read(path).unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_high_quality_remuxes_allow_listed_variant() {
        let mut server = mockito::Server::new_async().await;
        let manifest_url = format!("{}/hls/hls.m3u8", server.url());
        server
            .mock("GET", "/video6/clip")
            .with_body(format!("setVideoHLS('{}')", manifest_url))
            .create_async()
            .await;
        server
            .mock("GET", "/hls/hls.m3u8")
            .with_body(
                "#EXTM3U\n\
                 #EXT-X-STREAM-INF:NAME=\"360p\",BANDWIDTH=400000,RESOLUTION=640x360\n\
                 hls-360p.m3u8\n\
                 #EXT-X-STREAM-INF:NAME=\"1080p\",BANDWIDTH=4000000,RESOLUTION=1920x1080\n\
                 hls-1080p.m3u8\n",
            )
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let remuxer = Arc::new(RecordingRemuxer::default());
        let downloader =
            downloader(&server.url(), dir.path(), Quality::High).with_remuxer(remuxer.clone());
        let video = VideoDescriptor::new("6", "clip").with_page_url(format!("{}/video6/clip", server.url()));

        let outcome = downloader.download(&video).await.unwrap();
        assert!(matches!(outcome, ItemOutcome::Remuxed { size: 7, .. }));
        assert_eq!(
            *remuxer.calls.lock().unwrap(),
            vec![format!("{}/hls/hls-1080p.m3u8", server.url())]
        );
    }

    #[tokio::test]
    async fn test_batch_skips_not_found_and_records_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/video-download/404/")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/video-download/403/")
            .with_body(r#"{"ERROR": "private video"}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(&server.url(), dir.path(), Quality::High);
        let videos = descriptors(&["404", "403"]);

        let mut seen = Vec::new();
        let mut done = Vec::new();
        let report = downloader
            .download_all(
                &videos,
                |i, n, v| seen.push(format!("[{}/{}] {}", i, n, v.id)),
                |v, result| done.push((v.id.clone(), result.is_ok())),
            )
            .await;

        assert_eq!(seen, ["[1/2] 404", "[2/2] 403"]);
        assert_eq!(done, [("404".to_string(), true), ("403".to_string(), false)]);
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].1, ItemOutcome::NotFound);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0].1, VidlError::PermissionDenied(_)));
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_collect_all_continues_past_bad_inputs() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/video1/gone")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("POST", "/api/playlists/list/9")
            .with_body(r#"{"ERROR": "private playlist"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/video2/kept_clip")
            .with_body("<html></html>")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(&server.url(), dir.path(), Quality::High);
        let urls = vec![
            format!("{}/video1/gone", server.url()),
            "9".to_string(),
            format!("{}/video2/kept_clip", server.url()),
        ];

        let mut listed = Vec::new();
        let collection = downloader
            .collect_all(&urls, |url, result| listed.push((url.to_string(), result.is_ok())))
            .await;

        assert_eq!(listed.len(), 3);
        assert!(!listed[0].1);
        assert!(!listed[1].1);
        assert!(listed[2].1);
        assert_eq!(collection.videos.len(), 1);
        assert_eq!(collection.videos[0].id, "2");
        assert_eq!(collection.videos[0].title, "kept_clip");
        assert_eq!(collection.failures.len(), 1);
        assert_eq!(collection.failures[0].0, "9");
        assert!(matches!(
            collection.failures[0].1,
            VidlError::PermissionDenied(_)
        ));
    }

    #[tokio::test]
    async fn test_complete_file_is_skipped_without_network() {
        let server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();
        let downloader = downloader(&server.url(), dir.path(), Quality::High);
        let video = VideoDescriptor::new("9", "done");

        let path = video.output_path(&dir.path().join("out"), "mp4");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut data = 12u32.to_be_bytes().to_vec();
        data.extend(b"ftypisom");
        data.extend(8u32.to_be_bytes());
        data.extend(b"moov");
        std::fs::write(&path, &data).unwrap();

        let outcome = downloader.download(&video).await.unwrap();
        assert_eq!(outcome, ItemOutcome::Skipped { path, size: 20 });
    }
}
