//! Turn source pages into video descriptors

use crate::core::video::VideoDescriptor;
use crate::error::VidlError;
use crate::platform::client::{lookup_path, ClientContext};
use crate::platform::locator::SiteEndpoints;
use crate::utils::filename::unescape_html;
use crate::utils::url::{extract_video_id, find_video_slug};
use regex::Regex;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Entry of a playlist or uploads listing
#[derive(Debug, Deserialize)]
struct ListedVideo {
    id: Value,
    #[serde(default)]
    tf: Option<String>,
}

impl ListedVideo {
    fn into_descriptor(self, collection: &str) -> VideoDescriptor {
        let id = match self.id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        let descriptor = VideoDescriptor::new(id, unescape_html(self.tf.as_deref().unwrap_or_default()));
        if collection.is_empty() {
            descriptor
        } else {
            descriptor.with_collection(collection)
        }
    }
}

/// Content of the `og:title` meta tag
pub fn extract_og_title(page: &str) -> Result<Option<String>, VidlError> {
    let pattern = Regex::new(r#"<meta\s+property="og:title"\s+content="([^"]*)"\s*/?>"#)?;
    Ok(pattern
        .captures(page)
        .and_then(|c| c.get(1))
        .map(|m| unescape_html(m.as_str()).trim().to_string())
        .filter(|t| !t.is_empty()))
}

/// Describe the video on a single video page
pub async fn video_from_page(
    ctx: &ClientContext,
    page_url: &str,
) -> Result<VideoDescriptor, VidlError> {
    let id = extract_video_id(page_url)?;
    let page = ctx.get_text(page_url).await?;

    let title = match extract_og_title(&page)? {
        Some(title) => title,
        None => find_video_slug(page_url)?.unwrap_or_else(|| id.clone()),
    };
    debug!("Video {} is titled {:?}", id, title);

    Ok(VideoDescriptor::new(id, title).with_page_url(page_url))
}

/// List a favorites playlist. Requires a valid credential.
pub async fn videos_from_favorites(
    ctx: &ClientContext,
    endpoints: &SiteEndpoints,
    playlist_id: &str,
) -> Result<Vec<VideoDescriptor>, VidlError> {
    let api = endpoints.playlist_api(playlist_id);
    let data = ctx
        .request_authenticated(Method::POST, &api, "logged")
        .await?;

    let name = lookup_path(&data, "list.name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let listed: Vec<ListedVideo> = match lookup_path(&data, "list.videos") {
        Some(videos) => serde_json::from_value(videos.clone())?,
        None => Vec::new(),
    };

    info!("Playlist {:?} has {} video(s)", name, listed.len());
    Ok(listed
        .into_iter()
        .map(|v| v.into_descriptor(&name))
        .collect())
}

/// Whose uploads are being listed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadsSection {
    Profiles,
    Channels,
}

impl UploadsSection {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadsSection::Profiles => "profiles",
            UploadsSection::Channels => "channels",
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadsPage {
    #[serde(default)]
    videos: Vec<ListedVideo>,
    #[serde(default)]
    nb_videos: u64,
    #[serde(default)]
    nb_per_page: u64,
}

/// Walks a profile's or channel's uploads one page at a time.
///
/// The pager only remembers the next page index, so it can be started at
/// any page and stopped and resumed between calls.
pub struct UploadsPager {
    ctx: Arc<ClientContext>,
    endpoints: SiteEndpoints,
    section: UploadsSection,
    name: String,
    next: Option<u32>,
}

impl UploadsPager {
    pub fn new(
        ctx: Arc<ClientContext>,
        endpoints: SiteEndpoints,
        section: UploadsSection,
        name: impl Into<String>,
    ) -> Self {
        Self {
            ctx,
            endpoints,
            section,
            name: name.into(),
            next: Some(0),
        }
    }

    /// Continue from a given page instead of the first one
    pub fn starting_at(mut self, page: u32) -> Self {
        self.next = Some(page);
        self
    }

    /// Index of the page the next call fetches, `None` once exhausted
    pub fn next_page_index(&self) -> Option<u32> {
        self.next
    }

    /// Fetch the next page, or `None` when there are no more
    pub async fn next_page(&mut self) -> Result<Option<Vec<VideoDescriptor>>, VidlError> {
        let Some(page) = self.next else {
            return Ok(None);
        };

        let url = self
            .endpoints
            .uploads_page(self.section.as_str(), &self.name, page);
        let response = self.ctx.execute(Method::POST, &url, HeaderMap::new()).await?;
        let data: UploadsPage = response.json().await?;

        if data.videos.is_empty() {
            self.next = None;
            return Ok(None);
        }

        let per_page = if data.nb_per_page > 0 {
            data.nb_per_page
        } else {
            data.videos.len() as u64
        };
        let seen = (u64::from(page) + 1) * per_page;
        self.next = (seen < data.nb_videos).then_some(page + 1);
        debug!(
            "{} page {}: {} video(s), {} total",
            self.name,
            page,
            data.videos.len(),
            data.nb_videos
        );

        Ok(Some(
            data.videos
                .into_iter()
                .map(|v| v.into_descriptor(&self.name))
                .collect(),
        ))
    }

    /// Drain every remaining page
    pub async fn collect_all(mut self) -> Result<Vec<VideoDescriptor>, VidlError> {
        let mut videos = Vec::new();
        while let Some(page) = self.next_page().await? {
            videos.extend(page);
        }
        info!("{} has {} upload(s)", self.name, videos.len());
        Ok(videos)
    }
}
