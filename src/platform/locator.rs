//! Resolve video identifiers to direct media URLs or stream variants

use crate::error::VidlError;
use crate::platform::client::ClientContext;
use crate::platform::manifest::{parse_manifest, StreamVariant};
use regex::Regex;
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// URL templates of the source site, rooted at its origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteEndpoints {
    origin: String,
}

impl SiteEndpoints {
    /// Endpoints on the same origin as `url`
    pub fn from_url(url: &str) -> Result<Self, VidlError> {
        let parsed = Url::parse(url)?;
        let origin = parsed.origin();
        if !origin.is_tuple() {
            return Err(VidlError::InvalidUrl(format!("{} has no origin", url)));
        }
        Ok(Self {
            origin: origin.ascii_serialization(),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Per-video metadata endpoint (JSON with `URL` / `URL_LOW`)
    pub fn video_api(&self, video_id: &str) -> String {
        format!("{}/video-download/{}/", self.origin, video_id)
    }

    /// Favorites playlist endpoint (JSON with `list.name` / `list.videos`)
    pub fn playlist_api(&self, playlist_id: &str) -> String {
        format!("{}/api/playlists/list/{}", self.origin, playlist_id)
    }

    /// One page of a profile's or channel's uploads
    pub fn uploads_page(&self, section: &str, name: &str, page: u32) -> String {
        format!("{}/{}/{}/videos/new/{}", self.origin, section, name, page)
    }
}

/// Turns identifiers into fetchable media locations
pub struct ResourceLocator {
    ctx: Arc<ClientContext>,
    endpoints: SiteEndpoints,
}

impl ResourceLocator {
    pub fn new(ctx: Arc<ClientContext>, endpoints: SiteEndpoints) -> Self {
        Self { ctx, endpoints }
    }

    pub fn endpoints(&self) -> &SiteEndpoints {
        &self.endpoints
    }

    /// Resolve the direct progressive-download URL of a video
    pub async fn resolve_direct_url(
        &self,
        video_id: &str,
        low_quality: bool,
        force_new_credential: bool,
    ) -> Result<String, VidlError> {
        if force_new_credential {
            self.ctx.force_refresh().await?;
        }

        let api = self.endpoints.video_api(video_id);
        let data = self
            .ctx
            .request_authenticated(Method::GET, &api, "URL")
            .await?;

        let field = if low_quality { "URL_LOW" } else { "URL" };
        let url = data
            .get(field)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| VidlError::Parse(format!("{} missing from {}", field, api)))?;

        debug!("Resolved video {} ({}) to {}", video_id, field, url);
        Ok(url.to_string())
    }

    /// Fetch a video page and list its adaptive variants, lowest bandwidth first
    pub async fn resolve_stream_variants(
        &self,
        page_url: &str,
    ) -> Result<Vec<StreamVariant>, VidlError> {
        let page = self.ctx.get_text(page_url).await?;
        let manifest_url = extract_manifest_url(&page)?
            .ok_or_else(|| VidlError::Parse(format!("no stream manifest on {}", page_url)))?;

        info!("Found stream manifest {}", manifest_url);
        let manifest = self.ctx.get_text(&manifest_url).await?;
        parse_manifest(&manifest, &manifest_url)
    }
}

/// First `.m3u8` URL embedded in a page
pub fn extract_manifest_url(page: &str) -> Result<Option<String>, VidlError> {
    let pattern = Regex::new(r#"https?://[^'"\s<>]+\.m3u8[^'"\s<>]*"#)?;
    Ok(pattern.find(page).map(|m| m.as_str().to_string()))
}
