//! URL utilities for extracting video IDs and classifying source pages

use crate::error::VidlError;
use regex::Regex;
use url::Url;

/// Kind of page a user-supplied URL points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageKind {
    /// A single video page
    Video,
    /// A user's uploads, named by profile
    Profile(String),
    /// A channel's uploads, named by channel
    Channel(String),
    /// A favorites playlist, by numeric id
    Favorites(String),
}

impl PageKind {
    /// A bare numeric argument is taken as a favorites playlist id
    pub fn classify(url: &str) -> Result<Self, VidlError> {
        if !url.is_empty() && url.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(PageKind::Favorites(url.to_string()));
        }
        if url.contains("/profiles/") {
            return Ok(PageKind::Profile(path_segment_after(url, "profiles")?));
        }
        if url.contains("/channels/") {
            return Ok(PageKind::Channel(path_segment_after(url, "channels")?));
        }
        if url.contains("/favorite/") {
            return Ok(PageKind::Favorites(extract_playlist_id(url)?));
        }
        Ok(PageKind::Video)
    }
}

fn find(pattern: &str, haystack: &str) -> Result<Option<String>, VidlError> {
    let re = Regex::new(pattern)?;
    Ok(re
        .captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string()))
}

/// Numeric id from a `/video<digits>/` path segment, if any
pub fn find_video_id(url: &str) -> Result<Option<String>, VidlError> {
    find(r"/video(\d+)/", url)
}

/// Numeric id from a `/video<digits>/` path segment
pub fn extract_video_id(url: &str) -> Result<String, VidlError> {
    find_video_id(url)?.ok_or_else(|| VidlError::InvalidUrl(format!("no video id in {}", url)))
}

/// URL slug following the video id, used as a fallback title
pub fn find_video_slug(url: &str) -> Result<Option<String>, VidlError> {
    find(r"/video\d+/([^/?#]+)", url)
}

/// Numeric favorites playlist id
pub fn extract_playlist_id(url: &str) -> Result<String, VidlError> {
    find(r"/favorite/(\d+)(?:/|$)", url)?
        .ok_or_else(|| VidlError::InvalidUrl(format!("no playlist id in {}", url)))
}

fn path_segment_after(url: &str, section: &str) -> Result<String, VidlError> {
    let parsed = Url::parse(url)?;
    let mut segments = parsed.path_segments().into_iter().flatten();
    segments
        .find(|s| *s == section)
        .and_then(|_| segments.next())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| VidlError::InvalidUrl(format!("no {} name in {}", section, url)))
}
