//! Adaptive stream manifest parsing and quality selection

use crate::error::VidlError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

const MANIFEST_MARKER: &str = "#EXTM3U";

/// One adaptive-bitrate rendition listed in a master manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamVariant {
    /// Label such as `720p`
    pub name: String,
    /// Advertised bandwidth in bits per second; the sort key
    pub bandwidth: u64,
    /// Resolution such as `1280x720`
    pub resolution: String,
    /// Absolute URL of the variant playlist
    pub url: String,
}

/// Requested quality, picked by index from the bandwidth-sorted variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    Low,
    Middle,
    #[default]
    High,
}

impl Quality {
    /// Index into a list of `len` variants sorted ascending by bandwidth
    pub fn pick_index(self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(match self {
            Quality::Low => 0,
            Quality::Middle => len / 2,
            Quality::High => len - 1,
        })
    }

    pub fn pick(self, variants: &[StreamVariant]) -> Option<&StreamVariant> {
        self.pick_index(variants.len()).map(|i| &variants[i])
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "middle" | "mid" => Ok(Quality::Middle),
            "high" => Ok(Quality::High),
            other => Err(format!("Unknown quality: {}", other)),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Quality::Low => "low",
            Quality::Middle => "middle",
            Quality::High => "high",
        };
        f.write_str(name)
    }
}

/// Parse a master manifest into variants sorted ascending by bandwidth.
///
/// Each `#...:KEY=VALUE,...` header line carrying `NAME`, `BANDWIDTH`
/// and `RESOLUTION` is paired with the next URL line, resolved against
/// the manifest's own URL. Equal bandwidths keep manifest order.
pub fn parse_manifest(text: &str, manifest_url: &str) -> Result<Vec<StreamVariant>, VidlError> {
    let base = Url::parse(manifest_url)?;
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty());

    if lines.next() != Some(MANIFEST_MARKER) {
        return Err(VidlError::Parse(format!(
            "{} is not a stream manifest",
            manifest_url
        )));
    }

    let mut variants = Vec::new();
    while let Some(header) = lines.next() {
        let Some((tag, attributes)) = header.strip_prefix('#').and_then(|h| h.split_once(':'))
        else {
            continue;
        };
        if !tag.starts_with("EXT-X-STREAM-INF") {
            continue;
        }

        let uri = lines
            .next()
            .filter(|line| !line.starts_with('#'))
            .ok_or_else(|| VidlError::Parse(format!("variant without URL: {}", header)))?;

        let attributes = parse_attributes(attributes);
        let field = |key: &str| {
            attributes
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| VidlError::Parse(format!("{} missing in: {}", key, header)))
        };

        let bandwidth = field("BANDWIDTH")?;
        variants.push(StreamVariant {
            name: field("NAME")?,
            bandwidth: bandwidth
                .parse()
                .map_err(|_| VidlError::Parse(format!("bad BANDWIDTH: {}", bandwidth)))?,
            resolution: field("RESOLUTION")?,
            url: base.join(uri)?.to_string(),
        });
    }

    variants.sort_by_key(|v| v.bandwidth);
    Ok(variants)
}

/// Split `KEY=VALUE,KEY="a,b"` respecting quoted commas; quotes are stripped
fn parse_attributes(input: &str) -> Vec<(String, String)> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in input.chars() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => tokens.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    tokens.push(current);

    tokens
        .into_iter()
        .filter_map(|token| {
            let (key, value) = token.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}
