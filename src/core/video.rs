//! Video descriptors and output layout

use crate::utils::filename::safe_filename;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A downloadable video as produced by the listing collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDescriptor {
    /// Site-unique video id
    pub id: String,
    /// Display title, used for the file name
    pub title: String,
    /// Playlist or uploader name, used as a subdirectory
    #[serde(default)]
    pub collection: Option<String>,
    /// Page the video was found on
    #[serde(default)]
    pub page_url: Option<String>,
}

impl VideoDescriptor {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            collection: None,
            page_url: None,
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_page_url(mut self, page_url: impl Into<String>) -> Self {
        self.page_url = Some(page_url.into());
        self
    }

    /// Collection name, empty when absent
    pub fn collection_name(&self) -> &str {
        self.collection.as_deref().unwrap_or_default()
    }

    /// `<dest>/<collection>/<title>(#<id>).<ext>`
    pub fn output_path(&self, dest: &Path, extension: &str) -> PathBuf {
        let mut dir = dest.to_path_buf();
        let collection = safe_filename(self.collection_name());
        if !collection.is_empty() {
            dir.push(collection);
        }
        dir.join(format!(
            "{}(#{}).{}",
            safe_filename(&self.title),
            self.id,
            extension.trim_start_matches('.')
        ))
    }
}
