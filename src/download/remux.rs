//! Remux adaptive streams into a single container with an external muxer

use crate::error::VidlError;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Variant names that have no progressive-download resource and must be remuxed
pub const REMUX_ONLY: &[&str] = &["720p", "1080p"];

/// Whether a variant can only be fetched through the remuxer
pub fn needs_remux(variant_name: &str) -> bool {
    REMUX_ONLY.contains(&variant_name)
}

/// Turns a stream manifest into a file on disk
#[async_trait]
pub trait Remuxer: Send + Sync {
    /// Produce `output` from `manifest_url` and return its size.
    ///
    /// An existing output is left untouched unless `overwrite` is set.
    async fn remux(&self, manifest_url: &str, output: &Path, overwrite: bool)
        -> Result<u64, VidlError>;
}

/// Remuxer backed by the `ffmpeg` binary
#[derive(Debug, Clone)]
pub struct FfmpegRemuxer {
    program: String,
}

impl Default for FfmpegRemuxer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegRemuxer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments for a stream copy of `manifest_url` into `output`
    pub fn build_args(manifest_url: &str, output: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-y".to_string(),
            "-i".to_string(),
            manifest_url.to_string(),
            "-c".to_string(),
            "copy".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }
}

#[async_trait]
impl Remuxer for FfmpegRemuxer {
    async fn remux(
        &self,
        manifest_url: &str,
        output: &Path,
        overwrite: bool,
    ) -> Result<u64, VidlError> {
        if !overwrite {
            if let Ok(meta) = tokio::fs::metadata(output).await {
                info!("{} exists, skipping remux", output.display());
                return Ok(meta.len());
            }
        }

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args = Self::build_args(manifest_url, output);
        debug!("Running {} {}", self.program, args.join(" "));

        let result = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| VidlError::Remux(format!("failed to run {}: {}", self.program, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(VidlError::Remux(format!(
                "{} exited with {}: {}",
                self.program,
                result.status,
                stderr.trim()
            )));
        }

        Ok(tokio::fs::metadata(output).await?.len())
    }
}
