//! Decide whether an existing output file can be skipped

use crate::error::VidlError;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tracing::debug;

/// What to do with a destination before touching the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipDecision {
    /// The file is a complete container, nothing to fetch
    Complete { size: u64 },
    /// Resume from `done` bytes (0 when the file does not exist)
    Resume { done: u64 },
    /// Overwrite requested, start from scratch
    Restart,
}

/// Skip/resume policy applied before each download
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipPolicy {
    pub overwrite: bool,
}

impl SkipPolicy {
    pub fn new(overwrite: bool) -> Self {
        Self { overwrite }
    }

    /// Partial files are trusted as correct prefixes. Only a file that
    /// looks complete is checked, and a failed check means resume.
    pub async fn decide(&self, path: &Path) -> Result<SkipDecision, VidlError> {
        if self.overwrite {
            return Ok(SkipDecision::Restart);
        }

        let done = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SkipDecision::Resume { done: 0 })
            }
            Err(e) => return Err(e.into()),
        };

        if check_complete(path).await? {
            Ok(SkipDecision::Complete { size: done })
        } else {
            debug!("{} is a partial file ({} bytes)", path.display(), done);
            Ok(SkipDecision::Resume { done })
        }
    }
}

/// Whether `path` is a well-formed MP4 whose top-level boxes tile it exactly
pub async fn check_complete(path: &Path) -> Result<bool, VidlError> {
    let is_mp4 = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mp4"));
    if !is_mp4 {
        return Ok(false);
    }

    let mut file = File::open(path).await?;
    let len = file.metadata().await?.len();

    let mut offset = 0u64;
    let mut first = true;
    let mut has_moov = false;

    while offset < len {
        let Some((kind, size)) = read_box_header(&mut file, offset, len).await? else {
            return Ok(false);
        };
        if first && &kind != b"ftyp" {
            return Ok(false);
        }
        first = false;
        has_moov |= &kind == b"moov";

        match offset.checked_add(size) {
            Some(next) if next <= len => offset = next,
            _ => return Ok(false),
        }
    }

    Ok(!first && has_moov && offset == len)
}

/// Box type and total size of the box at `offset`, `None` when malformed
async fn read_box_header(
    file: &mut File,
    offset: u64,
    len: u64,
) -> Result<Option<([u8; 4], u64)>, VidlError> {
    if len - offset < 8 {
        return Ok(None);
    }
    file.seek(SeekFrom::Start(offset)).await?;

    let mut header = [0u8; 8];
    file.read_exact(&mut header).await?;
    let size32 = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let kind = [header[4], header[5], header[6], header[7]];

    let (size, header_len) = match size32 {
        0 => (len - offset, 8),
        1 => {
            if len - offset < 16 {
                return Ok(None);
            }
            let mut large = [0u8; 8];
            file.read_exact(&mut large).await?;
            (u64::from_be_bytes(large), 16)
        }
        n => (u64::from(n), 8),
    };

    if size < header_len {
        return Ok(None);
    }
    Ok(Some((kind, size)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend_from_slice(payload);
        out
    }

    fn sample() -> Vec<u8> {
        let mut data = mp4_box(b"ftyp", b"isom\0\0\0\x01");
        data.extend(mp4_box(b"moov", &[0u8; 32]));
        data.extend(mp4_box(b"mdat", &[7u8; 128]));
        data
    }

    async fn write(dir: &Path, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        tokio::fs::write(&path, data).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_complete_mp4() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "v.mp4", &sample()).await;
        assert!(check_complete(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_truncated_mp4() {
        let dir = tempfile::tempdir().unwrap();
        let data = sample();
        let path = write(dir.path(), "v.mp4", &data[..data.len() - 10]).await;
        assert!(!check_complete(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_moov_or_ftyp() {
        let dir = tempfile::tempdir().unwrap();

        let mut no_moov = mp4_box(b"ftyp", b"isom");
        no_moov.extend(mp4_box(b"mdat", &[1u8; 16]));
        let path = write(dir.path(), "a.mp4", &no_moov).await;
        assert!(!check_complete(&path).await.unwrap());

        let mut no_ftyp = mp4_box(b"moov", &[0u8; 8]);
        no_ftyp.extend(mp4_box(b"mdat", &[1u8; 16]));
        let path = write(dir.path(), "b.mp4", &no_ftyp).await;
        assert!(!check_complete(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_largesize_and_to_end_boxes() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = mp4_box(b"ftyp", b"isom");
        data.extend(mp4_box(b"moov", &[0u8; 8]));

        // 64-bit size box
        data.extend(1u32.to_be_bytes());
        data.extend(b"free");
        data.extend(24u64.to_be_bytes());
        data.extend([0u8; 8]);

        // size 0 runs to the end of the file
        data.extend(0u32.to_be_bytes());
        data.extend(b"mdat");
        data.extend([9u8; 40]);

        let path = write(dir.path(), "c.mp4", &data).await;
        assert!(check_complete(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_non_mp4_never_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "v.ts", &sample()).await;
        assert!(!check_complete(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_policy_decisions() {
        let dir = tempfile::tempdir().unwrap();
        let complete = write(dir.path(), "done.mp4", &sample()).await;
        let partial = write(dir.path(), "part.mp4", &sample()[..20]).await;
        let missing = dir.path().join("missing.mp4");

        let policy = SkipPolicy::new(false);
        assert_eq!(
            policy.decide(&complete).await.unwrap(),
            SkipDecision::Complete {
                size: sample().len() as u64
            }
        );
        assert_eq!(
            policy.decide(&partial).await.unwrap(),
            SkipDecision::Resume { done: 20 }
        );
        assert_eq!(
            policy.decide(&missing).await.unwrap(),
            SkipDecision::Resume { done: 0 }
        );
        assert_eq!(
            SkipPolicy::new(true).decide(&complete).await.unwrap(),
            SkipDecision::Restart
        );
    }
}
